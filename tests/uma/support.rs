/*!
 * Shared realm fixture
 */

use std::sync::Arc;
use uma_authz::{
    AuthorizationRequest, Decision, EngineConfig, GroupPath, InMemoryDirectory, InMemoryResourceRegistry,
    PermissionSpec, Requester, Resource, ResourceId, UmaPermission, UmaService, UpdateOutcome, UserId,
};

/// Users, roles, groups and clients every test starts from
///
/// - marta and alice: uma_authorization, uma_protection
/// - kolo: role_a, member of /group_a
pub struct Realm {
    pub service: UmaService,
    pub directory: InMemoryDirectory,
    pub resources: InMemoryResourceRegistry,
}

#[allow(dead_code)]
impl Realm {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let directory = InMemoryDirectory::new();
        for role in ["uma_authorization", "uma_protection", "role_a", "role_b", "role_c", "role_d"] {
            directory.add_role(role);
        }
        directory
            .add_group(group("/group_a/group_b"))
            .add_group(group("/group_c"))
            .add_client("resource-server-test")
            .add_client("client-a");

        for user in ["marta", "alice"] {
            directory.add_user(user);
            directory.assign_role(&UserId::new(user), "uma_authorization").unwrap();
            directory.assign_role(&UserId::new(user), "uma_protection").unwrap();
        }
        directory.add_user("kolo");
        directory.assign_role(&kolo(), "role_a").unwrap();
        directory.join_group(&kolo(), &group("/group_a")).unwrap();

        let resources = InMemoryResourceRegistry::new();
        let service = UmaService::builder()
            .with_config(config)
            .with_directory(Arc::new(directory.clone()))
            .with_resources(Arc::new(resources.clone()))
            .build()
            .unwrap();

        Self {
            service,
            directory,
            resources,
        }
    }

    /// "Resource A" owned by marta with scopes A, B and C
    pub fn resource(&self, owner_managed: bool) -> ResourceId {
        self.resources.register(
            Resource::new("Resource A", "marta")
                .owner_managed(owner_managed)
                .with_scopes(["Scope A", "Scope B", "Scope C"]),
        )
    }

    pub fn create(&self, resource: &ResourceId, spec: PermissionSpec) -> UmaPermission {
        self.service
            .permissions()
            .create(&marta(), resource, spec)
            .unwrap()
    }

    /// Apply `spec` as marta and carry the new version forward
    pub fn update(&self, resource: &ResourceId, id: &uma_authz::PermissionId, spec: &mut PermissionSpec) -> UpdateOutcome {
        let outcome = self
            .service
            .permissions()
            .update(&marta(), resource, id, spec.clone())
            .unwrap();
        if let UpdateOutcome::Updated(updated) = &outcome {
            spec.expected_version = Some(updated.version);
        }
        outcome
    }

    pub fn associated_count(&self, resource: &ResourceId, id: &uma_authz::PermissionId) -> usize {
        self.service
            .permissions()
            .associated_policies(&marta(), resource, id)
            .unwrap()
            .len()
    }

    pub fn authorize(&self, requester: &Requester, request: &AuthorizationRequest) -> Decision {
        self.service.decisions().authorize(requester, request).unwrap()
    }
}

pub fn marta() -> UserId {
    UserId::new("marta")
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

pub fn kolo() -> UserId {
    UserId::new("kolo")
}

pub fn as_kolo() -> Requester {
    Requester::user("kolo")
}

pub fn group(path: &str) -> GroupPath {
    GroupPath::parse(path).unwrap()
}
