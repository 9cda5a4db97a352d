/*!
 * Collaborator failures surface as retryable errors, never as decisions
 */

use mockall::mock;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uma_authz::core::errors::{DirectoryResult, StoreResult};
use uma_authz::policy::PermissionRecord;
use uma_authz::{
    AuthorizationRequest, ChildPolicy, ChildPolicyKind, ClientId, Directory, DirectoryError, GroupPath,
    InMemoryDirectory, InMemoryPolicyStore, InMemoryResourceRegistry, PermissionId, PermissionQuery,
    PermissionSpec, PolicyId, PolicyStore, Requester, Resource, ResourceId, StoreError, UmaError, UmaService,
    UserId,
};

mock! {
    pub FlakyDirectory {}

    impl Directory for FlakyDirectory {
        fn roles_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<String>>;
        fn groups_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<GroupPath>>;
        fn role_exists(&self, role: &str) -> DirectoryResult<bool>;
        fn group_exists(&self, group: &GroupPath) -> DirectoryResult<bool>;
        fn client_exists(&self, client: &ClientId) -> DirectoryResult<bool>;
    }
}

mock! {
    pub FlakyStore {}

    impl PolicyStore for FlakyStore {
        fn insert_permission(&self, record: PermissionRecord) -> StoreResult<PermissionRecord>;
        fn put_permission(&self, record: PermissionRecord) -> StoreResult<()>;
        fn remove_permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>>;
        fn permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>>;
        fn permissions_by_resource(&self, resource: &ResourceId) -> StoreResult<Vec<PermissionRecord>>;
        fn insert_policy(&self, policy: ChildPolicy) -> StoreResult<()>;
        fn replace_policy(&self, id: &PolicyId, kind: ChildPolicyKind) -> StoreResult<()>;
        fn remove_policy(&self, id: &PolicyId) -> StoreResult<()>;
        fn policies_of(&self, permission: &PermissionId) -> StoreResult<Vec<ChildPolicy>>;
    }
}

fn scoped_resource(resources: &InMemoryResourceRegistry) -> ResourceId {
    resources.register(
        Resource::new("Resource A", "marta")
            .owner_managed(true)
            .with_scopes(["Scope A", "Scope B"]),
    )
}

fn assert_unavailable(err: UmaError) {
    assert_eq!(err.http_status(), 503);
    assert!(err.is_retryable());
}

#[test]
fn test_directory_outage_during_decision() {
    let mut directory = MockFlakyDirectory::new();
    directory.expect_role_exists().returning(|_| Ok(true));
    directory
        .expect_roles_of()
        .returning(|_| Err(DirectoryError::Unavailable("ldap down".into())));
    directory.expect_groups_of().returning(|_| Ok(BTreeSet::new()));

    let resources = InMemoryResourceRegistry::new();
    let resource = scoped_resource(&resources);
    let service = UmaService::builder()
        .with_directory(Arc::new(directory))
        .with_resources(Arc::new(resources))
        .build()
        .unwrap();

    service
        .permissions()
        .create(&UserId::new("marta"), &resource, PermissionSpec::new("p").role("role_a"))
        .unwrap();

    let request = AuthorizationRequest::new().permission(resource, ["Scope A"]);
    let err = service
        .decisions()
        .authorize(&Requester::user("kolo"), &request)
        .unwrap_err();
    assert!(matches!(err, UmaError::Directory(_)));
    assert_unavailable(err);

    // A failed lookup is not recorded as a denial
    assert_eq!(service.audit().denial_count(&UserId::new("kolo")), 0);
}

#[test]
fn test_directory_outage_during_validation() {
    let mut directory = MockFlakyDirectory::new();
    directory
        .expect_role_exists()
        .returning(|_| Err(DirectoryError::Unavailable("ldap down".into())));

    let resources = InMemoryResourceRegistry::new();
    let resource = scoped_resource(&resources);
    let service = UmaService::builder()
        .with_directory(Arc::new(directory))
        .with_resources(Arc::new(resources))
        .build()
        .unwrap();

    let err = service
        .permissions()
        .create(&UserId::new("marta"), &resource, PermissionSpec::new("p").role("role_a"))
        .unwrap_err();
    assert_unavailable(err);
}

#[test]
fn test_store_timeout() {
    let mut store = MockFlakyStore::new();
    store
        .expect_permissions_by_resource()
        .returning(|_| Err(StoreError::Timeout("policy store".into())));

    let resources = InMemoryResourceRegistry::new();
    let resource = scoped_resource(&resources);
    let service = UmaService::builder()
        .with_store(Arc::new(store))
        .with_resources(Arc::new(resources))
        .build()
        .unwrap();

    let request = AuthorizationRequest::new().permission(resource, ["Scope B"]);
    let err = service
        .decisions()
        .authorize(&Requester::user("kolo"), &request)
        .unwrap_err();
    assert!(matches!(err, UmaError::Store(StoreError::Timeout(_))));
    assert_unavailable(err);

    let err = service
        .permissions()
        .find(&UserId::new("marta"), &resource, &PermissionQuery::new())
        .unwrap_err();
    assert_unavailable(err);
}

#[test]
fn test_owner_decision_skips_the_store() {
    let mut store = MockFlakyStore::new();
    store.expect_permissions_by_resource().never();

    let resources = InMemoryResourceRegistry::new();
    let resource = scoped_resource(&resources);
    let service = UmaService::builder()
        .with_store(Arc::new(store))
        .with_resources(Arc::new(resources))
        .build()
        .unwrap();

    let decision = service
        .decisions()
        .authorize(&Requester::user("marta"), &AuthorizationRequest::new().resource(resource))
        .unwrap();
    assert!(decision.is_granted());
}

/// In-memory store whose next child policy insert or remove fails once
struct FaultyStore {
    inner: InMemoryPolicyStore,
    fail_next_insert: AtomicBool,
    fail_next_remove: AtomicBool,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryPolicyStore::new(),
            fail_next_insert: AtomicBool::new(false),
            fail_next_remove: AtomicBool::new(false),
        }
    }
}

impl PolicyStore for FaultyStore {
    fn insert_permission(&self, record: PermissionRecord) -> StoreResult<PermissionRecord> {
        self.inner.insert_permission(record)
    }

    fn put_permission(&self, record: PermissionRecord) -> StoreResult<()> {
        self.inner.put_permission(record)
    }

    fn remove_permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>> {
        self.inner.remove_permission(id)
    }

    fn permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>> {
        self.inner.permission(id)
    }

    fn permissions_by_resource(&self, resource: &ResourceId) -> StoreResult<Vec<PermissionRecord>> {
        self.inner.permissions_by_resource(resource)
    }

    fn insert_policy(&self, policy: ChildPolicy) -> StoreResult<()> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("down".into()));
        }
        self.inner.insert_policy(policy)
    }

    fn replace_policy(&self, id: &PolicyId, kind: ChildPolicyKind) -> StoreResult<()> {
        self.inner.replace_policy(id, kind)
    }

    fn remove_policy(&self, id: &PolicyId) -> StoreResult<()> {
        if self.fail_next_remove.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("down".into()));
        }
        self.inner.remove_policy(id)
    }

    fn policies_of(&self, permission: &PermissionId) -> StoreResult<Vec<ChildPolicy>> {
        self.inner.policies_of(permission)
    }
}

fn faulty_service() -> (UmaService, Arc<FaultyStore>, ResourceId) {
    let directory = InMemoryDirectory::new();
    directory
        .add_role("role_a")
        .add_role("role_b")
        .add_group(GroupPath::parse("/group_c").unwrap())
        .add_client("client-a");

    let store = Arc::new(FaultyStore::new());
    let resources = InMemoryResourceRegistry::new();
    let resource = scoped_resource(&resources);
    let service = UmaService::builder()
        .with_store(Arc::clone(&store) as Arc<dyn PolicyStore>)
        .with_directory(Arc::new(directory))
        .with_resources(Arc::new(resources))
        .build()
        .unwrap();
    (service, store, resource)
}

#[test]
fn test_failed_update_keeps_child_policies() {
    let (service, store, resource) = faulty_service();
    let marta = UserId::new("marta");
    let permission = service
        .permissions()
        .create(&marta, &resource, PermissionSpec::new("p").role("role_a"))
        .unwrap();
    let before = service
        .permissions()
        .associated_policies(&marta, &resource, &permission.id)
        .unwrap();

    let mut spec = permission.to_spec();
    spec.clear_dimensions().add_group("/group_c");
    store.fail_next_insert.store(true, Ordering::SeqCst);
    let err = service
        .permissions()
        .update(&marta, &resource, &permission.id, spec.clone())
        .unwrap_err();
    assert_unavailable(err);

    let after = service
        .permissions()
        .find_by_id(&marta, &resource, &permission.id)
        .unwrap();
    assert_eq!(after, permission);
    assert_eq!(
        service
            .permissions()
            .associated_policies(&marta, &resource, &permission.id)
            .unwrap(),
        before
    );

    // Retrying once the store recovers applies cleanly
    let retried = service
        .permissions()
        .update(&marta, &resource, &permission.id, spec)
        .unwrap();
    let updated = retried.permission().unwrap();
    assert!(updated.roles.is_empty());
    assert_eq!(updated.groups.len(), 1);
    assert_eq!(updated.version, permission.version + 1);
}

#[test]
fn test_failed_update_rolls_back_applied_changes() {
    let (service, store, resource) = faulty_service();
    let marta = UserId::new("marta");
    let permission = service
        .permissions()
        .create(&marta, &resource, PermissionSpec::new("p").role("role_a").client("client-a"))
        .unwrap();
    let before = service
        .permissions()
        .associated_policies(&marta, &resource, &permission.id)
        .unwrap();

    // Replace the role, add a group, then fail removing the client
    let mut spec = permission.to_spec();
    spec.remove_role("role_a")
        .add_role("role_b")
        .add_group("/group_c")
        .remove_client("client-a");
    store.fail_next_remove.store(true, Ordering::SeqCst);
    let err = service
        .permissions()
        .update(&marta, &resource, &permission.id, spec)
        .unwrap_err();
    assert_unavailable(err);

    assert_eq!(
        service
            .permissions()
            .associated_policies(&marta, &resource, &permission.id)
            .unwrap(),
        before
    );
    assert_eq!(
        service
            .permissions()
            .find_by_id(&marta, &resource, &permission.id)
            .unwrap(),
        permission
    );
}
