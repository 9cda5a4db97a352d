/*!
 * Permission lifecycle: create, resync on update, auto-delete, queries
 */

use crate::support::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use uma_authz::{ClientId, PermissionQuery, PermissionSpec, UmaError, UpdateOutcome};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_create_with_every_dimension() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    let permission = realm.create(
        &resource,
        PermissionSpec::new("Custom User-Managed Permission")
            .description("Users from specific roles are allowed to access")
            .scope("Scope A")
            .scope("Scope B")
            .scope("Scope C")
            .role("role_a")
            .role("role_b")
            .role("role_c")
            .role("role_d")
            .group("/group_a")
            .group("/group_a/group_b")
            .group("/group_c")
            .client("client-a")
            .client("resource-server-test")
            .condition("$evaluation.grant()"),
    );

    assert_eq!(permission.name, "Custom User-Managed Permission");
    assert_eq!(
        permission.description.as_deref(),
        Some("Users from specific roles are allowed to access")
    );
    assert_eq!(permission.scopes, set(&["Scope A", "Scope B", "Scope C"]));
    assert_eq!(permission.roles, set(&["role_a", "role_b", "role_c", "role_d"]));
    assert_eq!(
        permission.groups,
        [group("/group_a"), group("/group_a/group_b"), group("/group_c")]
            .into_iter()
            .collect()
    );
    assert_eq!(
        permission.clients,
        [ClientId::from("client-a"), ClientId::from("resource-server-test")]
            .into_iter()
            .collect()
    );
    assert_eq!(permission.condition.as_deref(), Some("$evaluation.grant()"));
    assert_eq!(realm.associated_count(&resource, &permission.id), 4);
}

#[test]
fn test_update_resyncs_child_policies() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    let permission = realm.create(
        &resource,
        PermissionSpec::new("Custom User-Managed Permission")
            .description("Users from specific roles are allowed to access")
            .scope("Scope A")
            .role("role_a"),
    );
    let id = permission.id;
    assert_eq!(realm.associated_count(&resource, &id), 1);

    let mut spec = permission.to_spec();
    spec.name = "Changed".into();
    spec.description = Some("Changed".into());
    realm.update(&resource, &id, &mut spec);
    let updated = realm
        .service
        .permissions()
        .find_by_id(&marta(), &resource, &id)
        .unwrap();
    assert_eq!(updated.name, "Changed");
    assert_eq!(updated.description.as_deref(), Some("Changed"));

    // (mutation, expected number of child policies afterwards)
    let steps: Vec<(Box<dyn Fn(&mut PermissionSpec)>, usize)> = vec![
        (Box::new(|s: &mut PermissionSpec| { s.remove_role("role_a").add_role("role_b").add_role("role_c"); }), 1),
        (Box::new(|s: &mut PermissionSpec| { s.add_role("role_d"); }), 1),
        (Box::new(|s: &mut PermissionSpec| { s.add_group("/group_a/group_b"); }), 2),
        (Box::new(|s: &mut PermissionSpec| { s.add_group("/group_a"); }), 2),
        (Box::new(|s: &mut PermissionSpec| { s.remove_group("/group_a/group_b").add_group("/group_c"); }), 2),
        (Box::new(|s: &mut PermissionSpec| { s.add_client("client-a"); }), 3),
        (Box::new(|s: &mut PermissionSpec| { s.add_client("resource-server-test"); }), 3),
        (Box::new(|s: &mut PermissionSpec| { s.remove_client("client-a"); }), 3),
        (Box::new(|s: &mut PermissionSpec| { s.set_condition("$evaluation.grant()"); }), 4),
        (Box::new(|s: &mut PermissionSpec| { s.clear_condition(); }), 3),
        (Box::new(|s: &mut PermissionSpec| { s.roles.clear(); }), 2),
        (Box::new(|s: &mut PermissionSpec| { s.clients.clear(); }), 1),
    ];

    for (mutate, expected) in steps {
        mutate(&mut spec);
        let outcome = realm.update(&resource, &id, &mut spec);
        let updated = outcome.permission().expect("permission still exists").clone();

        assert_eq!(realm.associated_count(&resource, &id), expected);
        assert_eq!(updated.roles, spec.roles);
        assert_eq!(
            updated.groups.iter().map(|g| g.to_string()).collect::<BTreeSet<_>>(),
            spec.groups
        );
        assert_eq!(
            updated.clients.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            spec.clients
        );
        assert_eq!(updated.condition, spec.condition);
    }

    spec.groups.clear();
    let outcome = realm.update(&resource, &id, &mut spec);
    assert_eq!(outcome, UpdateOutcome::Removed(id));

    let err = realm
        .service
        .permissions()
        .find_by_id(&marta(), &resource, &id)
        .unwrap_err();
    assert!(matches!(err, UmaError::NotFound(_)));
    assert_eq!(err.http_status(), 404);
}

#[test]
fn test_update_is_idempotent() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a"));

    let mut spec = permission.to_spec();
    spec.add_group("/group_c").set_condition("true");

    let first = realm.update(&resource, &permission.id, &mut spec);
    let policies_first = realm
        .service
        .permissions()
        .associated_policies(&marta(), &resource, &permission.id)
        .unwrap();
    let second = realm.update(&resource, &permission.id, &mut spec);
    let policies_second = realm
        .service
        .permissions()
        .associated_policies(&marta(), &resource, &permission.id)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(policies_first, policies_second);
    assert_eq!(policies_second.len(), 3);
}

#[test]
fn test_stale_version_conflicts() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a"));

    let mut writer_one = permission.to_spec();
    let mut writer_two = permission.to_spec();

    writer_one.add_role("role_b");
    realm.update(&resource, &permission.id, &mut writer_one);

    writer_two.add_role("role_c");
    let err = realm
        .service
        .permissions()
        .update(&marta(), &resource, &permission.id, writer_two)
        .unwrap_err();
    assert!(matches!(err, UmaError::Conflict(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_concurrent_updates_single_winner() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a"));
    let base = permission.to_spec();
    let permissions = realm.service.permissions();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mut spec = base.clone();
                spec.name = format!("writer {}", i);
                if i % 2 == 1 {
                    spec.add_group("/group_c");
                }
                if i % 3 == 0 {
                    spec.add_client("client-a");
                }
                if i % 4 == 0 {
                    spec.set_condition("isUser('kolo')");
                }
                let id = permission.id;
                let resource = &resource;
                scope.spawn(move || permissions.update(&marta(), resource, &id, spec))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter_map(UpdateOutcome::permission)
        .collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(UmaError::Conflict(_))))
            .count(),
        7
    );

    let winner = winners[0];
    assert_eq!(winner.version, permission.version + 1);
    assert_eq!(
        realm.associated_count(&resource, &permission.id),
        winner.dimensions().non_empty_count()
    );
    let stored = permissions.find_by_id(&marta(), &resource, &permission.id).unwrap();
    assert_eq!(&stored, winner);
}

#[test]
fn test_permission_without_scopes() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    let permission = realm.create(&resource, PermissionSpec::new("Custom User-Managed Policy").role("role_a"));

    assert_eq!(permission.scopes, set(&["Scope A", "Scope B", "Scope C"]));
    let found = realm
        .service
        .permissions()
        .find_by_id(&marta(), &resource, &permission.id)
        .unwrap();
    assert_eq!(found.scopes.len(), 3);
}

#[test]
fn test_find_with_filters_and_pagination() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    for i in 0..10 {
        let spec = PermissionSpec::new(format!("Custom User-Managed Permission {}", i))
            .scope("Scope A")
            .role("role_a");
        let spec = if i % 2 == 0 { spec.scope("Scope B") } else { spec };
        realm.create(&resource, spec);
    }
    let permissions = realm.service.permissions();

    let all = permissions.find(&marta(), &resource, &PermissionQuery::new()).unwrap();
    assert_eq!(all.len(), 10);
    assert_eq!(all[0].name, "Custom User-Managed Permission 0");

    let named = permissions
        .find(&marta(), &resource, &PermissionQuery::new().name("Permission 3"))
        .unwrap();
    assert_eq!(named.len(), 1);

    let scoped = permissions
        .find(&marta(), &resource, &PermissionQuery::new().scope("Scope B"))
        .unwrap();
    assert_eq!(scoped.len(), 5);

    let page = permissions
        .find(&marta(), &resource, &PermissionQuery::new().page(-1, 3))
        .unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(page[0].name, "Custom User-Managed Permission 0");

    let tail = permissions
        .find(&marta(), &resource, &PermissionQuery::new().page(8, 5))
        .unwrap();
    assert_eq!(
        tail.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["Custom User-Managed Permission 8", "Custom User-Managed Permission 9"]
    );
}

#[test]
fn test_delete_cascades() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a").client("client-a"));

    realm
        .service
        .permissions()
        .delete(&marta(), &resource, &permission.id)
        .unwrap();

    let err = realm
        .service
        .permissions()
        .associated_policies(&marta(), &resource, &permission.id)
        .unwrap_err();
    assert!(matches!(err, UmaError::NotFound(_)));

    let again = realm.service.permissions().delete(&marta(), &resource, &permission.id);
    assert!(matches!(again, Err(UmaError::NotFound(_))));
}

#[test]
fn test_resource_removal_purges_everything() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    realm.create(&resource, PermissionSpec::new("p1").role("role_a"));
    realm.create(&resource, PermissionSpec::new("p2").group("/group_c"));
    realm
        .service
        .tickets()
        .create(Some(&kolo()), &resource, "Scope A")
        .unwrap();

    realm.resources.remove(&resource);
    let summary = realm.service.resource_removed(&resource, &marta()).unwrap();

    assert_eq!(summary.permissions, 2);
    assert_eq!(summary.tickets, 1);
    assert!(realm.service.tickets().is_empty());
}
