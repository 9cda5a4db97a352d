/*!
 * Decision engine: grant sources, OR semantics, group matching, tokens
 */

use crate::support::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use uma_authz::{
    AuthorizationRequest, Decision, EngineConfig, GroupMatching, PermissionSpec, Requester, ResourceId,
};

fn scope_a(resource: ResourceId) -> AuthorizationRequest {
    AuthorizationRequest::new().permission(resource, ["Scope A"])
}

#[test]
fn test_user_managed_permission_follows_role_changes() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(
        &resource,
        PermissionSpec::new("Custom User-Managed Permission")
            .scope("Scope A")
            .role("role_a"),
    );

    let decision = realm.authorize(&as_kolo(), &scope_a(resource));
    let token = decision.token().expect("granted");
    assert!(token.allows(&resource, "Scope A"));
    assert!(!token.allows(&resource, "Scope B"));

    let mut spec = permission.to_spec();
    spec.remove_role("role_a").add_role("role_b");
    realm.update(&resource, &permission.id, &mut spec);
    assert!(!realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());

    spec.remove_role("role_b").add_role("role_a");
    realm.update(&resource, &permission.id, &mut spec);
    assert!(realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());

    realm
        .service
        .permissions()
        .delete(&marta(), &resource, &permission.id)
        .unwrap();
    assert!(!realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());

    // Other users never matched
    assert!(!realm.authorize(&Requester::user("alice"), &scope_a(resource)).is_granted());
}

#[test]
fn test_denial_names_unmet_scopes() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    realm.create(&resource, PermissionSpec::new("p").scope("Scope A").role("role_a"));

    let decision = realm.authorize(&as_kolo(), &AuthorizationRequest::new().resource(resource));
    let denial = decision.denial().expect("denied");

    assert_eq!(
        denial.unmet.iter().map(|u| u.scope.as_str()).collect::<Vec<_>>(),
        vec!["Scope B", "Scope C"]
    );
    assert!(!denial.request_submitted);
    assert!(!denial.to_string().contains("request_submitted"));
}

#[test]
fn test_or_across_permissions_and_dimensions() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    // Neither dimension of the first matches kolo
    realm.create(
        &resource,
        PermissionSpec::new("unmatched").scope("Scope A").role("role_b").client("client-a"),
    );
    assert!(!realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());

    // Client dimension alone is enough
    assert!(realm
        .authorize(&as_kolo().via_client("client-a"), &scope_a(resource))
        .is_granted());

    // A second permission with a matching group grants independently
    realm.create(&resource, PermissionSpec::new("group").scope("Scope A").group("/group_a"));
    assert!(realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());
}

#[test]
fn test_condition_dimension() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(
        &resource,
        PermissionSpec::new("scripted")
            .scope("Scope A")
            .role("role_d")
            .condition("hasRole('role_a') && hasScope('Scope A')"),
    );
    assert!(realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());

    let mut spec = permission.to_spec();
    spec.set_condition("$evaluation.deny()");
    realm.update(&resource, &permission.id, &mut spec);
    assert!(!realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());
}

#[test]
fn test_group_hierarchy_matching() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let alice = Requester::user("alice");
    realm
        .directory
        .join_group(&alice.user, &group("/group_a/group_b"))
        .unwrap();

    realm.create(&resource, PermissionSpec::new("ancestor").scope("Scope A").group("/group_a"));
    realm.create(&resource, PermissionSpec::new("descendant").scope("Scope B").group("/group_a/group_b"));

    // Sub-group members satisfy an ancestor group permission
    assert!(realm.authorize(&alice, &scope_a(resource)).is_granted());

    // Ancestor membership does not reach into sub-groups
    let scope_b = AuthorizationRequest::new().permission(resource, ["Scope B"]);
    assert!(!realm.authorize(&as_kolo(), &scope_b).is_granted());
    assert!(realm.authorize(&alice, &scope_b).is_granted());
}

#[test]
fn test_exact_group_matching() {
    let realm = Realm::with_config(EngineConfig::default().with_group_matching(GroupMatching::Exact));
    let resource = realm.resource(true);
    let alice = Requester::user("alice");
    realm
        .directory
        .join_group(&alice.user, &group("/group_a/group_b"))
        .unwrap();

    realm.create(&resource, PermissionSpec::new("ancestor").scope("Scope A").group("/group_a"));

    assert!(!realm.authorize(&alice, &scope_a(resource)).is_granted());
    assert!(realm.authorize(&as_kolo(), &scope_a(resource)).is_granted());
}

#[test]
fn test_owner_implicit_access() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let marta = Requester::user("marta");

    let decision = realm.authorize(&marta, &AuthorizationRequest::new().resource(resource));
    assert_eq!(decision.token().unwrap().scopes_for(&resource).len(), 3);

    let strict = Realm::with_config(EngineConfig::default().with_owner_implicit_access(false));
    let resource = strict.resource(true);
    assert!(!strict.authorize(&marta, &scope_a(resource)).is_granted());
}

#[test]
fn test_batch_request_requires_every_scope() {
    let realm = Realm::new();
    let first = realm.resource(true);
    let second = realm.resource(true);
    realm.create(&first, PermissionSpec::new("p").scope("Scope A").role("role_a"));
    realm.create(&second, PermissionSpec::new("p").scope("Scope C").role("role_a"));

    let both = AuthorizationRequest::new()
        .permission(first, ["Scope A"])
        .permission(second, ["Scope C"]);
    let decision = realm.authorize(&as_kolo(), &both);
    let token = decision.token().expect("granted");
    assert!(token.allows(&first, "Scope A"));
    assert!(token.allows(&second, "Scope C"));
    assert_eq!(token.claims.permissions.len(), 2);

    let too_much = both.permission(second, ["Scope B"]);
    match realm.authorize(&as_kolo(), &too_much) {
        Decision::Denied(denial) => {
            assert_eq!(denial.unmet.len(), 1);
            assert_eq!(denial.unmet[0].resource_id, second);
        }
        Decision::Granted(_) => panic!("Scope B was never delegated"),
    }

    let decisions = realm
        .service
        .decisions()
        .authorize_all(&as_kolo(), &[scope_a(first), too_much])
        .unwrap();
    assert_eq!(
        decisions.iter().map(Decision::is_granted).collect::<Vec<_>>(),
        vec![true, false]
    );
}

#[test]
fn test_granted_token_verifies() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    realm.create(&resource, PermissionSpec::new("p").scope("Scope A").role("role_a"));

    let decision = realm.authorize(&as_kolo().via_client("client-a"), &scope_a(resource));
    let token = decision.token().unwrap();
    let signer = realm.service.decisions().signer();

    assert!(signer.verify(token).is_ok());
    assert_eq!(token.claims.sub, kolo());
    assert_eq!(token.claims.azp.as_ref().map(|c| c.as_str()), Some("client-a"));
    assert_eq!(
        token.claims.expires_at.duration_since(token.claims.issued_at).unwrap(),
        Duration::from_secs(300)
    );
}

#[test]
fn test_unknown_scope_is_invalid() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let request = AuthorizationRequest::new().permission(resource, ["Scope Z"]);

    let err = realm
        .service
        .decisions()
        .authorize(&as_kolo(), &request)
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[test]
fn test_decisions_are_audited() {
    let realm = Realm::new();
    let resource = realm.resource(true);

    realm.authorize(&as_kolo(), &scope_a(resource));
    realm.authorize(&as_kolo(), &scope_a(resource));

    assert_eq!(realm.service.audit().denial_count(&kolo()), 2);
    let recent = realm.service.audit().for_user(&kolo(), 10);
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|e| e.trace_id.is_some()));
}
