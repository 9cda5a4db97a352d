/*!
 * Ownership and eligibility checks on every management entry point
 */

use crate::support::*;
use pretty_assertions::assert_eq;
use uma_authz::{PermissionQuery, PermissionSpec, TicketFilter, TicketUpdate, UmaError, UmaResult};

fn assert_forbidden<T: std::fmt::Debug>(result: UmaResult<T>) {
    let err = result.unwrap_err();
    assert!(matches!(err, UmaError::Forbidden(_)), "expected Forbidden, got {:?}", err);
    assert_eq!(err.http_status(), 403);
}

#[test]
fn test_only_owner_creates_permissions() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let spec = PermissionSpec::new("Custom User-Managed Permission")
        .scope("Scope A")
        .role("role_a");

    assert_forbidden(realm.service.permissions().create(&alice(), &resource, spec.clone()));
    assert!(realm
        .service
        .permissions()
        .create(&marta(), &resource, spec)
        .is_ok());
}

#[test]
fn test_resource_without_owner_managed_access() {
    let realm = Realm::new();
    let resource = realm.resource(false);

    assert_forbidden(realm.service.permissions().create(
        &marta(),
        &resource,
        PermissionSpec::new("Custom User-Managed Permission").role("role_a"),
    ));
    assert_forbidden(realm.service.permissions().find(&marta(), &resource, &PermissionQuery::new()));
}

#[test]
fn test_non_owner_is_rejected_everywhere() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").scope("Scope A").role("role_a"));
    let permissions = realm.service.permissions();

    assert_forbidden(permissions.find(&alice(), &resource, &PermissionQuery::new()));
    assert_forbidden(permissions.find_by_id(&alice(), &resource, &permission.id));
    assert_forbidden(permissions.associated_policies(&alice(), &resource, &permission.id));
    assert_forbidden(permissions.update(&alice(), &resource, &permission.id, permission.to_spec()));
    assert_forbidden(permissions.delete(&alice(), &resource, &permission.id));

    let tickets = realm.service.tickets();
    let ticket = tickets.create(Some(&kolo()), &resource, "Scope A").unwrap();
    assert_forbidden(tickets.find_by_resource(&alice(), &resource));
    assert_forbidden(tickets.find(&alice(), &TicketFilter::new().resource(resource)));
    assert_forbidden(tickets.update(&kolo(), &ticket.id, TicketUpdate::grant()));
    assert_forbidden(tickets.delete(&alice(), &ticket.id));

    // Nothing changed
    assert!(!tickets.get(&ticket.id).unwrap().is_granted());
    assert_eq!(realm.associated_count(&resource, &permission.id), 1);
}

#[test]
fn test_ownership_checked_before_payload() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a"));

    let garbage = PermissionSpec::new("").scope("Scope Z").role("no_such_role");
    assert_forbidden(realm.service.permissions().create(&alice(), &resource, garbage.clone()));
    assert_forbidden(
        realm
            .service
            .permissions()
            .update(&alice(), &resource, &permission.id, garbage.clone()),
    );

    // The owner gets the payload error instead
    let err = realm
        .service
        .permissions()
        .create(&marta(), &resource, garbage)
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[test]
fn test_owner_cannot_raise_ticket_on_own_resource() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let tickets = realm.service.tickets();

    assert_forbidden(tickets.create(Some(&marta()), &resource, "Scope A"));

    let raised = tickets.create(None, &resource, "Scope A").unwrap();
    assert_forbidden(tickets.claim(&raised.id, &marta()));
    assert!(!tickets.get(&raised.id).unwrap().is_claimed());
}

#[test]
fn test_management_is_audited() {
    let realm = Realm::new();
    let resource = realm.resource(true);
    let permission = realm.create(&resource, PermissionSpec::new("p").role("role_a"));
    realm
        .service
        .permissions()
        .delete(&marta(), &resource, &permission.id)
        .unwrap();

    let events = realm.service.audit().for_user(&marta(), 10);
    assert_eq!(events.len(), 2);
    assert_eq!(realm.service.audit().denial_count(&marta()), 0);
}
