//! Invite creation, authorization gating and revocation.

mod common;

use common::TestApp;
use service_core::notify::NotificationKind;
use user_service::dtos::CreateInviteRequest;
use user_service::models::{InviteState, Role};
use user_service::services::{CredentialStore, ServiceError};

fn invite_request(email: &str, role: Role) -> CreateInviteRequest {
    CreateInviteRequest {
        invite_email: email.to_string(),
        invite_role: role,
        organisation: None,
    }
}

#[tokio::test]
async fn test_invite_creates_pending_account_and_enqueues_invite_job() {
    let app = TestApp::spawn();
    let actor = app.super_admin();

    let created = app
        .service
        .create_invite(&actor, invite_request("invitee@example.com", Role::Operator))
        .await
        .unwrap();

    let account = app
        .db
        .find_by_email("invitee@example.com")
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(account.invite_state(), InviteState::Pending);
    assert_eq!(account.role_code, "operator");
    assert_eq!(account.invited_by, Some(actor.id));
    assert!(!account.verified);
    assert!(account.password_hash.is_none());

    let jobs = app.queued_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, Some(NotificationKind::Invite));
    assert_eq!(jobs[0].to, "invitee@example.com");
    assert!(jobs[0].content.contains(&created.invite_id));
}

#[tokio::test]
async fn test_client_admin_invite_requires_organisation() {
    let app = TestApp::spawn();
    let actor = app.super_admin();

    let err = app
        .service
        .create_invite(&actor, invite_request("admin@client.com", Role::ClientAdmin))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OrganisationRequired));

    // Same invite with an organisation goes through.
    let mut req = invite_request("admin@client.com", Role::ClientAdmin);
    req.organisation = Some("Acme Corp".to_string());
    app.service.create_invite(&actor, req).await.unwrap();

    let account = app
        .db
        .find_by_email("admin@client.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.organisation.as_deref(), Some("Acme Corp"));
}

#[tokio::test]
async fn test_organisation_not_required_for_other_roles() {
    let app = TestApp::spawn();
    let actor = app.super_admin();

    app.service
        .create_invite(&actor, invite_request("op@example.com", Role::Operator))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_role_hierarchy_gates_invites() {
    let app = TestApp::spawn();

    // Own rank is never invitable.
    let err = app
        .service
        .create_invite(
            &app.super_admin(),
            invite_request("peer@example.com", Role::SuperAdmin),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InviteNotAuthorized));

    // client_user invites nobody.
    let err = app
        .service
        .create_invite(
            &app.actor_with_role("client_user"),
            invite_request("anyone@example.com", Role::ClientUser),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InviteNotAuthorized));

    // Unknown actor roles fail closed.
    let err = app
        .service
        .create_invite(
            &app.actor_with_role("root"),
            invite_request("anyone@example.com", Role::ClientUser),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InviteNotAuthorized));

    // Nothing was persisted or enqueued by the denied attempts.
    assert!(app
        .db
        .find_by_email("anyone@example.com")
        .await
        .unwrap()
        .is_none());
    assert!(app.queued_jobs().is_empty());
}

#[tokio::test]
async fn test_existing_email_cannot_be_invited_again() {
    let app = TestApp::spawn();
    let actor = app.super_admin();

    app.service
        .create_invite(&actor, invite_request("invitee@example.com", Role::Operator))
        .await
        .unwrap();

    let err = app
        .service
        .create_invite(&actor, invite_request("invitee@example.com", Role::Operator))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UserAlreadyExists));
}

#[tokio::test]
async fn test_malformed_invite_email_is_a_validation_error() {
    let app = TestApp::spawn();

    let err = app
        .service
        .create_invite(
            &app.super_admin(),
            invite_request("not-an-email", Role::Operator),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_revocation_expires_a_pending_invite() {
    let app = TestApp::spawn();
    let actor = app.super_admin();

    let created = app
        .service
        .create_invite(&actor, invite_request("invitee@example.com", Role::Operator))
        .await
        .unwrap();

    // Only admin ranks may revoke.
    let err = app
        .service
        .revoke_invite(&app.actor_with_role("operator"), &created.invite_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InviteNotAuthorized));

    let revoked = app
        .service
        .revoke_invite(&actor, &created.invite_id)
        .await
        .unwrap();
    assert_eq!(revoked.invite_state(), InviteState::Expired);

    // A second revocation finds nothing pending.
    let err = app
        .service
        .revoke_invite(&actor, &created.invite_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotInvited));
}

#[tokio::test]
async fn test_list_invites_filters_by_inviter_and_role() {
    let app = TestApp::spawn();
    let actor = app.super_admin();
    let other = app.super_admin();

    app.service
        .create_invite(&actor, invite_request("op1@example.com", Role::Operator))
        .await
        .unwrap();
    app.service
        .create_invite(&actor, invite_request("admin@client.com", Role::SiteAdmin))
        .await
        .unwrap();
    app.service
        .create_invite(&other, invite_request("op2@example.com", Role::Operator))
        .await
        .unwrap();

    let invites = app.service.list_invites(&actor, Role::Operator).await.unwrap();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].email, "op1@example.com");
    assert_eq!(invites[0].invite_state_code, "pending");
}
