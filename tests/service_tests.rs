mod common;

use common::{PASSWORD, test_context};
use job_board::{
    error::DomainError,
    identity::CreateUserCommand,
    models::{CreateJobOfferRequest, SoftDelete, UpdateUserRequest},
    rbac,
    repository::{JobOfferRepository, RoleRepository, UserRepository},
    workflow::{ApplicationWorkflow, ApplyToJobCommand},
};
use tokio::test;

fn command(email: &str, role_ids: Vec<i64>) -> CreateUserCommand {
    CreateUserCommand {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        name: "  Jane Doe ".to_string(),
        role_ids,
    }
}

// --- Users ---

#[test]
async fn test_create_user_normalizes_and_hashes() {
    let ctx = test_context();
    let user = ctx
        .identity()
        .create_user(command("Jane@Example.com", vec![]))
        .await
        .unwrap();

    assert_eq!(user.email().as_str(), "jane@example.com");
    assert_eq!(user.name, "Jane Doe");
    assert_ne!(user.password_hash, PASSWORD);
    assert!(user.password_hash.starts_with("$argon2id$"));
    assert!(rbac::has_role(&user, "ROLE_MEMBER"));
}

#[test]
async fn test_create_user_rejects_duplicate_email_ignoring_case() {
    let ctx = test_context();
    let identity = ctx.identity();
    identity
        .create_user(command("dup@example.com", vec![]))
        .await
        .unwrap();

    let err = identity
        .create_user(command("DUP@example.com", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));
}

#[test]
async fn test_create_user_validates_input() {
    let ctx = test_context();
    let identity = ctx.identity();

    let err = identity
        .create_user(command("not-an-email", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let mut blank_name = command("blank@example.com", vec![]);
    blank_name.name = "   ".to_string();
    let err = identity.create_user(blank_name).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let mut blank_password = command("blank@example.com", vec![]);
    blank_password.password = String::new();
    let err = identity.create_user(blank_password).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
async fn test_create_user_drops_unknown_role_ids() {
    let ctx = test_context();
    let identity = ctx.identity();
    let editor = identity.create_role("editor", None).await.unwrap();

    let user = identity
        .create_user(command("roles@example.com", vec![editor.id, 999]))
        .await
        .unwrap();

    assert_eq!(user.role_ids(), vec![editor.id]);
    assert!(rbac::has_role(&user, "EDITOR"));
}

#[test]
async fn test_authenticate() {
    let ctx = test_context();
    let identity = ctx.identity();
    let user = ctx.seed_member("login@example.com").await;

    let authenticated = identity
        .authenticate(" LOGIN@example.com", PASSWORD)
        .await
        .unwrap();
    assert_eq!(authenticated.id, user.id);

    for (email, password) in [
        ("login@example.com", "wrong password"),
        ("nobody@example.com", PASSWORD),
        ("garbage", PASSWORD),
    ] {
        let err = identity.authenticate(email, password).await.unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized));
    }

    identity.delete_user(user.id).await.unwrap();
    let err = identity
        .authenticate("login@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Unauthorized));
}

#[test]
async fn test_update_profile_changes_only_given_fields() {
    let ctx = test_context();
    let identity = ctx.identity();
    let user = ctx.seed_member("profile@example.com").await;

    let renamed = identity
        .update_profile(
            user.id,
            UpdateUserRequest {
                name: Some("Renamed".to_string()),
                password: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Renamed");
    assert_eq!(renamed.password_hash, user.password_hash);

    identity
        .update_profile(
            user.id,
            UpdateUserRequest {
                name: None,
                password: Some("new secret".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(
        identity
            .authenticate("profile@example.com", "new secret")
            .await
            .is_ok()
    );

    let err = identity
        .update_profile(
            user.id,
            UpdateUserRequest {
                name: Some(" ".to_string()),
                password: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
async fn test_delete_user_is_soft() {
    let ctx = test_context();
    let identity = ctx.identity();
    let user = ctx.seed_member("soft@example.com").await;

    identity.delete_user(user.id).await.unwrap();

    let stored = ctx.repo.find_user_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.is_deleted());
    assert!(ctx.repo.list_users().await.unwrap().is_empty());

    let err = identity.delete_user(user.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

// --- Roles & Permissions ---

#[test]
async fn test_assign_and_revoke_role_are_idempotent() {
    let ctx = test_context();
    let identity = ctx.identity();
    identity.create_role("ROLE_RECRUITER", None).await.unwrap();
    let user = ctx.seed_member("recruiter@example.com").await;

    let user = identity.assign_role(user.id, "recruiter").await.unwrap();
    assert!(rbac::has_role(&user, "RECRUITER"));
    let user = identity.assign_role(user.id, "ROLE_RECRUITER").await.unwrap();
    assert_eq!(user.role_ids().len(), 1);

    let user = identity.revoke_role(user.id, "RECRUITER").await.unwrap();
    assert!(!rbac::has_role(&user, "RECRUITER"));
    let user = identity.revoke_role(user.id, "RECRUITER").await.unwrap();
    assert!(user.role_ids().is_empty());

    let err = identity.assign_role(user.id, "UNKNOWN").await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
async fn test_create_role_strips_prefix_and_rejects_duplicates() {
    let ctx = test_context();
    let identity = ctx.identity();

    let role = identity
        .create_role("role_editor", Some("Edits".to_string()))
        .await
        .unwrap();
    assert_eq!(role.name(), "EDITOR");

    let err = identity.create_role("EDITOR", None).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));

    let err = identity.create_role("ROLE_", None).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
async fn test_permission_checks_follow_grants_and_revocations() {
    let ctx = test_context();
    let identity = ctx.identity();
    identity
        .create_permission("Job:Write", Some("Publish offers".to_string()))
        .await
        .unwrap();
    identity.create_role("EDITOR", None).await.unwrap();
    let user = ctx.seed_member("editor@example.com").await;
    identity.assign_role(user.id, "EDITOR").await.unwrap();

    assert!(!identity.user_has_permission(user.id, "job:write").await.unwrap());

    let role = identity.grant_permission("editor", "JOB:WRITE").await.unwrap();
    assert_eq!(role.permission_names(), vec!["job:write".to_string()]);
    let role = identity.grant_permission("EDITOR", "job:write").await.unwrap();
    assert_eq!(role.permission_names().len(), 1);
    assert!(identity.user_has_permission(user.id, "job:write").await.unwrap());

    identity.revoke_permission("EDITOR", "job:write").await.unwrap();
    assert!(!identity.user_has_permission(user.id, "job:write").await.unwrap());

    let err = identity
        .grant_permission("EDITOR", "job:delete")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
async fn test_deleted_role_stops_granting() {
    let ctx = test_context();
    let identity = ctx.identity();
    identity.create_permission("report:read", None).await.unwrap();
    identity.create_role("ANALYST", None).await.unwrap();
    identity
        .grant_permission("ANALYST", "report:read")
        .await
        .unwrap();
    let user = ctx.seed_member("analyst@example.com").await;
    identity.assign_role(user.id, "ANALYST").await.unwrap();
    assert!(identity.user_has_permission(user.id, "report:read").await.unwrap());

    identity.delete_role("ANALYST").await.unwrap();

    let user = identity.find_active_user(user.id).await.unwrap();
    assert!(!rbac::has_role(&user, "ANALYST"));
    assert!(!rbac::has_permission(&user, "report:read"));
    assert!(ctx.repo.list_roles().await.unwrap().is_empty());

    let err = identity.find_active_role("ANALYST").await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
async fn test_role_assignment_survives_profile_edit_while_role_is_deleted() {
    let ctx = test_context();
    let identity = ctx.identity();
    identity.create_role("RECRUITER", None).await.unwrap();
    let user = ctx.seed_member("recruiter@example.com").await;
    identity.assign_role(user.id, "RECRUITER").await.unwrap();

    identity.delete_role("RECRUITER").await.unwrap();
    let edited = identity
        .update_profile(
            user.id,
            UpdateUserRequest {
                name: Some("Renamed".to_string()),
                password: None,
            },
        )
        .await
        .unwrap();
    assert!(!rbac::has_role(&edited, "RECRUITER"));

    let mut role = ctx.repo.find_role_by_name("RECRUITER").await.unwrap().unwrap();
    role.restore();
    ctx.repo.update_role(&role).await.unwrap();

    let user = identity.find_active_user(user.id).await.unwrap();
    assert_eq!(user.name, "Renamed");
    assert!(rbac::has_role(&user, "RECRUITER"));
}

#[test]
async fn test_create_permission_rejects_duplicates() {
    let ctx = test_context();
    let identity = ctx.identity();

    let permission = identity.create_permission("User:Read", None).await.unwrap();
    assert_eq!(permission.name(), "user:read");

    let err = identity.create_permission("user:read", None).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));

    let found = identity.find_permission("USER:READ").await.unwrap();
    assert_eq!(found.id, permission.id);
}

// --- Job Catalog ---

#[test]
async fn test_create_job_offer_defaults_and_validation() {
    let ctx = test_context();
    let catalog = ctx.catalog();

    let offer = catalog
        .create_job_offer(CreateJobOfferRequest {
            title: " Platform Engineer ".to_string(),
            description: "Own the runtime".to_string(),
            company_name: Some("Acme".to_string()),
            requirements: vec!["Rust".to_string(), "  ".to_string(), " SQL ".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(offer.title, "Platform Engineer");
    assert_eq!(offer.status, "active");
    assert_eq!(offer.requirements, vec!["Rust", "SQL"]);
    assert_eq!(offer.application_count, 0);
    assert!(offer.is_open());

    let err = catalog
        .create_job_offer(CreateJobOfferRequest {
            title: "No description".to_string(),
            description: " ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
async fn test_closing_an_offer_stops_new_applications() {
    let ctx = test_context();
    let catalog = ctx.catalog();
    let first = ctx.seed_member("early@example.com").await;
    let second = ctx.seed_member("late@example.com").await;
    let offer = ctx.seed_job_offer("Short Window", "active").await;
    let workflow = ApplicationWorkflow::new(ctx.state.repo.clone(), ctx.state.events.clone());

    workflow
        .apply(ApplyToJobCommand {
            user_id: first.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap();

    let closed = catalog.set_job_offer_status(offer.id, "closed").await.unwrap();
    assert_eq!(closed.status, "closed");
    assert_eq!(closed.application_count, 1);

    let err = workflow
        .apply(ApplyToJobCommand {
            user_id: second.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ClosedJob { .. }));

    let err = catalog.set_job_offer_status(offer.id, "  ").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
async fn test_delete_job_offer_hides_it_from_listings() {
    let ctx = test_context();
    let catalog = ctx.catalog();
    let kept = ctx.seed_job_offer("Kept", "active").await;
    let removed = ctx.seed_job_offer("Removed", "active").await;

    catalog.delete_job_offer(removed.id).await.unwrap();

    let listed: Vec<i64> = ctx
        .repo
        .list_job_offers()
        .await
        .unwrap()
        .iter()
        .map(|offer| offer.id)
        .collect();
    assert_eq!(listed, vec![kept.id]);

    let err = catalog.find_active_job_offer(removed.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
async fn test_only_the_applicant_can_withdraw() {
    let ctx = test_context();
    let catalog = ctx.catalog();
    let owner = ctx.seed_member("owner@example.com").await;
    let other = ctx.seed_member("other@example.com").await;
    let offer = ctx.seed_job_offer("Contested", "active").await;
    let application = ApplicationWorkflow::new(ctx.state.repo.clone(), ctx.state.events.clone())
        .apply(ApplyToJobCommand {
            user_id: owner.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap();

    let err = catalog
        .withdraw_application(other.id, application.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let withdrawn = catalog
        .withdraw_application(owner.id, application.id)
        .await
        .unwrap();
    assert!(withdrawn.is_deleted());

    let err = catalog
        .withdraw_application(owner.id, application.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    let offer = ctx.repo.find_job_offer_by_id(offer.id).await.unwrap().unwrap();
    assert_eq!(offer.application_count, 0);
}
