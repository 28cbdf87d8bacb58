mod common;

use common::{RecordingPublisher, SpyRepository, test_context};
use job_board::{
    catalog::CatalogService,
    error::DomainError,
    events::{self, DomainEvent, EventPublisher, EventPublisherState},
    identity::{CreateUserCommand, IdentityService},
    models::{CreateJobOfferRequest, SoftDelete},
    repository::{JobApplicationRepository, JobOfferRepository, RepositoryState},
    workflow::{ApplicationWorkflow, ApplyToJobCommand},
};
use std::sync::Arc;
use tokio::test;

fn workflow_for(ctx: &common::TestContext) -> ApplicationWorkflow {
    ApplicationWorkflow::new(ctx.state.repo.clone(), ctx.state.events.clone())
}

#[test]
async fn test_apply_creates_application_and_publishes_one_event() {
    let ctx = test_context();
    let user = ctx.seed_member("applicant@example.com").await;
    let offer = ctx.seed_job_offer("Backend Engineer", "active").await;

    let application = workflow_for(&ctx)
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap();

    assert_eq!(application.user_id, user.id);
    assert_eq!(application.job_offer_id, offer.id);
    assert!(!application.is_deleted());

    let stored = ctx
        .repo
        .find_application_by_user_and_offer(user.id, offer.id)
        .await
        .unwrap();
    assert_eq!(stored.map(|a| a.id), Some(application.id));

    let published = ctx.events.published();
    assert_eq!(published.len(), 1);
    let DomainEvent::JobApplied(event) = &published[0];
    assert_eq!(event.user_id, user.id);
    assert_eq!(event.job_offer_id, offer.id);
}

#[test]
async fn test_application_count_follows_applications() {
    let ctx = test_context();
    let first = ctx.seed_member("first@example.com").await;
    let second = ctx.seed_member("second@example.com").await;
    let offer = ctx.seed_job_offer("Designer", "active").await;
    let workflow = workflow_for(&ctx);

    for user_id in [first.id, second.id] {
        workflow
            .apply(ApplyToJobCommand {
                user_id,
                job_offer_id: offer.id,
            })
            .await
            .unwrap();
    }

    let reloaded = ctx.repo.find_job_offer_by_id(offer.id).await.unwrap().unwrap();
    assert_eq!(reloaded.application_count, 2);
}

#[test]
async fn test_duplicate_application_is_rejected_without_a_write() {
    let ctx = test_context();
    let user = ctx.seed_member("twice@example.com").await;
    let offer = ctx.seed_job_offer("Data Analyst", "active").await;
    let workflow = workflow_for(&ctx);
    let command = ApplyToJobCommand {
        user_id: user.id,
        job_offer_id: offer.id,
    };

    workflow.apply(command).await.unwrap();
    assert_eq!(ctx.repo.application_write_count(), 1);

    let err = workflow.apply(command).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::DuplicateApplication { user_id, job_offer_id }
            if user_id == user.id && job_offer_id == offer.id
    ));
    assert_eq!(ctx.repo.application_write_count(), 1);
    assert_eq!(ctx.events.published().len(), 1);
}

#[test]
async fn test_closed_offer_is_rejected_even_without_history() {
    let ctx = test_context();
    let user = ctx.seed_member("late@example.com").await;
    let offer = ctx.seed_job_offer("Closed Role", "closed").await;

    let err = workflow_for(&ctx)
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::ClosedJob { job_offer_id } if job_offer_id == offer.id));
    assert_eq!(ctx.repo.application_write_count(), 0);
    assert!(ctx.events.published().is_empty());
}

#[test]
async fn test_closed_offer_wins_over_duplicate() {
    let ctx = test_context();
    let user = ctx.seed_member("returning@example.com").await;
    let offer = ctx.seed_job_offer("Filled Role", "active").await;
    let workflow = workflow_for(&ctx);
    let command = ApplyToJobCommand {
        user_id: user.id,
        job_offer_id: offer.id,
    };

    workflow.apply(command).await.unwrap();
    ctx.catalog()
        .set_job_offer_status(offer.id, "closed")
        .await
        .unwrap();

    let err = workflow.apply(command).await.unwrap_err();
    assert!(matches!(err, DomainError::ClosedJob { job_offer_id } if job_offer_id == offer.id));
    assert_eq!(ctx.repo.application_write_count(), 1);
    assert_eq!(ctx.events.published().len(), 1);
}

#[test]
async fn test_status_match_is_exact() {
    let ctx = test_context();
    let user = ctx.seed_member("case@example.com").await;
    let offer = ctx.seed_job_offer("Capitalized", "Active").await;

    let err = workflow_for(&ctx)
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::ClosedJob { .. }));
}

#[test]
async fn test_missing_and_deleted_offers_are_not_found() {
    let ctx = test_context();
    let user = ctx.seed_member("ghost@example.com").await;
    let workflow = workflow_for(&ctx);

    let err = workflow
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: 999,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    let offer = ctx.seed_job_offer("Removed", "active").await;
    ctx.catalog().delete_job_offer(offer.id).await.unwrap();

    let err = workflow
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
    assert_eq!(ctx.repo.application_write_count(), 0);
}

#[test]
async fn test_unknown_user_fails_before_the_offer_is_loaded() {
    let spy = Arc::new(SpyRepository::new(false));
    let repo: RepositoryState = spy.clone();
    let events: EventPublisherState = Arc::new(RecordingPublisher::default());
    let workflow = ApplicationWorkflow::new(repo, events);

    let err = workflow
        .apply(ApplyToJobCommand {
            user_id: 404,
            job_offer_id: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::NotFound(_)));
    assert_eq!(spy.calls(), vec!["find_user_by_id"]);
}

#[test]
async fn test_deleted_user_cannot_apply() {
    let ctx = test_context();
    let user = ctx.seed_member("gone@example.com").await;
    let offer = ctx.seed_job_offer("Open Role", "active").await;
    ctx.identity().delete_user(user.id).await.unwrap();

    let err = workflow_for(&ctx)
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
async fn test_store_conflict_is_reported_as_duplicate() {
    // The spy's duplicate lookup always misses, so only the store constraint can catch
    // the second application.
    let spy = Arc::new(SpyRepository::new(true));
    let repo: RepositoryState = spy.clone();
    let identity = IdentityService::new(repo.clone(), common::fast_hasher());
    let catalog = CatalogService::new(repo.clone());

    let user = identity
        .create_user(CreateUserCommand {
            email: "racer@example.com".to_string(),
            password: common::PASSWORD.to_string(),
            name: "Racer".to_string(),
            role_ids: vec![],
        })
        .await
        .unwrap();
    let offer = catalog
        .create_job_offer(CreateJobOfferRequest {
            title: "Contested".to_string(),
            description: "Everyone wants it".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let events: EventPublisherState = publisher.clone();
    let workflow = ApplicationWorkflow::new(repo, events);
    let command = ApplyToJobCommand {
        user_id: user.id,
        job_offer_id: offer.id,
    };

    workflow.apply(command).await.unwrap();
    let err = workflow.apply(command).await.unwrap_err();

    assert!(matches!(err, DomainError::DuplicateApplication { .. }));
    assert_eq!(spy.inner.application_write_count(), 1);
    assert_eq!(publisher.published().len(), 1);
}

#[test]
async fn test_publish_failure_does_not_fail_the_application() {
    let ctx = test_context();
    let user = ctx.seed_member("quiet@example.com").await;
    let offer = ctx.seed_job_offer("Silent Role", "active").await;

    let events: EventPublisherState = Arc::new(RecordingPublisher::failing());
    let workflow = ApplicationWorkflow::new(ctx.state.repo.clone(), events);

    let application = workflow
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap();

    assert_eq!(application.job_offer_id, offer.id);
    assert_eq!(ctx.repo.application_write_count(), 1);
}

#[test]
async fn test_workflow_never_changes_the_offer() {
    let spy = Arc::new(SpyRepository::new(false));
    let repo: RepositoryState = spy.clone();
    let identity = IdentityService::new(repo.clone(), common::fast_hasher());
    let catalog = CatalogService::new(repo.clone());

    let user = identity
        .create_user(CreateUserCommand {
            email: "reader@example.com".to_string(),
            password: common::PASSWORD.to_string(),
            name: "Reader".to_string(),
            role_ids: vec![],
        })
        .await
        .unwrap();
    let offer = catalog
        .create_job_offer(CreateJobOfferRequest {
            title: "Stable".to_string(),
            description: "Untouched".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let events: EventPublisherState = Arc::new(RecordingPublisher::default());
    ApplicationWorkflow::new(repo, events)
        .apply(ApplyToJobCommand {
            user_id: user.id,
            job_offer_id: offer.id,
        })
        .await
        .unwrap();

    assert_eq!(
        spy.calls(),
        vec![
            "find_user_by_id",
            "find_job_offer_by_id",
            "find_application_by_user_and_offer",
            "insert_application",
        ]
    );
}

#[test]
async fn test_withdrawn_application_allows_reapplying() {
    let ctx = test_context();
    let user = ctx.seed_member("again@example.com").await;
    let offer = ctx.seed_job_offer("Second Chance", "active").await;
    let workflow = workflow_for(&ctx);
    let command = ApplyToJobCommand {
        user_id: user.id,
        job_offer_id: offer.id,
    };

    let first = workflow.apply(command).await.unwrap();
    ctx.catalog()
        .withdraw_application(user.id, first.id)
        .await
        .unwrap();

    let second = workflow.apply(command).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(ctx.events.published().len(), 2);
}

#[test]
async fn test_full_event_channel_does_not_block_the_applicant() {
    let ctx = test_context();
    let first = ctx.seed_member("one@example.com").await;
    let second = ctx.seed_member("two@example.com").await;
    let offer = ctx.seed_job_offer("Busy Role", "active").await;

    let (publisher, mut receiver) = events::event_channel(1);
    let workflow = ApplicationWorkflow::new(ctx.state.repo.clone(), Arc::new(publisher));

    for user_id in [first.id, second.id] {
        workflow
            .apply(ApplyToJobCommand {
                user_id,
                job_offer_id: offer.id,
            })
            .await
            .unwrap();
    }

    // Only the first event fit; the second was dropped with a warning.
    let DomainEvent::JobApplied(event) = receiver.try_recv().unwrap();
    assert_eq!(event.user_id, first.id);
    assert!(receiver.try_recv().is_err());
    assert_eq!(ctx.repo.application_write_count(), 2);
}

#[test]
async fn test_event_listener_drains_until_publishers_drop() {
    let (publisher, receiver) = events::event_channel(8);
    let listener = events::spawn_event_listener(receiver);

    let event = DomainEvent::JobApplied(events::JobAppliedEvent::new(3, 5));
    assert_eq!(event.name(), "job_applied");
    publisher.publish(event).unwrap();

    drop(publisher);
    listener.await.unwrap();
}
