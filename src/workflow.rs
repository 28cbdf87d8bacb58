//! The apply-to-job use case.

use axum::extract::FromRef;

use crate::{
    AppState,
    error::{DomainError, RepositoryError},
    events::{DomainEvent, EventPublisherState, JobAppliedEvent},
    models::{JobApplication, JobOffer, NewJobApplication, SoftDelete},
    repository::RepositoryState,
};

/// ApplyToJobCommand
///
/// Who applies to what. The HTTP layer always fills `user_id` from the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyToJobCommand {
    pub user_id: i64,
    pub job_offer_id: i64,
}

/// A committed application together with the offer it was checked against.
#[derive(Debug, Clone)]
pub struct SubmittedApplication {
    pub application: JobApplication,
    pub job_offer: JobOffer,
}

/// ApplicationWorkflow
///
/// Runs the guards of an application in a fixed order (user, offer, status, duplicate), commits
/// the application and announces it. Every guard failure leaves the stores untouched.
#[derive(Clone)]
pub struct ApplicationWorkflow {
    repo: RepositoryState,
    events: EventPublisherState,
}

impl FromRef<AppState> for ApplicationWorkflow {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.repo.clone(), state.events.clone())
    }
}

impl ApplicationWorkflow {
    pub fn new(repo: RepositoryState, events: EventPublisherState) -> Self {
        Self { repo, events }
    }

    pub async fn apply(&self, command: ApplyToJobCommand) -> Result<JobApplication, DomainError> {
        self.submit(command)
            .await
            .map(|submitted| submitted.application)
    }

    /// Same as [`apply`](Self::apply), but also hands back the offer loaded by the guards.
    pub async fn submit(
        &self,
        command: ApplyToJobCommand,
    ) -> Result<SubmittedApplication, DomainError> {
        let ApplyToJobCommand {
            user_id,
            job_offer_id,
        } = command;

        let user = self.repo.find_user_by_id(user_id).await?;
        if !user.is_some_and(|user| !user.is_deleted()) {
            tracing::debug!(user_id, job_offer_id, "apply rejected: unknown user");
            return Err(DomainError::NotFound(format!(
                "User with ID {user_id} not found."
            )));
        }

        let offer = match self.repo.find_job_offer_by_id(job_offer_id).await? {
            Some(offer) if !offer.is_deleted() => offer,
            _ => {
                tracing::debug!(user_id, job_offer_id, "apply rejected: unknown job offer");
                return Err(DomainError::NotFound(format!(
                    "Job offer with ID {job_offer_id} not found."
                )));
            }
        };

        if !offer.is_open() {
            tracing::debug!(
                user_id,
                job_offer_id,
                status = %offer.status,
                "apply rejected: job offer is not active"
            );
            return Err(DomainError::ClosedJob { job_offer_id });
        }

        // Fast path only; the store constraint below is what actually closes the race.
        if self
            .repo
            .find_application_by_user_and_offer(user_id, job_offer_id)
            .await?
            .is_some()
        {
            tracing::debug!(user_id, job_offer_id, "apply rejected: already applied");
            return Err(DomainError::DuplicateApplication {
                user_id,
                job_offer_id,
            });
        }

        let application = self
            .repo
            .insert_application(NewJobApplication {
                user_id,
                job_offer_id,
            })
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => {
                    tracing::debug!(user_id, job_offer_id, "apply lost a concurrent insert race");
                    DomainError::DuplicateApplication {
                        user_id,
                        job_offer_id,
                    }
                }
                other => DomainError::Storage(other),
            })?;

        tracing::info!(
            application_id = application.id,
            user_id,
            job_offer_id,
            "job application submitted"
        );

        let event = DomainEvent::JobApplied(JobAppliedEvent::new(job_offer_id, user_id));
        if let Err(err) = self.events.publish(event) {
            tracing::warn!(
                application_id = application.id,
                error = %err,
                "job applied event was not published"
            );
        }

        Ok(SubmittedApplication {
            application,
            job_offer: offer,
        })
    }
}
