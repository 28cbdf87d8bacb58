//! Job catalog use cases: offers and application withdrawal.

use axum::extract::FromRef;

use crate::{
    AppState,
    error::DomainError,
    models::{
        CreateJobOfferRequest, JobApplication, JobOffer, NewJobOffer, STATUS_ACTIVE, SoftDelete,
    },
    repository::RepositoryState,
};

/// CatalogService
///
/// Administrative changes to job offers, plus the applicant's own withdrawal.
#[derive(Clone)]
pub struct CatalogService {
    repo: RepositoryState,
}

impl FromRef<AppState> for CatalogService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.repo.clone())
    }
}

impl CatalogService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn find_active_job_offer(&self, job_offer_id: i64) -> Result<JobOffer, DomainError> {
        match self.repo.find_job_offer_by_id(job_offer_id).await? {
            Some(offer) if !offer.is_deleted() => Ok(offer),
            _ => Err(DomainError::NotFound(format!(
                "Job offer with ID {job_offer_id} not found."
            ))),
        }
    }

    /// Publishes an offer. The status defaults to `active`; blank requirement lines are dropped.
    pub async fn create_job_offer(
        &self,
        request: CreateJobOfferRequest,
    ) -> Result<JobOffer, DomainError> {
        let title = request.title.trim();
        let description = request.description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(DomainError::Validation(
                "Title and description are required.".to_string(),
            ));
        }

        let status = match request.status.as_deref().map(str::trim) {
            Some(status) if !status.is_empty() => status.to_string(),
            _ => STATUS_ACTIVE.to_string(),
        };

        let offer = self
            .repo
            .insert_job_offer(NewJobOffer {
                title: title.to_string(),
                description: description.to_string(),
                company_name: request.company_name,
                location: request.location,
                salary_range: request.salary_range,
                employment_type: request.employment_type,
                status,
                requirements: request
                    .requirements
                    .iter()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .await?;

        tracing::info!(job_offer_id = offer.id, title = %offer.title, "job offer created");
        Ok(offer)
    }

    /// Any non-blank status is accepted; only `active` lets new applications in.
    pub async fn set_job_offer_status(
        &self,
        job_offer_id: i64,
        status: &str,
    ) -> Result<JobOffer, DomainError> {
        let status = status.trim();
        if status.is_empty() {
            return Err(DomainError::Validation("Status must not be blank.".to_string()));
        }

        let mut offer = self.find_active_job_offer(job_offer_id).await?;
        offer.status = status.to_string();
        self.repo.update_job_offer(&offer).await?;

        tracing::info!(job_offer_id, status, "job offer status changed");
        self.find_active_job_offer(job_offer_id).await
    }

    pub async fn delete_job_offer(&self, job_offer_id: i64) -> Result<(), DomainError> {
        let mut offer = self.find_active_job_offer(job_offer_id).await?;
        offer.soft_delete();
        self.repo.update_job_offer(&offer).await?;
        tracing::info!(job_offer_id, "job offer soft-deleted");
        Ok(())
    }

    /// Soft-deletes the caller's own application. Once withdrawn, the same user may apply again.
    pub async fn withdraw_application(
        &self,
        user_id: i64,
        application_id: i64,
    ) -> Result<JobApplication, DomainError> {
        let mut application = match self.repo.find_application_by_id(application_id).await? {
            Some(application) if !application.is_deleted() => application,
            _ => {
                return Err(DomainError::NotFound(format!(
                    "Job application with ID {application_id} not found."
                )));
            }
        };

        if application.user_id != user_id {
            return Err(DomainError::Forbidden(
                "Only the applicant may withdraw an application.".to_string(),
            ));
        }

        application.soft_delete();
        self.repo.update_application(&application).await?;
        tracing::info!(application_id, user_id, "job application withdrawn");
        Ok(application)
    }
}
