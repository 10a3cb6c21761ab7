use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use staffly_core::directory::DirectorySnapshot;
use staffly_core::domain::employee::{EmployeeProfile, UserId};
use staffly_core::domain::request::{ApprovalStep, Request, RequestId, StepId};
use staffly_core::domain::template::{RequestTemplate, TemplateId};
use staffly_core::domain::vacation::{VacationCounters, VacationSchedule};

pub mod employee;
pub mod memory;
pub mod request;
pub mod template;
pub mod vacation;

pub use employee::SqlEmployeeRepository;
pub use memory::{InMemoryEmployeeRepository, InMemoryTemplateRepository};
pub use request::SqlRequestRepository;
pub use template::SqlTemplateRepository;
pub use vacation::SqlVacationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<EmployeeProfile>, RepositoryError>;
    async fn save(&self, employee: EmployeeProfile) -> Result<(), RepositoryError>;
    /// Load the whole directory as the point-in-time snapshot consumed by
    /// approver resolution.
    async fn directory_snapshot(&self) -> Result<DirectorySnapshot, RepositoryError>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &TemplateId)
        -> Result<Option<RequestTemplate>, RepositoryError>;
    async fn save(&self, template: RequestTemplate) -> Result<(), RepositoryError>;
    /// Templates referenced by requests are immutable; delete fails with
    /// `Conflict` while any request points at the template.
    async fn delete(&self, id: &TemplateId) -> Result<(), RepositoryError>;
    async fn reference_count(&self, id: &TemplateId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn save(&self, request: &Request) -> Result<(), RepositoryError>;
    async fn list_pending_steps(
        &self,
        approver: &UserId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError>;
    async fn request_id_for_step(
        &self,
        step_id: &StepId,
    ) -> Result<Option<RequestId>, RepositoryError>;
}

#[async_trait]
pub trait VacationRepository: Send + Sync {
    async fn counters(&self, user_id: &UserId)
        -> Result<Option<VacationCounters>, RepositoryError>;
    async fn save_counters(&self, counters: &VacationCounters) -> Result<(), RepositoryError>;
    async fn schedules_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<VacationSchedule>, RepositoryError>;
    async fn holidays(&self) -> Result<Vec<NaiveDate>, RepositoryError>;
}

pub(crate) fn decode<T, E: std::fmt::Display>(
    result: Result<T, E>,
) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    raw.parse::<NaiveDate>()
        .map_err(|_| RepositoryError::Decode(format!("invalid date `{raw}`")))
}

pub(crate) fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>, RepositoryError> {
    raw.map(|value| parse_date(&value)).transpose()
}
