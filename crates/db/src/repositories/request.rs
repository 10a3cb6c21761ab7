use async_trait::async_trait;
use sqlx::Row;

use staffly_core::domain::employee::UserId;
use staffly_core::domain::request::{
    ApprovalStep, Request, RequestId, RequestStatus, StepId, StepStatus, VacationSpan,
};
use staffly_core::domain::template::{RequestKind, TemplateId};
use staffly_core::domain::vacation::LeaveType;

use super::{
    decode, parse_datetime, parse_opt_date, parse_opt_datetime, RepositoryError, RequestRepository,
};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let request_id: String = decode(row.try_get("request_id"))?;
    let step_order: i64 = decode(row.try_get("step_order"))?;
    let approver_id: String = decode(row.try_get("approver_id"))?;
    let requires_quiz: i64 = decode(row.try_get("requires_quiz"))?;
    let status_raw: String = decode(row.try_get("status"))?;
    let started_at: Option<String> = decode(row.try_get("started_at"))?;
    let finished_at: Option<String> = decode(row.try_get("finished_at"))?;
    let comment: Option<String> = decode(row.try_get("comment"))?;
    let quiz_score: Option<i64> = decode(row.try_get("quiz_score"))?;
    let quiz_passed: Option<i64> = decode(row.try_get("quiz_passed"))?;

    let status = StepStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status_raw}`")))?;

    Ok(ApprovalStep {
        id: StepId(id),
        request_id: RequestId(request_id),
        step_order: step_order as u32,
        approver_id: UserId(approver_id),
        requires_quiz: requires_quiz != 0,
        status,
        started_at: parse_opt_datetime(started_at),
        finished_at: parse_opt_datetime(finished_at),
        comment,
        quiz_score: quiz_score.map(|score| score as u32),
        quiz_passed: quiz_passed.map(|passed| passed != 0),
    })
}

pub(crate) fn row_to_request(
    row: &sqlx::sqlite::SqliteRow,
    steps: Vec<ApprovalStep>,
) -> Result<Request, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let template_id: String = decode(row.try_get("template_id"))?;
    let kind_raw: String = decode(row.try_get("kind"))?;
    let kind: RequestKind = decode(serde_json::from_str(&kind_raw))?;
    let submitted_by: String = decode(row.try_get("submitted_by"))?;
    let form_data_raw: String = decode(row.try_get("form_data"))?;
    let form_data: serde_json::Value = decode(serde_json::from_str(&form_data_raw))?;
    let status_raw: String = decode(row.try_get("status"))?;
    let leave_type_raw: Option<String> = decode(row.try_get("leave_type"))?;
    let start_date: Option<String> = decode(row.try_get("start_date"))?;
    let end_date: Option<String> = decode(row.try_get("end_date"))?;
    let days_count: Option<i64> = decode(row.try_get("days_count"))?;
    let submitted_at: String = decode(row.try_get("submitted_at"))?;
    let completed_at: Option<String> = decode(row.try_get("completed_at"))?;

    let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown request status `{status_raw}`"))
    })?;

    let vacation = match (leave_type_raw, parse_opt_date(start_date)?, parse_opt_date(end_date)?) {
        (Some(leave_type_raw), Some(start_date), Some(end_date)) => {
            let leave_type = LeaveType::parse(&leave_type_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown leave type `{leave_type_raw}`"))
            })?;
            Some(VacationSpan {
                leave_type,
                start_date,
                end_date,
                days_count: days_count.unwrap_or(0) as u32,
            })
        }
        _ => None,
    };

    Ok(Request {
        id: RequestId(id),
        template_id: TemplateId(template_id),
        kind,
        submitted_by: UserId(submitted_by),
        form_data,
        status,
        steps,
        vacation,
        submitted_at: parse_datetime(&submitted_at),
        completed_at: parse_opt_datetime(completed_at),
    })
}

pub(crate) const REQUEST_COLUMNS: &str = "id, template_id, kind, submitted_by, form_data, status, \
     leave_type, start_date, end_date, days_count, submitted_at, completed_at";

pub(crate) const STEP_COLUMNS: &str = "id, request_id, step_order, approver_id, requires_quiz, \
     status, started_at, finished_at, comment, quiz_score, quiz_passed";

#[async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let step_rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step WHERE request_id = ? ORDER BY step_order"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let steps = step_rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(row_to_request(&row, steps)?))
    }

    async fn save(&self, request: &Request) -> Result<(), RepositoryError> {
        let kind_raw = decode(serde_json::to_string(&request.kind))?;
        let form_data_raw = decode(serde_json::to_string(&request.form_data))?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO request (id, template_id, kind, submitted_by, form_data, status,
                                  leave_type, start_date, end_date, days_count,
                                  submitted_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 completed_at = excluded.completed_at",
        )
        .bind(&request.id.0)
        .bind(&request.template_id.0)
        .bind(&kind_raw)
        .bind(&request.submitted_by.0)
        .bind(&form_data_raw)
        .bind(request.status.as_str())
        .bind(request.vacation.as_ref().map(|span| span.leave_type.as_str()))
        .bind(request.vacation.as_ref().map(|span| span.start_date.to_string()))
        .bind(request.vacation.as_ref().map(|span| span.end_date.to_string()))
        .bind(request.vacation.as_ref().map(|span| i64::from(span.days_count)))
        .bind(request.submitted_at.to_rfc3339())
        .bind(request.completed_at.map(|at| at.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for step in &request.steps {
            sqlx::query(
                "INSERT INTO approval_step (id, request_id, step_order, approver_id, requires_quiz,
                                            status, started_at, finished_at, comment,
                                            quiz_score, quiz_passed)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     started_at = excluded.started_at,
                     finished_at = excluded.finished_at,
                     comment = excluded.comment,
                     quiz_score = excluded.quiz_score,
                     quiz_passed = excluded.quiz_passed",
            )
            .bind(&step.id.0)
            .bind(&step.request_id.0)
            .bind(i64::from(step.step_order))
            .bind(&step.approver_id.0)
            .bind(i64::from(step.requires_quiz))
            .bind(step.status.as_str())
            .bind(step.started_at.map(|at| at.to_rfc3339()))
            .bind(step.finished_at.map(|at| at.to_rfc3339()))
            .bind(step.comment.as_deref())
            .bind(step.quiz_score.map(i64::from))
            .bind(step.quiz_passed.map(i64::from))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_pending_steps(
        &self,
        approver: &UserId,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        // A step of a cancelled request can still read `in_review`; the join
        // keeps such orphans out of the approver's inbox.
        let rows = sqlx::query(
            "SELECT s.id, s.request_id, s.step_order, s.approver_id, s.requires_quiz,
                    s.status, s.started_at, s.finished_at, s.comment, s.quiz_score, s.quiz_passed
             FROM approval_step s
             JOIN request r ON r.id = s.request_id
             WHERE s.approver_id = ? AND s.status = 'in_review'
               AND r.status IN ('submitted', 'in_review')
             ORDER BY s.started_at",
        )
        .bind(&approver.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect()
    }

    async fn request_id_for_step(
        &self,
        step_id: &StepId,
    ) -> Result<Option<RequestId>, RepositoryError> {
        let request_id: Option<String> =
            sqlx::query_scalar("SELECT request_id FROM approval_step WHERE id = ?")
                .bind(&step_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request_id.map(RequestId))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use staffly_core::domain::employee::UserId;
    use staffly_core::domain::request::{
        ApprovalStep, Request, RequestId, RequestStatus, StepId, StepStatus,
    };
    use staffly_core::domain::template::{RequestKind, TemplateId};

    use super::SqlRequestRepository;
    use crate::repositories::RequestRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO employee (id, full_name, department_id, role) VALUES ('u-emp', 'Emp', 'd', 'engineer')",
        )
        .execute(&pool)
        .await
        .expect("employee");
        sqlx::query(
            "INSERT INTO request_template (id, name, kind) VALUES ('tpl-equip', 'Equipment', '{\"kind\":\"equipment\"}')",
        )
        .execute(&pool)
        .await
        .expect("template");

        pool
    }

    fn sample_request() -> Request {
        let now = Utc::now();
        Request {
            id: RequestId("REQ-1".to_string()),
            template_id: TemplateId("tpl-equip".to_string()),
            kind: RequestKind::Equipment,
            submitted_by: UserId("u-emp".to_string()),
            form_data: serde_json::json!({"item": "laptop"}),
            status: RequestStatus::Submitted,
            steps: vec![ApprovalStep {
                id: StepId("step-1".to_string()),
                request_id: RequestId("REQ-1".to_string()),
                step_order: 1,
                approver_id: UserId("u-mgr".to_string()),
                requires_quiz: false,
                status: StepStatus::InReview,
                started_at: Some(now),
                finished_at: None,
                comment: None,
                quiz_score: None,
                quiz_passed: None,
            }],
            vacation: None,
            submitted_at: now,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_the_aggregate() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);
        let request = sample_request();

        repo.save(&request).await.expect("save");
        let loaded = repo
            .find_by_id(&RequestId("REQ-1".to_string()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(loaded.id, request.id);
        assert_eq!(loaded.status, RequestStatus::Submitted);
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(loaded.steps[0].status, StepStatus::InReview);
        assert_eq!(loaded.form_data["item"], "laptop");
    }

    #[tokio::test]
    async fn pending_steps_are_listed_per_approver() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);
        repo.save(&sample_request()).await.expect("save");

        let pending =
            repo.list_pending_steps(&UserId("u-mgr".to_string())).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, StepId("step-1".to_string()));

        let none = repo.list_pending_steps(&UserId("u-hr".to_string())).await.expect("list");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn step_lookup_returns_owning_request() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool);
        repo.save(&sample_request()).await.expect("save");

        let owner = repo
            .request_id_for_step(&StepId("step-1".to_string()))
            .await
            .expect("lookup");
        assert_eq!(owner, Some(RequestId("REQ-1".to_string())));

        let missing = repo
            .request_id_for_step(&StepId("step-9".to_string()))
            .await
            .expect("lookup");
        assert_eq!(missing, None);
    }
}
