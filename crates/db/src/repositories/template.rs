use async_trait::async_trait;
use sqlx::Row;

use staffly_core::domain::template::{
    ApprovalStepTemplate, ApproverSpec, QuestionId, QuizQuestion, RequestKind, RequestTemplate,
    TemplateId,
};

use super::{decode, RepositoryError, TemplateRepository};
use crate::DbPool;

pub struct SqlTemplateRepository {
    pool: DbPool,
}

impl SqlTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Load a full template aggregate: header row, ordered step templates and the
/// quiz bank. Shared with the approval service, which may read templates
/// outside its transactions since a referenced template is immutable.
pub(crate) async fn load_template<'e, E>(
    executor: E,
    id: &TemplateId,
) -> Result<Option<RequestTemplate>, RepositoryError>
where
    E: sqlx::SqliteExecutor<'e> + Copy,
{
    let header = sqlx::query(
        "SELECT id, name, kind, requires_approval, quiz_passing_score
         FROM request_template WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(executor)
    .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let name: String = decode(header.try_get("name"))?;
    let kind_raw: String = decode(header.try_get("kind"))?;
    let kind: RequestKind = decode(serde_json::from_str(&kind_raw))?;
    let requires_approval: i64 = decode(header.try_get("requires_approval"))?;
    let quiz_passing_score: i64 = decode(header.try_get("quiz_passing_score"))?;

    let step_rows = sqlx::query(
        "SELECT ordinal, approver, requires_quiz
         FROM approval_step_template WHERE template_id = ? ORDER BY ordinal",
    )
    .bind(&id.0)
    .fetch_all(executor)
    .await?;

    let mut steps = Vec::with_capacity(step_rows.len());
    for row in &step_rows {
        let ordinal: i64 = decode(row.try_get("ordinal"))?;
        let approver_raw: String = decode(row.try_get("approver"))?;
        let approver: ApproverSpec = decode(serde_json::from_str(&approver_raw))?;
        let requires_quiz: i64 = decode(row.try_get("requires_quiz"))?;
        steps.push(ApprovalStepTemplate {
            ordinal: ordinal as u32,
            approver,
            requires_quiz: requires_quiz != 0,
        });
    }

    let question_rows = sqlx::query(
        "SELECT id, prompt, options, correct_option
         FROM quiz_question WHERE template_id = ? ORDER BY position",
    )
    .bind(&id.0)
    .fetch_all(executor)
    .await?;

    let mut quiz_bank = Vec::with_capacity(question_rows.len());
    for row in &question_rows {
        let question_id: String = decode(row.try_get("id"))?;
        let prompt: String = decode(row.try_get("prompt"))?;
        let options_raw: String = decode(row.try_get("options"))?;
        let options: Vec<String> = decode(serde_json::from_str(&options_raw))?;
        let correct_option: i64 = decode(row.try_get("correct_option"))?;
        quiz_bank.push(QuizQuestion {
            id: QuestionId(question_id),
            prompt,
            options,
            correct_option: correct_option as u32,
        });
    }

    Ok(Some(RequestTemplate {
        id: id.clone(),
        name,
        kind,
        requires_approval: requires_approval != 0,
        steps,
        quiz_bank,
        quiz_passing_score: quiz_passing_score as u32,
    }))
}

#[async_trait]
impl TemplateRepository for SqlTemplateRepository {
    async fn find_by_id(
        &self,
        id: &TemplateId,
    ) -> Result<Option<RequestTemplate>, RepositoryError> {
        load_template(&self.pool, id).await
    }

    async fn save(&self, template: RequestTemplate) -> Result<(), RepositoryError> {
        let kind_raw = decode(serde_json::to_string(&template.kind))?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO request_template (id, name, kind, requires_approval, quiz_passing_score)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 kind = excluded.kind,
                 requires_approval = excluded.requires_approval,
                 quiz_passing_score = excluded.quiz_passing_score",
        )
        .bind(&template.id.0)
        .bind(&template.name)
        .bind(&kind_raw)
        .bind(i64::from(template.requires_approval))
        .bind(i64::from(template.quiz_passing_score))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM approval_step_template WHERE template_id = ?")
            .bind(&template.id.0)
            .execute(&mut *tx)
            .await?;
        for step in &template.steps {
            let approver_raw = decode(serde_json::to_string(&step.approver))?;
            sqlx::query(
                "INSERT INTO approval_step_template (template_id, ordinal, approver, requires_quiz)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&template.id.0)
            .bind(i64::from(step.ordinal))
            .bind(&approver_raw)
            .bind(i64::from(step.requires_quiz))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM quiz_question WHERE template_id = ?")
            .bind(&template.id.0)
            .execute(&mut *tx)
            .await?;
        for (position, question) in template.quiz_bank.iter().enumerate() {
            let options_raw = decode(serde_json::to_string(&question.options))?;
            sqlx::query(
                "INSERT INTO quiz_question (id, template_id, position, prompt, options, correct_option)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&question.id.0)
            .bind(&template.id.0)
            .bind(position as i64)
            .bind(&question.prompt)
            .bind(&options_raw)
            .bind(i64::from(question.correct_option))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &TemplateId) -> Result<(), RepositoryError> {
        let references = self.reference_count(id).await?;
        if references > 0 {
            return Err(RepositoryError::Conflict(format!(
                "template {} is referenced by {references} request(s) and cannot be deleted",
                id.0
            )));
        }

        sqlx::query("DELETE FROM request_template WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reference_count(&self, id: &TemplateId) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM request WHERE template_id = ?")
                .bind(&id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use staffly_core::domain::employee::UserId;
    use staffly_core::domain::template::{
        ApprovalStepTemplate, ApproverSpec, QuestionId, QuizQuestion, RequestKind, RequestTemplate,
        TemplateId,
    };
    use staffly_core::domain::vacation::LeaveType;

    use super::SqlTemplateRepository;
    use crate::repositories::{RepositoryError, TemplateRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_template() -> RequestTemplate {
        RequestTemplate {
            id: TemplateId("tpl-vacation".to_string()),
            name: "Vacation".to_string(),
            kind: RequestKind::Vacation { leave_type: LeaveType::Standard },
            requires_approval: true,
            steps: vec![
                ApprovalStepTemplate {
                    ordinal: 1,
                    approver: ApproverSpec::Role { role: "manager".to_string() },
                    requires_quiz: false,
                },
                ApprovalStepTemplate {
                    ordinal: 2,
                    approver: ApproverSpec::SpecificUser { user_id: UserId("u-hr".to_string()) },
                    requires_quiz: true,
                },
            ],
            quiz_bank: vec![QuizQuestion {
                id: QuestionId("q1".to_string()),
                prompt: "How many on-demand days per year?".to_string(),
                options: vec!["2".to_string(), "4".to_string()],
                correct_option: 1,
            }],
            quiz_passing_score: 100,
        }
    }

    #[tokio::test]
    async fn save_and_load_full_aggregate() {
        let pool = setup().await;
        let repo = SqlTemplateRepository::new(pool);
        let template = sample_template();

        repo.save(template.clone()).await.expect("save");
        let loaded = repo
            .find_by_id(&TemplateId("tpl-vacation".to_string()))
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(loaded, template);
    }

    #[tokio::test]
    async fn delete_is_blocked_while_requests_reference_the_template() {
        let pool = setup().await;
        let repo = SqlTemplateRepository::new(pool.clone());
        repo.save(sample_template()).await.expect("save");

        sqlx::query(
            "INSERT INTO employee (id, full_name, department_id, role) VALUES ('u-1', 'U One', 'd', 'engineer')",
        )
        .execute(&pool)
        .await
        .expect("employee");
        sqlx::query(
            "INSERT INTO request (id, template_id, kind, submitted_by, form_data, status, submitted_at)
             VALUES ('REQ-1', 'tpl-vacation', '{}', 'u-1', '{}', 'submitted', '2025-06-01T09:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("request");

        let error = repo
            .delete(&TemplateId("tpl-vacation".to_string()))
            .await
            .expect_err("delete must be blocked");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        sqlx::query("DELETE FROM request WHERE id = 'REQ-1'")
            .execute(&pool)
            .await
            .expect("clear request");
        repo.delete(&TemplateId("tpl-vacation".to_string()))
            .await
            .expect("delete succeeds once unreferenced");
    }
}
