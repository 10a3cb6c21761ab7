use chrono::NaiveDate;
use serde::Serialize;

use staffly_core::domain::employee::{DepartmentId, EmployeeProfile, GroupId, UserId};
use staffly_core::domain::template::{
    ApprovalStepTemplate, ApproverSpec, QuestionId, QuizQuestion, RequestKind, RequestTemplate,
    TemplateId,
};
use staffly_core::domain::vacation::{LeaveType, VacationCounters};

use crate::repositories::{
    EmployeeRepository, RepositoryError, SqlEmployeeRepository, SqlTemplateRepository,
    SqlVacationRepository, TemplateRepository, VacationRepository,
};
use crate::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub employees: usize,
    pub templates: usize,
    pub holidays: usize,
}

/// Load the deterministic demo dataset used by `staffly seed` and the smoke
/// command: a small operations department, two vacation templates (one
/// quiz-gated), an equipment template, an auto-approved template, and a
/// handful of public holidays. Safe to run repeatedly.
pub async fn seed_demo_data(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let employees = demo_employees();
    let employee_repo = SqlEmployeeRepository::new(pool.clone());
    for employee in &employees {
        employee_repo.save(employee.clone()).await?;
    }

    sqlx::query("INSERT OR IGNORE INTO group_member (group_id, user_id) VALUES ('g-hr-team', 'u-hedy')")
        .execute(pool)
        .await?;

    let vacation_repo = SqlVacationRepository::new(pool.clone());
    for counters in demo_counters() {
        if vacation_repo.counters(&counters.user_id).await?.is_none() {
            vacation_repo.save_counters(&counters).await?;
        }
    }

    let templates = demo_templates();
    let template_repo = SqlTemplateRepository::new(pool.clone());
    for template in &templates {
        // A referenced template is immutable; re-seeding must not rewrite it.
        if template_repo.reference_count(&template.id).await? == 0 {
            template_repo.save(template.clone()).await?;
        }
    }

    let holidays = demo_holidays();
    for (day, name) in &holidays {
        sqlx::query("INSERT OR IGNORE INTO holiday (day, name) VALUES (?, ?)")
            .bind(day.to_string())
            .bind(name)
            .execute(pool)
            .await?;
    }

    Ok(SeedSummary {
        employees: employees.len(),
        templates: templates.len(),
        holidays: holidays.len(),
    })
}

fn demo_employees() -> Vec<EmployeeProfile> {
    let dept = DepartmentId("dept-ops".to_string());
    vec![
        EmployeeProfile {
            id: UserId("u-ada".to_string()),
            full_name: "Ada Kowalska".to_string(),
            department_id: dept.clone(),
            role: "engineer".to_string(),
            supervisor_id: Some(UserId("u-grace".to_string())),
            active: true,
            admin: false,
        },
        EmployeeProfile {
            id: UserId("u-grace".to_string()),
            full_name: "Grace Nowak".to_string(),
            department_id: dept.clone(),
            role: "manager".to_string(),
            supervisor_id: Some(UserId("u-linus".to_string())),
            active: true,
            admin: false,
        },
        EmployeeProfile {
            id: UserId("u-linus".to_string()),
            full_name: "Linus Wiśniewski".to_string(),
            department_id: dept.clone(),
            role: "director".to_string(),
            supervisor_id: None,
            active: true,
            admin: false,
        },
        EmployeeProfile {
            id: UserId("u-hedy".to_string()),
            full_name: "Hedy Lewandowska".to_string(),
            department_id: dept,
            role: "hr_specialist".to_string(),
            supervisor_id: None,
            active: true,
            admin: true,
        },
    ]
}

fn demo_counters() -> Vec<VacationCounters> {
    let mut ada = VacationCounters::new(UserId("u-ada".to_string()), 26);
    ada.carried_over = 2;
    ada.carried_over_expiry = NaiveDate::from_ymd_opt(2025, 9, 30);

    vec![
        ada,
        VacationCounters::new(UserId("u-grace".to_string()), 26),
        VacationCounters::new(UserId("u-linus".to_string()), 26),
        VacationCounters::new(UserId("u-hedy".to_string()), 26),
    ]
}

fn demo_templates() -> Vec<RequestTemplate> {
    vec![
        RequestTemplate {
            id: TemplateId("tpl-vacation-standard".to_string()),
            name: "Annual vacation".to_string(),
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
                    approver: ApproverSpec::UserGroup {
                        group_id: GroupId("g-hr-team".to_string()),
                    },
                    requires_quiz: true,
                },
            ],
            quiz_bank: vec![
                QuizQuestion {
                    id: QuestionId("q-on-demand-cap".to_string()),
                    prompt: "How many on-demand leave days does an employee get per year?"
                        .to_string(),
                    options: vec!["2".to_string(), "4".to_string(), "unlimited".to_string()],
                    correct_option: 1,
                },
                QuizQuestion {
                    id: QuestionId("q-weekends".to_string()),
                    prompt: "Do weekends count against the vacation balance?".to_string(),
                    options: vec!["yes".to_string(), "no".to_string()],
                    correct_option: 1,
                },
            ],
            quiz_passing_score: 50,
        },
        RequestTemplate {
            id: TemplateId("tpl-vacation-on-demand".to_string()),
            name: "On-demand leave".to_string(),
            kind: RequestKind::Vacation { leave_type: LeaveType::OnDemand },
            requires_approval: true,
            steps: vec![ApprovalStepTemplate {
                ordinal: 1,
                approver: ApproverSpec::Role { role: "manager".to_string() },
                requires_quiz: false,
            }],
            quiz_bank: Vec::new(),
            quiz_passing_score: 0,
        },
        RequestTemplate {
            id: TemplateId("tpl-equipment".to_string()),
            name: "Equipment order".to_string(),
            kind: RequestKind::Equipment,
            requires_approval: true,
            steps: vec![ApprovalStepTemplate {
                ordinal: 1,
                approver: ApproverSpec::Role { role: "manager".to_string() },
                requires_quiz: false,
            }],
            quiz_bank: Vec::new(),
            quiz_passing_score: 0,
        },
        RequestTemplate {
            id: TemplateId("tpl-badge-reprint".to_string()),
            name: "Badge reprint".to_string(),
            kind: RequestKind::Other { label: "badge_reprint".to_string() },
            requires_approval: false,
            steps: Vec::new(),
            quiz_bank: Vec::new(),
            quiz_passing_score: 0,
        },
    ]
}

fn demo_holidays() -> Vec<(NaiveDate, &'static str)> {
    [
        (2025, 5, 1, "Labour Day"),
        (2025, 12, 25, "Christmas Day"),
        (2025, 12, 26, "Second Day of Christmas"),
        (2026, 1, 1, "New Year's Day"),
    ]
    .into_iter()
    .filter_map(|(y, m, d, name)| NaiveDate::from_ymd_opt(y, m, d).map(|day| (day, name)))
    .collect()
}
