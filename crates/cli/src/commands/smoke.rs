use std::sync::Arc;
use std::time::Instant;

use crate::commands::{build_runtime, CommandResult};
use serde::Serialize;
use staffly_core::config::{AppConfig, LoadOptions};
use staffly_core::domain::employee::UserId;
use staffly_core::domain::request::RequestStatus;
use staffly_core::domain::template::TemplateId;
use staffly_core::notify::InMemoryNotificationDispatcher;
use staffly_core::workflow::QuizAnswer;
use staffly_db::{connect, connect_with_settings, migrations, seed_demo_data, ApprovalService};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("approval_flow"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("approval_flow"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async { connect(&config.database).await });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("approval_flow"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    runtime.block_on(async {
        pool.close().await;
    });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("approval_flow"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    // End-to-end drill against a throwaway in-memory database so the real
    // data set is never touched: seed, submit a vacation request, walk it
    // through both approval steps, and verify the ledger commit.
    let flow_started = Instant::now();
    let flow_result = runtime.block_on(approval_flow_drill(&config));
    match flow_result {
        Ok(message) => checks.push(SmokeCheck {
            name: "approval_flow",
            status: SmokeStatus::Pass,
            elapsed_ms: flow_started.elapsed().as_millis() as u64,
            message,
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "approval_flow",
            status: SmokeStatus::Fail,
            elapsed_ms: flow_started.elapsed().as_millis() as u64,
            message: error,
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

async fn approval_flow_drill(config: &AppConfig) -> Result<String, String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5)
        .await
        .map_err(|error| format!("scratch database connect failed: {error}"))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| format!("scratch migrations failed: {error}"))?;
    seed_demo_data(&pool).await.map_err(|error| format!("scratch seed failed: {error}"))?;

    let service = ApprovalService::new(
        pool.clone(),
        &config.vacation,
        Arc::new(InMemoryNotificationDispatcher::default()),
    );

    let monday = next_monday();
    let request_id = service
        .submit_request(
            &TemplateId("tpl-vacation-standard".to_string()),
            &UserId("u-ada".to_string()),
            serde_json::json!({"note": "smoke drill"}),
            Some(staffly_core::workflow::VacationDates {
                start_date: monday,
                end_date: monday + chrono::Duration::days(2),
            }),
        )
        .await
        .map_err(|error| format!("submission failed: {error}"))?;

    let request = service
        .get_request(&request_id)
        .await
        .map_err(|error| format!("request load failed: {error}"))?;
    let mut step_ids: Vec<_> = request.steps.iter().map(|step| step.id.clone()).collect();
    step_ids.sort_by_key(|step_id| {
        request.step(step_id).map(|step| step.step_order).unwrap_or(u32::MAX)
    });

    service
        .approve_step(
            &request_id,
            &step_ids[0],
            &UserId("u-grace".to_string()),
            Some("smoke drill".to_string()),
            Vec::new(),
        )
        .await
        .map_err(|error| format!("manager approval failed: {error}"))?;

    let answers = vec![
        QuizAnswer {
            question_id: staffly_core::domain::template::QuestionId(
                "q-on-demand-cap".to_string(),
            ),
            selected_option: 1,
        },
        QuizAnswer {
            question_id: staffly_core::domain::template::QuestionId("q-weekends".to_string()),
            selected_option: 1,
        },
    ];
    let decision = service
        .approve_step(&request_id, &step_ids[1], &UserId("u-hedy".to_string()), None, answers)
        .await
        .map_err(|error| format!("hr approval failed: {error}"))?;

    if decision.request_status != RequestStatus::Approved {
        return Err(format!(
            "expected the request to finish approved, found {}",
            decision.request_status.as_str()
        ));
    }

    let summary = service
        .vacation_summary(&UserId("u-ada".to_string()))
        .await
        .map_err(|error| format!("summary failed: {error}"))?;
    if summary.used != 3 {
        return Err(format!("expected 3 committed days, found {}", summary.used));
    }

    pool.close().await;
    Ok("submitted, approved twice, and committed 3 vacation days".to_string())
}

/// The next Monday strictly after today, keeping the drill span inside
/// business days regardless of when smoke runs.
fn next_monday() -> chrono::NaiveDate {
    use chrono::Datelike;

    let mut day = chrono::Utc::now().date_naive() + chrono::Duration::days(1);
    while day.weekday() != chrono::Weekday::Mon {
        day += chrono::Duration::days(1);
    }
    day
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
