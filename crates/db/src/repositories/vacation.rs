use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use staffly_core::domain::employee::UserId;
use staffly_core::domain::request::RequestId;
use staffly_core::domain::vacation::{
    LeaveType, ScheduleId, ScheduleStatus, VacationCounters, VacationSchedule,
};

use super::{
    decode, parse_date, parse_datetime, parse_opt_date, RepositoryError, VacationRepository,
};
use crate::DbPool;

pub struct SqlVacationRepository {
    pool: DbPool,
}

impl SqlVacationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_counters(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<VacationCounters, RepositoryError> {
    let user_id: String = decode(row.try_get("user_id"))?;
    let annual_entitlement: i64 = decode(row.try_get("annual_entitlement"))?;
    let used: i64 = decode(row.try_get("used"))?;
    let on_demand_used: i64 = decode(row.try_get("on_demand_used"))?;
    let circumstantial_used: i64 = decode(row.try_get("circumstantial_used"))?;
    let carried_over: i64 = decode(row.try_get("carried_over"))?;
    let carried_over_expiry: Option<String> = decode(row.try_get("carried_over_expiry"))?;

    Ok(VacationCounters {
        user_id: UserId(user_id),
        annual_entitlement: annual_entitlement as u32,
        used,
        on_demand_used,
        circumstantial_used,
        carried_over: carried_over as u32,
        carried_over_expiry: parse_opt_date(carried_over_expiry)?,
    })
}

pub(crate) fn row_to_schedule(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<VacationSchedule, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let request_id: String = decode(row.try_get("request_id"))?;
    let user_id: String = decode(row.try_get("user_id"))?;
    let leave_type_raw: String = decode(row.try_get("leave_type"))?;
    let start_date: String = decode(row.try_get("start_date"))?;
    let end_date: String = decode(row.try_get("end_date"))?;
    let days_count: i64 = decode(row.try_get("days_count"))?;
    let status_raw: String = decode(row.try_get("status"))?;
    let created_at: String = decode(row.try_get("created_at"))?;

    let leave_type = LeaveType::parse(&leave_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown leave type `{leave_type_raw}`"))
    })?;
    let status = ScheduleStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown schedule status `{status_raw}`"))
    })?;

    Ok(VacationSchedule {
        id: ScheduleId(id),
        request_id: RequestId(request_id),
        user_id: UserId(user_id),
        leave_type,
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        days_count: days_count as u32,
        status,
        created_at: parse_datetime(&created_at),
    })
}

pub(crate) const SCHEDULE_COLUMNS: &str =
    "id, request_id, user_id, leave_type, start_date, end_date, days_count, status, created_at";

#[async_trait]
impl VacationRepository for SqlVacationRepository {
    async fn counters(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VacationCounters>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, annual_entitlement, used, on_demand_used, circumstantial_used,
                    carried_over, carried_over_expiry
             FROM vacation_counters WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_counters(row)?)),
            None => Ok(None),
        }
    }

    async fn save_counters(&self, counters: &VacationCounters) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO vacation_counters (user_id, annual_entitlement, used, on_demand_used,
                                            circumstantial_used, carried_over, carried_over_expiry)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 annual_entitlement = excluded.annual_entitlement,
                 used = excluded.used,
                 on_demand_used = excluded.on_demand_used,
                 circumstantial_used = excluded.circumstantial_used,
                 carried_over = excluded.carried_over,
                 carried_over_expiry = excluded.carried_over_expiry",
        )
        .bind(&counters.user_id.0)
        .bind(i64::from(counters.annual_entitlement))
        .bind(counters.used)
        .bind(counters.on_demand_used)
        .bind(counters.circumstantial_used)
        .bind(i64::from(counters.carried_over))
        .bind(counters.carried_over_expiry.map(|date| date.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn schedules_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<VacationSchedule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedule
             WHERE user_id = ? ORDER BY start_date"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_schedule).collect()
    }

    async fn holidays(&self) -> Result<Vec<NaiveDate>, RepositoryError> {
        let rows = sqlx::query("SELECT day FROM holiday ORDER BY day")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let day: String = decode(row.try_get("day"))?;
                parse_date(&day)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use staffly_core::domain::employee::UserId;
    use staffly_core::domain::vacation::VacationCounters;

    use super::SqlVacationRepository;
    use crate::repositories::VacationRepository;
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
        pool
    }

    #[tokio::test]
    async fn counters_round_trip_including_expiry() {
        let pool = setup().await;
        let repo = SqlVacationRepository::new(pool);

        let counters = VacationCounters {
            user_id: UserId("u-emp".to_string()),
            annual_entitlement: 26,
            used: 4,
            on_demand_used: 1,
            circumstantial_used: 0,
            carried_over: 3,
            carried_over_expiry: NaiveDate::from_ymd_opt(2025, 9, 30),
        };
        repo.save_counters(&counters).await.expect("save");

        let loaded = repo
            .counters(&UserId("u-emp".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(loaded, counters);
    }

    #[tokio::test]
    async fn holidays_are_loaded_ordered() {
        let pool = setup().await;
        let repo = SqlVacationRepository::new(pool.clone());

        sqlx::query("INSERT INTO holiday (day, name) VALUES ('2025-12-25', 'Christmas Day')")
            .execute(&pool)
            .await
            .expect("insert");
        sqlx::query("INSERT INTO holiday (day, name) VALUES ('2025-05-01', 'Labour Day')")
            .execute(&pool)
            .await
            .expect("insert");

        let holidays = repo.holidays().await.expect("load");
        assert_eq!(
            holidays,
            vec![
                NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid"),
                NaiveDate::from_ymd_opt(2025, 12, 25).expect("valid"),
            ]
        );
    }
}
