use async_trait::async_trait;
use sqlx::Row;

use staffly_core::directory::DirectorySnapshot;
use staffly_core::domain::employee::{DepartmentId, EmployeeProfile, GroupId, UserId};

use super::{decode, EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_employee(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EmployeeProfile, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let full_name: String = decode(row.try_get("full_name"))?;
    let department_id: String = decode(row.try_get("department_id"))?;
    let role: String = decode(row.try_get("role"))?;
    let supervisor_id: Option<String> = decode(row.try_get("supervisor_id"))?;
    let active: i64 = decode(row.try_get("active"))?;
    let admin: i64 = decode(row.try_get("admin"))?;

    Ok(EmployeeProfile {
        id: UserId(id),
        full_name,
        department_id: DepartmentId(department_id),
        role,
        supervisor_id: supervisor_id.map(UserId),
        active: active != 0,
        admin: admin != 0,
    })
}

#[async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<EmployeeProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, full_name, department_id, role, supervisor_id, active, admin
             FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_employee(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, employee: EmployeeProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, full_name, department_id, role, supervisor_id, active, admin)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 full_name = excluded.full_name,
                 department_id = excluded.department_id,
                 role = excluded.role,
                 supervisor_id = excluded.supervisor_id,
                 active = excluded.active,
                 admin = excluded.admin",
        )
        .bind(&employee.id.0)
        .bind(&employee.full_name)
        .bind(&employee.department_id.0)
        .bind(&employee.role)
        .bind(employee.supervisor_id.as_ref().map(|id| id.0.clone()))
        .bind(i64::from(employee.active))
        .bind(i64::from(employee.admin))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn directory_snapshot(&self) -> Result<DirectorySnapshot, RepositoryError> {
        let user_rows = sqlx::query(
            "SELECT id, full_name, department_id, role, supervisor_id, active, admin
             FROM employee",
        )
        .fetch_all(&self.pool)
        .await?;
        let users =
            user_rows.iter().map(row_to_employee).collect::<Result<Vec<_>, _>>()?;

        let member_rows =
            sqlx::query("SELECT group_id, user_id FROM group_member ORDER BY group_id, user_id")
                .fetch_all(&self.pool)
                .await?;

        let mut groups: Vec<(GroupId, Vec<UserId>)> = Vec::new();
        for row in &member_rows {
            let group_id: String = decode(row.try_get("group_id"))?;
            let user_id: String = decode(row.try_get("user_id"))?;
            match groups.last_mut() {
                Some((last_id, members)) if last_id.0 == group_id => {
                    members.push(UserId(user_id));
                }
                _ => groups.push((GroupId(group_id), vec![UserId(user_id)])),
            }
        }

        Ok(DirectorySnapshot::new(users, groups))
    }
}

#[cfg(test)]
mod tests {
    use staffly_core::domain::employee::{DepartmentId, EmployeeProfile, GroupId, UserId};

    use super::SqlEmployeeRepository;
    use crate::repositories::EmployeeRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn employee(id: &str, role: &str) -> EmployeeProfile {
        EmployeeProfile {
            id: UserId(id.to_string()),
            full_name: format!("Employee {id}"),
            department_id: DepartmentId("dept-eng".to_string()),
            role: role.to_string(),
            supervisor_id: None,
            active: true,
            admin: false,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlEmployeeRepository::new(pool);

        let mut profile = employee("u-1", "engineer");
        profile.supervisor_id = Some(UserId("u-2".to_string()));
        repo.save(profile.clone()).await.expect("save");

        let found = repo.find_by_id(&UserId("u-1".to_string())).await.expect("find");
        assert_eq!(found, Some(profile));
    }

    #[tokio::test]
    async fn snapshot_includes_group_membership() {
        let pool = setup().await;
        let repo = SqlEmployeeRepository::new(pool.clone());

        repo.save(employee("u-1", "engineer")).await.expect("save u-1");
        repo.save(employee("u-2", "hr_specialist")).await.expect("save u-2");
        sqlx::query("INSERT INTO group_member (group_id, user_id) VALUES ('g-hr', 'u-2')")
            .execute(&pool)
            .await
            .expect("insert membership");

        let snapshot = repo.directory_snapshot().await.expect("snapshot");
        assert!(snapshot.user(&UserId("u-1".to_string())).is_some());
        assert_eq!(
            snapshot.group_members(&GroupId("g-hr".to_string())),
            &[UserId("u-2".to_string())]
        );
    }
}
