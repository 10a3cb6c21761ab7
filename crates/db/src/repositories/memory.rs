use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use staffly_core::directory::DirectorySnapshot;
use staffly_core::domain::employee::{EmployeeProfile, GroupId, UserId};
use staffly_core::domain::template::{RequestTemplate, TemplateId};

use super::{EmployeeRepository, RepositoryError, TemplateRepository};

/// Directory fake for tests that exercise repository-consuming code without
/// a database.
#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    users: Mutex<HashMap<String, EmployeeProfile>>,
    groups: Mutex<Vec<(GroupId, Vec<UserId>)>>,
}

impl InMemoryEmployeeRepository {
    pub fn with_users(users: Vec<EmployeeProfile>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for user in users {
                map.insert(user.id.0.clone(), user);
            }
        }
        repo
    }

    pub fn add_group(&self, group_id: GroupId, members: Vec<UserId>) {
        self.groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((group_id, members));
    }
}

#[async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<EmployeeProfile>, RepositoryError> {
        Ok(self
            .users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id.0)
            .cloned())
    }

    async fn save(&self, employee: EmployeeProfile) -> Result<(), RepositoryError> {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn directory_snapshot(&self) -> Result<DirectorySnapshot, RepositoryError> {
        let users = self
            .users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        let groups =
            self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
        Ok(DirectorySnapshot::new(users, groups))
    }
}

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: Mutex<HashMap<String, RequestTemplate>>,
    reference_counts: Mutex<HashMap<String, i64>>,
}

impl InMemoryTemplateRepository {
    pub fn with_templates(templates: Vec<RequestTemplate>) -> Self {
        let repo = Self::default();
        {
            let mut map =
                repo.templates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for template in templates {
                map.insert(template.id.0.clone(), template);
            }
        }
        repo
    }

    pub fn set_reference_count(&self, id: &TemplateId, count: i64) {
        self.reference_counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.0.clone(), count);
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find_by_id(
        &self,
        id: &TemplateId,
    ) -> Result<Option<RequestTemplate>, RepositoryError> {
        Ok(self
            .templates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id.0)
            .cloned())
    }

    async fn save(&self, template: RequestTemplate) -> Result<(), RepositoryError> {
        self.templates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(template.id.0.clone(), template);
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
        self.templates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id.0);
        Ok(())
    }

    async fn reference_count(&self, id: &TemplateId) -> Result<i64, RepositoryError> {
        Ok(self
            .reference_counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id.0)
            .copied()
            .unwrap_or(0))
    }
}
