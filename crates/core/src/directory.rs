use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::employee::{normalize_key, DepartmentId, EmployeeProfile, GroupId, UserId};

/// Point-in-time copy of the employee directory consumed by approver
/// resolution. The live directory is an external collaborator; the engine
/// only sees this snapshot, so resolution stays a pure function.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    users: HashMap<String, EmployeeProfile>,
    groups: HashMap<String, Vec<UserId>>,
}

impl DirectorySnapshot {
    pub fn new(users: Vec<EmployeeProfile>, groups: Vec<(GroupId, Vec<UserId>)>) -> Self {
        Self {
            users: users.into_iter().map(|user| (user.id.0.clone(), user)).collect(),
            groups: groups.into_iter().map(|(id, members)| (id.0, members)).collect(),
        }
    }

    pub fn user(&self, id: &UserId) -> Option<&EmployeeProfile> {
        self.users.get(&id.0)
    }

    pub fn active_user(&self, id: &UserId) -> Option<&EmployeeProfile> {
        self.user(id).filter(|user| user.active)
    }

    pub fn group_members(&self, id: &GroupId) -> &[UserId] {
        self.groups.get(&id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Supervisor chain from the given user upward, nearest first. Guards
    /// against cycles in the supervisor graph.
    pub fn supervisor_chain(&self, user_id: &UserId) -> Vec<UserId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = user_id.clone();

        loop {
            if !visited.insert(current.clone()) {
                break;
            }

            let Some(user) = self.user(&current) else {
                break;
            };
            let Some(supervisor_id) = &user.supervisor_id else {
                break;
            };

            chain.push(supervisor_id.clone());
            current = supervisor_id.clone();
        }

        chain
    }

    /// Active holders of `role` within a department, ordered by user id so
    /// callers get a deterministic pick.
    pub fn active_role_holders_in_department(
        &self,
        role: &str,
        department_id: &DepartmentId,
    ) -> Vec<&EmployeeProfile> {
        let role_key = normalize_key(role);
        let mut holders: Vec<&EmployeeProfile> = self
            .users
            .values()
            .filter(|user| {
                user.active
                    && user.department_id == *department_id
                    && normalize_key(&user.role) == role_key
            })
            .collect();
        holders.sort_by(|left, right| left.id.cmp(&right.id));
        holders
    }
}

#[cfg(test)]
mod tests {
    use super::DirectorySnapshot;
    use crate::domain::employee::{DepartmentId, EmployeeProfile, UserId};

    fn profile(id: &str, supervisor: Option<&str>) -> EmployeeProfile {
        EmployeeProfile {
            id: UserId(id.to_string()),
            full_name: id.to_string(),
            department_id: DepartmentId("dept-x".to_string()),
            role: "employee".to_string(),
            supervisor_id: supervisor.map(|s| UserId(s.to_string())),
            active: true,
            admin: false,
        }
    }

    #[test]
    fn supervisor_chain_walks_nearest_first() {
        let directory = DirectorySnapshot::new(
            vec![
                profile("u-emp", Some("u-mgr")),
                profile("u-mgr", Some("u-dir")),
                profile("u-dir", None),
            ],
            Vec::new(),
        );

        let chain = directory.supervisor_chain(&UserId("u-emp".to_string()));
        assert_eq!(chain, vec![UserId("u-mgr".to_string()), UserId("u-dir".to_string())]);
    }

    #[test]
    fn supervisor_chain_survives_cycles() {
        let directory = DirectorySnapshot::new(
            vec![profile("u-a", Some("u-b")), profile("u-b", Some("u-a"))],
            Vec::new(),
        );

        let chain = directory.supervisor_chain(&UserId("u-a".to_string()));
        assert_eq!(chain.len(), 2);
    }
}
