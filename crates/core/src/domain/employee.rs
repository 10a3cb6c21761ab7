use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

/// Snapshot of one employee as seen by the engine. The directory service owns
/// the live record; the engine only ever reads a point-in-time copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: UserId,
    pub full_name: String,
    pub department_id: DepartmentId,
    pub role: String,
    pub supervisor_id: Option<UserId>,
    pub active: bool,
    pub admin: bool,
}

impl EmployeeProfile {
    pub fn holds_role(&self, role: &str) -> bool {
        normalize_key(&self.role) == normalize_key(role)
    }
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
