use thiserror::Error;

use crate::directory::DirectorySnapshot;
use crate::domain::employee::{EmployeeProfile, UserId};
use crate::domain::template::ApproverSpec;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no active holder of role `{role}` is visible to {submitter}")]
    RoleNotHeld { role: String, submitter: String },
    #[error("approver user `{user_id}` does not exist")]
    UserMissing { user_id: String },
    #[error("approver user `{user_id}` is inactive")]
    UserInactive { user_id: String },
    #[error("approver group `{group_id}` has no active members")]
    EmptyGroup { group_id: String },
}

/// Resolve one approver spec to a concrete identity, over a directory
/// snapshot. Pure: same snapshot, same answer.
///
/// Role resolution prefers the nearest supervisor-chain member holding the
/// role, then any active holder in the submitter's department; ties break on
/// the smallest user id so repeated submissions route identically.
pub fn resolve_approver(
    spec: &ApproverSpec,
    submitter: &EmployeeProfile,
    directory: &DirectorySnapshot,
) -> Result<UserId, ResolveError> {
    match spec {
        ApproverSpec::Role { role } => {
            for supervisor_id in directory.supervisor_chain(&submitter.id) {
                if let Some(supervisor) = directory.active_user(&supervisor_id) {
                    if supervisor.holds_role(role) {
                        return Ok(supervisor.id.clone());
                    }
                }
            }

            directory
                .active_role_holders_in_department(role, &submitter.department_id)
                .first()
                .map(|holder| holder.id.clone())
                .ok_or_else(|| ResolveError::RoleNotHeld {
                    role: role.clone(),
                    submitter: submitter.id.0.clone(),
                })
        }
        ApproverSpec::SpecificUser { user_id } => match directory.user(user_id) {
            None => Err(ResolveError::UserMissing { user_id: user_id.0.clone() }),
            Some(user) if !user.active => {
                Err(ResolveError::UserInactive { user_id: user_id.0.clone() })
            }
            Some(user) => Ok(user.id.clone()),
        },
        ApproverSpec::UserGroup { group_id } => directory
            .group_members(group_id)
            .iter()
            .filter(|member| directory.active_user(member).is_some())
            .min()
            .cloned()
            .ok_or_else(|| ResolveError::EmptyGroup { group_id: group_id.0.clone() }),
        ApproverSpec::Submitter => Ok(submitter.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_approver, ResolveError};
    use crate::directory::DirectorySnapshot;
    use crate::domain::employee::{DepartmentId, EmployeeProfile, GroupId, UserId};
    use crate::domain::template::ApproverSpec;

    fn profile(id: &str, dept: &str, role: &str, supervisor: Option<&str>) -> EmployeeProfile {
        EmployeeProfile {
            id: UserId(id.to_string()),
            full_name: id.to_string(),
            department_id: DepartmentId(dept.to_string()),
            role: role.to_string(),
            supervisor_id: supervisor.map(|s| UserId(s.to_string())),
            active: true,
            admin: false,
        }
    }

    fn directory() -> DirectorySnapshot {
        let mut hr_lead = profile("u-hr-lead", "dept-hr", "hr_specialist", None);
        hr_lead.admin = true;
        let mut former = profile("u-former", "dept-eng", "manager", None);
        former.active = false;

        DirectorySnapshot::new(
            vec![
                profile("u-emp", "dept-eng", "engineer", Some("u-mgr")),
                profile("u-mgr", "dept-eng", "manager", Some("u-dir")),
                profile("u-dir", "dept-eng", "director", None),
                profile("u-mgr-2", "dept-eng", "manager", Some("u-dir")),
                hr_lead,
                former,
            ],
            vec![(
                GroupId("g-hr".to_string()),
                vec![UserId("u-hr-lead".to_string()), UserId("u-former".to_string())],
            )],
        )
    }

    fn submitter() -> EmployeeProfile {
        profile("u-emp", "dept-eng", "engineer", Some("u-mgr"))
    }

    #[test]
    fn role_resolves_to_nearest_supervisor_holding_it() {
        let resolved = resolve_approver(
            &ApproverSpec::Role { role: "manager".to_string() },
            &submitter(),
            &directory(),
        )
        .expect("resolve");

        assert_eq!(resolved, UserId("u-mgr".to_string()));
    }

    #[test]
    fn role_outside_chain_and_department_is_unresolvable() {
        // The submitter's chain holds no hr_specialist, and neither does the
        // submitter's department.
        let error = resolve_approver(
            &ApproverSpec::Role { role: "hr_specialist".to_string() },
            &submitter(),
            &directory(),
        )
        .expect_err("hr_specialist is not visible from dept-eng");
        assert!(matches!(error, ResolveError::RoleNotHeld { .. }));

        // A director is reachable through the chain even though two managers
        // exist; chain wins over department scan.
        let resolved = resolve_approver(
            &ApproverSpec::Role { role: "director".to_string() },
            &submitter(),
            &directory(),
        )
        .expect("resolve");
        assert_eq!(resolved, UserId("u-dir".to_string()));
    }

    #[test]
    fn department_fallback_breaks_ties_deterministically() {
        // u-dir has no supervisors, so chain resolution finds nothing and the
        // department scan picks the smallest manager id.
        let dir_submitter = profile("u-dir", "dept-eng", "director", None);
        let resolved = resolve_approver(
            &ApproverSpec::Role { role: "manager".to_string() },
            &dir_submitter,
            &directory(),
        )
        .expect("resolve");

        assert_eq!(resolved, UserId("u-mgr".to_string()));
    }

    #[test]
    fn specific_user_must_exist_and_be_active() {
        let missing = resolve_approver(
            &ApproverSpec::SpecificUser { user_id: UserId("u-ghost".to_string()) },
            &submitter(),
            &directory(),
        );
        assert_eq!(missing, Err(ResolveError::UserMissing { user_id: "u-ghost".to_string() }));

        let inactive = resolve_approver(
            &ApproverSpec::SpecificUser { user_id: UserId("u-former".to_string()) },
            &submitter(),
            &directory(),
        );
        assert_eq!(inactive, Err(ResolveError::UserInactive { user_id: "u-former".to_string() }));
    }

    #[test]
    fn group_resolution_skips_inactive_members() {
        let resolved = resolve_approver(
            &ApproverSpec::UserGroup { group_id: GroupId("g-hr".to_string()) },
            &submitter(),
            &directory(),
        )
        .expect("resolve");

        assert_eq!(resolved, UserId("u-hr-lead".to_string()));
    }

    #[test]
    fn unknown_group_is_reported_as_empty() {
        let error = resolve_approver(
            &ApproverSpec::UserGroup { group_id: GroupId("g-none".to_string()) },
            &submitter(),
            &directory(),
        );

        assert_eq!(error, Err(ResolveError::EmptyGroup { group_id: "g-none".to_string() }));
    }

    #[test]
    fn submitter_spec_resolves_to_the_submitter() {
        let resolved = resolve_approver(&ApproverSpec::Submitter, &submitter(), &directory())
            .expect("resolve");
        assert_eq!(resolved, UserId("u-emp".to_string()));
    }
}
