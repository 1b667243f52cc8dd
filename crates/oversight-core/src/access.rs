//! Role-based access control

use crate::error::WorkflowError;
use oversight_types::{Role, User};

/// Operations gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    ManageUsers,
    ManageSettings,
    WriteObjectives,
    WriteActivities,
    RecordSpend,
    ManageAttachments,
    SubmitRevision,
    FinanceDecision,
    CommitteeDecision,
    ReadAudit,
    Export,
}

impl Permission {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Read => "read records",
            Self::ManageUsers => "manage users",
            Self::ManageSettings => "change settings",
            Self::WriteObjectives => "modify objectives",
            Self::WriteActivities => "modify activities",
            Self::RecordSpend => "record spend",
            Self::ManageAttachments => "manage attachments",
            Self::SubmitRevision => "submit budget revisions",
            Self::FinanceDecision => "take finance decisions",
            Self::CommitteeDecision => "take committee decisions",
            Self::ReadAudit => "read the audit log",
            Self::Export => "export reports",
        }
    }
}

/// Permission matrix. Admin holds every permission.
pub fn allows(role: Role, permission: Permission) -> bool {
    use Permission::*;

    match role {
        Role::Admin => true,
        Role::Finance => matches!(
            permission,
            Read | RecordSpend | ManageAttachments | FinanceDecision | ReadAudit | Export
        ),
        Role::Committee => matches!(permission, Read | CommitteeDecision | ReadAudit | Export),
        Role::Manager => matches!(
            permission,
            Read | WriteObjectives
                | WriteActivities
                | RecordSpend
                | ManageAttachments
                | SubmitRevision
                | Export
        ),
        Role::Viewer => matches!(permission, Read),
    }
}

/// Check that an active user holds `permission`
pub fn authorize(user: &User, permission: Permission) -> Result<(), WorkflowError> {
    if !user.active {
        return Err(WorkflowError::InactiveUser(user.id));
    }
    if !allows(user.role, permission) {
        return Err(WorkflowError::Forbidden {
            role: user.role,
            action: permission.describe(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_is_read_only() {
        assert!(allows(Role::Viewer, Permission::Read));
        assert!(!allows(Role::Viewer, Permission::Export));
        assert!(!allows(Role::Viewer, Permission::RecordSpend));
    }

    #[test]
    fn decision_permissions_split_by_stage() {
        assert!(allows(Role::Finance, Permission::FinanceDecision));
        assert!(!allows(Role::Finance, Permission::CommitteeDecision));
        assert!(allows(Role::Committee, Permission::CommitteeDecision));
        assert!(!allows(Role::Committee, Permission::FinanceDecision));
        assert!(!allows(Role::Manager, Permission::FinanceDecision));
    }

    #[test]
    fn admin_holds_everything() {
        for permission in [
            Permission::ManageUsers,
            Permission::FinanceDecision,
            Permission::CommitteeDecision,
            Permission::ManageSettings,
        ] {
            assert!(allows(Role::Admin, permission));
        }
    }

    #[test]
    fn inactive_user_is_refused() {
        let mut user = User::new("a@example.org", "A", Role::Admin);
        user.active = false;
        let err = authorize(&user, Permission::Read).unwrap_err();
        assert_eq!(err, WorkflowError::InactiveUser(user.id));
    }

    #[test]
    fn forbidden_message_names_role_and_action() {
        let user = User::new("v@example.org", "V", Role::Viewer);
        let err = authorize(&user, Permission::ManageUsers).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Permission denied: role 'viewer' may not manage users"
        );
    }
}
