//! Role/power matrix.
//!
//! The matrix is data: [`CAPABILITIES`] lists, for every privileged action,
//! the roles allowed to perform it. All authorization goes through
//! [`has_role`] so the table stays the single place to audit.

use crate::error::{RegistryError, Result};
use crate::governance::GovernanceState;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Privilege levels held by governance addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    UpgradeAdmin,
    EmergencyAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::UpgradeAdmin, Role::EmergencyAdmin];
}

/// Privileged operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SetImmediate,
    BatchSet,
    Schedule,
    Execute,
    Cancel,
    BatchCancel,
    CancelAll,
    Pause,
    Unpause,
    RecoverUpgradeAdmin,
    ManageRoles,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::SetImmediate,
        Action::BatchSet,
        Action::Schedule,
        Action::Execute,
        Action::Cancel,
        Action::BatchCancel,
        Action::CancelAll,
        Action::Pause,
        Action::Unpause,
        Action::RecoverUpgradeAdmin,
        Action::ManageRoles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SetImmediate => "set_immediate",
            Action::BatchSet => "batch_set",
            Action::Schedule => "schedule",
            Action::Execute => "execute",
            Action::Cancel => "cancel",
            Action::BatchCancel => "batch_cancel",
            Action::CancelAll => "cancel_all",
            Action::Pause => "pause",
            Action::Unpause => "unpause",
            Action::RecoverUpgradeAdmin => "recover_upgrade_admin",
            Action::ManageRoles => "manage_roles",
        }
    }

    /// Roles permitted to perform this action.
    pub fn allowed_roles(self) -> &'static [Role] {
        CAPABILITIES
            .iter()
            .find(|(action, _)| *action == self)
            .map(|(_, roles)| *roles)
            .unwrap_or(&[])
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `action -> allowed roles`.
pub const CAPABILITIES: &[(Action, &[Role])] = &[
    (Action::SetImmediate, &[Role::Owner]),
    (Action::BatchSet, &[Role::Owner]),
    (Action::Schedule, &[Role::Owner, Role::UpgradeAdmin]),
    (Action::Execute, &[Role::Owner, Role::UpgradeAdmin]),
    (
        Action::Cancel,
        &[Role::Owner, Role::UpgradeAdmin, Role::EmergencyAdmin],
    ),
    (
        Action::BatchCancel,
        &[Role::Owner, Role::UpgradeAdmin, Role::EmergencyAdmin],
    ),
    (Action::CancelAll, &[Role::Owner, Role::EmergencyAdmin]),
    (Action::Pause, &[Role::Owner, Role::EmergencyAdmin]),
    (Action::Unpause, &[Role::Owner]),
    (Action::RecoverUpgradeAdmin, &[Role::EmergencyAdmin]),
    (Action::ManageRoles, &[Role::Owner]),
];

/// The address currently holding `role`, or zero if unset.
fn holder(gov: &GovernanceState, role: Role) -> Address {
    match role {
        Role::Owner => gov.owner,
        Role::UpgradeAdmin => gov.upgrade_admin,
        Role::EmergencyAdmin => gov.emergency_admin,
    }
}

/// Every role `caller` holds. The zero address holds none.
pub fn roles_of(gov: &GovernanceState, caller: Address) -> Vec<Role> {
    if caller.is_zero() {
        return Vec::new();
    }
    Role::ALL
        .into_iter()
        .filter(|role| holder(gov, *role) == caller)
        .collect()
}

/// Whether `caller` may perform `action` under `gov`.
pub fn has_role(gov: &GovernanceState, action: Action, caller: Address) -> bool {
    let allowed = action.allowed_roles();
    roles_of(gov, caller)
        .iter()
        .any(|role| allowed.contains(role))
}

/// Fail with `Unauthorized` unless `caller` may perform `action`.
pub(crate) fn authorize(gov: &GovernanceState, action: Action, caller: Address) -> Result<()> {
    if has_role(gov, action, caller) {
        Ok(())
    } else {
        warn!("Rejected {} by {}: missing role", action, caller);
        Err(RegistryError::Unauthorized {
            action: action.as_str().to_string(),
            caller,
        })
    }
}
