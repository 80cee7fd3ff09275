//! Roles and the authorization gate
//!
//! `has_permission` is the single policy function used by both services to
//! guard routes, and by the session endpoint to tell the dashboard which
//! features to render. Keeping it here means every enforcement point answers
//! the same question the same way.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::session::SessionData;

/// Permission tier attached to every user and session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Developer,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Developer => "developer",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the four role names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "developer" => Ok(Role::Developer),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Gated feature areas of the fee ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ManageUsers,
    ViewReports,
    RecordPayments,
    ManageInvoices,
    DeleteRecords,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::ManageUsers,
        Feature::ViewReports,
        Feature::RecordPayments,
        Feature::ManageInvoices,
        Feature::DeleteRecords,
    ];

    /// Roles allowed to use the feature
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Feature::ManageUsers => &[Role::Admin],
            Feature::ViewReports => &[Role::Admin, Role::Manager, Role::Developer],
            Feature::RecordPayments => &[Role::Admin, Role::Manager, Role::User],
            Feature::ManageInvoices => &[Role::Admin, Role::Manager],
            Feature::DeleteRecords => &[Role::Admin],
        }
    }
}

/// Decide whether `session` may act within `allowed_roles`.
///
/// Deny by default: a missing session or an empty role set is never
/// permitted.
pub fn has_permission(session: Option<&SessionData>, allowed_roles: &[Role]) -> bool {
    match session {
        Some(session) => allowed_roles.contains(&session.role),
        None => false,
    }
}

/// Permission map for every feature, as rendered by the session endpoint
pub fn permissions_for(session: Option<&SessionData>) -> BTreeMap<Feature, bool> {
    Feature::ALL
        .iter()
        .map(|feature| (*feature, has_permission(session, feature.allowed_roles())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session(role: Role) -> SessionData {
        SessionData {
            user_id: Uuid::new_v4(),
            username: "someone".to_string(),
            name: "Someone".to_string(),
            role,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    const ROLES: [Role; 4] = [Role::Admin, Role::Manager, Role::Developer, Role::User];

    #[test]
    fn empty_role_set_denies_everyone() {
        for role in ROLES {
            assert!(!has_permission(Some(&session(role)), &[]));
        }
    }

    #[test]
    fn missing_session_is_denied() {
        assert!(!has_permission(None, &ROLES));
    }

    #[test]
    fn role_must_be_listed() {
        let manager = session(Role::Manager);
        assert!(has_permission(Some(&manager), &[Role::Admin, Role::Manager]));
        assert!(!has_permission(Some(&manager), &[Role::Admin]));
    }

    #[test]
    fn role_round_trips_through_its_name() {
        for role in ROLES {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!(
            "superuser".parse::<Role>(),
            Err(UnknownRole("superuser".to_string()))
        );
    }

    #[test]
    fn permission_map_follows_feature_table() {
        let admin = permissions_for(Some(&session(Role::Admin)));
        assert!(admin.values().all(|allowed| *allowed));

        let user = permissions_for(Some(&session(Role::User)));
        assert_eq!(user[&Feature::RecordPayments], true);
        assert_eq!(user[&Feature::ManageUsers], false);
        assert_eq!(user[&Feature::ViewReports], false);

        let anonymous = permissions_for(None);
        assert!(anonymous.values().all(|allowed| !*allowed));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Developer).unwrap(), "\"developer\"");
        assert_eq!(
            serde_json::to_string(&Feature::ManageInvoices).unwrap(),
            "\"manage_invoices\""
        );
    }
}
