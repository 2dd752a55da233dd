//! Caller identity.

use serde::{Deserialize, Serialize};

/// The authenticated caller of a request.
///
/// Set by the security stage once an [`AuthMechanism`](crate::plugin::AuthMechanism)
/// succeeds; every request starts out [`Principal::Anonymous`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    /// No credentials were presented or accepted.
    #[default]
    Anonymous,
    /// An authenticated account.
    Account {
        /// The account identifier.
        id: String,
        /// Roles granted to the account.
        roles: Vec<String>,
    },
}

impl Principal {
    /// Creates an account principal.
    pub fn account<I, R>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self::Account {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` for an authenticated account.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Account { .. })
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::Account { id, .. } => format!("account:{id}"),
        }
    }

    /// Returns the roles granted to this principal.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        match self {
            Self::Anonymous => Vec::new(),
            Self::Account { roles, .. } => roles.iter().map(String::as_str).collect(),
        }
    }

    /// Returns `true` when the principal holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_roles() {
        let principal = Principal::default();
        assert!(!principal.is_authenticated());
        assert!(principal.roles().is_empty());
        assert_eq!(principal.log_id(), "anonymous");
    }

    #[test]
    fn test_account_roles() {
        let principal = Principal::account("alice", ["admin", "user"]);
        assert!(principal.is_authenticated());
        assert!(principal.has_role("admin"));
        assert!(!principal.has_role("root"));
        assert_eq!(principal.log_id(), "account:alice");
    }
}
