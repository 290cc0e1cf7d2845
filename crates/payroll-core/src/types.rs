use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried by an authenticated caller. Only admins may watch the
/// real-time feed or query its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Employee,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Employee => write!(f, "employee"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "employee" => Ok(UserRole::Employee),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// An authenticated caller as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Username; becomes the subscriber id of any stream this caller opens.
    pub subject: String,
    pub role: UserRole,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: UserRole) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// Stand-in identity used when authentication is disabled.
    pub fn anonymous_admin() -> Self {
        Self::new("anonymous", UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subject, self.role)
    }
}
