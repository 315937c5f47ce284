//! User Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Banned,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Banned => "banned",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

/// User entity (public fields only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub email: String,
    /// "user" | "admin"
    pub role: String,
    /// "active" | "banned"
    pub account_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<UserRole> {
        UserRole::from_db(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(UserRole::Admin)
    }

    pub fn is_active(&self) -> bool {
        AccountStatus::from_db(&self.account_status) == Some(AccountStatus::Active)
    }
}

/// User row including the password hash (never serialized to clients)
#[derive(Debug, Clone)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub account_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_db_strings() {
        assert_eq!(UserRole::from_db("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_db(UserRole::User.as_str()), Some(UserRole::User));
        assert_eq!(UserRole::from_db("root"), None);
    }

    #[test]
    fn test_user_flags() {
        let now = Utc::now();
        let user = User {
            id: 1,
            email: "a@example.com".into(),
            role: "admin".into(),
            account_status: "banned".into(),
            created_at: now,
            updated_at: now,
        };
        assert!(user.is_admin());
        assert!(!user.is_active());
    }
}
