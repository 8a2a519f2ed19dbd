//! Record types flowing through the aggregator
//!
//! A raw record is whatever the record source returns. The aggregator only
//! needs two things from it: a [`DedupKey`] that identifies the logical
//! entity, and a pure projection into the externally visible output shape.
//! Both are expressed by the [`DedupRecord`] trait.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity used to decide that two raw records describe the same entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DedupKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for DedupKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A raw record that can be deduplicated and projected
///
/// Both methods must be total and pure: the aggregator calls them from many
/// consumer tasks at once and assumes the same record always yields the same
/// key and an equal output.
pub trait DedupRecord: Send + 'static {
    /// Externally visible shape produced from one raw record
    type Output: Serialize + Clone + Send + 'static;

    /// Extract the identity this record is deduplicated on
    fn dedup_key(&self) -> DedupKey;

    /// Build the output record
    fn project(&self) -> Self::Output;
}

/// A user as returned by the random-user API
///
/// Missing fields decode as empty values so one malformed entry never costs
/// the rest of its page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub name: UserName,
    #[serde(default)]
    pub login: UserLogin,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserName {
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub last: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLogin {
    #[serde(default)]
    pub uuid: String,
}

/// Projection of a [`User`] served to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub uuid: String,
    pub email: String,
}

impl User {
    pub fn new(first: &str, last: &str, uuid: &str, email: &str) -> Self {
        Self {
            name: UserName {
                first: first.to_string(),
                last: last.to_string(),
            },
            login: UserLogin {
                uuid: uuid.to_string(),
            },
            email: email.to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name.first, self.name.last)
    }
}

impl DedupRecord for User {
    type Output = UserSummary;

    fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.login.uuid.as_str())
    }

    fn project(&self) -> UserSummary {
        UserSummary {
            name: self.full_name(),
            uuid: self.login.uuid.clone(),
            email: self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_deserializes_from_api_shape() {
        let raw = json!({
            "gender": "female",
            "name": {"title": "Ms", "first": "Ada", "last": "Lovelace"},
            "login": {"uuid": "7c1e", "username": "ada"},
            "email": "ada@example.com",
            "nat": "GB"
        });
        let user: User = serde_json::from_value(raw).unwrap();
        assert_eq!(user.login.uuid, "7c1e");
        assert_eq!(user.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_page_with_incomplete_record_still_decodes() {
        let raw = r#"[
            {"name": {"first": "Ada", "last": "Lovelace"}, "login": {"uuid": "7c1e"}, "email": "ada@example.com"},
            {"name": {"first": "Nameless"}, "email": "anon@example.com"},
            {"login": {}}
        ]"#;
        let users: Vec<User> = serde_json::from_str(raw).unwrap();
        assert_eq!(users.len(), 3);

        assert_eq!(users[1].login.uuid, "");
        assert_eq!(users[1].dedup_key(), DedupKey::from(""));
        assert_eq!(users[1].project().name, "Nameless ");
        assert_eq!(users[2], User::default());
    }

    #[test]
    fn test_dedup_key_is_login_uuid() {
        let user = User::new("Grace", "Hopper", "uuid-1", "grace@example.com");
        assert_eq!(user.dedup_key(), DedupKey::from("uuid-1"));
    }

    #[test]
    fn test_projection_is_idempotent() {
        let user = User::new("Grace", "Hopper", "uuid-1", "grace@example.com");
        let first = user.project();
        let second = user.project();
        assert_eq!(first, second);
        assert_eq!(
            first,
            UserSummary {
                name: "Grace Hopper".to_string(),
                uuid: "uuid-1".to_string(),
                email: "grace@example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_summary_wire_shape() {
        let summary = User::new("A", "B", "u", "e@x").project();
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"name": "A B", "uuid": "u", "email": "e@x"})
        );
    }

    #[test]
    fn test_dedup_key_serializes_transparently() {
        let key = DedupKey::from("abc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
        assert_eq!(key.to_string(), "abc");
    }
}
