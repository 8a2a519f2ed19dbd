//! Record fixtures

use crate::model::User;

/// A user whose login UUID is `uuid`; other fields are derived from it
pub fn user(uuid: &str) -> User {
    User::new(
        &format!("First{}", uuid),
        &format!("Last{}", uuid),
        uuid,
        &format!("{}@example.com", uuid),
    )
}

/// One user per UUID, in order, duplicates included
pub fn users(uuids: &[&str]) -> Vec<User> {
    uuids.iter().map(|uuid| user(uuid)).collect()
}

/// `count` users with distinct UUIDs `{prefix}-0 .. {prefix}-{count-1}`
pub fn unique_users(prefix: &str, count: usize) -> Vec<User> {
    (0..count)
        .map(|i| user(&format!("{}-{}", prefix, i)))
        .collect()
}

/// JSON body in the shape the random-user API returns
pub fn user_page_json(records: &[User]) -> String {
    serde_json::json!({
        "results": records,
        "info": { "seed": "fixture", "results": records.len(), "page": 1 }
    })
    .to_string()
}
