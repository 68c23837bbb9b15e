//! User accounts.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A ledger account. The email is the identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    /// Never serialized back to clients.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub coins: u64,
    /// Unix seconds.
    pub created_at: u64,
}

/// Check an email address against the accepted shape.
pub fn is_valid_email(email: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]{1,100}@[a-zA-Z0-9.-]{1,100}$").expect("valid email pattern")
        })
        .is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("al ice@example.com"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            email: "a@b.c".into(),
            password_hash: "secret".into(),
            coins: 5,
            created_at: 0,
        };
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(!json.contains("secret"));
    }
}
