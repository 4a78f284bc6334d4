/// Account database models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Password hash stored for accounts created through an identity provider.
/// It is not a valid PHC string, so no password ever verifies against it.
pub const NO_PASSWORD: &str = "NO_PASSWORD";

/// Account record in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub unique_handle: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Verification metadata attached 1:1 to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addition {
    pub account_id: String,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed: bool,
}

impl Addition {
    /// Expired means `now >= expires_at`. A row without expiry never had a
    /// live window and counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

/// Link between an identity provider subject and an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthLink {
    pub provider_subject_id: String,
    #[serde(skip_serializing)]
    pub provider_token: String,
    pub provider_email: String,
    pub provider_display_name: String,
    pub account_id: String,
}

/// Fields for a new account row
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub unique_handle: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl NewAccount {
    pub fn into_account(self) -> Account {
        Account {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            unique_handle: self.unique_handle,
            password_hash: self.password_hash,
            created_at: self.created_at,
        }
    }
}

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn addition(expires_at: Option<DateTime<Utc>>) -> Addition {
        Addition {
            account_id: "a".to_string(),
            token: Some("t".to_string()),
            expires_at,
            confirmed: false,
        }
    }

    #[test]
    fn test_expiry_boundary_has_no_grace() {
        let now = Utc::now();
        assert!(!addition(Some(now + Duration::seconds(1))).is_expired(now));
        assert!(addition(Some(now)).is_expired(now));
        assert!(addition(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(addition(None).is_expired(now));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@X.com "), "ada@x.com");
        assert_eq!(normalize_email("ada@x.com"), normalize_email("ADA@X.COM"));
    }
}
