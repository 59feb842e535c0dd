use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{check_length, ValidationError};
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>
}

impl User {
    pub fn register(request: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            username: request.username,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            created_at: now
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_length("username", &self.username, 3, 50)?;
        check_length("first name", &self.first_name, 1, 50)?;
        check_length("last name", &self.last_name, 1, 50)?;

        if !is_valid_email(&self.email) {
            return Err(ValidationError::invalid_field("email", format!("'{}' is not a valid address", self.email)));
        }

        Ok(())
    }
}

/// Accepts `local@domain.tld` where the local part is `[A-Za-z0-9._%+-]+`, the domain is
/// `[A-Za-z0-9.-]+` and the top-level label has at least two ASCII letters.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false
    };

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false
    };

    let local_ok = !local.is_empty()
        && local.chars().all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let host_ok = !host.is_empty()
        && host.chars().all(|c| c.is_ascii_alphanumeric() || ".-".contains(c));
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    local_ok && host_ok && tld_ok
}
