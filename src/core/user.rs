use crate::core::error::WalletError;
use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    hashed_password: String,
    salt: String,
    pub registration_date: DateTime<Utc>,
}

impl User {
    pub fn new(
        user_id: u64,
        username: &str,
        password: &str,
        registration_date: DateTime<Utc>,
    ) -> Result<Self, WalletError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(WalletError::EmptyField("username".to_string()));
        }
        let salt = new_salt();
        let hashed_password = hash_password(password, &salt)?;
        Ok(Self {
            user_id,
            username: username.to_string(),
            hashed_password,
            salt,
            registration_date,
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(password, &self.salt).is_ok_and(|h| h == self.hashed_password)
    }
}

fn new_salt() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 12)
}

fn hash_password(password: &str, salt: &str) -> Result<String, WalletError> {
    if password.trim().is_empty() {
        return Err(WalletError::EmptyField("password".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WalletError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    let digest = Sha256::digest(format!("{password}{salt}").as_bytes());
    Ok(format!("{digest:x}"))
}

/// The logged-in user, passed explicitly to wallet operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: u64,
    pub username: String,
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Session {
            user_id: user.user_id,
            username: user.username.clone(),
        }
    }
}
