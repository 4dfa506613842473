//! Password hashing (argon2id, PHC string format).

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;

use crate::error::LifecycleError;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 10;

/// Check the password policy: at least [`MIN_PASSWORD_LEN`] characters with
/// at least one letter and one digit.
pub fn check_policy(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if !password.chars().any(|c| c.is_alphabetic()) || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain at least one letter and one digit".into());
    }
    Ok(())
}

/// Hash a password on the blocking pool.
pub async fn hash(password: String) -> Result<String, LifecycleError> {
    tokio::task::spawn_blocking(move || hash_sync(&password))
        .await
        .map_err(|e| LifecycleError::Persistence(format!("password hashing task failed: {e}")))?
}

fn hash_sync(password: &str) -> Result<String, LifecycleError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LifecycleError::Persistence(format!("password hashing failed: {e}")))
}
