use crate::error::AppError;
use bcrypt::{hash, verify};

/// bcrypt hashing with a cost fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Unexpected(format!("Failed to hash password: {}", e)))
    }

    /// A digest bcrypt cannot parse counts as a mismatch.
    pub fn verify(&self, password: &str, hashed_password: &str) -> bool {
        match verify(password, hashed_password) {
            Ok(matches) => matches,
            Err(e) => {
                log::warn!("Rejecting malformed password digest: {}", e);
                false
            }
        }
    }
}
