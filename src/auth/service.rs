use std::sync::Arc;

use tokio::sync::OnceCell;

use super::{AuthResponse, LoginRequest, PasswordHasher, RegisterRequest, TokenIssuer};
use crate::error::AppError;
use crate::models::{Auditable, NewUser, User};
use crate::store::{CallPolicy, UserStore};

/// Registration and login.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    calls: CallPolicy,
    /// Checked in place of a real digest when the email is unknown, so both
    /// login failures cost one bcrypt verification.
    decoy_digest: Arc<OnceCell<String>>,
}

const DECOY_PASSWORD: &str = "decoy password for unknown accounts";

/// Trims and lower-cases an email so lookups and uniqueness ignore case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        calls: CallPolicy,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            calls,
            decoy_digest: Arc::new(OnceCell::new()),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&request.email);

        if self
            .calls
            .retrying(|| self.users.find_by_email(&email))
            .await?
            .is_some()
        {
            log::info!("Registration rejected, email already in use");
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = self.hash_off_thread(request.password).await?;
        let new_user = NewUser {
            email,
            password_hash,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
        };

        // The unique index still decides when two registrations race.
        let user = self.calls.once(self.users.create_user(new_user)).await?;
        log::info!("Registered user {}", user.id());
        self.respond(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&request.email);

        let user = match self
            .calls
            .retrying(|| self.users.find_by_email(&email))
            .await?
        {
            Some(user) => user,
            None => {
                let decoy = self.decoy_digest().await?;
                self.verify_off_thread(request.password, decoy).await?;
                log::warn!("Login failed: unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self
            .verify_off_thread(request.password, user.password_hash.clone())
            .await?
        {
            log::warn!("Login failed: wrong password for user {}", user.id());
            return Err(AppError::InvalidCredentials);
        }

        log::debug!("User {} logged in", user.id());
        self.respond(&user)
    }

    fn respond(&self, user: &User) -> Result<AuthResponse, AppError> {
        Ok(AuthResponse {
            token: self.tokens.issue(user.id(), &user.email)?,
            email: user.email.clone(),
            user_id: user.id(),
        })
    }

    async fn hash_off_thread(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Unexpected(format!("Password hashing task failed: {}", e)))?
    }

    async fn decoy_digest(&self) -> Result<String, AppError> {
        self.decoy_digest
            .get_or_try_init(|| self.hash_off_thread(DECOY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn verify_off_thread(&self, password: String, digest: String) -> Result<bool, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| AppError::Unexpected(format!("Password check task failed: {}", e)))
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }
}
