//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{
        ChangePassword, CreateUser, RegisterStudent, Role, UpdateProfile, UpdateUser, User,
        UserClaims, UserQuery,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate by email and password, returning a JWT token and the user
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!("User {} logged in", user.id);
        Ok((token, user))
    }

    /// Create JWT token for a user
    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.search(query).await
    }

    /// Self-registration; always creates a student
    pub async fn register(&self, registration: RegisterStudent) -> AppResult<User> {
        self.create_user(registration.into()).await
    }

    /// Create a new user
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        if self.repository.users.email_exists(&user.email, None).await? {
            return Err(AppError::Conflict(format!("Email '{}' is already registered", user.email)));
        }

        let hash = hash_password(&user.password)?;
        let created = self.repository.users.create(&user, &hash).await?;
        tracing::info!("User {} created with role {}", created.id, created.role);
        Ok(created)
    }

    /// Update a user (librarian)
    pub async fn update_user(&self, id: i32, user: UpdateUser) -> AppResult<User> {
        if let Some(ref email) = user.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict(format!("Email '{}' is already registered", email)));
            }
        }

        let hash = user.password.as_deref().map(hash_password).transpose()?;
        self.repository.users.update(id, &user, hash).await
    }

    /// Delete a user; refused while they hold pending or approved borrows
    pub async fn delete_user(&self, id: i32) -> AppResult<()> {
        self.repository.users.delete(id).await?;
        tracing::info!("User {} deleted", id);
        Ok(())
    }

    pub async fn update_profile(&self, user_id: i32, profile: UpdateProfile) -> AppResult<User> {
        self.repository.users.update_profile(user_id, &profile).await
    }

    /// Change own password after checking the current one
    pub async fn change_password(&self, user_id: i32, change: ChangePassword) -> AppResult<()> {
        let user = self.repository.users.get_by_id(user_id).await?;

        if !verify_password(&user.password_hash, &change.current_password)? {
            return Err(AppError::Authentication("Current password is incorrect".to_string()));
        }

        let hash = hash_password(&change.new_password)?;
        self.repository.users.update_password(user_id, &hash).await
    }

    /// Create the configured librarian account when no librarian exists yet
    pub async fn ensure_bootstrap_librarian(&self) -> AppResult<Option<User>> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_librarian_email.clone(),
            self.config.bootstrap_librarian_password.clone(),
        ) else {
            return Ok(None);
        };

        if self.repository.users.count_by_role(Role::Librarian).await? > 0 {
            return Ok(None);
        }

        let librarian = self
            .create_user(CreateUser {
                name: "Librarian".to_string(),
                email,
                password,
                role: Role::Librarian,
                student_id: None,
                phone: None,
            })
            .await?;

        tracing::warn!(
            "Created bootstrap librarian '{}'; change its password",
            librarian.email
        );
        Ok(Some(librarian))
    }
}

/// Hash a password (argon2, PHC string)
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
