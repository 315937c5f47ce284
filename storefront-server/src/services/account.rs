//! Sign-up and log-in

use shared::error::{AppError, ErrorCode};
use shared::models::{User, UserRole};

use crate::auth::user_auth::create_token;
use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;
use crate::util::{hash_password, normalize_email, verify_password};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_EMAIL_LEN: usize = 254;

/// Create an account. Emails listed in `ADMIN_EMAILS` get the admin role.
pub async fn sign_up(
    store: &dyn Store,
    config: &Config,
    email: &str,
    password: &str,
) -> ServiceResult<User> {
    let email = normalize_email(email);
    if email.len() > MAX_EMAIL_LEN || !is_plausible_email(&email) {
        return Err(AppError::validation("invalid email address").into());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::new(ErrorCode::PasswordTooShort).into());
    }

    let password_hash = hash_password(password)
        .map_err(|e| ServiceError::Db(format!("password hashing failed: {e}").into()))?;
    let role = if config.is_admin_email(&email) {
        UserRole::Admin
    } else {
        UserRole::User
    };

    match store.create_user(&email, &password_hash, role).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, role = role.as_str(), "Account created");
            Ok(user)
        }
        Err(e) if e.is_unique_violation() => {
            Err(AppError::new(ErrorCode::EmailAlreadyRegistered).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Check credentials and issue an access token.
pub async fn log_in(
    store: &dyn Store,
    config: &Config,
    email: &str,
    password: &str,
) -> ServiceResult<(String, User)> {
    let email = normalize_email(email);
    let credentials = store
        .find_credentials_by_email(&email)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    if !verify_password(password, &credentials.password_hash) {
        return Err(AppError::invalid_credentials().into());
    }

    let user = store
        .find_user(credentials.id)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;
    if !user.is_active() {
        return Err(AppError::new(ErrorCode::AccountDisabled).into());
    }

    let token = create_token(&user, &config.jwt_secret, config.jwt_expiry_hours)
        .map_err(|e| ServiceError::Db(e.into()))?;
    Ok((token, user))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
