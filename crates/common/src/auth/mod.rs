//! Authentication and authorization utilities
//!
//! Provides:
//! - Argon2id password hashing and random tokens
//! - Email-confirmed registration and cookie sessions
//! - `AuthContext` / `MaybeAuth` extractors

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::config::AuthConfig;
use crate::email::{EmailSender, EmailTemplate};
use crate::errors::{AppError, Result};
use crate::ids::sha256_hex;
use crate::library::Library;
use crate::models::{Confirmation, Session, Timestamps, User};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Verify a password against its stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Generate a new random token (32 bytes, hex)
pub fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    hex::encode(random_bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    sha256_hex(token.as_bytes())
}

/// Read a cookie value from request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(name: &str, token: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        name, token, max_age_secs
    )
}

/// `Set-Cookie` value that clears the session cookie
pub fn expired_cookie(name: &str) -> String {
    format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax", name)
}

/// Email/password pair submitted to register and login
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

/// Extracted authentication context available to handlers
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub admin: bool,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<()> {
        if self.admin {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "Administrator access required".to_string(),
            })
        }
    }
}

/// A pending registration as reported to the client
#[derive(Debug, Clone, Serialize)]
pub struct PendingRegistration {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly created login session
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Raw token for the cookie; only its hash is stored
    pub token: String,
    pub session: Session,
    pub context: AuthContext,
}

/// Account flows over the library's user, session and confirmation collections
pub struct Accounts {
    library: Arc<Library>,
    config: AuthConfig,
    mailer: Arc<dyn EmailSender>,
}

impl Accounts {
    pub fn new(library: Arc<Library>, config: AuthConfig, mailer: Arc<dyn EmailSender>) -> Self {
        Self {
            library,
            config,
            mailer,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    pub fn session_ttl_secs(&self) -> u64 {
        self.config.session_ttl_secs
    }

    /// Store a pending registration and email its confirmation link
    pub async fn register(&self, credentials: &Credentials) -> Result<PendingRegistration> {
        credentials.validate()?;
        let email = credentials.email.trim().to_string();

        if self.library.users.read().await.contains(&email.to_lowercase()) {
            return Err(AppError::Duplicate {
                message: format!("{} is already registered", email),
            });
        }

        let reference = generate_token();
        let now = Utc::now();
        let expires_at = now + ttl(self.config.confirmation_ttl_secs);
        let pending = Confirmation {
            id: hash_token(&reference),
            email: email.clone(),
            password_hash: hash_password(&credentials.password)?,
            expires_at,
            stamps: Timestamps::at(now),
        };
        let pending_id = pending.id.clone();
        self.library.confirmations.write().await.upsert(pending)?;

        let template = EmailTemplate::Confirmation {
            recipient: email.clone(),
            reference,
            expires_at,
        };
        if let Err(e) = self.mailer.send(template).await {
            // Without the email the reference is unreachable
            self.library.confirmations.write().await.remove(&pending_id)?;
            return Err(e);
        }

        info!(email = %email, "Registration pending confirmation");
        Ok(PendingRegistration { email, expires_at })
    }

    /// Turn a pending registration into a user
    pub async fn confirm(&self, reference: &str) -> Result<User> {
        let id = hash_token(reference);
        let pending = {
            let mut confirmations = self.library.confirmations.write().await;
            if !confirmations.contains(&id) {
                return Err(AppError::NotFound {
                    resource_type: "confirmation".to_string(),
                    id: reference.to_string(),
                });
            }
            confirmations.remove(&id)?
        };

        if pending.is_expired(Utc::now()) {
            warn!(email = %pending.email, "Expired confirmation used");
            return Err(AppError::ExpiredToken);
        }

        let mut users = self.library.users.write().await;
        let user_id = pending.email.to_lowercase();
        if users.contains(&user_id) {
            return Err(AppError::Duplicate {
                message: format!("{} is already registered", pending.email),
            });
        }

        let admin = users.is_empty()
            || self
                .config
                .admins
                .iter()
                .any(|a| a.trim().eq_ignore_ascii_case(&pending.email));
        let user = users.upsert(User::new(&pending.email, pending.password_hash, admin))?;

        info!(user_id = %user.id, admin, "User registered");
        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginSession> {
        let user_id = credentials.email.trim().to_lowercase();
        let user = self
            .library
            .users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(&credentials.password, &user.password_hash) {
            warn!(user_id = %user_id, "Failed login");
            return Err(AppError::InvalidCredentials);
        }

        let token = generate_token();
        let now = Utc::now();
        let session = self.library.sessions.write().await.upsert(Session {
            id: hash_token(&token),
            user_id: user.id.clone(),
            expires_at: now + ttl(self.config.session_ttl_secs),
            stamps: Timestamps::at(now),
        })?;

        info!(user_id = %user.id, "User logged in");
        Ok(LoginSession {
            token,
            session,
            context: AuthContext {
                user_id: user.id,
                email: user.email,
                admin: user.admin,
            },
        })
    }

    /// Drop the session behind `token`; returns whether one existed
    pub async fn logout(&self, token: &str) -> Result<bool> {
        let id = hash_token(token);
        let mut sessions = self.library.sessions.write().await;
        if !sessions.contains(&id) {
            return Ok(false);
        }
        let session = sessions.remove(&id)?;
        info!(user_id = %session.user_id, "User logged out");
        Ok(true)
    }

    /// Resolve a cookie token to a live session and its user
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext> {
        let id = hash_token(token);
        let session = self
            .library
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::Unauthorized {
                message: "Unknown session".to_string(),
            })?;

        if session.is_expired(Utc::now()) {
            return Err(AppError::ExpiredToken);
        }

        let users = self.library.users.read().await;
        let user = users
            .get(&session.user_id)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Session user no longer exists".to_string(),
            })?;

        Ok(AuthContext {
            user_id: user.id.clone(),
            email: user.email.clone(),
            admin: user.admin,
        })
    }
}

fn ttl(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<Accounts>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let accounts = Arc::<Accounts>::from_ref(state);
        let token = read_cookie(&parts.headers, accounts.cookie_name()).ok_or_else(|| {
            AppError::Unauthorized {
                message: "Login required".to_string(),
            }
        })?;
        accounts.authenticate(&token).await
    }
}

/// Optional authentication for public routes
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<AuthContext>);

impl MaybeAuth {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|ctx| ctx.admin)
    }
}

impl<S> FromRequestParts<S> for MaybeAuth
where
    Arc<Accounts>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(MaybeAuth(
            AuthContext::from_request_parts(parts, state).await.ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::email::RecordingEmailSender;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        accounts: Accounts,
        mailer: Arc<RecordingEmailSender>,
    }

    fn fixture(admins: Vec<String>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_root(dir.path());
        config.auth.admins = admins;
        let library = Arc::new(Library::open(&config.storage).unwrap());
        let mailer = Arc::new(RecordingEmailSender::new());
        let accounts = Accounts::new(library, config.auth, mailer.clone());
        Fixture {
            _dir: dir,
            accounts,
            mailer,
        }
    }

    fn creds(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "correct horse".to_string(),
        }
    }

    fn last_reference(mailer: &RecordingEmailSender) -> String {
        match mailer.sent().pop().unwrap() {
            EmailTemplate::Confirmation { reference, .. } => reference,
        }
    }

    async fn registered(fx: &Fixture, email: &str) -> User {
        fx.accounts.register(&creds(email)).await.unwrap();
        let reference = last_reference(&fx.mailer);
        fx.accounts.confirm(&reference).await.unwrap()
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("secret-password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret-password", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("secret-password", "not a phc string"));
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, generate_token());
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; login=abc; other=1"),
        );
        assert_eq!(read_cookie(&headers, "login"), Some("abc".to_string()));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_strings() {
        let cookie = session_cookie("login", "tok", 60);
        assert!(cookie.starts_with("login=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(expired_cookie("login").contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let fx = fixture(vec![]);
        let first = registered(&fx, "First@Example.org").await;
        let second = registered(&fx, "second@example.org").await;

        assert_eq!(first.id, "first@example.org");
        assert!(first.admin);
        assert!(!second.admin);
    }

    #[tokio::test]
    async fn test_configured_admins() {
        let fx = fixture(vec!["boss@example.org".to_string()]);
        registered(&fx, "someone@example.org").await;
        let boss = registered(&fx, "boss@example.org").await;
        assert!(boss.admin);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_and_duplicate() {
        let fx = fixture(vec![]);
        let bad = Credentials {
            email: "nope".into(),
            password: "short".into(),
        };
        assert!(matches!(
            fx.accounts.register(&bad).await,
            Err(AppError::Validation { .. })
        ));

        registered(&fx, "reader@example.org").await;
        assert!(matches!(
            fx.accounts.register(&creds("Reader@example.org")).await,
            Err(AppError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirmation_is_single_use() {
        let fx = fixture(vec![]);
        fx.accounts.register(&creds("reader@example.org")).await.unwrap();
        let reference = last_reference(&fx.mailer);

        fx.accounts.confirm(&reference).await.unwrap();
        assert!(fx.accounts.confirm(&reference).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_login_authenticate_logout() {
        let fx = fixture(vec![]);
        registered(&fx, "reader@example.org").await;

        let login = fx.accounts.login(&creds("READER@example.org")).await.unwrap();
        assert!(login.context.admin);
        assert_ne!(login.session.id, login.token);

        let ctx = fx.accounts.authenticate(&login.token).await.unwrap();
        assert_eq!(ctx.user_id, "reader@example.org");

        assert!(fx.accounts.logout(&login.token).await.unwrap());
        assert!(!fx.accounts.logout(&login.token).await.unwrap());
        assert!(matches!(
            fx.accounts.authenticate(&login.token).await,
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let fx = fixture(vec![]);
        registered(&fx, "reader@example.org").await;

        let wrong = Credentials {
            email: "reader@example.org".into(),
            password: "incorrect horse".into(),
        };
        assert!(matches!(
            fx.accounts.login(&wrong).await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            fx.accounts.login(&creds("nobody@example.org")).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_require_admin() {
        let ctx = AuthContext {
            user_id: "u".into(),
            email: "u@example.org".into(),
            admin: false,
        };
        assert!(matches!(ctx.require_admin(), Err(AppError::Forbidden { .. })));
    }
}
