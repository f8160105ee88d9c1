use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::password::CredentialHasher;
use crate::config::AuthConfig;
use crate::db::{SessionStore, User, UserDirectory, UserSession};
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

/// Login sessions: a signed token in a cookie, backed by a `user_sessions` row.
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    hasher: CredentialHasher,
    jwt_secret: String,
    session_lifetime: Duration,
    remember_lifetime: Duration,
    secure_cookies: bool,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
        hasher: CredentialHasher,
        config: &AuthConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            jwt_secret: config.secret_key.clone(),
            session_lifetime: Duration::hours(config.session_hours),
            remember_lifetime: Duration::days(config.remember_days),
            secure_cookies: config.secure_cookies,
        }
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// The user owning `email` when `password` matches their hash. Unknown
    /// e-mail and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(None);
        };

        let hasher = self.hasher.clone();
        let digest = user.password_hash.clone();
        let password = password.to_string();
        let verified = actix_web::web::block(move || hasher.verify(&digest, &password)).await?;

        Ok(verified.then_some(user))
    }

    /// Persists a new session for `user` and returns the cookie that carries it.
    pub async fn start_session(&self, user: &User, remember: bool) -> Result<Cookie<'static>, AppError> {
        let lifetime = if remember { self.remember_lifetime } else { self.session_lifetime };
        let token = self.generate_token(&user.id.to_string(), lifetime)?;

        let session = UserSession::new(user.id, token.clone(), lifetime);
        self.sessions.create_session(&session).await?;

        let mut cookie = Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .finish();
        if remember {
            cookie.set_max_age(CookieDuration::seconds(lifetime.num_seconds()));
        }
        Ok(cookie)
    }

    /// The user behind a session token, or `None` for anything stale or forged.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, AppError> {
        let Some(session) = self.sessions.get_session_by_token(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            debug!("Session {} expired", session.id);
            return Ok(None);
        }

        let Some(claims) = self.decode_token(token) else {
            return Ok(None);
        };
        let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
            return Ok(None);
        };
        if user_id != session.user_id {
            return Ok(None);
        }

        let user = self.users.find_by_id(user_id).await?;
        if user.is_some() {
            self.sessions.update_session_activity(token).await?;
        }
        Ok(user)
    }

    pub async fn end_session(&self, token: &str) -> Result<(), AppError> {
        self.sessions.delete_session(token).await?;
        Ok(())
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
        cookie.make_removal();
        cookie
    }

    fn generate_token(&self, user_id: &str, lifetime: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    fn decode_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .ok()
        .map(|data| data.claims)
    }
}
