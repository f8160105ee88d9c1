use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use crate::auth::service::SESSION_COOKIE;
use crate::db::User;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Who is making the request. Resolved once per request from the session
/// cookie and handed to handlers explicitly.
#[derive(Debug, Clone)]
pub struct Viewer {
    user: Option<User>,
    token: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self { user: None, token: None }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The raw session token, if the request carried a valid one.
    pub fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The signed-in user, or a redirect to the login page that comes back to `next`.
    pub fn require(&self, next: &str) -> Result<&User, AppError> {
        self.user.as_ref().ok_or_else(|| {
            AppError::AuthError(AuthError::LoginRequired { next: next.to_string() })
        })
    }
}

impl FromRequest for Viewer {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());

        Box::pin(async move {
            let state = state.ok_or_else(|| AppError::InternalError("application state missing".into()))?;
            let Some(token) = token.filter(|t| !t.is_empty()) else {
                return Ok(Viewer::anonymous());
            };

            match state.auth.resolve(&token).await? {
                Some(user) => Ok(Viewer { user: Some(user), token: Some(token) }),
                None => Ok(Viewer::anonymous()),
            }
        })
    }
}
