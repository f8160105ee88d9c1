//! One-time notices that survive a redirect.
//!
//! Messages travel in a single cookie holding base64url-encoded JSON. Reading
//! them is free; the response that renders them removes the cookie.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const FLASH_COOKIE: &str = "_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Danger,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

impl FlashMessage {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Self { level, text: text.into() }
    }
}

/// Messages carried in from the previous response, plus any added while
/// handling this request.
#[derive(Debug, Default, Clone)]
pub struct Flashes {
    messages: Vec<FlashMessage>,
    arrived: bool,
}

impl Flashes {
    pub fn read(req: &HttpRequest) -> Self {
        let cookie = req.cookie(FLASH_COOKIE);
        let arrived = cookie.is_some();
        let messages = cookie
            .and_then(|cookie| decode(cookie.value()))
            .unwrap_or_default();
        Self { messages, arrived }
    }

    /// Whether the request carried a flash cookie that must now be cleared.
    pub fn arrived(&self) -> bool {
        self.arrived
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, level: Level, text: impl Into<String>) {
        self.messages.push(FlashMessage::new(level, text));
    }

    pub fn messages(&self) -> &[FlashMessage] {
        &self.messages
    }

    /// Consumes the pending messages, returning them for rendering.
    pub fn take(&mut self) -> Vec<FlashMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl FromRequest for Flashes {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Flashes::read(req)))
    }
}

fn decode(value: &str) -> Option<Vec<FlashMessage>> {
    let bytes = BASE64.decode(value).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Cookie carrying `messages` to the next request, `None` when there is nothing to send.
pub fn outgoing_cookie(messages: &[FlashMessage]) -> Option<Cookie<'static>> {
    if messages.is_empty() {
        return None;
    }
    let json = serde_json::to_vec(messages).ok()?;
    Some(
        Cookie::build(FLASH_COOKIE, BASE64.encode(json))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::minutes(5))
            .finish(),
    )
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}
