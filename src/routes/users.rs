//! Registration, login, account management and password resets.
//!
//! Every POST either redirects with `303 See Other` or redisplays its form
//! with per-field errors. Authentication state comes in through the
//! [`Viewer`] extractor; nothing here reads an ambient "current user".

use actix_multipart::Multipart;
use actix_web::http::header::HeaderValue;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::auth::Viewer;
use crate::db::{Page, Post, User};
use crate::error::{AppError, DatabaseError, StorageError};
use crate::flash::{Flashes, Level};
use crate::forms::{self, FieldErrors, Submission, Upload, ValidationContext};
use crate::mail;
use crate::routes::{attach_flash, clear_session, page, redirect_with, see_other};
use crate::views::{self, FormView};
use crate::AppState;

pub const POSTS_PER_PAGE: u32 = 5;

pub const ACCOUNT_CREATED: &str = "Account created!";
pub const LOGGED_IN: &str = "You have been logged in!";
pub const LOGIN_FAILED: &str = "Login Unsuccessful. Check email or password";
pub const ACCOUNT_UPDATED: &str = "Your account has been updated!";
pub const RESET_SENT: &str = "An email has been sent with instructions to reset your password.";
pub const INVALID_TOKEN: &str = "That is an invalid/expired token";
pub const PASSWORD_UPDATED: &str = "Your password has been updated! You are now able to log in";
pub const ACCOUNT_DELETED: &str = "Account deleted. Sad to see you go :(";
pub const UNREADABLE_PICTURE: &str = "Unable to read image file";

type FormData = web::Form<HashMap<String, String>>;

#[derive(Debug, Deserialize)]
pub struct NextPage {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

/// `next` when it stays on this site and fits in a `Location` header, otherwise home.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control)
                && HeaderValue::from_str(path).is_ok() =>
        {
            path
        }
        _ => "/",
    }
}

fn home_redirect() -> HttpResponse {
    see_other("/").finish()
}

/// Maps a unique-index conflict back onto the field the pre-check would have flagged.
fn record_conflict(errors: &mut FieldErrors, field: &str) -> Result<(), AppError> {
    match field {
        "username" => errors.add("username", forms::USERNAME_TAKEN),
        "email" => errors.add("email", forms::EMAIL_TAKEN),
        other => return Err(DatabaseError::Duplicate(other.to_string()).into()),
    }
    Ok(())
}

async fn hash_password(state: &AppState, password: &str) -> Result<String, AppError> {
    let hasher = state.auth.hasher().clone();
    let password = password.to_string();
    Ok(web::block(move || hasher.hash(&password)).await??)
}

async fn discard_picture(state: &AppState, filename: &str) {
    if let Err(e) = state.pictures.remove(filename).await {
        warn!("Could not remove profile picture {}: {}", filename, e);
    }
}

/// Collects a multipart body into a [`Submission`], refusing bodies over `limit` bytes.
async fn read_multipart(mut payload: Multipart, limit: usize) -> Result<Submission, AppError> {
    let mut submission = Submission::default();
    let mut received = 0usize;

    while let Some(mut field) = payload.try_next().await? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            received += chunk.len();
            if received > limit {
                return Err(AppError::ValidationError(format!("Request body exceeds {} bytes", limit)));
            }
            bytes.extend_from_slice(&chunk);
        }

        match filename {
            // An empty file input still sends a part; it means "no new picture".
            Some(filename) if filename.is_empty() || bytes.is_empty() => {}
            Some(filename) => {
                submission = submission.with_file(&name, Upload::new(&filename, bytes));
            }
            None => submission.set(&name, String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    Ok(submission)
}

fn register_page(viewer: &Viewer, flashes: Flashes, submission: &Submission, errors: &FieldErrors) -> HttpResponse {
    let form = forms::registration();
    page("Register", viewer, flashes, |layout| {
        views::register(layout, FormView { form: &form, submission, errors })
    })
}

fn login_page(viewer: &Viewer, flashes: Flashes, submission: &Submission, errors: &FieldErrors) -> HttpResponse {
    let form = forms::login();
    page("Login", viewer, flashes, |layout| {
        views::login(layout, FormView { form: &form, submission, errors })
    })
}

fn account_page(
    viewer: &Viewer,
    flashes: Flashes,
    user: &User,
    submission: &Submission,
    errors: &FieldErrors,
) -> HttpResponse {
    let form = forms::account_update();
    page("Account", viewer, flashes, |layout| {
        views::account(layout, user, FormView { form: &form, submission, errors })
    })
}

fn reset_request_page(viewer: &Viewer, flashes: Flashes, submission: &Submission, errors: &FieldErrors) -> HttpResponse {
    let form = forms::request_reset();
    page("Reset Password", viewer, flashes, |layout| {
        views::reset_request(layout, FormView { form: &form, submission, errors })
    })
}

fn reset_token_page(viewer: &Viewer, flashes: Flashes, errors: &FieldErrors) -> HttpResponse {
    let form = forms::reset_password();
    let submission = Submission::default();
    page("Reset Password", viewer, flashes, |layout| {
        views::reset_token(layout, FormView { form: &form, submission: &submission, errors })
    })
}

pub async fn register_form(viewer: Viewer, flashes: Flashes) -> HttpResponse {
    if viewer.is_authenticated() {
        return home_redirect();
    }
    register_page(&viewer, flashes, &Submission::default(), &FieldErrors::default())
}

pub async fn register(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    form: FormData,
) -> Result<HttpResponse, AppError> {
    if viewer.is_authenticated() {
        return Ok(home_redirect());
    }

    let submission = Submission::new(form.into_inner());
    let ctx = ValidationContext::new(&*state.users);
    let mut errors = forms::registration().validate(&submission, &ctx).await?;

    if errors.is_empty() {
        let digest = hash_password(&state, submission.value("password")).await?;
        let user = User::new(
            submission.value("username").to_string(),
            submission.value("email").to_string(),
            digest,
            state.pictures.default_picture(),
        );

        match state.users.create(&user).await {
            Ok(user) => {
                info!("Registered user {} <{}>", user.username, user.email);
                return Ok(redirect_with("/login", Level::Success, ACCOUNT_CREATED));
            }
            Err(DatabaseError::Duplicate(field)) => record_conflict(&mut errors, &field)?,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(register_page(&viewer, flashes, &submission, &errors))
}

pub async fn login_form(viewer: Viewer, flashes: Flashes) -> HttpResponse {
    if viewer.is_authenticated() {
        return home_redirect();
    }
    login_page(&viewer, flashes, &Submission::default(), &FieldErrors::default())
}

pub async fn login(
    state: web::Data<AppState>,
    viewer: Viewer,
    mut flashes: Flashes,
    query: web::Query<NextPage>,
    form: FormData,
) -> Result<HttpResponse, AppError> {
    if viewer.is_authenticated() {
        return Ok(home_redirect());
    }

    let submission = Submission::new(form.into_inner());
    let errors = forms::login()
        .validate(&submission, &ValidationContext::new(&*state.users))
        .await?;

    if errors.is_empty() {
        let email = submission.value("email");
        match state.auth.authenticate(email, submission.value("password")).await? {
            Some(user) => {
                let mut response = see_other(safe_next(query.next.as_deref()));
                let cookie = state.auth.start_session(&user, submission.flag("remember")).await?;
                info!("User {} logged in", user.username);

                response.cookie(cookie);
                attach_flash(&mut response, Level::Success, LOGGED_IN);
                return Ok(response.finish());
            }
            None => {
                info!("Failed login for {}", email);
                flashes.push(Level::Danger, LOGIN_FAILED);
            }
        }
    }

    Ok(login_page(&viewer, flashes, &submission, &errors))
}

pub async fn logout(state: web::Data<AppState>, viewer: Viewer) -> Result<HttpResponse, AppError> {
    if let Some(token) = viewer.session_token() {
        if let Err(e) = state.auth.end_session(token).await {
            warn!("Failed to end session on logout: {}", e);
        }
    }
    if let Some(user) = viewer.user() {
        info!("User {} logged out", user.username);
    }

    let mut response = see_other("/");
    clear_session(&mut response, &state);
    Ok(response.finish())
}

pub async fn account_form(viewer: Viewer, flashes: Flashes) -> Result<HttpResponse, AppError> {
    let user = viewer.require("/account")?;
    let submission = Submission::from_pairs([
        ("username", user.username.as_str()),
        ("email", user.email.as_str()),
    ]);
    Ok(account_page(&viewer, flashes, user, &submission, &FieldErrors::default()))
}

pub async fn account(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let user = viewer.require("/account")?;
    let mut submission = read_multipart(payload, state.config.storage.max_upload_bytes).await?;

    let ctx = ValidationContext::editing(&*state.users, user);
    let mut errors = forms::account_update().validate(&submission, &ctx).await?;
    if !errors.is_empty() {
        return Ok(account_page(&viewer, flashes, user, &submission, &errors));
    }

    let mut updated = user.clone();
    updated.username = submission.value("username").to_string();
    updated.email = submission.value("email").to_string();

    let mut new_picture = None;
    if let Some(upload) = submission.take_file("picture") {
        match state.pictures.save(upload).await {
            Ok(filename) => {
                updated.image_file = filename.clone();
                new_picture = Some(filename);
            }
            Err(StorageError::InvalidImage(reason)) => {
                debug!("Rejected picture from {}: {}", user.username, reason);
                errors.add("picture", UNREADABLE_PICTURE);
                return Ok(account_page(&viewer, flashes, user, &submission, &errors));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = state.users.update(&updated).await {
        if let Some(filename) = &new_picture {
            discard_picture(&state, filename).await;
        }
        return match e {
            DatabaseError::Duplicate(field) => {
                record_conflict(&mut errors, &field)?;
                Ok(account_page(&viewer, flashes, user, &submission, &errors))
            }
            e => Err(e.into()),
        };
    }

    if new_picture.is_some() {
        discard_picture(&state, &user.image_file).await;
    }
    info!("User {} updated their account", updated.username);
    Ok(redirect_with("/account", Level::Success, ACCOUNT_UPDATED))
}

pub async fn user_posts(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let username = path.into_inner();
    let author = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or(AppError::NotFound)?;

    // Unparseable page numbers fall back to the first page.
    let number = query
        .page
        .as_deref()
        .and_then(|p| p.parse::<i64>().ok())
        .unwrap_or(1);
    let number = u32::try_from(number).map_err(|_| AppError::NotFound)?;
    if number == 0 {
        return Err(AppError::NotFound);
    }

    let posts = state.posts.page_by_author(author.id, number, POSTS_PER_PAGE).await?;
    if Page::<Post>::out_of_range(number, POSTS_PER_PAGE, posts.total) {
        return Err(AppError::NotFound);
    }

    let title = format!("{}'s posts", author.username);
    Ok(page(&title, &viewer, flashes, |layout| views::user_posts(layout, &author, &posts)))
}

pub async fn reset_request_form(viewer: Viewer, flashes: Flashes) -> HttpResponse {
    if viewer.is_authenticated() {
        return home_redirect();
    }
    reset_request_page(&viewer, flashes, &Submission::default(), &FieldErrors::default())
}

async fn send_reset_email(state: &AppState, user: &User) -> Result<(), AppError> {
    let token = state.reset_tokens.issue(user.id)?;
    let link = format!("{}/reset_password/{}", state.config.site.base_url.trim_end_matches('/'), token);

    match state.mailer.send(mail::reset_email(&user.email, &link)).await {
        Ok(()) => info!("Password reset e-mail sent to {}", user.email),
        Err(e) => warn!("Password reset e-mail to {} failed: {}", user.email, e),
    }
    Ok(())
}

pub async fn reset_request(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    form: FormData,
) -> Result<HttpResponse, AppError> {
    if viewer.is_authenticated() {
        return Ok(home_redirect());
    }

    let submission = Submission::new(form.into_inner());
    let ctx = ValidationContext::new(&*state.users);
    let mut errors = forms::request_reset().validate(&submission, &ctx).await?;

    if errors.is_empty() {
        match state.users.find_by_email(submission.value("email")).await? {
            Some(user) => {
                send_reset_email(&state, &user).await?;
                return Ok(redirect_with("/login", Level::Info, RESET_SENT));
            }
            // Deleted between validation and lookup.
            None => errors.add("email", forms::EMAIL_UNKNOWN),
        }
    }

    Ok(reset_request_page(&viewer, flashes, &submission, &errors))
}

/// The user a reset token points at. Forged, expired and orphaned tokens are
/// all `None`.
async fn reset_target(state: &AppState, token: &str) -> Result<Option<User>, AppError> {
    match state.reset_tokens.verify(token) {
        Some(user_id) => Ok(state.users.find_by_id(user_id).await?),
        None => Ok(None),
    }
}

fn invalid_token() -> HttpResponse {
    redirect_with("/reset_password", Level::Warning, INVALID_TOKEN)
}

pub async fn reset_token_form(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    if viewer.is_authenticated() {
        return Ok(home_redirect());
    }
    if reset_target(&state, &path).await?.is_none() {
        return Ok(invalid_token());
    }
    Ok(reset_token_page(&viewer, flashes, &FieldErrors::default()))
}

pub async fn reset_token(
    state: web::Data<AppState>,
    viewer: Viewer,
    flashes: Flashes,
    path: web::Path<String>,
    form: FormData,
) -> Result<HttpResponse, AppError> {
    if viewer.is_authenticated() {
        return Ok(home_redirect());
    }
    let Some(mut user) = reset_target(&state, &path).await? else {
        return Ok(invalid_token());
    };

    let submission = Submission::new(form.into_inner());
    let errors = forms::reset_password()
        .validate(&submission, &ValidationContext::new(&*state.users))
        .await?;
    if !errors.is_empty() {
        return Ok(reset_token_page(&viewer, flashes, &errors));
    }

    user.password_hash = hash_password(&state, submission.value("password")).await?;
    state.users.update(&user).await?;
    info!("User {} reset their password", user.username);

    Ok(redirect_with("/login", Level::Success, PASSWORD_UPDATED))
}

pub async fn delete_account(state: web::Data<AppState>, viewer: Viewer) -> Result<HttpResponse, AppError> {
    let current = viewer.require("/account")?;
    let user = state
        .users
        .find_by_username(&current.username)
        .await?
        .ok_or(AppError::NotFound)?;

    // The session goes first so no request can see a deleted but signed-in user.
    if let Some(token) = viewer.session_token() {
        state.auth.end_session(token).await?;
    }
    state.users.delete(user.id).await?;
    discard_picture(&state, &user.image_file).await;
    info!("User {} deleted their account", user.username);

    let mut response = see_other("/");
    clear_session(&mut response, &state);
    attach_flash(&mut response, Level::Success, ACCOUNT_DELETED);
    Ok(response.finish())
}
