//! Route table and the small response helpers every handler shares.

pub mod users;

use actix_web::http::header::{self, ContentType};
use actix_web::{web, HttpResponse, HttpResponseBuilder};
use maud::Markup;

use crate::auth::Viewer;
use crate::error::AppError;
use crate::flash::{self, FlashMessage, Flashes, Level};
use crate::views::{self, Layout};
use crate::AppState;

/// Served when the configured placeholder picture is missing on disk.
const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="125" height="125" viewBox="0 0 125 125"><rect width="125" height="125" fill="#dee2e6"/><circle cx="62.5" cy="48" r="24" fill="#adb5bd"/><ellipse cx="62.5" cy="112" rx="40" ry="30" fill="#adb5bd"/></svg>"##;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/home", web::get().to(home))
        .route("/health", web::get().to(crate::health_check))
        .route("/static/profile_pics/{filename}", web::get().to(profile_picture))
        .service(
            web::resource("/register")
                .route(web::get().to(users::register_form))
                .route(web::post().to(users::register)),
        )
        .service(
            web::resource("/login")
                .route(web::get().to(users::login_form))
                .route(web::post().to(users::login)),
        )
        .route("/logout", web::get().to(users::logout))
        .service(
            web::resource("/account")
                .route(web::get().to(users::account_form))
                .route(web::post().to(users::account)),
        )
        .route("/account/delete", web::post().to(users::delete_account))
        .route("/user/{username}", web::get().to(users::user_posts))
        .service(
            web::resource("/reset_password")
                .route(web::get().to(users::reset_request_form))
                .route(web::post().to(users::reset_request)),
        )
        .service(
            web::resource("/reset_password/{token}")
                .route(web::get().to(users::reset_token_form))
                .route(web::post().to(users::reset_token)),
        );
}

/// A `303 See Other` to `location`.
pub(crate) fn see_other(location: &str) -> HttpResponseBuilder {
    let mut builder = HttpResponse::SeeOther();
    builder.insert_header((header::LOCATION, location.to_string()));
    builder
}

/// Attaches a one-message flash cookie to a redirect.
pub(crate) fn attach_flash(builder: &mut HttpResponseBuilder, level: Level, text: &str) {
    if let Some(cookie) = flash::outgoing_cookie(&[FlashMessage::new(level, text)]) {
        builder.cookie(cookie);
    }
}

/// Redirect carrying a single flash message.
pub(crate) fn redirect_with(location: &str, level: Level, text: &str) -> HttpResponse {
    let mut builder = see_other(location);
    attach_flash(&mut builder, level, text);
    builder.finish()
}

/// Renders a full page. Pending flashes are shown and the cookie that
/// carried them is cleared.
pub(crate) fn page(
    title: &str,
    viewer: &Viewer,
    mut flashes: Flashes,
    body: impl FnOnce(&Layout) -> Markup,
) -> HttpResponse {
    let clear = flashes.arrived();
    let layout = Layout::new(title, viewer.user(), flashes.take());
    let markup = body(&layout);

    let mut builder = HttpResponse::Ok();
    builder.content_type(ContentType::html());
    if clear {
        builder.cookie(flash::removal_cookie());
    }
    builder.body(markup.into_string())
}

/// Removal cookie for the session, attached when a request's session ends.
pub(crate) fn clear_session(builder: &mut HttpResponseBuilder, state: &AppState) {
    builder.cookie(state.auth.removal_cookie());
}

async fn home(viewer: Viewer, flashes: Flashes) -> HttpResponse {
    page("Home", &viewer, flashes, views::home)
}

async fn profile_picture(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let filename = path.into_inner();

    match state.pictures.load(&filename).await? {
        Some(bytes) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            Ok(HttpResponse::Ok().content_type(mime.essence_str()).body(bytes))
        }
        None if filename == state.pictures.default_picture() => Ok(HttpResponse::Ok()
            .content_type("image/svg+xml")
            .body(PLACEHOLDER_SVG)),
        None => Err(AppError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::MemoryStore;
    use crate::mail::OutboxMailer;
    use crate::storage::MockPictureStore;
    use actix_web::{http::StatusCode, test as actix_test, App};
    use std::sync::Arc;

    fn state_with(pictures: MockPictureStore) -> AppState {
        let config = Settings::new_for_test().unwrap();
        AppState::in_memory(config, MemoryStore::new(), Arc::new(OutboxMailer::new()), Arc::new(pictures))
    }

    #[actix_web::test]
    async fn test_serves_stored_picture_with_its_type() {
        let mut pictures = MockPictureStore::new();
        pictures
            .expect_load()
            .withf(|name| name.to_string() == "0a1b2c3d4e5f6789.png")
            .returning(|_| Ok(Some(b"\x89PNG".to_vec())));
        pictures.expect_default_picture().returning(|| "default.jpg".into());

        let app = actix_test::init_service(App::new().app_data(web::Data::new(state_with(pictures))).configure(configure)).await;
        let req = actix_test::TestRequest::get().uri("/static/profile_pics/0a1b2c3d4e5f6789.png").to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    }

    #[actix_web::test]
    async fn test_missing_picture_is_404_but_default_has_placeholder() {
        let mut pictures = MockPictureStore::new();
        pictures.expect_load().returning(|_| Ok(None));
        pictures.expect_default_picture().returning(|| "default.jpg".into());

        let app = actix_test::init_service(App::new().app_data(web::Data::new(state_with(pictures))).configure(configure)).await;

        let req = actix_test::TestRequest::get().uri("/static/profile_pics/gone.png").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = actix_test::TestRequest::get().uri("/static/profile_pics/default.jpg").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/svg+xml");
    }

    #[test]
    fn test_redirect_with_sets_location_and_flash() {
        let resp = redirect_with("/login", Level::Success, "Account created!");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
        assert!(resp.cookies().any(|c| c.name() == flash::FLASH_COOKIE));
    }
}
