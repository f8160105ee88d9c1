//! HTML pages, rendered with maud.

use actix_web::http::StatusCode;
use maud::{html, Markup, PreEscaped, Render, DOCTYPE};
use url::{Position, Url};

use crate::db::{Page, Post, User};
use crate::flash::FlashMessage;
use crate::forms::{FieldErrors, FieldKind, Form, Submission};

pub fn picture_url(filename: &str) -> String {
    format!("/static/profile_pics/{}", filename)
}

/// Site-relative link to a user's posts, with the username percent-encoded as one path segment.
pub fn posts_url(username: &str, page: Option<u32>) -> String {
    let Ok(mut url) = Url::parse("http://localhost/user/") else {
        return "/".to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(username);
    }
    if let Some(page) = page {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    url[Position::BeforePath..].to_string()
}

/// Shared page frame: navigation for the viewer plus pending flash messages.
pub struct Layout<'a> {
    pub title: &'a str,
    pub viewer: Option<&'a User>,
    pub flashes: Vec<FlashMessage>,
}

impl<'a> Layout<'a> {
    pub fn new(title: &'a str, viewer: Option<&'a User>, flashes: Vec<FlashMessage>) -> Self {
        Self { title, viewer, flashes }
    }

    pub fn wrap(&self, content: Markup) -> Markup {
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { "Blog - " (self.title) }
                }
                body {
                    nav class="navbar" {
                        a href="/" { "Home" }
                        @if let Some(user) = self.viewer {
                            a href="/account" { "Account" }
                            a href=(posts_url(&user.username, None)) { "My Posts" }
                            a href="/logout" { "Logout" }
                        } @else {
                            a href="/login" { "Login" }
                            a href="/register" { "Register" }
                        }
                    }
                    main class="container" {
                        @for flash in &self.flashes {
                            div class=(format!("alert alert-{}", flash.level.as_str())) { (flash.text) }
                        }
                        (content)
                    }
                }
            }
        }
    }
}

/// Renders a form from its field table, echoing submitted values (never passwords)
/// and listing each field's errors beneath it.
pub struct FormView<'a> {
    pub form: &'a Form,
    pub submission: &'a Submission,
    pub errors: &'a FieldErrors,
}

impl Render for FormView<'_> {
    fn render(&self) -> Markup {
        let enctype = if self.form.has_uploads() { "multipart/form-data" } else { "application/x-www-form-urlencoded" };
        html! {
            form method="POST" enctype=(enctype) novalidate {
                fieldset {
                    legend { (self.form.title) }
                    @for field in &self.form.fields {
                        @let errors = self.errors.get(field.name);
                        @let class = if errors.is_empty() { "form-control" } else { "form-control is-invalid" };
                        div class="form-group" {
                            @match field.kind {
                                FieldKind::Checkbox => {
                                    input type="checkbox" id=(field.name) name=(field.name)
                                        checked[self.submission.flag(field.name)];
                                    label for=(field.name) { (field.label) }
                                }
                                FieldKind::File => {
                                    label for=(field.name) { (field.label) }
                                    input type="file" id=(field.name) name=(field.name) class=(class) accept=".png,.jpg";
                                }
                                FieldKind::Password => {
                                    label for=(field.name) { (field.label) }
                                    input type="password" id=(field.name) name=(field.name) class=(class)
                                        required[field.is_required()];
                                }
                                FieldKind::Text | FieldKind::Email => {
                                    label for=(field.name) { (field.label) }
                                    input type=(if field.kind == FieldKind::Email { "email" } else { "text" })
                                        id=(field.name) name=(field.name) class=(class)
                                        value=(self.submission.value(field.name))
                                        required[field.is_required()];
                                }
                            }
                            @for error in errors {
                                div class="invalid-feedback" { span { (error) } }
                            }
                        }
                    }
                }
                div class="form-group" {
                    input type="submit" class="btn btn-outline-info" value=(self.form.submit);
                }
            }
        }
    }
}

pub fn home(layout: &Layout) -> Markup {
    layout.wrap(html! {
        h1 { "Blog" }
        @if let Some(user) = layout.viewer {
            p { "Signed in as " strong { (user.username) } "." }
        } @else {
            p { a href="/register" { "Join today" } " or " a href="/login" { "log in" } "." }
        }
    })
}

pub fn register(layout: &Layout, form: FormView) -> Markup {
    layout.wrap(html! {
        div class="content-section" {
            (form)
        }
        div class="border-top pt-3" {
            small { "Already Have An Account? " a href="/login" { "Sign In" } }
        }
    })
}

pub fn login(layout: &Layout, form: FormView) -> Markup {
    layout.wrap(html! {
        div class="content-section" {
            (form)
            small { a href="/reset_password" { "Forgot Password?" } }
        }
        div class="border-top pt-3" {
            small { "Need An Account? " a href="/register" { "Sign Up Now" } }
        }
    })
}

pub fn account(layout: &Layout, user: &User, form: FormView) -> Markup {
    layout.wrap(html! {
        div class="content-section" {
            div class="media" {
                img class="rounded-circle account-img" src=(picture_url(&user.image_file)) alt="Profile picture";
                div class="media-body" {
                    h2 class="account-heading" { (user.username) }
                    p class="text-secondary" { (user.email) }
                }
            }
            (form)
            form method="POST" action="/account/delete" {
                input type="submit" class="btn btn-danger" value="Delete Account";
            }
        }
    })
}

pub fn user_posts(layout: &Layout, author: &User, posts: &Page<Post>) -> Markup {
    layout.wrap(html! {
        h1 class="mb-3" { "Posts by " (author.username) " (" (posts.total) ")" }
        @for post in &posts.items {
            article class="media content-section" {
                img class="rounded-circle article-img" src=(picture_url(&author.image_file)) alt="";
                div class="media-body" {
                    div class="article-metadata" {
                        a class="mr-2" href=(posts_url(&author.username, None)) { (author.username) }
                        small class="text-muted" { (post.date_posted.format("%Y-%m-%d")) }
                    }
                    h2 class="article-title" { (post.title) }
                    p class="article-content" { (post.content) }
                }
            }
        }
        nav class="pagination" {
            @if posts.has_prev() {
                a class="btn btn-outline-info" href=(posts_url(&author.username, Some(posts.page - 1))) { "Previous" }
            }
            @for number in 1..=posts.pages() {
                @if number == posts.page {
                    span class="btn btn-info" { (number) }
                } @else {
                    a class="btn btn-outline-info" href=(posts_url(&author.username, Some(number))) { (number) }
                }
            }
            @if posts.has_next() {
                a class="btn btn-outline-info" href=(posts_url(&author.username, Some(posts.page + 1))) { "Next" }
            }
        }
    })
}

pub fn reset_request(layout: &Layout, form: FormView) -> Markup {
    layout.wrap(html! {
        div class="content-section" { (form) }
    })
}

pub fn reset_token(layout: &Layout, form: FormView) -> Markup {
    layout.wrap(html! {
        div class="content-section" { (form) }
    })
}

pub fn error_page(status: StatusCode, message: &str) -> Markup {
    let layout = Layout::new(status.canonical_reason().unwrap_or("Error"), None, Vec::new());
    layout.wrap(html! {
        div class="content-section" {
            h1 { (status.as_u16()) " " (status.canonical_reason().unwrap_or("Error")) }
            p { (message) }
            p { a href="/" { (PreEscaped("&larr; ")) "Back home" } }
        }
    })
}
