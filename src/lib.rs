pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod models;
pub mod posts;
pub mod uploads;
pub mod users;

use spin_sdk::http::{Method, Request, Response};
use tracing::debug;

use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::preflight;

/// Dispatches one request against `store`.
pub fn route<S: DocumentStore>(store: &S, req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    let method = match req.method() {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        Method::Options => "OPTIONS",
        _ => "OTHER",
    };
    debug!(%method, %path, "routing request");

    match (method, path.as_str()) {
        ("OPTIONS", _) => Ok(preflight()),

        ("POST", "/api/auth/register") => auth::register_user(store, &req),
        ("POST", "/api/auth/login") => auth::login_user(store, &req),
        ("POST", "/api/auth/logout") => auth::logout_user(store, &req),

        ("GET", "/api/posts") | ("GET", "/api/posts/") => posts::list_posts(store, &req),
        ("POST", "/api/posts") | ("POST", "/api/posts/") => posts::handle_create_post(store, &req),
        ("POST", p) if p.starts_with("/api/posts/like/") => posts::handle_toggle_like(store, &req),
        ("GET", p) if p.starts_with("/api/posts/") => posts::handle_get_post(store, &req),
        ("DELETE", p) if p.starts_with("/api/posts/") => posts::handle_delete_post(store, &req),

        ("POST", p) if p.starts_with("/api/comments/") => comments::handle_add_comment(store, &req),
        ("GET", p) if p.starts_with("/api/comments/") => comments::handle_list_comments(store, &req),
        ("DELETE", p) if p.starts_with("/api/comments/") => comments::handle_delete_comment(store, &req),

        ("GET", p) if p.starts_with("/api/users/profile/") => users::get_user_profile(store, &req),
        ("PUT", "/api/users/profile") => users::update_user_profile(store, &req),
        ("POST", p) if p.starts_with("/api/users/follow/") => follow::handle_follow(store, &req),
        ("POST", p) if p.starts_with("/api/users/unfollow/") => follow::handle_unfollow(store, &req),

        ("POST", "/api/maintenance/reconcile") => follow::handle_reconcile(store, &req),

        ("POST", "/api/uploads") => uploads::upload_image(store, &req),
        ("GET", p) if p.starts_with(config::UPLOADS_PREFIX) => uploads::serve_upload(store, p),

        _ => Ok(ApiError::not_found("No route found").into()),
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    let store = crate::core::db::SpinStore::open_default()?;
    route(&store, req)
}
