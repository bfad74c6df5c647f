use std::sync::OnceLock;

use ammonia::Builder;
use html_escape::encode_double_quoted_attribute;
use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::authenticate;
use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{new_id, now, parse_body, path_id, respond};
use crate::core::query_params::{get_int, parse_query_params};
use crate::feed::{get_post, list_feed, list_feed_page, load_post, post_view};
use crate::models::models::Post;
use crate::models::views::{LikeState, PostView, StatusView};
use crate::uploads::ensure_upload_exists;

#[derive(Deserialize)]
struct CreatePostRequest {
    #[serde(default)]
    caption: String,
    image: Option<String>,
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"https?://[^\s<]+").expect("Regex should compile")
    })
}

fn tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("Regex should compile"))
}

fn linkify_text(out: &mut String, text: &str) {
    let linked = url_regex().replace_all(text, |caps: &regex::Captures| {
        let url = &caps[0];
        let escaped_url = encode_double_quoted_attribute(url);
        format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
    });
    out.push_str(&linked);
}

fn filter_post_content(content: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // Linkify bare URLs in text nodes; tags and existing anchors stay as they are
    let mut out = String::with_capacity(clean.len());
    let mut anchor_depth = 0usize;
    let mut last = 0;
    for tag in tag_regex().find_iter(&clean) {
        let text = &clean[last..tag.start()];
        if anchor_depth == 0 {
            linkify_text(&mut out, text);
        } else {
            out.push_str(text);
        }

        let name = tag.as_str().to_ascii_lowercase();
        if name == "<a>" || name.starts_with("<a ") {
            anchor_depth += 1;
        } else if name.starts_with("</a>") {
            anchor_depth = anchor_depth.saturating_sub(1);
        }
        out.push_str(tag.as_str());
        last = tag.end();
    }
    if anchor_depth == 0 {
        linkify_text(&mut out, &clean[last..]);
    } else {
        out.push_str(&clean[last..]);
    }
    out
}

/// Creates a post. Caption and image may not both be empty.
pub fn create_post<S: DocumentStore>(
    store: &S,
    user_id: &str,
    caption: &str,
    image: Option<&str>,
) -> Result<PostView, ApiError> {
    let caption = caption.trim();
    if caption.chars().count() > MAX_CAPTION_LENGTH {
        return Err(ApiError::validation("Caption too long"));
    }

    let image = image.map(str::trim).filter(|path| !path.is_empty());
    if let Some(path) = image {
        ensure_upload_exists(store, path)?;
    }

    let caption = filter_post_content(caption);
    if caption.trim().is_empty() && image.is_none() {
        return Err(ApiError::validation("Caption or image is required"));
    }

    let post = Post {
        id: new_id(),
        user_id: user_id.to_string(),
        caption,
        image: image.map(str::to_string),
        created_at: now(),
    };

    store.set_json(&post_key(&post.id), &post)?;
    store.list_push_front(FEED_KEY, &post.id)?;

    info!(post_id = %post.id, user_id, "created post");
    Ok(post_view(store, &post)?)
}

/// Deletes a post owned by `user_id`. Someone else's post and a missing post
/// produce the same outcome.
pub fn delete_post<S: DocumentStore>(store: &S, user_id: &str, post_id: &str) -> Result<StatusView, ApiError> {
    match load_post(store, post_id)? {
        Some(post) if post.user_id == user_id => {}
        _ => return Err(ApiError::NotFoundOrUnauthorized),
    }

    store.delete(&post_key(post_id))?;
    purge_post_remnants(store, post_id)?;

    info!(post_id, user_id, "deleted post");
    Ok(StatusView::ok("Post deleted"))
}

/// Removes everything hanging off a deleted post. Safe to repeat.
pub(crate) fn purge_post_remnants<S: DocumentStore>(store: &S, post_id: &str) -> anyhow::Result<()> {
    store.set_remove(FEED_KEY, post_id)?;
    store.delete(&likes_key(post_id))?;
    for comment_id in store.set_members(&post_comments_key(post_id))? {
        store.delete(&comment_key(&comment_id))?;
    }
    store.delete(&post_comments_key(post_id))?;
    Ok(())
}

/// Flips the caller's like on a post and returns the resulting like set.
pub fn toggle_like<S: DocumentStore>(store: &S, user_id: &str, post_id: &str) -> Result<LikeState, ApiError> {
    if !store.exists(&post_key(post_id))? {
        return Err(ApiError::not_found("Post not found"));
    }

    let liked = store.set_toggle(&likes_key(post_id), user_id)?;
    let likes = store.set_members(&likes_key(post_id))?;

    Ok(LikeState {
        post_id: post_id.to_string(),
        liked,
        like_count: likes.len(),
        likes,
    })
}

// === HTTP Handlers ===

pub fn list_posts<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    let result = match (get_int(&params, "page"), get_int(&params, "limit")) {
        (None, None) => list_feed(store),
        (page, limit) => list_feed_page(store, page.unwrap_or(1), limit.unwrap_or(POSTS_PER_PAGE)),
    };
    respond(200, result)
}

pub fn handle_create_post<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let body = parse_body::<CreatePostRequest>(req)?;
        create_post(store, &session.user_id, &body.caption, body.image.as_deref())
    });
    respond(201, result)
}

pub fn handle_get_post<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = path_id(req.path(), "/api/posts/").and_then(|post_id| get_post(store, post_id));
    respond(200, result)
}

pub fn handle_toggle_like<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let post_id = path_id(req.path(), "/api/posts/like/")?;
        toggle_like(store, &session.user_id, post_id)
    });
    respond(200, result)
}

pub fn handle_delete_post<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let post_id = path_id(req.path(), "/api/posts/").map_err(|_| ApiError::NotFoundOrUnauthorized)?;
        delete_post(store, &session.user_id, post_id)
    });
    respond(200, result)
}
