use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::auth::authenticate;
use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{new_id, now, parse_body, path_id, respond, validate_uuid};
use crate::feed::{comment_view, list_comments};
use crate::models::models::Comment;
use crate::models::views::{CommentView, StatusView};
use crate::users::sanitize_text;

#[derive(Deserialize)]
struct CommentRequest {
    #[serde(default)]
    text: String,
}

pub fn add_comment<S: DocumentStore>(
    store: &S,
    user_id: &str,
    post_id: &str,
    text: &str,
) -> Result<CommentView, ApiError> {
    let text = sanitize_text(text.trim());
    if text.is_empty() {
        return Err(ApiError::validation("Comment text required"));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::validation("Comment too long"));
    }
    if !store.exists(&post_key(post_id))? {
        return Err(ApiError::not_found("Post not found"));
    }

    let comment = Comment {
        id: new_id(),
        post_id: post_id.to_string(),
        user_id: user_id.to_string(),
        text,
        created_at: now(),
    };

    store.set_json(&comment_key(&comment.id), &comment)?;
    store.set_add(&post_comments_key(post_id), &comment.id)?;

    // The post may have been deleted after the check above; its cleanup could
    // have missed the comment just linked.
    if !store.exists(&post_key(post_id))? {
        crate::posts::purge_post_remnants(store, post_id)?;
        store.delete(&comment_key(&comment.id))?;
        return Err(ApiError::not_found("Post not found"));
    }

    info!(comment_id = %comment.id, post_id, user_id, "added comment");
    Ok(comment_view(store, &comment)?)
}

/// Deletes the caller's own comment. Always succeeds: a comment that does not
/// exist or belongs to someone else is left alone without saying so.
pub fn delete_comment<S: DocumentStore>(store: &S, user_id: &str, comment_id: &str) -> Result<StatusView, ApiError> {
    let ok = StatusView::ok("Comment deleted");
    if !validate_uuid(comment_id) {
        return Ok(ok);
    }

    let comment = match store.get_json::<Comment>(&comment_key(comment_id))? {
        Some(comment) if comment.user_id == user_id => comment,
        _ => {
            debug!(comment_id, "delete of absent or foreign comment ignored");
            return Ok(ok);
        }
    };

    store.delete(&comment_key(comment_id))?;
    store.set_remove(&post_comments_key(&comment.post_id), comment_id)?;

    info!(comment_id, post_id = %comment.post_id, user_id, "deleted comment");
    Ok(ok)
}

/// Drops feed entries whose post is gone and comment references that no
/// longer resolve. Returns how many references were removed.
pub fn reconcile_comments<S: DocumentStore>(store: &S) -> anyhow::Result<usize> {
    let mut removed = 0;
    for post_id in store.set_members(FEED_KEY)? {
        if !store.exists(&post_key(&post_id))? {
            crate::posts::purge_post_remnants(store, &post_id)?;
            removed += 1;
            continue;
        }
        for comment_id in store.set_members(&post_comments_key(&post_id))? {
            if !store.exists(&comment_key(&comment_id))? {
                store.set_remove(&post_comments_key(&post_id), &comment_id)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

// === HTTP Handlers ===

pub fn handle_add_comment<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let post_id = path_id(req.path(), "/api/comments/")?;
        let body = parse_body::<CommentRequest>(req)?;
        add_comment(store, &session.user_id, post_id, &body.text)
    });
    respond(201, result)
}

pub fn handle_list_comments<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let post_id = req.path().trim_start_matches("/api/comments/");
    let result = if validate_uuid(post_id) {
        list_comments(store, post_id)
    } else {
        Ok(Vec::new())
    };
    respond(200, result)
}

pub fn handle_delete_comment<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let comment_id = req.path().trim_start_matches("/api/comments/");
        delete_comment(store, &session.user_id, comment_id)
    });
    respond(200, result)
}
