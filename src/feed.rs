//! Read-side composition: posts, comments and profiles joined with author
//! projections and derived counts. Counts are always computed from the
//! underlying sets. References that no longer resolve are skipped and then
//! dropped from the set that holds them, so reads repair what an interrupted
//! delete left behind.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::follow::{get_followers, get_following, is_following, repair_follows};
use crate::models::models::{Comment, Post};
use crate::models::views::{
    AuthorProjection, CommentView, PostDetailView, PostView, ProfileView, PublicUser,
};
use crate::posts::purge_post_remnants;
use crate::users::load_user;

/// Newest first; identifier descending breaks timestamp ties.
fn newest_first(a: (&DateTime<Utc>, &str), b: (&DateTime<Utc>, &str)) -> Ordering {
    b.0.cmp(a.0).then_with(|| b.1.cmp(a.1))
}

pub fn author_projection<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<AuthorProjection> {
    Ok(match load_user(store, user_id)? {
        Some(user) => AuthorProjection::from(&user),
        None => AuthorProjection {
            id: user_id.to_string(),
            username: "[deleted]".to_string(),
            profile_image: None,
        },
    })
}

pub fn load_post<S: DocumentStore>(store: &S, post_id: &str) -> anyhow::Result<Option<Post>> {
    store.get_json(&post_key(post_id))
}

/// Comments on a post that still resolve, newest first. Unresolved ids are
/// removed from the post's comment set.
pub fn load_comments<S: DocumentStore>(store: &S, post_id: &str) -> anyhow::Result<Vec<Comment>> {
    let mut comments = Vec::new();
    for comment_id in store.set_members(&post_comments_key(post_id))? {
        match store.get_json::<Comment>(&comment_key(&comment_id))? {
            Some(comment) => comments.push(comment),
            None => {
                store.set_remove(&post_comments_key(post_id), &comment_id)?;
                debug!(post_id, comment_id = %comment_id, "dropped dangling comment reference");
            }
        }
    }
    comments.sort_by(|a, b| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)));
    Ok(comments)
}

fn live_comment_count<S: DocumentStore>(store: &S, post_id: &str) -> anyhow::Result<usize> {
    let mut count = 0;
    for comment_id in store.set_members(&post_comments_key(post_id))? {
        if store.exists(&comment_key(&comment_id))? {
            count += 1;
        }
    }
    Ok(count)
}

pub fn post_view<S: DocumentStore>(store: &S, post: &Post) -> anyhow::Result<PostView> {
    let author = author_projection(store, &post.user_id)?;
    let likes = store.set_members(&likes_key(&post.id))?;
    let comment_count = live_comment_count(store, &post.id)?;
    Ok(PostView::new(post, author, likes, comment_count))
}

pub fn comment_view<S: DocumentStore>(store: &S, comment: &Comment) -> anyhow::Result<CommentView> {
    Ok(CommentView::new(comment, author_projection(store, &comment.user_id)?))
}

fn sorted_posts<S: DocumentStore>(store: &S) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::new();
    for post_id in store.set_members(FEED_KEY)? {
        match load_post(store, &post_id)? {
            Some(post) => posts.push(post),
            None => {
                purge_post_remnants(store, &post_id)?;
                debug!(post_id = %post_id, "dropped dangling feed entry");
            }
        }
    }
    posts.sort_by(|a, b| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)));
    Ok(posts)
}

/// Every post, newest first. Each call re-reads current state.
pub fn list_feed<S: DocumentStore>(store: &S) -> Result<Vec<PostView>, ApiError> {
    let mut views = Vec::new();
    for post in sorted_posts(store)? {
        views.push(post_view(store, &post)?);
    }
    Ok(views)
}

/// One page of the feed; `page` is 1-based.
pub fn list_feed_page<S: DocumentStore>(store: &S, page: usize, limit: usize) -> Result<Vec<PostView>, ApiError> {
    let start = page.saturating_sub(1).saturating_mul(limit);
    let mut views = Vec::new();
    for post in sorted_posts(store)?.into_iter().skip(start).take(limit) {
        views.push(post_view(store, &post)?);
    }
    Ok(views)
}

pub fn get_post<S: DocumentStore>(store: &S, post_id: &str) -> Result<PostDetailView, ApiError> {
    let post = load_post(store, post_id)?.ok_or_else(|| ApiError::not_found("Post not found"))?;
    let comments = list_comments(store, post_id)?;
    Ok(PostDetailView {
        post: post_view(store, &post)?,
        comments,
    })
}

/// Comments on a post, newest first. An unknown post has no comments.
pub fn list_comments<S: DocumentStore>(store: &S, post_id: &str) -> Result<Vec<CommentView>, ApiError> {
    let mut views = Vec::new();
    for comment in load_comments(store, post_id)? {
        views.push(comment_view(store, &comment)?);
    }
    Ok(views)
}

fn projections<S: DocumentStore>(store: &S, ids: Vec<String>) -> anyhow::Result<Vec<AuthorProjection>> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(user) = load_user(store, &id)? {
            out.push(AuthorProjection::from(&user));
        }
    }
    Ok(out)
}

/// Profile of `user_id`, personalized when `viewer_id` is known.
pub fn get_profile<S: DocumentStore>(
    store: &S,
    user_id: &str,
    viewer_id: Option<&str>,
) -> Result<ProfileView, ApiError> {
    let user = load_user(store, user_id)?.ok_or_else(|| ApiError::not_found("User not found"))?;
    repair_follows(store, user_id)?;

    let followers = projections(store, get_followers(store, user_id)?)?;
    let following = projections(store, get_following(store, user_id)?)?;

    let mut posts = Vec::new();
    for post in sorted_posts(store)?.iter().filter(|p| p.user_id == user_id) {
        posts.push(post_view(store, post)?);
    }

    let is_owner = viewer_id == Some(user_id);
    let viewer_follows = match viewer_id {
        Some(viewer) if !is_owner => Some(is_following(store, viewer, user_id)?),
        _ => None,
    };

    Ok(ProfileView {
        user: if is_owner { PublicUser::private(&user) } else { PublicUser::public(&user) },
        follower_count: followers.len(),
        following_count: following.len(),
        post_count: posts.len(),
        followers,
        following,
        is_following: viewer_follows,
        posts,
    })
}
