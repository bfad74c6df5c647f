//! Response shapes. Every view that mentions a user embeds an
//! [`AuthorProjection`], never the stored [`User`] record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{Comment, Post, User};
use crate::follow::ReconcileReport;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthorProjection {
    pub id: String,
    pub username: String,
    pub profile_image: Option<String>,
}

impl From<&User> for AuthorProjection {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            profile_image: user.profile_image.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PublicUser {
    /// Projection including the email; only for the account owner.
    pub fn private(user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            ..Self::public(user)
        }
    }

    pub fn public(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: None,
            bio: user.bio.clone(),
            profile_image: user.profile_image.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct PostView {
    pub id: String,
    pub author: AuthorProjection,
    pub caption: String,
    pub image: Option<String>,
    pub likes: Vec<String>,
    pub like_count: usize,
    pub comment_count: usize,
    pub created_at: DateTime<Utc>,
}

impl PostView {
    pub fn new(post: &Post, author: AuthorProjection, likes: Vec<String>, comment_count: usize) -> Self {
        Self {
            id: post.id.clone(),
            author,
            caption: post.caption.clone(),
            image: post.image.clone(),
            like_count: likes.len(),
            likes,
            comment_count,
            created_at: post.created_at,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct PostDetailView {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentView>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author: AuthorProjection,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: &Comment, author: AuthorProjection) -> Self {
        Self {
            id: comment.id.clone(),
            post_id: comment.post_id.clone(),
            author,
            text: comment.text.clone(),
            created_at: comment.created_at,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct LikeState {
    pub post_id: String,
    pub liked: bool,
    pub likes: Vec<String>,
    pub like_count: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct ProfileView {
    pub user: PublicUser,
    pub followers: Vec<AuthorProjection>,
    pub following: Vec<AuthorProjection>,
    pub follower_count: usize,
    pub following_count: usize,
    pub post_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    pub posts: Vec<PostView>,
}

#[derive(Serialize, Clone, Debug)]
pub struct LoginView {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Serialize, Clone, Debug)]
pub struct UploadView {
    pub path: String,
}

#[derive(Serialize, Debug)]
pub struct ReconcileView {
    pub follows: ReconcileReport,
    pub comment_references_removed: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct StatusView {
    pub success: bool,
    pub message: &'static str,
}

impl StatusView {
    pub fn ok(message: &'static str) -> Self {
        Self { success: true, message }
    }
}
