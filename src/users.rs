use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use ammonia::Builder;
use tracing::info;

use crate::auth::{authenticate, optional_session};
use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{path_id, parse_body, respond};
use crate::feed::get_profile;
use crate::models::models::User;
use crate::models::views::PublicUser;
use crate::uploads::ensure_upload_exists;

#[derive(Deserialize, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub profile_image: Option<String>,
}

pub(crate) fn sanitize_text(text: &str) -> String {
    // Plain text only: every tag is stripped
    Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string()
}

pub fn load_user<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<Option<User>> {
    store.get_json(&user_key(user_id))
}

/// Applies the provided fields only; absent fields keep their stored value.
/// An empty bio clears it.
pub fn update_profile<S: DocumentStore>(
    store: &S,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<User, ApiError> {
    let mut user = load_user(store, user_id)?.ok_or(ApiError::Unauthorized)?;

    if let Some(bio) = update.bio {
        if bio.chars().count() > MAX_BIO_LENGTH {
            return Err(ApiError::validation("Bio too long (max 500 chars)"));
        }
        let sanitized_bio = sanitize_text(bio.trim());
        user.bio = if sanitized_bio.is_empty() { None } else { Some(sanitized_bio) };
    }

    if let Some(image) = update.profile_image {
        ensure_upload_exists(store, &image)?;
        user.profile_image = Some(image);
    }

    store.set_json(&user_key(user_id), &user)?;
    info!(user_id, "profile updated");
    Ok(user)
}

// === HTTP Handlers ===

pub fn get_user_profile<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = path_id(req.path(), "/api/users/profile/").and_then(|user_id| {
        let viewer = optional_session(store, req)?;
        get_profile(store, user_id, viewer.as_ref().map(|s| s.user_id.as_str()))
    });
    respond(200, result)
}

pub fn update_user_profile<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let update = parse_body::<ProfileUpdate>(req)?;
        update_profile(store, &session.user_id, update).map(|user| PublicUser::private(&user))
    });
    respond(200, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register;
    use crate::core::db::MemoryStore;

    #[test]
    fn sanitize_strips_markup() {
        assert_eq!(sanitize_text("<b>hi</b><script>x()</script>"), "hi");
    }

    #[test]
    fn partial_update_leaves_absent_fields_untouched() {
        let store = MemoryStore::new();
        let user = register(&store, "alice", "alice@x.com", "pw123").unwrap();

        let updated = update_profile(
            &store,
            &user.id,
            ProfileUpdate { bio: Some("hello".into()), profile_image: None },
        )
        .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("hello"));

        let again = update_profile(&store, &user.id, ProfileUpdate::default()).unwrap();
        assert_eq!(again.bio.as_deref(), Some("hello"));
        assert_eq!(again.profile_image, None);
    }

    #[test]
    fn profile_image_must_reference_an_upload() {
        let store = MemoryStore::new();
        let user = register(&store, "alice", "alice@x.com", "pw123").unwrap();
        let err = update_profile(
            &store,
            &user.id,
            ProfileUpdate { bio: None, profile_image: Some("/uploads/missing.png".into()) },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn bio_length_is_capped() {
        let store = MemoryStore::new();
        let user = register(&store, "alice", "alice@x.com", "pw123").unwrap();
        let err = update_profile(
            &store,
            &user.id,
            ProfileUpdate { bio: Some("a".repeat(MAX_BIO_LENGTH + 1)), profile_image: None },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
