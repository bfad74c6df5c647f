//! Follow relations.
//!
//! Each user owns two satellite sets: `following:<id>` and `followers:<id>`.
//! This module is their only writer. A follow writes the actor's `following`
//! set first and the target's `followers` set second; the two writes are not
//! one transaction, so [`repair_follows`] treats `following` as the source
//! of truth and repairs the reciprocal side. Profile reads run it for the
//! viewed user; [`reconcile_follows`] sweeps everyone.

use serde::Serialize;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::authenticate;
use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{path_id, respond};
use crate::comments::reconcile_comments;
use crate::models::views::{ReconcileView, StatusView};

pub fn follow<S: DocumentStore>(store: &S, actor_id: &str, target_id: &str) -> Result<(), ApiError> {
    if actor_id == target_id {
        return Err(ApiError::SelfFollow);
    }
    if !store.exists(&user_key(target_id))? {
        return Err(ApiError::not_found("User not found"));
    }

    let added = store.set_add(&following_key(actor_id), target_id)?;
    store.set_add(&followers_key(target_id), actor_id)?;

    if added {
        info!(actor_id, target_id, "follow");
    }
    Ok(())
}

pub fn unfollow<S: DocumentStore>(store: &S, actor_id: &str, target_id: &str) -> Result<(), ApiError> {
    let removed = store.set_remove(&following_key(actor_id), target_id)?;
    store.set_remove(&followers_key(target_id), actor_id)?;

    if removed {
        info!(actor_id, target_id, "unfollow");
    }
    Ok(())
}

pub fn get_following<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    store.set_members(&following_key(user_id))
}

pub fn get_followers<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<Vec<String>> {
    store.set_members(&followers_key(user_id))
}

pub fn is_following<S: DocumentStore>(store: &S, actor_id: &str, target_id: &str) -> anyhow::Result<bool> {
    Ok(get_following(store, actor_id)?.iter().any(|id| id == target_id))
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub followers_added: usize,
    pub followers_removed: usize,
    pub following_removed: usize,
}

impl ReconcileReport {
    fn absorb(&mut self, other: ReconcileReport) {
        self.followers_added += other.followers_added;
        self.followers_removed += other.followers_removed;
        self.following_removed += other.following_removed;
    }
}

/// Repairs the relations one user owns: their `following` set is trusted, the
/// reciprocal `followers` entries are brought in line with it, and followers
/// who no longer follow back are dropped.
pub fn repair_follows<S: DocumentStore>(store: &S, user_id: &str) -> anyhow::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for target_id in get_following(store, user_id)? {
        let dangling = target_id == user_id || !store.exists(&user_key(&target_id))?;
        if dangling {
            store.set_remove(&following_key(user_id), &target_id)?;
            report.following_removed += 1;
        } else if store.set_add(&followers_key(&target_id), user_id)? {
            report.followers_added += 1;
        }
    }

    for follower_id in get_followers(store, user_id)? {
        if !is_following(store, &follower_id, user_id)? {
            store.set_remove(&followers_key(user_id), &follower_id)?;
            report.followers_removed += 1;
        }
    }

    if report != ReconcileReport::default() {
        warn!(user_id, ?report, "repaired asymmetric follow relations");
    }
    Ok(report)
}

/// Runs [`repair_follows`] for every registered user.
pub fn reconcile_follows<S: DocumentStore>(store: &S) -> anyhow::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for user_id in store.set_members(USERS_LIST_KEY)? {
        report.absorb(repair_follows(store, &user_id)?);
    }
    Ok(report)
}

// === HTTP Handlers ===

pub fn handle_follow<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let target_id = path_id(req.path(), "/api/users/follow/")?;
        follow(store, &session.user_id, target_id).map(|_| StatusView::ok("Followed"))
    });
    respond(200, result)
}

/// Store-wide repair sweep; safe to run at any time.
pub fn handle_reconcile<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let view = ReconcileView {
            follows: reconcile_follows(store)?,
            comment_references_removed: reconcile_comments(store)?,
        };
        info!(user_id = %session.user_id, ?view, "reconciliation sweep");
        Ok(view)
    });
    respond(200, result)
}

pub fn handle_unfollow<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| {
        let target_id = path_id(req.path(), "/api/users/unfollow/")?;
        unfollow(store, &session.user_id, target_id).map(|_| StatusView::ok("Unfollowed"))
    });
    respond(200, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register;
    use crate::core::db::MemoryStore;

    fn pair(store: &MemoryStore) -> (String, String) {
        let a = register(store, "alice", "alice@x.com", "pw123").unwrap();
        let b = register(store, "bob", "bob@x.com", "pw123").unwrap();
        (a.id, b.id)
    }

    #[test]
    fn follow_is_reciprocal_and_unfollow_clears_both_sides() {
        let store = MemoryStore::new();
        let (a, b) = pair(&store);

        follow(&store, &a, &b).unwrap();
        assert_eq!(get_following(&store, &a).unwrap(), vec![b.clone()]);
        assert_eq!(get_followers(&store, &b).unwrap(), vec![a.clone()]);

        unfollow(&store, &a, &b).unwrap();
        assert!(get_following(&store, &a).unwrap().is_empty());
        assert!(get_followers(&store, &b).unwrap().is_empty());
    }

    #[test]
    fn follow_twice_equals_follow_once() {
        let store = MemoryStore::new();
        let (a, b) = pair(&store);
        follow(&store, &a, &b).unwrap();
        follow(&store, &a, &b).unwrap();
        assert_eq!(get_following(&store, &a).unwrap().len(), 1);
        assert_eq!(get_followers(&store, &b).unwrap().len(), 1);
    }

    #[test]
    fn self_follow_is_rejected_without_mutation() {
        let store = MemoryStore::new();
        let (a, _) = pair(&store);
        assert!(matches!(follow(&store, &a, &a), Err(ApiError::SelfFollow)));
        assert!(get_following(&store, &a).unwrap().is_empty());
        assert!(get_followers(&store, &a).unwrap().is_empty());
    }

    #[test]
    fn unfollowing_a_stranger_succeeds() {
        let store = MemoryStore::new();
        let (a, b) = pair(&store);
        unfollow(&store, &a, &b).unwrap();
        assert!(get_following(&store, &a).unwrap().is_empty());
    }

    #[test]
    fn following_a_missing_user_is_not_found() {
        let store = MemoryStore::new();
        let (a, _) = pair(&store);
        let ghost = crate::core::helpers::new_id();
        assert!(matches!(follow(&store, &a, &ghost), Err(ApiError::NotFound(_))));
        assert!(get_following(&store, &a).unwrap().is_empty());
    }

    #[test]
    fn reconcile_repairs_half_written_relations() {
        let store = MemoryStore::new();
        let (a, b) = pair(&store);

        // follow interrupted after the first write
        store.set_add(&following_key(&a), &b).unwrap();
        // unfollow interrupted after the first write
        store.set_add(&followers_key(&a), &b).unwrap();
        // self reference
        store.set_add(&following_key(&b), &b).unwrap();

        let report = reconcile_follows(&store).unwrap();
        assert_eq!(
            report,
            ReconcileReport { followers_added: 1, followers_removed: 1, following_removed: 1 }
        );
        assert_eq!(get_followers(&store, &b).unwrap(), vec![a.clone()]);
        assert!(get_followers(&store, &a).unwrap().is_empty());
        assert!(get_following(&store, &b).unwrap().is_empty());

        assert_eq!(reconcile_follows(&store).unwrap(), ReconcileReport::default());
    }

    #[test]
    fn repair_touches_only_the_given_user() {
        let store = MemoryStore::new();
        let (a, b) = pair(&store);
        store.set_add(&following_key(&a), &b).unwrap();
        store.set_add(&following_key(&b), &b).unwrap();

        let report = repair_follows(&store, &a).unwrap();
        assert_eq!(report.followers_added, 1);
        assert_eq!(get_followers(&store, &b).unwrap(), vec![a.clone()]);
        assert_eq!(get_following(&store, &b).unwrap(), vec![b.clone()]);
    }
}
