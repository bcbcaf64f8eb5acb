//! Who is signed in.
//!
//! Identity-scoped queries (posts from followed users) read per-user collections.
//! The engine asks a [`SessionProvider`] for the current user at fetch time; when
//! there is none those queries return an empty result instead of an error.

use parking_lot::RwLock;

pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// No one is ever signed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSession;

impl SessionProvider for AnonymousSession {
    fn current_user_id(&self) -> Option<String> {
        None
    }
}

/// A session whose user can be swapped at runtime, e.g. on sign-in and sign-out.
#[derive(Debug, Default)]
pub struct StaticSession {
    user_id: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user_id.write() = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }
}
