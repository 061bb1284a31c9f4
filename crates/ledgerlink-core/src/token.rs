// ── Bearer token source ──
//
// Channels read the token at creation time to build their endpoint URL.
// A missing token is not an error: the connection is attempted
// unauthenticated.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;

/// Anything that can hand out the current session's bearer token.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<SecretString>;
}

/// Session-scoped, in-memory token store.
///
/// Lock-free reads via `ArcSwapOption`; cloning the store shares the slot.
#[derive(Debug, Clone, Default)]
pub struct SessionTokenStore {
    slot: Arc<ArcSwapOption<SecretString>>,
}

impl SessionTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `token`.
    pub fn with_token(token: SecretString) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Replace the stored token (e.g. after login or refresh).
    pub fn set(&self, token: SecretString) {
        self.slot.store(Some(Arc::new(token)));
    }

    /// Forget the token (e.g. on logout).
    pub fn clear(&self) {
        self.slot.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.slot.load().is_some()
    }
}

impl TokenSource for SessionTokenStore {
    fn bearer_token(&self) -> Option<SecretString> {
        self.slot.load_full().map(|token| (*token).clone())
    }
}
