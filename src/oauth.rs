//! Server-side store for OAuth `state` values.
//!
//! Every login gets a fresh random state. The callback consumes it: a value
//! is accepted once, and only within `STATE_LIFETIME` of being issued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const STATE_LIFETIME: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub struct OAuthStateStore {
    issued: Mutex<HashMap<String, Instant>>,
    lifetime: Duration,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::with_lifetime(STATE_LIFETIME)
    }
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            issued: Mutex::new(HashMap::new()),
            lifetime,
        }
    }

    /// Issues a new state value and drops any that have already expired.
    pub async fn issue(&self) -> String {
        let state = Uuid::new_v4().simple().to_string();
        let mut issued = self.issued.lock().await;
        let lifetime = self.lifetime;
        issued.retain(|_, at| at.elapsed() < lifetime);
        issued.insert(state.clone(), Instant::now());
        state
    }

    /// Removes `state` and reports whether it was issued and still fresh.
    pub async fn consume(&self, state: &str) -> bool {
        match self.issued.lock().await.remove(state) {
            Some(at) => at.elapsed() < self.lifetime,
            None => false,
        }
    }
}

pub type OAuthStateState = Arc<OAuthStateStore>;
