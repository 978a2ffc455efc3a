//! In-memory session store.
//!
//! Maps the session cookie to the last persisted `IdentityContext` snapshot.
//! Idle sessions expire after the configured TTL.

use crate::identity::IdentityContext;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "webapp_session";

/// Default idle lifetime of a session (1 hour)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

struct SessionEntry {
    context: IdentityContext,
    last_seen: Instant,
}

/// Session id plus the identity snapshot loaded for this request
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub context: IdentityContext,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Snapshot stored for `id`; an empty context when unknown or expired.
    pub fn load(&self, id: &str) -> IdentityContext {
        let now = Instant::now();

        // The Ref must be dropped before remove() or the shard deadlocks
        let found = match self.sessions.get(id) {
            Some(entry) if now.duration_since(entry.last_seen) < self.ttl => Some(entry.context.clone()),
            Some(_) => None,
            None => return IdentityContext::default(),
        };

        match found {
            Some(context) => context,
            None => {
                self.sessions.remove(id);
                IdentityContext::default()
            }
        }
    }

    /// Store the snapshot a request ended with and refresh the idle timer
    pub fn persist(&self, id: &str, context: IdentityContext) {
        self.sessions.insert(
            id.to_string(),
            SessionEntry {
                context: context.persisted(),
                last_seen: Instant::now(),
            },
        );
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    /// Drop idle sessions; call periodically.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.sessions
            .retain(|_, entry| now.duration_since(entry.last_seen) < self.ttl);
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Session id carried by the request's cookies, if any
pub fn session_id_from_jar(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string())
}

/// Cookie handed out with a freshly minted session
pub fn session_cookie(id: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
