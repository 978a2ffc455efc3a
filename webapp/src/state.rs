use crate::config::Config;
use crate::error::AppError;
use crate::graph::GraphClient;
use crate::oauth::OAuthClient;
use crate::session::SessionStore;
use crate::views::Views;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide application state
///
/// Everything here is read-only after start except the session store, which
/// synchronizes internally.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub oauth: OAuthClient,
    pub graph: GraphClient,
    pub views: Views,
}

/// Shared state for use across async tasks
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
        let oauth = OAuthClient::new(&config)?;
        let graph = GraphClient::new(&config.graph_endpoint)?;
        let views = Views::new()?;

        Ok(Self {
            config,
            sessions,
            oauth,
            graph,
            views,
        })
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// State TTL as a chrono duration for `IdentityContext::state_is_valid`
    pub fn state_ttl(&self) -> chrono::TimeDelta {
        // config caps the TTL at MAX_TTL_SECS
        chrono::TimeDelta::try_seconds(self.config.state_ttl_secs as i64).unwrap_or(chrono::TimeDelta::zero())
    }
}
