pub mod config;
pub mod error;
pub mod security;
pub mod claims;
pub mod identity;
pub mod session;
pub mod oauth;
pub mod graph;
pub mod state;
pub mod gate;
pub mod views;
pub mod handlers;

pub use config::{Config, CliArgs, Properties, REQUIRED_KEYS};
pub use error::AppError;
pub use claims::{Claims, decode_claims, displayable_claims, HIDDEN_CLAIMS};
pub use identity::{Account, AuthResult, GroupsClaim, IdentityContext, groups_from_claims};
pub use session::{Session, SessionStore, SESSION_COOKIE};
pub use oauth::{OAuthClient, PkceChallenge, TokenCache, TokenResponse};
pub use graph::GraphClient;
pub use state::{AppState, SharedState};
pub use gate::{ProtectedEndpoints, auth_gate, is_request_allowed};
pub use handlers::build_router;
pub use views::Views;
