//! Per-request authentication gate.

use crate::identity::IdentityContext;
use crate::security::{generate_session_id, validate_session_id};
use crate::session::{session_cookie, session_id_from_jar, Session};
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn, Instrument};

/// Substrings of request paths that require an authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedEndpoints(Vec<String>);

impl ProtectedEndpoints {
    /// Parse the comma-space separated `app.protect.authenticated` list
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(", ")
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Substring containment, not path-segment matching: `/api` also
    /// protects `/apikey`.
    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|entry| path.contains(entry.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }
}

/// The gate decision: unprotected paths always pass, protected ones need an
/// authenticated context.
pub fn is_request_allowed(endpoints: &ProtectedEndpoints, path: &str, context: &IdentityContext) -> bool {
    !endpoints.matches(path) || context.is_authenticated()
}

/// Middleware run for every route.
///
/// Loads the session's identity snapshot, refuses unauthenticated access to
/// protected paths with the 401 view, and after a successful response
/// persists the snapshot the handler ended with. A session minted for this
/// request is only stored, and its cookie only set, once its context changes.
pub async fn auth_gate(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    let (session_id, minted) = match session_id_from_jar(&jar).filter(|id| validate_session_id(id)) {
        Some(id) => (id, false),
        None => (generate_session_id(), true),
    };
    let context = state.sessions.load(&session_id);

    let span = tracing::info_span!(
        "request",
        session = %&session_id[..8],
        path = %path,
        authenticated = context.is_authenticated()
    );

    if !is_request_allowed(&state.config.protected_endpoints, &path, &context) {
        span.in_scope(|| {
            warn!(
                decision = "deny",
                reason = "unauthenticated",
                "Protected endpoint requested without an authenticated session"
            )
        });
        return state.views.unauthorized_response();
    }

    req.extensions_mut().insert(Session {
        id: session_id.clone(),
        context: context.clone(),
    });

    let mut response = next.run(req).instrument(span.clone()).await;

    if response.status().as_u16() >= 400 {
        return response;
    }

    let updated = response
        .extensions_mut()
        .remove::<IdentityContext>()
        .unwrap_or(context);
    if updated.has_changed() {
        span.in_scope(|| debug!(authenticated = updated.is_authenticated(), "Identity context updated"));
    } else if minted {
        // nothing worth keeping for an anonymous visitor
        return response;
    }
    state.sessions.persist(&session_id, updated);

    if minted {
        return (jar.add(session_cookie(&session_id)), response).into_response();
    }
    response
}
