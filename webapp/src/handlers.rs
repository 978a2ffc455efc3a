use crate::claims::displayable_claims;
use crate::error::AppError;
use crate::gate::auth_gate;
use crate::oauth::PkceChallenge;
use crate::security::{validate_auth_code, validate_state_param};
use crate::session::Session;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Build the application router with the authentication gate in front of
/// every route, fallback included.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/auth/sign_in", get(sign_in))
        .route("/auth/redirect", get(redirect_callback))
        .route("/auth/sign_out", get(sign_out))
        .route("/auth/groups", get(groups))
        .route("/auth_token_details", get(token_details))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    state.views.index(&session.context)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Start the authorization-code flow
async fn sign_in(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let login_state = Uuid::new_v4().to_string();
    let nonce = Uuid::new_v4().to_string();
    let pkce = PkceChallenge::new();

    let url = state.oauth.authorization_url(&login_state, &nonce, &pkce)?;
    let context = session
        .context
        .begin_login(login_state, nonce, None)
        .with_pkce_verifier(pkce.verifier);

    info!("Redirecting to identity provider for sign-in");
    Ok((Extension(context), Redirect::to(url.as_str())).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Provider redirects here with `code` and `state`, or with `error`
async fn redirect_callback(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    if let Some(error) = params.error {
        warn!(
            provider_error = %error,
            provider_error_description = params.error_description.as_deref().unwrap_or_default(),
            "Identity provider returned an error"
        );
        return Ok(state.views.unauthorized_response());
    }

    let returned_state = params
        .state
        .ok_or_else(|| AppError::InvalidCallback("missing state".to_string()))?;
    if !validate_state_param(&returned_state) || !session.context.state_is_valid(&returned_state, state.state_ttl()) {
        warn!(decision = "deny", reason = "state_mismatch", "Login callback state rejected");
        return Err(AppError::StateMismatch);
    }

    let code = params
        .code
        .filter(|code| validate_auth_code(code))
        .ok_or_else(|| AppError::InvalidCallback("missing or malformed code".to_string()))?;

    let (result, cache) = state
        .oauth
        .exchange_code(&code, session.context.pkce_verifier())
        .await?;

    if !session.context.nonce_matches(&result.id_token_claims) {
        warn!(decision = "deny", reason = "nonce_mismatch", "Id token nonce rejected");
        return Err(AppError::NonceMismatch);
    }

    let mut context = session.context.complete_login(result, cache.serialize()?)?;

    if context.has_groups_overage() {
        let access_token = context.access_token().unwrap_or_default().to_string();
        match state.graph.member_of_group_ids(&access_token).await {
            Ok(group_ids) => {
                info!(group_count = group_ids.len(), "Resolved groups overage from directory");
                context = context.with_groups(group_ids);
            }
            Err(e) => warn!(error = %e, "Groups overage could not be resolved"),
        }
    }

    info!(
        username = context.username().unwrap_or_default(),
        group_count = context.group_ids().len(),
        "Sign-in completed"
    );
    Ok((Extension(context), Redirect::to(&state.config.home_page)).into_response())
}

async fn sign_out(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let post_logout_redirect = format!("{}{}", state.config.home_page, state.config.post_sign_out_fragment);
    let url = state.oauth.sign_out_url(&post_logout_redirect)?;

    info!(username = session.context.username().unwrap_or_default(), "Signing out");
    Ok((Extension(session.context.cleared()), Redirect::to(url.as_str())).into_response())
}

async fn token_details(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let claims = displayable_claims(session.context.claims());
    for (name, value) in &claims {
        debug!(claim = %name, value = %value, "Displaying claim");
    }
    state.views.token_details(session.context.is_authenticated(), &claims)
}

async fn groups(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    state.views.groups(&session.context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Properties};
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let props = Properties::from_toml_str(
            r#"
[aad]
authority = "https://login.microsoftonline.com/contoso/"
client_id = "client-123"
scopes = "User.Read"

[app.protect]
authenticated = "/auth_token_details, /auth/groups"
"#,
        )
        .unwrap();
        AppState::new(Config::from_properties(&props).unwrap()).unwrap().shared()
    }

    fn router() -> Router {
        build_router(test_state())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router()
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sign_in_redirects_with_pkce() {
        let response = router()
            .oneshot(Request::builder().uri("/auth/sign_in").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize?"));
        assert!(location.contains("code_challenge_method=S256"));
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_anonymous_pages_do_not_create_sessions() {
        let state = test_state();
        let app = build_router(state.clone());

        for uri in ["/health", "/", "/health"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(header::SET_COOKIE));
        }
        assert_eq!(state.sessions.size(), 0);
    }

    #[tokio::test]
    async fn test_groups_requires_sign_in() {
        let response = router()
            .oneshot(Request::builder().uri("/auth/groups").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
