use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Json as ResponseJson, Redirect},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use url::Url;

/// Mock Identity Provider for aad-webapp local runs
///
/// Implements just enough of the Azure AD v2 endpoints for the
/// authorization-code flow:
/// - Authorize endpoint issuing one-time codes
/// - Token endpoint returning id tokens that carry the nonce (placeholder signature)
/// - Logout endpoint redirecting back to the application
/// - Directory `memberOf` for the groups overage path

#[derive(Debug, Parser)]
#[command(name = "aad-mock-idp")]
#[command(about = "Mock Azure AD identity provider for local aad-webapp runs")]
struct CliArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen_addr: String,

    /// Display name placed in the `name` claim
    #[arg(long, default_value = "Jane Doe")]
    user_name: String,

    /// Sign-in name placed in `preferred_username`
    #[arg(long, default_value = "jane@contoso.com")]
    user_principal: String,

    /// Comma separated group ids the user belongs to
    #[arg(long, default_value = "g1,g2")]
    groups: String,

    /// Omit inline groups and emit an overage pointer instead
    #[arg(long)]
    overage: bool,
}

/// A code handed out by the authorize endpoint, not yet redeemed
#[derive(Debug, Clone)]
struct PendingCode {
    client_id: String,
    nonce: Option<String>,
}

/// Identity provider state
struct IdpState {
    user_name: String,
    user_principal: String,
    groups: Vec<String>,
    overage: bool,
    /// Outstanding authorization codes
    codes: Arc<RwLock<HashMap<String, PendingCode>>>,
    /// Access tokens accepted by the directory endpoint
    access_tokens: Arc<RwLock<HashSet<String>>>,
}

impl IdpState {
    fn new(args: &CliArgs) -> Self {
        Self {
            user_name: args.user_name.clone(),
            user_principal: args.user_principal.clone(),
            groups: args
                .groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
            overage: args.overage,
            codes: Arc::new(RwLock::new(HashMap::new())),
            access_tokens: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    client_id: String,
    redirect_uri: String,
    state: String,
    nonce: Option<String>,
}

/// Authorize endpoint
///
/// GET /{tenant}/oauth2/v2.0/authorize
/// Signs the user in immediately and redirects back with a code.
async fn handle_authorize(
    State(state): State<Arc<IdpState>>,
    Path(tenant): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, StatusCode> {
    let code = uuid::Uuid::new_v4().simple().to_string();
    {
        let mut codes = state.codes.write().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        codes.insert(
            code.clone(),
            PendingCode {
                client_id: params.client_id.clone(),
                nonce: params.nonce,
            },
        );
    }

    let mut redirect = Url::parse(&params.redirect_uri).map_err(|_| StatusCode::BAD_REQUEST)?;
    redirect
        .query_pairs_mut()
        .append_pair("code", &code)
        .append_pair("state", &params.state);

    info!(tenant = %tenant, client_id = %params.client_id, "Issued authorization code");
    Ok(Redirect::to(redirect.as_str()))
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    grant_type: String,
    code: String,
    client_id: String,
}

/// Token endpoint
///
/// POST /{tenant}/oauth2/v2.0/token
/// Redeems a code for tokens. The id token's signature is a placeholder;
/// aad-webapp decodes claims without verifying it.
async fn handle_token(
    State(state): State<Arc<IdpState>>,
    Path(tenant): Path<String>,
    Form(request): Form<TokenRequest>,
) -> Result<ResponseJson<serde_json::Value>, (StatusCode, ResponseJson<serde_json::Value>)> {
    let invalid_grant = |description: &str| {
        (
            StatusCode::BAD_REQUEST,
            ResponseJson(json!({ "error": "invalid_grant", "error_description": description })),
        )
    };

    if request.grant_type != "authorization_code" {
        return Err(invalid_grant("unsupported grant_type"));
    }

    let pending = state
        .codes
        .write()
        .ok()
        .and_then(|mut codes| codes.remove(&request.code))
        .ok_or_else(|| invalid_grant("unknown or already redeemed code"))?;

    if pending.client_id != request.client_id {
        warn!(client_id = %request.client_id, "Code redeemed by a different client");
        return Err(invalid_grant("code was issued to another client"));
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut claims = json!({
        "aud": request.client_id,
        "iss": format!("http://mock-idp/{}/v2.0", tenant),
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "name": state.user_name,
        "preferred_username": state.user_principal,
        "oid": "00000000-0000-0000-0000-000000000001",
        "tid": tenant,
        "ver": "2.0",
    });
    if let Some(nonce) = pending.nonce {
        claims["nonce"] = json!(nonce);
    }
    if state.overage {
        claims["_claim_names"] = json!({ "groups": "src1" });
        claims["_claim_sources"] = json!({ "src1": { "endpoint": "http://mock-idp/v1.0/me/memberOf" } });
    } else {
        claims["groups"] = json!(state.groups);
    }

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT","kid":"mock-idp"}"#);
    let id_token = format!(
        "{}.{}.{}",
        header,
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(b"mock-idp-signature")
    );
    let access_token = uuid::Uuid::new_v4().to_string();

    if let Ok(mut tokens) = state.access_tokens.write() {
        tokens.insert(access_token.clone());
    }

    info!(tenant = %tenant, overage = state.overage, "Redeemed authorization code");
    Ok(ResponseJson(json!({
        "token_type": "Bearer",
        "scope": "openid profile offline_access User.Read",
        "expires_in": 3600,
        "access_token": access_token,
        "refresh_token": uuid::Uuid::new_v4().to_string(),
        "id_token": id_token,
    })))
}

#[derive(Debug, Deserialize)]
struct LogoutParams {
    post_logout_redirect_uri: Option<String>,
}

/// Logout endpoint
///
/// GET /{tenant}/oauth2/v2.0/logout
async fn handle_logout(Query(params): Query<LogoutParams>) -> Result<Redirect, StatusCode> {
    match params.post_logout_redirect_uri {
        Some(uri) => {
            info!(post_logout_redirect_uri = %uri, "Signed out");
            Ok(Redirect::to(&uri))
        }
        None => Err(StatusCode::BAD_REQUEST),
    }
}

/// Directory group membership
///
/// GET /v1.0/me/memberOf
async fn handle_member_of(
    State(state): State<Arc<IdpState>>,
    headers: HeaderMap,
) -> Result<ResponseJson<serde_json::Value>, StatusCode> {
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let known = state
        .access_tokens
        .read()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .contains(token);
    if !known {
        warn!("memberOf called with an unknown access token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let value: Vec<_> = state
        .groups
        .iter()
        .map(|id| json!({ "@odata.type": "#microsoft.graph.group", "id": id }))
        .collect();

    Ok(ResponseJson(json!({ "value": value })))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let state = Arc::new(IdpState::new(&args));

    let app = Router::new()
        .route("/:tenant/oauth2/v2.0/authorize", get(handle_authorize))
        .route("/:tenant/oauth2/v2.0/token", post(handle_token))
        .route("/:tenant/oauth2/v2.0/logout", get(handle_logout))
        .route("/v1.0/me/memberOf", get(handle_member_of))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!("Mock identity provider listening on {}", args.listen_addr);
    info!("Endpoints:");
    info!("  GET  /{{tenant}}/oauth2/v2.0/authorize - Issue an authorization code");
    info!("  POST /{{tenant}}/oauth2/v2.0/token - Redeem a code for tokens");
    info!("  GET  /{{tenant}}/oauth2/v2.0/logout - Sign out and redirect back");
    info!("  GET  /v1.0/me/memberOf - Group membership (overage path)");

    axum::serve(listener, app).await?;

    Ok(())
}
