// Common test utilities
#![allow(dead_code)]

use aad_webapp::{AppState, Config, Properties, SharedState, SESSION_COOKIE};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;

pub const TENANT: &str = "contoso";
pub const HOME_PAGE: &str = "http://localhost:8080";

/// Build an id token carrying `claims` with a placeholder signature
pub fn unsigned_id_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode(b"not-a-signature");
    format!("{}.{}.{}", header, payload, signature)
}

/// Application state pointing the authority and directory at `idp_uri`
pub fn test_state(idp_uri: &str) -> SharedState {
    let toml = format!(
        r#"
[aad]
authority = "{idp}/{tenant}/"
client_id = "client-123"
scopes = "User.Read GroupMember.Read.All"
secret = "test-secret"
graph_endpoint = "{idp}/v1.0"
post_sign_out_fragment = "/signed-out"

[app]
home_page = "{home}"
state_ttl = 600

[app.protect]
authenticated = "/auth_token_details, /auth/groups"
"#,
        idp = idp_uri,
        tenant = TENANT,
        home = HOME_PAGE,
    );

    let props = Properties::from_toml_str(&toml).expect("test properties");
    let config = Config::from_properties(&props).expect("test config");
    AppState::new(config).expect("test state").shared()
}

/// Serve the router on an ephemeral port and return its base URL
pub async fn spawn_app(state: SharedState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = aad_webapp::build_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    format!("http://{}", addr)
}

/// HTTP client that leaves redirects to the test
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// `webapp_session=<id>` pair from a response's `Set-Cookie`
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", SESSION_COOKIE)))
        .map(|pair| pair.to_string())
}

/// Session id part of a `webapp_session=<id>` pair
pub fn session_id(cookie: &str) -> String {
    cookie
        .split_once('=')
        .map(|(_, id)| id.to_string())
        .unwrap_or_default()
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
