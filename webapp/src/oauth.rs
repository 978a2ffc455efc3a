//! Authorization-code client for the identity provider.

use crate::claims::decode_claims;
use crate::config::Config;
use crate::error::AppError;
use crate::identity::{Account, AuthResult};
use crate::security::SecureString;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scopes every sign-in requests regardless of configuration
const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// PKCE code verifier and challenge pair.
#[derive(Debug)]
pub struct PkceChallenge {
    /// Kept in the session, sent with the token exchange.
    pub verifier: String,
    /// BASE64URL(SHA256(verifier)), sent with the authorize request.
    pub challenge: String,
}

impl PkceChallenge {
    pub fn new() -> Self {
        let mut verifier_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        Self { verifier, challenge }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: u64,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// Serialized token cache kept opaque in the identity context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenCache {
    pub fn serialize(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("Failed to serialize token cache: {}", e)))
    }

    pub fn deserialize(blob: &str) -> Result<Self, AppError> {
        serde_json::from_str(blob)
            .map_err(|e| AppError::Internal(format!("Failed to read token cache: {}", e)))
    }
}

/// OAuth2 / OpenID Connect client for the configured authority.
pub struct OAuthClient {
    authority: String,
    client_id: String,
    client_secret: SecureString,
    redirect_uri: String,
    scopes: Vec<String>,
    sign_out_endpoint: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            authority: config.authority.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            sign_out_endpoint: config.sign_out_endpoint.clone(),
            http_client,
        })
    }

    /// OIDC scopes followed by the configured ones, without duplicates
    pub fn scope_string(&self) -> String {
        let mut scopes: Vec<&str> = OIDC_SCOPES.to_vec();
        for scope in &self.scopes {
            if !scopes.contains(&scope.as_str()) {
                scopes.push(scope);
            }
        }
        scopes.join(" ")
    }

    /// Authorize endpoint URL for the browser redirect.
    pub fn authorization_url(&self, state: &str, nonce: &str, pkce: &PkceChallenge) -> Result<Url, AppError> {
        let mut url = Url::parse(&format!("{}oauth2/v2.0/authorize", self.authority))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scope_string())
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    /// Provider logout URL that returns the browser to `post_logout_redirect_uri`.
    pub fn sign_out_url(&self, post_logout_redirect_uri: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.sign_out_endpoint)?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Returns the auth result and the token cache to store alongside it.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<(AuthResult, TokenCache), AppError> {
        let token_endpoint = format!("{}oauth2/v2.0/token", self.authority);

        let mut params: Vec<(&str, String)> = vec![
            ("client_id", self.client_id.clone()),
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("scope", self.scope_string()),
        ];
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier.to_string()));
        }
        if !self.client_secret.is_empty() {
            params.push(("client_secret", self.client_secret.as_str().to_string()));
        }

        let response = self
            .http_client
            .post(&token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token exchange failed: HTTP {} - {}", status, error_body);
            return Err(AppError::TokenExchange(format!("HTTP {}", status.as_u16())));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::TokenExchange(e.to_string()))?;

        self.auth_result_from(token_response)
    }

    fn auth_result_from(&self, response: TokenResponse) -> Result<(AuthResult, TokenCache), AppError> {
        let id_token = response
            .id_token
            .ok_or_else(|| AppError::TokenExchange("token response has no id_token".to_string()))?;

        let claims = decode_claims(&id_token)?;
        let claim = |name: &str| claims.get(name).and_then(Value::as_str).unwrap_or_default().to_string();

        let environment = Url::parse(&self.authority)?
            .host_str()
            .unwrap_or_default()
            .to_string();
        let account = Account {
            home_account_id: format!("{}.{}", claim("oid"), claim("tid")),
            environment,
            username: claim("preferred_username"),
            tenant_id: claim("tid"),
        };

        let expires_on = i64::try_from(response.expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::TokenExchange(format!("expires_in out of range: {}", response.expires_in))
            })?;
        let scopes = response
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let cache = TokenCache {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token,
            id_token: id_token.clone(),
            expires_at: expires_on,
        };

        let result = AuthResult {
            account,
            id_token,
            id_token_claims: claims,
            access_token: response.access_token,
            scopes,
            expires_on,
        };

        Ok((result, cache))
    }
}
