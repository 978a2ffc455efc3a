//! Per-session identity record.
//!
//! `IdentityContext` is an immutable snapshot: every transition returns a new
//! value with `changed` set and leaves the receiver untouched. The session
//! store persists whichever snapshot a request ends with.

use crate::claims::Claims;
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cached account handle returned with a token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<oid>.<tid>`
    pub home_account_id: String,
    /// Provider host the account belongs to
    pub environment: String,
    pub username: String,
    pub tenant_id: String,
}

/// Outcome of a successful authorization-code exchange
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub account: Account,
    pub id_token: String,
    /// Claims decoded from `id_token`
    pub id_token_claims: Claims,
    pub access_token: String,
    pub scopes: Vec<String>,
    pub expires_on: DateTime<Utc>,
}

/// How the id token reports group membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupsClaim {
    /// `groups` present as an inline array
    Inline(Vec<String>),
    /// `groups` omitted, `_claim_names.groups` points elsewhere
    Overage,
    /// No group information at all
    Absent,
}

/// Inspect `groups` / `_claim_names` to find out how membership was reported
pub fn groups_from_claims(claims: &Claims) -> GroupsClaim {
    if let Some(Value::Array(groups)) = claims.get("groups") {
        return GroupsClaim::Inline(
            groups
                .iter()
                .filter_map(|g| g.as_str().map(str::to_string))
                .collect(),
        );
    }

    match claims.get("_claim_names") {
        Some(Value::Object(names)) if names.contains_key("groups") => GroupsClaim::Overage,
        _ => GroupsClaim::Absent,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityContext {
    nonce: Option<String>,
    state: Option<String>,
    policy: Option<String>,
    state_timestamp: Option<DateTime<Utc>>,
    pkce_verifier: Option<String>,
    authenticated: bool,
    username: Option<String>,
    access_token: Option<String>,
    raw_id_token: Option<String>,
    id_token_claims: Claims,
    id_token_group_ids: Vec<String>,
    groups_overage: bool,
    account: Option<Account>,
    token_cache: Option<String>,
    changed: bool,
}

impl IdentityContext {
    /// Record anti-replay correlation data before redirecting to the provider.
    ///
    /// `policy` only applies to B2C authorities.
    pub fn begin_login(&self, state: String, nonce: String, policy: Option<String>) -> Self {
        Self {
            state: Some(state),
            nonce: Some(nonce),
            policy,
            state_timestamp: Some(Utc::now()),
            changed: true,
            ..self.clone()
        }
    }

    pub fn with_pkce_verifier(&self, verifier: String) -> Self {
        Self {
            pkce_verifier: Some(verifier),
            changed: true,
            ..self.clone()
        }
    }

    /// Populate the context from a token response.
    ///
    /// Fails only when the id token carries no usable username claim.
    /// Correlation data from `begin_login` is consumed.
    pub fn complete_login(&self, result: AuthResult, serialized_cache: String) -> Result<Self, AppError> {
        let claims = result.id_token_claims;

        let username = ["name", "preferred_username"]
            .iter()
            .find_map(|key| claims.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::TokenParse("id token carries neither name nor preferred_username".to_string())
            })?;

        let (id_token_group_ids, groups_overage) = match groups_from_claims(&claims) {
            GroupsClaim::Inline(groups) => (groups, false),
            GroupsClaim::Overage => (Vec::new(), true),
            GroupsClaim::Absent => (Vec::new(), false),
        };

        Ok(Self {
            nonce: None,
            state: None,
            policy: None,
            state_timestamp: None,
            pkce_verifier: None,
            authenticated: true,
            username: Some(username),
            access_token: Some(result.access_token),
            raw_id_token: Some(result.id_token),
            id_token_claims: claims,
            id_token_group_ids,
            groups_overage,
            account: Some(result.account),
            token_cache: Some(serialized_cache),
            changed: true,
        })
    }

    /// Replace the group list with ids fetched from the directory
    pub fn with_groups(&self, group_ids: Vec<String>) -> Self {
        Self {
            id_token_group_ids: group_ids,
            groups_overage: false,
            changed: true,
            ..self.clone()
        }
    }

    /// Reset every field (logout)
    pub fn cleared(&self) -> Self {
        Self {
            changed: true,
            ..Self::default()
        }
    }

    /// Snapshot as stored: same data, `changed` reset
    pub fn persisted(self) -> Self {
        Self {
            changed: false,
            ..self
        }
    }

    /// True when `state` is the one recorded by `begin_login` and is younger than `ttl`
    pub fn state_is_valid(&self, state: &str, ttl: Duration) -> bool {
        match (&self.state, self.state_timestamp) {
            (Some(expected), Some(issued)) => expected == state && Utc::now() - issued <= ttl,
            _ => false,
        }
    }

    /// True when the id token's `nonce` claim equals the recorded nonce
    pub fn nonce_matches(&self, claims: &Claims) -> bool {
        match (&self.nonce, claims.get("nonce").and_then(Value::as_str)) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn raw_id_token(&self) -> Option<&str> {
        self.raw_id_token.as_deref()
    }

    pub fn claims(&self) -> &Claims {
        &self.id_token_claims
    }

    pub fn group_ids(&self) -> &[String] {
        &self.id_token_group_ids
    }

    pub fn has_groups_overage(&self) -> bool {
        self.groups_overage
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn token_cache(&self) -> Option<&str> {
        self.token_cache.as_deref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn policy(&self) -> Option<&str> {
        self.policy.as_deref()
    }

    pub fn state_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state_timestamp
    }

    pub fn pkce_verifier(&self) -> Option<&str> {
        self.pkce_verifier.as_deref()
    }
}
