use crate::error::AppError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Id-token claims keyed by claim name
pub type Claims = serde_json::Map<String, Value>;

/// Claims too low-level to show on the token details page
pub const HIDDEN_CLAIMS: [&str; 5] = ["iat", "exp", "nbf", "uti", "aio"];

/// Decode the claims of a compact JWS id token.
///
/// The signature is not checked here: the token comes straight from the
/// provider's token endpoint over TLS.
pub fn decode_claims(raw_id_token: &str) -> Result<Claims, AppError> {
    jsonwebtoken::dangerous::insecure_decode::<Claims>(raw_id_token)
        .map(|data| data.claims)
        .map_err(|e| AppError::TokenParse(e.to_string()))
}

/// Claims to render on the token details page, sorted by name, with the
/// hidden claims removed.
pub fn displayable_claims(claims: &Claims) -> BTreeMap<String, String> {
    claims
        .iter()
        .filter(|(name, _)| !HIDDEN_CLAIMS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), claim_to_string(value)))
        .collect()
}

/// JSON strings render bare, everything else in JSON notation
pub fn claim_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
