//! Shared-token authorization for gateway requests.
//!
//! A request is authorized when its `Authorization` header carries one of the
//! configured tokens, either as `Basic <token>` or `Bearer <token>`. The token
//! is compared verbatim; `Basic` is not base64-decoded.

use axum::http::{HeaderMap, header};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};

const SCHEMES: [&str; 2] = ["Basic ", "Bearer "];

/// Authorization configuration: the set of accepted tokens.
#[derive(Clone)]
pub struct AuthConfig {
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Create an AuthConfig from a list of tokens.
    ///
    /// At least one non-empty token is required; the gateway never runs open.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid_tokens = HashSet::new();
        for token in tokens {
            let trimmed = token.trim().to_string();
            if trimmed.is_empty() {
                return Err("Empty token value in configuration".to_string());
            }
            valid_tokens.insert(trimmed);
        }
        if valid_tokens.is_empty() {
            return Err("At least one access token must be configured".to_string());
        }
        Ok(Self {
            tokens: valid_tokens,
        })
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Check the request headers. Runs before any pool work.
    pub fn authenticate(&self, headers: &HeaderMap) -> GatewayResult<()> {
        let token = match extract_token(headers) {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("Authorization failed: missing Authorization header");
                return Err(GatewayError::authorization(
                    "Missing Authorization header",
                ));
            }
            Err(msg) => {
                warn!("Authorization failed: invalid header format");
                return Err(GatewayError::authorization(msg));
            }
        };

        if self.verify_token(token) {
            Ok(())
        } else {
            warn!(token_prefix = %mask_token(token), "Authorization failed: invalid token");
            Err(GatewayError::authorization("Invalid access token"))
        }
    }

    fn verify_token(&self, provided: &str) -> bool {
        // Visit every token so timing does not reveal which one matched.
        let mut found = false;
        for expected in &self.tokens {
            if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                found = true;
            }
        }
        found
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_count", &self.tokens.len())
            .finish()
    }
}

fn extract_token(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let token = SCHEMES
        .iter()
        .find_map(|scheme| auth_str.strip_prefix(scheme))
        .ok_or("Invalid Authorization header format. Expected 'Basic <token>'")?;

    if token.is_empty() {
        return Err("Access token is empty");
    }

    Ok(Some(token))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(3).collect();
    if prefix.len() == token.len() {
        "***".to_string()
    } else {
        format!("{}***", prefix)
    }
}
