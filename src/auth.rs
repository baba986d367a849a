//! HS256 JWT check for metric routes.
//!
//! Only the signature and an optional `exp` claim are verified; any other claim is ignored.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

/// Header carrying the token.
pub const TOKEN_HEADER: &str = "X-JWT-Token";

/// Why a request was refused with `401 Unauthorized`.
///
/// Every rejected token gets the same message; the variant is only logged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// No [`TOKEN_HEADER`] on the request.
    #[error("Token not specified")]
    Missing,
    /// Not three base64url segments of JSON.
    #[error("Invalid token")]
    Malformed,
    /// `alg` other than `HS256`.
    #[error("Invalid token")]
    UnsupportedAlgorithm,
    /// Signature does not match the secret.
    #[error("Invalid token")]
    BadSignature,
    /// `exp` lies in the past.
    #[error("Invalid token")]
    Expired,
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

/// Validates tokens signed with a shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Validator keyed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
        }
    }

    fn mac(&self) -> Hmac<Sha256> {
        // HMAC accepts keys of any length, so this never fails
        <Hmac<Sha256> as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC takes variable keys"))
    }

    /// Signs `claims` (a JSON object) into a token. Used by tests and tooling.
    #[must_use]
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let header = BASE64URL_NOPAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = BASE64URL_NOPAD.encode(claims.to_string().as_bytes());
        let signing_input = format!("{header}.{payload}");

        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = BASE64URL_NOPAD.encode(&mac.finalize().into_bytes());
        format!("{signing_input}.{signature}")
    }

    /// # Errors
    /// Returns why `token` is not acceptable.
    pub fn validate(&self, token: &str) -> Result<(), TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac();
        mac.update(token[..header_and_payload_len(token)].as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_json(payload)?;
        if let Some(exp) = claims.exp {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |now| now.as_secs());
            if exp <= now {
                return Err(TokenError::Expired);
            }
        }
        Ok(())
    }
}

fn header_and_payload_len(token: &str) -> usize {
    token.rfind('.').unwrap_or(0)
}

fn decode_json<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
    let bytes = BASE64URL_NOPAD
        .decode(part.as_bytes())
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// axum middleware rejecting requests without a valid [`TOKEN_HEADER`].
pub async fn require_token(
    State(validator): State<TokenValidator>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    let result = token.map_or(Err(TokenError::Missing), |token| validator.validate(token));
    match result {
        Ok(()) => next.run(request).await,
        Err(err) => {
            debug!(?err, path = %request.uri().path(), "rejecting request");
            err.into_response()
        }
    }
}
