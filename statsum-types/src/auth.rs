//! Signed submission tokens.
//!
//! Collectors authorize submissions with a bearer token asserting the
//! project it was issued for.  Tokens are HS256 signed JSON web tokens with
//! `project`, `iat` and `exp` claims, issued and checked with
//! [`jsonwebtoken`].
//!
//! ```rust
//! use statsum_types::auth::{create_token, verify_token, DEFAULT_TOKEN_EXPIRY};
//!
//! let token = create_token("my-project", b"secret", DEFAULT_TOKEN_EXPIRY).unwrap();
//! let claims = verify_token(&token, b"secret").unwrap();
//! assert_eq!(claims.project, "my-project");
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// The expiry window used when issuing tokens without an explicit one (96 hours).
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(96 * 60 * 60);

/// Raised if a token cannot be issued or verified.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token is not a well formed JSON web token.
    #[error("malformed token")]
    Malformed,
    /// The token was signed with an algorithm other than HS256.
    #[error("unsupported token algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    /// The signature does not match the secret.
    #[error("invalid token signature")]
    InvalidSignature,
    /// The token's `exp` claim lies in the past.
    #[error("token expired")]
    Expired,
    /// Any other failure reported while encoding or decoding.
    #[error("token error")]
    Jwt(#[from] JwtError),
}

/// The claims carried by a submission token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// The project the token authorizes submissions for.
    pub project: String,
    /// Issued-at, in seconds since the UNIX epoch.
    pub iat: u64,
    /// Expiry, in seconds since the UNIX epoch.
    pub exp: u64,
}

impl Claims {
    /// The expiry of the token as a `SystemTime`.
    pub fn expires(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.exp)
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn classify(token: &str, err: JwtError) -> TokenError {
    let classified = match err.kind() {
        ErrorKind::InvalidSignature => Some(TokenError::InvalidSignature),
        ErrorKind::InvalidAlgorithm => Some(match decode_header(token) {
            Ok(header) => TokenError::UnsupportedAlgorithm(header.alg),
            Err(_) => TokenError::Malformed,
        }),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => Some(TokenError::Malformed),
        _ => None,
    };
    classified.unwrap_or(TokenError::Jwt(err))
}

/// Creates a token for `project` that expires `expires_in` from now.
pub fn create_token(
    project: &str,
    secret: &[u8],
    expires_in: Duration,
) -> Result<String, TokenError> {
    create_token_at(project, secret, expires_in, SystemTime::now())
}

/// Creates a token for `project` as if it was issued at `issued_at`.
pub fn create_token_at(
    project: &str,
    secret: &[u8],
    expires_in: Duration,
    issued_at: SystemTime,
) -> Result<String, TokenError> {
    let iat = unix_seconds(issued_at);
    let claims = Claims {
        project: project.to_owned(),
        iat,
        exp: iat.saturating_add(expires_in.as_secs()),
    };
    Ok(encode(
        &Header::new(ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Verifies the signature and expiry of `token` and returns its claims.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, TokenError> {
    verify_token_at(token, secret, SystemTime::now())
}

/// Verifies `token` as if the current time was `now`.
pub fn verify_token_at(token: &str, secret: &[u8], now: SystemTime) -> Result<Claims, TokenError> {
    // expiry is checked against `now` below instead of the system clock
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.leeway = 0;

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|err| classify(token, err))?
        .claims;

    if claims.exp <= unix_seconds(now) {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}
