//! Credentials and bearer-token lifecycle.
//!
//! The client asks its [`TokenProvider`] for an `Authorization` header value
//! before every attempt. The crate ships [`Auth`], which covers the three
//! platform credentials: basic key-pairs (a pure base64 encoding, never
//! expires), service accounts (a signed assertion exchanged for a short-lived
//! bearer token), and unauthenticated access for the emulator.
//!
//! Token refresh is lazy: a fresh token is fetched exactly when the cached
//! one has expired, never in the background.

use crate::error::{ApiMessage, Error, Result, UsageError};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long a signed service-account assertion is valid for.
const ASSERTION_VALIDITY: Duration = Duration::from_secs(3600);

/// OAuth 2.0 grant type for the assertion exchange.
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Produces a value for the `Authorization` header.
///
/// Implement this to plug a custom token source into
/// [`ClientBuilder::auth`](crate::ClientBuilder::auth); most callers use
/// [`Auth`].
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a ready-to-send `Authorization` header value, refreshing any
    /// cached token that has expired. An empty string means the request is
    /// sent unauthenticated.
    async fn get_token(&self) -> Result<String>;
}

#[derive(Clone)]
enum Credential {
    /// Header value precomputed at construction.
    Basic { token: String },
    ServiceAccount {
        key_id: String,
        secret: String,
        email: String,
    },
    Unauthenticated,
}

/// A cached bearer token and when it stops being valid.
#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: Option<SystemTime>,
}

impl Token {
    fn never_expires(value: String) -> Self {
        Token {
            value,
            expires_at: None,
        }
    }

    fn has_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => SystemTime::now() >= at,
            None => false,
        }
    }
}

/// The crate's credential-backed [`TokenProvider`].
///
/// # Examples
///
/// ```no_run
/// use sensorgrid::{Auth, Client};
///
/// # fn example() -> Result<(), sensorgrid::Error> {
/// let auth = Auth::service_account(
///     "bv0i2nqvmtuc71o5mug0",
///     "b093ee70ec234a2d8893d290b4b59d42",
///     "bv0i2nqvmtuc71o5mug0@acme.serviceaccount.sensorgrid.io",
/// )?;
/// let client = Client::builder().auth(auth).build()?;
/// # Ok(())
/// # }
/// ```
pub struct Auth {
    credential: Credential,
    token_endpoint: String,
    http: reqwest::Client,
    cache: Mutex<Option<Token>>,
}

impl Auth {
    /// A basic key-pair credential.
    ///
    /// The token is derived eagerly (a pure base64 encoding, no network
    /// call) and never expires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if either field is empty.
    pub fn basic(key_id: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let (key_id, secret) = (key_id.into(), secret.into());
        require_field("key ID", &key_id)?;
        require_field("secret", &secret)?;

        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{key_id}:{secret}"));
        let auth = Auth::with_credential(Credential::Basic {
            token: format!("Basic {encoded}"),
        });
        Ok(auth)
    }

    /// A service-account credential, authenticated via signed-assertion
    /// exchange against the identity endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any field is empty.
    pub fn service_account(
        key_id: impl Into<String>,
        secret: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self> {
        let (key_id, secret, email) = (key_id.into(), secret.into(), email.into());
        require_field("key ID", &key_id)?;
        require_field("secret", &secret)?;
        require_field("email", &email)?;

        Ok(Auth::with_credential(Credential::ServiceAccount {
            key_id,
            secret,
            email,
        }))
    }

    /// No credential at all. Requests are sent without an `Authorization`
    /// header; only useful against the emulator.
    pub fn unauthenticated() -> Self {
        Auth::with_credential(Credential::Unauthenticated)
    }

    /// Points the service-account exchange at a different identity endpoint.
    #[must_use]
    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    fn with_credential(credential: Credential) -> Self {
        // Credentials without an expiry are cached up front so get_token
        // never needs a refresh round-trip for them.
        let cache = match &credential {
            Credential::Basic { token } => Some(Token::never_expires(token.clone())),
            Credential::Unauthenticated => Some(Token::never_expires(String::new())),
            Credential::ServiceAccount { .. } => None,
        };
        Auth {
            credential,
            token_endpoint: crate::DEFAULT_TOKEN_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
            cache: Mutex::new(cache),
        }
    }

    fn cached(&self) -> Option<Token> {
        self.cache.lock().unwrap().clone()
    }

    async fn refresh(&self) -> Result<Token> {
        match &self.credential {
            Credential::Basic { token } => Ok(Token::never_expires(token.clone())),
            Credential::Unauthenticated => Ok(Token::never_expires(String::new())),
            Credential::ServiceAccount {
                key_id,
                secret,
                email,
            } => self.exchange(key_id, secret, email).await,
        }
    }

    /// One POST to the identity endpoint. Exchange failures are never
    /// retried here; a malformed credential fails identically every time.
    async fn exchange(&self, key_id: &str, secret: &str, email: &str) -> Result<Token> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Configuration(format!("system clock before epoch: {e}")))?
            .as_secs();

        let claims = AssertionClaims {
            iat: now,
            exp: now + ASSERTION_VALIDITY.as_secs(),
            aud: self.token_endpoint.clone(),
            iss: email.to_string(),
        };
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        header.kid = Some(key_id.to_string());
        let assertion = jsonwebtoken::encode(
            &header,
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| Error::Configuration(format!("failed to sign assertion: {e}")))?;

        tracing::debug!(endpoint = %self.token_endpoint, "Exchanging service account assertion");

        let response = self
            .http
            .post(self.token_endpoint.as_str())
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Connection(format!("token exchange failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status != http::StatusCode::OK {
            let message = ApiMessage::from_body(&body);
            tracing::error!(status = status.as_u16(), %message, "Token exchange rejected");
            return Err(match status.as_u16() {
                400 => UsageError::BadRequest(message).into(),
                401 | 403 => {
                    Error::Configuration(format!("credentials rejected by identity endpoint: {message}"))
                }
                other => Error::Unexpected {
                    status: other,
                    message,
                },
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| Error::Format {
            raw_response: body.clone(),
            serde_error: e.to_string(),
        })?;

        Ok(Token {
            value: format!("Bearer {}", parsed.access_token),
            expires_at: Some(SystemTime::now() + Duration::from_secs(parsed.expires_in)),
        })
    }
}

#[async_trait]
impl TokenProvider for Auth {
    async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.cached() {
            if !token.has_expired() {
                return Ok(token.value);
            }
        }

        let fresh = self.refresh().await?;
        // Replace atomically. Two tasks racing here both store a complete
        // token; the loser's refresh is redundant, never torn.
        let value = fresh.value.clone();
        *self.cache.lock().unwrap() = Some(fresh);
        Ok(value)
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.credential {
            Credential::Basic { .. } => "Basic",
            Credential::ServiceAccount { .. } => "ServiceAccount",
            Credential::Unauthenticated => "Unauthenticated",
        };
        f.debug_struct("Auth").field("credential", &kind).finish()
    }
}

fn require_field(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Configuration(format!(
            "credential {name} must not be empty"
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct AssertionClaims {
    iat: u64,
    exp: u64,
    aud: String,
    iss: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_encodes_key_pair() {
        let auth = Auth::basic("key", "secret").unwrap();
        let token = auth.cached().unwrap();
        assert_eq!(
            token.value,
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode("key:secret")
            )
        );
        assert!(!token.has_expired());
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(matches!(
            Auth::basic("", "secret"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Auth::service_account("key", "secret", " "),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn zero_lifetime_token_is_expired_immediately() {
        let token = Token {
            value: "Bearer t".into(),
            expires_at: Some(SystemTime::now()),
        };
        assert!(token.has_expired());

        let token = Token {
            value: "Bearer t".into(),
            expires_at: Some(SystemTime::now() + Duration::from_secs(3600)),
        };
        assert!(!token.has_expired());
    }

    #[test]
    fn unauthenticated_token_is_empty() {
        let auth = Auth::unauthenticated();
        assert_eq!(auth.cached().unwrap().value, "");
    }
}
