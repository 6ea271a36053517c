use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac as _};
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

use crate::Result;

/// Request path signed by the WebSocket login handshake.
const VERIFY_PATH: &str = "/users/self/verify";

/// Set of credentials used to authenticate a WebSocket session. These are the API key, secret
/// and passphrase issued by the exchange when the key was created.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub(crate) key: String,
    pub(crate) secret: SecretString,
    pub(crate) passphrase: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(key: String, secret: String, passphrase: String) -> Self {
        Self {
            key,
            secret: SecretString::from(secret),
            passphrase: SecretString::from(passphrase),
        }
    }

    /// Returns the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the secret.
    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Returns the passphrase.
    #[must_use]
    pub fn passphrase(&self) -> &SecretString {
        &self.passphrase
    }
}

/// Produces the authentication frame sent by [`crate::ws::ConnectionManager::login`].
///
/// Implement this to plug in a remote signing service or a different login scheme.
pub trait Signer: Send + Sync + 'static {
    /// Returns the text payload of the login frame for `credentials`.
    fn sign(&self, credentials: &Credentials) -> Result<String>;
}

/// Signs the login frame locally with HMAC-SHA256 over the current timestamp.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSigner;

impl Signer for HmacSigner {
    fn sign(&self, credentials: &Credentials) -> Result<String> {
        login_payload(credentials, Utc::now())
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    op: &'static str,
    args: [&'a str; 4],
}

/// Builds `{"op":"login","args":[key, passphrase, timestamp, sign]}` for the given instant.
pub(crate) fn login_payload(credentials: &Credentials, now: DateTime<Utc>) -> Result<String> {
    let timestamp = to_timestamp(now);
    let signature = hmac(&credentials.secret, &to_message(&timestamp))?;

    let request = LoginRequest {
        op: "login",
        args: [
            &credentials.key,
            credentials.passphrase.expose_secret(),
            &timestamp,
            &signature,
        ],
    };

    Ok(serde_json::to_string(&request)?)
}

/// Epoch seconds with millisecond precision, e.g. `1538054050.975`.
#[must_use]
fn to_timestamp(now: DateTime<Utc>) -> String {
    format!("{}.{:03}", now.timestamp(), now.timestamp_subsec_millis())
}

#[must_use]
fn to_message(timestamp: &str) -> String {
    format!("{timestamp}GET{VERIFY_PATH}")
}

fn hmac(secret: &SecretString, message: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())?;
    mac.update(message.as_bytes());

    let result = mac.finalize().into_bytes();
    Ok(STANDARD.encode(result))
}
