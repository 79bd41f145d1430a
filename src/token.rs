//! Credential decoding: the platform-issued JWT without signature checks.
//!
//! The relay never verifies the signature. The raw credential is forwarded
//! as-is in the `auth` frame and the game server verifies it against the
//! extension secret. Decoding here is only a sanity pass before dialing:
//! split into three segments, base64url the first two into JSON, keep the
//! third opaque.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::RelayError;

/// Opaque platform-issued token proving the viewer's session identity.
///
/// Never mutated; a re-authorization replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, exactly as the platform delivered it. This is what
    /// goes into the `auth` frame.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the credential into its structured parts.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedCredential`] if the string is not
    /// three dot-separated segments, or if either of the first two segments
    /// is not base64url-encoded JSON. No partial state is produced.
    pub fn decode(&self) -> Result<DecodedToken, RelayError> {
        let mut segments = self.0.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(RelayError::MalformedCredential(
                "expected exactly three dot-separated segments".to_string(),
            ));
        };

        let header = decode_segment(header, "header")?;
        let claims: Claims =
            serde_json::from_value(decode_segment(payload, "payload")?).map_err(|e| {
                RelayError::MalformedCredential(format!("payload claims: {e}"))
            })?;

        Ok(DecodedToken {
            header,
            claims,
            signature: signature.to_string(),
        })
    }
}

impl From<&str> for Credential {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Decodes one base64url-no-pad segment into a JSON value.
fn decode_segment(segment: &str, which: &str) -> Result<serde_json::Value, RelayError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| RelayError::MalformedCredential(format!("{which} base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RelayError::MalformedCredential(format!("{which} json: {e}")))
}

/// Structured view of a decoded credential.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// Decoded JOSE header (algorithm, type). Inspected only, never acted on.
    pub header: serde_json::Value,
    /// Decoded payload claims.
    pub claims: Claims,
    /// Signature segment, kept opaque. Verification is the server's job.
    pub signature: String,
}

/// Claims carried in the credential payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Numeric ID of the channel being viewed.
    pub channel_id: String,
    /// Expiration time in seconds since the Unix epoch.
    pub exp: i64,
    /// Anonymized user ID, persistent per user unless revoked. Absent until
    /// the viewer grants identity sharing to the extension.
    #[serde(default)]
    pub opaque_user_id: Option<String>,
    /// Real user ID, present only when the viewer granted identification
    /// and the extension is configured to request it.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Viewer role on this channel.
    pub role: Role,
    /// Permitted pubsub topics.
    #[serde(default)]
    pub pubsub_perms: PubSubPerms,
}

impl Claims {
    /// Expiration instant of the credential.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whether the credential is expired at `now`. Informational only;
    /// the server enforces expiry when it verifies the signature.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

/// Viewer role encoded in the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The channel owner.
    Broadcaster,
    /// A channel moderator.
    Moderator,
    /// An ordinary viewer.
    Viewer,
    /// A backend service acting outside any viewer session.
    External,
}

/// Pubsub topics the credential permits listening and sending on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PubSubPerms {
    /// Topics this session may listen on.
    #[serde(default)]
    pub listen: Vec<String>,
    /// Topics this session may send on.
    #[serde(default)]
    pub send: Vec<String>,
}
