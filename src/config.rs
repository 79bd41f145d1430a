//! Relay configuration.
//!
//! The endpoint URL comes from the embedding application (constructor
//! option or environment); the platform `state` flag comes from the page
//! query string the host platform appends to the iframe URL
//! (`state=testing`, `state=hosted_test`, ...).

use crate::error::RelayError;

/// Platform `state` values that mark a test-mode session.
const TEST_STATES: [&str; 2] = ["testing", "hosted_test"];

/// Relay configuration, fixed for the lifetime of one facade.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// WebSocket endpoint of the game server's extension backend
    /// (e.g. `wss://ebs.example.com/relay`).
    pub endpoint: String,

    /// Raw platform `state` query value, when present.
    pub state: Option<String>,
}

impl RelayConfig {
    /// Creates a configuration for the given endpoint with no `state` flag.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: None,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// `RELAY_ENDPOINT` must be set; `RELAY_STATE` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidEndpoint`] if `RELAY_ENDPOINT` is unset
    /// or empty.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let endpoint = std::env::var("RELAY_ENDPOINT")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RelayError::InvalidEndpoint("RELAY_ENDPOINT is not set".to_string()))?;

        let state = std::env::var("RELAY_STATE").ok().filter(|v| !v.is_empty());

        Ok(Self { endpoint, state })
    }

    /// Absorbs the page query string, picking up the platform `state` flag.
    ///
    /// Unrecognized pairs are ignored; a leading `?` is tolerated.
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        for pair in query.trim_start_matches('?').split('&') {
            let mut kv = pair.splitn(2, '=');
            if let (Some("state"), Some(value)) = (kv.next(), kv.next())
                && !value.is_empty()
            {
                self.state = Some(value.to_string());
            }
        }
        self
    }

    /// Whether the platform marked this session as a test page.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| TEST_STATES.contains(&s))
    }
}
