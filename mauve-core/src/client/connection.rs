use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, time::Duration};

/// Errors that can occur when loading a [`ConnectionInformation`] from its JSON form.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Failed to read connection file '{path}': '{source}'")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid connection configuration: '{0}'")]
    Parse(#[from] serde_json::Error),
}

/// Describes how to reach a remote endpoint.
///
/// A [`crate::Client`] holds one of these for its whole lifetime and only reads it during
/// calls.
///
/// The JSON form looks like:
///
/// ```json
/// {
///   "address": "http://localhost:50051",
///   "credentials": { "type": "bearer", "token": "s3cr3t" },
///   "timeout_ms": 5000
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInformation {
    /// Where the endpoint lives. The format is transport specific (`http://host:port` for
    /// gRPC, `host:port` for SMTP).
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    /// Upper bound for a single call, applied by the transport.
    #[serde(
        default,
        rename = "timeout_ms",
        with = "timeout_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl ConnectionInformation {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            timeout: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConnectionConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConnectionConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConnectionConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&content)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credentials {
    /// The value of an `authorization` header carrying these credentials.
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            Credentials::Bearer { token } => format!("Bearer {token}"),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

mod timeout_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        timeout: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timeout {
            Some(timeout) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
