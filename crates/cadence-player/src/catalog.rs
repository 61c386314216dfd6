//! Remote catalog client: the songs-list and albums-list endpoints.

use async_trait::async_trait;
use cadence_proto::catalog::server_message;
use cadence_proto::config::ApiConfig;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogResource {
    Songs,
    Albums,
}

impl CatalogResource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Albums => "albums",
        }
    }

    /// Notice shown when the body is not the expected shape.
    pub fn format_message(self) -> &'static str {
        match self {
            Self::Songs => "Invalid response format from server",
            Self::Albums => "Invalid album response format from server",
        }
    }

    /// Notice shown for a failure the server did not describe.
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Songs => "Error loading songs",
            Self::Albums => "Error loading albums",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// The peer reset the connection; worth one retry.
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("server returned {status}")]
    Status { status: u16, message: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Text for the error notice: the server's own message when it sent one.
    pub fn user_message(&self, resource: CatalogResource) -> String {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } => message.clone(),
            _ => resource.fallback_message().to_string(),
        }
    }
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the raw JSON body for `resource`.  Shape checks are the caller's.
    async fn fetch(&self, resource: CatalogResource) -> Result<Value, FetchError>;
}

/// `reqwest`-backed source.  No request timeout is set; the transport's own
/// connect/read handling applies.
pub struct HttpCatalog {
    http: reqwest::Client,
    songs_url: String,
    albums_url: String,
}

impl HttpCatalog {
    pub fn new(api: &ApiConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cadence/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            songs_url: api.songs_url(),
            albums_url: api.albums_url(),
        })
    }

    fn url(&self, resource: CatalogResource) -> &str {
        match resource {
            CatalogResource::Songs => &self.songs_url,
            CatalogResource::Albums => &self.albums_url,
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch(&self, resource: CatalogResource) -> Result<Value, FetchError> {
        let url = self.url(resource);
        debug!("fetching {} from {}", resource.label(), url);

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let text = response.text().await.map_err(classify)?;
        // A body that is not JSON still reaches the shape check (and fails it).
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }
        Ok(body)
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if is_connection_reset(&err) {
        FetchError::ConnectionReset
    } else {
        FetchError::Transport(err.to_string())
    }
}

fn is_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_connection_reset_found_in_source_chain() {
        let err = Wrapped(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(is_connection_reset(&err));
        let err = Wrapped(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(!is_connection_reset(&err));
    }

    #[test]
    fn test_client_builds_from_config() {
        let api = ApiConfig {
            base_url: "http://catalog.test:4000/".into(),
            ..ApiConfig::default()
        };
        let catalog = HttpCatalog::new(&api).unwrap();
        assert_eq!(
            catalog.url(CatalogResource::Songs),
            "http://catalog.test:4000/api/song/list"
        );
        assert_eq!(
            catalog.url(CatalogResource::Albums),
            "http://catalog.test:4000/api/album/list"
        );
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = FetchError::Status {
            status: 503,
            message: Some("Database offline".into()),
        };
        assert_eq!(err.user_message(CatalogResource::Songs), "Database offline");

        let err = FetchError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message(CatalogResource::Albums), "Error loading albums");
        assert_eq!(
            FetchError::Transport("dns".into()).user_message(CatalogResource::Songs),
            "Error loading songs"
        );
    }
}
