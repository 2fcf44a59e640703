pub mod ytdlp;

use async_trait::async_trait;

use crate::error::ResolveError;

pub use ytdlp::YtDlpResolver;

/// Un track ya resuelto: título y URL de stream reproducible.
/// Es un valor inmutable; se produce en el resolver y nunca se modifica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub stream_url: String,
}

impl Track {
    pub fn new(title: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stream_url: stream_url.into(),
        }
    }
}

/// Capacidad externa: convierte una búsqueda libre o URL en un [`Track`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError>;
}
