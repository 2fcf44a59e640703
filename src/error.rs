use std::time::Duration;

use thiserror::Error;

/// Errores al resolver una búsqueda o URL en un track reproducible
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("sin resultados para la búsqueda")]
    NoResults,
    #[error("contenido restringido o privado")]
    Restricted,
    #[error("falló la extracción de audio: {0}")]
    ExtractionFailed(String),
}

/// Errores al establecer la conexión de voz
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("timeout al conectar al canal de voz")]
    Timeout,
    #[error("sesión de voz inválida")]
    InvalidSession,
    #[error("autenticación fallida")]
    AuthFailed,
    #[error("error de conexión de voz: {0}")]
    Other(String),
}

impl ConnectError {
    /// Backoff antes del siguiente intento, según la clase de error.
    /// Las sesiones inválidas (familia 4006) necesitan más tiempo que un timeout.
    pub fn retry_backoff(&self, delays: &ConnectDelays) -> Duration {
        match self {
            ConnectError::InvalidSession => delays.invalid_session,
            ConnectError::Timeout => delays.timeout,
            _ => delays.other,
        }
    }
}

/// Retardos clasificados para el ciclo de reconexión de voz
#[derive(Debug, Clone)]
pub struct ConnectDelays {
    pub invalid_session: Duration,
    pub timeout: Duration,
    pub other: Duration,
    pub stabilize: Duration,
}

/// Errores al iniciar la reproducción de un stream ya resuelto
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("formato de audio no soportado: {0}")]
    UnsupportedFormat(String),
    #[error("el transporte rechazó el stream: {0}")]
    TransportRejected(String),
}

/// Condiciones de estado reportadas al usuario como texto plano,
/// nunca escaladas como fallos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("no conectado a un canal de voz")]
    NotConnected,
    #[error("nada se está reproduciendo")]
    NothingPlaying,
    #[error("nada está pausado")]
    NothingPaused,
}
