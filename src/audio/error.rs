use thiserror::Error;

/// Fallo atribuible a un track concreto; es lo que recibe `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    /// No se pudo convertir el track en un recurso reproducible
    #[error("could not create audio resource: {0}")]
    ResourceCreation(String),

    /// El reproductor falló durante la reproducción
    #[error("playback failed: {0}")]
    Playback(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// La suscripción ya fue destruida
    #[error("playback session is closed")]
    Closed,

    #[error("voice connection was not ready within {0:?}")]
    NotReady(std::time::Duration),
}
