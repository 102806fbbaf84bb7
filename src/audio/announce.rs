use super::track::TrackInfo;

/// Quién pidió un track, para el embed de "Finished"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Aviso para el canal de texto de la sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// La cola se vació y corre el temporizador de inactividad
    QueueFinished,
    PausedEmptyChannel,
    EmptyChannelExpired,
    ListenerReturned,
    TrackStarted { url: String },
    TrackFinished { track: TrackInfo, requested_by: Requester },
    TrackFailed { title: String, error: String },
}

/// Destino de los avisos. No debe bloquear: quien publica es el bucle de la sesión.
pub trait Announcer: Send + Sync {
    fn announce(&self, announcement: Announcement);
}
