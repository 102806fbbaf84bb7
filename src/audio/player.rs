use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{
    error::TrackError,
    track::{Track, TrackInfo},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    /// Recurso en preparación; el track ya salió de la cola
    Buffering,
    Playing,
    /// Pausa pedida por un usuario
    Paused,
    /// Pausa automática por canal vacío
    AutoPaused,
}

impl PlayerState {
    fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::AutoPaused)
    }
}

/// Identifica un intento de reproducción; las señales de intentos anteriores se ignoran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(u64);

/// Aviso asíncrono del reproductor real
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerSignal {
    Finished(PlaybackId),
    Failed(PlaybackId, TrackError),
}

/// Manija del reproductor de audio.
///
/// Quien implemente `play` debe avisar el fin o el fallo de esa
/// reproducción como [`PlayerSignal`] con el mismo [`PlaybackId`].
#[cfg_attr(test, mockall::automock(type Resource = String;))]
#[async_trait]
pub trait AudioSink: Send + 'static {
    type Resource: Send + 'static;

    async fn play(&mut self, resource: Self::Resource, playback: PlaybackId) -> anyhow::Result<()>;
    async fn pause(&mut self) -> anyhow::Result<()>;
    async fn resume(&mut self) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
}

/// Qué debe hacer el dueño tras una operación del motor
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Unchanged,
    /// El motor volvió a Idle: hay que avanzar la cola
    BecameIdle,
}

/// Máquina de estados del reproductor de una sesión.
///
/// Entrar en `Idle` desde cualquier otro estado dispara `on_finish` del
/// track en curso y devuelve [`EngineOutcome::BecameIdle`]; es la única
/// transición que hace avanzar la cola.
pub struct PlaybackEngine<S: AudioSink> {
    sink: S,
    state: PlayerState,
    current: Option<Track<S::Resource>>,
    playback: Option<PlaybackId>,
    next_id: u64,
}

impl<S: AudioSink> PlaybackEngine<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: PlayerState::Idle,
            current: None,
            playback: None,
            next_id: 1,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current(&self) -> Option<&TrackInfo> {
        self.current.as_ref().map(Track::info)
    }

    /// Clona el track en curso como una nueva instancia (ruta de `repeat`)
    pub fn replay_current(&self) -> Option<Track<S::Resource>> {
        self.current.as_ref().map(Track::replay)
    }

    /// Toma posesión del track y pasa a `Buffering` mientras se crea su recurso.
    pub fn load(&mut self, track: Track<S::Resource>) -> PlaybackId {
        let playback = PlaybackId(self.next_id);
        self.next_id += 1;

        debug!("⏳ Preparando {} ({:?})", track.title(), playback);
        self.current = Some(track);
        self.playback = Some(playback);
        self.state = PlayerState::Buffering;
        playback
    }

    /// Inicia el recurso ya creado para `playback`.
    pub async fn start(&mut self, playback: PlaybackId, resource: S::Resource) -> EngineOutcome {
        if self.playback != Some(playback) || self.state != PlayerState::Buffering {
            debug!("Recurso de {:?} descartado: la reproducción ya no está vigente", playback);
            return EngineOutcome::Unchanged;
        }

        match self.sink.play(resource, playback).await {
            Ok(()) => {
                self.state = PlayerState::Playing;
                if let Some(track) = self.current.as_mut() {
                    info!("🎵 Reproduciendo: {}", track.title());
                    track.notify_start();
                }
                EngineOutcome::Unchanged
            }
            Err(e) => {
                warn!("❌ El reproductor rechazó el recurso: {:?}", e);
                if let Some(track) = self.current.as_mut() {
                    track.notify_error(&TrackError::Playback(e.to_string()));
                }
                self.enter_idle()
            }
        }
    }

    /// Abandona la preparación de `playback` sin disparar `on_finish`; devuelve el track.
    pub fn abandon(&mut self, playback: PlaybackId) -> Option<Track<S::Resource>> {
        if self.playback != Some(playback) || self.state != PlayerState::Buffering {
            return None;
        }
        self.state = PlayerState::Idle;
        self.playback = None;
        self.current.take()
    }

    pub async fn pause(&mut self) -> bool {
        self.pause_as(PlayerState::Paused).await
    }

    /// Pausa por canal vacío; distinguible de una pausa manual
    pub async fn auto_pause(&mut self) -> bool {
        self.pause_as(PlayerState::AutoPaused).await
    }

    async fn pause_as(&mut self, paused: PlayerState) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        if let Err(e) = self.sink.pause().await {
            warn!("⚠️ No se pudo pausar: {:?}", e);
            return false;
        }
        info!("⏸️ Reproducción pausada ({:?})", paused);
        self.state = paused;
        true
    }

    pub async fn unpause(&mut self) -> bool {
        if !matches!(self.state, PlayerState::Paused | PlayerState::AutoPaused) {
            return false;
        }
        if let Err(e) = self.sink.resume().await {
            warn!("⚠️ No se pudo reanudar: {:?}", e);
            return false;
        }
        info!("▶️ Reproducción reanudada");
        self.state = PlayerState::Playing;
        true
    }

    /// Detiene la reproducción. Sin `force`, un recurso en preparación no se interrumpe.
    pub async fn stop(&mut self, force: bool) -> EngineOutcome {
        match self.state {
            PlayerState::Idle => EngineOutcome::Unchanged,
            PlayerState::Buffering if !force => EngineOutcome::Unchanged,
            PlayerState::Buffering => self.enter_idle(),
            _ => {
                if let Err(e) = self.sink.stop().await {
                    warn!("⚠️ Error al detener el reproductor: {:?}", e);
                }
                self.enter_idle()
            }
        }
    }

    pub fn handle_signal(&mut self, signal: PlayerSignal) -> EngineOutcome {
        match signal {
            PlayerSignal::Finished(playback)
                if self.playback == Some(playback) && self.state.is_active() =>
            {
                self.enter_idle()
            }
            PlayerSignal::Failed(playback, error)
                if self.playback == Some(playback) && self.state != PlayerState::Idle =>
            {
                warn!("❌ Error de reproducción: {}", error);
                if let Some(track) = self.current.as_mut() {
                    track.notify_error(&error);
                }
                self.enter_idle()
            }
            stale => {
                debug!("Señal obsoleta ignorada: {:?}", stale);
                EngineOutcome::Unchanged
            }
        }
    }

    fn enter_idle(&mut self) -> EngineOutcome {
        debug!("⏹️ {:?} -> Idle", self.state);
        self.state = PlayerState::Idle;
        self.playback = None;
        if let Some(mut track) = self.current.take() {
            track.notify_finish();
        }
        EngineOutcome::BecameIdle
    }
}
