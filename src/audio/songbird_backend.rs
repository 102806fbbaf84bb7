//! Adaptadores de songbird para el transporte de voz y el reproductor.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::Input,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    connection::{ConnectionEvent, ConnectionState, DisconnectReason, VoiceConnection},
    error::TrackError,
    player::{AudioSink, PlaybackId, PlayerSignal},
    subscription::SessionSender,
};

/// Conexión de voz de un servidor sobre el `Call` de songbird
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    home_channel: ChannelId,
    call: Arc<Mutex<Call>>,
    events: SessionSender<Input>,
}

impl SongbirdConnection {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        home_channel: ChannelId,
        call: Arc<Mutex<Call>>,
        events: SessionSender<Input>,
    ) -> Self {
        Self {
            manager,
            guild_id,
            home_channel,
            call,
            events,
        }
    }

    /// Primera conexión al canal de origen
    pub fn connect(&self) {
        self.join(Some(self.home_channel));
    }

    fn join(&self, channel: Option<ChannelId>) {
        let manager = self.manager.clone();
        let call = self.call.clone();
        let events = self.events.clone();
        let guild_id = self.guild_id;
        let home_channel = self.home_channel;

        tokio::spawn(async move {
            // Tras un movimiento, el canal vigente es el del Call
            let channel = match channel {
                Some(channel) => channel,
                None => call
                    .lock()
                    .await
                    .current_channel()
                    .map(|c| ChannelId::from(c.0))
                    .unwrap_or(home_channel),
            };

            events.connection(ConnectionEvent::new(ConnectionState::Connecting));
            match manager.join(guild_id, channel).await {
                Ok(_) => {
                    info!("🔊 [{}] Conectado al canal de voz {}", guild_id, channel);
                    events.connection(ConnectionEvent::new(ConnectionState::Ready));
                }
                Err(e) => {
                    warn!("❌ [{}] Error al conectar al canal de voz: {:?}", guild_id, e);
                    events.connection(ConnectionEvent::disconnected(DisconnectReason::Other));
                }
            }
        });
    }
}

impl VoiceConnection for SongbirdConnection {
    fn rejoin(&self) {
        self.join(None);
    }

    fn destroy(&self) {
        let manager = self.manager.clone();
        let call = self.call.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            call.lock().await.remove_all_global_events();
            match manager.remove(guild_id).await {
                Ok(()) => info!("👋 [{}] Desconectado del canal de voz", guild_id),
                Err(e) => debug!("[{}] Call ya removido: {:?}", guild_id, e),
            }
        });
    }
}

/// Reproductor sobre el `Call`: una pista a la vez
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
    events: SessionSender<Input>,
    current: Option<TrackHandle>,
}

impl SongbirdSink {
    pub fn new(call: Arc<Mutex<Call>>, events: SessionSender<Input>) -> Self {
        Self {
            call,
            events,
            current: None,
        }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    type Resource = Input;

    async fn play(&mut self, input: Input, playback: PlaybackId) -> Result<()> {
        let handle = self.call.lock().await.play_only_input(input);

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    PlaybackForwarder {
                        playback,
                        events: self.events.clone(),
                    },
                )
                .context("Error al agregar event handler")?;
        }

        self.current = Some(handle);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        if let Some(track) = &self.current {
            track.pause().context("Error al pausar")?;
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        if let Some(track) = &self.current {
            track.play().context("Error al reanudar")?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(track) = self.current.take() {
            track.stop().context("Error al detener")?;
        }
        Ok(())
    }
}

/// Reenvía el fin o el error de una pista a la sesión, etiquetado con su reproducción
struct PlaybackForwarder {
    playback: PlaybackId,
    events: SessionSender<Input>,
}

#[async_trait]
impl VoiceEventHandler for PlaybackForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in tracks.iter() {
                let signal = match &state.playing {
                    PlayMode::Errored(e) => {
                        PlayerSignal::Failed(self.playback, TrackError::Playback(e.to_string()))
                    }
                    _ => PlayerSignal::Finished(self.playback),
                };
                self.events.player(signal);
            }
        }

        // Una pista solo termina una vez
        Some(Event::Cancel)
    }
}
