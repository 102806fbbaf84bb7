//! Lógica de los comandos de música, independiente de serenity.
//!
//! Cada comando recibe ids ya resueltos y devuelve un [`Reply`] que
//! `handlers` traduce a una respuesta de interacción.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        announce::{Announcement, Announcer, Requester},
        error::{SessionError, TrackError},
        player::PlayerState,
        queue::paginate,
        registry::SessionRegistry,
        subscription::{SessionSnapshot, SubscriptionHandle},
        track::{Track, TrackEvents, TrackInfo},
    },
    config::Config,
    sources::{ResolvedTrack, TrackResolver},
};

/// Quién pidió `play`/`playlist` y desde dónde
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    /// Canal de voz del miembro, si está en uno
    pub member_voice_channel: Option<ChannelId>,
    pub requester: Requester,
}

/// Respuesta de un comando
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text { content: String, ephemeral: bool },
    Embed { title: String, description: String },
    /// Vista de cola, una página por mensaje
    Pages(Vec<String>),
    Panel(Box<SessionSnapshot>),
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            ephemeral: true,
        }
    }

    pub fn embed(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Embed {
            title: title.into(),
            description: description.into(),
        }
    }

    fn not_playing() -> Self {
        Self::private("> Not playing in this server!")
    }

    fn not_found() -> Self {
        Self::embed("Not found", "couldn't obtain the search result for video.")
    }
}

/// Crea sesiones y tracks sobre un backend de audio concreto
#[async_trait]
pub trait SessionLauncher<R>: Send + Sync {
    /// Conecta al canal de voz y registra una sesión nueva
    async fn launch(&self, request: &PlayRequest, voice_channel: ChannelId) -> Result<SubscriptionHandle<R>>;

    fn track(&self, resolved: ResolvedTrack, request: &PlayRequest) -> Track<R>;
}

/// Avisos por track: "Playing", "Finished" y "Could not play"
pub struct AnnouncingEvents {
    announcer: Arc<dyn Announcer>,
    requester: Requester,
}

impl AnnouncingEvents {
    pub fn new(announcer: Arc<dyn Announcer>, requester: Requester) -> Self {
        Self { announcer, requester }
    }
}

impl TrackEvents for AnnouncingEvents {
    fn on_start(&self, track: &TrackInfo) {
        self.announcer.announce(Announcement::TrackStarted {
            url: track.url.clone(),
        });
    }

    fn on_finish(&self, track: &TrackInfo) {
        self.announcer.announce(Announcement::TrackFinished {
            track: track.clone(),
            requested_by: self.requester.clone(),
        });
    }

    fn on_error(&self, track: &TrackInfo, error: &TrackError) {
        self.announcer.announce(Announcement::TrackFailed {
            title: track.title.clone(),
            error: error.to_string(),
        });
    }
}

pub struct MusicCommands<R> {
    registry: Arc<SessionRegistry<R>>,
    resolver: Arc<dyn TrackResolver>,
    launcher: Arc<dyn SessionLauncher<R>>,
    config: Arc<Config>,
}

impl<R: Send + 'static> MusicCommands<R> {
    pub fn new(
        registry: Arc<SessionRegistry<R>>,
        resolver: Arc<dyn TrackResolver>,
        launcher: Arc<dyn SessionLauncher<R>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            resolver,
            launcher,
            config,
        }
    }

    /// `Some` con la respuesta de rechazo si el canal no admite comandos de música
    pub fn check_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Reply> {
        let restriction = self.config.music_channel?;
        if restriction.permits(guild_id.get(), channel_id.get()) {
            return None;
        }
        Some(Reply::private(format!(
            "> Music commands work only in <#{}> channel",
            restriction.channel_id
        )))
    }

    pub async fn play(&self, request: &PlayRequest, query: &str) -> Reply {
        let resolved = match self.resolver.search_track(query).await {
            Ok(Some(track)) => track,
            Ok(None) => return Reply::not_found(),
            Err(e) => {
                warn!("❌ [{}] Error al buscar '{}': {:?}", request.guild_id, query, e);
                return Reply::not_found();
            }
        };

        let session = match self.join(request).await {
            Ok(session) => session,
            Err(reply) => return reply,
        };

        let title = resolved.title.clone();
        let track = self.launcher.track(resolved, request);
        match session.enqueue(vec![track]).await {
            Ok(()) => Reply::embed("Enqueued", format!("Enqueued song **{title}**")),
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn playlist(&self, request: &PlayRequest, query: &str) -> Reply {
        let limit = self.config.max_playlist_size;
        let playlist = match self.resolver.search_playlist(query, limit).await {
            Ok(Some(playlist)) => playlist,
            Ok(None) => return Reply::not_found(),
            Err(e) => {
                warn!("❌ [{}] Error al buscar playlist '{}': {:?}", request.guild_id, query, e);
                return Reply::not_found();
            }
        };

        let session = match self.join(request).await {
            Ok(session) => session,
            Err(reply) => return reply,
        };

        let tracks: Vec<_> = playlist
            .tracks
            .into_iter()
            .take(limit)
            .map(|resolved| self.launcher.track(resolved, request))
            .collect();
        let count = tracks.len();

        match session.enqueue(tracks).await {
            Ok(()) => Reply::embed(
                "Enqueued",
                format!("Enqueued song **{}** with songs **{count}**", playlist.title),
            ),
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        match session.skip().await {
            Ok(true) => Reply::text("> Skipped song!"),
            Ok(false) => Reply::text("> Music is currently paused!"),
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        match session.pause().await {
            Ok(true) => Reply::private("> Paused!"),
            Ok(false) => Reply::private("> Already paused!"),
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        match session.resume().await {
            Ok(true) => Reply::private("> Resumed!"),
            Ok(false) => Reply::private("> Already playing!"),
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn repeat(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        match session.repeat().await {
            Ok(Some(track)) => Reply::embed("Repeated", track.title),
            Ok(None) | Err(_) => Reply::not_playing(),
        }
    }

    /// Solo exige que exista la sesión
    pub async fn mix(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.registry.get(guild_id) else {
            return Reply::text("Sorry, can't randomize at the moment!");
        };
        match session.mix().await {
            Ok(()) => Reply::text("> queue mixed!"),
            Err(_) => Reply::text("Sorry, can't randomize at the moment!"),
        }
    }

    pub async fn leave(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        match session.leave().await {
            Ok(()) => {
                info!("👋 [{}] Sesión cerrada por comando", guild_id);
                Reply::text("> Left channel!")
            }
            Err(_) => Reply::not_playing(),
        }
    }

    pub async fn queue(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.ready_session(guild_id) else {
            return Reply::not_playing();
        };
        let snapshot = match session.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(_) => return Reply::not_playing(),
        };

        let current = match (&snapshot.player, &snapshot.current) {
            (PlayerState::Playing, Some(current)) => current,
            _ => return Reply::private("> Nothing is currently playing!"),
        };

        if snapshot.pending.is_empty() {
            return Reply::text(format!("> Playing **{}**", current.title));
        }

        let header = format!(
            "> Playing **{}** out of {}",
            current.title,
            snapshot.pending.len() + 1
        );
        let pages = paginate(&snapshot.pending, self.config.queue_page_size)
            .into_iter()
            .map(|page| {
                let lines: Vec<String> = page
                    .entries
                    .iter()
                    .map(|(position, info)| format!("{position}. {}", info.title))
                    .collect();
                format!(
                    "{header}\n```{}```\nPage {}/{}",
                    lines.join("\n"),
                    page.current_page,
                    page.total_pages
                )
            })
            .collect();

        Reply::Pages(pages)
    }

    /// Panel de control reconstruido desde el estado actual
    pub async fn controls(&self, guild_id: GuildId) -> Reply {
        let Some(session) = self.registry.get(guild_id) else {
            return Reply::not_playing();
        };
        match session.snapshot().await {
            Ok(snapshot) => Reply::Panel(Box::new(snapshot)),
            Err(_) => Reply::not_playing(),
        }
    }

    fn ready_session(&self, guild_id: GuildId) -> Option<SubscriptionHandle<R>> {
        self.registry.get(guild_id).filter(|session| session.is_ready())
    }

    /// Sesión lista para recibir tracks, uniéndose al canal del miembro si hace falta
    async fn join(&self, request: &PlayRequest) -> Result<SubscriptionHandle<R>, Reply> {
        let guild_id = request.guild_id;
        let mut session = self.registry.get(guild_id);

        if let Some(stale) = session.as_ref().filter(|s| s.is_closed()) {
            info!("🧹 [{}] Eliminando sesión destruida", guild_id);
            self.registry.remove_session(guild_id, stale.session_id());
            session = None;
        }

        let session = match (session, request.member_voice_channel) {
            (Some(session), _) => session,
            (None, Some(voice_channel)) => {
                match self.launcher.launch(request, voice_channel).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!("❌ [{}] No se pudo crear la sesión: {:?}", guild_id, e);
                        return Err(self.join_failed());
                    }
                }
            }
            (None, None) => {
                return Err(Reply::embed(
                    "Missing voice channel",
                    "Join a voice channel and then try that again!",
                ))
            }
        };

        match session.wait_ready(self.config.timings.ready_timeout).await {
            Ok(()) => Ok(session),
            Err(SessionError::NotReady(_)) | Err(SessionError::Closed) => {
                warn!("⏱️ [{}] La conexión de voz no quedó lista a tiempo", guild_id);
                Err(self.join_failed())
            }
        }
    }

    fn join_failed(&self) -> Reply {
        Reply::embed(
            "Error",
            format!(
                "Failed to join voice channel within {} seconds, please try again later!",
                self.config.timings.ready_timeout.as_secs()
            ),
        )
    }
}
