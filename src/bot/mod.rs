//! # Bot Module
//!
//! Discord front end of the music bot.
//!
//! - [`commands`]: slash command registration
//! - [`handlers`]: interaction dispatch and reply rendering
//! - [`music`]: command logic over the session registry, independent of serenity
//! - [`events`]: songbird driver events forwarded to the owning session
//!
//! ## Architecture
//!
//! [`OpenMusicBot`] implements Serenity's [`EventHandler`]. Voice sessions
//! are created on demand by [`SongbirdLauncher`] and live in a shared
//! [`SessionRegistry`]; voice state updates are turned into
//! [`MembershipChange`]s and forwarded to the session of the guild.

use anyhow::{Context as _, Result};
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    http::Http,
};
use songbird::{input::Input, Songbird};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod music;

use crate::{
    audio::{
        connection::ConnectionState,
        registry::SessionRegistry,
        songbird_backend::{SongbirdConnection, SongbirdSink},
        subscription::{MembershipChange, SessionInbox, SessionSetup, Subscription, SubscriptionHandle},
        track::{Track, TrackInfo},
    },
    config::Config,
    sources::{youtube_input, ResolvedTrack, TrackResolver},
    ui::ChannelAnnouncer,
};
use music::{AnnouncingEvents, MusicCommands, PlayRequest, SessionLauncher};

/// Main Discord bot handler.
pub struct OpenMusicBot {
    config: Arc<Config>,
    registry: Arc<SessionRegistry<Input>>,
    pub music: MusicCommands<Input>,
}

impl OpenMusicBot {
    pub fn new(
        config: Config,
        manager: Arc<Songbird>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let launcher = Arc::new(SongbirdLauncher {
            manager,
            http: Arc::new(Http::new(&config.discord_token)),
            client: reqwest::Client::new(),
            registry: registry.clone(),
            config: config.clone(),
            announcers: DashMap::new(),
        });
        let music = MusicCommands::new(registry.clone(), resolver, launcher, config.clone());

        Self {
            config,
            registry,
            music,
        }
    }

    /// Registra los comandos slash, por guild si `GUILD_ID` está definido.
    ///
    /// Los comandos de guild se propagan en segundos; los globales pueden
    /// tardar hasta una hora.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .context("No se pudieron registrar comandos de guild")?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx)
                    .await
                    .context("No se pudieron registrar comandos globales")?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Reenvía los cambios de miembros a la sesión del servidor
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        // Solo la sesión registrada recibe el cambio; las terminadas ya no están
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };

        let old_channel = old.and_then(|state| state.channel_id);
        let is_self = new.user_id == ctx.cache.current_user().id;
        let channels = [old_channel, new.channel_id];

        let listeners = match ctx.cache.guild(guild_id) {
            Some(guild) => count_listeners(
                guild.voice_states.values().filter_map(|state| {
                    let channel = state.channel_id?;
                    let is_bot = state
                        .member
                        .as_ref()
                        .map(|member| member.user.bot)
                        .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                        .unwrap_or(false);
                    Some((channel, is_bot))
                }),
                &channels,
            ),
            None => {
                debug!("[{}] Guild no está en caché, ignorando cambio de voz", guild_id);
                return;
            }
        };

        session.membership(MembershipChange {
            is_self,
            old_channel,
            new_channel: new.channel_id,
            listeners,
        });
    }
}

/// Cuenta los miembros que no son bots en cada uno de `channels`
fn count_listeners(
    states: impl Iterator<Item = (ChannelId, bool)>,
    channels: &[Option<ChannelId>],
) -> HashMap<ChannelId, usize> {
    let mut listeners: HashMap<ChannelId, usize> = channels.iter().flatten().map(|&channel| (channel, 0)).collect();

    for (channel, is_bot) in states {
        if is_bot {
            continue;
        }
        if let Some(count) = listeners.get_mut(&channel) {
            *count += 1;
        }
    }

    listeners
}

/// Crea sesiones sobre el `Call` de songbird de cada servidor
pub struct SongbirdLauncher {
    manager: Arc<Songbird>,
    http: Arc<Http>,
    client: reqwest::Client,
    registry: Arc<SessionRegistry<Input>>,
    config: Arc<Config>,
    announcers: DashMap<ChannelId, Arc<ChannelAnnouncer>>,
}

impl SongbirdLauncher {
    /// Un anunciador por canal de texto, para que sus avisos salgan en orden
    fn announcer(&self, channel: ChannelId) -> Arc<ChannelAnnouncer> {
        self.announcers
            .entry(channel)
            .or_insert_with(|| Arc::new(ChannelAnnouncer::new(self.http.clone(), channel)))
            .clone()
    }
}

#[async_trait]
impl SessionLauncher<Input> for SongbirdLauncher {
    async fn launch(&self, request: &PlayRequest, voice_channel: ChannelId) -> Result<SubscriptionHandle<Input>> {
        let guild_id = request.guild_id;
        info!("🎧 [{}] Creando sesión en el canal {}", guild_id, voice_channel);

        let call = self.manager.get_or_insert(guild_id);
        let inbox = SessionInbox::new();
        let sender = inbox.sender();

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            events::register_voice_events(&mut handler, guild_id, sender.clone());
        }

        let connection = SongbirdConnection::new(
            self.manager.clone(),
            guild_id,
            voice_channel,
            call.clone(),
            sender.clone(),
        );
        connection.connect();

        let handle = Subscription::spawn(
            SessionSetup {
                guild_id,
                voice_channel,
                connection,
                sink: SongbirdSink::new(call, sender.clone()),
                announcer: self.announcer(request.text_channel),
                timings: self.config.timings,
                initial_state: ConnectionState::Signalling,
            },
            inbox,
            self.registry.clone(),
        );

        Ok(handle)
    }

    fn track(&self, resolved: ResolvedTrack, request: &PlayRequest) -> Track<Input> {
        let announcer = self.announcer(request.text_channel);
        Track::new(
            TrackInfo::new(resolved.title, resolved.url.clone()),
            youtube_input(self.client.clone(), resolved.url),
            Arc::new(AnnouncingEvents::new(announcer, request.requester.clone())),
        )
    }
}
