use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

use crate::audio::connection::ReconnectPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Restricción opcional del canal de música
    pub music_channel: Option<MusicChannel>,

    // Sesiones
    pub timings: SessionTimings,

    // Límites
    pub max_playlist_size: usize,
    pub queue_page_size: usize,
}

/// Canal de texto al que se limitan los comandos de música
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicChannel {
    pub channel_id: u64,
    /// Si es `None`, la restricción aplica en todos los servidores
    pub guild_id: Option<u64>,
}

impl MusicChannel {
    pub fn permits(&self, guild_id: u64, channel_id: u64) -> bool {
        match self.guild_id {
            Some(restricted) if restricted != guild_id => true,
            _ => self.channel_id == channel_id,
        }
    }
}

/// Tiempos y presupuestos que recibe cada sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub idle_timeout: Duration,
    pub empty_channel_timeout: Duration,
    pub ready_timeout: Duration,
    pub move_grace: Duration,
    pub rejoin_backoff: Duration,
    pub max_rejoin_attempts: u32,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5 * 60),
            empty_channel_timeout: Duration::from_secs(15 * 60),
            ready_timeout: Duration::from_secs(20),
            move_grace: Duration::from_secs(5),
            rejoin_backoff: Duration::from_secs(5),
            max_rejoin_attempts: 5,
        }
    }
}

impl SessionTimings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            move_grace: self.move_grace,
            ready_timeout: self.ready_timeout,
            rejoin_backoff: self.rejoin_backoff,
            max_rejoin_attempts: self.max_rejoin_attempts,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = SessionTimings::default();
        let music_channel = optional::<u64>("MUSIC_CHANNEL_ID")?
            .map(|channel_id| -> Result<MusicChannel> {
                Ok(MusicChannel {
                    channel_id,
                    guild_id: optional("MUSIC_GUILD_ID")?,
                })
            })
            .transpose()?;

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            music_channel,

            timings: SessionTimings {
                idle_timeout: duration("IDLE_TIMEOUT", defaults.idle_timeout)?,
                empty_channel_timeout: duration("EMPTY_CHANNEL_TIMEOUT", defaults.empty_channel_timeout)?,
                ready_timeout: duration("READY_TIMEOUT", defaults.ready_timeout)?,
                move_grace: duration("MOVE_GRACE", defaults.move_grace)?,
                rejoin_backoff: duration("REJOIN_BACKOFF", defaults.rejoin_backoff)?,
                max_rejoin_attempts: optional("MAX_REJOIN_ATTEMPTS")?.unwrap_or(defaults.max_rejoin_attempts),
            },

            max_playlist_size: optional("MAX_PLAYLIST_SIZE")?.unwrap_or(100),
            queue_page_size: optional("QUEUE_PAGE_SIZE")?.unwrap_or(10),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Every session duration must be non-zero
    /// - The queue page size must be non-zero
    /// - The rejoin budget cannot exceed 10 attempts
    pub fn validate(&self) -> Result<()> {
        let timings = &self.timings;
        for (name, value) in [
            ("IDLE_TIMEOUT", timings.idle_timeout),
            ("EMPTY_CHANNEL_TIMEOUT", timings.empty_channel_timeout),
            ("READY_TIMEOUT", timings.ready_timeout),
            ("MOVE_GRACE", timings.move_grace),
            ("REJOIN_BACKOFF", timings.rejoin_backoff),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if timings.max_rejoin_attempts > 10 {
            anyhow::bail!(
                "MAX_REJOIN_ATTEMPTS cannot exceed 10, got: {}",
                timings.max_rejoin_attempts
            );
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        let t = &self.timings;
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Music channel: {}\n  \
            Session: idle {}, empty channel {}, ready {}, move grace {}\n  \
            Rejoin: {} attempts, {} step\n  \
            Limits: {} playlist tracks, {} per queue page",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.music_channel
                .map_or("any".to_string(), |c| c.channel_id.to_string()),
            humantime::format_duration(t.idle_timeout),
            humantime::format_duration(t.empty_channel_timeout),
            humantime::format_duration(t.ready_timeout),
            humantime::format_duration(t.move_grace),
            t.max_rejoin_attempts,
            humantime::format_duration(t.rejoin_backoff),
            self.max_playlist_size,
            self.queue_page_size,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            music_channel: None,
            timings: SessionTimings::default(),
            max_playlist_size: 100,
            queue_page_size: 10,
        }
    }
}

fn duration(key: &str, default: Duration) -> Result<Duration> {
    parse_duration(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_duration(key: &str, raw: Option<&str>, default: Duration) -> Result<Duration> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => {
            humantime::parse_duration(value).with_context(|| format!("{key} inválido: {value:?}"))
        }
        _ => Ok(default),
    }
}

fn optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} inválido: {value:?}")),
        _ => Ok(None),
    }
}
