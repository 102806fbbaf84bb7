use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage},
};

use crate::audio::{
    announce::{Announcement, Requester},
    connection::ConnectionState,
    player::PlayerState,
    subscription::SessionSnapshot,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Session Music Bot";

/// Títulos pendientes visibles en el panel de control
const PANEL_PREVIEW: usize = 5;

/// Forma final de un aviso en el canal de texto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Text(String),
    Embed {
        title: String,
        description: String,
        colour: Colour,
        author: Option<Requester>,
    },
}

pub fn notice(announcement: &Announcement) -> Notice {
    match announcement {
        Announcement::QueueFinished => Notice::Embed {
            title: "Finished playing".into(),
            description: "All songs have been played, and if no one wants to hear more, I will leave this voice channel.".into(),
            colour: colors::NEUTRAL_GRAY,
            author: None,
        },
        Announcement::PausedEmptyChannel => Notice::Text(
            "To save resources, I have paused the queue since everyone has left my voice channel.".into(),
        ),
        Announcement::EmptyChannelExpired => Notice::Text(
            "My voice channel has been open for 15 minutes and no one has joined, so the queue has been deleted.".into(),
        ),
        Announcement::ListenerReturned => Notice::Text(
            "There has been a new participant in my voice channel, and the queue will be resumed.".into(),
        ),
        Announcement::TrackStarted { url } => Notice::Text(format!("Playing {url}")),
        Announcement::TrackFinished { track, requested_by } => Notice::Embed {
            title: "Finished".into(),
            description: format!("[{}]({})", track.title, track.url),
            colour: colors::MUSIC_PURPLE,
            author: Some(requested_by.clone()),
        },
        Announcement::TrackFailed { title, error } => Notice::Embed {
            title: "Could not play".into(),
            description: format!("**{title}**\n{error}"),
            colour: colors::ERROR_RED,
            author: None,
        },
    }
}

pub fn notice_message(notice: Notice) -> CreateMessage {
    match notice {
        Notice::Text(content) => CreateMessage::new().content(content),
        Notice::Embed {
            title,
            description,
            colour,
            author,
        } => {
            let mut embed = CreateEmbed::default()
                .title(title)
                .description(description)
                .color(colour)
                .timestamp(Timestamp::now())
                .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

            if let Some(requester) = author {
                let mut author = CreateEmbedAuthor::new(format!("Requested by {}", requester.name));
                if let Some(avatar) = requester.avatar_url {
                    author = author.icon_url(avatar);
                }
                embed = embed.author(author);
            }

            CreateMessage::new().embed(embed)
        }
    }
}

/// Embed de respuesta a un comando
pub fn create_reply_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(reply_colour(title))
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn reply_colour(title: &str) -> Colour {
    match title {
        "Error" | "Not found" => colors::ERROR_RED,
        "Missing voice channel" => colors::WARNING_ORANGE,
        "Enqueued" => colors::SUCCESS_GREEN,
        _ => colors::INFO_BLUE,
    }
}

/// Panel de control armado desde el estado de la sesión
pub fn create_control_panel_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let (status, colour) = panel_status(snapshot);

    let now_playing = match &snapshot.current {
        Some(track) => format!("**[{}]({})**", track.title, track.url),
        None => "Nothing is playing".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title("🎛️ Controls")
        .description(now_playing)
        .color(colour)
        .field("Status", status, true)
        .field("Channel", format!("<#{}>", snapshot.voice_channel), true)
        .field("Queue", snapshot.pending.len().to_string(), true);

    if !snapshot.pending.is_empty() {
        embed = embed.field("Up next", up_next(snapshot), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn panel_status(snapshot: &SessionSnapshot) -> (&'static str, Colour) {
    if snapshot.connection != ConnectionState::Ready {
        return ("🔌 Connecting", colors::WARNING_ORANGE);
    }
    match snapshot.player {
        PlayerState::Playing => ("▶️ Playing", colors::SUCCESS_GREEN),
        PlayerState::Buffering => ("⏳ Loading", colors::INFO_BLUE),
        PlayerState::Paused => ("⏸️ Paused", colors::WARNING_ORANGE),
        PlayerState::AutoPaused => ("⏸️ Paused (empty channel)", colors::WARNING_ORANGE),
        PlayerState::Idle => ("💤 Idle", colors::NEUTRAL_GRAY),
    }
}

fn up_next(snapshot: &SessionSnapshot) -> String {
    let mut lines: Vec<String> = snapshot
        .pending
        .iter()
        .take(PANEL_PREVIEW)
        .enumerate()
        .map(|(i, track)| format!("{}. {}", i + 1, track.title))
        .collect();

    let hidden = snapshot.pending.len().saturating_sub(PANEL_PREVIEW);
    if hidden > 0 {
        lines.push(format!("...and {hidden} more"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::TrackInfo;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    fn snapshot(pending: usize) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: GuildId::new(1),
            voice_channel: ChannelId::new(10),
            connection: ConnectionState::Ready,
            rejoin_attempts: 0,
            player: PlayerState::Playing,
            current: Some(TrackInfo::new("Now", "https://music.test/Now")),
            pending: (1..=pending)
                .map(|i| TrackInfo::new(format!("T{i}"), format!("https://music.test/T{i}")))
                .collect(),
            idle_timer_armed: false,
            empty_channel_timer_armed: false,
        }
    }

    #[test]
    fn test_notice_texts() {
        assert_eq!(
            notice(&Announcement::TrackStarted {
                url: "https://music.test/a".into()
            }),
            Notice::Text("Playing https://music.test/a".into())
        );
        assert_eq!(
            notice(&Announcement::PausedEmptyChannel),
            Notice::Text(
                "To save resources, I have paused the queue since everyone has left my voice channel.".into()
            )
        );
    }

    #[test]
    fn test_finished_notice_carries_requester() {
        let requester = Requester {
            name: "ana".into(),
            avatar_url: Some("https://cdn.test/ana.png".into()),
        };
        let Notice::Embed { title, author, .. } = notice(&Announcement::TrackFinished {
            track: TrackInfo::new("Song", "https://music.test/Song"),
            requested_by: requester.clone(),
        }) else {
            panic!("expected embed");
        };

        assert_eq!(title, "Finished");
        assert_eq!(author, Some(requester));
    }

    #[test]
    fn test_panel_status() {
        let mut state = snapshot(0);
        assert_eq!(panel_status(&state).0, "▶️ Playing");

        state.player = PlayerState::AutoPaused;
        assert_eq!(panel_status(&state).0, "⏸️ Paused (empty channel)");

        state.connection = ConnectionState::Disconnected;
        assert_eq!(panel_status(&state).0, "🔌 Connecting");
    }

    #[test]
    fn test_up_next_is_truncated() {
        assert_eq!(up_next(&snapshot(2)), "1. T1\n2. T2");
        assert!(up_next(&snapshot(8)).ends_with("5. T5\n...and 3 more"));
    }
}
