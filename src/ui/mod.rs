//! Embeds, botones y avisos en Discord.

pub mod announcer;
pub mod buttons;
pub mod embeds;

pub use announcer::ChannelAnnouncer;
