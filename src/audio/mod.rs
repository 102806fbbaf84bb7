//! # Audio Module
//!
//! Per-guild playback sessions for the music bot.
//!
//! Each guild with an active voice connection owns one [`subscription`]
//! task. The task composes three state machines and reconciles their events
//! in arrival order:
//!
//! ### [`connection`] - Voice Connection Supervisor
//! - Rejoin with linear backoff, bounded attempts
//! - Grace window for channel moves (close code 4014)
//! - Deadline for reaching `Ready`
//!
//! ### [`player`] - Playback Engine
//! - `Idle → Buffering → Playing ⇄ Paused/AutoPaused → Idle`
//! - Track lifecycle hooks fire exactly once
//! - Signals tagged with a [`player::PlaybackId`] so stale ones are dropped
//!
//! ### [`queue`] - Track Queue
//! - FIFO with front insertion for repeats
//! - Uniform shuffle
//!
//! The session registry ([`registry`]) maps guilds to live sessions and
//! [`songbird_backend`] adapts songbird's `Call` to the transport and
//! player seams.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use session_music_bot::audio::subscription::SubscriptionHandle;
//! # async fn example(session: SubscriptionHandle<songbird::input::Input>) -> anyhow::Result<()> {
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod announce;
pub mod connection;
pub mod error;
pub mod player;
pub mod queue;
pub mod registry;
pub mod songbird_backend;
pub mod subscription;
pub mod timer;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;
