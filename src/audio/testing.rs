//! Dobles de prueba para las sesiones: transporte, reproductor y avisos en memoria.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};

use super::{
    announce::{Announcement, Announcer},
    connection::{ConnectionState, VoiceConnection},
    error::TrackError,
    player::{AudioSink, PlaybackId, PlayerSignal},
    registry::SessionRegistry,
    subscription::{SessionInbox, SessionSender, SessionSetup, Subscription, SubscriptionHandle},
    track::{Track, TrackEvents, TrackInfo},
};
use crate::config::SessionTimings;

/// Deja correr todo el trabajo pendiente; con el reloj pausado solo avanza 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Registra los ganchos disparados como `"start:T"`, `"finish:T"`, `"error:T"`
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn push(&self, event: &str, track: &TrackInfo) {
        self.0.lock().push(format!("{event}:{}", track.title));
    }
}

impl TrackEvents for EventLog {
    fn on_start(&self, track: &TrackInfo) {
        self.push("start", track);
    }

    fn on_finish(&self, track: &TrackInfo) {
        self.push("finish", track);
    }

    fn on_error(&self, track: &TrackInfo, _error: &TrackError) {
        self.push("error", track);
    }
}

fn info(title: &str) -> TrackInfo {
    TrackInfo::new(title, format!("https://music.test/{title}"))
}

/// Track cuyo recurso es su propio título
pub fn track(title: &str, log: &EventLog) -> Track<String> {
    let resource = title.to_string();
    Track::new(
        info(title),
        Arc::new(move || {
            let resource = resource.clone();
            async move { Ok(resource) }.boxed()
        }),
        Arc::new(log.clone()),
    )
}

pub fn failing_track(title: &str, log: &EventLog) -> Track<String> {
    let reason = format!("{title} is unavailable");
    Track::new(
        info(title),
        Arc::new(move || {
            let reason = reason.clone();
            async move { Err(TrackError::ResourceCreation(reason)) }.boxed()
        }),
        Arc::new(log.clone()),
    )
}

#[derive(Default)]
struct ConnectionCalls {
    rejoins: u32,
    destroys: u32,
}

#[derive(Clone, Default)]
pub struct FakeConnection(Arc<Mutex<ConnectionCalls>>);

impl FakeConnection {
    pub fn rejoins(&self) -> u32 {
        self.0.lock().rejoins
    }

    pub fn destroys(&self) -> u32 {
        self.0.lock().destroys
    }
}

impl VoiceConnection for FakeConnection {
    fn rejoin(&self) {
        self.0.lock().rejoins += 1;
    }

    fn destroy(&self) {
        self.0.lock().destroys += 1;
    }
}

#[derive(Default)]
struct SinkCalls {
    played: Vec<(PlaybackId, String)>,
    pauses: u32,
    resumes: u32,
    stops: u32,
}

/// Reproductor que acepta todo y nunca termina por sí solo
#[derive(Clone, Default)]
pub struct FakeSink(Arc<Mutex<SinkCalls>>);

impl FakeSink {
    pub fn played(&self) -> Vec<(PlaybackId, String)> {
        self.0.lock().played.clone()
    }

    pub fn played_titles(&self) -> Vec<String> {
        self.0.lock().played.iter().map(|(_, title)| title.clone()).collect()
    }

    pub fn last_playback(&self) -> PlaybackId {
        self.0
            .lock()
            .played
            .last()
            .map(|(playback, _)| *playback)
            .expect("nothing was played")
    }

    pub fn pauses(&self) -> u32 {
        self.0.lock().pauses
    }

    pub fn resumes(&self) -> u32 {
        self.0.lock().resumes
    }

    pub fn stops(&self) -> u32 {
        self.0.lock().stops
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    type Resource = String;

    async fn play(&mut self, resource: String, playback: PlaybackId) -> anyhow::Result<()> {
        self.0.lock().played.push((playback, resource));
        Ok(())
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.0.lock().pauses += 1;
        Ok(())
    }

    async fn resume(&mut self) -> anyhow::Result<()> {
        self.0.lock().resumes += 1;
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.0.lock().stops += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingAnnouncer(Arc<Mutex<Vec<Announcement>>>);

impl RecordingAnnouncer {
    pub fn announcements(&self) -> Vec<Announcement> {
        self.0.lock().clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, announcement: Announcement) {
        self.0.lock().push(announcement);
    }
}

/// Una sesión en marcha sobre dobles de prueba
pub struct Harness {
    pub handle: SubscriptionHandle<String>,
    pub sender: SessionSender<String>,
    pub connection: FakeConnection,
    pub sink: FakeSink,
    pub announcer: RecordingAnnouncer,
    pub registry: Arc<SessionRegistry<String>>,
    pub timings: SessionTimings,
    pub log: EventLog,
}

impl Harness {
    pub fn guild() -> GuildId {
        GuildId::new(1)
    }

    pub fn voice() -> ChannelId {
        ChannelId::new(10)
    }

    /// Sesión con la conexión ya lista
    pub fn spawn() -> Self {
        Self::build(ConnectionState::Ready, Arc::new(SessionRegistry::new()))
    }

    pub fn with_state(initial_state: ConnectionState) -> Self {
        Self::build(initial_state, Arc::new(SessionRegistry::new()))
    }

    pub fn spawn_in(registry: Arc<SessionRegistry<String>>) -> Self {
        Self::build(ConnectionState::Ready, registry)
    }

    fn build(initial_state: ConnectionState, registry: Arc<SessionRegistry<String>>) -> Self {
        let inbox = SessionInbox::new();
        let sender = inbox.sender();
        let connection = FakeConnection::default();
        let sink = FakeSink::default();
        let announcer = RecordingAnnouncer::default();
        let timings = SessionTimings::default();

        let handle = Subscription::spawn(
            SessionSetup {
                guild_id: Self::guild(),
                voice_channel: Self::voice(),
                connection: connection.clone(),
                sink: sink.clone(),
                announcer: Arc::new(announcer.clone()),
                timings,
                initial_state,
            },
            inbox,
            registry.clone(),
        );

        Self {
            handle,
            sender,
            connection,
            sink,
            announcer,
            registry,
            timings,
            log: EventLog::default(),
        }
    }

    /// El reproductor termina el track en curso
    pub fn finish_current(&self) {
        self.sender.player(PlayerSignal::Finished(self.sink.last_playback()));
    }
}
