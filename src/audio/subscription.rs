//! Sesión de reproducción de un servidor.
//!
//! Una [`Subscription`] compone la conexión de voz, el reproductor y la cola
//! de un servidor, y corre como una tarea propia que procesa sus eventos de
//! a uno y en orden de llegada: comandos, cambios de conexión, señales del
//! reproductor, temporizadores, recursos ya creados y cambios de miembros.
//! Desde fuera solo se habla con ella a través de [`SubscriptionHandle`].

use futures::FutureExt;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot, watch,
};
use tracing::{debug, info, warn};

use super::{
    announce::{Announcement, Announcer},
    connection::{ConnectionEvent, ConnectionState, ConnectionSupervisor, Supervision, VoiceConnection},
    error::{SessionError, TrackError},
    player::{AudioSink, EngineOutcome, PlaybackEngine, PlaybackId, PlayerSignal, PlayerState},
    queue::TrackQueue,
    registry::{SessionId, SessionRegistry},
    timer::{Scheduler, TimerFired, TimerKind, TimerSlot},
    track::{ResourceFactory, Track, TrackInfo},
};
use crate::config::SessionTimings;

/// Cambio de miembros en los canales de voz de un servidor.
///
/// `listeners` cuenta los miembros que no son bots por canal, al menos
/// para `old_channel` y `new_channel`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    /// El cambio es del propio bot
    pub is_self: bool,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
    pub listeners: HashMap<ChannelId, usize>,
}

/// Estado observable de una sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub connection: ConnectionState,
    pub rejoin_attempts: u32,
    pub player: PlayerState,
    pub current: Option<TrackInfo>,
    pub pending: Vec<TrackInfo>,
    pub idle_timer_armed: bool,
    pub empty_channel_timer_armed: bool,
}

pub enum Command<R> {
    Enqueue {
        tracks: Vec<Track<R>>,
        front: bool,
        reply: oneshot::Sender<()>,
    },
    Repeat(oneshot::Sender<Option<TrackInfo>>),
    Skip(oneshot::Sender<bool>),
    Pause(oneshot::Sender<bool>),
    Resume(oneshot::Sender<bool>),
    Mix(oneshot::Sender<()>),
    Leave(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

pub enum SessionEvent<R> {
    Command(Command<R>),
    Connection(ConnectionEvent),
    Player(PlayerSignal),
    Timer(TimerFired),
    Resource {
        playback: PlaybackId,
        result: Result<R, TrackError>,
    },
    Membership(MembershipChange),
}

impl<R> From<TimerFired> for SessionEvent<R> {
    fn from(fired: TimerFired) -> Self {
        Self::Timer(fired)
    }
}

/// Canal de entrada de una sesión, creado antes que sus adaptadores
pub struct SessionInbox<R> {
    tx: UnboundedSender<SessionEvent<R>>,
    rx: UnboundedReceiver<SessionEvent<R>>,
}

impl<R> Default for SessionInbox<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SessionInbox<R> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> SessionSender<R> {
        SessionSender { tx: self.tx.clone() }
    }
}

/// Extremo por el que los adaptadores (voz, reproductor, gateway) publican en la sesión.
pub struct SessionSender<R> {
    tx: UnboundedSender<SessionEvent<R>>,
}

impl<R> Clone for SessionSender<R> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<R> SessionSender<R> {
    pub fn connection(&self, event: ConnectionEvent) {
        self.publish(SessionEvent::Connection(event));
    }

    pub fn player(&self, signal: PlayerSignal) {
        self.publish(SessionEvent::Player(signal));
    }

    pub fn membership(&self, change: MembershipChange) {
        self.publish(SessionEvent::Membership(change));
    }

    fn resource(&self, playback: PlaybackId, result: Result<R, TrackError>) {
        self.publish(SessionEvent::Resource { playback, result });
    }

    fn publish(&self, event: SessionEvent<R>) {
        if self.tx.send(event).is_err() {
            debug!("Evento descartado: la sesión ya terminó");
        }
    }
}

/// Piezas con las que arranca una sesión
pub struct SessionSetup<C, S> {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub connection: C,
    pub sink: S,
    pub announcer: Arc<dyn Announcer>,
    pub timings: SessionTimings,
    /// Estado en el que está la conexión al crear la sesión
    pub initial_state: ConnectionState,
}

/// Manija de una sesión viva; clonarla es barato.
pub struct SubscriptionHandle<R> {
    tx: UnboundedSender<SessionEvent<R>>,
    guild_id: GuildId,
    session_id: SessionId,
    state: watch::Receiver<ConnectionState>,
}

impl<R> Clone for SubscriptionHandle<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            guild_id: self.guild_id,
            session_id: self.session_id,
            state: self.state.clone(),
        }
    }
}

impl<R> SubscriptionHandle<R> {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.connection_state() == ConnectionState::Ready
    }

    /// La sesión terminó o su conexión fue destruida
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.connection_state() == ConnectionState::Destroyed
    }

    /// Espera a que la conexión llegue a `Ready`.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, ConnectionState::Ready | ConnectionState::Destroyed)),
        )
        .await;

        match settled {
            Ok(Ok(reached)) if *reached == ConnectionState::Ready => Ok(()),
            Ok(_) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::NotReady(timeout)),
        }
    }

    /// Reenvía un cambio de miembros del canal de voz; se descarta si la sesión ya terminó
    pub fn membership(&self, change: MembershipChange) {
        if self.tx.send(SessionEvent::Membership(change)).is_err() {
            debug!("[{}] Cambio de miembros descartado: la sesión ya terminó", self.guild_id);
        }
    }

    pub async fn enqueue(&self, tracks: Vec<Track<R>>) -> Result<(), SessionError> {
        self.request(|reply| Command::Enqueue { tracks, front: false, reply }).await
    }

    pub async fn enqueue_front(&self, tracks: Vec<Track<R>>) -> Result<(), SessionError> {
        self.request(|reply| Command::Enqueue { tracks, front: true, reply }).await
    }

    /// Vuelve a encolar al frente el track en curso; solo mientras suena
    pub async fn repeat(&self) -> Result<Option<TrackInfo>, SessionError> {
        self.request(Command::Repeat).await
    }

    pub async fn skip(&self) -> Result<bool, SessionError> {
        self.request(Command::Skip).await
    }

    pub async fn pause(&self) -> Result<bool, SessionError> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<bool, SessionError> {
        self.request(Command::Resume).await
    }

    pub async fn mix(&self) -> Result<(), SessionError> {
        self.request(Command::Mix).await
    }

    /// Detiene todo, desconecta y retira la sesión del registro
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(Command::Leave).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(Command::Snapshot).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command<R>,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SessionEvent::Command(command(reply)))
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }
}

pub struct Subscription<C, S: AudioSink> {
    guild_id: GuildId,
    session_id: SessionId,
    voice_channel: ChannelId,
    connection: ConnectionSupervisor<C, SessionEvent<S::Resource>>,
    player: PlaybackEngine<S>,
    queue: TrackQueue<S::Resource>,
    queue_lock: bool,
    idle_timer: TimerSlot,
    empty_channel_timer: TimerSlot,
    scheduler: Scheduler<SessionEvent<S::Resource>>,
    sender: SessionSender<S::Resource>,
    rx: UnboundedReceiver<SessionEvent<S::Resource>>,
    announcer: Arc<dyn Announcer>,
    timings: SessionTimings,
    state_tx: watch::Sender<ConnectionState>,
    registry: Arc<SessionRegistry<S::Resource>>,
    closed: bool,
}

impl<C, S> Subscription<C, S>
where
    C: VoiceConnection,
    S: AudioSink,
{
    /// Arranca la sesión, la registra y devuelve su manija.
    pub fn spawn(
        setup: SessionSetup<C, S>,
        inbox: SessionInbox<S::Resource>,
        registry: Arc<SessionRegistry<S::Resource>>,
    ) -> SubscriptionHandle<S::Resource> {
        let SessionInbox { tx, rx } = inbox;
        let scheduler = Scheduler::new(tx.clone());
        let session_id = registry.next_session_id();
        let (state_tx, state_rx) = watch::channel(setup.initial_state);

        let handle = SubscriptionHandle {
            tx: tx.clone(),
            guild_id: setup.guild_id,
            session_id,
            state: state_rx,
        };

        let mut subscription = Self {
            guild_id: setup.guild_id,
            session_id,
            voice_channel: setup.voice_channel,
            connection: ConnectionSupervisor::new(
                setup.connection,
                setup.timings.reconnect_policy(),
                scheduler.clone(),
            ),
            player: PlaybackEngine::new(setup.sink),
            queue: TrackQueue::new(),
            queue_lock: false,
            idle_timer: TimerSlot::default(),
            empty_channel_timer: TimerSlot::default(),
            scheduler,
            sender: SessionSender { tx },
            rx,
            announcer: setup.announcer,
            timings: setup.timings,
            state_tx,
            registry: registry.clone(),
            closed: false,
        };

        // Arma el plazo de Ready si la conexión aún no está lista
        let _ = subscription
            .connection
            .handle_event(ConnectionEvent::new(setup.initial_state));

        if let Some(previous) = registry.insert(handle.clone()) {
            warn!("⚠️ [{}] Reemplazando la sesión {:?}", setup.guild_id, previous.session_id());
        }

        info!("🎧 [{}] Sesión {:?} iniciada en {}", setup.guild_id, session_id, setup.voice_channel);
        tokio::spawn(subscription.run());
        handle
    }

    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.handle(event).await;
            if self.closed {
                break;
            }
        }
        info!("👋 [{}] Sesión {:?} terminada", self.guild_id, self.session_id);
    }

    async fn handle(&mut self, event: SessionEvent<S::Resource>) {
        match event {
            SessionEvent::Command(command) => self.handle_command(command).await,
            SessionEvent::Connection(event) => {
                let supervision = self.connection.handle_event(event);
                self.after_connection(supervision).await;
            }
            SessionEvent::Player(signal) => {
                if self.player.handle_signal(signal) == EngineOutcome::BecameIdle {
                    self.process_queue();
                }
            }
            SessionEvent::Timer(fired) => self.handle_timer(fired).await,
            SessionEvent::Resource { playback, result } => match result {
                Ok(resource) => {
                    if self.player.start(playback, resource).await == EngineOutcome::BecameIdle {
                        self.process_queue();
                    }
                }
                Err(error) => {
                    if let Some(mut track) = self.player.abandon(playback) {
                        warn!("❌ [{}] No se pudo preparar {}: {}", self.guild_id, track.title(), error);
                        track.notify_error(&error);
                        self.process_queue();
                    }
                }
            },
            SessionEvent::Membership(change) => self.handle_membership(change).await,
        }
    }

    async fn handle_command(&mut self, command: Command<S::Resource>) {
        match command {
            Command::Enqueue { tracks, front, reply } => {
                if front {
                    self.queue.enqueue_front(tracks);
                } else {
                    self.queue.enqueue(tracks);
                }
                self.idle_timer.cancel();
                self.process_queue();
                let _ = reply.send(());
            }
            Command::Repeat(reply) => {
                let repeated = match self.player.state() {
                    PlayerState::Playing => self.player.replay_current(),
                    _ => None,
                };
                let info = repeated.map(|track| {
                    let info = track.info().clone();
                    self.queue.enqueue_front(vec![track]);
                    info
                });
                self.process_queue();
                let _ = reply.send(info);
            }
            Command::Skip(reply) => {
                let skipped = self.player.state() == PlayerState::Playing;
                if skipped && self.player.stop(false).await == EngineOutcome::BecameIdle {
                    self.process_queue();
                }
                let _ = reply.send(skipped);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.player.pause().await);
            }
            Command::Resume(reply) => {
                let resumed = self.player.unpause().await;
                if resumed {
                    self.empty_channel_timer.cancel();
                }
                let _ = reply.send(resumed);
            }
            Command::Mix(reply) => {
                self.queue_lock = true;
                self.queue.shuffle();
                self.queue_lock = false;
                let _ = reply.send(());
            }
            Command::Leave(reply) => {
                self.teardown("leave").await;
                let _ = reply.send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::IdleDisposal => {
                if self.idle_timer.settle(fired.id) {
                    info!("💤 [{}] Sin actividad durante {:?}", self.guild_id, self.timings.idle_timeout);
                    self.teardown("inactividad").await;
                }
            }
            TimerKind::EmptyChannel => {
                if self.empty_channel_timer.settle(fired.id) {
                    self.announcer.announce(Announcement::EmptyChannelExpired);
                    self.teardown("canal vacío").await;
                }
            }
            _ => {
                let supervision = self.connection.on_timer(fired);
                self.after_connection(supervision).await;
            }
        }
    }

    async fn after_connection(&mut self, supervision: Supervision) {
        self.state_tx.send_replace(self.connection.state());
        if supervision == Supervision::Destroyed {
            self.teardown("conexión destruida").await;
        }
    }

    /// Toma el siguiente track si el reproductor está libre.
    fn process_queue(&mut self) {
        if self.queue_lock || self.player.state() != PlayerState::Idle {
            return;
        }

        if self.queue.is_empty() {
            self.announcer.announce(Announcement::QueueFinished);
            self.idle_timer.arm(
                self.scheduler
                    .arm(self.timings.idle_timeout, TimerKind::IdleDisposal),
            );
            return;
        }
        self.idle_timer.cancel();

        self.queue_lock = true;
        if let Some(track) = self.queue.pop_front() {
            let factory = track.factory();
            let playback = self.player.load(track);
            self.create_resource(playback, factory);
        }
        self.queue_lock = false;
    }

    fn create_resource(&self, playback: PlaybackId, factory: ResourceFactory<S::Resource>) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(async move { factory().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(TrackError::ResourceCreation("resource factory panicked".into())));
            sender.resource(playback, result);
        });
    }

    async fn handle_membership(&mut self, change: MembershipChange) {
        if change.is_self {
            if let Some(new_channel) = change.new_channel {
                if change.old_channel == Some(self.voice_channel) && new_channel != self.voice_channel {
                    info!("🔀 [{}] Movido al canal de voz {}", self.guild_id, new_channel);
                    self.voice_channel = new_channel;
                }
            }
        }

        let ours = Some(self.voice_channel);
        if change.old_channel != ours && change.new_channel != ours {
            return;
        }

        let listeners = change.listeners.get(&self.voice_channel).copied().unwrap_or(0);
        debug!("👥 [{}] {} oyentes en {}", self.guild_id, listeners, self.voice_channel);

        // Con oyentes el canal ya no está vacío, sea cual sea el estado del reproductor
        if listeners > 0 && self.empty_channel_timer.cancel() {
            debug!("⏹️ [{}] Temporizador de canal vacío cancelado", self.guild_id);
        }

        match self.player.state() {
            PlayerState::Playing if listeners == 0 => {
                if self.player.auto_pause().await {
                    self.announcer.announce(Announcement::PausedEmptyChannel);
                    self.empty_channel_timer.arm(
                        self.scheduler
                            .arm(self.timings.empty_channel_timeout, TimerKind::EmptyChannel),
                    );
                }
            }
            PlayerState::AutoPaused if listeners > 0 => {
                if self.player.unpause().await {
                    self.announcer.announce(Announcement::ListenerReturned);
                }
            }
            _ => {}
        }
    }

    /// Detiene la reproducción, vacía la cola y bloquea nuevos avances
    async fn stop(&mut self) {
        self.queue_lock = true;
        self.queue.clear();
        let _ = self.player.stop(true).await;
    }

    /// Cancela ambos temporizadores y destruye la conexión si aún vive; idempotente
    fn delete(&mut self) {
        self.idle_timer.cancel();
        self.empty_channel_timer.cancel();
        let _ = self.connection.destroy();
    }

    async fn teardown(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        info!("🧹 [{}] Cerrando sesión ({})", self.guild_id, reason);

        self.stop().await;
        self.delete();
        self.registry.remove_session(self.guild_id, self.session_id);
        self.state_tx.send_replace(ConnectionState::Destroyed);
        self.closed = true;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            voice_channel: self.voice_channel,
            connection: self.connection.state(),
            rejoin_attempts: self.connection.rejoin_attempts(),
            player: self.player.state(),
            current: self.player.current().cloned(),
            pending: self.queue.infos(),
            idle_timer_armed: self.idle_timer.is_armed(),
            empty_channel_timer_armed: self.empty_channel_timer.is_armed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        connection::DisconnectReason,
        testing::{failing_track, settle, track, Harness},
    };
    use pretty_assertions::assert_eq;

    fn titles(infos: &[TrackInfo]) -> Vec<&str> {
        infos.iter().map(|info| info.title.as_str()).collect()
    }

    fn listeners(count: usize) -> MembershipChange {
        MembershipChange {
            is_self: false,
            old_channel: Some(Harness::voice()),
            new_channel: None,
            listeners: HashMap::from([(Harness::voice(), count)]),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_plays_in_order() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log)])
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.sink.played_titles(), vec!["A"]);
        assert_eq!(h.log.entries(), vec!["start:A"]);

        h.finish_current();
        settle().await;

        assert_eq!(h.log.entries(), vec!["start:A", "finish:A", "start:B"]);
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.current.map(|t| t.title), Some("B".to_string()));
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_front_insert_plays_next() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log)])
            .await
            .unwrap();
        settle().await;
        h.finish_current();
        settle().await;

        // B suena; C entra al frente por delante de D, encolado antes
        h.handle.enqueue(vec![track("D", &h.log)]).await.unwrap();
        h.handle.enqueue_front(vec![track("C", &h.log)]).await.unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot.pending), vec!["C", "D"]);

        h.finish_current();
        settle().await;
        assert_eq!(h.sink.played_titles(), vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_requeues_current_at_front() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log)])
            .await
            .unwrap();
        settle().await;

        let repeated = h.handle.repeat().await.unwrap();
        assert_eq!(repeated.map(|t| t.title), Some("A".to_string()));

        h.finish_current();
        settle().await;
        assert_eq!(h.sink.played_titles(), vec!["A", "A"]);
        assert_eq!(h.log.entries(), vec!["start:A", "finish:A", "start:A"]);

        assert!(h.handle.pause().await.unwrap());
        assert_eq!(h.handle.repeat().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resources_drain_to_next_track() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![
                failing_track("X", &h.log),
                failing_track("Y", &h.log),
                track("Z", &h.log),
            ])
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.log.entries(), vec!["error:X", "error:Y", "start:Z"]);
        assert_eq!(h.sink.played_titles(), vec!["Z"]);
        assert!(h.announcer.announcements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_until_queue_exhausted() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![failing_track("X", &h.log), failing_track("Y", &h.log)])
            .await
            .unwrap();
        settle().await;

        assert_eq!(h.log.entries(), vec!["error:X", "error:Y"]);
        assert_eq!(h.announcer.announcements(), vec![Announcement::QueueFinished]);
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::Idle);
        assert!(snapshot.idle_timer_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_error_advances_once() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log), track("C", &h.log)])
            .await
            .unwrap();
        settle().await;

        let playback = h.sink.last_playback();
        h.sender.player(PlayerSignal::Failed(playback, TrackError::Playback("decoder".into())));
        h.sender.player(PlayerSignal::Finished(playback));
        settle().await;

        assert_eq!(h.sink.played_titles(), vec!["A", "B"]);
        assert_eq!(h.log.entries(), vec!["start:A", "error:A", "finish:A", "start:B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_while_busy_keeps_one_playing() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        // A todavía está en preparación
        h.handle.enqueue(vec![track("B", &h.log)]).await.unwrap();
        settle().await;
        h.handle.enqueue(vec![track("C", &h.log)]).await.unwrap();
        settle().await;

        assert_eq!(h.sink.played_titles(), vec!["A"]);
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::Playing);
        assert_eq!(titles(&snapshot.pending), vec!["B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_moves_to_next() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log)])
            .await
            .unwrap();
        settle().await;

        assert!(h.handle.skip().await.unwrap());
        settle().await;
        assert_eq!(h.sink.played_titles(), vec!["A", "B"]);
        assert_eq!(h.sink.stops(), 1);

        assert!(h.handle.pause().await.unwrap());
        assert!(!h.handle.skip().await.unwrap());
        assert!(!h.handle.pause().await.unwrap());
        assert!(h.handle.resume().await.unwrap());
        assert!(!h.handle.resume().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mix_keeps_current_and_permutes_pending() {
        let h = Harness::spawn();
        let names: Vec<String> = (0..20).map(|i| format!("T{i}")).collect();
        h.handle
            .enqueue(names.iter().map(|name| track(name, &h.log)).collect())
            .await
            .unwrap();
        settle().await;

        h.handle.mix().await.unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.current.map(|t| t.title), Some("T0".to_string()));

        let mut pending: Vec<String> = snapshot.pending.into_iter().map(|t| t.title).collect();
        pending.sort();
        let mut expected = names[1..].to_vec();
        expected.sort();
        assert_eq!(pending, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_cancelled_by_late_enqueue() {
        let h = Harness::spawn();
        let idle = h.timings.idle_timeout;
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        h.finish_current();
        settle().await;
        assert!(h.handle.snapshot().await.unwrap().idle_timer_armed);

        // `settle` ya avanzó 1ms desde que se armó
        tokio::time::sleep(idle - Duration::from_millis(2)).await;
        h.handle.enqueue(vec![track("B", &h.log)]).await.unwrap();
        tokio::time::sleep(idle * 3).await;

        assert!(!h.handle.is_closed());
        assert_eq!(h.connection.destroys(), 0);
        assert_eq!(h.sink.played_titles(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_tears_down() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;
        h.finish_current();
        settle().await;

        tokio::time::sleep(h.timings.idle_timeout).await;
        settle().await;

        assert!(h.handle.is_closed());
        assert!(h.registry.is_empty());
        assert_eq!(h.connection.destroys(), 1);
        assert_eq!(h.handle.snapshot().await, Err(SessionError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel_pause_then_listener_returns() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        h.sender.membership(listeners(0));
        settle().await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::AutoPaused);
        assert!(snapshot.empty_channel_timer_armed);
        assert_eq!(h.sink.pauses(), 1);

        tokio::time::sleep(h.timings.empty_channel_timeout - Duration::from_secs(60)).await;
        h.sender.membership(listeners(1));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::Playing);
        assert!(!snapshot.empty_channel_timer_armed);

        tokio::time::sleep(h.timings.empty_channel_timeout * 2).await;
        assert!(!h.handle.is_closed());
        assert_eq!(
            h.announcer.announcements(),
            vec![Announcement::PausedEmptyChannel, Announcement::ListenerReturned]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel_timer_tears_down() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log), track("B", &h.log)]).await.unwrap();
        settle().await;

        h.sender.membership(listeners(0));
        tokio::time::sleep(h.timings.empty_channel_timeout).await;
        settle().await;

        assert!(h.handle.is_closed());
        assert!(h.registry.is_empty());
        assert_eq!(h.connection.destroys(), 1);
        assert_eq!(
            h.announcer.announcements(),
            vec![Announcement::PausedEmptyChannel, Announcement::EmptyChannelExpired]
        );
        // El track en curso termina y el siguiente nunca empieza
        assert_eq!(h.log.entries(), vec!["start:A", "finish:A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_pause_survives_listener_return() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        assert!(h.handle.pause().await.unwrap());
        h.sender.membership(listeners(0));
        h.sender.membership(listeners(2));
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::Paused);
        assert!(!snapshot.empty_channel_timer_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_return_after_failed_track_keeps_session() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log), track("B", &h.log)]).await.unwrap();
        settle().await;

        h.sender.membership(listeners(0));
        settle().await;
        assert_eq!(h.handle.snapshot().await.unwrap().player, PlayerState::AutoPaused);

        // El track pausado falla y el siguiente arranca con el canal aún vacío
        h.sender.player(PlayerSignal::Failed(
            h.sink.last_playback(),
            TrackError::Playback("stream cerrado".into()),
        ));
        settle().await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.player, PlayerState::Playing);
        assert_eq!(snapshot.current.map(|info| info.title), Some("B".to_string()));

        h.sender.membership(listeners(2));
        settle().await;
        assert!(!h.handle.snapshot().await.unwrap().empty_channel_timer_armed);

        tokio::time::sleep(h.timings.empty_channel_timeout * 2).await;
        settle().await;

        assert!(!h.handle.is_closed());
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.connection.destroys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_forwards_membership() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        h.handle.membership(listeners(0));
        settle().await;
        assert_eq!(h.handle.snapshot().await.unwrap().player, PlayerState::AutoPaused);

        h.handle.leave().await.unwrap();
        settle().await;

        // Tras el cierre el cambio se descarta sin efectos
        h.handle.membership(listeners(3));
        settle().await;
        assert!(h.handle.is_closed());
        assert_eq!(h.sink.resumes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_in_other_channels_is_ignored() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        let elsewhere = ChannelId::new(99);
        h.sender.membership(MembershipChange {
            is_self: false,
            old_channel: Some(elsewhere),
            new_channel: None,
            listeners: HashMap::from([(elsewhere, 0)]),
        });
        settle().await;

        assert_eq!(h.handle.snapshot().await.unwrap().player, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_move_follows_new_channel() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        let stage = ChannelId::new(20);
        h.sender.membership(MembershipChange {
            is_self: true,
            old_channel: Some(Harness::voice()),
            new_channel: Some(stage),
            listeners: HashMap::from([(Harness::voice(), 3), (stage, 0)]),
        });
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.voice_channel, stage);
        assert_eq!(snapshot.player, PlayerState::AutoPaused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_is_terminal() {
        let h = Harness::spawn();
        h.handle
            .enqueue(vec![track("A", &h.log), track("B", &h.log)])
            .await
            .unwrap();
        settle().await;

        h.handle.leave().await.unwrap();

        assert!(h.registry.is_empty());
        assert_eq!(h.connection.destroys(), 1);
        assert_eq!(h.sink.stops(), 1);
        assert_eq!(h.log.entries(), vec!["start:A", "finish:A"]);
        assert_eq!(h.handle.leave().await, Err(SessionError::Closed));
        assert!(h.announcer.announcements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_connection_tears_down() {
        let h = Harness::spawn();
        h.handle.enqueue(vec![track("A", &h.log)]).await.unwrap();
        settle().await;

        h.sender.connection(ConnectionEvent::new(ConnectionState::Destroyed));
        settle().await;

        assert!(h.handle.is_closed());
        assert!(h.registry.is_empty());
        // Ya estaba destruida: no se destruye dos veces
        assert_eq!(h.connection.destroys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_rejoins_tear_down() {
        let h = Harness::spawn();
        let drop_link = || ConnectionEvent::disconnected(DisconnectReason::Other);

        for _ in 0..5 {
            h.sender.connection(drop_link());
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        assert_eq!(h.connection.rejoins(), 5);
        assert_eq!(h.handle.snapshot().await.unwrap().rejoin_attempts, 5);

        h.sender.connection(drop_link());
        settle().await;

        assert!(h.handle.is_closed());
        assert_eq!(h.connection.rejoins(), 5);
        assert_eq!(h.connection.destroys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready() {
        let h = Harness::with_state(ConnectionState::Signalling);
        let sender = h.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            sender.connection(ConnectionEvent::new(ConnectionState::Ready));
        });

        assert_eq!(h.handle.wait_ready(Duration::from_secs(20)).await, Ok(()));
        assert!(h.handle.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_deadline_fails_join() {
        let h = Harness::with_state(ConnectionState::Signalling);

        let waited = h.handle.wait_ready(Duration::from_secs(30)).await;

        assert_eq!(waited, Err(SessionError::Closed));
        assert_eq!(h.connection.destroys(), 1);
        assert!(h.registry.is_empty());
    }
}
