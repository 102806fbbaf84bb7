//! Supervisión de la conexión de voz de una sesión.
//!
//! [`ConnectionSupervisor`] no implementa el transporte: observa sus cambios
//! de estado y aplica la política de reconexión:
//!
//! - `Disconnected` por cierre 4014: ventana de gracia para distinguir un
//!   cambio de canal (llega `Connecting`) de una expulsión (se destruye).
//! - `Disconnected` por otra causa: `rejoin()` con espera lineal
//!   (`backoff * (intentos + 1)`) mientras queden intentos; luego destruye.
//! - `Signalling`/`Connecting`: plazo para llegar a `Ready` o se destruye.
//! - `Destroyed`: terminal, se propaga al dueño.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::timer::{Scheduler, TimerFired, TimerKind, TimerSlot};

/// Código de cierre del websocket de voz: canal eliminado, expulsión o cambio de canal
pub const CLOSE_CODE_DISCONNECTED: u16 = 4014;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    WebSocketClose(u16),
    Other,
}

/// Cambio de estado reportado por el transporte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub state: ConnectionState,
    pub reason: Option<DisconnectReason>,
}

impl ConnectionEvent {
    pub fn new(state: ConnectionState) -> Self {
        Self { state, reason: None }
    }

    pub fn disconnected(reason: DisconnectReason) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reason: Some(reason),
        }
    }

    fn is_forced_close(&self) -> bool {
        self.reason == Some(DisconnectReason::WebSocketClose(CLOSE_CODE_DISCONNECTED))
    }
}

/// Manija del transporte de voz.
///
/// Ambas operaciones son "disparar y olvidar": la implementación lanza el
/// trabajo real y reporta el resultado como [`ConnectionEvent`].
pub trait VoiceConnection: Send + 'static {
    fn rejoin(&self);
    fn destroy(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub move_grace: Duration,
    pub ready_timeout: Duration,
    pub rejoin_backoff: Duration,
    pub max_rejoin_attempts: u32,
}

/// Resultado de supervisar un evento, para el dueño
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    Steady,
    Destroyed,
}

pub struct ConnectionSupervisor<C, E> {
    transport: C,
    state: ConnectionState,
    rejoin_attempts: u32,
    policy: ReconnectPolicy,
    scheduler: Scheduler<E>,
    // Armado mientras se espera `Ready`; es también la guarda de reentrada
    ready_wait: TimerSlot,
    move_grace: TimerSlot,
    rejoin: TimerSlot,
}

impl<C, E> ConnectionSupervisor<C, E>
where
    C: VoiceConnection,
    E: From<TimerFired> + Send + 'static,
{
    pub fn new(transport: C, policy: ReconnectPolicy, scheduler: Scheduler<E>) -> Self {
        Self {
            transport,
            state: ConnectionState::Signalling,
            rejoin_attempts: 0,
            policy,
            scheduler,
            ready_wait: TimerSlot::default(),
            move_grace: TimerSlot::default(),
            rejoin: TimerSlot::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn rejoin_attempts(&self) -> u32 {
        self.rejoin_attempts
    }

    pub fn handle_event(&mut self, event: ConnectionEvent) -> Supervision {
        if self.state == ConnectionState::Destroyed {
            debug!("Conexión destruida, ignorando {:?}", event.state);
            return Supervision::Steady;
        }

        debug!("🔌 Conexión {:?} -> {:?}", self.state, event.state);
        self.state = event.state;

        match event.state {
            ConnectionState::Disconnected if event.is_forced_close() => {
                // Cambio de canal o expulsión: solo la llegada de Connecting lo distingue
                info!("🔌 Cierre 4014, esperando {:?} por un cambio de canal", self.policy.move_grace);
                self.move_grace
                    .arm(self.scheduler.arm(self.policy.move_grace, TimerKind::MoveGrace));
            }
            ConnectionState::Disconnected if self.rejoin_attempts < self.policy.max_rejoin_attempts => {
                // El intento cuenta al programarse: una desconexión que reemplaza
                // la espera pendiente también consume presupuesto
                self.rejoin_attempts += 1;
                let delay = self.policy.rejoin_backoff * self.rejoin_attempts;
                info!(
                    "🔄 Reconexión {} de {} en {:?}",
                    self.rejoin_attempts, self.policy.max_rejoin_attempts, delay
                );
                self.rejoin.arm(self.scheduler.arm(delay, TimerKind::Rejoin));
            }
            ConnectionState::Disconnected => {
                warn!("🚫 Reconexión agotada tras {} intentos", self.rejoin_attempts);
                return self.destroy();
            }
            ConnectionState::Destroyed => {
                self.cancel_waits();
                return Supervision::Destroyed;
            }
            ConnectionState::Connecting | ConnectionState::Signalling => {
                if event.state == ConnectionState::Connecting && self.move_grace.cancel() {
                    info!("🔀 Cambio de canal de voz en curso");
                }
                if !self.ready_wait.is_armed() {
                    self.ready_wait
                        .arm(self.scheduler.arm(self.policy.ready_timeout, TimerKind::ReadyDeadline));
                }
            }
            ConnectionState::Ready => {
                self.ready_wait.cancel();
                self.move_grace.cancel();
                self.rejoin.cancel();
                self.rejoin_attempts = 0;
            }
        }

        Supervision::Steady
    }

    /// Procesa el disparo de uno de los temporizadores propios
    pub fn on_timer(&mut self, fired: TimerFired) -> Supervision {
        match fired.kind {
            TimerKind::MoveGrace if self.move_grace.settle(fired.id) => {
                warn!("🚪 Sin reconexión tras el cierre 4014, probablemente expulsado");
                self.destroy()
            }
            TimerKind::ReadyDeadline if self.ready_wait.settle(fired.id) => {
                warn!("⏰ La conexión no llegó a Ready en {:?}", self.policy.ready_timeout);
                self.destroy()
            }
            TimerKind::Rejoin if self.rejoin.settle(fired.id) => {
                if self.state == ConnectionState::Disconnected {
                    info!("🔄 Reintentando conexión (intento {})", self.rejoin_attempts);
                    self.transport.rejoin();
                }
                Supervision::Steady
            }
            _ => Supervision::Steady,
        }
    }

    /// Destruye la conexión si no lo estaba ya
    pub fn destroy(&mut self) -> Supervision {
        if self.state == ConnectionState::Destroyed {
            return Supervision::Steady;
        }
        self.cancel_waits();
        self.state = ConnectionState::Destroyed;
        info!("💥 Destruyendo conexión de voz");
        self.transport.destroy();
        Supervision::Destroyed
    }

    fn cancel_waits(&mut self) {
        self.ready_wait.cancel();
        self.move_grace.cancel();
        self.rejoin.cancel();
    }
}
