//! Temporizadores cancelables de una sesión.
//!
//! Cada temporizador es una tarea de tokio que duerme y luego publica un
//! [`TimerFired`] en el canal de eventos de su dueño. El dueño guarda el
//! [`TimerHandle`] en un [`TimerSlot`] y solo acepta el disparo cuyo
//! [`TimerId`] coincide con el que tiene armado: un disparo que ya estaba en
//! el canal cuando se canceló el temporizador se descarta sin efecto.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Qué política armó el temporizador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    IdleDisposal,
    EmptyChannel,
    MoveGrace,
    ReadyDeadline,
    Rejoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

/// Arma temporizadores que publican en el canal `E` del dueño.
pub struct Scheduler<E> {
    tx: UnboundedSender<E>,
    next_id: Arc<AtomicU64>,
}

// Clone manual: derive exigiría `E: Clone`
impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<E> Scheduler<E>
where
    E: From<TimerFired> + Send + 'static,
{
    pub fn new(tx: UnboundedSender<E>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn arm(&self, after: Duration, kind: TimerKind) -> TimerHandle {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    // El dueño puede haber terminado; no es un error
                    let _ = tx.send(TimerFired { id, kind }.into());
                }
            }
        });

        debug!("⏲️ Temporizador {:?} armado ({:?})", kind, after);
        TimerHandle { id, kind, token }
    }
}

pub struct TimerHandle {
    id: TimerId,
    kind: TimerKind,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Cancelar un temporizador que ya disparó no tiene efecto.
    pub fn cancel(self) {
        self.token.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Hueco con a lo sumo un temporizador armado; su dueño es responsable de cancelarlo.
#[derive(Debug, Default)]
pub struct TimerSlot(Option<TimerHandle>);

impl TimerSlot {
    /// Reemplaza (y cancela) el temporizador anterior, si lo hay
    pub fn arm(&mut self, handle: TimerHandle) {
        self.cancel();
        self.0 = Some(handle);
    }

    pub fn cancel(&mut self) -> bool {
        match self.0.take() {
            Some(handle) => {
                debug!("⏲️ Temporizador {:?} cancelado", handle.kind());
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }

    /// Acepta un disparo solo si es el del temporizador armado; lo desarma.
    pub fn settle(&mut self, id: TimerId) -> bool {
        match &self.0 {
            Some(handle) if handle.id() == id => {
                self.0 = None;
                true
            }
            _ => false,
        }
    }
}
