use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::subscription::SubscriptionHandle;

/// Identidad de una sesión concreta; un mismo servidor puede tener varias a lo largo del tiempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Mapa de sesiones activas por servidor.
///
/// Se comparte como `Arc<SessionRegistry<R>>` entre los manejadores de
/// comandos y las propias sesiones, que se retiran al cerrarse.
pub struct SessionRegistry<R> {
    sessions: DashMap<GuildId, SubscriptionHandle<R>>,
    next_session: AtomicU64,
}

impl<R> Default for SessionRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SessionRegistry<R> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SubscriptionHandle<R>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Registra la sesión; devuelve la que ocupaba su lugar, si había una
    pub fn insert(&self, handle: SubscriptionHandle<R>) -> Option<SubscriptionHandle<R>> {
        debug!("📋 [{}] Sesión {:?} registrada", handle.guild_id(), handle.session_id());
        self.sessions.insert(handle.guild_id(), handle)
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<SubscriptionHandle<R>> {
        self.sessions.remove(&guild_id).map(|(_, handle)| handle)
    }

    /// Retira la entrada solo si sigue perteneciendo a `session_id`
    pub fn remove_session(&self, guild_id: GuildId, session_id: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, handle| handle.session_id() == session_id)
            .is_some();
        if removed {
            debug!("📋 [{}] Sesión {:?} retirada", guild_id, session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::testing::{settle, Harness};

    #[tokio::test(start_paused = true)]
    async fn test_late_teardown_keeps_newer_session() {
        let old = Harness::spawn();
        let registry = old.registry.clone();

        // Una sesión nueva del mismo servidor reemplaza a la anterior en el mapa
        let newer = Harness::spawn_in(registry.clone());
        assert_eq!(registry.len(), 1);

        old.handle.leave().await.unwrap();
        settle().await;

        let current = registry.get(Harness::guild()).map(|h| h.session_id());
        assert_eq!(current, Some(newer.handle.session_id()));
        assert!(!newer.handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_removes_own_entry() {
        let harness = Harness::spawn();
        assert!(harness.registry.get(Harness::guild()).is_some());

        harness.handle.leave().await.unwrap();

        assert!(harness.registry.is_empty());
        assert!(!harness.registry.remove_session(Harness::guild(), harness.handle.session_id()));
    }
}
