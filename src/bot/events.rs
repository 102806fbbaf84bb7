use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::{context_data::DisconnectReason as DriverDisconnectReason, CoreEvent},
    input::Input,
    model::CloseCode,
    Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use tracing::{debug, info, warn};

use crate::audio::{
    connection::{ConnectionEvent, ConnectionState, DisconnectReason, CLOSE_CODE_DISCONNECTED},
    subscription::SessionSender,
};

/// Traduce los eventos del driver de songbird a cambios de conexión de la sesión
pub struct ConnectionForwarder {
    pub guild_id: GuildId,
    pub events: SessionSender<Input>,
}

#[async_trait]
impl VoiceEventHandler for ConnectionForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                info!("🔊 [{}] Driver de voz conectado", self.guild_id);
                self.events.connection(ConnectionEvent::new(ConnectionState::Ready));
            }
            EventContext::DriverDisconnect(data) => {
                let reason = disconnect_reason(data.reason.as_ref());
                warn!(
                    "🔌 [{}] Driver de voz desconectado: {:?} ({:?})",
                    self.guild_id, data.reason, data.kind
                );
                self.events.connection(ConnectionEvent::disconnected(reason));
            }
            _ => debug!("[{}] Evento de voz ignorado", self.guild_id),
        }

        None
    }
}

fn disconnect_reason(reason: Option<&DriverDisconnectReason>) -> DisconnectReason {
    match reason {
        Some(DriverDisconnectReason::WsClosed(Some(CloseCode::Disconnected))) => {
            DisconnectReason::WebSocketClose(CLOSE_CODE_DISCONNECTED)
        }
        _ => DisconnectReason::Other,
    }
}

/// Registra los handlers de conexión de un servidor
pub fn register_voice_events(handler: &mut songbird::Call, guild_id: GuildId, events: SessionSender<Input>) {
    for event in [
        CoreEvent::DriverConnect,
        CoreEvent::DriverReconnect,
        CoreEvent::DriverDisconnect,
    ] {
        handler.add_global_event(
            VoiceEvent::Core(event),
            ConnectionForwarder {
                guild_id,
                events: events.clone(),
            },
        );
    }
}
