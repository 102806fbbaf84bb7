use serenity::{http::Http, model::id::ChannelId};
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

use super::embeds::{self, Notice};
use crate::audio::announce::{Announcement, Announcer};

/// Publica los avisos de una sesión en su canal de texto.
///
/// Una sola tarea envía los mensajes, uno tras otro, en el orden en que
/// se anunciaron.
pub struct ChannelAnnouncer {
    channel: ChannelId,
    outbox: UnboundedSender<Notice>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        let outbox = spawn_delivery(move |notice| {
            let http = http.clone();
            async move {
                if let Err(e) = channel.send_message(&http, embeds::notice_message(notice)).await {
                    warn!("❌ No se pudo enviar aviso a {}: {:?}", channel, e);
                }
            }
        });

        Self { channel, outbox }
    }
}

impl Announcer for ChannelAnnouncer {
    fn announce(&self, announcement: Announcement) {
        if self.outbox.send(embeds::notice(&announcement)).is_err() {
            debug!("Aviso para {} descartado: la entrega terminó", self.channel);
        }
    }
}

/// Entrega los avisos de a uno; el siguiente espera a que termine el anterior
fn spawn_delivery<F, Fut>(mut deliver: F) -> UnboundedSender<Notice>
where
    F: FnMut(Notice) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            deliver(notice).await;
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_slow_delivery_keeps_order() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let outbox = spawn_delivery(move |notice| {
            let sink = sink.clone();
            async move {
                // El primer envío es el más lento
                let delay = if sink.lock().is_empty() { 500 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                sink.lock().push(notice);
            }
        });

        for title in ["Playing A", "Finished A", "Playing B"] {
            outbox.send(Notice::Text(title.to_string())).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            *delivered.lock(),
            vec![
                Notice::Text("Playing A".into()),
                Notice::Text("Finished A".into()),
                Notice::Text("Playing B".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_stops_when_outbox_dropped() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let outbox = spawn_delivery(move |notice| {
            let sink = sink.clone();
            async move { sink.lock().push(notice) }
        });

        outbox.send(Notice::Text("Queue finished".into())).unwrap();
        drop(outbox);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*delivered.lock(), vec![Notice::Text("Queue finished".into())]);
        // Sin emisores la tarea terminó y soltó su cierre
        assert_eq!(Arc::strong_count(&delivered), 1);
    }
}
