pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use songbird::input::{Compose, Input, YoutubeDl};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::{error::TrackError, track::ResourceFactory};

pub use ytdlp::YtDlpResolver;

/// Resultado de búsqueda convertible en track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlaylist {
    pub title: String,
    pub tracks: Vec<ResolvedTrack>,
}

/// Búsqueda de música por texto libre.
///
/// `Ok(None)` significa "no encontrado"; `Err` es una falla de la herramienta.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Mejor video para la búsqueda
    async fn search_track(&self, query: &str) -> Result<Option<ResolvedTrack>>;

    /// Primera playlist para la búsqueda, con a lo sumo `limit` tracks
    async fn search_playlist(&self, query: &str, limit: usize) -> Result<Option<ResolvedPlaylist>>;
}

/// Fábrica del recurso de audio de una URL de YouTube.
///
/// Cada invocación crea un `Input` nuevo y valida que yt-dlp pueda leerlo
/// antes de entregarlo al reproductor.
pub fn youtube_input(client: reqwest::Client, url: String) -> ResourceFactory<Input> {
    Arc::new(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let mut source = YoutubeDl::new(client, url.clone());
            if let Err(e) = source.aux_metadata().await {
                warn!("❌ yt-dlp no pudo leer {}: {}", url, e);
                return Err(TrackError::ResourceCreation(e.to_string()));
            }
            debug!("✅ Input creado para {}", url);
            Ok(Input::from(source))
        }
        .boxed()
    })
}
