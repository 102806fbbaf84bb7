use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use super::{ResolvedPlaylist, ResolvedTrack, TrackResolver};

/// Filtro de resultados de YouTube "solo playlists"
const PLAYLIST_FILTER: &str = "EgIQAw%3D%3D";

/// Resolución de búsquedas con yt-dlp
#[derive(Debug, Clone, Default)]
pub struct YtDlpResolver;

/// Entrada plana de yt-dlp (`--flat-playlist`)
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn verify_dependencies(&self) -> Result<()> {
        match Command::new("yt-dlp").arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => {
                error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                anyhow::bail!("yt-dlp no disponible");
            }
        }

        match Command::new("ffmpeg").arg("-version").output().await {
            Ok(output) if output.status.success() => info!("✅ ffmpeg disponible"),
            _ => {
                error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
                anyhow::bail!("ffmpeg no disponible");
            }
        }

        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn search_track(&self, query: &str) -> Result<Option<ResolvedTrack>> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search = format!("ytsearch1:{query}");
        let stdout = self
            .run(&["--dump-json", "--flat-playlist", "--skip-download", "--no-warnings", &search])
            .await?;
        Ok(parse_search(&stdout))
    }

    async fn search_playlist(&self, query: &str, limit: usize) -> Result<Option<ResolvedPlaylist>> {
        info!("📋 Buscando playlist: {}", query);
        let results = format!(
            "https://www.youtube.com/results?search_query={}&sp={}",
            urlencoding::encode(query),
            PLAYLIST_FILTER
        );
        let stdout = self
            .run(&["-J", "--flat-playlist", "--playlist-end", "1", "--no-warnings", &results])
            .await?;

        let Some(playlist_url) = first_playlist_url(&stdout)? else {
            return Ok(None);
        };

        let limit = limit.to_string();
        let stdout = self
            .run(&["-J", "--flat-playlist", "--playlist-end", &limit, "--no-warnings", &playlist_url])
            .await?;
        parse_playlist(&stdout)
    }
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

fn to_track(entry: FlatEntry) -> Option<ResolvedTrack> {
    let id = entry.id?;
    Some(ResolvedTrack {
        title: entry.title.unwrap_or_else(|| id.clone()),
        url: watch_url(&id),
    })
}

/// Primer video de la salida de `ytsearch1:` (una línea JSON por resultado)
fn parse_search(stdout: &str) -> Option<ResolvedTrack> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .find_map(to_track)
}

fn first_playlist_url(stdout: &str) -> Result<Option<String>> {
    let results: FlatPlaylist = serde_json::from_str(stdout).context("Respuesta de yt-dlp inválida")?;
    Ok(results
        .entries
        .into_iter()
        .filter(|entry| entry.kind.as_deref() != Some("video"))
        .find_map(|entry| entry.url.filter(|url| url.contains("list="))))
}

fn parse_playlist(stdout: &str) -> Result<Option<ResolvedPlaylist>> {
    let playlist: FlatPlaylist = serde_json::from_str(stdout).context("Respuesta de yt-dlp inválida")?;
    let tracks: Vec<ResolvedTrack> = playlist.entries.into_iter().filter_map(to_track).collect();
    if tracks.is_empty() {
        return Ok(None);
    }

    Ok(Some(ResolvedPlaylist {
        title: playlist.title.unwrap_or_else(|| "Playlist".to_string()),
        tracks,
    }))
}
