use futures::future::BoxFuture;
use std::{fmt, sync::Arc};
use tracing::debug;

use super::error::TrackError;

/// Datos visibles de un track (título y URL de origen)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub url: String,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

pub type ResourceFuture<R> = BoxFuture<'static, Result<R, TrackError>>;

/// Produce el recurso de audio de forma diferida; se invoca una vez por reproducción.
pub type ResourceFactory<R> = Arc<dyn Fn() -> ResourceFuture<R> + Send + Sync>;

/// Ganchos del ciclo de vida de un track.
///
/// Cada gancho se invoca como mucho una vez por instancia de [`Track`].
pub trait TrackEvents: Send + Sync {
    fn on_start(&self, _track: &TrackInfo) {}
    fn on_finish(&self, _track: &TrackInfo) {}
    fn on_error(&self, _track: &TrackInfo, _error: &TrackError) {}
}

/// Sin ganchos
impl TrackEvents for () {}

/// Un elemento reproducible: metadatos, fábrica de recurso y ganchos.
pub struct Track<R> {
    info: TrackInfo,
    factory: ResourceFactory<R>,
    events: Arc<dyn TrackEvents>,
    started: bool,
    finished: bool,
    errored: bool,
}

impl<R> Track<R> {
    pub fn new(info: TrackInfo, factory: ResourceFactory<R>, events: Arc<dyn TrackEvents>) -> Self {
        Self {
            info,
            factory,
            events,
            started: false,
            finished: false,
            errored: false,
        }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn factory(&self) -> ResourceFactory<R> {
        self.factory.clone()
    }

    /// Nueva instancia del mismo track (para `repeat`), con sus ganchos sin disparar
    pub fn replay(&self) -> Self {
        Self::new(self.info.clone(), self.factory.clone(), self.events.clone())
    }

    pub fn notify_start(&mut self) {
        if !self.started {
            self.started = true;
            debug!("▶️ on_start: {}", self.info.title);
            self.events.on_start(&self.info);
        }
    }

    pub fn notify_finish(&mut self) {
        if !self.finished {
            self.finished = true;
            debug!("⏹️ on_finish: {}", self.info.title);
            self.events.on_finish(&self.info);
        }
    }

    pub fn notify_error(&mut self, error: &TrackError) {
        if !self.errored {
            self.errored = true;
            debug!("❌ on_error: {} ({})", self.info.title, error);
            self.events.on_error(&self.info, error);
        }
    }
}

impl<R> fmt::Debug for Track<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("title", &self.info.title)
            .field("url", &self.info.url)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("errored", &self.errored)
            .finish()
    }
}
