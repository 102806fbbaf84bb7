use rand::{rngs::OsRng, seq::SliceRandom};
use std::collections::VecDeque;
use tracing::{debug, info};

use super::track::{Track, TrackInfo};

/// Cola de tracks pendientes de una suscripción.
///
/// No se protege a sí misma: la exclusión entre mutaciones la garantiza la
/// suscripción dueña (bandera `queue_lock` dentro de su bucle de eventos).
#[derive(Debug)]
pub struct TrackQueue<R> {
    pending: VecDeque<Track<R>>,
}

impl<R> Default for TrackQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TrackQueue<R> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Agrega tracks al final (FIFO)
    pub fn enqueue(&mut self, tracks: Vec<Track<R>>) {
        let added = tracks.len();
        self.pending.extend(tracks);
        info!("➕ Agregadas {} canciones a la cola ({} pendientes)", added, self.pending.len());
    }

    /// Agrega tracks al frente conservando su orden relativo (ruta de `repeat`)
    pub fn enqueue_front(&mut self, tracks: Vec<Track<R>>) {
        let added = tracks.len();
        for track in tracks.into_iter().rev() {
            self.pending.push_front(track);
        }
        info!("⏫ Agregadas {} canciones al frente de la cola", added);
    }

    /// Obtiene el siguiente track (el más antiguo, salvo inserciones al frente)
    pub fn pop_front(&mut self) -> Option<Track<R>> {
        let next = self.pending.pop_front();
        if let Some(track) = &next {
            debug!("➡️ Siguiente en cola: {}", track.title());
        }
        next
    }

    /// Limpia la cola
    pub fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Mezcla la cola en sitio (Fisher–Yates sobre `OsRng`)
    pub fn shuffle(&mut self) {
        if self.pending.len() < 2 {
            return;
        }
        self.pending.make_contiguous().shuffle(&mut OsRng);
        info!("🔀 Cola mezclada ({} tracks)", self.pending.len());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn infos(&self) -> Vec<TrackInfo> {
        self.pending.iter().map(|track| track.info().clone()).collect()
    }
}

/// Una página de la vista de cola; las posiciones empiezan en 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub entries: Vec<(usize, TrackInfo)>,
    pub current_page: usize,
    pub total_pages: usize,
}

/// Divide los tracks pendientes en páginas de `items_per_page`.
pub fn paginate(items: &[TrackInfo], items_per_page: usize) -> Vec<QueuePage> {
    let per_page = items_per_page.max(1);
    let total_pages = items.len().div_ceil(per_page);

    items
        .chunks(per_page)
        .enumerate()
        .map(|(page, chunk)| QueuePage {
            entries: chunk
                .iter()
                .enumerate()
                .map(|(offset, info)| (page * per_page + offset + 1, info.clone()))
                .collect(),
            current_page: page + 1,
            total_pages,
        })
        .collect()
}
