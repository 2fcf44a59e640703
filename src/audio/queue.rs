use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::sources::Track;

#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub track: Track,
    pub requested_by: UserId,
    #[allow(dead_code)]
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(track: Track, requested_by: UserId) -> Self {
        Self {
            track,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.track.title
    }
}

/// Cola FIFO estricta por guild: orden de inserción = orden de reproducción.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<QueuedTrack>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición 1-based,
    /// o `None` si la cola alcanzó su límite.
    pub fn push(&mut self, item: QueuedTrack) -> Option<usize> {
        if self.items.len() >= self.max_size {
            debug!("📛 Cola llena ({} canciones)", self.max_size);
            return None;
        }

        info!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);
        Some(self.items.len())
    }

    /// Saca el siguiente track en orden FIFO.
    pub fn pop_front(&mut self) -> Option<QueuedTrack> {
        let next = self.items.pop_front();
        if let Some(ref item) = next {
            info!("➡️ Siguiente en cola (FIFO): {}", item.title());
        }
        next
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Cola limpiada ({} canciones)", self.items.len());
        }
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Títulos en orden de reproducción.
    pub fn titles(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item.title().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn queued(title: &str) -> QueuedTrack {
        QueuedTrack::new(
            Track::new(title, format!("https://cdn.example/{title}")),
            UserId::new(1),
        )
    }

    #[test]
    fn test_push_reports_one_based_positions() {
        let mut queue = TrackQueue::new(10);
        assert_eq!(queue.push(queued("a")), Some(1));
        assert_eq!(queue.push(queued("b")), Some(2));
        assert_eq!(queue.push(queued("c")), Some(3));
    }

    #[test]
    fn test_pop_is_strict_fifo() {
        let mut queue = TrackQueue::new(10);
        queue.push(queued("a"));
        queue.push(queued("b"));
        queue.push(queued("c"));

        assert_eq!(queue.pop_front().unwrap().title(), "a");
        assert_eq!(queue.pop_front().unwrap().title(), "b");
        assert_eq!(queue.pop_front().unwrap().title(), "c");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_push_rejects_when_full() {
        let mut queue = TrackQueue::new(2);
        assert_eq!(queue.push(queued("a")), Some(1));
        assert_eq!(queue.push(queued("b")), Some(2));
        assert_eq!(queue.push(queued("c")), None);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear_and_titles() {
        let mut queue = TrackQueue::new(10);
        queue.push(queued("a"));
        queue.push(queued("b"));
        assert_eq!(queue.titles(), vec!["a".to_string(), "b".to_string()]);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.titles().is_empty());
    }
}
