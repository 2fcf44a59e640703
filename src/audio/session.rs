use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::GuildId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::audio::{connection::VoiceConnection, queue::TrackQueue};

/// Estado propio de una guild: conexión de voz (si la hay), cola pendiente
/// y el canal de texto donde anunciar los avances.
pub struct GuildSession {
    pub connection: Option<Arc<dyn VoiceConnection>>,
    pub queue: TrackQueue,
    pub text_channel: Option<u64>,
}

impl GuildSession {
    fn new(max_queue_size: usize) -> Self {
        Self {
            connection: None,
            queue: TrackQueue::new(max_queue_size),
            text_channel: None,
        }
    }

    /// Una sesión sin conexión y sin cola ya no aporta nada.
    pub fn is_idle(&self) -> bool {
        self.connection.is_none() && self.queue.is_empty()
    }
}

/// Registro guild → sesión. Única pieza de estado compartido del proceso;
/// cada sesión vive detrás de su propio mutex, de modo que las operaciones
/// mutantes de una guild se serializan sin contención entre guilds.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Mutex<GuildSession>>>,
    max_queue_size: usize,
}

impl SessionRegistry {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_size,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildSession::new(self.max_queue_size))))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildSession>>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Descarta la entrada si quedó inactiva. Si otra tarea tiene la sesión
    /// tomada en este instante, se deja para un barrido posterior.
    pub fn drop_if_idle(&self, guild_id: GuildId) {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, session| {
                session
                    .try_lock()
                    .map(|s| s.is_idle())
                    .unwrap_or(false)
            })
            .is_some();

        if removed {
            debug!("🧹 Sesión inactiva descartada para guild {}", guild_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::connection::{player_event_channel, testing::FakeConnection};

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let registry = SessionRegistry::new(10);
        let guild = GuildId::new(1);

        let a = registry.get_or_create(guild);
        let b = registry.get_or_create(guild);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_if_idle_removes_only_idle_sessions() {
        let registry = SessionRegistry::new(10);
        let guild = GuildId::new(1);
        let (tx, _rx) = player_event_channel();

        let session = registry.get_or_create(guild);
        registry.drop_if_idle(guild);
        assert!(registry.get(guild).is_none());

        let session2 = registry.get_or_create(guild);
        session2.lock().await.connection = Some(FakeConnection::new(guild, tx));
        registry.drop_if_idle(guild);
        assert!(registry.get(guild).is_some());

        drop(session);
    }

    #[tokio::test]
    async fn test_drop_if_idle_skips_locked_session() {
        let registry = SessionRegistry::new(10);
        let guild = GuildId::new(1);

        let session = registry.get_or_create(guild);
        let guard = session.lock().await;
        registry.drop_if_idle(guild);
        assert!(registry.get(guild).is_some());
        drop(guard);
    }
}
