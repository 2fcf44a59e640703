use std::sync::Arc;

use serenity::model::id::{GuildId, UserId};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        connection::{PlayerEventReceiver, PlayerEventSender},
        queue::QueuedTrack,
        session::SessionRegistry,
    },
    config::Config,
    error::{PlaybackError, StateError},
    sources::Track,
};

/// Sumidero de respuestas para los anuncios dirigidos por eventos
/// (el "reproduciendo ahora" del avance automático).
pub trait Announcer: Send + Sync {
    fn announce(&self, channel_id: u64, message: String);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    NowPlaying { title: String },
    Queued { position: usize, title: String },
    QueueFull { limit: usize },
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    NothingPlaying,
}

/// Máquina de estados de reproducción por guild: encolar-o-reproducir,
/// avance por fin de stream, skip con atenuación, pausa/reanudar y stop.
/// Toda mutación de una guild pasa por el mutex de su sesión.
pub struct PlaybackController {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
    announcer: Arc<dyn Announcer>,
    events: PlayerEventSender,
}

impl PlaybackController {
    pub fn new(
        registry: Arc<SessionRegistry>,
        config: Arc<Config>,
        announcer: Arc<dyn Announcer>,
        events: PlayerEventSender,
    ) -> Self {
        Self {
            registry,
            config,
            announcer,
            events,
        }
    }

    /// Sender que deben usar las conexiones nuevas para reportar fin de stream.
    pub fn event_sender(&self) -> PlayerEventSender {
        self.events.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Si hay algo sonando, encola y reporta la posición 1-based; si no,
    /// arranca la reproducción de inmediato. El chequeo y la acción son
    /// atómicos por guild gracias al mutex de la sesión.
    pub async fn enqueue_or_play(
        &self,
        guild_id: GuildId,
        track: Track,
        requested_by: UserId,
    ) -> Result<EnqueueOutcome, PlaybackError> {
        let session = self.registry.get_or_create(guild_id);
        let mut s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return Ok(EnqueueOutcome::NotConnected);
        };
        if !conn.is_connected().await {
            return Ok(EnqueueOutcome::NotConnected);
        }

        let title = track.title.clone();

        if conn.is_playing().await {
            match s.queue.push(QueuedTrack::new(track, requested_by)) {
                Some(position) => Ok(EnqueueOutcome::Queued { position, title }),
                None => Ok(EnqueueOutcome::QueueFull {
                    limit: s.queue.max_size(),
                }),
            }
        } else {
            conn.play(&track, self.config.default_volume).await?;
            info!("🎶 Reproduciendo: {} en guild {}", title, guild_id);
            Ok(EnqueueOutcome::NowPlaying { title })
        }
    }

    /// Avance por fin de stream. Llega exactamente una vez por stream
    /// terminado, vía el bombeo de eventos. Reintenta contra las siguientes
    /// entradas si el arranque falla, acotado por el largo de la cola.
    pub async fn on_track_finished(&self, guild_id: GuildId, error: Option<String>) {
        if let Some(err) = &error {
            warn!("⚠️ Stream terminó con error en guild {}: {}", guild_id, err);
        }

        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            s.queue.clear();
            drop(s);
            self.registry.drop_if_idle(guild_id);
            return;
        };

        let mut remaining = s.queue.len();
        while remaining > 0 {
            remaining -= 1;

            if !conn.is_connected().await {
                warn!(
                    "🔌 Conexión de voz perdida en guild {}, no se puede avanzar",
                    guild_id
                );
                s.connection = None;
                s.queue.clear();
                drop(s);
                self.registry.drop_if_idle(guild_id);
                return;
            }

            let Some(next) = s.queue.pop_front() else {
                break;
            };

            match conn.play(&next.track, self.config.default_volume).await {
                Ok(()) => {
                    info!("🎶 Reproduciendo: {} en guild {}", next.title(), guild_id);
                    self.announce(
                        s.text_channel,
                        format!("🎶 Reproduciendo ahora: **{}**", next.title()),
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        "❌ Error al iniciar '{}', probando la siguiente: {}",
                        next.title(),
                        e
                    );
                }
            }
        }

        debug!("📭 Cola vacía en guild {}, queda inactiva", guild_id);
    }

    /// Atenúa el volumen por pasos y recién entonces detiene el stream.
    /// El stop dispara el camino normal de fin de stream; el skip nunca
    /// avanza la cola por su cuenta.
    pub async fn skip(&self, guild_id: GuildId) -> SkipOutcome {
        let Some(session) = self.registry.get(guild_id) else {
            return SkipOutcome::NothingPlaying;
        };
        let s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return SkipOutcome::NothingPlaying;
        };
        if !conn.is_connected().await || !conn.is_playing().await {
            return SkipOutcome::NothingPlaying;
        }

        for &step in &self.config.fade_steps {
            if !conn.is_connected().await || !conn.is_playing().await {
                debug!("Atenuación abortada en guild {}", guild_id);
                break;
            }
            conn.set_volume(step).await;
            tokio::time::sleep(self.config.fade_step_delay()).await;
        }

        if conn.is_connected().await {
            conn.stop().await;
        }

        info!("⏭️ Track saltado en guild {}", guild_id);
        SkipOutcome::Skipped
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), StateError> {
        let Some(session) = self.registry.get(guild_id) else {
            return Err(StateError::NotConnected);
        };
        let s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return Err(StateError::NotConnected);
        };
        if !conn.is_connected().await {
            return Err(StateError::NotConnected);
        }

        conn.pause().await?;
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), StateError> {
        let Some(session) = self.registry.get(guild_id) else {
            return Err(StateError::NotConnected);
        };
        let s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return Err(StateError::NotConnected);
        };
        if !conn.is_connected().await {
            return Err(StateError::NotConnected);
        }

        conn.resume().await?;
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Limpia la cola, detiene y desconecta. Idempotente: una segunda
    /// llamada no encuentra nada que hacer.
    pub async fn stop(&self, guild_id: GuildId) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut s = session.lock().await;

        s.queue.clear();
        if let Some(conn) = s.connection.take() {
            conn.stop().await;
            conn.disconnect(false).await;
        }
        drop(s);

        self.registry.drop_if_idle(guild_id);
        info!("⏹️ Reproducción detenida y cola limpiada en guild {}", guild_id);
    }

    /// Títulos de la cola en orden. `None` cuando no existe sesión para la
    /// guild, a diferencia de una sesión con cola vacía.
    pub async fn queue_titles(&self, guild_id: GuildId) -> Option<Vec<String>> {
        let session = self.registry.get(guild_id)?;
        let s = session.lock().await;
        Some(s.queue.titles())
    }

    fn announce(&self, channel: Option<u64>, message: String) {
        if let Some(channel) = channel {
            self.announcer.announce(channel, message);
        }
    }
}

/// Bombea los fines de stream del transporte hacia el controlador. Cada
/// evento se despacha en su propia tarea; la exclusividad la da el mutex
/// por guild.
pub fn spawn_event_pump(
    controller: Arc<PlaybackController>,
    mut events: PlayerEventReceiver,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .on_track_finished(event.guild_id, event.error)
                    .await;
            });
        }
        debug!("Bombeo de eventos del reproductor terminado");
    })
}
