use std::sync::Arc;

use futures::future::join_all;
use serenity::model::id::GuildId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{audio::session::SessionRegistry, config::Config};

/// Supervisor de salud de las conexiones de voz. Dos disparadores: el
/// barrido periódico y las reacciones a cambios de presencia. Repara el
/// estado de sesión respetando el mutex por guild, nunca por fuera de él.
pub struct HealthSupervisor {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl HealthSupervisor {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self { registry, config })
    }

    /// Lanza el barrido periódico para toda la vida del proceso.
    pub fn spawn_sweep(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        let mut interval = tokio::time::interval(supervisor.config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("🛑 Barrido de salud detenido");
                        break;
                    }
                    _ = interval.tick() => {
                        supervisor.sweep().await;
                    }
                }
            }
        })
    }

    /// Una pasada del barrido: toda conexión que reporta no-conectada es
    /// irrecuperable sin un reconnect explícito; se suelta la referencia y
    /// se limpia la cola.
    pub async fn sweep(&self) {
        let checks = self
            .registry
            .guild_ids()
            .into_iter()
            .map(|guild_id| self.sweep_guild(guild_id));

        join_all(checks).await;
    }

    async fn sweep_guild(&self, guild_id: GuildId) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return;
        };

        if !conn.is_connected().await {
            warn!(
                "🔌 Conexión de voz muerta detectada en guild {}, limpiando",
                guild_id
            );
            s.connection = None;
            s.queue.clear();
            drop(s);
            self.registry.drop_if_idle(guild_id);
        }
    }

    /// El bot fue desconectado involuntariamente del canal: se limpia la
    /// sesión de inmediato, sin pasar por el camino de encolado.
    pub async fn handle_bot_dropped(&self, guild_id: GuildId) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut s = session.lock().await;

        info!("🔌 Bot desconectado en guild {}", guild_id);
        s.connection = None;
        s.queue.clear();
        drop(s);
        self.registry.drop_if_idle(guild_id);
    }

    /// El bot quedó solo en el canal: programa una verificación diferida.
    /// La condición se re-verifica al dispararse, no al programarse; si
    /// alguien volvió a entrar, no pasa nada. Una sesión ya desarmada
    /// tampoco es un error.
    pub fn schedule_alone_check<P>(
        self: &Arc<Self>,
        guild_id: GuildId,
        still_alone: P,
    ) -> tokio::task::JoinHandle<()>
    where
        P: Fn(u64) -> bool + Send + Sync + 'static,
    {
        let supervisor = self.clone();
        let delay = self.config.alone_timeout();

        info!(
            "🚪 Bot solo en guild {}, desconexión programada en {}s",
            guild_id,
            delay.as_secs()
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            supervisor.alone_check_fire(guild_id, &still_alone).await;
        })
    }

    async fn alone_check_fire<P>(&self, guild_id: GuildId, still_alone: &P)
    where
        P: Fn(u64) -> bool + Send + Sync,
    {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let mut s = session.lock().await;

        let Some(conn) = s.connection.clone() else {
            return;
        };
        if !conn.is_connected().await {
            return;
        }
        let Some(channel) = conn.current_channel().await else {
            return;
        };

        if !still_alone(channel) {
            debug!(
                "👥 Alguien volvió al canal en guild {}, desconexión cancelada",
                guild_id
            );
            return;
        }

        info!(
            "🚪 Desconectando del canal vacío en guild {}",
            guild_id
        );
        conn.disconnect(false).await;
        s.connection = None;
        s.queue.clear();
        drop(s);
        self.registry.drop_if_idle(guild_id);
    }
}
