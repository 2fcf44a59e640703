//! # Bot Module
//!
//! Discord-facing layer for Pulse Music.
//!
//! This module owns the thin glue between Discord events and the playback
//! core:
//! - Prefix-command parsing (`?play`, `?skip`, ...) delegating to
//!   [`commands`]
//! - Voice-state reactions feeding the [`HealthSupervisor`]
//!   (involuntary disconnects, alone-in-channel timers)
//! - The announce sink used by the controller for event-driven
//!   "now playing" messages
//!
//! All per-guild playback state lives behind the session registry; this
//! layer never mutates it outside the controller/supervisor entry points.

use std::sync::{Arc, OnceLock};

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
    http::Http,
};
use tracing::{debug, error, info};

pub mod commands;

use crate::{
    audio::controller::{Announcer, PlaybackController},
    config::Config,
    health::HealthSupervisor,
    sources::TrackResolver,
};

/// Handler principal de eventos de Discord.
pub struct PulseBot {
    pub config: Arc<Config>,
    pub controller: Arc<PlaybackController>,
    pub health: Arc<HealthSupervisor>,
    pub resolver: Arc<dyn TrackResolver>,
    pub announcer: Arc<ChannelAnnouncer>,
    pub http_client: reqwest::Client,
}

impl Clone for PulseBot {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            controller: self.controller.clone(),
            health: self.health.clone(),
            resolver: self.resolver.clone(),
            announcer: self.announcer.clone(),
            http_client: self.http_client.clone(),
        }
    }
}

#[async_trait]
impl EventHandler for PulseBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.announcer.bind(ctx.http.clone());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if !msg.content.starts_with(&self.config.command_prefix) {
            return;
        }

        commands::dispatch(self, &ctx, &msg).await;
    }

    /// Reacciones a cambios de estado de voz: limpieza inmediata cuando el
    /// bot es desconectado, y temporizador de canal vacío cuando un usuario
    /// sale del canal del bot.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            if old.is_some() && new.channel_id.is_none() {
                if let Some(guild_id) = new.guild_id {
                    self.health.handle_bot_dropped(guild_id).await;
                }
            }
            return;
        }

        // Un usuario salió (o se movió) de un canal; solo interesa si era
        // el canal donde está el bot y quedó sin oyentes.
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(left_channel) = old.and_then(|o| o.channel_id) else {
            return;
        };
        if new.channel_id == Some(left_channel) {
            return;
        }

        let Some(session) = self.controller.registry().get(guild_id) else {
            return;
        };
        let conn = { session.lock().await.connection.clone() };
        let Some(conn) = conn else {
            return;
        };
        let Some(bot_channel) = conn.current_channel().await else {
            return;
        };
        if bot_channel != left_channel.get() {
            return;
        }

        let probe = channel_without_listeners(ctx.clone(), guild_id);
        if !probe(bot_channel) {
            return;
        }

        // La condición se re-verifica al disparar; aquí solo se programa.
        self.health.schedule_alone_check(guild_id, probe);
    }
}

/// Sonda de ocupación: `true` cuando el canal no tiene miembros humanos.
/// Se evalúa tanto al programar como al disparar el temporizador.
fn channel_without_listeners(
    ctx: Context,
    guild_id: GuildId,
) -> impl Fn(u64) -> bool + Send + Sync + 'static {
    move |channel: u64| {
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return false;
        };
        let Some(chan) = guild.channels.get(&ChannelId::new(channel)) else {
            return false;
        };
        match chan.members(&ctx.cache) {
            Ok(members) => members.iter().all(|m| m.user.bot),
            Err(_) => false,
        }
    }
}

/// Sumidero de anuncios: envía los mensajes dirigidos por eventos al canal
/// de texto recordado por cada sesión. El cliente HTTP se vincula en `ready`.
pub struct ChannelAnnouncer {
    http: OnceLock<Arc<Http>>,
}

impl ChannelAnnouncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            http: OnceLock::new(),
        })
    }

    pub fn bind(&self, http: Arc<Http>) {
        let _ = self.http.set(http);
    }
}

impl Announcer for ChannelAnnouncer {
    fn announce(&self, channel_id: u64, message: String) {
        let Some(http) = self.http.get().cloned() else {
            debug!("Anuncio descartado: HTTP aún no vinculado");
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = ChannelId::new(channel_id).say(&http, message).await {
                error!("Error al enviar anuncio: {:?}", e);
            }
        });
    }
}
