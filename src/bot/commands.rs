use serenity::all::{ChannelId, Context, GuildId, Message, UserId};
use tracing::{error, info, warn};

use crate::{
    audio::{
        connection::{connect_songbird, connect_with_retry},
        controller::{EnqueueOutcome, PlaybackController, SkipOutcome},
    },
    bot::PulseBot,
    error::{ConnectError, ResolveError, StateError},
    sources::TrackResolver,
};

/// Despacha un mensaje con prefijo de comando hacia el handler que toca.
pub async fn dispatch(bot: &PulseBot, ctx: &Context, msg: &Message) {
    let rest = match msg.content.strip_prefix(&bot.config.command_prefix) {
        Some(rest) => rest.trim(),
        None => return,
    };

    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    let Some(guild_id) = msg.guild_id else {
        reply(ctx, msg.channel_id, "Los comandos de música solo funcionan en servidores.").await;
        return;
    };

    info!(
        "📝 Comando {}{} usado por {} en guild {}",
        bot.config.command_prefix, command, msg.author.name, guild_id
    );

    match command.as_str() {
        "play" => handle_play(bot, ctx, msg, guild_id, args).await,
        "pause" => {
            let text = pause_reply(bot.controller.pause(guild_id).await);
            reply(ctx, msg.channel_id, text).await;
        }
        "resume" => {
            let text = resume_reply(bot.controller.resume(guild_id).await);
            reply(ctx, msg.channel_id, text).await;
        }
        "stop" => {
            bot.controller.stop(guild_id).await;
            reply(ctx, msg.channel_id, "⏹️ Reproducción detenida y cola limpiada").await;
        }
        "skip" => {
            let text = match bot.controller.skip(guild_id).await {
                SkipOutcome::Skipped => "⏭️ Canción saltada",
                SkipOutcome::NothingPlaying => "Nada se está reproduciendo",
            };
            reply(ctx, msg.channel_id, text).await;
        }
        "queue" => {
            let text = queue_reply(bot.controller.queue_titles(guild_id).await);
            reply(ctx, msg.channel_id, text).await;
        }
        _ => {}
    }
}

async fn handle_play(bot: &PulseBot, ctx: &Context, msg: &Message, guild_id: GuildId, query: &str) {
    if query.is_empty() {
        reply(ctx, msg.channel_id, "Por favor indica una canción o URL.").await;
        return;
    }

    let Some(user_channel) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        reply(
            ctx,
            msg.channel_id,
            "🔇 Debes estar en un canal de voz para reproducir música.",
        )
        .await;
        return;
    };

    if let Err(e) = ensure_connection(bot, ctx, guild_id, user_channel, msg.channel_id).await {
        warn!("❌ Conexión de voz fallida en guild {}: {}", guild_id, e);
        reply(
            ctx,
            msg.channel_id,
            "❌ No se pudo conectar al canal de voz. Puede deberse a:\n\
             • Problemas de red\n\
             • Problemas con los servidores de voz de Discord\n\
             • Permisos faltantes\n\n\
             Intenta de nuevo en unos momentos.",
        )
        .await;
        return;
    }

    // feedback inmediato; la resolución sigue en segundo plano
    let processing_text = if crate::sources::YtDlpResolver::is_url(query) {
        "⏳ Procesando URL...".to_string()
    } else {
        format!("⏳ Buscando y procesando: `{}`...", query)
    };
    let processing = msg.channel_id.say(&ctx.http, processing_text).await.ok();

    let resolver = bot.resolver.clone();
    let controller = bot.controller.clone();
    let http = ctx.http.clone();
    let reply_channel = msg.channel_id;
    let requested_by = msg.author.id;
    let query = query.to_string();

    tokio::spawn(async move {
        let text = resolve_and_enqueue(
            resolver.as_ref(),
            controller.as_ref(),
            guild_id,
            requested_by,
            &query,
        )
        .await;

        if let Some(processing) = processing {
            let _ = processing.delete(&http).await;
        }
        if let Err(e) = reply_channel.say(&http, text).await {
            error!("Error al responder comando play: {:?}", e);
        }
    });
}

/// Resuelve la query y la encola (o la reproduce). Devuelve el texto para
/// el usuario; los errores de resolución nunca escalan más allá de esto.
pub async fn resolve_and_enqueue(
    resolver: &dyn TrackResolver,
    controller: &PlaybackController,
    guild_id: GuildId,
    requested_by: UserId,
    query: &str,
) -> String {
    let track = match resolver.resolve(query).await {
        Ok(track) => track,
        Err(e) => return resolve_failure_text(&e),
    };

    match controller
        .enqueue_or_play(guild_id, track, requested_by)
        .await
    {
        Ok(EnqueueOutcome::NowPlaying { title }) => {
            format!("🎶 Reproduciendo ahora: **{title}**")
        }
        Ok(EnqueueOutcome::Queued { position, title }) => {
            format!("🎵 Agregado a la cola (#{position}): **{title}**")
        }
        Ok(EnqueueOutcome::QueueFull { limit }) => {
            format!("⚠️ La cola está llena (máximo {limit} canciones)")
        }
        Ok(EnqueueOutcome::NotConnected) => {
            "❌ La conexión de voz se perdió mientras se procesaba. Intenta el comando de nuevo."
                .to_string()
        }
        Err(_) => {
            "❌ Error al iniciar la reproducción. El formato de audio puede no estar soportado."
                .to_string()
        }
    }
}

/// Garantiza una conexión viva al canal del usuario: reutiliza la actual,
/// se mueve si el usuario está en otro canal, o reemplaza una conexión
/// rancia (desconexión forzada + pausa) antes de reconectar con reintentos.
async fn ensure_connection(
    bot: &PulseBot,
    ctx: &Context,
    guild_id: GuildId,
    user_channel: ChannelId,
    text_channel: ChannelId,
) -> Result<(), ConnectError> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| ConnectError::Other("songbird no inicializado".to_string()))?;

    let session = bot.controller.registry().get_or_create(guild_id);
    let mut s = session.lock().await;
    s.text_channel = Some(text_channel.get());

    if let Some(conn) = s.connection.clone() {
        if conn.is_connected().await {
            match conn.current_channel().await {
                Some(ch) if ch == user_channel.get() => return Ok(()),
                _ => {
                    info!("📍 Moviéndose al canal del usuario en guild {}", guild_id);
                    conn.move_to(user_channel.get()).await?;
                    return Ok(());
                }
            }
        }

        info!("🧹 Limpiando conexión rancia en guild {}", guild_id);
        if let Some(stale) = s.connection.take() {
            stale.disconnect(true).await;
        }
        tokio::time::sleep(bot.config.reconnect_settle()).await;
    }

    let delays = bot.config.connect_delays();
    let events = bot.controller.event_sender();
    let http = bot.http_client.clone();

    let conn = connect_with_retry(bot.config.connect_max_attempts, &delays, || {
        connect_songbird(
            manager.clone(),
            guild_id,
            user_channel,
            http.clone(),
            events.clone(),
        )
    })
    .await?;

    s.connection = Some(conn);
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
}

fn resolve_failure_text(err: &ResolveError) -> String {
    match err {
        ResolveError::NoResults => {
            "❌ No se encontraron resultados. Prueba con otro término de búsqueda.".to_string()
        }
        ResolveError::Restricted => {
            "❌ No se pudo extraer el contenido: es restringido o privado.".to_string()
        }
        ResolveError::ExtractionFailed(_) => {
            "❌ Se encontró el contenido pero no se pudo extraer el audio. Prueba con otra búsqueda."
                .to_string()
        }
    }
}

fn pause_reply(result: Result<(), StateError>) -> &'static str {
    match result {
        Ok(()) => "⏸️ Reproducción pausada",
        Err(StateError::NotConnected) => "No conectado a un canal de voz",
        Err(_) => "Nada se está reproduciendo",
    }
}

fn resume_reply(result: Result<(), StateError>) -> &'static str {
    match result {
        Ok(()) => "▶️ Reproducción reanudada",
        Err(StateError::NotConnected) => "No conectado a un canal de voz",
        Err(_) => "Nada está pausado",
    }
}

fn queue_reply(titles: Option<Vec<String>>) -> String {
    match titles {
        None => "📭 No hay una sesión de música activa en este servidor".to_string(),
        Some(titles) if titles.is_empty() => "📭 La cola está vacía".to_string(),
        Some(titles) => {
            let listing = titles
                .iter()
                .enumerate()
                .map(|(i, title)| format!("{}. {}", i + 1, title))
                .collect::<Vec<_>>()
                .join("\n");
            format!("**Cola actual:**\n{listing}")
        }
    }
}

async fn reply(ctx: &Context, channel_id: ChannelId, text: impl Into<String>) {
    if let Err(e) = channel_id.say(&ctx.http, text.into()).await {
        error!("Error al enviar respuesta: {:?}", e);
    }
}
