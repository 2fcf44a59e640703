use anyhow::Result;
use serenity::{all::GatewayError, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod health;
mod sources;

use crate::audio::connection::player_event_channel;
use crate::audio::controller::{spawn_event_pump, PlaybackController};
use crate::audio::session::SessionRegistry;
use crate::bot::{ChannelAnnouncer, PulseBot};
use crate::config::Config;
use crate::health::HealthSupervisor;
use crate::sources::{TrackResolver, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulse_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Pulse Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // El resolver necesita yt-dlp en el PATH; sin él el bot arranca igual
    // pero todo ?play va a fallar con un mensaje al usuario
    if let Err(e) = YtDlpResolver::verify_available().await {
        warn!("⚠️ {}", e);
    }

    // Estado compartido del proceso: registro de sesiones y bombeo de eventos
    let registry = Arc::new(SessionRegistry::new(config.max_queue_size));
    let announcer = ChannelAnnouncer::new();
    let (events_tx, events_rx) = player_event_channel();
    let controller = Arc::new(PlaybackController::new(
        registry.clone(),
        config.clone(),
        announcer.clone(),
        events_tx,
    ));
    let health = HealthSupervisor::new(registry.clone(), config.clone());
    let resolver: Arc<dyn TrackResolver> = Arc::new(YtDlpResolver::new());

    spawn_event_pump(controller.clone(), events_rx);

    // Barrido de salud para toda la vida del proceso
    let shutdown = CancellationToken::new();
    health.spawn_sweep(shutdown.clone());

    // Manejar shutdown graceful
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Error al registrar Ctrl+C");
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            shutdown.cancel();
            std::process::exit(0);
        });
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = PulseBot {
        config: config.clone(),
        controller,
        health,
        resolver,
        announcer: announcer.clone(),
        http_client: reqwest::Client::new(),
    };

    run_gateway(config, handler, announcer, intents).await
}

/// Ciclo de ejecución del gateway con reintentos acotados: la autenticación
/// fallida es fatal; los errores transitorios reconstruyen el cliente y
/// reintentan con backoff.
async fn run_gateway(
    config: Arc<Config>,
    handler: PulseBot,
    announcer: Arc<ChannelAnnouncer>,
    intents: GatewayIntents,
) -> Result<()> {
    let mut attempt: u32 = 0;

    loop {
        let mut client = match Client::builder(&config.discord_token, intents)
            .event_handler(handler.clone())
            .register_songbird()
            .await
        {
            Ok(client) => client,
            Err(e) => {
                attempt += 1;
                error!(
                    "Error al construir cliente (intento {}/{}): {:?}",
                    attempt, config.gateway_max_retries, e
                );
                if attempt >= config.gateway_max_retries {
                    anyhow::bail!("no se pudo construir el cliente de Discord");
                }
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        announcer.bind(client.http.clone());

        match client.start().await {
            Ok(()) => {
                info!("Gateway terminado limpiamente");
                return Ok(());
            }
            Err(serenity::Error::Gateway(GatewayError::InvalidAuthentication)) => {
                error!("❌ Autenticación fallida: revisa el token de Discord");
                anyhow::bail!("autenticación con Discord fallida");
            }
            Err(e) => {
                attempt += 1;
                warn!(
                    "🔄 Conexión al gateway perdida (intento {}/{}): {:?}",
                    attempt, config.gateway_max_retries, e
                );
                if attempt >= config.gateway_max_retries {
                    anyhow::bail!("máximo de reintentos de gateway alcanzado");
                }

                // las fallas de sesión del gateway necesitan más espera
                let backoff = if matches!(&e, serenity::Error::Gateway(_)) {
                    Duration::from_secs(5)
                } else {
                    Duration::from_secs(3)
                };
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
