use std::sync::Arc;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event as SongbirdEvent, EventContext, EventHandler as SongbirdEventHandler, Songbird,
    TrackEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::{ConnectDelays, ConnectError, PlaybackError, StateError},
    sources::Track,
};

/// Fin de stream reportado por el transporte. Se entrega como mensaje al
/// bombeo de eventos, nunca como llamada reentrante al controlador.
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    pub guild_id: GuildId,
    pub error: Option<String>,
}

pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;
pub type PlayerEventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

pub fn player_event_channel() -> (PlayerEventSender, PlayerEventReceiver) {
    mpsc::unbounded_channel()
}

/// Capacidad de transporte consumida por el controlador: una conexión viva
/// al canal de voz de una guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Inicia la reproducción de un track. El fin del stream se reporta por
    /// el canal de eventos de la conexión, exactamente una vez por stream.
    async fn play(&self, track: &Track, volume: f32) -> Result<(), PlaybackError>;
    async fn pause(&self) -> Result<(), StateError>;
    async fn resume(&self) -> Result<(), StateError>;
    async fn stop(&self);
    async fn set_volume(&self, volume: f32);
    async fn disconnect(&self, force: bool);
    async fn is_connected(&self) -> bool;
    async fn is_playing(&self) -> bool;
    async fn current_channel(&self) -> Option<u64>;
    async fn move_to(&self, channel: u64) -> Result<(), ConnectError>;
}

/// Conecta con reintentos acotados y backoff clasificado. Tras un intento
/// exitoso espera la estabilización del transporte y verifica la conexión;
/// una conexión inestable cuenta como intento fallido.
pub async fn connect_with_retry<F, Fut>(
    max_attempts: u32,
    delays: &ConnectDelays,
    mut connect: F,
) -> Result<Arc<dyn VoiceConnection>, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Arc<dyn VoiceConnection>, ConnectError>>,
{
    let mut last_err = ConnectError::Other("sin intentos realizados".to_string());

    for attempt in 1..=max_attempts {
        info!("🔌 Intento de conexión de voz {}/{}", attempt, max_attempts);

        match connect().await {
            Ok(conn) => {
                tokio::time::sleep(delays.stabilize).await;

                if conn.is_connected().await {
                    info!("✅ Conexión de voz establecida y estable");
                    return Ok(conn);
                }

                warn!("⚠️ Conexión inestable tras el handshake, descartando");
                conn.disconnect(true).await;
                last_err = ConnectError::Other("conexión inestable tras el handshake".to_string());
            }
            Err(e) => {
                warn!("❌ Intento de conexión falló: {}", e);
                last_err = e;
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(last_err.retry_backoff(delays)).await;
        }
    }

    Err(last_err)
}

/// Clasifica los errores de join de songbird dentro de la taxonomía propia.
/// Los fallos del driver corresponden a sesiones de voz muertas (familia 4006).
fn classify_join_error(err: JoinError) -> ConnectError {
    match err {
        JoinError::TimedOut => ConnectError::Timeout,
        JoinError::Driver(e) => {
            debug!("Driver de voz rechazó la sesión: {:?}", e);
            ConnectError::InvalidSession
        }
        other => ConnectError::Other(other.to_string()),
    }
}

/// Crea una conexión songbird para la guild y registra los event handlers
/// de fin y error de track.
pub async fn connect_songbird(
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    http: reqwest::Client,
    events: PlayerEventSender,
) -> Result<Arc<dyn VoiceConnection>, ConnectError> {
    let call = manager
        .join(guild_id, channel_id)
        .await
        .map_err(classify_join_error)?;

    {
        let mut handler = call.lock().await;
        handler.add_global_event(
            SongbirdEvent::Track(TrackEvent::End),
            TrackEndNotifier {
                guild_id,
                events: events.clone(),
            },
        );
        handler.add_global_event(
            SongbirdEvent::Track(TrackEvent::Error),
            TrackErrorNotifier { guild_id },
        );
    }

    info!("🔊 Conectado al canal de voz en guild {}", guild_id);

    Ok(Arc::new(SongbirdConnection {
        guild_id,
        manager,
        call,
        current: parking_lot::Mutex::new(None),
        http,
    }))
}

/// Implementación de producción sobre un `Call` de songbird.
pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    http: reqwest::Client,
}

impl SongbirdConnection {
    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, track: &Track, volume: f32) -> Result<(), PlaybackError> {
        let input = Input::from(HttpRequest::new(self.http.clone(), track.stream_url.clone()));

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        handle
            .set_volume(volume)
            .map_err(|e| PlaybackError::TransportRejected(e.to_string()))?;

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), StateError> {
        match self.current_handle() {
            Some(handle) => handle.pause().map_err(|_| StateError::NothingPlaying),
            None => Err(StateError::NothingPlaying),
        }
    }

    async fn resume(&self) -> Result<(), StateError> {
        match self.current_handle() {
            Some(handle) => handle.play().map_err(|_| StateError::NothingPaused),
            None => Err(StateError::NothingPaused),
        }
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
    }

    async fn set_volume(&self, volume: f32) {
        if let Some(handle) = self.current_handle() {
            let _ = handle.set_volume(volume);
        }
    }

    async fn disconnect(&self, force: bool) {
        self.stop().await;

        if force {
            if let Err(e) = self.manager.remove(self.guild_id).await {
                debug!("Error al remover conexión de voz: {:?}", e);
            }
        } else {
            let mut call = self.call.lock().await;
            if let Err(e) = call.leave().await {
                debug!("Error al salir del canal de voz: {:?}", e);
            }
        }

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }

    async fn is_connected(&self) -> bool {
        let call = self.call.lock().await;
        call.current_connection().is_some()
    }

    async fn is_playing(&self) -> bool {
        // Un stream pausado sigue activo: encolar durante una pausa no debe
        // pisar el track actual.
        let Some(handle) = self.current_handle() else {
            return false;
        };

        match handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn current_channel(&self) -> Option<u64> {
        let call = self.call.lock().await;
        call.current_channel().map(|c| c.0.get())
    }

    async fn move_to(&self, channel: u64) -> Result<(), ConnectError> {
        self.manager
            .join(self.guild_id, ChannelId::new(channel))
            .await
            .map_err(classify_join_error)?;

        info!(
            "📍 Movido al canal {} en guild {}",
            channel, self.guild_id
        );
        Ok(())
    }
}

/// Notifica el fin de un stream al bombeo de eventos del reproductor.
struct TrackEndNotifier {
    guild_id: GuildId,
    events: PlayerEventSender,
}

#[async_trait]
impl SongbirdEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<SongbirdEvent> {
        let error = if let EventContext::Track(track_list) = ctx {
            track_list.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            })
        } else {
            None
        };

        debug!("🎵 Track terminó en guild {}", self.guild_id);

        if self
            .events
            .send(PlayerEvent {
                guild_id: self.guild_id,
                error,
            })
            .is_err()
        {
            debug!("Bombeo de eventos cerrado, fin de track descartado");
        }

        None
    }
}

/// Solo registra los errores de track; el avance lo maneja el notifier de fin.
struct TrackErrorNotifier {
    guild_id: GuildId,
}

#[async_trait]
impl SongbirdEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<SongbirdEvent> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!(
                    "❌ Error en track para guild {}: {:?}",
                    self.guild_id, state.playing
                );
            }
        }

        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// Transporte falso para las pruebas del controlador y del supervisor:
    /// el fin de stream se dispara manualmente o al cortar el enlace.
    pub struct FakeConnection {
        guild_id: GuildId,
        events: PlayerEventSender,
        connected: AtomicBool,
        paused: AtomicBool,
        current: parking_lot::Mutex<Option<Track>>,
        volumes: parking_lot::Mutex<Vec<f32>>,
        played: parking_lot::Mutex<Vec<String>>,
        fail_next: parking_lot::Mutex<VecDeque<PlaybackError>>,
        channel: AtomicU64,
        disconnects: AtomicUsize,
    }

    impl FakeConnection {
        pub fn new(guild_id: GuildId, events: PlayerEventSender) -> Arc<Self> {
            Arc::new(Self {
                guild_id,
                events,
                connected: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                current: parking_lot::Mutex::new(None),
                volumes: parking_lot::Mutex::new(Vec::new()),
                played: parking_lot::Mutex::new(Vec::new()),
                fail_next: parking_lot::Mutex::new(VecDeque::new()),
                channel: AtomicU64::new(100),
                disconnects: AtomicUsize::new(0),
            })
        }

        /// Simula el fin natural del stream actual.
        pub fn finish_current(&self, error: Option<String>) {
            if self.current.lock().take().is_some() {
                let _ = self.events.send(PlayerEvent {
                    guild_id: self.guild_id,
                    error,
                });
            }
        }

        /// Simula la caída del enlace de voz: el driver termina el stream.
        pub fn sever_link(&self) {
            self.connected.store(false, Ordering::SeqCst);
            self.finish_current(None);
        }

        pub fn fail_next_play(&self, err: PlaybackError) {
            self.fail_next.lock().push_back(err);
        }

        pub fn current_title(&self) -> Option<String> {
            self.current.lock().as_ref().map(|t| t.title.clone())
        }

        pub fn played(&self) -> Vec<String> {
            self.played.lock().clone()
        }

        pub fn volumes(&self) -> Vec<f32> {
            self.volumes.lock().clone()
        }

        pub fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }

        pub fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        pub fn set_channel(&self, channel: u64) {
            self.channel.store(channel, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl VoiceConnection for FakeConnection {
        async fn play(&self, track: &Track, volume: f32) -> Result<(), PlaybackError> {
            if let Some(err) = self.fail_next.lock().pop_front() {
                return Err(err);
            }
            if !self.connected.load(Ordering::SeqCst) {
                return Err(PlaybackError::TransportRejected("sin conexión".to_string()));
            }

            *self.current.lock() = Some(track.clone());
            self.paused.store(false, Ordering::SeqCst);
            self.volumes.lock().push(volume);
            self.played.lock().push(track.title.clone());
            Ok(())
        }

        async fn pause(&self) -> Result<(), StateError> {
            if self.current.lock().is_none() {
                return Err(StateError::NothingPlaying);
            }
            self.paused.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn resume(&self) -> Result<(), StateError> {
            if self.current.lock().is_none() {
                return Err(StateError::NothingPaused);
            }
            self.paused.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.finish_current(None);
        }

        async fn set_volume(&self, volume: f32) {
            self.volumes.lock().push(volume);
        }

        async fn disconnect(&self, _force: bool) {
            self.connected.store(false, Ordering::SeqCst);
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn is_playing(&self) -> bool {
            self.current.lock().is_some()
        }

        async fn current_channel(&self) -> Option<u64> {
            if self.connected.load(Ordering::SeqCst) {
                Some(self.channel.load(Ordering::SeqCst))
            } else {
                None
            }
        }

        async fn move_to(&self, channel: u64) -> Result<(), ConnectError> {
            self.channel.store(channel, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeConnection;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn delays() -> ConnectDelays {
        ConnectDelays {
            invalid_session: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            other: Duration::from_secs(2),
            stabilize: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds_first_attempt() {
        let (tx, _rx) = player_event_channel();
        let guild = GuildId::new(1);

        let conn = connect_with_retry(3, &delays(), || {
            let tx = tx.clone();
            async move { Ok(FakeConnection::new(guild, tx) as Arc<dyn VoiceConnection>) }
        })
        .await
        .unwrap();

        assert!(conn.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_then_succeeds() {
        let (tx, _rx) = player_event_channel();
        let guild = GuildId::new(1);
        let attempts = AtomicU32::new(0);

        let conn = connect_with_retry(3, &delays(), || {
            let tx = tx.clone();
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ConnectError::InvalidSession)
                } else {
                    Ok(FakeConnection::new(guild, tx) as Arc<dyn VoiceConnection>)
                }
            }
        })
        .await;

        assert!(conn.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_exhaustion_surfaces_last_error() {
        let attempts = AtomicU32::new(0);

        let result = connect_with_retry(3, &delays(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ConnectError::Timeout) }
        })
        .await;

        assert_eq!(result.err(), Some(ConnectError::Timeout));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstable_connection_counts_as_failed_attempt() {
        let (tx, _rx) = player_event_channel();
        let guild = GuildId::new(1);
        let attempts = AtomicU32::new(0);

        let result = connect_with_retry(2, &delays(), || {
            let tx = tx.clone();
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                let conn = FakeConnection::new(guild, tx);
                // conexión que muere antes de estabilizarse
                conn.sever_link();
                Ok(conn as Arc<dyn VoiceConnection>)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
