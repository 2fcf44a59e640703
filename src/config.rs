use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConnectDelays;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Conexión de voz
    pub connect_max_attempts: u32,
    pub connect_stabilize_secs: u64,
    pub reconnect_settle_secs: u64,
    pub invalid_session_backoff_secs: u64,
    pub timeout_backoff_secs: u64,
    pub connect_retry_backoff_secs: u64,

    // Supervisión de salud
    pub health_sweep_secs: u64,
    pub alone_timeout_secs: u64,

    // Gateway
    pub gateway_max_retries: u32,

    // Skip con atenuación (tunable, no afecta la corrección)
    pub fade_steps: Vec<f32>,
    pub fade_step_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "?".to_string()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,

            // Conexión de voz
            connect_max_attempts: std::env::var("CONNECT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            connect_stabilize_secs: std::env::var("CONNECT_STABILIZE_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            reconnect_settle_secs: std::env::var("RECONNECT_SETTLE_SECS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            invalid_session_backoff_secs: std::env::var("INVALID_SESSION_BACKOFF_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            timeout_backoff_secs: std::env::var("TIMEOUT_BACKOFF_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            connect_retry_backoff_secs: std::env::var("CONNECT_RETRY_BACKOFF_SECS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,

            // Supervisión de salud
            health_sweep_secs: std::env::var("HEALTH_SWEEP_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            alone_timeout_secs: std::env::var("ALONE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutos
                .parse()?,

            // Gateway
            gateway_max_retries: std::env::var("GATEWAY_MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            // Atenuación
            fade_steps: parse_fade_steps(
                &std::env::var("FADE_STEPS")
                    .unwrap_or_else(|_| "0.4,0.3,0.2,0.15,0.1,0.05".to_string()),
            )?,
            fade_step_ms: std::env::var("FADE_STEP_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración antes de arrancar el bot.
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.connect_max_attempts == 0 {
            anyhow::bail!("Connect max attempts must be greater than 0");
        }

        if self.gateway_max_retries == 0 {
            anyhow::bail!("Gateway max retries must be greater than 0");
        }

        if self.health_sweep_secs == 0 {
            anyhow::bail!("Health sweep interval must be greater than 0");
        }

        if self.fade_steps.iter().any(|v| *v < 0.0 || *v > 1.0) {
            anyhow::bail!("Fade steps must be volumes between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Resumen apto para logs: sin token ni secretos.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, queue cap {}\n  \
            Voice: {} connect attempts, {}s stabilize, {}s settle\n  \
            Health: sweep {}s, alone timeout {}s\n  \
            Gateway: {} retries\n  \
            Fade: {} steps x {}ms",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.connect_max_attempts,
            self.connect_stabilize_secs,
            self.reconnect_settle_secs,
            self.health_sweep_secs,
            self.alone_timeout_secs,
            self.gateway_max_retries,
            self.fade_steps.len(),
            self.fade_step_ms,
        )
    }

    pub fn connect_delays(&self) -> ConnectDelays {
        ConnectDelays {
            invalid_session: Duration::from_secs(self.invalid_session_backoff_secs),
            timeout: Duration::from_secs(self.timeout_backoff_secs),
            other: Duration::from_secs(self.connect_retry_backoff_secs),
            stabilize: Duration::from_secs(self.connect_stabilize_secs),
        }
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_secs(self.reconnect_settle_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.health_sweep_secs)
    }

    pub fn alone_timeout(&self) -> Duration {
        Duration::from_secs(self.alone_timeout_secs)
    }

    pub fn fade_step_delay(&self) -> Duration {
        Duration::from_millis(self.fade_step_ms)
    }
}

fn parse_fade_steps(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| anyhow::anyhow!("Invalid fade step '{}': {}", part, e))
        })
        .collect()
}

/// Valores por defecto: solo el token es obligatorio vía entorno.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "?".to_string(),
            default_volume: 0.5,
            max_queue_size: 500,
            connect_max_attempts: 3,
            connect_stabilize_secs: 3,
            reconnect_settle_secs: 2,
            invalid_session_backoff_secs: 5,
            timeout_backoff_secs: 3,
            connect_retry_backoff_secs: 2,
            health_sweep_secs: 30,
            alone_timeout_secs: 300,
            gateway_max_retries: 5,
            fade_steps: vec![0.4, 0.3, 0.2, 0.15, 0.1, 0.05],
            fade_step_ms: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_fade_steps() {
        let steps = parse_fade_steps("0.4, 0.3,0.2").unwrap();
        assert_eq!(steps, vec![0.4, 0.3, 0.2]);
        assert!(parse_fade_steps("0.4,x").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.default_volume = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fade_steps = vec![1.5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_has_no_token() {
        let mut config = Config::default();
        config.discord_token = "super-secret-token".to_string();
        assert!(!config.summary().contains("super-secret-token"));
    }
}
