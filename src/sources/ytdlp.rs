use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{Track, TrackResolver};
use crate::error::ResolveError;

/// Resolver respaldado por yt-dlp: búsquedas libres vía `ytsearch1:` y
/// extracción de la URL de stream de mejor audio con salida JSON.
pub struct YtDlpResolver;

impl YtDlpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp esté disponible en el PATH.
    pub async fn verify_available() -> Result<()> {
        let check = async_process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await;

        match check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => {
                error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                anyhow::bail!("yt-dlp no disponible")
            }
        }
    }

    /// Detecta si la query es una URL o un término de búsqueda.
    pub fn is_url(query: &str) -> bool {
        url::Url::parse(query)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    async fn run_ytdlp(&self, target: &str) -> Result<Track, ResolveError> {
        let output = async_process::Command::new("yt-dlp")
            .args([
                "-J",
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--default-search",
                "ytsearch",
                "--socket-timeout",
                "30",
                "--retries",
                "3",
                "--quiet",
                "--no-warnings",
            ])
            .arg(target)
            .output()
            .await
            .map_err(|e| ResolveError::ExtractionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló para '{}': {}", target, stderr.trim());
            return Err(classify_stderr(&stderr));
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolveError::ExtractionFailed(e.to_string()))?;

        parse_ytdlp_json(&json)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
        let target = if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        debug!("🔍 Resolviendo: {}", target);
        let track = self.run_ytdlp(&target).await?;
        info!("✅ Resuelto '{}' → {}", query, track.title);
        Ok(track)
    }
}

/// Clasifica el stderr de yt-dlp dentro de la taxonomía de errores.
fn classify_stderr(stderr: &str) -> ResolveError {
    let lowered = stderr.to_lowercase();

    let restricted = [
        "sign in to confirm your age",
        "age-restricted",
        "private video",
        "this video is unavailable",
        "not available in your country",
        "members-only",
    ];
    if restricted.iter().any(|marker| lowered.contains(marker)) {
        return ResolveError::Restricted;
    }

    if lowered.contains("no video results") || lowered.contains("did not return any data") {
        return ResolveError::NoResults;
    }

    ResolveError::ExtractionFailed(stderr.trim().to_string())
}

/// Extrae título y URL de stream del JSON de `yt-dlp -J`.
/// Una búsqueda devuelve una playlist con `entries`; una URL directa, el
/// objeto del video. Con `-f` aplicado el stream elegido queda en `url`.
fn parse_ytdlp_json(json: &Value) -> Result<Track, ResolveError> {
    let video = match json.get("entries") {
        Some(Value::Array(entries)) => entries.first().ok_or(ResolveError::NoResults)?,
        _ => json,
    };

    let title = video
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Título desconocido")
        .to_string();

    let stream_url = match video.get("url").and_then(Value::as_str) {
        Some(direct) => direct.to_string(),
        None => best_audio_format(video).ok_or_else(|| {
            ResolveError::ExtractionFailed("sin formato de audio utilizable".to_string())
        })?,
    };

    Ok(Track { title, stream_url })
}

/// Fallback cuando el JSON no trae `url` al nivel superior: elige el formato
/// solo-audio con mayor bitrate.
fn best_audio_format(video: &Value) -> Option<String> {
    let formats = video.get("formats")?.as_array()?;

    formats
        .iter()
        .filter(|f| {
            f.get("acodec").and_then(Value::as_str).unwrap_or("none") != "none"
                && f.get("url").and_then(Value::as_str).is_some()
        })
        .max_by(|a, b| {
            let abr_a = a.get("abr").and_then(Value::as_f64).unwrap_or(0.0);
            let abr_b = b.get("abr").and_then(Value::as_f64).unwrap_or(0.0);
            abr_a.total_cmp(&abr_b)
        })
        .and_then(|f| f.get("url").and_then(Value::as_str))
        .map(str::to_string)
}
