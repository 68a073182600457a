use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    error::ResolveError,
    transport::{MediaResolver, ResolvedTrack},
    ui::captions::format_duration,
};

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    duration_string: Option<String>,
    thumbnail: Option<String>,
    webpage_url: String,
}

/// Resolver that shells out to `yt-dlp` for search, metadata and downloads.
pub struct YtDlpResolver {
    download_dir: PathBuf,
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(download_dir: PathBuf, concurrency: usize) -> Self {
        Self {
            download_dir,
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    pub fn is_url(query: &str) -> bool {
        query.starts_with("http://") || query.starts_with("https://")
    }

    /// Extrae el video ID de una URL de YouTube
    pub fn extract_video_id(url: &str) -> Option<String> {
        let regex = Regex::new(
            r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})",
        )
        .ok()?;

        regex
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    }

    fn thumbnail_for(video_id: &str) -> String {
        format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
    }

    /// Parses `--dump-json` output; the first line is the best match.
    fn parse_info(stdout: &str) -> Result<Option<ResolvedTrack>, ResolveError> {
        let Some(line) = stdout.lines().find(|line| !line.trim().is_empty()) else {
            return Ok(None);
        };
        let info: YtDlpInfo = serde_json::from_str(line)?;

        let duration_label = info
            .duration_string
            .or_else(|| {
                info.duration
                    .map(|secs| format_duration(Duration::from_secs_f64(secs.max(0.0))))
            })
            .unwrap_or_else(|| "??".to_string());

        let thumbnail = info
            .thumbnail
            .or_else(|| Self::extract_video_id(&info.webpage_url).map(|id| Self::thumbnail_for(&id)))
            .or_else(|| (!info.id.is_empty()).then(|| Self::thumbnail_for(&info.id)));

        Ok(Some(ResolvedTrack {
            title: info.title,
            url: info.webpage_url,
            duration_label,
            thumbnail,
        }))
    }

    /// Last non-empty stdout line, which `--print after_move:filepath` fills in.
    fn downloaded_path(stdout: &str) -> Option<PathBuf> {
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Process(e.to_string()))?;

        let output = Command::new("yt-dlp").args(args).output().await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp error: {}", error.trim());
            return Err(ResolveError::Process(error.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedTrack>, ResolveError> {
        info!("🔍 Buscando: {}", query);

        let target = if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &target,
            ])
            .await?;

        let track = Self::parse_info(&stdout)?;
        if let Some(track) = &track {
            debug!("📊 Resuelto: {} ({})", track.title, track.url);
        }
        Ok(track)
    }

    async fn download(&self, url: &str) -> Result<PathBuf, ResolveError> {
        let template = self.download_dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();

        info!("⬇️ Descargando: {}", url);
        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio[ext=m4a]/bestaudio/best",
                "--no-warnings",
                "--no-simulate",
                "--print",
                "after_move:filepath",
                "-o",
                &template,
                url,
            ])
            .await?;

        let path = Self::downloaded_path(&stdout)
            .ok_or_else(|| ResolveError::NoResults(url.to_string()))?;
        debug!("💾 Guardado en {}", path.display());
        Ok(path)
    }
}
