use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{error::ReaderError, mode::ReadingMode};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Continuous mode: grow the window within this many viewports of an edge.
    pub viewports: f32,
    /// Paged modes: grow the window within this many pages of an edge.
    pub pages: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self { viewports: 1.5, pages: 2 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub reading_mode: ReadingMode,
    pub preload: PreloadConfig,
    pub max_chapters: Option<usize>,
    pub theme_color: Option<String>,
}

impl ReaderConfig {
    /// `theme_color` as RGB, when it is a `#rrggbb` string.
    pub fn theme_rgb(&self) -> Option<(u8, u8, u8)> {
        let val = self.theme_color.as_deref()?.trim().trim_matches('"').trim_matches('\'');
        if !val.starts_with('#') || val.len() != 7 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(val.get(range)?, 16).ok();
        let (r, g, b) = (channel(1..3)?, channel(3..5)?, channel(5..7)?);
        Some((r, g, b))
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/rmanga/config.json"))
}

pub fn load_config_from(path: &Path) -> Result<ReaderConfig, ReaderError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Loads the user's config, falling back to defaults when it is missing or broken.
pub fn load_config() -> ReaderConfig {
    let Some(path) = config_path() else {
        return ReaderConfig::default();
    };
    match load_config_from(&path) {
        Ok(config) => config,
        Err(ReaderError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}, using defaults", path.display());
            ReaderConfig::default()
        }
        Err(err) => {
            warn!("ignoring config at {}: {err}", path.display());
            ReaderConfig::default()
        }
    }
}

/// Polls `path` and sends every parsed config that differs from the last one.
/// Returns once the receiving side is gone.
pub async fn watch_config(path: PathBuf, period: Duration, config_tx: mpsc::UnboundedSender<ReaderConfig>) {
    let mut last = load_config_from(&path).ok();
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        interval.tick().await;
        let Ok(config) = load_config_from(&path) else {
            continue;
        };
        if last.as_ref() == Some(&config) {
            continue;
        }
        debug!("config at {} changed", path.display());
        last = Some(config.clone());
        if config_tx.send(config).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rmanga-config-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("config.json")
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ReaderConfig = serde_json::from_str(r#"{"reading_mode": "paged-vertical"}"#).unwrap();
        assert_eq!(config.reading_mode, ReadingMode::PagedVertical);
        assert_eq!(config.preload, PreloadConfig::default());
        assert_eq!(config.max_chapters, None);
    }

    #[test]
    fn parses_full_config() {
        let config: ReaderConfig = serde_json::from_str(
            r##"{
                "reading_mode": "paged-right-to-left",
                "preload": { "viewports": 3.0, "pages": 4 },
                "max_chapters": 5,
                "theme_color": "#ff8000"
            }"##,
        )
        .unwrap();
        assert_eq!(config.preload.pages, 4);
        assert_eq!(config.max_chapters, Some(5));
        assert_eq!(config.theme_rgb(), Some((255, 128, 0)));
    }

    #[test]
    fn bad_theme_color_is_ignored() {
        let config = ReaderConfig { theme_color: Some("orange".into()), ..Default::default() };
        assert_eq!(config.theme_rgb(), None);
        let config = ReaderConfig { theme_color: Some("#zz0000".into()), ..Default::default() };
        assert_eq!(config.theme_rgb(), None);
    }

    #[test]
    fn multibyte_theme_color_is_ignored() {
        // Seven bytes, but 'é' straddles a channel boundary.
        let config = ReaderConfig { theme_color: Some("#0\u{e9}000".into()), ..Default::default() };
        assert_eq!(config.theme_color.as_deref().map(str::len), Some(7));
        assert_eq!(config.theme_rgb(), None);
    }

    #[test]
    fn load_from_reports_invalid_json() {
        let path = scratch_file("invalid");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(ReaderError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_sends_changed_config() {
        let path = scratch_file("watch");
        std::fs::write(&path, r#"{"reading_mode": "continuous-vertical"}"#).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(watch_config(path.clone(), Duration::from_secs(1), tx));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, r#"{"reading_mode": "paged-left-to-right"}"#).unwrap();
        let config = rx.recv().await.unwrap();
        assert_eq!(config.reading_mode, ReadingMode::PagedLeftToRight);
        watcher.abort();
    }
}
