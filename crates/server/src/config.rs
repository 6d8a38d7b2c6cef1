use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context};
use display::DisplayOptions;
use shared::domain::SurfaceDimensions;
use url::Url;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub server_public_url: Option<String>,
    pub display_launch_command: Option<String>,
    pub display_launch_timeout_secs: u64,
    pub display_poll_interval_ms: u64,
    pub display_width: u32,
    pub display_height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let dimensions = SurfaceDimensions::default();
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/lyrics.db".into(),
            server_public_url: None,
            display_launch_command: None,
            display_launch_timeout_secs: 10,
            display_poll_interval_ms: 1000,
            display_width: dimensions.width,
            display_height: dimensions.height,
        }
    }
}

impl Settings {
    /// Address presentation clients use to reach this server.
    pub fn public_url(&self) -> anyhow::Result<Url> {
        let raw = match &self.server_public_url {
            Some(url) => url.clone(),
            None => format!("http://{}", self.server_bind),
        };
        Url::parse(&raw).with_context(|| format!("invalid public url '{raw}'"))
    }

    pub fn display_options(&self) -> anyhow::Result<DisplayOptions> {
        let url = self
            .public_url()?
            .join("display")
            .map_err(|e| anyhow!("failed to build display url: {e}"))?;
        Ok(DisplayOptions {
            url: url.to_string(),
            dimensions: SurfaceDimensions {
                width: self.display_width,
                height: self.display_height,
            },
            poll_interval: Duration::from_millis(self.display_poll_interval_ms.max(1)),
        })
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.display_launch_timeout_secs)
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("server_public_url") {
        settings.server_public_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("display_launch_command") {
        settings.display_launch_command = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("display_launch_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.display_launch_timeout_secs = v;
    }
    if let Some(v) = file_cfg.get("display_poll_interval_ms").and_then(|v| v.parse().ok()) {
        settings.display_poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.get("display_width").and_then(|v| v.parse().ok()) {
        settings.display_width = v;
    }
    if let Some(v) = file_cfg.get("display_height").and_then(|v| v.parse().ok()) {
        settings.display_height = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("SERVER_PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }
    if let Some(v) = var("APP__SERVER_PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }

    if let Some(v) = var("APP__DISPLAY_LAUNCH_COMMAND") {
        settings.display_launch_command = Some(v).filter(|cmd| !cmd.trim().is_empty());
    }
    if let Some(v) = var("APP__DISPLAY_LAUNCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.display_launch_timeout_secs = v;
    }
    if let Some(v) = var("APP__DISPLAY_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.display_poll_interval_ms = v;
    }
    if let Some(v) = var("APP__DISPLAY_WIDTH").and_then(|v| v.parse().ok()) {
        settings.display_width = v;
    }
    if let Some(v) = var("APP__DISPLAY_HEIGHT").and_then(|v| v.parse().ok()) {
        settings.display_height = v;
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return sqlite_url_for_path(path);
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    sqlite_url_for_path(path)
}

/// Drive-letter paths keep a single colon after the scheme.
fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return format!("sqlite:{path}");
    }
    format!("sqlite://{path}")
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
