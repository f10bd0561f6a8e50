use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_min_iterations: usize,
    pub poll_iterations_per_step: usize,
    pub step_delay_ms: u64,
    /// Stop a trip's poll loop as soon as its animation run ends. Off by
    /// default: the server finishes a trip later than the animation does.
    pub poll_follows_animation: bool,
    pub event_log_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            request_timeout_ms: 5000,
            poll_interval_ms: 500,
            poll_min_iterations: 6,
            poll_iterations_per_step: 2,
            step_delay_ms: 300,
            poll_follows_animation: false,
            event_log_capacity: crate::event_log::DEFAULT_CAPACITY,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Poll budget for a trip whose path has `path_len` nodes.
    pub fn poll_iterations(&self, path_len: usize) -> usize {
        self.poll_min_iterations
            .max(self.poll_iterations_per_step.saturating_mul(path_len))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    poll_min_iterations: Option<usize>,
    poll_iterations_per_step: Option<usize>,
    step_delay_ms: Option<u64>,
    poll_follows_animation: Option<bool>,
    event_log_capacity: Option<usize>,
}

/// Defaults, then `client.toml` in the working directory, then `APP__*` env vars.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    apply_file(&mut settings, Path::new(SETTINGS_FILE))?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file(settings: &mut ClientSettings, path: &Path) -> anyhow::Result<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let file_cfg: FileSettings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;

    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.poll_min_iterations {
        settings.poll_min_iterations = v;
    }
    if let Some(v) = file_cfg.poll_iterations_per_step {
        settings.poll_iterations_per_step = v;
    }
    if let Some(v) = file_cfg.step_delay_ms {
        settings.step_delay_ms = v;
    }
    if let Some(v) = file_cfg.poll_follows_animation {
        settings.poll_follows_animation = v;
    }
    if let Some(v) = file_cfg.event_log_capacity {
        settings.event_log_capacity = v;
    }
    Ok(())
}

pub fn apply_env(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = lookup("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = lookup("APP__POLL_MIN_ITERATIONS").and_then(|v| v.parse().ok()) {
        settings.poll_min_iterations = v;
    }
    if let Some(v) = lookup("APP__POLL_ITERATIONS_PER_STEP").and_then(|v| v.parse().ok()) {
        settings.poll_iterations_per_step = v;
    }
    if let Some(v) = lookup("APP__STEP_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.step_delay_ms = v;
    }
    if let Some(v) = lookup("APP__POLL_FOLLOWS_ANIMATION").and_then(|v| v.parse().ok()) {
        settings.poll_follows_animation = v;
    }
    if let Some(v) = lookup("APP__EVENT_LOG_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.event_log_capacity = v;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn poll_budget_has_a_floor_of_six() {
        let settings = ClientSettings::default();
        assert_eq!(settings.poll_iterations(1), 6);
        assert_eq!(settings.poll_iterations(3), 6);
        assert_eq!(settings.poll_iterations(5), 10);
    }

    #[test]
    fn poll_loop_outlives_animation_by_default() {
        let settings = ClientSettings::default();
        assert!(!settings.poll_follows_animation);

        let mut vars = HashMap::new();
        vars.insert("APP__POLL_FOLLOWS_ANIMATION", "true");
        let mut settings = ClientSettings::default();
        apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));
        assert!(settings.poll_follows_animation);
    }

    #[test]
    fn env_overrides_and_ignores_garbage_numbers() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("APP__SERVER_URL", "http://dispatch.local:8080"),
            ("APP__STEP_DELAY_MS", "120"),
            ("APP__POLL_INTERVAL_MS", "soon"),
        ]);
        let mut settings = ClientSettings::default();
        apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.server_url, "http://dispatch.local:8080");
        assert_eq!(settings.step_delay_ms, 120);
        assert_eq!(settings.poll_interval_ms, 500);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let mut settings = ClientSettings::default();
        apply_file(&mut settings, Path::new("/nonexistent/dispatch/client.toml"))
            .expect("missing file is fine");
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("dispatch_client_settings_{suffix}.toml"));
        fs::write(
            &path,
            "server_url = \"http://10.0.0.5:5000\"\npoll_min_iterations = 3\npoll_follows_animation = true\n",
        )
        .expect("write settings");

        let mut settings = ClientSettings::default();
        apply_file(&mut settings, &path).expect("parse settings");

        assert_eq!(settings.server_url, "http://10.0.0.5:5000");
        assert_eq!(settings.poll_min_iterations, 3);
        assert!(settings.poll_follows_animation);
        assert_eq!(settings.step_delay_ms, 300);

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("dispatch_client_bad_{suffix}.toml"));
        fs::write(&path, "poll_interval_ms = \"fast\"\n").expect("write settings");

        let mut settings = ClientSettings::default();
        assert!(apply_file(&mut settings, &path).is_err());

        fs::remove_file(path).expect("cleanup");
    }
}
