use std::collections::HashMap;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub scheduler: SchedulerSection,
    pub probes: ProbeSection,
    pub notifications: NotificationSection,
    pub server: ServerSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// IANA name used to label jobs; empty means the local UTC offset
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub default_timeout_seconds: u64,
    pub ssl_warning_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSection {
    pub client_url: String,
    pub app_name: String,
    pub app_icon: String,
    /// Mail relay endpoint; messages are only logged when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Bearer token to user id
    pub tokens: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: path::PathBuf::from("heartwatch.db") }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { jitter_min_ms: 300, jitter_max_ms: 1000, timezone: String::new() }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self { default_timeout_seconds: 10, ssl_warning_days: 30 }
    }
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            client_url: "http://localhost:3000".into(),
            app_name: "Heartwatch".into(),
            app_icon: String::new(),
            webhook_url: None,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080, tokens: HashMap::new() }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/heartwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("heartwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Jitter", &format!("{}-{} ms", self.scheduler.jitter_min_ms, self.scheduler.jitter_max_ms))?;
        write_1(f, "Timezone", &self.timezone())?;
        write_title_1(f, "Probes")?;
        write_1(f, "Default Timeout", &format!("{} s", self.probes.default_timeout_seconds))?;
        write_1(f, "SSL Warning", &format!("{} days", self.probes.ssl_warning_days))?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Client URL", &self.notifications.client_url)?;
        write_1(f, "App Name", &self.notifications.app_name)?;
        write_1(f, "Relay", &self.notifications.webhook_url.as_deref().unwrap_or("log only"))?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        // Never print the tokens themselves
        write_1(f, "API Tokens", &self.server.tokens.len())?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/heartwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            toml::from_str(raw_string.as_str()).map_err(|err| Error::ParseFailed(err.to_string()))
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self).map_err(|err| Error::ParseFailed(err.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Apply `HEARTWATCH_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("HEARTWATCH_DATABASE") {
            self.database.path = path.into();
        }
        if let Some(bind) = lookup("HEARTWATCH_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = lookup("HEARTWATCH_CLIENT_URL") {
            self.notifications.client_url = url;
        }
        if let Some(tz) = lookup("HEARTWATCH_TIMEZONE") {
            self.scheduler.timezone = tz;
        }
    }

    /// Timezone label for scheduled jobs
    pub fn timezone(&self) -> String {
        let configured = self.scheduler.timezone.trim();
        if configured.is_empty() { chrono::Local::now().offset().to_string() } else { configured.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.probes.ssl_warning_days, 30);
        assert_eq!(config.scheduler.jitter_min_ms, 300);
        assert!(dir.path().join("nested/config.toml").exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 9000\n\n[server.tokens]\nabc = 4\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.tokens.get("abc"), Some(&4));
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.probes.default_timeout_seconds, 10);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "HEARTWATCH_DATABASE" => Some("/var/lib/heartwatch/data.db".into()),
            "HEARTWATCH_TIMEZONE" => Some("Europe/Amsterdam".into()),
            _ => None,
        });
        assert_eq!(config.database.path, path::PathBuf::from("/var/lib/heartwatch/data.db"));
        assert_eq!(config.timezone(), "Europe/Amsterdam");
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn display_hides_tokens() {
        let mut config = Config::default();
        config.server.tokens.insert("s3cret".into(), 1);
        let shown = config.to_string();
        assert!(shown.contains("API Tokens: 1"));
        assert!(!shown.contains("s3cret"));
    }
}
