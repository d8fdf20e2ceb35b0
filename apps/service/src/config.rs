use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(std::io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: Database,
    pub listen: Listen,
    pub checks: Checks,
    pub web: Web,
    pub auth: Auth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub backend: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listen {
    pub address: String,
    pub port: u16,
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    pub enabled: bool,
    pub interval_secs: i64,
    pub timeout_secs: u64,
    pub ping_retry_count: u32,
    pub http_method: String,
    pub allow_single_checks: bool,
    pub retention_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Web {
    pub max_rtt_scale_ms: i64,
    pub dynamic_rtt_scale: bool,
    pub use_remote_checks: bool,
    pub remote_checks_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

impl Default for Database {
    fn default() -> Self {
        Self { backend: "libsql".into(), path: "srvmon.db".into() }
    }
}

impl Default for Listen {
    fn default() -> Self {
        Self { address: "0.0.0.0".into(), port: 8000, read_timeout_secs: 30 }
    }
}

impl Default for Checks {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_secs: 10,
            ping_retry_count: 2,
            http_method: "GET".into(),
            allow_single_checks: false,
            retention_days: 0,
        }
    }
}

impl Default for Web {
    fn default() -> Self {
        Self {
            max_rtt_scale_ms: 200,
            dynamic_rtt_scale: false,
            use_remote_checks: false,
            remote_checks_urls: Vec::new(),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self { enabled: false, username: String::new(), password: String::new() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Database::default(),
            listen: Listen::default(),
            checks: Checks::default(),
            web: Web::default(),
            auth: Auth::default(),
        }
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

/// Get default config path ($XDG_CONFIG_HOME/srvmon/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("srvmon/config.toml"))
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
        write_1(f, "Backend", &self.database.backend)?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Listen")?;
        write_1(f, "Address", &self.listen.address)?;
        write_1(f, "Port", &self.listen.port)?;
        write_1(f, "Read Timeout", &format!("{}s", self.listen.read_timeout_secs))?;
        write_title_1(f, "Checks")?;
        write_1(f, "Enabled", &self.checks.enabled)?;
        write_1(f, "Interval", &format!("{}s", self.checks.interval_secs))?;
        write_1(f, "Timeout", &format!("{}s", self.checks.timeout_secs))?;
        write_1(f, "Ping Retries", &self.checks.ping_retry_count)?;
        write_1(f, "HTTP Method", &self.checks.http_method)?;
        write_1(f, "Single Checks", &self.checks.allow_single_checks)?;
        write_1(f, "Retention Days", &self.checks.retention_days)?;
        write_title_1(f, "Web")?;
        write_1(f, "Max RTT Scale", &format!("{}ms", self.web.max_rtt_scale_ms))?;
        write_1(f, "Dynamic RTT Scale", &self.web.dynamic_rtt_scale)?;
        write_1(f, "Use Remote Checks", &self.web.use_remote_checks)?;
        write_1(f, "Remote URLs", &self.web.remote_checks_urls.join(", "))?;
        write_title_1(f, "Auth")?;
        write_1(f, "Enabled", &self.auth.enabled)?;
        write_1(f, "Username", &self.auth.username)?;
        write_1(f, "Password", &if self.auth.password.is_empty() { "unset" } else { "set" })?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/srvmon/config.toml
    /// or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Self::from_toml_str(raw_string.as_str())
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Parse and validate a config from inline TOML (the --confstr flag)
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Clamp what has a safe floor, reject what does not.
    fn validate(&mut self) -> Result<(), Error> {
        if self.database.backend != "libsql" && self.database.backend != "memory" {
            return Err(Error::Invalid(format!(
                "database.backend must be \"libsql\" or \"memory\", got {:?}",
                self.database.backend
            )));
        }
        if self.checks.interval_secs < 1 {
            return Err(Error::Invalid("checks.interval_secs must be at least 1".into()));
        }
        if self.checks.timeout_secs < 1 {
            return Err(Error::Invalid("checks.timeout_secs must be at least 1".into()));
        }
        if self.checks.retention_days < 0 {
            return Err(Error::Invalid("checks.retention_days must not be negative".into()));
        }
        if self.auth.enabled && self.auth.username.is_empty() {
            return Err(Error::Invalid("auth.username must be set when auth is enabled".into()));
        }

        self.checks.ping_retry_count = self.checks.ping_retry_count.max(1);
        if self.web.max_rtt_scale_ms < 1 {
            self.web.max_rtt_scale_ms = Web::default().max_rtt_scale_ms;
        }

        Ok(())
    }
}
