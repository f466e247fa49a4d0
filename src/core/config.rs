//! Configuration management for the application server.
//!
//! The backend configuration is a strict four-line file:
//!
//! ```text
//! /path/to/llama.cpp/build/bin
//! /path/to/model.gguf
//! 8080
//! 8081
//! ```
//!
//! Line 1 is the directory holding `llama-server`, line 2 the model file,
//! line 3 the llama-server port and line 4 the port this server binds to.
//! Paths support `~` and `$VAR` / `${VAR}` expansion.

use crate::core::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the backend executable inside the configured bin directory.
pub const BACKEND_BINARY_NAME: &str = "llama-server";

/// Lowest port either server may use.
pub const MIN_PORT: i64 = 1024;

/// Highest port either server may use.
pub const MAX_PORT: i64 = 65535;

const FIELDS: [&str; 4] = [
    "llama bin path",
    "model path",
    "llama-server port",
    "app-server port",
];

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("env var pattern is valid")
});

/// Where the backend lives and which port the dispatcher binds to.
///
/// Built once by [`BackendConfig::parse`] or [`BackendConfig::from_file`] and
/// never mutated. Parsing and [`BackendConfig::validate`] are separate steps so
/// a config can be inspected before it touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    backend_binary_path: PathBuf,
    model_path: PathBuf,
    backend_port: i64,
    dispatcher_port: i64,
}

impl BackendConfig {
    /// Build a config from already-resolved values.
    pub fn new(
        backend_binary_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        backend_port: i64,
        dispatcher_port: i64,
    ) -> Self {
        Self {
            backend_binary_path: backend_binary_path.into(),
            model_path: model_path.into(),
            backend_port,
            dispatcher_port,
        }
    }

    /// Load and parse a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse the four significant lines of a config source.
    ///
    /// Lines are positional. A blank or `#` line where a value is expected is
    /// an error naming that line; anything after line 4 is ignored.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut lines = source.lines();
        let mut values: [&str; 4] = [""; 4];

        for (idx, slot) in values.iter_mut().enumerate() {
            let line = idx + 1;
            let field = FIELDS[idx];
            let raw = lines
                .next()
                .ok_or(ConfigError::MissingLine { line, field })?;
            let value = raw.trim_matches([' ', '\t', '\r', '\n']);
            if value.is_empty() || value.starts_with('#') {
                return Err(ConfigError::MissingValue { line, field });
            }
            *slot = value;
        }

        Ok(Self {
            backend_binary_path: expand_path(values[0]),
            model_path: expand_path(values[1]),
            backend_port: parse_port(values[2], 3)?,
            dispatcher_port: parse_port(values[3], 4)?,
        })
    }

    /// Check every invariant. Ports are checked before the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_port_range("llama-server", self.backend_port)?;
        check_port_range("app-server", self.dispatcher_port)?;

        if self.backend_port == self.dispatcher_port {
            return Err(ConfigError::PortConflict {
                port: self.backend_port,
            });
        }

        let server_path = self.backend_server_path();
        if !is_executable(&server_path) {
            return Err(ConfigError::BackendNotExecutable { path: server_path });
        }

        if !is_readable(&self.model_path) {
            return Err(ConfigError::ModelNotReadable {
                path: self.model_path.clone(),
            });
        }

        Ok(())
    }

    pub fn backend_binary_path(&self) -> &Path {
        &self.backend_binary_path
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn backend_port(&self) -> i64 {
        self.backend_port
    }

    pub fn dispatcher_port(&self) -> i64 {
        self.dispatcher_port
    }

    /// Full path of the `llama-server` executable.
    pub fn backend_server_path(&self) -> PathBuf {
        self.backend_binary_path.join(BACKEND_BINARY_NAME)
    }

    /// URL the backend client talks to.
    pub fn backend_url(&self) -> String {
        format!("http://localhost:{}", self.backend_port)
    }
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime Configuration:")?;
        writeln!(
            f,
            "  Llama Bin Path:    {}",
            self.backend_binary_path.display()
        )?;
        writeln!(f, "  Model Path:        {}", self.model_path.display())?;
        writeln!(f, "  Llama Server Port: {}", self.backend_port)?;
        writeln!(f, "  App Server Port:   {}", self.dispatcher_port)?;
        write!(f, "  Llama Server URL:  {}", self.backend_url())
    }
}

fn parse_port(value: &str, line: usize) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidPort {
        line,
        value: value.to_string(),
    })
}

fn check_port_range(field: &'static str, port: i64) -> Result<(), ConfigError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(())
    } else {
        Err(ConfigError::PortOutOfRange { field, port })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn is_readable(path: &Path) -> bool {
    path.is_file() && fs::File::open(path).is_ok()
}

/// Expand `~` and environment variable references in a path.
///
/// Supports `~`, `~/rest`, `$VAR` and `${VAR}`. A relative result is made
/// absolute against the current directory. If anything cannot be resolved
/// (unset variable, unknown home directory) the input is returned unchanged.
pub fn expand_path(raw: &str) -> PathBuf {
    match try_expand(raw) {
        Some(expanded) => std::path::absolute(&expanded).unwrap_or(expanded),
        None => PathBuf::from(raw),
    }
}

fn try_expand(raw: &str) -> Option<PathBuf> {
    let with_home = if raw == "~" || raw.starts_with("~/") {
        let home = home::home_dir()?;
        format!("{}{}", home.display(), &raw[1..])
    } else {
        raw.to_string()
    };

    let mut unresolved = false;
    let expanded = ENV_VAR_RE.replace_all(&with_home, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| {
            unresolved = true;
            String::new()
        })
    });

    if unresolved {
        return None;
    }
    Some(PathBuf::from(expanded.into_owned()))
}

/// Ambient server knobs read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address the dispatcher binds to
    pub host: String,

    /// Timeout in seconds for backend business calls
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

impl ServerSettings {
    /// Read `HOST` and `REQUEST_TIMEOUT_SECS`, keeping defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                settings.host = host.trim().to_string();
            }
        }

        if let Ok(timeout_str) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout_str.trim().parse::<u64>() {
                if timeout > 0 {
                    settings.request_timeout_secs = timeout;
                }
            }
        }

        settings
    }
}
