//! TOML-based configuration for the server.
//!
//! The file lives in the platform-appropriate directory unless `--config`
//! points elsewhere:
//! - Windows:  `%APPDATA%\Edgeshare\server.toml`
//! - Linux:    `~/.config/edgeshare/server.toml`
//! - macOS:    `~/Library/Application Support/Edgeshare/server.toml`
//!
//! # File layout (for beginners)
//!
//! ```toml
//! [server]
//! name = "desk"
//! port = 24800
//!
//! [[screens]]
//! name = "desk"
//!
//! [[screens]]
//! name = "laptop"
//! aliases = ["laptop.local"]
//!
//! [[links]]
//! from = "desk"
//! side = "right"
//! to = "laptop"
//!
//! [[links]]
//! from = "laptop"
//! side = "left"
//! to = "desk"
//!
//! [options]
//! switch_delay_ms = 250
//! switch_corners = ["top-left"]
//! ```
//!
//! Links are one-way: a screen only has a neighbour on a side if a link
//! says so, which is why the example lists both directions.  `from_range`
//! and `to_range` restrict a link to part of an edge, in percent of its
//! length (`[0, 50]` is the first half of the edge).
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so a file only has to spell out
//! what differs from the defaults.  Switching options are `Option`s instead:
//! an absent option is never sent to the screens at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edgeshare_core::{
    CornerMask, Direction, Interval, OptionId, OptionSet, ProtocolName, Topology, TopologyError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::server::ServerSettings;
use crate::infrastructure::network::listener::ListenerOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// There is no file at the given path.
    #[error("no config file at {0}")]
    NotFound(PathBuf),

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The screens or links do not form a valid topology.
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("unknown switch corner {0:?}")]
    InvalidCorner(String),

    #[error("unknown protocol {0:?} (expected synergy or barrier)")]
    UnknownProtocol(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub screens: Vec<ScreenEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
    #[serde(default)]
    pub options: OptionsConfig,
}

/// Listener, timing and local-screen settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Screen name of this machine.  Must appear in `[[screens]]`.
    #[serde(default = "default_name")]
    pub name: String,
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tag sent in the greeting: `"synergy"` or `"barrier"`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Size of the local screen as seen by the headless primary.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Width in pixels of the band along each edge that triggers a switch.
    #[serde(default = "default_jump_zone")]
    pub jump_zone: i32,
}

/// One screen and its per-screen overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Corners of this screen where switching is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_corners: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_corner_size: Option<i32>,
}

/// A one-way edge link: leaving `from` through `side` enters `to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkEntry {
    pub from: String,
    pub side: Direction,
    pub to: String,
    /// Part of `from`'s edge covered by the link, in percent.
    #[serde(default = "default_range")]
    pub from_range: [f32; 2],
    /// Part of `to`'s matching edge the range maps onto, in percent.
    #[serde(default = "default_range")]
    pub to_range: [f32; 2],
}

/// Global switching and sharing options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OptionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_delay_ms: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_double_tap_ms: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_corners: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_corner_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_needs_shift: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_needs_control: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_needs_alt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_mouse_moves: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_lock_to_screen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipboard_sharing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipboard_sharing_size_kb: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screensaver_sync: Option<bool>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    "primary".to_string()
}
fn default_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    24800
}
fn default_protocol() -> String {
    "synergy".to_string()
}
fn default_handshake_timeout_ms() -> u64 {
    5000
}
fn default_close_timeout_ms() -> u64 {
    5000
}
fn default_shutdown_timeout_ms() -> u64 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}
fn default_jump_zone() -> i32 {
    1
}
fn default_range() -> [f32; 2] {
    [0.0, 100.0]
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            port: default_port(),
            protocol: default_protocol(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            log_level: default_log_level(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            jump_zone: default_jump_zone(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl ServerSection {
    /// Parses the `protocol` setting.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownProtocol`] for anything but `synergy` or `barrier`.
    pub fn protocol_name(&self) -> Result<ProtocolName, ConfigError> {
        match self.protocol.to_ascii_lowercase().as_str() {
            "synergy" => Ok(ProtocolName::Synergy),
            "barrier" => Ok(ProtocolName::Barrier),
            _ => Err(ConfigError::UnknownProtocol(self.protocol.clone())),
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }

    pub fn listener_options(&self) -> Result<ListenerOptions, ConfigError> {
        Ok(ListenerOptions {
            protocol: self.protocol_name()?,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        })
    }
}

/// Builds the validated topology described by `config`.
///
/// Screens are added first, then aliases, then links, so links and aliases
/// may refer to screens declared later in the file.
///
/// # Errors
///
/// [`ConfigError::Topology`] for invalid or duplicate names, unknown link
/// endpoints, bad ranges and overlapping links, and
/// [`ConfigError::InvalidCorner`] for an unknown corner name.
pub fn build_topology(config: &ServerConfig) -> Result<Topology, ConfigError> {
    let mut topology = Topology::new();

    for screen in &config.screens {
        topology.add_screen(screen.name.as_str())?;
    }
    for screen in &config.screens {
        for alias in &screen.aliases {
            topology.add_alias(screen.name.as_str(), alias.as_str())?;
        }
        if let Some(corners) = &screen.switch_corners {
            topology.set_option(
                screen.name.as_str(),
                OptionId::SWITCH_CORNERS,
                corner_mask(corners)?,
            )?;
        }
        if let Some(size) = screen.switch_corner_size {
            topology.set_option(screen.name.as_str(), OptionId::SWITCH_CORNER_SIZE, size)?;
        }
    }
    for link in &config.links {
        topology.link(
            link.from.as_str(),
            link.side,
            percent_interval(link.from_range)?,
            link.to.as_str(),
            percent_interval(link.to_range)?,
        )?;
    }

    apply_options(&config.options, topology.global_options_mut())?;
    Ok(topology)
}

fn percent_interval([start, end]: [f32; 2]) -> Result<Interval, TopologyError> {
    Interval::new(start / 100.0, end / 100.0)
}

fn corner_mask(names: &[String]) -> Result<i32, ConfigError> {
    names.iter().try_fold(0, |mask, name| {
        CornerMask::from_name(name)
            .map(|corner| mask | corner.0 as i32)
            .ok_or_else(|| ConfigError::InvalidCorner(name.clone()))
    })
}

fn apply_options(options: &OptionsConfig, set: &mut OptionSet) -> Result<(), ConfigError> {
    let flag = |value: bool| i32::from(value);

    let values = [
        (OptionId::SWITCH_DELAY, options.switch_delay_ms),
        (OptionId::SWITCH_TWO_TAP, options.switch_double_tap_ms),
        (OptionId::SWITCH_CORNER_SIZE, options.switch_corner_size),
        (OptionId::SWITCH_NEEDS_SHIFT, options.switch_needs_shift.map(flag)),
        (OptionId::SWITCH_NEEDS_CONTROL, options.switch_needs_control.map(flag)),
        (OptionId::SWITCH_NEEDS_ALT, options.switch_needs_alt.map(flag)),
        (OptionId::RELATIVE_MOVES, options.relative_mouse_moves.map(flag)),
        (OptionId::DISABLE_LOCK_TO_SCREEN, options.disable_lock_to_screen.map(flag)),
        (OptionId::CLIPBOARD_SHARING, options.clipboard_sharing.map(flag)),
        (OptionId::CLIPBOARD_SHARING_SIZE, options.clipboard_sharing_size_kb),
        (OptionId::SCREENSAVER_SYNC, options.screensaver_sync.map(flag)),
    ];
    for (id, value) in values {
        if let Some(value) = value {
            set.set(id, value);
        }
    }
    if let Some(corners) = &options.switch_corners {
        set.set(OptionId::SWITCH_CORNERS, corner_mask(corners)?);
    }
    Ok(())
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default path of `server.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("server.toml"))
}

/// Loads the config at `path`.
///
/// # Errors
///
/// [`ConfigError::NotFound`] when the file does not exist, [`ConfigError::Io`]
/// for other file-system errors, and [`ConfigError::Parse`] if the TOML is
/// malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `edgeshare`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Edgeshare"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("edgeshare"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Edgeshare")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
