//! Configuration management
//!
//! Resolution is layered: built-in defaults, overlaid by the TOML file,
//! overlaid by per-invocation overrides. `Config::resolve` is the pure merge;
//! `Config::load` adds the file I/O.

use color_eyre::eyre::{self, Context, ContextCompat, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::compositor::Geometry;

// ============================================================================
// Public Configuration Types
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub kiosk: KioskSettings,
    /// Fixed display rectangle of every poster window
    pub poster: Geometry,
    pub viewers: Viewers,
    pub timing: Timing,
}

/// Kiosk-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct KioskSettings {
    /// Download cache and log directory
    pub cache: PathBuf,
    /// Source directory of poster files
    pub page_directory: PathBuf,
    /// Remote zip bundle mirrored into `page_directory`
    pub archive_url: Option<String>,
    /// Seconds between automatic page switches; zero or less disables rotation
    pub auto_page_switch: f64,
    /// Compositor output to rotate
    pub output_id: u64,
    pub log_level: String,
}

/// External programs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewers {
    pub document: String,
    pub video: String,
    pub probe: String,
    pub mime_query: String,
}

/// Timeouts and delays of the rotation controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Pause between a window appearing and placing it
    pub settle_delay: Duration,
    /// Give up on unmapped posters after this long; `None` waits forever
    pub mapping_timeout: Option<Duration>,
    /// Shared budget for viewers to exit after SIGTERM
    pub shutdown_timeout: Duration,
}

/// Per-invocation overrides (command line)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub auto_page_switch: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kiosk: KioskSettings {
                cache: PathBuf::from("~/.posterwall/cache"),
                page_directory: PathBuf::from("~/.posterwall/pages"),
                archive_url: None,
                auto_page_switch: 5.0,
                output_id: 1,
                log_level: "info".to_string(),
            },
            poster: Geometry {
                x: 0,
                y: 0,
                width: 2160,
                height: 3840,
            },
            viewers: Viewers {
                document: "katarakt".to_string(),
                video: "mpv".to_string(),
                probe: "ffprobe".to_string(),
                mime_query: "xdg-mime".to_string(),
            },
            timing: Timing {
                settle_delay: Duration::from_millis(200),
                mapping_timeout: Some(Duration::from_secs(60)),
                shutdown_timeout: Duration::from_secs(20),
            },
        }
    }
}

// ============================================================================
// Config File Deserialization (TOML)
// ============================================================================

/// Values present in the config file; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    kiosk: KioskFile,
    #[serde(default)]
    poster: PosterFile,
    #[serde(default)]
    viewers: ViewersFile,
    #[serde(default)]
    timing: TimingFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KioskFile {
    cache: Option<PathBuf>,
    page_directory: Option<PathBuf>,
    archive_url: Option<String>,
    auto_page_switch: Option<f64>,
    output_id: Option<u64>,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PosterFile {
    x: Option<i64>,
    y: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ViewersFile {
    document: Option<String>,
    video: Option<String>,
    probe: Option<String>,
    mime_query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimingFile {
    settle_delay_ms: Option<u64>,
    /// Zero disables the timeout
    mapping_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Parse TOML config contents
    ///
    /// # Errors
    /// Returns an error on malformed TOML or unknown keys.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from `path`, or the default XDG path when `None`
    ///
    /// A missing file is not an error: defaults apply.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the result is invalid.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::get_config_path()?,
        };
        Self::load_from_path(&config_path, overrides)
    }

    /// Load configuration from an explicit path
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the result is invalid.
    pub fn load_from_path(config_path: &Path, overrides: &Overrides) -> Result<Self> {
        let file = if config_path.exists() {
            debug!("Loading config {:?}", config_path);
            let contents = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config: {config_path:?}"))?;
            ConfigFile::parse(&contents).with_context(|| format!("In config file {config_path:?}"))?
        } else {
            info!("No config at {:?}, using defaults", config_path);
            ConfigFile::default()
        };

        Self::resolve(&Self::default(), file, overrides)
    }

    /// Merge defaults, file values and overrides into a validated config
    ///
    /// # Errors
    /// Returns an error if the merged configuration is invalid.
    pub fn resolve(defaults: &Self, file: ConfigFile, overrides: &Overrides) -> Result<Self> {
        let d = defaults;
        let ConfigFile {
            kiosk,
            poster,
            viewers,
            timing,
        } = file;

        let mapping_timeout = match timing.mapping_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => d.timing.mapping_timeout,
        };

        let config = Self {
            kiosk: KioskSettings {
                cache: expand_tilde(&kiosk.cache.unwrap_or_else(|| d.kiosk.cache.clone())),
                page_directory: expand_tilde(
                    &kiosk
                        .page_directory
                        .unwrap_or_else(|| d.kiosk.page_directory.clone()),
                ),
                archive_url: kiosk.archive_url.or_else(|| d.kiosk.archive_url.clone()),
                auto_page_switch: overrides
                    .auto_page_switch
                    .or(kiosk.auto_page_switch)
                    .unwrap_or(d.kiosk.auto_page_switch),
                output_id: kiosk.output_id.unwrap_or(d.kiosk.output_id),
                log_level: kiosk.log_level.unwrap_or_else(|| d.kiosk.log_level.clone()),
            },
            poster: Geometry {
                x: poster.x.unwrap_or(d.poster.x),
                y: poster.y.unwrap_or(d.poster.y),
                width: poster.width.unwrap_or(d.poster.width),
                height: poster.height.unwrap_or(d.poster.height),
            },
            viewers: Viewers {
                document: viewers.document.unwrap_or_else(|| d.viewers.document.clone()),
                video: viewers.video.unwrap_or_else(|| d.viewers.video.clone()),
                probe: viewers.probe.unwrap_or_else(|| d.viewers.probe.clone()),
                mime_query: viewers
                    .mime_query
                    .unwrap_or_else(|| d.viewers.mime_query.clone()),
            },
            timing: Timing {
                settle_delay: timing
                    .settle_delay_ms
                    .map_or(d.timing.settle_delay, Duration::from_millis),
                mapping_timeout,
                shutdown_timeout: timing
                    .shutdown_timeout_secs
                    .map_or(d.timing.shutdown_timeout, Duration::from_secs),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.kiosk.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => eyre::bail!(
                "Invalid log_level '{level}'. Must be: error, warn, info, debug, or trace"
            ),
        }

        let secs = self.kiosk.auto_page_switch;
        if secs.is_nan() {
            eyre::bail!("auto_page_switch must be a number of seconds");
        }
        if secs.is_finite() && secs > 0.0 && Duration::try_from_secs_f64(secs).is_err() {
            eyre::bail!("auto_page_switch of {secs} seconds is too large");
        }

        if self.poster.width <= 0 || self.poster.height <= 0 {
            eyre::bail!(
                "Poster size must be positive, got {}x{}",
                self.poster.width,
                self.poster.height
            );
        }

        for (name, command) in [
            ("document", &self.viewers.document),
            ("video", &self.viewers.video),
            ("probe", &self.viewers.probe),
            ("mime_query", &self.viewers.mime_query),
        ] {
            if command.trim().is_empty() {
                eyre::bail!("Viewer command '{name}' must not be empty");
            }
        }

        if let Some(url) = &self.kiosk.archive_url
            && url.trim().is_empty()
        {
            eyre::bail!("archive_url must not be empty when set");
        }

        Ok(())
    }

    /// Rotation interval, or `None` when rotation is disabled
    #[must_use]
    pub fn rotation_interval(&self) -> Option<Duration> {
        let secs = self.kiosk.auto_page_switch;
        if secs.is_finite() && secs > 0.0 {
            Duration::try_from_secs_f64(secs).ok()
        } else {
            None
        }
    }

    /// Get the XDG config path for posterwall
    ///
    /// # Errors
    /// Returns an error if no config directory can be determined.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("posterwall");
        Ok(config_dir.join("config.toml"))
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self) {
        use crossterm::style::Stylize;

        println!("{}\n", "✓ Configuration valid".green());

        println!("{}", "Kiosk:".bold());
        println!("  cache: {}", self.kiosk.cache.display());
        println!("  page_directory: {}", self.kiosk.page_directory.display());
        println!(
            "  archive_url: {}",
            self.kiosk.archive_url.as_deref().unwrap_or("(not set)")
        );
        match self.rotation_interval() {
            Some(interval) => println!("  auto_page_switch: {interval:?}"),
            None => println!("  auto_page_switch: {}", "disabled".yellow()),
        }
        println!("  output_id: {}", self.kiosk.output_id);
        println!("  log_level: {}", self.kiosk.log_level);

        println!("\n{}", "Poster:".bold());
        println!(
            "  {}x{} at ({}, {})",
            self.poster.width, self.poster.height, self.poster.x, self.poster.y
        );

        println!("\n{}", "Viewers:".bold());
        println!("  document: {}", self.viewers.document);
        println!("  video: {}", self.viewers.video);
        println!("  probe: {}", self.viewers.probe);
        println!("  mime_query: {}", self.viewers.mime_query);

        println!("\n{}", "Timing:".bold());
        println!("  settle_delay: {:?}", self.timing.settle_delay);
        match self.timing.mapping_timeout {
            Some(timeout) => println!("  mapping_timeout: {timeout:?}"),
            None => println!("  mapping_timeout: {}", "unbounded".yellow()),
        }
        println!("  shutdown_timeout: {:?}", self.timing.shutdown_timeout);
    }
}

/// `$XDG_RUNTIME_DIR`, if set
#[must_use]
pub fn xdg_runtime_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from)
}

/// Directory for sockets and the PID file
///
/// Prefers `$XDG_RUNTIME_DIR`, falls back to `/tmp`.
#[must_use]
pub fn runtime_dir() -> PathBuf {
    xdg_runtime_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Expand a leading `~` to the home directory
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
