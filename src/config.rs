use configparser::ini::Ini;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

const CONFIG_PATH: &str = "deadsync.ini";
const SECTION: &str = "Options";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Machine calibration, added on top of every chart's own offset.
    pub global_offset_seconds: f32,
    pub log_level: LogLevel,
    /// Tempo given to charts that load without any BPM.
    pub fallback_bpm: f32,
    pub warp_stabilization: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_offset_seconds: -0.008,
            log_level: LogLevel::Warn,
            fallback_bpm: 120.0,
            warp_stabilization: true,
        }
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

static CONFIG_FILE: std::sync::LazyLock<Mutex<PathBuf>> =
    std::sync::LazyLock::new(|| Mutex::new(PathBuf::from(CONFIG_PATH)));

// --- File I/O ---

fn to_ini(cfg: &Config) -> Ini {
    let mut conf = Ini::new_cs();
    conf.set(SECTION, "FallbackBPM", Some(cfg.fallback_bpm.to_string()));
    conf.set(SECTION, "GlobalOffsetSeconds", Some(cfg.global_offset_seconds.to_string()));
    conf.set(SECTION, "LogLevel", Some(cfg.log_level.as_str().to_string()));
    conf.set(
        SECTION,
        "WarpStabilization",
        Some(if cfg.warp_stabilization { "1" } else { "0" }.to_string()),
    );
    conf
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    to_ini(&Config::default()).write(path)
}

/// Parses an INI file into a config, falling back per key to defaults.
pub fn parse_config(path: &Path) -> Result<Config, String> {
    let mut conf = Ini::new();
    conf.load(path)?;
    let default = Config::default();

    let global_offset_seconds = conf
        .getfloat(SECTION, "GlobalOffsetSeconds")?
        .map_or(default.global_offset_seconds, |v| v as f32);
    let fallback_bpm = conf
        .getfloat(SECTION, "FallbackBPM")?
        .map(|v| v as f32)
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default.fallback_bpm);
    let log_level = conf
        .get(SECTION, "LogLevel")
        .and_then(|v| LogLevel::from_str(&v).ok())
        .unwrap_or(default.log_level);
    let warp_stabilization = conf
        .get(SECTION, "WarpStabilization")
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map_or(default.warp_stabilization, |v| v != 0);

    Ok(Config { global_offset_seconds, log_level, fallback_bpm, warp_stabilization })
}

pub fn load() {
    load_from(Path::new(CONFIG_PATH));
}

pub fn load_from(path: &Path) {
    *CONFIG_FILE.lock().unwrap_or_else(PoisonError::into_inner) = path.to_path_buf();
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    match parse_config(path) {
        Ok(loaded) => {
            *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = loaded;
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => warn!("Failed to load '{}': {e}. Using defaults.", path.display()),
    }
}

fn save() {
    let path = CONFIG_FILE.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let cfg = get();
    if let Err(e) = to_ini(&cfg).write(&path) {
        warn!("Failed to save config file: {e}");
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn update_global_offset(offset: f32) {
    {
        let mut cfg = CONFIG.lock().unwrap_or_else(PoisonError::into_inner);
        if (cfg.global_offset_seconds - offset).abs() < f32::EPSILON {
            return;
        }
        cfg.global_offset_seconds = offset;
    }
    save();
}
