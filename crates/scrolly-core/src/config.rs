use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log every signal stream and arm the fallback key sequence
    #[serde(default)]
    pub debug: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug: false,
        }
    }
}

/// Debounce and throttle windows, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quiet period before a resize is published
    #[serde(default = "default_resize_debounce")]
    pub resize_debounce_ms: u64,
    /// How often the anchor's document offset is re-read
    #[serde(default = "default_anchor_poll")]
    pub anchor_poll_ms: u64,
    /// Quiet period before progress is resolved to a step
    #[serde(default = "default_step_debounce")]
    pub step_debounce_ms: u64,
    /// Minimum spacing between frame plans of a media scene
    #[serde(default = "default_frame_throttle")]
    pub frame_throttle_ms: u64,
    /// Quiet period after a media ready tick before draining
    #[serde(default = "default_ready_debounce")]
    pub ready_debounce_ms: u64,
    /// Minimum spacing of forced ready ticks
    #[serde(default = "default_keep_alive")]
    pub keep_alive_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resize_debounce_ms: default_resize_debounce(),
            anchor_poll_ms: default_anchor_poll(),
            step_debounce_ms: default_step_debounce(),
            frame_throttle_ms: default_frame_throttle(),
            ready_debounce_ms: default_ready_debounce(),
            keep_alive_ms: default_keep_alive(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Fixed header height subtracted from the initial screen height (px)
    #[serde(default = "default_header_offset")]
    pub header_offset: f64,
    /// Extra scroll distance before a scene's progress starts (px)
    #[serde(default)]
    pub header_buffer: f64,
    /// Screen lengths of padding added after every scene
    #[serde(default = "default_scene_buffer")]
    pub scene_buffer: f64,
    /// Sentinel height as a fraction of the viewport height
    #[serde(default = "default_sentinel_fraction")]
    pub sentinel_fraction: f64,
    /// Height changes up to this many px are treated as browser chrome (px)
    #[serde(default = "default_resize_tolerance")]
    pub resize_tolerance: f64,
    /// Space between text blocks, e.g. "40vh" or "300px"
    #[serde(default = "default_graph_margin")]
    pub graph_margin: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            header_offset: default_header_offset(),
            header_buffer: 0.0,
            scene_buffer: default_scene_buffer(),
            sentinel_fraction: default_sentinel_fraction(),
            resize_tolerance: default_resize_tolerance(),
            graph_margin: default_graph_margin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Interpolated frames per plan on desktop
    #[serde(default = "default_frame_steps_desktop")]
    pub frame_steps_desktop: usize,
    /// Interpolated frames per plan on mobile (coarser)
    #[serde(default = "default_frame_steps_mobile")]
    pub frame_steps_mobile: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            frame_steps_desktop: default_frame_steps_desktop(),
            frame_steps_mobile: default_frame_steps_mobile(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resize_debounce() -> u64 {
    100
}

fn default_anchor_poll() -> u64 {
    500
}

fn default_step_debounce() -> u64 {
    100
}

fn default_frame_throttle() -> u64 {
    100
}

fn default_ready_debounce() -> u64 {
    20
}

fn default_keep_alive() -> u64 {
    1000
}

fn default_header_offset() -> f64 {
    50.0
}

fn default_scene_buffer() -> f64 {
    0.5
}

fn default_sentinel_fraction() -> f64 {
    0.8
}

fn default_resize_tolerance() -> f64 {
    60.0
}

fn default_graph_margin() -> String {
    "40vh".to_string()
}

fn default_frame_steps_desktop() -> usize {
    6
}

fn default_frame_steps_mobile() -> usize {
    2
}

impl EngineConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, self.to_toml()?)?;

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/scrolly/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("scrolly")
            .join("config.toml")
    }
}
