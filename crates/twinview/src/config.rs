use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::compositor::{CompositorSettings, FollowSettings, SplitOrientation};
use crate::input::{ControlLayout, InputMode};
use crate::json::parse_with_path;

pub const CONFIG_ENV_VAR: &str = "TWINVIEW_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "twinview.json";

const FOV_RANGE: (f32, f32) = (20.0, 120.0);
const SENSITIVITY_RANGE: (f32, f32) = (0.1, 10.0);
const MAX_DIVIDER_WIDTH_PX: u32 = 64;
const MIN_AUTOSAVE_INTERVAL_SECONDS: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub orientation: SplitOrientation,
    pub field_of_view: [f32; 2],
    pub input_mode: InputMode,
    pub control_layout: ControlLayout,
    pub look_sensitivity: f32,
    /// Keep the hosted world open to the local network while split is
    /// armed or active.
    pub force_lan_hosting: bool,
    pub anti_aliasing: u8,
    pub divider_width_px: u32,
    pub autosave_interval_seconds: f32,
    pub respawn_delay_seconds: f32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            orientation: SplitOrientation::Horizontal,
            field_of_view: [60.0, 60.0],
            input_mode: InputMode::KeyboardAndController,
            control_layout: ControlLayout::Classic,
            look_sensitivity: 1.0,
            force_lan_hosting: false,
            anti_aliasing: 1,
            divider_width_px: 4,
            autosave_interval_seconds: 120.0,
            respawn_delay_seconds: 10.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config '{path}'{location}: {source}")]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings that are legal but probably not what the user meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Shared-controller mode wins even though a second pad is plugged in.
    SharedModeWithSecondController { connected: usize },
    /// Dual-controller mode with fewer than two pads connected.
    DualControllerMissing { connected: usize },
}

impl SplitConfig {
    /// `TWINVIEW_CONFIG` if set, else `<config_dir>/twinview.json`. A
    /// missing file yields defaults.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let override_path = match env::var(CONFIG_ENV_VAR) {
            Ok(value) => Some(PathBuf::from(value)),
            Err(env::VarError::NotPresent) => None,
            Err(source) => {
                return Err(ConfigError::EnvVar {
                    var: CONFIG_ENV_VAR,
                    source,
                })
            }
        };
        Self::load_from(&config_path(config_dir, override_path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config_missing_using_defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let parsed = Self::from_json_str(&raw, path)?.normalized();
        info!(
            path = %path.display(),
            orientation = ?parsed.orientation,
            input_mode = ?parsed.input_mode,
            layout = ?parsed.control_layout,
            "config_loaded"
        );
        Ok(parsed)
    }

    pub fn from_json_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        parse_with_path(raw).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            location: error.location(),
            source: error.source,
        })
    }

    /// Clamp out-of-range values, logging each adjustment.
    pub fn normalized(mut self) -> Self {
        for (index, fov) in self.field_of_view.iter_mut().enumerate() {
            *fov = clamp_logged("field_of_view", index, *fov, FOV_RANGE, 60.0);
        }
        self.look_sensitivity = clamp_logged(
            "look_sensitivity",
            0,
            self.look_sensitivity,
            SENSITIVITY_RANGE,
            1.0,
        );
        if !matches!(self.anti_aliasing, 1 | 2 | 4 | 8) {
            let fixed = match self.anti_aliasing {
                0 => 1,
                3 => 2,
                5..=7 => 4,
                _ => 8,
            };
            warn!(from = self.anti_aliasing, to = fixed, "config_anti_aliasing_adjusted");
            self.anti_aliasing = fixed;
        }
        if self.divider_width_px > MAX_DIVIDER_WIDTH_PX {
            warn!(
                from = self.divider_width_px,
                to = MAX_DIVIDER_WIDTH_PX,
                "config_divider_width_clamped"
            );
            self.divider_width_px = MAX_DIVIDER_WIDTH_PX;
        }
        if self.autosave_interval_seconds.is_nan()
            || self.autosave_interval_seconds < MIN_AUTOSAVE_INTERVAL_SECONDS
        {
            warn!(
                from = self.autosave_interval_seconds,
                to = MIN_AUTOSAVE_INTERVAL_SECONDS,
                "config_autosave_interval_clamped"
            );
            self.autosave_interval_seconds = MIN_AUTOSAVE_INTERVAL_SECONDS;
        }
        if !self.respawn_delay_seconds.is_finite() || self.respawn_delay_seconds < 0.0 {
            warn!(from = self.respawn_delay_seconds, to = 10.0, "config_respawn_delay_reset");
            self.respawn_delay_seconds = 10.0;
        }
        self
    }

    pub fn validate(&self, connected_controllers: usize) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        match self.input_mode {
            InputMode::SharedController if connected_controllers >= 2 => {
                warnings.push(ConfigWarning::SharedModeWithSecondController {
                    connected: connected_controllers,
                });
            }
            InputMode::DualController if connected_controllers < 2 => {
                warnings.push(ConfigWarning::DualControllerMissing {
                    connected: connected_controllers,
                });
            }
            _ => {}
        }
        for warning in &warnings {
            warn!(warning = ?warning, "config_validation_warning");
        }
        warnings
    }

    pub fn compositor_settings(&self) -> CompositorSettings {
        CompositorSettings {
            orientation: self.orientation,
            field_of_view: self.field_of_view,
            anti_aliasing: self.anti_aliasing,
            divider_width_px: self.divider_width_px,
            follow: FollowSettings::default(),
        }
    }
}

fn config_path(config_dir: &Path, override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| config_dir.join(DEFAULT_CONFIG_FILE))
}

fn clamp_logged(field: &'static str, index: usize, value: f32, range: (f32, f32), fallback: f32) -> f32 {
    let (min, max) = range;
    let fixed = if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    };
    if fixed != value {
        warn!(field, index, from = value, to = fixed, "config_value_clamped");
    }
    fixed
}
