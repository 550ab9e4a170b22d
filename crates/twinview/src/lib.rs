use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod atomic_io;
pub mod compositor;
pub mod config;
pub mod host;
pub mod impersonation;
pub mod input;
mod json;
pub mod math;
mod player;
pub mod presentation;
pub mod profile;
pub mod session;
#[cfg(test)]
mod test_support;

pub use compositor::{
    Compositor, CompositorError, CompositorSettings, SplitOrientation, ViewportSurface,
};
pub use config::{ConfigError, ConfigWarning, SplitConfig, CONFIG_ENV_VAR};
pub use host::{
    CameraHost, CameraId, CharacterHost, CharacterId, CharacterPose, Host, HostError,
    PhysicsQuery, SpawnRequest, WorldEntryId, WorldEntryRequest,
};
pub use impersonation::{AssignOutcome, CallbackKind, CharacterScope, PlayerContext};
pub use input::{DeviceFrame, InputMode, InputSnapshot, KeyboardState, LogicalAction};
pub use math::{Vec2, Vec3};
pub use player::PlayerIndex;
pub use presentation::{PresentationCollaborator, PresentationError, UiAnchor};
pub use profile::{JsonProfileStore, MemoryProfileStore, Profile, ProfileError, ProfileStore};
pub use session::{
    ActivationError, SessionCoordinator, SessionEvent, SessionState, WorldEntryDecision,
};

pub const ROOT_ENV_VAR: &str = "TWINVIEW_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub screenshots_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "TWINVIEW_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or config/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or config/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/twinview\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Find the project root and make sure the writable directories exist.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let config_dir = root.join("config");
    let profiles_dir = root.join("profiles");
    let screenshots_dir = root.join("screenshots");

    for dir in [&profiles_dir, &screenshots_dir] {
        fs::create_dir_all(dir).map_err(|source| StartupError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }

    Ok(AppPaths {
        root,
        config_dir,
        profiles_dir,
        screenshots_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_config = path.join("config").is_dir();

    cargo_toml && (has_crates || has_config)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
