use std::rc::Rc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use twinview::{resolve_app_paths, AppPaths, JsonProfileStore, SessionCoordinator, SplitConfig};

use super::hud::{HudCollaborator, SharedHud};
use super::loop_runner::LoopConfig;
use super::AppError;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) paths: AppPaths,
    pub(crate) coordinator: SessionCoordinator,
    pub(crate) hud: SharedHud,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== twinview sandbox startup ===");

    let paths = resolve_app_paths()?;
    info!(
        root = %paths.root.display(),
        config_dir = %paths.config_dir.display(),
        profiles_dir = %paths.profiles_dir.display(),
        "startup"
    );

    let split_config = SplitConfig::load(&paths.config_dir)?.normalized();
    info!(
        orientation = ?split_config.orientation,
        input_mode = ?split_config.input_mode,
        layout = ?split_config.control_layout,
        "split_config_loaded"
    );

    let profiles = JsonProfileStore::new(paths.profiles_dir.clone());
    let mut coordinator = SessionCoordinator::new(split_config, Box::new(profiles));
    let hud = SharedHud::default();
    coordinator.add_collaborator(Box::new(HudCollaborator::new(Rc::clone(&hud))));

    if !cfg!(feature = "gamepad") {
        warn!("gamepad_support_disabled");
    }

    Ok(AppWiring {
        config: LoopConfig::default(),
        paths,
        coordinator,
        hud,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
