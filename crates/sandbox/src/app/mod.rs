pub(crate) mod bootstrap;
mod host_game;
mod hud;
pub(crate) mod loop_runner;
mod render;

use pixels::Error as PixelsError;
use thiserror::Error;
use twinview::compositor::SurfaceError;
use twinview::{ConfigError, StartupError};
use winit::error::{EventLoopError, OsError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize frame buffer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to allocate screen surface: {0}")]
    ScreenSurface(#[source] SurfaceError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}
