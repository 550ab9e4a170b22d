use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use pixels::{Pixels, SurfaceTexture};
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use twinview::compositor::{CameraRole, CameraState, RenderTarget, ViewportSurface};
#[cfg(feature = "gamepad")]
use twinview::input::GamepadPoller;
use twinview::input::RawPadState;
use twinview::{
    DeviceFrame, KeyboardState, PlayerIndex, SessionCoordinator, SessionState, Vec2,
};

use super::bootstrap::AppWiring;
use super::host_game::HostGame;
use super::hud::{draw_hud, HudState, SharedHud};
use super::render::{clear_for, draw_title_screen, draw_world, SceneGeometry, TitleView};
use super::AppError;

/// Profiles player 2 can pick from the title menu, bound to keys 1..=3.
pub(crate) const PROFILE_SLOTS: [&str; 3] = ["rowan", "ash", "wren"];
const WORLD_NAME: &str = "meadow";

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) window_title: String,
    pub(crate) window_width: u32,
    pub(crate) window_height: u32,
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "twinview sandbox".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
        }
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_app(app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_app(app: AppWiring) -> Result<(), AppError> {
    let AppWiring {
        config,
        paths,
        mut coordinator,
        hud,
    } = app;

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let size = window.inner_size();
    let mut screen = (size.width.max(1), size.height.max(1));
    let mut pixels =
        build_pixels(Arc::clone(&window), screen.0, screen.1).map_err(AppError::CreateRenderer)?;
    let mut screen_surface = ViewportSurface::allocate(PlayerIndex::First, screen.0, screen.1, 1)
        .map_err(AppError::ScreenSurface)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        "loop_config"
    );

    let mut host = HostGame::new(screen);
    let mut input = InputCollector::default();
    let mut geometry = SceneGeometry::default();
    let mut pads: Vec<RawPadState> = Vec::new();
    #[cfg(feature = "gamepad")]
    let mut gamepads = GamepadPoller::new();
    let mut last_pad_count: Option<usize> = None;
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_titled_state: Option<SessionState> = None;
    let window_for_loop = Arc::clone(&window);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if new_size.width == 0 || new_size.height == 0 {
                            return;
                        }
                        screen = (new_size.width, new_size.height);
                        if let Err(error) = resize_targets(
                            &window_for_loop,
                            &mut pixels,
                            &mut screen_surface,
                            screen,
                        ) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                            return;
                        }
                        host.set_screen_size(screen.0, screen.1);
                        coordinator.on_screen_resized(&mut host);
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        input.cursor_moved(position.x as f32, position.y as f32);
                    }
                    WindowEvent::CursorLeft { .. } => input.cursor_left(),
                    WindowEvent::MouseInput { state, button, .. } => {
                        input.handle_mouse_input(button, state);
                    }
                    WindowEvent::Focused(false) => input.keyboard.release_all(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if let PhysicalKey::Code(code) = event.physical_key {
                            input.handle_key(code, event.state);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        for command in input.take_commands() {
                            let outcome = apply_command(
                                command,
                                &mut host,
                                &mut coordinator,
                                &hud,
                                &screen_surface,
                                &paths.screenshots_dir,
                            );
                            if outcome == CommandOutcome::Quit {
                                info!(reason = "escape_key", "shutdown_requested");
                                window_target.exit();
                                return;
                            }
                        }

                        #[cfg(feature = "gamepad")]
                        gamepads.poll(&mut pads);
                        if last_pad_count != Some(pads.len()) {
                            for warning in coordinator.validate_devices(pads.len()) {
                                warn!(warning = ?warning, "input_device_warning");
                            }
                            last_pad_count = Some(pads.len());
                        }

                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;
                        accumulator =
                            accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

                        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                        for _ in 0..step_plan.ticks_to_run {
                            let pointer_delta = input.take_pointer_delta();
                            let frame = DeviceFrame {
                                keyboard: &input.keyboard,
                                pointer_delta,
                                controllers: &pads,
                            };
                            coordinator.begin_frame(&frame);
                            host.simulate(&mut coordinator, fixed_dt_seconds);
                            coordinator.late_update(&mut host, fixed_dt_seconds);
                            host.process_replays(&mut coordinator);
                        }
                        accumulator = step_plan.remaining_accumulator;
                        if step_plan.dropped_backlog > Duration::ZERO {
                            warn!(
                                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                                max_ticks_per_frame, "sim_clamp_triggered"
                            );
                        }

                        let health = coordinator
                            .second_character()
                            .and_then(|id| host.character_health(id))
                            .unwrap_or(0.0);
                        hud.borrow_mut().health = health;

                        render_frame(
                            &host,
                            &mut coordinator,
                            &hud,
                            &mut geometry,
                            &mut screen_surface,
                            pixels.frame_mut(),
                            screen,
                        );
                        if let Err(error) = pixels.render() {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                            return;
                        }
                        coordinator.frame_presented(&mut host);

                        let state = coordinator.state();
                        if last_titled_state != Some(state) {
                            window_for_loop.set_title(&format!("{} [{}]", config.window_title, state));
                            last_titled_state = Some(state);
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window_for_loop.request_redraw();
            }
            Event::LoopExiting => {
                coordinator.on_host_shutdown(&mut host);
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn build_pixels(window: Arc<Window>, width: u32, height: u32) -> Result<Pixels<'static>, pixels::Error> {
    let surface = SurfaceTexture::new(width, height, window);
    Pixels::new(width, height, surface)
}

fn resize_targets(
    window: &Arc<Window>,
    pixels: &mut Pixels<'static>,
    screen_surface: &mut ViewportSurface,
    screen: (u32, u32),
) -> Result<(), AppError> {
    *pixels =
        build_pixels(Arc::clone(window), screen.0, screen.1).map_err(AppError::CreateRenderer)?;
    screen_surface
        .resize(screen.0, screen.1)
        .map_err(AppError::ScreenSurface)
}

/// Menu and debug keys, edge-triggered once per press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCommand {
    ToggleSplit,
    PickSecondProfile(usize),
    CancelSelection,
    EnterWorld,
    Back,
    ToggleInventory,
    Screenshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandOutcome {
    Continue,
    Quit,
}

fn apply_command(
    command: HostCommand,
    host: &mut HostGame,
    coordinator: &mut SessionCoordinator,
    hud: &SharedHud,
    screen_surface: &ViewportSurface,
    screenshots_dir: &Path,
) -> CommandOutcome {
    match command {
        HostCommand::ToggleSplit => {
            coordinator.toggle(host);
        }
        HostCommand::PickSecondProfile(slot) => {
            let Some(name) = PROFILE_SLOTS.get(slot) else {
                return CommandOutcome::Continue;
            };
            if let Err(error) = coordinator.select_second_character(host, name) {
                warn!(profile = *name, error = %error, "second_profile_rejected");
            }
        }
        HostCommand::CancelSelection => {
            coordinator.cancel_selection(host);
        }
        HostCommand::EnterWorld => {
            if host.world_name().is_none() {
                host.request_world_entry(coordinator, WORLD_NAME);
            }
        }
        HostCommand::Back => {
            if host.world_name().is_none() {
                return CommandOutcome::Quit;
            }
            host.leave_world(coordinator);
        }
        HostCommand::ToggleInventory => {
            let mut state = hud.borrow_mut();
            if state.anchor.is_some() {
                state.inventory_open = !state.inventory_open;
                info!(open = state.inventory_open, "inventory_toggled");
            }
        }
        HostCommand::Screenshot => save_screenshot(screen_surface, screenshots_dir),
    }
    CommandOutcome::Continue
}

fn save_screenshot(surface: &ViewportSurface, dir: &Path) {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let path = dir.join(format!("twinview-{stamp}.png"));
    match image::save_buffer(
        &path,
        surface.color(),
        surface.width(),
        surface.height(),
        image::ColorType::Rgba8,
    ) {
        Ok(()) => info!(path = %path.display(), "screenshot_saved"),
        Err(error) => warn!(path = %path.display(), error = %error, "screenshot_failed"),
    }
}

/// Draw the title menu or every camera in depth order, then present into
/// `frame`. The screen surface always ends up holding what was shown.
fn render_frame(
    host: &HostGame,
    coordinator: &mut SessionCoordinator,
    hud: &SharedHud,
    geometry: &mut SceneGeometry,
    screen_surface: &mut ViewportSurface,
    frame: &mut [u8],
    screen: (u32, u32),
) {
    if host.world_name().is_none() {
        draw_title_screen(&title_view(coordinator), screen_surface);
        copy_into_frame(screen_surface.color(), frame);
        return;
    }

    host.build_geometry(coordinator.second_character(), geometry);
    let hud_state = hud.borrow();
    let mut composited = false;
    for camera in host.cameras_by_depth() {
        if camera.role == CameraRole::Compositor {
            coordinator.composite(frame, screen);
            composited = true;
            continue;
        }
        let target = match camera.target {
            RenderTarget::Screen => Some(&mut *screen_surface),
            RenderTarget::Surface(player) => coordinator.surface_mut(player),
        };
        let Some(target) = target else {
            continue;
        };
        draw_camera(&camera, geometry, &hud_state, target);
    }

    if composited {
        copy_from_frame(frame, screen_surface.color_mut());
    } else {
        copy_into_frame(screen_surface.color(), frame);
    }
}

fn draw_camera(
    camera: &CameraState,
    geometry: &SceneGeometry,
    hud: &HudState,
    target: &mut ViewportSurface,
) {
    clear_for(camera, target);
    match camera.role {
        CameraRole::World => draw_world(camera, geometry, target),
        CameraRole::Ui => {
            let hud_layer = hud.anchor.map(|anchor| anchor.layer);
            if hud_layer.is_some_and(|layer| camera.culling_mask.contains(layer)) {
                draw_hud(hud, target);
            }
        }
        CameraRole::Sky | CameraRole::Compositor => {}
    }
}

fn title_view(coordinator: &SessionCoordinator) -> TitleView {
    let session = coordinator.session();
    TitleView {
        split: session
            .split_enabled()
            .then_some(coordinator.config().orientation),
        chosen_slot: session
            .pending_second_profile()
            .and_then(|name| PROFILE_SLOTS.iter().position(|slot| *slot == name)),
        slots: PROFILE_SLOTS.len(),
        awaiting_pick: session.state() == SessionState::AwaitingP2Character,
    }
}

fn copy_into_frame(source: &[u8], frame: &mut [u8]) {
    let len = source.len().min(frame.len());
    frame[..len].copy_from_slice(&source[..len]);
}

fn copy_from_frame(frame: &[u8], target: &mut [u8]) {
    let len = frame.len().min(target.len());
    target[..len].copy_from_slice(&frame[..len]);
}

#[derive(Debug, Default)]
struct InputCollector {
    keyboard: KeyboardState,
    last_cursor_px: Option<(f32, f32)>,
    pointer_delta: Vec2,
    pending_commands: Vec<HostCommand>,
}

impl InputCollector {
    fn handle_key(&mut self, code: KeyCode, state: ElementState) {
        let is_down = state == ElementState::Pressed;
        let was_down = self.keyboard.is_held(code);
        self.keyboard.set_key(code, is_down);
        if is_down && !was_down {
            if let Some(command) = command_for_key(code) {
                self.pending_commands.push(command);
            }
        }
    }

    fn handle_mouse_input(&mut self, button: MouseButton, state: ElementState) {
        let is_down = state == ElementState::Pressed;
        match button {
            MouseButton::Left => self.keyboard.set_primary_button(is_down),
            MouseButton::Right => self.keyboard.set_secondary_button(is_down),
            _ => {}
        }
    }

    fn cursor_moved(&mut self, x: f32, y: f32) {
        if let Some((last_x, last_y)) = self.last_cursor_px {
            self.pointer_delta = self.pointer_delta + Vec2::new(x - last_x, y - last_y);
        }
        self.last_cursor_px = Some((x, y));
    }

    fn cursor_left(&mut self) {
        self.last_cursor_px = None;
    }

    /// Pointer motion accumulated since the last call.
    fn take_pointer_delta(&mut self) -> Vec2 {
        std::mem::replace(&mut self.pointer_delta, Vec2::ZERO)
    }

    fn take_commands(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.pending_commands)
    }
}

fn command_for_key(code: KeyCode) -> Option<HostCommand> {
    match code {
        KeyCode::F2 => Some(HostCommand::ToggleSplit),
        KeyCode::Digit1 => Some(HostCommand::PickSecondProfile(0)),
        KeyCode::Digit2 => Some(HostCommand::PickSecondProfile(1)),
        KeyCode::Digit3 => Some(HostCommand::PickSecondProfile(2)),
        KeyCode::Backspace => Some(HostCommand::CancelSelection),
        KeyCode::Enter => Some(HostCommand::EnterWorld),
        KeyCode::Escape => Some(HostCommand::Back),
        KeyCode::F3 => Some(HostCommand::ToggleInventory),
        KeyCode::F12 => Some(HostCommand::Screenshot),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinview::{MemoryProfileStore, SplitConfig, SplitOrientation};

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(SplitConfig::default(), Box::new(MemoryProfileStore::default()))
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(48), Duration::from_millis(16), 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn held_toggle_key_does_not_repeat_commands() {
        let mut input = InputCollector::default();

        input.handle_key(KeyCode::F2, ElementState::Pressed);
        input.handle_key(KeyCode::F2, ElementState::Pressed);
        assert_eq!(input.take_commands(), vec![HostCommand::ToggleSplit]);

        input.handle_key(KeyCode::F2, ElementState::Released);
        input.handle_key(KeyCode::F2, ElementState::Pressed);
        assert_eq!(input.take_commands(), vec![HostCommand::ToggleSplit]);
        assert!(input.take_commands().is_empty());
    }

    #[test]
    fn movement_keys_reach_keyboard_state_without_commands() {
        let mut input = InputCollector::default();
        input.handle_key(KeyCode::KeyW, ElementState::Pressed);

        assert!(input.keyboard.is_held(KeyCode::KeyW));
        assert!(input.take_commands().is_empty());
    }

    #[test]
    fn pointer_delta_accumulates_and_resets_on_take() {
        let mut input = InputCollector::default();
        input.cursor_moved(100.0, 100.0);
        input.cursor_moved(110.0, 95.0);
        input.cursor_moved(112.0, 95.0);

        assert_eq!(input.take_pointer_delta(), Vec2::new(12.0, -5.0));
        assert_eq!(input.take_pointer_delta(), Vec2::ZERO);
    }

    #[test]
    fn cursor_reentry_does_not_jump() {
        let mut input = InputCollector::default();
        input.cursor_moved(10.0, 10.0);
        input.cursor_left();
        input.cursor_moved(500.0, 300.0);

        assert_eq!(input.take_pointer_delta(), Vec2::ZERO);
    }

    #[test]
    fn title_view_marks_the_pending_pick() {
        let mut host = HostGame::new((320, 180));
        let mut coordinator = coordinator();
        assert_eq!(title_view(&coordinator).split, None);

        coordinator.toggle(&mut host);
        coordinator
            .select_second_character(&mut host, "ash")
            .expect("valid profile");

        let view = title_view(&coordinator);
        assert_eq!(view.split, Some(SplitOrientation::Horizontal));
        assert_eq!(view.chosen_slot, Some(1));
        assert!(!view.awaiting_pick);
    }

    #[test]
    fn escape_on_title_quits_and_in_world_leaves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut host = HostGame::new((320, 180));
        let mut coordinator = coordinator();
        let hud = SharedHud::default();
        let surface =
            ViewportSurface::allocate(PlayerIndex::First, 320, 180, 1).expect("surface");

        let mut run = |command, host: &mut HostGame, coordinator: &mut SessionCoordinator| {
            apply_command(command, host, coordinator, &hud, &surface, dir.path())
        };

        assert_eq!(run(HostCommand::EnterWorld, &mut host, &mut coordinator), CommandOutcome::Continue);
        assert_eq!(host.world_name(), Some(WORLD_NAME));
        assert_eq!(run(HostCommand::Back, &mut host, &mut coordinator), CommandOutcome::Continue);
        assert_eq!(host.world_name(), None);
        assert_eq!(run(HostCommand::Back, &mut host, &mut coordinator), CommandOutcome::Quit);
    }

    #[test]
    fn screenshot_writes_a_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let surface = ViewportSurface::allocate(PlayerIndex::First, 8, 4, 1).expect("surface");

        save_screenshot(&surface, dir.path());

        let written: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0].path().extension().and_then(|ext| ext.to_str()),
            Some("png")
        );
    }
}
