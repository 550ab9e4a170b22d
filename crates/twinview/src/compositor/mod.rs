mod blit;
mod camera;
mod follow;
mod layers;
mod layout;
mod surface;

pub use blit::{composite_into, DIVIDER_COLOR};
pub use camera::{
    CameraRole, CameraState, CameraTransform, ClearMode, PostProcessSettings, RenderTarget,
    SavedCameraState, ViewportRect,
};
pub use follow::{FollowCamera, FollowSettings};
pub use layers::{pick_second_ui_layer, DEFAULT_UI_LAYER};
pub use layout::{divider_rect, split_rects, SplitOrientation, SurfaceRect};
pub use surface::{SurfaceCameras, SurfaceError, ViewportSurface, MAX_SURFACE_DIMENSION};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::host::{CameraHost, CameraId, CharacterPose, Host, LayerIndex, LayerMask};
use crate::math::Vec2;
use crate::player::PlayerIndex;
use crate::presentation::UiAnchor;

/// Draw order offsets relative to the host's principal camera.
const UI_DEPTH_OFFSET: i32 = 10;
const COMPOSITOR_DEPTH_OFFSET: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositorError {
    #[error("host has no principal camera yet")]
    MissingPrincipalCamera,
    #[error("camera {0:?} disappeared while redirected")]
    CameraVanished(CameraId),
    #[error("no free render layer left for the second player's interface")]
    NoFreeLayer,
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl CompositorError {
    /// Worth retrying later without tearing anything else down.
    pub fn is_precondition(&self) -> bool {
        matches!(self, CompositorError::MissingPrincipalCamera)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorSettings {
    pub orientation: SplitOrientation,
    pub field_of_view: [f32; 2],
    pub anti_aliasing: u8,
    pub divider_width_px: u32,
    pub follow: FollowSettings,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            orientation: SplitOrientation::Horizontal,
            field_of_view: [60.0, 60.0],
            anti_aliasing: 1,
            divider_width_px: 4,
            follow: FollowSettings::default(),
        }
    }
}

/// A host camera we pointed at player 1's surface.
#[derive(Debug, Clone, Copy)]
struct RedirectedCamera {
    id: CameraId,
    saved: SavedCameraState,
    desired: SavedCameraState,
}

#[derive(Debug)]
struct ActiveComposition {
    screen: (u32, u32),
    surfaces: [ViewportSurface; 2],
    cameras: [SurfaceCameras; 2],
    ui_layers: [LayerIndex; 2],
    redirected: Vec<RedirectedCamera>,
    /// Everything we created, in creation order.
    created: Vec<CameraId>,
    follow: FollowCamera,
}

/// Partially built composition, rolled back if activation fails midway.
#[derive(Debug, Default)]
struct Build {
    redirected: Vec<RedirectedCamera>,
    created: Vec<CameraId>,
}

impl Build {
    fn redirect<H: CameraHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: CameraId,
        desired: SavedCameraState,
    ) -> Result<(), CompositorError> {
        let state = host
            .camera_mut(id)
            .ok_or(CompositorError::CameraVanished(id))?;
        let saved = SavedCameraState::capture(state);
        desired.restore_into(state);
        self.redirected.push(RedirectedCamera { id, saved, desired });
        Ok(())
    }

    fn create<H: CameraHost + ?Sized>(&mut self, host: &mut H, state: CameraState) -> CameraId {
        let id = host.create_camera(state);
        self.created.push(id);
        id
    }

    fn rollback<H: CameraHost + ?Sized>(self, host: &mut H) {
        for redirected in self.redirected.iter().rev() {
            if let Some(state) = host.camera_mut(redirected.id) {
                redirected.saved.restore_into(state);
            }
        }
        for id in self.created.into_iter().rev() {
            host.destroy_camera(id);
        }
    }
}

#[derive(Debug, Default)]
pub struct Compositor {
    settings: CompositorSettings,
    active: Option<ActiveComposition>,
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self {
            settings,
            active: None,
        }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Redirect player 1's cameras into surface 0, build player 2's rig on
    /// surface 1 and add the compositor camera. Either everything is in
    /// place afterwards or nothing is.
    pub fn activate<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<(), CompositorError> {
        if self.active.is_some() {
            return Ok(());
        }

        let principal = host
            .principal_camera()
            .ok_or(CompositorError::MissingPrincipalCamera)?;
        let template = host
            .camera(principal)
            .cloned()
            .ok_or(CompositorError::MissingPrincipalCamera)?;
        let sky = host
            .sky_camera()
            .and_then(|id| host.camera(id).cloned().map(|state| (id, state)));

        let screen = host.screen_size();
        let surfaces = self.allocate_surfaces(screen)?;
        let first_ui = host.ui_layer();
        let second_ui = pick_second_ui_layer(host.used_layers(), first_ui)
            .ok_or(CompositorError::NoFreeLayer)?;
        let ui_layers = [first_ui, second_ui];
        let interface_layers = LayerMask::single(first_ui).with(second_ui);

        let mut build = Build::default();
        let result = self.build_rig(
            host,
            &mut build,
            principal,
            &template,
            sky.as_ref(),
            ui_layers,
            interface_layers,
        );
        let cameras = match result {
            Ok(cameras) => cameras,
            Err(error) => {
                build.rollback(host);
                return Err(error);
            }
        };

        info!(
            orientation = ?self.settings.orientation,
            screen_width = screen.0,
            screen_height = screen.1,
            first = ?surfaces[0].size(),
            second = ?surfaces[1].size(),
            second_ui_layer = second_ui.0,
            created_cameras = build.created.len(),
            "compositor_activated"
        );
        self.active = Some(ActiveComposition {
            screen,
            surfaces,
            cameras,
            ui_layers,
            redirected: build.redirected,
            created: build.created,
            follow: FollowCamera::default(),
        });
        Ok(())
    }

    fn allocate_surfaces(&self, screen: (u32, u32)) -> Result<[ViewportSurface; 2], CompositorError> {
        let rects = split_rects(self.settings.orientation, screen.0, screen.1);
        let first = ViewportSurface::allocate(
            PlayerIndex::First,
            rects[0].width,
            rects[0].height,
            self.settings.anti_aliasing,
        )?;
        let second = ViewportSurface::allocate(
            PlayerIndex::Second,
            rects[1].width,
            rects[1].height,
            self.settings.anti_aliasing,
        )?;
        Ok([first, second])
    }

    #[allow(clippy::too_many_arguments)]
    fn build_rig<H: Host + ?Sized>(
        &self,
        host: &mut H,
        build: &mut Build,
        principal: CameraId,
        template: &CameraState,
        sky: Option<&(CameraId, CameraState)>,
        ui_layers: [LayerIndex; 2],
        interface_layers: LayerMask,
    ) -> Result<[SurfaceCameras; 2], CompositorError> {
        let fov = self.settings.field_of_view;
        let world_mask = LayerMask(template.culling_mask.0 & !interface_layers.0);
        let surface_view = |player: PlayerIndex, mask: LayerMask, fov_degrees: f32| SavedCameraState {
            target: RenderTarget::Surface(player),
            viewport: ViewportRect::FULL,
            culling_mask: mask,
            fov_degrees,
        };

        build.redirect(
            host,
            principal,
            surface_view(PlayerIndex::First, world_mask, fov[0]),
        )?;
        let first_sky = match sky {
            Some((id, state)) => {
                let mask = LayerMask(state.culling_mask.0 & !interface_layers.0);
                build.redirect(host, *id, surface_view(PlayerIndex::First, mask, fov[0]))?;
                Some(*id)
            }
            None => None,
        };
        let ui_depth = template.depth + UI_DEPTH_OFFSET;
        let first_ui = build.create(
            host,
            CameraState::ui(ui_layers[0], RenderTarget::Surface(PlayerIndex::First), ui_depth),
        );

        // Player 2's rig is a value copy of player 1's camera, so its
        // post-processing matches field for field.
        let mut second_world = template.clone();
        surface_view(PlayerIndex::Second, world_mask, fov[1]).restore_into(&mut second_world);
        let second_world = build.create(host, second_world);

        let second_sky = sky.map(|(_, state)| {
            let mut copy = state.clone();
            let mask = LayerMask(state.culling_mask.0 & !interface_layers.0);
            surface_view(PlayerIndex::Second, mask, fov[1]).restore_into(&mut copy);
            build.create(host, copy)
        });
        let second_ui = build.create(
            host,
            CameraState::ui(ui_layers[1], RenderTarget::Surface(PlayerIndex::Second), ui_depth),
        );

        build.create(host, CameraState::compositor(template.depth + COMPOSITOR_DEPTH_OFFSET));

        Ok([
            SurfaceCameras {
                world: principal,
                sky: first_sky,
                ui: first_ui,
            },
            SurfaceCameras {
                world: second_world,
                sky: second_sky,
                ui: second_ui,
            },
        ])
    }

    /// Put player 1's cameras back and destroy everything we created.
    /// Safe to call when inactive.
    pub fn deactivate<H: CameraHost + ?Sized>(&mut self, host: &mut H) {
        let Some(active) = self.active.take() else {
            return;
        };
        for redirected in active.redirected.iter().rev() {
            match host.camera_mut(redirected.id) {
                Some(state) => redirected.saved.restore_into(state),
                None => debug!(camera = ?redirected.id, "compositor_restore_skipped_missing_camera"),
            }
        }
        for id in active.created.iter().rev() {
            host.destroy_camera(*id);
        }
        info!(destroyed_cameras = active.created.len(), "compositor_deactivated");
    }

    /// Re-assert the redirection the host may have reset this frame and
    /// follow screen size changes. Failures are reported for this frame
    /// only; the next call tries again.
    pub fn maintain<H: CameraHost + ?Sized>(&mut self, host: &mut H) -> Result<usize, CompositorError> {
        let screen = host.screen_size();
        let resized = self
            .active
            .as_ref()
            .is_some_and(|active| active.screen != screen);
        if resized {
            self.resize(screen)?;
        }
        let Some(active) = self.active.as_ref() else {
            return Ok(0);
        };

        let mut reasserted = 0;
        for redirected in &active.redirected {
            let state = host
                .camera_mut(redirected.id)
                .ok_or(CompositorError::CameraVanished(redirected.id))?;
            if !redirected.desired.matches(state) {
                redirected.desired.restore_into(state);
                reasserted += 1;
            }
        }
        if reasserted > 0 {
            debug!(cameras = reasserted, "compositor_redirect_reasserted");
        }
        Ok(reasserted)
    }

    /// Move player 2's world and sky cameras after both characters have
    /// simulated this frame.
    pub fn late_update<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        second_pose: Option<CharacterPose>,
        look: Vec2,
        dt_seconds: f32,
    ) {
        let settings = self.settings.follow;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(pose) = second_pose else {
            return;
        };
        let transform = active
            .follow
            .update(&settings, &pose, look, dt_seconds, &*host);
        let cameras = active.cameras[PlayerIndex::Second.index()];
        for id in [Some(cameras.world), cameras.sky].into_iter().flatten() {
            if let Some(state) = host.camera_mut(id) {
                state.transform = transform;
            }
        }
    }

    /// Snap player 2's camera next frame instead of easing in from the old
    /// spot, e.g. after a respawn.
    pub fn reset_follow(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.follow.reset();
        }
    }

    pub fn resize(&mut self, screen: (u32, u32)) -> Result<(), CompositorError> {
        let orientation = self.settings.orientation;
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let rects = split_rects(orientation, screen.0, screen.1);
        for (surface, rect) in active.surfaces.iter_mut().zip(rects) {
            surface.resize(rect.width, rect.height)?;
        }
        active.screen = screen;
        info!(
            screen_width = screen.0,
            screen_height = screen.1,
            first = ?active.surfaces[0].size(),
            second = ?active.surfaces[1].size(),
            "compositor_resized"
        );
        Ok(())
    }

    /// Final blit into the RGBA8 screen frame.
    pub fn composite(&self, frame: &mut [u8], screen: (u32, u32)) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let [first, second] = &active.surfaces;
        if frame.len() < screen.0 as usize * screen.1 as usize * 4 {
            warn!(
                frame_len = frame.len(),
                screen_width = screen.0,
                screen_height = screen.1,
                "composite_frame_too_small"
            );
        }
        composite_into(
            frame,
            screen,
            self.settings.orientation,
            [first, second],
            self.settings.divider_width_px,
        );
    }

    pub fn surface(&self, player: PlayerIndex) -> Option<&ViewportSurface> {
        self.active
            .as_ref()
            .map(|active| &active.surfaces[player.index()])
    }

    pub fn surface_mut(&mut self, player: PlayerIndex) -> Option<&mut ViewportSurface> {
        self.active
            .as_mut()
            .map(|active| &mut active.surfaces[player.index()])
    }

    pub fn cameras(&self, player: PlayerIndex) -> Option<SurfaceCameras> {
        self.active
            .as_ref()
            .map(|active| active.cameras[player.index()])
    }

    pub fn ui_anchor(&self, player: PlayerIndex) -> Option<UiAnchor> {
        let active = self.active.as_ref()?;
        let surface = &active.surfaces[player.index()];
        Some(UiAnchor {
            player,
            ui_camera: active.cameras[player.index()].ui,
            layer: active.ui_layers[player.index()],
            width: surface.width(),
            height: surface.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;

    fn compositor() -> Compositor {
        Compositor::new(CompositorSettings {
            field_of_view: [55.0, 70.0],
            ..CompositorSettings::default()
        })
    }

    #[test]
    fn activation_redirects_player_one_and_builds_second_rig() {
        let mut host = FakeHost::in_world(1920, 1080);
        let principal = host.principal.expect("principal");
        let before = host.cameras.len();
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");

        let state = host.camera(principal).expect("principal state");
        assert_eq!(state.target, RenderTarget::Surface(PlayerIndex::First));
        assert_eq!(state.viewport, ViewportRect::FULL);
        assert_eq!(state.fov_degrees, 55.0);

        // ui0, world1, sky1, ui1 and the compositor camera.
        assert_eq!(host.cameras.len(), before + 5);
        let second = compositor.cameras(PlayerIndex::Second).expect("second rig");
        let world = host.camera(second.world).expect("second world");
        assert_eq!(world.target, RenderTarget::Surface(PlayerIndex::Second));
        assert_eq!(world.fov_degrees, 70.0);

        let surfaces = [PlayerIndex::First, PlayerIndex::Second]
            .map(|player| compositor.surface(player).expect("surface").size());
        assert_eq!(surfaces, [(1920, 540), (1920, 540)]);
    }

    #[test]
    fn post_processing_is_copied_to_second_rig() {
        let mut host = FakeHost::in_world(640, 480);
        let principal = host.principal.expect("principal");
        host.camera_mut(principal).expect("principal").post.bloom_intensity = 0.8;
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        let second = compositor.cameras(PlayerIndex::Second).expect("second rig");
        assert_eq!(host.camera(second.world).expect("world").post.bloom_intensity, 0.8);
    }

    #[test]
    fn compositor_camera_renders_last_with_empty_mask() {
        let mut host = FakeHost::in_world(640, 480);
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        let last = host
            .cameras
            .values()
            .max_by_key(|state| state.depth)
            .expect("cameras");
        assert_eq!(last.role, CameraRole::Compositor);
        assert!(last.culling_mask.is_empty());
        assert_eq!(last.target, RenderTarget::Screen);
    }

    #[test]
    fn interface_layers_never_overlap() {
        let mut host = FakeHost::in_world(640, 480);
        host.used = LayerMask::single(LayerIndex(31));
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        let first = compositor.ui_anchor(PlayerIndex::First).expect("anchor");
        let second = compositor.ui_anchor(PlayerIndex::Second).expect("anchor");
        assert_ne!(first.layer, second.layer);
        assert_eq!(second.layer, LayerIndex(30));

        let first_world = compositor.cameras(PlayerIndex::First).expect("rig").world;
        let mask = host.camera(first_world).expect("world").culling_mask;
        assert!(!mask.contains(second.layer));
    }

    #[test]
    fn missing_principal_camera_allocates_nothing() {
        let mut host = FakeHost::in_world(640, 480);
        host.principal = None;
        let before = host.cameras.len();
        let mut compositor = compositor();
        let error = compositor.activate(&mut host).expect_err("no camera");
        assert_eq!(error, CompositorError::MissingPrincipalCamera);
        assert!(error.is_precondition());
        assert!(!compositor.is_active());
        assert_eq!(host.cameras.len(), before);
    }

    #[test]
    fn invalid_anti_aliasing_is_a_resource_failure() {
        let mut host = FakeHost::in_world(640, 480);
        let mut compositor = Compositor::new(CompositorSettings {
            anti_aliasing: 3,
            ..CompositorSettings::default()
        });
        let error = compositor.activate(&mut host).expect_err("bad aa");
        assert!(!error.is_precondition());
        assert_eq!(host.created, 0);
    }

    #[test]
    fn vanished_sky_camera_rolls_back_partial_rig() {
        let mut host = FakeHost::in_world(640, 480);
        let principal = host.principal.expect("principal");
        let original = host.camera(principal).cloned().expect("principal");
        host.sky_vanishes_on_mutate = true;
        let before = host.cameras.len();
        let mut compositor = compositor();
        let error = compositor.activate(&mut host).expect_err("sky vanished");
        assert!(matches!(error, CompositorError::CameraVanished(_)));
        assert_eq!(host.cameras.len(), before);
        assert_eq!(host.camera(principal), Some(&original));
    }

    #[test]
    fn deactivate_restores_and_destroys() {
        let mut host = FakeHost::in_world(800, 600);
        let principal = host.principal.expect("principal");
        let original = host.camera(principal).cloned().expect("principal");
        let before = host.cameras.len();
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        compositor.deactivate(&mut host);
        assert_eq!(host.cameras.len(), before);
        assert_eq!(host.camera(principal), Some(&original));
        assert!(compositor.surface(PlayerIndex::First).is_none());
        // Second call is a no-op.
        compositor.deactivate(&mut host);
    }

    #[test]
    fn maintain_reasserts_after_host_reset() {
        let mut host = FakeHost::in_world(800, 600);
        let principal = host.principal.expect("principal");
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        assert_eq!(compositor.maintain(&mut host), Ok(0));

        host.camera_mut(principal).expect("principal").target = RenderTarget::Screen;
        assert_eq!(compositor.maintain(&mut host), Ok(1));
        assert_eq!(
            host.camera(principal).expect("principal").target,
            RenderTarget::Surface(PlayerIndex::First)
        );
    }

    #[test]
    fn maintain_follows_screen_resize() {
        let mut host = FakeHost::in_world(800, 600);
        let mut compositor = Compositor::new(CompositorSettings {
            orientation: SplitOrientation::Vertical,
            ..CompositorSettings::default()
        });
        compositor.activate(&mut host).expect("activate");
        host.screen = (1001, 500);
        compositor.maintain(&mut host).expect("maintain");
        assert_eq!(compositor.surface(PlayerIndex::First).expect("s").size(), (500, 500));
        assert_eq!(compositor.surface(PlayerIndex::Second).expect("s").size(), (501, 500));
    }

    #[test]
    fn degenerate_screen_still_activates_with_one_pixel_surfaces() {
        let mut host = FakeHost::in_world(0, 0);
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        assert_eq!(compositor.surface(PlayerIndex::Second).expect("s").size(), (1, 1));
    }

    #[test]
    fn late_update_moves_second_world_camera() {
        let mut host = FakeHost::in_world(800, 600);
        let mut compositor = compositor();
        compositor.activate(&mut host).expect("activate");
        let second = compositor.cameras(PlayerIndex::Second).expect("rig").world;
        let pose = FakeHost::pose_at(crate::math::Vec3::new(5.0, 0.0, 5.0));
        compositor.late_update(&mut host, Some(pose), Vec2::ZERO, 1.0 / 60.0);
        let position = host.camera(second).expect("world").transform.position;
        assert!(position.distance(pose.eye_point) > 1.0);
    }
}
