use crate::host::{LayerIndex, LayerMask};
use crate::math::Vec3;
use crate::player::PlayerIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraRole {
    World,
    Sky,
    Ui,
    /// Draws nothing itself; clears the screen and runs the final blit.
    Compositor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            up: Vec3::UP,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderTarget {
    #[default]
    Screen,
    Surface(PlayerIndex),
}

/// Normalized viewport relative to the camera's render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub const FULL: ViewportRect = ViewportRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

impl Default for ViewportRect {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearMode {
    Sky,
    SolidColor([u8; 4]),
    DepthOnly,
    Nothing,
}

/// Tunable post-processing carried by a world camera. Plain data so the
/// second rig gets a field-for-field copy of player 0's look.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessSettings {
    pub exposure: f32,
    pub saturation: f32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub vignette: f32,
    pub fog_density: f32,
    pub fog_color: [u8; 3],
    pub ambient_occlusion: bool,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            saturation: 1.0,
            bloom_intensity: 0.0,
            bloom_threshold: 1.0,
            vignette: 0.0,
            fog_density: 0.0,
            fog_color: [180, 190, 200],
            ambient_occlusion: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub role: CameraRole,
    pub transform: CameraTransform,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub target: RenderTarget,
    pub viewport: ViewportRect,
    pub culling_mask: LayerMask,
    pub clear: ClearMode,
    /// Higher renders later.
    pub depth: i32,
    pub post: PostProcessSettings,
    pub enabled: bool,
}

impl CameraState {
    pub fn world() -> Self {
        Self {
            role: CameraRole::World,
            transform: CameraTransform::default(),
            fov_degrees: 60.0,
            near: 0.1,
            far: 500.0,
            target: RenderTarget::Screen,
            viewport: ViewportRect::FULL,
            culling_mask: LayerMask::ALL,
            clear: ClearMode::Sky,
            depth: 0,
            post: PostProcessSettings::default(),
            enabled: true,
        }
    }

    /// Interface-only camera drawing a single layer over a surface.
    pub fn ui(layer: LayerIndex, target: RenderTarget, depth: i32) -> Self {
        Self {
            role: CameraRole::Ui,
            culling_mask: LayerMask::single(layer),
            clear: ClearMode::DepthOnly,
            target,
            depth,
            ..Self::world()
        }
    }

    pub fn compositor(depth: i32) -> Self {
        Self {
            role: CameraRole::Compositor,
            culling_mask: LayerMask::EMPTY,
            clear: ClearMode::SolidColor([0, 0, 0, 255]),
            target: RenderTarget::Screen,
            depth,
            ..Self::world()
        }
    }
}

/// The parts of a host camera the compositor changes, so they can be put
/// back exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedCameraState {
    pub target: RenderTarget,
    pub viewport: ViewportRect,
    pub culling_mask: LayerMask,
    pub fov_degrees: f32,
}

impl SavedCameraState {
    pub fn capture(state: &CameraState) -> Self {
        Self {
            target: state.target,
            viewport: state.viewport,
            culling_mask: state.culling_mask,
            fov_degrees: state.fov_degrees,
        }
    }

    pub fn restore_into(&self, state: &mut CameraState) {
        state.target = self.target;
        state.viewport = self.viewport;
        state.culling_mask = self.culling_mask;
        state.fov_degrees = self.fov_degrees;
    }

    /// True if `state` already matches these fields.
    pub fn matches(&self, state: &CameraState) -> bool {
        *self == Self::capture(state)
    }
}
