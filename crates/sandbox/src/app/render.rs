use twinview::compositor::{split_rects, CameraState, ClearMode, SplitOrientation, ViewportSurface};
use twinview::host::LayerIndex;
use twinview::math::Basis;
use twinview::Vec3;

const SKY_TOP_COLOR: [u8; 4] = [70, 110, 170, 255];
const SKY_HORIZON_COLOR: [u8; 4] = [170, 196, 220, 255];
const MIN_NEAR_PLANE: f32 = 0.01;
const TITLE_COLOR: [u8; 4] = [28, 30, 40, 255];
const TITLE_SECOND_COLOR: [u8; 4] = [34, 44, 58, 255];
const TITLE_AWAITING_COLOR: [u8; 4] = [66, 46, 34, 255];
const SLOT_COLOR: [u8; 4] = [90, 96, 110, 255];
const SLOT_CHOSEN_COLOR: [u8; 4] = [80, 230, 230, 255];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    pub(crate) a: Vec3,
    pub(crate) b: Vec3,
    pub(crate) color: [u8; 4],
    pub(crate) layer: LayerIndex,
}

/// Screen-facing square, for characters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Marker {
    pub(crate) position: Vec3,
    pub(crate) half_size: f32,
    pub(crate) color: [u8; 4],
    pub(crate) layer: LayerIndex,
}

#[derive(Debug, Default)]
pub(crate) struct SceneGeometry {
    pub(crate) segments: Vec<Segment>,
    pub(crate) markers: Vec<Marker>,
}

impl SceneGeometry {
    pub(crate) fn clear(&mut self) {
        self.segments.clear();
        self.markers.clear();
    }

    pub(crate) fn line(&mut self, a: Vec3, b: Vec3, color: [u8; 4], layer: LayerIndex) {
        self.segments.push(Segment { a, b, color, layer });
    }

    /// Axis-aligned box outline.
    pub(crate) fn cuboid(&mut self, min: Vec3, max: Vec3, color: [u8; 4], layer: LayerIndex) {
        let corner = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };
        for &(a, b) in &[
            ((false, false, false), (true, false, false)),
            ((false, false, true), (true, false, true)),
            ((false, true, false), (true, true, false)),
            ((false, true, true), (true, true, true)),
            ((false, false, false), (false, true, false)),
            ((true, false, false), (true, true, false)),
            ((false, false, true), (false, true, true)),
            ((true, false, true), (true, true, true)),
            ((false, false, false), (false, false, true)),
            ((true, false, false), (true, false, true)),
            ((false, true, false), (false, true, true)),
            ((true, true, false), (true, true, true)),
        ] {
            self.line(corner(a.0, a.1, a.2), corner(b.0, b.1, b.2), color, layer);
        }
    }
}

/// Pinhole projection for one camera into one pixel rectangle.
struct Projector {
    basis: Basis,
    origin: Vec3,
    focal_px: f32,
    center: (f32, f32),
    near: f32,
    far: f32,
    bounds: (u32, u32, u32, u32),
}

impl Projector {
    fn new(camera: &CameraState, surface_width: u32, surface_height: u32) -> Self {
        let viewport = camera.viewport;
        let x0 = (viewport.x * surface_width as f32).round().max(0.0) as u32;
        let y0 = (viewport.y * surface_height as f32).round().max(0.0) as u32;
        let x1 = ((viewport.x + viewport.width) * surface_width as f32)
            .round()
            .clamp(0.0, surface_width as f32) as u32;
        let y1 = ((viewport.y + viewport.height) * surface_height as f32)
            .round()
            .clamp(0.0, surface_height as f32) as u32;
        let height_px = y1.saturating_sub(y0).max(1) as f32;
        let half_fov = camera.fov_degrees.clamp(1.0, 179.0).to_radians() * 0.5;
        Self {
            basis: Basis::look_rotation(camera.transform.forward, camera.transform.up),
            origin: camera.transform.position,
            focal_px: (height_px * 0.5) / half_fov.tan(),
            center: ((x0 + x1) as f32 * 0.5, (y0 + y1) as f32 * 0.5),
            near: camera.near.max(MIN_NEAR_PLANE),
            far: camera.far,
            bounds: (x0, y0, x1, y1),
        }
    }

    fn to_camera(&self, point: Vec3) -> Vec3 {
        self.basis.to_local(point - self.origin)
    }

    fn to_screen(&self, local: Vec3) -> (f32, f32, f32) {
        let x = self.center.0 + local.x * self.focal_px / local.z;
        let y = self.center.1 - local.y * self.focal_px / local.z;
        (x, y, local.z)
    }

    fn inside(&self, x: i64, y: i64) -> bool {
        let (x0, y0, x1, y1) = self.bounds;
        x >= x0 as i64 && y >= y0 as i64 && x < x1 as i64 && y < y1 as i64
    }
}

/// Apply the camera's clear mode to its render target.
pub(crate) fn clear_for(camera: &CameraState, surface: &mut ViewportSurface) {
    match camera.clear {
        ClearMode::Sky => {
            draw_sky(surface);
            surface.clear_depth();
        }
        ClearMode::SolidColor(rgba) => surface.clear(rgba),
        ClearMode::DepthOnly => surface.clear_depth(),
        ClearMode::Nothing => {}
    }
}

fn draw_sky(surface: &mut ViewportSurface) {
    let height = surface.height().max(1);
    for y in 0..surface.height() {
        let t = y as f32 / height as f32;
        let color = blend(SKY_TOP_COLOR, SKY_HORIZON_COLOR, t);
        for x in 0..surface.width() {
            surface.write_pixel(x, y, color);
        }
    }
}

/// Draw every primitive on a layer in the camera's culling mask.
pub(crate) fn draw_world(camera: &CameraState, geometry: &SceneGeometry, surface: &mut ViewportSurface) {
    let projector = Projector::new(camera, surface.width(), surface.height());
    for segment in &geometry.segments {
        if camera.culling_mask.contains(segment.layer) {
            draw_segment(&projector, segment, surface);
        }
    }
    for marker in &geometry.markers {
        if camera.culling_mask.contains(marker.layer) {
            draw_marker(&projector, marker, surface);
        }
    }
}

fn draw_segment(projector: &Projector, segment: &Segment, surface: &mut ViewportSurface) {
    let Some((a, b)) = clip_to_depth_range(
        projector.to_camera(segment.a),
        projector.to_camera(segment.b),
        projector.near,
        projector.far,
    ) else {
        return;
    };
    let (ax, ay, az) = projector.to_screen(a);
    let (bx, by, bz) = projector.to_screen(b);
    let steps = (bx - ax).abs().max((by - ay).abs()).ceil();
    if !steps.is_finite() {
        return;
    }
    // Long off-screen spans are not worth walking pixel by pixel.
    let steps = steps.min(4096.0) as u32;
    for step in 0..=steps {
        let t = if steps == 0 {
            0.0
        } else {
            step as f32 / steps as f32
        };
        let x = (ax + (bx - ax) * t).round() as i64;
        let y = (ay + (by - ay) * t).round() as i64;
        if projector.inside(x, y) {
            let depth = az + (bz - az) * t;
            surface.write_pixel_depth_tested(x as u32, y as u32, depth, segment.color);
        }
    }
}

fn draw_marker(projector: &Projector, marker: &Marker, surface: &mut ViewportSurface) {
    let local = projector.to_camera(marker.position);
    if local.z < projector.near || local.z > projector.far {
        return;
    }
    let (cx, cy, depth) = projector.to_screen(local);
    let half_px = (marker.half_size * projector.focal_px / local.z).clamp(1.0, 256.0) as i64;
    let (cx, cy) = (cx.round() as i64, cy.round() as i64);
    for y in cy - half_px..=cy + half_px {
        for x in cx - half_px..=cx + half_px {
            if projector.inside(x, y) {
                surface.write_pixel_depth_tested(x as u32, y as u32, depth, marker.color);
            }
        }
    }
}

/// Clip a camera-space segment to `near..=far` along the view axis.
fn clip_to_depth_range(mut a: Vec3, mut b: Vec3, near: f32, far: f32) -> Option<(Vec3, Vec3)> {
    for (plane, keep_above) in [(near, true), (far, false)] {
        let a_in = if keep_above { a.z >= plane } else { a.z <= plane };
        let b_in = if keep_above { b.z >= plane } else { b.z <= plane };
        match (a_in, b_in) {
            (true, true) => {}
            (false, false) => return None,
            (a_in, _) => {
                let t = (plane - a.z) / (b.z - a.z);
                let hit = a.lerp(b, t);
                if a_in {
                    b = hit;
                } else {
                    a = hit;
                }
            }
        }
    }
    Some((a, b))
}

/// What the title menu shows this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TitleView {
    pub(crate) split: Option<SplitOrientation>,
    /// Index into the profile slots player 2 has picked.
    pub(crate) chosen_slot: Option<usize>,
    pub(crate) slots: usize,
    /// A world entry is held until player 2 picks.
    pub(crate) awaiting_pick: bool,
}

/// Title menu: plain backdrop, or a divided one with player 2's profile
/// slots while split is enabled.
pub(crate) fn draw_title_screen(view: &TitleView, surface: &mut ViewportSurface) {
    surface.clear(TITLE_COLOR);
    let Some(orientation) = view.split else {
        return;
    };
    let [_, second] = split_rects(orientation, surface.width(), surface.height());
    let backdrop = if view.awaiting_pick {
        TITLE_AWAITING_COLOR
    } else {
        TITLE_SECOND_COLOR
    };
    fill_rect(surface, second.x, second.y, second.width, second.height, backdrop);

    let slot_size = (second.width.min(second.height) / 6).max(4);
    let gap = slot_size / 2;
    let total = view.slots as u32 * slot_size + view.slots.saturating_sub(1) as u32 * gap;
    let start_x = second.x + second.width.saturating_sub(total) / 2;
    let y = second.y + second.height.saturating_sub(slot_size) / 2;
    for slot in 0..view.slots {
        let x = start_x + slot as u32 * (slot_size + gap);
        let color = if view.chosen_slot == Some(slot) {
            SLOT_CHOSEN_COLOR
        } else {
            SLOT_COLOR
        };
        fill_rect(surface, x, y, slot_size, slot_size, color);
    }
}

fn fill_rect(surface: &mut ViewportSurface, x: u32, y: u32, width: u32, height: u32, color: [u8; 4]) {
    for py in y..y.saturating_add(height).min(surface.height()) {
        for px in x..x.saturating_add(width).min(surface.width()) {
            surface.write_pixel(px, py, color);
        }
    }
}

fn blend(from: [u8; 4], to: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 4];
    for channel in 0..4 {
        out[channel] = (from[channel] as f32 + (to[channel] as f32 - from[channel] as f32) * t)
            .round() as u8;
    }
    out
}
