use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;
use twinview::compositor::ViewportSurface;
use twinview::{PresentationCollaborator, PresentationError, UiAnchor};

const BAR_BACK_COLOR: [u8; 4] = [30, 30, 36, 255];
const BAR_FILL_COLOR: [u8; 4] = [200, 64, 64, 255];
const PANEL_COLOR: [u8; 4] = [54, 48, 40, 255];
const BAR_MARGIN_PX: u32 = 8;
const BAR_HEIGHT_PX: u32 = 6;

/// What the second player's HUD shows, shared with the renderer.
#[derive(Debug, Default)]
pub(crate) struct HudState {
    pub(crate) anchor: Option<UiAnchor>,
    pub(crate) health: f32,
    pub(crate) inventory_open: bool,
}

pub(crate) type SharedHud = Rc<RefCell<HudState>>;

/// Health strip plus a placeholder inventory panel for player 2.
pub(crate) struct HudCollaborator {
    state: SharedHud,
}

impl HudCollaborator {
    pub(crate) fn new(state: SharedHud) -> Self {
        Self { state }
    }
}

impl PresentationCollaborator for HudCollaborator {
    fn name(&self) -> &'static str {
        "hud"
    }

    fn attach(&mut self, anchor: &UiAnchor) -> Result<(), PresentationError> {
        if anchor.width < BAR_MARGIN_PX * 2 || anchor.height < BAR_MARGIN_PX * 2 {
            return Err(PresentationError::AttachFailed {
                collaborator: self.name(),
                reason: format!("surface {}x{} too small", anchor.width, anchor.height),
            });
        }
        let mut state = self.state.borrow_mut();
        state.anchor = Some(*anchor);
        state.inventory_open = false;
        info!(player = %anchor.player, layer = anchor.layer.0, "hud_attached");
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.state.borrow_mut();
        state.anchor = None;
        state.inventory_open = false;
    }

    fn is_capturing_input(&self) -> bool {
        self.state.borrow().inventory_open
    }
}

/// Draw the HUD into `surface` if it is attached to this surface's UI
/// layer.
pub(crate) fn draw_hud(state: &HudState, surface: &mut ViewportSurface) {
    if state.anchor.is_none() {
        return;
    }
    let width = surface.width();
    let height = surface.height();
    let bar_width = width.saturating_sub(BAR_MARGIN_PX * 2);
    let bar_y = height.saturating_sub(BAR_MARGIN_PX + BAR_HEIGHT_PX);
    let filled = (bar_width as f32 * state.health.clamp(0.0, 1.0)) as u32;
    for y in bar_y..bar_y + BAR_HEIGHT_PX {
        for x in 0..bar_width {
            let color = if x < filled {
                BAR_FILL_COLOR
            } else {
                BAR_BACK_COLOR
            };
            surface.write_pixel(BAR_MARGIN_PX + x, y, color);
        }
    }

    if state.inventory_open {
        let (x0, y0) = (width / 4, height / 4);
        for y in y0..height - y0 {
            for x in x0..width - x0 {
                surface.write_pixel(x, y, PANEL_COLOR);
            }
        }
    }
}
