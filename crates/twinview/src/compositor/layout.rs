use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitOrientation {
    /// Player 0 on top, player 1 below.
    #[default]
    Horizontal,
    /// Player 0 on the left, player 1 on the right.
    Vertical,
}

/// Pixel rectangle in screen space, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SurfaceRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && x - self.x < self.width
            && y - self.y < self.height
    }
}

/// Screen halves for both players. Halves sum exactly to the screen along
/// the split axis (the remainder goes to player 1) and match the screen
/// along the other axis. Each dimension is clamped to at least one pixel.
pub fn split_rects(orientation: SplitOrientation, screen_width: u32, screen_height: u32) -> [SurfaceRect; 2] {
    let width = screen_width.max(1);
    let height = screen_height.max(1);
    match orientation {
        SplitOrientation::Horizontal => {
            let first = height / 2;
            [
                SurfaceRect {
                    x: 0,
                    y: 0,
                    width,
                    height: first.max(1),
                },
                SurfaceRect {
                    x: 0,
                    y: first,
                    width,
                    height: (height - first).max(1),
                },
            ]
        }
        SplitOrientation::Vertical => {
            let first = width / 2;
            [
                SurfaceRect {
                    x: 0,
                    y: 0,
                    width: first.max(1),
                    height,
                },
                SurfaceRect {
                    x: first,
                    y: 0,
                    width: (width - first).max(1),
                    height,
                },
            ]
        }
    }
}

/// The divider band centred on the seam, clipped to the screen.
pub fn divider_rect(
    orientation: SplitOrientation,
    screen_width: u32,
    screen_height: u32,
    divider_width: u32,
) -> Option<SurfaceRect> {
    if divider_width == 0 || screen_width == 0 || screen_height == 0 {
        return None;
    }
    let [_, second] = split_rects(orientation, screen_width, screen_height);
    match orientation {
        SplitOrientation::Horizontal => {
            let start = second.y.saturating_sub(divider_width / 2);
            let end = (start + divider_width).min(screen_height);
            Some(SurfaceRect {
                x: 0,
                y: start,
                width: screen_width,
                height: end - start,
            })
        }
        SplitOrientation::Vertical => {
            let start = second.x.saturating_sub(divider_width / 2);
            let end = (start + divider_width).min(screen_width);
            Some(SurfaceRect {
                x: start,
                y: 0,
                width: end - start,
                height: screen_height,
            })
        }
    }
}
