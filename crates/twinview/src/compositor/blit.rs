use super::layout::{divider_rect, split_rects, SplitOrientation, SurfaceRect};
use super::surface::ViewportSurface;

pub const DIVIDER_COLOR: [u8; 4] = [16, 16, 20, 255];

/// Copy both surfaces into their screen halves of an RGBA8 `frame`, then
/// draw the divider on the seam. Surfaces whose size lags the screen (a
/// resize in flight) are sampled nearest-neighbour into the rect.
pub fn composite_into(
    frame: &mut [u8],
    screen: (u32, u32),
    orientation: SplitOrientation,
    surfaces: [&ViewportSurface; 2],
    divider_width: u32,
) {
    let (screen_width, screen_height) = screen;
    let rects = split_rects(orientation, screen_width, screen_height);
    for (rect, surface) in rects.iter().zip(surfaces) {
        blit_scaled(frame, screen, rect, surface);
    }
    if let Some(divider) = divider_rect(orientation, screen_width, screen_height, divider_width) {
        fill(frame, screen, &divider, DIVIDER_COLOR);
    }
}

fn blit_scaled(frame: &mut [u8], screen: (u32, u32), rect: &SurfaceRect, surface: &ViewportSurface) {
    let (screen_width, screen_height) = screen;
    let (source_width, source_height) = surface.size();
    let color = surface.color();
    let x_end = (rect.x + rect.width).min(screen_width);
    let y_end = (rect.y + rect.height).min(screen_height);

    for y in rect.y..y_end {
        let source_y = ((y - rect.y) as u64 * source_height as u64 / rect.height as u64) as usize;
        for x in rect.x..x_end {
            let source_x = ((x - rect.x) as u64 * source_width as u64 / rect.width as u64) as usize;
            let source = (source_y * source_width as usize + source_x) * 4;
            let target = (y as usize * screen_width as usize + x as usize) * 4;
            if let (Some(dst), Some(src)) = (
                frame.get_mut(target..target + 4),
                color.get(source..source + 4),
            ) {
                dst.copy_from_slice(src);
            }
        }
    }
}

fn fill(frame: &mut [u8], screen: (u32, u32), rect: &SurfaceRect, rgba: [u8; 4]) {
    let (screen_width, screen_height) = screen;
    for y in rect.y..(rect.y + rect.height).min(screen_height) {
        for x in rect.x..(rect.x + rect.width).min(screen_width) {
            let target = (y as usize * screen_width as usize + x as usize) * 4;
            if let Some(dst) = frame.get_mut(target..target + 4) {
                dst.copy_from_slice(&rgba);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerIndex;

    fn solid(owner: PlayerIndex, width: u32, height: u32, rgba: [u8; 4]) -> ViewportSurface {
        let mut surface = ViewportSurface::allocate(owner, width, height, 1).expect("allocate");
        surface.clear(rgba);
        surface
    }

    fn pixel(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let start = (y * width + x) as usize * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&frame[start..start + 4]);
        rgba
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn each_surface_lands_in_its_half_with_divider_between() {
        let (width, height) = (8, 6);
        let top = solid(PlayerIndex::First, 8, 3, RED);
        let bottom = solid(PlayerIndex::Second, 8, 3, BLUE);
        let mut frame = vec![0; (width * height * 4) as usize];
        composite_into(&mut frame, (width, height), SplitOrientation::Horizontal, [&top, &bottom], 2);

        assert_eq!(pixel(&frame, width, 3, 0), RED);
        assert_eq!(pixel(&frame, width, 3, 5), BLUE);
        assert_eq!(pixel(&frame, width, 3, 2), DIVIDER_COLOR);
        assert_eq!(pixel(&frame, width, 3, 3), DIVIDER_COLOR);
    }

    #[test]
    fn vertical_split_puts_second_player_on_the_right() {
        let (width, height) = (6, 2);
        let left = solid(PlayerIndex::First, 3, 2, RED);
        let right = solid(PlayerIndex::Second, 3, 2, BLUE);
        let mut frame = vec![0; (width * height * 4) as usize];
        composite_into(&mut frame, (width, height), SplitOrientation::Vertical, [&left, &right], 0);
        assert_eq!(pixel(&frame, width, 0, 1), RED);
        assert_eq!(pixel(&frame, width, 5, 1), BLUE);
    }

    #[test]
    fn stale_surface_size_is_scaled_not_overrun() {
        let (width, height) = (10, 10);
        let small = solid(PlayerIndex::First, 2, 2, RED);
        let other = solid(PlayerIndex::Second, 1, 1, BLUE);
        let mut frame = vec![0; (width * height * 4) as usize];
        composite_into(&mut frame, (width, height), SplitOrientation::Vertical, [&small, &other], 0);
        assert_eq!(pixel(&frame, width, 4, 9), RED);
        assert_eq!(pixel(&frame, width, 9, 9), BLUE);
    }

    #[test]
    fn short_frame_buffer_is_tolerated() {
        let surface = solid(PlayerIndex::First, 4, 4, RED);
        let mut frame = vec![0; 8];
        composite_into(&mut frame, (4, 8), SplitOrientation::Horizontal, [&surface, &surface], 1);
        assert_eq!(&frame[..4], &RED);
    }
}
