use thiserror::Error;

use crate::host::CameraId;
use crate::player::PlayerIndex;

/// Largest surface edge we are willing to allocate.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface for {owner} has degenerate size {width}x{height}")]
    Degenerate {
        owner: PlayerIndex,
        width: u32,
        height: u32,
    },
    #[error("surface for {owner} is too large: {width}x{height} (max edge {MAX_SURFACE_DIMENSION})")]
    TooLarge {
        owner: PlayerIndex,
        width: u32,
        height: u32,
    },
    #[error("unsupported anti-aliasing level {0} (expected 1, 2, 4 or 8)")]
    InvalidAntiAliasing(u8),
}

/// The cameras rendering into one player's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCameras {
    pub world: CameraId,
    pub sky: Option<CameraId>,
    pub ui: CameraId,
}

/// Offscreen colour and depth target owned by one logical player.
///
/// Depth is sized to the surface rather than the screen, so two cameras
/// never share a screen-sized depth buffer.
#[derive(Debug, Clone)]
pub struct ViewportSurface {
    owner: PlayerIndex,
    width: u32,
    height: u32,
    anti_aliasing: u8,
    color: Vec<u8>,
    depth: Vec<f32>,
}

impl ViewportSurface {
    pub fn allocate(
        owner: PlayerIndex,
        width: u32,
        height: u32,
        anti_aliasing: u8,
    ) -> Result<Self, SurfaceError> {
        validate(owner, width, height, anti_aliasing)?;
        let pixels = width as usize * height as usize;
        Ok(Self {
            owner,
            width,
            height,
            anti_aliasing,
            color: vec![0; pixels * 4],
            depth: vec![f32::INFINITY; pixels],
        })
    }

    pub fn owner(&self) -> PlayerIndex {
        self.owner
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn anti_aliasing(&self) -> u8 {
        self.anti_aliasing
    }

    /// RGBA8, row-major, no padding.
    pub fn color(&self) -> &[u8] {
        &self.color
    }

    pub fn color_mut(&mut self) -> &mut [u8] {
        &mut self.color
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.color.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
        self.clear_depth();
    }

    pub fn clear_depth(&mut self) {
        self.depth.fill(f32::INFINITY);
    }

    /// Reallocate for a new size. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        *self = Self::allocate(self.owner, width, height, self.anti_aliasing)?;
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let index = self.index(x, y)?;
        let start = index * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.color[start..start + 4]);
        Some(rgba)
    }

    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        self.index(x, y).map(|index| self.depth[index])
    }

    /// Write a pixel if it is nearer than what is already there.
    pub fn write_pixel_depth_tested(&mut self, x: u32, y: u32, depth: f32, rgba: [u8; 4]) -> bool {
        let Some(index) = self.index(x, y) else {
            return false;
        };
        if depth.is_nan() || depth >= self.depth[index] {
            return false;
        }
        self.depth[index] = depth;
        let start = index * 4;
        self.color[start..start + 4].copy_from_slice(&rgba);
        true
    }

    /// Unconditional write, for overlays drawn after the world.
    pub fn write_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(index) = self.index(x, y) {
            let start = index * 4;
            self.color[start..start + 4].copy_from_slice(&rgba);
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

fn validate(owner: PlayerIndex, width: u32, height: u32, anti_aliasing: u8) -> Result<(), SurfaceError> {
    if width == 0 || height == 0 {
        return Err(SurfaceError::Degenerate { owner, width, height });
    }
    if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
        return Err(SurfaceError::TooLarge { owner, width, height });
    }
    if !matches!(anti_aliasing, 1 | 2 | 4 | 8) {
        return Err(SurfaceError::InvalidAntiAliasing(anti_aliasing));
    }
    Ok(())
}
