/// Per-frame camera/viewport constants for the binning pipeline
/// Rebuilt whenever the camera or viewport changes; read-only during binning
use glam::{IVec2, Vec2, Vec3};

/// Rounding bias applied when converting screen pixels to tile coordinates.
///
/// Two faces sharing an edge that lies exactly on a tile boundary must land
/// in the same tile column/row, otherwise a one-tile seam opens between them.
/// The bias nudges exact-boundary coordinates consistently to one side.
/// Validated by the tile-seam regression test; do not remove.
pub const SEAM_BIAS: f32 = 1.0 / 1024.0;

/// Largest finite reciprocal substituted for a division by a near-zero value.
pub const RECIP_CLAMP: f32 = 1.0e20;

/// Denominators with magnitude below this are treated as zero.
pub const RECIP_EPS: f32 = 1.0e-20;

/// Reciprocal of a possibly-tiny value, clamped to a large finite number
/// instead of overflowing to infinity. Sign of the input is preserved.
#[inline]
pub fn safe_recip(x: f32) -> f32 {
    if x.abs() < RECIP_EPS {
        RECIP_CLAMP.copysign(x)
    } else {
        1.0 / x
    }
}

/// Viewport description supplied by the render-frame controller.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    /// Device size in pixels.
    pub device_width: u32,
    pub device_height: u32,
    /// Tile (region) size in pixels.
    pub tile_width: u32,
    pub tile_height: u32,
    /// Near clip distance in camera-space units (must be > 0).
    pub near_clip: f32,
    /// Viewport half-extents in camera-space units at unit distance.
    /// half_extent.x = tan(fov_x / 2), half_extent.y = tan(fov_y / 2).
    pub half_extent: Vec2,
    /// Rescale constant keeping packed coefficients inside the range the
    /// downstream consumer can represent.
    pub overflow_rescale: f32,
}

impl Viewport {
    pub fn new(
        device_width: u32,
        device_height: u32,
        tile_width: u32,
        tile_height: u32,
        near_clip: f32,
        half_extent: Vec2,
    ) -> Self {
        Self {
            device_width,
            device_height,
            tile_width,
            tile_height,
            near_clip,
            half_extent,
            overflow_rescale: 1024.0,
        }
    }

    /// Convenience constructor from a vertical field of view; horizontal
    /// extent follows the device aspect ratio.
    pub fn with_fov_y(
        device_width: u32,
        device_height: u32,
        tile_width: u32,
        tile_height: u32,
        near_clip: f32,
        fov_y: f32,
    ) -> Self {
        let half_y = (fov_y * 0.5).tan();
        let aspect = device_width as f32 / device_height as f32;
        Self::new(
            device_width,
            device_height,
            tile_width,
            tile_height,
            near_clip,
            Vec2::new(half_y * aspect, half_y),
        )
    }
}

/// Derived per-frame projection constants.
///
/// Camera space is +X right, +Y down (in pixel terms), +Z into the screen;
/// a point is in front of the camera iff z > 0. Screen mapping is
/// `sx = centre.x + (x / z) * scale.x` (and likewise for y).
#[derive(Debug, Clone)]
pub struct ProjectionState {
    /// Device size in pixels.
    pub device_width: f32,
    pub device_height: f32,
    /// Tile size in pixels.
    pub tile_width: f32,
    pub tile_height: f32,
    /// Tile grid dimensions (device size rounded up to whole tiles).
    pub tiles_x: i32,
    pub tiles_y: i32,
    /// Near clip distance and its reciprocal.
    pub near_clip: f32,
    pub inv_near_clip: f32,
    /// Viewport half-extents in camera-space units at unit distance.
    pub half_extent: Vec2,
    /// Camera-space direction through the viewport centre.
    pub view_centre: Vec3,
    /// Pixels per camera-space unit at unit distance.
    pub scale: Vec2,
    /// Camera-space units per pixel at unit distance (1 / scale).
    pub units_per_pixel: Vec2,
    /// Screen centre in pixels.
    pub centre: Vec2,
    /// Overflow-safe rescale factor baked into packed coefficients.
    pub overflow_rescale: f32,
}

impl ProjectionState {
    pub fn new(viewport: &Viewport) -> Self {
        let device_width = viewport.device_width as f32;
        let device_height = viewport.device_height as f32;
        let tile_width = viewport.tile_width as f32;
        let tile_height = viewport.tile_height as f32;

        let tiles_x = viewport.device_width.div_ceil(viewport.tile_width) as i32;
        let tiles_y = viewport.device_height.div_ceil(viewport.tile_height) as i32;

        let scale = Vec2::new(
            device_width * 0.5 / viewport.half_extent.x,
            device_height * 0.5 / viewport.half_extent.y,
        );

        Self {
            device_width,
            device_height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            near_clip: viewport.near_clip,
            inv_near_clip: 1.0 / viewport.near_clip,
            half_extent: viewport.half_extent,
            view_centre: Vec3::Z,
            scale,
            units_per_pixel: Vec2::new(1.0 / scale.x, 1.0 / scale.y),
            centre: Vec2::new(device_width * 0.5, device_height * 0.5),
            overflow_rescale: viewport.overflow_rescale,
        }
    }

    /// Total number of tiles in the grid.
    #[inline]
    pub fn tile_count(&self) -> usize {
        (self.tiles_x * self.tiles_y) as usize
    }

    /// Project a camera-space point to screen pixels. Caller guarantees
    /// `point.z` is safely positive.
    #[inline]
    pub fn project(&self, point: Vec3) -> Vec2 {
        let inv_z = 1.0 / point.z;
        Vec2::new(
            self.centre.x + point.x * inv_z * self.scale.x,
            self.centre.y + point.y * inv_z * self.scale.y,
        )
    }

    /// Tile coordinate containing a screen-space pixel, with the seam bias
    /// applied. Not clamped to the grid.
    #[inline]
    pub fn tile_of(&self, pixel: Vec2) -> IVec2 {
        IVec2::new(
            ((pixel.x + SEAM_BIAS) / self.tile_width).floor() as i32,
            ((pixel.y + SEAM_BIAS) / self.tile_height).floor() as i32,
        )
    }

    /// Clamp a tile coordinate into the grid.
    #[inline]
    pub fn clamp_tile(&self, tile: IVec2) -> IVec2 {
        IVec2::new(
            tile.x.clamp(0, self.tiles_x - 1),
            tile.y.clamp(0, self.tiles_y - 1),
        )
    }

    /// True when a projected point lies inside the viewport enlarged by the
    /// given factor about its centre.
    #[inline]
    pub fn within_enlarged_viewport(&self, pixel: Vec2, factor: f32) -> bool {
        let half_w = self.device_width * 0.5 * factor;
        let half_h = self.device_height * 0.5 * factor;
        (pixel.x - self.centre.x).abs() <= half_w && (pixel.y - self.centre.y).abs() <= half_h
    }
}
