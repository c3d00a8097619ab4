//! Region (tile) coverage for whole primitives.
//!
//! Bounded primitives bin through bounding-box projection; unbounded ones
//! (or any primitive the camera may be inside) bin by sampling their packed
//! plane equations across the tile grid. Translucent primitives also get an
//! affine inverse-depth key so tiles can order them against each other.

use glam::{IVec2, Vec2, Vec3};

use crate::projection::ProjectionState;

use super::{PlaneCategory, PlaneCategoryLists, TransformedPlane};

/// Inclusive tile-index bounds of a primitive's coverage.
///
/// Invariant: `first_x <= last_x`, `first_y <= last_y`, and both ranges lie
/// inside the tile grid. Constructors clamp, so a value of this type is
/// always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRect {
    pub first_x: i32,
    pub first_y: i32,
    pub last_x: i32,
    pub last_y: i32,
}

impl RegionRect {
    /// Build from unclamped tile bounds; None when the rectangle misses the
    /// grid entirely.
    pub fn clamped_to_grid(
        first: IVec2,
        last: IVec2,
        proj: &ProjectionState,
    ) -> Option<RegionRect> {
        if last.x < 0 || last.y < 0 || first.x >= proj.tiles_x || first.y >= proj.tiles_y {
            return None;
        }
        Some(RegionRect {
            first_x: first.x.max(0),
            first_y: first.y.max(0),
            last_x: last.x.min(proj.tiles_x - 1),
            last_y: last.y.min(proj.tiles_y - 1),
        })
    }

    #[inline]
    pub fn single(tile: IVec2) -> RegionRect {
        RegionRect {
            first_x: tile.x,
            first_y: tile.y,
            last_x: tile.x,
            last_y: tile.y,
        }
    }

    #[inline]
    pub fn first_tile(&self) -> IVec2 {
        IVec2::new(self.first_x, self.first_y)
    }

    #[inline]
    pub fn is_single_tile(&self) -> bool {
        self.first_x == self.last_x && self.first_y == self.last_y
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        ((self.last_x - self.first_x + 1) * (self.last_y - self.first_y + 1)) as usize
    }

    #[inline]
    pub fn contains(&self, other: &RegionRect) -> bool {
        self.first_x <= other.first_x
            && self.first_y <= other.first_y
            && self.last_x >= other.last_x
            && self.last_y >= other.last_y
    }

    pub fn union(&self, other: &RegionRect) -> RegionRect {
        RegionRect {
            first_x: self.first_x.min(other.first_x),
            first_y: self.first_y.min(other.first_y),
            last_x: self.last_x.max(other.last_x),
            last_y: self.last_y.max(other.last_y),
        }
    }
}

/// Affine approximation of inverse depth across a RegionRect, used to order
/// translucent primitives within each tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslucencyDepthKey {
    /// Inverse depth at the rect's top-left tile.
    pub base: f32,
    /// Change per tile step in +X.
    pub d_dx: f32,
    /// Change per tile step in +Y.
    pub d_dy: f32,
}

impl TranslucencyDepthKey {
    /// Flat key for geometry sorted by a single per-face depth.
    pub fn flat(base: f32) -> Self {
        Self {
            base,
            d_dx: 0.0,
            d_dy: 0.0,
        }
    }

    /// Key value at a tile inside the rect (tile coordinates relative to
    /// the rect's top-left corner).
    #[inline]
    pub fn at(&self, tx: i32, ty: i32) -> f32 {
        self.base + tx as f32 * self.d_dx + ty as f32 * self.d_dy
    }
}

/// Tile rectangle covered by a camera-space AABB (bounded primitives).
///
/// The box is intersected with the z >= near half-space first (for an
/// axis-aligned box that just raises min.z), then all eight corners of the
/// clipped box are projected. Returns None when the box is entirely behind
/// the near clip or projects outside the grid.
pub fn from_bounding_box(min: Vec3, max: Vec3, proj: &ProjectionState) -> Option<RegionRect> {
    if max.z <= proj.near_clip {
        return None;
    }
    let min = Vec3::new(min.x, min.y, min.z.max(proj.near_clip));

    let mut px_min = Vec2::splat(f32::INFINITY);
    let mut px_max = Vec2::splat(f32::NEG_INFINITY);
    for xi in 0..2 {
        for yi in 0..2 {
            for zi in 0..2 {
                let corner = Vec3::new(
                    if xi == 0 { min.x } else { max.x },
                    if yi == 0 { min.y } else { max.y },
                    if zi == 0 { min.z } else { max.z },
                );
                let p = proj.project(corner);
                px_min = px_min.min(p);
                px_max = px_max.max(p);
            }
        }
    }

    RegionRect::clamped_to_grid(proj.tile_of(px_min), proj.tile_of(px_max), proj)
}

/// Tile rectangle covered by an unbounded primitive, estimated by sampling
/// each relevant plane's packed line equation in tile-sized steps from the
/// screen centre.
///
/// Forward-visible planes drive the estimate; with none present the camera
/// is inside the primitive and reverse-visible planes are used instead.
/// Per-plane extents are unioned. Returns None when no plane contributes
/// any coverage.
pub fn from_plane_sampling(
    bank: &[TransformedPlane],
    lists: &PlaneCategoryLists,
    proj: &ProjectionState,
) -> Option<RegionRect> {
    let indices = if lists.count(PlaneCategory::ForwardVisible) > 0 {
        lists.indices(PlaneCategory::ForwardVisible)
    } else {
        lists.indices(PlaneCategory::ReverseVisible)
    };

    let centre_tile = proj.clamp_tile(proj.tile_of(proj.centre));
    let mut union: Option<RegionRect> = None;

    for &index in indices {
        let plane = &bank[index as usize];
        // Inverse depth at the screen centre and its change per tile step.
        let v0 = plane
            .coeffs
            .inv_depth_at(proj.centre.x, proj.centre.y, proj.overflow_rescale);
        let gx = -plane.coeffs.a * proj.tile_width / proj.overflow_rescale;
        let gy = -plane.coeffs.b * proj.tile_height / proj.overflow_rescale;

        let span_x = visible_span(v0, gx, -centre_tile.x, proj.tiles_x - 1 - centre_tile.x);
        let span_y = visible_span(v0, gy, -centre_tile.y, proj.tiles_y - 1 - centre_tile.y);
        let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (span_x, span_y) else {
            continue;
        };

        let rect = RegionRect {
            first_x: centre_tile.x + x_lo,
            first_y: centre_tile.y + y_lo,
            last_x: centre_tile.x + x_hi,
            last_y: centre_tile.y + y_hi,
        };
        union = Some(match union {
            Some(current) => current.union(&rect),
            None => rect,
        });
    }

    union
}

/// Tile-step range (relative offsets within [lo, hi]) over which the
/// sampled inverse depth `v0 + t * g` stays non-negative.
fn visible_span(v0: f32, g: f32, lo: i32, hi: i32) -> Option<(i32, i32)> {
    const GRAD_EPS: f32 = 1.0e-12;
    if g.abs() < GRAD_EPS {
        return if v0 >= 0.0 { Some((lo, hi)) } else { None };
    }
    // Root of v0 + t * g = 0, clamped so the cast cannot overflow.
    let root = (-v0 / g).clamp(-1.0e6, 1.0e6);
    let (mut first, mut last) = (lo, hi);
    if g > 0.0 {
        first = first.max(root.ceil() as i32);
    } else {
        last = last.min(root.floor() as i32);
    }
    if first > last {
        None
    } else {
        Some((first, last))
    }
}

/// Fit the affine translucency key over a rect by evaluating inverse depth
/// at its top-left, top-right and bottom-left pixel corners and finite
/// differencing per tile.
///
/// Outside the primitive (forward-visible planes exist) the nearest surface
/// bounds the key, so the per-corner value is the max across planes; seen
/// from inside it is the min across reverse-visible planes.
pub fn region_depth_key(
    bank: &[TransformedPlane],
    lists: &PlaneCategoryLists,
    rect: &RegionRect,
    proj: &ProjectionState,
) -> TranslucencyDepthKey {
    let outside = lists.count(PlaneCategory::ForwardVisible) > 0;
    let indices = if outside {
        lists.indices(PlaneCategory::ForwardVisible)
    } else {
        lists.indices(PlaneCategory::ReverseVisible)
    };

    let top_left = Vec2::new(
        rect.first_x as f32 * proj.tile_width,
        rect.first_y as f32 * proj.tile_height,
    );
    let top_right = Vec2::new((rect.last_x + 1) as f32 * proj.tile_width, top_left.y);
    let bottom_left = Vec2::new(top_left.x, (rect.last_y + 1) as f32 * proj.tile_height);

    let sample = |pixel: Vec2| -> f32 {
        let mut value = if outside {
            f32::NEG_INFINITY
        } else {
            f32::INFINITY
        };
        for &index in indices {
            let v = bank[index as usize]
                .coeffs
                .inv_depth_at(pixel.x, pixel.y, proj.overflow_rescale);
            value = if outside { value.max(v) } else { value.min(v) };
        }
        if value.is_finite() {
            value
        } else {
            0.0
        }
    };

    let base = sample(top_left);
    let tiles_x = (rect.last_x - rect.first_x + 1) as f32;
    let tiles_y = (rect.last_y - rect.first_y + 1) as f32;

    TranslucencyDepthKey {
        base,
        d_dx: (sample(top_right) - base) / tiles_x,
        d_dy: (sample(bottom_left) - base) / tiles_y,
    }
}
