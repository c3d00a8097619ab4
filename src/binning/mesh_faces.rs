//! Per-face binning for meshes.
//!
//! Meshes bin face by face instead of as one solid: vertices are
//! transformed and tagged with clip flags first, then each surviving face
//! either takes the fast all-on-screen path, rebuilds a camera-space box
//! when it crosses the near plane, or clamps to the grid edge when it only
//! leaves the viewport sideways. Faces landing in a single tile are
//! bucketed so one batched record per tile replaces a record per face.

use glam::{IVec2, Mat4, Vec2, Vec3};

use crate::projection::ProjectionState;
use crate::scene::Face;

use super::region::{from_bounding_box, RegionRect};
use super::TransformedPlane;

/// Vertex clip flags relative to the near and side frustum planes.
pub const CLIP_Z: u8 = 1 << 0;
pub const CLIP_POS_X: u8 = 1 << 1;
pub const CLIP_NEG_X: u8 = 1 << 2;
pub const CLIP_POS_Y: u8 = 1 << 3;
pub const CLIP_NEG_Y: u8 = 1 << 4;

/// Faces per single-tile bucket before it is force-flushed.
pub const BUCKET_CAPACITY: usize = 32;

/// Per-render derived vertex, scratch lifetime of one mesh.
#[derive(Debug, Clone, Copy)]
pub struct TransformedVertex {
    /// Camera-space position.
    pub cam: Vec3,
    /// Screen-space position. For a Z-clipped vertex this is the
    /// substitute projection at the near-clip depth.
    pub screen: Vec2,
    pub clip: u8,
    /// Tile coordinate of `screen`, unclamped.
    pub tile: IVec2,
}

/// A face that survived culling and received its tile rectangle.
#[derive(Debug, Clone, Copy)]
pub struct BinnedFace {
    pub rect: RegionRect,
    /// True when the face crossed the near plane and was binned through
    /// the bounding-box fallback; the shading stage must then use the
    /// extrapolated representative point.
    pub z_clipped: bool,
    /// Screen-space representative point for shading.
    pub rep: Vec2,
    pub rep_extrapolated: bool,
    /// Mean inverse depth over the face's vertices, the per-face
    /// translucency sort key.
    pub inv_depth: f32,
}

/// Transform all mesh vertices into camera/screen space and tag clip
/// flags. Returns the OR of all flags; zero means the whole mesh is
/// unclipped and every face may take the fast path.
pub fn transform_vertices(
    vertices: &[Vec3],
    transform: &Mat4,
    proj: &ProjectionState,
    out: &mut Vec<TransformedVertex>,
) -> u8 {
    out.clear();
    let mut all_flags = 0u8;

    for &v in vertices {
        let cam = transform.transform_point3(v);
        let mut clip = 0u8;
        let screen;
        if cam.z < proj.near_clip {
            clip |= CLIP_Z;
            // Substitute projection at the near-clip depth; only ever used
            // to rebuild a conservative bounding box.
            screen = proj.project(Vec3::new(cam.x, cam.y, proj.near_clip));
        } else {
            screen = proj.project(cam);
            if screen.x < 0.0 {
                clip |= CLIP_NEG_X;
            } else if screen.x > proj.device_width {
                clip |= CLIP_POS_X;
            }
            if screen.y < 0.0 {
                clip |= CLIP_NEG_Y;
            } else if screen.y > proj.device_height {
                clip |= CLIP_POS_Y;
            }
        }
        all_flags |= clip;
        out.push(TransformedVertex {
            cam,
            screen,
            clip,
            tile: proj.tile_of(screen),
        });
    }

    all_flags
}

/// Bin one face given its transformed plane and vertices.
///
/// Returns None when the face has no on-grid coverage. The decision tree:
/// all vertices unclipped takes the fast screen-space path; any Z-clipped
/// vertex rebuilds a camera-space box (with clipped vertices clamped to the
/// near depth) and goes through the bounding-box binner; side-only clipping
/// clamps tile coordinates to the grid edge instead of discarding.
pub fn bin_face(
    face: &Face,
    plane: &TransformedPlane,
    verts: &[TransformedVertex],
    proj: &ProjectionState,
) -> Option<BinnedFace> {
    let indices = face.indices();
    let mut or_flags = 0u8;
    for &i in indices {
        or_flags |= verts[i as usize].clip;
    }

    let inv_depth = face_inv_depth(face, verts, proj);

    if or_flags == 0 {
        // Fast path: tile bounds straight from the per-vertex tiles.
        let mut first = verts[indices[0] as usize].tile;
        let mut last = first;
        for &i in &indices[1..] {
            let tile = verts[i as usize].tile;
            first = first.min(tile);
            last = last.max(tile);
        }
        let rect = RegionRect::clamped_to_grid(first, last, proj)?;
        crate::count_call!(crate::perf::PIPELINE_COUNTERS.faces_fast_path);
        return Some(BinnedFace {
            rect,
            z_clipped: false,
            rep: verts[indices[0] as usize].screen,
            rep_extrapolated: false,
            inv_depth,
        });
    }

    if or_flags & CLIP_Z != 0 {
        // Near-plane crossing: rebuild a camera-space box from the
        // unclipped vertices plus the clipped ones clamped to the near
        // depth, and bin that conservatively.
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for &i in indices {
            let mut cam = verts[i as usize].cam;
            cam.z = cam.z.max(proj.near_clip);
            min = min.min(cam);
            max = max.max(cam);
        }
        let rect = from_bounding_box(min, max, proj)?;
        crate::count_call!(crate::perf::PIPELINE_COUNTERS.faces_z_clipped);
        return Some(BinnedFace {
            rect,
            z_clipped: true,
            // The true rep projection is unusable here; the extrapolated
            // plane rep filled by the rep-point projector stands in.
            rep: plane.proj_rep,
            rep_extrapolated: true,
            inv_depth,
        });
    }

    // Side-clipped only: clamp each vertex tile to the grid edge.
    let mut first = proj.clamp_tile(verts[indices[0] as usize].tile);
    let mut last = first;
    for &i in &indices[1..] {
        let tile = proj.clamp_tile(verts[i as usize].tile);
        first = first.min(tile);
        last = last.max(tile);
    }
    let rect = RegionRect::clamped_to_grid(first, last, proj)?;

    // Representative point: any unclipped vertex, else the deepest one.
    let rep_vertex = indices
        .iter()
        .map(|&i| &verts[i as usize])
        .find(|v| v.clip == 0);
    let (rep, rep_extrapolated) = match rep_vertex {
        Some(v) => (v.screen, false),
        None => {
            let mut deepest = &verts[indices[0] as usize];
            for &i in &indices[1..] {
                let v = &verts[i as usize];
                if v.cam.z > deepest.cam.z {
                    deepest = v;
                }
            }
            (deepest.screen, true)
        }
    };

    Some(BinnedFace {
        rect,
        z_clipped: false,
        rep,
        rep_extrapolated,
        inv_depth,
    })
}

/// Mean inverse depth over a face's vertices, each clamped to the
/// near-clip reciprocal when nearer than the near plane.
pub fn face_inv_depth(face: &Face, verts: &[TransformedVertex], proj: &ProjectionState) -> f32 {
    let indices = face.indices();
    let mut sum = 0.0;
    for &i in indices {
        let z = verts[i as usize].cam.z;
        sum += if z <= proj.near_clip {
            proj.inv_near_clip
        } else {
            1.0 / z
        };
    }
    sum / indices.len() as f32
}

/// Per-tile buckets collecting single-tile faces so they emit as one
/// batched record per tile instead of one record per face.
#[derive(Debug, Default)]
pub struct FaceBuckets {
    bins: Vec<Vec<u16>>,
    dirty: Vec<u32>,
    tiles_x: i32,
}

impl FaceBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the bucket array for the current tile grid, reusing previous
    /// allocations.
    pub fn ensure_grid(&mut self, proj: &ProjectionState) {
        let count = proj.tile_count();
        if self.bins.len() < count {
            self.bins.resize_with(count, Vec::new);
        }
        self.tiles_x = proj.tiles_x;
    }

    /// Append a face to its tile's bucket. Returns the tile's flat index
    /// when the bucket just reached capacity and must be flushed.
    pub fn push(&mut self, tile: IVec2, bank_index: u16) -> Option<usize> {
        let index = (tile.y * self.tiles_x + tile.x) as usize;
        let bin = &mut self.bins[index];
        if bin.is_empty() {
            self.dirty.push(index as u32);
        }
        bin.push(bank_index);
        (bin.len() >= BUCKET_CAPACITY).then_some(index)
    }

    /// Faces currently bucketed for a tile.
    #[inline]
    pub fn tile_faces(&self, tile_index: usize) -> &[u16] {
        &self.bins[tile_index]
    }

    /// Tile coordinate for a flat bucket index.
    #[inline]
    pub fn tile_coord(&self, tile_index: usize) -> IVec2 {
        IVec2::new(
            tile_index as i32 % self.tiles_x,
            tile_index as i32 / self.tiles_x,
        )
    }

    /// Clear one tile's bucket after the caller emitted it.
    pub fn clear_tile(&mut self, tile_index: usize) {
        self.bins[tile_index].clear();
    }

    /// Drop every bucketed face without emitting. Bucket entries index a
    /// record buffer owned by the current submission; after an aborted
    /// submission they must not survive into the next one.
    pub fn clear_all(&mut self) {
        while let Some(index) = self.dirty.pop() {
            self.bins[index as usize].clear();
        }
    }

    /// Flush every non-empty bucket through `emit`, clearing as it goes.
    /// Stops at the first emission error.
    pub fn flush_all<E>(
        &mut self,
        mut emit: impl FnMut(IVec2, &[u16]) -> Result<(), E>,
    ) -> Result<(), E> {
        // dirty may hold duplicates when a tile was force-flushed and then
        // refilled; empty bins are simply skipped.
        while let Some(index) = self.dirty.pop() {
            let index = index as usize;
            if self.bins[index].is_empty() {
                continue;
            }
            let tile = IVec2::new(index as i32 % self.tiles_x, index as i32 / self.tiles_x);
            emit(tile, &self.bins[index])?;
            self.bins[index].clear();
            crate::count_call!(crate::perf::PIPELINE_COUNTERS.buckets_flushed);
        }
        Ok(())
    }
}
