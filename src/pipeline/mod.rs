//! Geometry pipeline orchestrator.
//!
//! Owns the per-frame flow from submitted primitives to the emitted
//! per-tile record stream: classification, representative-point
//! projection, region derivation, per-batch shading through the
//! [`PlaneShader`] collaborator and emission through the
//! [`EmissionSink`]. Shading results are opaque to the pipeline; it only
//! resolves each batch's shading/texture modes and forwards them.

use glam::{Mat3, Mat4, Vec3};
use log::{debug, warn};
use thiserror::Error;

use crate::binning::{
    bin_face, classify_planes, from_bounding_box, from_plane_sampling, project_reps,
    region_depth_key, transform_vertices, BinnedFace, ClassifyOptions, ClassifyOutcome,
    FaceBuckets, PlaneCategory, PlaneCategoryLists, TransformedPlane, TransformedVertex,
};
use crate::packed::{CoefficientFormat, EncodedCoefficient};
use crate::projection::{ProjectionState, Viewport};
use crate::scene::{
    ConvexPrimitive, CullMode, Material, Mesh, Plane, ShadingMode, TextureMode,
};

/// Emission class of a record run. Downstream resolvers treat these
/// streams differently, the pipeline only labels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Opaque,
    Translucent,
    ShadowVolume,
    LightVolume,
}

/// Where a record run landed in the sink's backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitSpan {
    pub start: u32,
    pub count: u32,
}

/// The sink ran out of record space. The frame stops at the primitive
/// that hit the limit; everything emitted before it stays valid.
#[derive(Debug, Error)]
#[error("emission buffer exhausted")]
pub struct BufferExhausted;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("emission buffer exhausted, frame stopped")]
    BufferExhausted(#[from] BufferExhausted),
}

/// Shading output for one plane. The pipeline never inspects the words,
/// it carries them from the shader to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneParams {
    pub words: [u32; 4],
}

/// One emitted plane: encoded coefficients plus shading parameters.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRecord {
    pub coeffs: EncodedCoefficient,
    pub params: PlaneParams,
}

/// Batch-level context handed to the shader alongside the planes.
#[derive(Debug, Clone, Copy)]
pub struct ShadeContext {
    pub shading: ShadingMode,
    pub texture: TextureMode,
    pub fog: bool,
}

/// Produces per-plane shading parameters for one material batch. Must
/// push exactly one [`PlaneParams`] per entry of `indices`, in order.
pub trait PlaneShader {
    fn shade(
        &mut self,
        bank: &[TransformedPlane],
        indices: &[u16],
        ctx: &ShadeContext,
        out: &mut Vec<PlaneParams>,
    );
}

/// Shader producing default parameters; enough for binning-only use and
/// for shadow/light volumes which carry no surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullShader;

impl PlaneShader for NullShader {
    fn shade(
        &mut self,
        _bank: &[TransformedPlane],
        indices: &[u16],
        _ctx: &ShadeContext,
        out: &mut Vec<PlaneParams>,
    ) {
        out.extend(indices.iter().map(|_| PlaneParams::default()));
    }
}

/// Receives finished record runs together with their tile rectangle.
pub trait EmissionSink {
    fn emit(
        &mut self,
        rect: &crate::binning::RegionRect,
        records: &[PlaneRecord],
        kind: ObjectKind,
        depth: Option<&crate::binning::TranslucencyDepthKey>,
    ) -> Result<EmitSpan, BufferExhausted>;
}

/// Frame-constant pipeline switches.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub coefficient_format: CoefficientFormat,
    /// Master texturing switch; off downgrades every batch to untextured.
    pub textured: bool,
    /// Master smooth-shading switch; off downgrades to flat.
    pub smooth_shading: bool,
    pub fog: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            coefficient_format: CoefficientFormat::default(),
            textured: true,
            smooth_shading: true,
            fog: false,
        }
    }
}

impl PipelineConfig {
    /// Resolve a material against the frame switches.
    fn resolve(&self, material: &Material) -> ShadeContext {
        ShadeContext {
            shading: if material.smooth_shaded && self.smooth_shading {
                ShadingMode::Smooth
            } else {
                ShadingMode::Flat
            },
            texture: if self.textured {
                material.texture
            } else {
                TextureMode::None
            },
            fog: self.fog,
        }
    }
}

/// What became of one submitted primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// At least one record run reached the sink.
    Emitted,
    /// Provably contributes nothing to the frame.
    Offscreen,
    /// Dropped without classification (scratch reservation failed or the
    /// primitive exceeds the plane-index range).
    Skipped,
}

/// Per-frame scratch buffers, reused across submissions.
#[derive(Debug, Default)]
struct FrameScratch {
    bank: Vec<TransformedPlane>,
    lists: PlaneCategoryLists,
    verts: Vec<TransformedVertex>,
    face_planes: Vec<Plane>,
    gathered: Vec<u16>,
    binned: Vec<Option<BinnedFace>>,
    params: Vec<PlaneParams>,
    records: Vec<PlaneRecord>,
    bucket_records: Vec<PlaneRecord>,
    buckets: FaceBuckets,
}

impl FrameScratch {
    /// Grow the scratch for a primitive of the given size. Failure means
    /// the allocator refused; the primitive is skipped rather than
    /// aborting the frame.
    fn reserve(&mut self, planes: usize, verts: usize) -> bool {
        self.bank.try_reserve(planes).is_ok()
            && self.records.try_reserve(planes).is_ok()
            && self.verts.try_reserve(verts).is_ok()
    }
}

/// The geometry pipeline. One instance per output device; submissions
/// are strictly sequential within a frame.
pub struct GeometryPipeline<S, E> {
    pub proj: ProjectionState,
    pub config: PipelineConfig,
    shader: S,
    sink: E,
    scratch: FrameScratch,
}

impl<S: PlaneShader, E: EmissionSink> GeometryPipeline<S, E> {
    pub fn new(viewport: &Viewport, config: PipelineConfig, shader: S, sink: E) -> Self {
        let proj = ProjectionState::new(viewport);
        let mut scratch = FrameScratch::default();
        scratch.buckets.ensure_grid(&proj);
        Self {
            proj,
            config,
            shader,
            sink,
            scratch,
        }
    }

    /// Reconfigure for a new viewport; tile-grid scratch is resized.
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.proj = ProjectionState::new(viewport);
        self.scratch.buckets.ensure_grid(&self.proj);
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut E {
        &mut self.sink
    }

    /// Submit a convex solid.
    pub fn submit_convex(
        &mut self,
        prim: &ConvexPrimitive,
        transform: &Mat4,
    ) -> Result<SubmitStatus, PipelineError> {
        if prim.planes.len() > u16::MAX as usize {
            warn!("skipping solid with {} planes", prim.planes.len());
            return Ok(SubmitStatus::Skipped);
        }
        if !self.scratch.reserve(prim.planes.len(), 0) {
            warn!("scratch reservation failed, skipping solid");
            return Ok(SubmitStatus::Skipped);
        }

        let outcome = classify_planes(
            &prim.planes,
            transform,
            ClassifyOptions::convex(prim.see_inside),
            &self.proj,
            &mut self.scratch.bank,
            &mut self.scratch.lists,
        );
        if outcome == ClassifyOutcome::WholeObjectOffscreen {
            return Ok(SubmitStatus::Offscreen);
        }

        let lists = &self.scratch.lists;
        let visible_total = lists.count(PlaneCategory::ForwardVisible)
            + lists.count(PlaneCategory::ReverseVisible)
            + lists
                .indices(PlaneCategory::Perpendicular)
                .iter()
                .filter(|&&i| self.scratch.bank[i as usize].visible)
                .count();
        if visible_total == 0 {
            return Ok(SubmitStatus::Offscreen);
        }

        project_reps(&mut self.scratch.bank, &self.proj);

        // Bounded solids bin through their transformed bounding box;
        // unbounded ones sample their planes instead.
        let rect = match &prim.bounds {
            Some(bounds) => {
                let mut min = Vec3::splat(f32::INFINITY);
                let mut max = Vec3::splat(f32::NEG_INFINITY);
                for corner in bounds.corners() {
                    let cam = transform.transform_point3(corner);
                    min = min.min(cam);
                    max = max.max(cam);
                }
                from_bounding_box(min, max, &self.proj)
            }
            None => from_plane_sampling(&self.scratch.bank, lists, &self.proj),
        };
        let Some(rect) = rect else {
            return Ok(SubmitStatus::Offscreen);
        };

        // One record run per material batch, preserving submission order.
        let mut emitted = false;
        let mut start = 0usize;
        for batch in &prim.batches {
            let end = start + batch.count;
            self.scratch.gathered.clear();
            for (bank_index, plane) in self.scratch.bank.iter().enumerate() {
                let source = plane.source as usize;
                if source >= start && source < end && plane.visible {
                    self.scratch.gathered.push(bank_index as u16);
                }
            }
            start = end;
            if self.scratch.gathered.is_empty() {
                continue;
            }

            let ctx = self.config.resolve(&batch.material);
            self.scratch.params.clear();
            self.shader.shade(
                &self.scratch.bank,
                &self.scratch.gathered,
                &ctx,
                &mut self.scratch.params,
            );

            self.scratch.records.clear();
            for (&index, params) in self.scratch.gathered.iter().zip(&self.scratch.params) {
                self.scratch.records.push(PlaneRecord {
                    coeffs: self
                        .config
                        .coefficient_format
                        .encode(&self.scratch.bank[index as usize].coeffs),
                    params: *params,
                });
            }

            let (kind, depth);
            if batch.material.translucent {
                kind = ObjectKind::Translucent;
                depth = Some(region_depth_key(
                    &self.scratch.bank,
                    &self.scratch.lists,
                    &rect,
                    &self.proj,
                ));
            } else {
                kind = ObjectKind::Opaque;
                depth = None;
            }
            self.sink
                .emit(&rect, &self.scratch.records, kind, depth.as_ref())?;
            crate::count_add!(
                crate::perf::PIPELINE_COUNTERS.records_emitted,
                self.scratch.records.len() as u64
            );
            emitted = true;
        }

        Ok(if emitted {
            SubmitStatus::Emitted
        } else {
            SubmitStatus::Offscreen
        })
    }

    /// Submit a mesh, binning face by face.
    pub fn submit_mesh(
        &mut self,
        mesh: &Mesh,
        transform: &Mat4,
    ) -> Result<SubmitStatus, PipelineError> {
        if mesh.faces.len() > u16::MAX as usize {
            warn!("skipping mesh with {} faces", mesh.faces.len());
            return Ok(SubmitStatus::Skipped);
        }
        if !self.scratch.reserve(mesh.faces.len(), mesh.vertices.len()) {
            warn!("scratch reservation failed, skipping mesh");
            return Ok(SubmitStatus::Skipped);
        }
        // A submission that stopped on a full sink may have left bucketed
        // faces indexing its records buffer; they must not reach this
        // submission's flush.
        self.scratch.buckets.clear_all();

        self.scratch.face_planes.clear();
        self.scratch
            .face_planes
            .extend(mesh.faces.iter().map(|face| face.plane));

        // Faces never reject the whole mesh; a covering face only drops
        // itself.
        classify_planes(
            &self.scratch.face_planes,
            transform,
            ClassifyOptions::mesh_faces(),
            &self.proj,
            &mut self.scratch.bank,
            &mut self.scratch.lists,
        );
        if self.scratch.bank.is_empty() {
            return Ok(SubmitStatus::Offscreen);
        }

        let mirrored = Mat3::from_mat4(*transform).determinant() < 0.0;
        let cull = mesh.cull.under_mirroring(mirrored);

        project_reps(&mut self.scratch.bank, &self.proj);
        transform_vertices(&mesh.vertices, transform, &self.proj, &mut self.scratch.verts);

        let mut emitted = false;
        let mut start = 0usize;
        for batch in &mesh.batches {
            let end = start + batch.count;
            self.scratch.gathered.clear();
            for (bank_index, plane) in self.scratch.bank.iter().enumerate() {
                let source = plane.source as usize;
                if source < start || source >= end || !plane.visible {
                    continue;
                }
                if face_culled(plane.category, cull) {
                    crate::count_call!(crate::perf::PIPELINE_COUNTERS.faces_culled);
                    continue;
                }
                self.scratch.gathered.push(bank_index as u16);
            }
            start = end;
            if self.scratch.gathered.is_empty() {
                continue;
            }

            // Bin every gathered face before shading: a face's
            // vertex-derived representative point supersedes the
            // plane-level one as the shading seed.
            self.scratch.binned.clear();
            for &bank_index in &self.scratch.gathered {
                let plane = &self.scratch.bank[bank_index as usize];
                let face = &mesh.faces[plane.source as usize];
                let binned = bin_face(face, plane, &self.scratch.verts, &self.proj);
                if let Some(binned) = &binned {
                    let plane = &mut self.scratch.bank[bank_index as usize];
                    plane.proj_rep = binned.rep;
                    plane.rep_extrapolated = binned.rep_extrapolated;
                }
                self.scratch.binned.push(binned);
            }

            let ctx = self.config.resolve(&batch.material);
            self.scratch.params.clear();
            self.shader.shade(
                &self.scratch.bank,
                &self.scratch.gathered,
                &ctx,
                &mut self.scratch.params,
            );

            self.scratch.records.clear();
            for (&index, params) in self.scratch.gathered.iter().zip(&self.scratch.params) {
                self.scratch.records.push(PlaneRecord {
                    coeffs: self
                        .config
                        .coefficient_format
                        .encode(&self.scratch.bank[index as usize].coeffs),
                    params: *params,
                });
            }

            let translucent = batch.material.translucent;
            for (record_index, binned) in self.scratch.binned.iter().enumerate() {
                let Some(binned) = binned else {
                    continue;
                };

                if !translucent && binned.rect.is_single_tile() && !binned.z_clipped {
                    // Opaque single-tile faces batch up per tile.
                    let full = self
                        .scratch
                        .buckets
                        .push(binned.rect.first_tile(), record_index as u16);
                    if let Some(tile_index) = full {
                        flush_tile(
                            &mut self.scratch.buckets,
                            tile_index,
                            &self.scratch.records,
                            &mut self.scratch.bucket_records,
                            &mut self.sink,
                        )?;
                    }
                    emitted = true;
                    continue;
                }

                let depth_key = translucent.then(|| {
                    crate::binning::TranslucencyDepthKey::flat(binned.inv_depth)
                });
                let kind = if translucent {
                    ObjectKind::Translucent
                } else {
                    ObjectKind::Opaque
                };
                self.sink.emit(
                    &binned.rect,
                    &self.scratch.records[record_index..record_index + 1],
                    kind,
                    depth_key.as_ref(),
                )?;
                crate::count_call!(crate::perf::PIPELINE_COUNTERS.records_emitted);
                emitted = true;
            }

            // Remaining buckets drain before the records buffer is reused
            // by the next batch.
            let records = &self.scratch.records;
            let bucket_records = &mut self.scratch.bucket_records;
            let sink = &mut self.sink;
            self.scratch.buckets.flush_all(|tile, indices| {
                bucket_records.clear();
                bucket_records.extend(indices.iter().map(|&i| records[i as usize]));
                sink.emit(
                    &crate::binning::RegionRect::single(tile),
                    bucket_records,
                    ObjectKind::Opaque,
                    None,
                )?;
                crate::count_add!(
                    crate::perf::PIPELINE_COUNTERS.records_emitted,
                    bucket_records.len() as u64
                );
                Ok::<(), BufferExhausted>(())
            })?;
        }

        Ok(if emitted {
            SubmitStatus::Emitted
        } else {
            SubmitStatus::Offscreen
        })
    }

    /// Submit a shadow or light volume: a closed plane set binned through
    /// plane sampling, emitted with default parameters.
    pub fn submit_volume(
        &mut self,
        planes: &[Plane],
        transform: &Mat4,
        kind: ObjectKind,
    ) -> Result<SubmitStatus, PipelineError> {
        debug_assert!(matches!(
            kind,
            ObjectKind::ShadowVolume | ObjectKind::LightVolume
        ));
        if planes.len() > u16::MAX as usize {
            warn!("skipping volume with {} planes", planes.len());
            return Ok(SubmitStatus::Skipped);
        }
        if !self.scratch.reserve(planes.len(), 0) {
            warn!("scratch reservation failed, skipping volume");
            return Ok(SubmitStatus::Skipped);
        }

        let outcome = classify_planes(
            planes,
            transform,
            ClassifyOptions::volume(),
            &self.proj,
            &mut self.scratch.bank,
            &mut self.scratch.lists,
        );
        if outcome == ClassifyOutcome::WholeObjectOffscreen {
            return Ok(SubmitStatus::Offscreen);
        }
        project_reps(&mut self.scratch.bank, &self.proj);

        let Some(rect) = from_plane_sampling(&self.scratch.bank, &self.scratch.lists, &self.proj)
        else {
            return Ok(SubmitStatus::Offscreen);
        };

        self.scratch.records.clear();
        for plane in &self.scratch.bank {
            if !plane.visible {
                continue;
            }
            self.scratch.records.push(PlaneRecord {
                coeffs: self.config.coefficient_format.encode(&plane.coeffs),
                params: PlaneParams::default(),
            });
        }
        if self.scratch.records.is_empty() {
            return Ok(SubmitStatus::Offscreen);
        }

        self.sink.emit(&rect, &self.scratch.records, kind, None)?;
        crate::count_add!(
            crate::perf::PIPELINE_COUNTERS.records_emitted,
            self.scratch.records.len() as u64
        );
        debug!("volume emitted over {} tiles", rect.tile_count());
        Ok(SubmitStatus::Emitted)
    }
}

/// Whether a face of the given category is removed by the cull mode.
fn face_culled(category: PlaneCategory, cull: CullMode) -> bool {
    match cull {
        CullMode::None => false,
        CullMode::Back => matches!(
            category,
            PlaneCategory::ReverseVisible | PlaneCategory::ReverseInvisible
        ),
        CullMode::Front => matches!(
            category,
            PlaneCategory::ForwardVisible | PlaneCategory::ForwardInvisible
        ),
    }
}

fn flush_tile<E: EmissionSink>(
    buckets: &mut FaceBuckets,
    tile_index: usize,
    records: &[PlaneRecord],
    bucket_records: &mut Vec<PlaneRecord>,
    sink: &mut E,
) -> Result<(), BufferExhausted> {
    bucket_records.clear();
    bucket_records.extend(
        buckets
            .tile_faces(tile_index)
            .iter()
            .map(|&i| records[i as usize]),
    );
    let tile = buckets.tile_coord(tile_index);
    sink.emit(
        &crate::binning::RegionRect::single(tile),
        bucket_records,
        ObjectKind::Opaque,
        None,
    )?;
    crate::count_add!(
        crate::perf::PIPELINE_COUNTERS.records_emitted,
        bucket_records.len() as u64
    );
    buckets.clear_tile(tile_index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{RegionRect, TranslucencyDepthKey};
    use glam::Vec2;

    /// Sink that records every emission, optionally failing after a limit.
    #[derive(Default)]
    struct RecordingSink {
        emissions: Vec<(RegionRect, usize, ObjectKind, Option<TranslucencyDepthKey>)>,
        limit: Option<usize>,
        cursor: u32,
    }

    impl EmissionSink for RecordingSink {
        fn emit(
            &mut self,
            rect: &RegionRect,
            records: &[PlaneRecord],
            kind: ObjectKind,
            depth: Option<&TranslucencyDepthKey>,
        ) -> Result<EmitSpan, BufferExhausted> {
            if let Some(limit) = self.limit {
                if self.emissions.len() >= limit {
                    return Err(BufferExhausted);
                }
            }
            self.emissions
                .push((*rect, records.len(), kind, depth.copied()));
            let span = EmitSpan {
                start: self.cursor,
                count: records.len() as u32,
            };
            self.cursor += records.len() as u32;
            Ok(span)
        }
    }

    fn pipeline(sink: RecordingSink) -> GeometryPipeline<NullShader, RecordingSink> {
        let viewport = Viewport::new(640, 480, 32, 32, 1.0, Vec2::new(0.5, 0.375));
        GeometryPipeline::new(&viewport, PipelineConfig::default(), NullShader, sink)
    }

    #[test]
    fn cuboid_emits_its_visible_faces() {
        let mut p = pipeline(RecordingSink::default());
        let prim = crate::scene::ConvexPrimitive::cuboid(
            Vec3::new(-0.5, -0.5, 7.5),
            Vec3::new(0.5, 0.5, 8.5),
            Material::opaque(),
        );
        let status = p.submit_convex(&prim, &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Emitted);
        let sink = p.sink();
        assert_eq!(sink.emissions.len(), 1);
        // Head-on only the near z face is visible.
        let (_, count, kind, depth) = sink.emissions[0];
        assert_eq!(count, 1);
        assert_eq!(kind, ObjectKind::Opaque);
        assert!(depth.is_none());
    }

    #[test]
    fn translucent_batch_carries_a_depth_key() {
        let mut p = pipeline(RecordingSink::default());
        let prim = crate::scene::ConvexPrimitive::cuboid(
            Vec3::new(-0.5, -0.5, 7.5),
            Vec3::new(0.5, 0.5, 8.5),
            Material::translucent(),
        );
        p.submit_convex(&prim, &Mat4::IDENTITY).unwrap();
        let (_, _, kind, depth) = p.sink().emissions[0];
        assert_eq!(kind, ObjectKind::Translucent);
        let key = depth.unwrap();
        // Near face at z = 7.5: inverse depth 1/7.5 everywhere.
        assert!((key.base - 1.0 / 7.5).abs() < 1e-4);
        assert!(key.d_dx.abs() < 1e-5);
        assert!(key.d_dy.abs() < 1e-5);
    }

    #[test]
    fn offscreen_cuboid_reports_offscreen() {
        let mut p = pipeline(RecordingSink::default());
        let prim = crate::scene::ConvexPrimitive::cuboid(
            Vec3::new(-1.0, -1.0, -5.0),
            Vec3::new(1.0, 1.0, -3.0),
            Material::opaque(),
        );
        let status = p.submit_convex(&prim, &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Offscreen);
        assert!(p.sink().emissions.is_empty());
    }

    #[test]
    fn mesh_single_tile_faces_batch_per_tile() {
        use crate::scene::{Face, Mesh, Plane};

        // Two small camera-facing triangles landing in the same tile,
        // offset so neither straddles a tile boundary.
        let vertices = vec![
            Vec3::new(0.15, -0.05, 10.0),
            Vec3::new(0.25, -0.05, 10.0),
            Vec3::new(0.2, 0.05, 10.0),
            Vec3::new(0.15, 0.06, 10.0),
            Vec3::new(0.25, 0.06, 10.0),
            Vec3::new(0.2, 0.12, 10.0),
        ];
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        let faces = vec![
            Face::triangle(0, 1, 2, plane),
            Face::triangle(3, 4, 5, plane),
        ];
        let mesh = Mesh::with_material(vertices, faces, Material::opaque());

        let mut p = pipeline(RecordingSink::default());
        let status = p.submit_mesh(&mesh, &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Emitted);
        // One batched emission covering both faces.
        let sink = p.sink();
        assert_eq!(sink.emissions.len(), 1);
        let (rect, count, kind, _) = sink.emissions[0];
        assert!(rect.is_single_tile());
        assert_eq!(count, 2);
        assert_eq!(kind, ObjectKind::Opaque);
    }

    #[test]
    fn aborted_mesh_leaves_no_stale_buckets() {
        use crate::scene::{Face, Mesh, Plane};

        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        // Two single-tile triangles that bucket, then a wide one that emits
        // individually and hits the full sink.
        let vertices = vec![
            Vec3::new(0.15, -0.05, 10.0),
            Vec3::new(0.25, -0.05, 10.0),
            Vec3::new(0.2, 0.05, 10.0),
            Vec3::new(0.15, 0.06, 10.0),
            Vec3::new(0.25, 0.06, 10.0),
            Vec3::new(0.2, 0.12, 10.0),
            Vec3::new(-2.0, -0.5, 10.0),
            Vec3::new(2.0, -0.5, 10.0),
            Vec3::new(0.0, 0.5, 10.0),
        ];
        let faces = vec![
            Face::triangle(0, 1, 2, plane),
            Face::triangle(3, 4, 5, plane),
            Face::triangle(6, 7, 8, plane),
        ];
        let mesh = Mesh::with_material(vertices, faces, Material::opaque());

        let sink = RecordingSink {
            limit: Some(0),
            ..RecordingSink::default()
        };
        let mut p = pipeline(sink);
        let err = p.submit_mesh(&mesh, &Mat4::IDENTITY).unwrap_err();
        assert!(matches!(err, PipelineError::BufferExhausted(_)));
        assert!(p.sink().emissions.is_empty());

        // The sink recovers; a later one-face mesh must emit exactly its
        // own face, untainted by the aborted submission's buckets.
        p.sink_mut().limit = None;
        let small = Mesh::with_material(
            vec![
                Vec3::new(0.15, -0.05, 10.0),
                Vec3::new(0.25, -0.05, 10.0),
                Vec3::new(0.2, 0.05, 10.0),
            ],
            vec![Face::triangle(0, 1, 2, plane)],
            Material::opaque(),
        );
        let status = p.submit_mesh(&small, &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Emitted);
        let sink = p.sink();
        assert_eq!(sink.emissions.len(), 1);
        let (rect, count, kind, _) = sink.emissions[0];
        assert!(rect.is_single_tile());
        assert_eq!(count, 1);
        assert_eq!(kind, ObjectKind::Opaque);
    }

    #[test]
    fn mesh_shading_sees_vertex_rep_point() {
        use crate::scene::{Face, Mesh, Plane};

        struct RepCaptureShader {
            reps: Vec<Vec2>,
        }
        impl PlaneShader for RepCaptureShader {
            fn shade(
                &mut self,
                bank: &[TransformedPlane],
                indices: &[u16],
                _ctx: &ShadeContext,
                out: &mut Vec<PlaneParams>,
            ) {
                for &i in indices {
                    self.reps.push(bank[i as usize].proj_rep);
                }
                out.extend(indices.iter().map(|_| PlaneParams::default()));
            }
        }

        // The face plane's own point projects to the screen centre; the
        // face sits off to the right of it.
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        let vertices = vec![
            Vec3::new(0.15, -0.05, 10.0),
            Vec3::new(0.25, -0.05, 10.0),
            Vec3::new(0.2, 0.05, 10.0),
        ];
        let faces = vec![Face::triangle(0, 1, 2, plane)];
        let mesh = Mesh::with_material(vertices, faces, Material::opaque());

        let viewport = Viewport::new(640, 480, 32, 32, 1.0, Vec2::new(0.5, 0.375));
        let mut p = GeometryPipeline::new(
            &viewport,
            PipelineConfig::default(),
            RepCaptureShader { reps: Vec::new() },
            RecordingSink::default(),
        );
        p.submit_mesh(&mesh, &Mat4::IDENTITY).unwrap();

        assert_eq!(p.shader.reps.len(), 1);
        let rep = p.shader.reps[0];
        // First vertex: x = 320 + 0.15/10 * 640, y = 240 - 0.05/10 * 640.
        assert!((rep.x - 329.6).abs() < 1e-3, "rep.x was {}", rep.x);
        assert!((rep.y - 236.8).abs() < 1e-3, "rep.y was {}", rep.y);
    }

    #[test]
    fn back_faces_are_culled() {
        use crate::scene::{Face, Mesh, Plane};

        let vertices = vec![
            Vec3::new(-0.5, -0.5, 10.0),
            Vec3::new(0.5, -0.5, 10.0),
            Vec3::new(0.0, 0.5, 10.0),
        ];
        // Plane faces away from the camera (inward normal -Z, d > 0).
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let faces = vec![Face::triangle(0, 1, 2, plane)];
        let mesh = Mesh::with_material(vertices, faces, Material::opaque());

        let mut p = pipeline(RecordingSink::default());
        let status = p.submit_mesh(&mesh, &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Offscreen);
        assert!(p.sink().emissions.is_empty());
    }

    #[test]
    fn exhausted_sink_stops_the_frame() {
        let sink = RecordingSink {
            limit: Some(1),
            ..RecordingSink::default()
        };
        let mut p = pipeline(sink);
        let prim = crate::scene::ConvexPrimitive::cuboid(
            Vec3::new(-0.5, -0.5, 7.5),
            Vec3::new(0.5, 0.5, 8.5),
            Material::opaque(),
        );
        assert!(p.submit_convex(&prim, &Mat4::IDENTITY).is_ok());
        let err = p.submit_convex(&prim, &Mat4::IDENTITY).unwrap_err();
        assert!(matches!(err, PipelineError::BufferExhausted(_)));
        // The first primitive's emission is intact.
        assert_eq!(p.sink().emissions.len(), 1);
    }
}
