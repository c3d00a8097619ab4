//! Frame termination when the emission sink runs out of record space:
//! the failing submission reports the error and everything emitted
//! before it stays intact.

use glam::{Mat4, Vec2, Vec3};
use tilebin::pipeline::{
    BufferExhausted, EmissionSink, EmitSpan, GeometryPipeline, NullShader, ObjectKind,
    PipelineConfig, PipelineError, PlaneRecord, SubmitStatus,
};
use tilebin::{ConvexPrimitive, Material, RegionRect, TranslucencyDepthKey, Viewport};

/// Sink with a fixed record budget, like a hardware display list.
struct BoundedSink {
    capacity: u32,
    used: u32,
    emissions: u32,
}

impl BoundedSink {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            used: 0,
            emissions: 0,
        }
    }
}

impl EmissionSink for BoundedSink {
    fn emit(
        &mut self,
        _rect: &RegionRect,
        records: &[PlaneRecord],
        _kind: ObjectKind,
        _depth: Option<&TranslucencyDepthKey>,
    ) -> Result<EmitSpan, BufferExhausted> {
        let count = records.len() as u32;
        if self.used + count > self.capacity {
            return Err(BufferExhausted);
        }
        let span = EmitSpan {
            start: self.used,
            count,
        };
        self.used += count;
        self.emissions += 1;
        Ok(span)
    }
}

fn viewport() -> Viewport {
    Viewport::new(640, 480, 32, 32, 1.0, Vec2::new(0.5, 0.375))
}

/// Head-on cube emitting exactly one record (its near face).
fn cube() -> ConvexPrimitive {
    ConvexPrimitive::cuboid(
        Vec3::new(-0.5, -0.5, 7.5),
        Vec3::new(0.5, 0.5, 8.5),
        Material::opaque(),
    )
}

#[test]
fn exhaustion_surfaces_as_an_error_and_keeps_prior_emissions() {
    let mut pipeline = GeometryPipeline::new(
        &viewport(),
        PipelineConfig::default(),
        NullShader,
        BoundedSink::new(3),
    );

    for _ in 0..3 {
        let status = pipeline.submit_convex(&cube(), &Mat4::IDENTITY).unwrap();
        assert_eq!(status, SubmitStatus::Emitted);
    }

    let err = pipeline.submit_convex(&cube(), &Mat4::IDENTITY).unwrap_err();
    assert!(matches!(err, PipelineError::BufferExhausted(_)));

    // Nothing submitted before the failure was lost.
    assert_eq!(pipeline.sink().used, 3);
    assert_eq!(pipeline.sink().emissions, 3);
}

#[test]
fn zero_capacity_fails_on_the_first_visible_primitive() {
    let mut pipeline = GeometryPipeline::new(
        &viewport(),
        PipelineConfig::default(),
        NullShader,
        BoundedSink::new(0),
    );
    // An offscreen primitive never reaches the sink.
    let behind = ConvexPrimitive::cuboid(
        Vec3::new(-1.0, -1.0, -5.0),
        Vec3::new(1.0, 1.0, -3.0),
        Material::opaque(),
    );
    assert_eq!(
        pipeline.submit_convex(&behind, &Mat4::IDENTITY).unwrap(),
        SubmitStatus::Offscreen
    );

    assert!(pipeline.submit_convex(&cube(), &Mat4::IDENTITY).is_err());
}
