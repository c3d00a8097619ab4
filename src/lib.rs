/// Tile binning pipeline - per-primitive geometry stage for a tile-based
/// deferred renderer
/// Built with compartmentalized benchmarkable components
pub mod binning;
pub mod packed;
pub mod perf;
pub mod pipeline;
pub mod projection;
pub mod scene;
pub mod shadow;

pub use binning::{
    ClassifyOptions, ClassifyOutcome, PlaneCategory, PlaneCategoryLists, RegionRect,
    TransformedPlane, TranslucencyDepthKey,
};
pub use packed::{CoefficientFormat, EncodedCoefficient, PackedPlane};
pub use perf::{CounterSnapshot, StageCounters, PIPELINE_COUNTERS};
pub use pipeline::{
    EmissionSink, EmitSpan, GeometryPipeline, NullShader, ObjectKind, PipelineConfig,
    PipelineError, PlaneParams, PlaneRecord, PlaneShader, SubmitStatus,
};
pub use projection::{ProjectionState, Viewport};
pub use scene::{ConvexPrimitive, CullMode, Face, Material, Mesh, Plane};
pub use shadow::{build_volume, Light};
