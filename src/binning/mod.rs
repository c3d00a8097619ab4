//! Plane classification and tile binning.
//!
//! Everything between scene-space primitives and the per-tile record
//! stream lives here: classifying transformed planes against the view,
//! projecting representative points (with substitution when the true
//! point is unusable), deriving tile rectangles for solids, and binning
//! meshes face by face.

pub mod classify;
pub mod mesh_faces;
pub mod region;
pub mod rep_point;

pub use classify::{
    classify_planes, ClassifyOptions, ClassifyOutcome, PlaneCategory, PlaneCategoryLists,
    TransformedPlane, CATEGORY_COUNT,
};
pub use mesh_faces::{bin_face, transform_vertices, BinnedFace, FaceBuckets, TransformedVertex};
pub use region::{
    from_bounding_box, from_plane_sampling, region_depth_key, RegionRect, TranslucencyDepthKey,
};
pub use rep_point::{project_rep, project_reps};
