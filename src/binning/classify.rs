//! Plane classification: camera-space transform, category assignment and
//! packed screen-space coefficients for a batch of object planes.
//!
//! Every input plane ends up in exactly one of the five categories, unless
//! it is individually dropped (degenerate or provably invisible) or the
//! whole primitive is rejected. Whole-object rejection short-circuits and
//! leaves the category lists in an unspecified state; callers must check
//! the outcome before touching them.

use glam::{Mat3, Mat4, Vec2, Vec3};
use log::debug;

use crate::packed::PackedPlane;
use crate::projection::{safe_recip, ProjectionState};
use crate::scene::Plane;

/// Transformed normals shorter than this are treated as degenerate and the
/// plane is dropped rather than classified.
pub const DEGENERATE_NORMAL_EPS: f32 = 1.0e-10;

/// Classification of a plane relative to the camera.
///
/// Forward planes face the camera (camera in their negative half-space,
/// `d <= 0`); Reverse planes face away. Perpendicular planes are nearly
/// edge-on, where the standard coefficient derivation is numerically
/// unsafe and a rescaled form is used instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaneCategory {
    ForwardVisible = 0,
    ForwardInvisible = 1,
    ReverseVisible = 2,
    ReverseInvisible = 3,
    Perpendicular = 4,
}

pub const CATEGORY_COUNT: usize = 5;

/// Per-render derived plane, scratch lifetime of one primitive.
#[derive(Debug, Clone, Copy)]
pub struct TransformedPlane {
    /// Unit normal in camera space (inward convention).
    pub normal: Vec3,
    /// Camera-space plane offset (`normal · P + d = 0`).
    pub d: f32,
    pub category: PlaneCategory,
    /// Packed screen-space line-equation coefficients.
    pub coeffs: PackedPlane,
    /// Representative point in camera space.
    pub rep_point: Vec3,
    /// Projected representative point; filled by the rep-point projector.
    pub proj_rep: Vec2,
    /// True when `proj_rep` is an extrapolated substitute, only suitable
    /// for shading interpolation.
    pub rep_extrapolated: bool,
    /// Effective visibility after the see-inside / ignore-invisibility
    /// rules. Perpendicular planes keep their flag here since the category
    /// does not encode it.
    pub visible: bool,
    /// Index of the source plane in the primitive's plane list.
    pub source: u16,
}

/// Five ordered index lists into the transformed-plane bank, one per
/// category. Indices are bank positions, not source positions.
#[derive(Debug, Default)]
pub struct PlaneCategoryLists {
    lists: [Vec<u16>; CATEGORY_COUNT],
}

impl PlaneCategoryLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    #[inline]
    pub fn push(&mut self, category: PlaneCategory, bank_index: u16) {
        self.lists[category as usize].push(bank_index);
    }

    #[inline]
    pub fn indices(&self, category: PlaneCategory) -> &[u16] {
        &self.lists[category as usize]
    }

    #[inline]
    pub fn count(&self, category: PlaneCategory) -> usize {
        self.lists[category as usize].len()
    }

    /// Total planes filed across all categories.
    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }
}

/// Per-call knobs for the classifier.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    /// Reverse planes stay visible (camera may be inside the solid).
    pub see_inside: bool,
    /// Treat invisible-flagged planes as visible; used by the shadow- and
    /// light-volume paths.
    pub ignore_invisibility: bool,
    /// Allow a single covering plane to reject the whole primitive. True
    /// for convex solids (the plane bounds the solid), false for mesh
    /// faces (a covering face only drops itself).
    pub reject_covering: bool,
}

impl ClassifyOptions {
    pub fn convex(see_inside: bool) -> Self {
        Self {
            see_inside,
            ignore_invisibility: false,
            reject_covering: true,
        }
    }

    /// Mesh faces: reverse faces stay visible (back-face culling is the
    /// caller's decision, per cull mode) and a covering face only drops
    /// itself.
    pub fn mesh_faces() -> Self {
        Self {
            see_inside: true,
            ignore_invisibility: false,
            reject_covering: false,
        }
    }

    pub fn volume() -> Self {
        Self {
            see_inside: true,
            ignore_invisibility: true,
            reject_covering: true,
        }
    }
}

/// Result of classifying a primitive's planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// Primitive provably contributes nothing; category lists are
    /// unspecified and must not be consumed.
    WholeObjectOffscreen,
    /// Category lists form a total partition of the non-dropped planes.
    Classified,
}

/// Transform and classify `planes` into `bank`/`lists`.
///
/// The rotational part of the transform is applied to normals through the
/// inverse transpose, keeping them correct under non-uniform or mirrored
/// scale; `d` is recomputed from the transformed representative point.
pub fn classify_planes(
    planes: &[Plane],
    transform: &Mat4,
    opts: ClassifyOptions,
    proj: &ProjectionState,
    bank: &mut Vec<TransformedPlane>,
    lists: &mut PlaneCategoryLists,
) -> ClassifyOutcome {
    bank.clear();
    lists.clear();

    let rot = Mat3::from_mat4(*transform);
    let det = rot.determinant();
    // Inverse transpose degenerates with the matrix itself; a singular
    // transform flattens the primitive, so the plain rotation is as good
    // a fallback as any.
    let normal_matrix = if det.abs() > 1.0e-12 {
        rot.inverse().transpose()
    } else {
        rot
    };

    for (source, plane) in planes.iter().enumerate() {
        let raw = normal_matrix * plane.normal;
        let len = raw.length();
        if len < DEGENERATE_NORMAL_EPS {
            debug!("dropping plane {}: degenerate normal after transform", source);
            crate::count_call!(crate::perf::PIPELINE_COUNTERS.planes_dropped);
            continue;
        }
        let normal = raw / len;
        let rep_point = transform.transform_point3(plane.rep_point);
        let d = -normal.dot(rep_point);

        let centre_dot = normal.dot(proj.view_centre);
        let x_border = normal.x * proj.half_extent.x;
        let y_border = normal.y * proj.half_extent.y;
        let max_border = x_border.abs() + y_border.abs();

        let invisible = plane.invisible && !opts.ignore_invisibility;
        let facing = normal.z > 0.0;

        let (category, coeffs, visible) = if d.abs() > centre_dot.abs() + max_border {
            // Safe case: the plane stays clear of the eye across the whole
            // viewport, so 1/d is well conditioned.
            let inv_d = proj.overflow_rescale * safe_recip(d);
            let coeffs = packed_coeffs(normal, centre_dot, x_border, y_border, d, inv_d, proj);
            let forward = d <= 0.0;
            let visible = if forward {
                !invisible
            } else {
                opts.see_inside && !invisible
            };
            let category = match (forward, visible) {
                (true, true) => PlaneCategory::ForwardVisible,
                (true, false) => PlaneCategory::ForwardInvisible,
                (false, true) => PlaneCategory::ReverseVisible,
                (false, false) => PlaneCategory::ReverseInvisible,
            };
            (category, coeffs, visible)
        } else if d.abs() * proj.inv_near_clip <= centre_dot.abs() - max_border {
            // The plane lies nearer than the near clip along every viewport
            // ray. A facing plane of a convex solid then occludes the whole
            // viewport opening: nothing of the solid is renderable.
            if facing && opts.reject_covering {
                crate::count_call!(crate::perf::PIPELINE_COUNTERS.objects_rejected);
                return ClassifyOutcome::WholeObjectOffscreen;
            }
            crate::count_call!(crate::perf::PIPELINE_COUNTERS.planes_dropped);
            continue;
        } else {
            // Perpendicular case: nearly edge-on. Intersect with z =
            // rep.z (or the near plane when the rep point is nearer) for a
            // pseudo-offset, then rescale against the worst-case border.
            let z_ref = if rep_point.z > proj.near_clip {
                rep_point.z
            } else {
                proj.near_clip
            };
            let middle = centre_dot + d / z_ref;
            if middle >= max_border {
                if facing && opts.reject_covering {
                    crate::count_call!(crate::perf::PIPELINE_COUNTERS.objects_rejected);
                    return ClassifyOutcome::WholeObjectOffscreen;
                }
                crate::count_call!(crate::perf::PIPELINE_COUNTERS.planes_dropped);
                continue;
            }
            if middle <= -max_border {
                crate::count_call!(crate::perf::PIPELINE_COUNTERS.planes_dropped);
                continue;
            }
            // Sign negated relative to the safe case.
            let max_value = proj.overflow_rescale * safe_recip(middle.abs() + max_border);
            let coeffs =
                packed_coeffs(normal, centre_dot, x_border, y_border, d, -max_value, proj);
            (PlaneCategory::Perpendicular, coeffs, !invisible)
        };

        let bank_index = bank.len() as u16;
        bank.push(TransformedPlane {
            normal,
            d,
            category,
            coeffs,
            rep_point,
            proj_rep: Vec2::ZERO,
            rep_extrapolated: false,
            visible,
            source: source as u16,
        });
        lists.push(category, bank_index);
        crate::count_call!(crate::perf::PIPELINE_COUNTERS.planes_classified);
    }

    ClassifyOutcome::Classified
}

/// Derive the packed line equation from the camera-space normal and the
/// chosen reciprocal scale. `C` is the value at the top-left viewport
/// corner, so `eval` works directly in pixel coordinates.
#[inline]
fn packed_coeffs(
    normal: Vec3,
    centre_dot: f32,
    x_border: f32,
    y_border: f32,
    d: f32,
    scale: f32,
    proj: &ProjectionState,
) -> PackedPlane {
    PackedPlane {
        a: normal.x * proj.units_per_pixel.x * scale,
        b: normal.y * proj.units_per_pixel.y * scale,
        c: (centre_dot - x_border - y_border) * scale,
        d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Viewport;

    fn proj() -> ProjectionState {
        // 640x480, 32px tiles, near clip 1, ~53 degree horizontal FOV.
        ProjectionState::new(&Viewport::new(640, 480, 32, 32, 1.0, Vec2::new(0.5, 0.375)))
    }

    fn classify(
        planes: &[Plane],
        opts: ClassifyOptions,
    ) -> (Vec<TransformedPlane>, PlaneCategoryLists, ClassifyOutcome) {
        let proj = proj();
        let mut bank = Vec::new();
        let mut lists = PlaneCategoryLists::new();
        let outcome = classify_planes(planes, &Mat4::IDENTITY, opts, &proj, &mut bank, &mut lists);
        (bank, lists, outcome)
    }

    #[test]
    fn facing_plane_is_forward_visible() {
        // Wall at z = 10 facing the camera (inward normal +Z).
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        let (bank, lists, outcome) = classify(&[plane], ClassifyOptions::convex(false));
        assert_eq!(outcome, ClassifyOutcome::Classified);
        assert_eq!(lists.count(PlaneCategory::ForwardVisible), 1);
        assert!(bank[0].d < 0.0);
        assert!(bank[0].visible);
    }

    #[test]
    fn away_facing_plane_is_reverse_invisible_unless_see_inside() {
        // Far face of a solid: inward normal -Z, plane at z = 10.
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let (_, lists, _) = classify(&[plane], ClassifyOptions::convex(false));
        assert_eq!(lists.count(PlaneCategory::ReverseInvisible), 1);

        let (_, lists, _) = classify(&[plane], ClassifyOptions::convex(true));
        assert_eq!(lists.count(PlaneCategory::ReverseVisible), 1);
    }

    #[test]
    fn classification_is_a_total_partition() {
        let planes = vec![
            Plane::from_point_normal(Vec3::new(0.0, 0.0, 5.0), Vec3::Z),
            Plane::from_point_normal(Vec3::new(0.0, 0.0, 9.0), Vec3::NEG_Z),
            Plane::from_point_normal(Vec3::new(3.0, 0.0, 5.0), Vec3::NEG_X),
            Plane::from_point_normal(Vec3::new(-3.0, 0.0, 5.0), Vec3::X),
            // Nearly edge-on plane passing close to the eye.
            Plane::from_point_normal(
                Vec3::new(0.1, 0.0, 5.0),
                Vec3::new(1.0, 0.0, 0.02).normalize(),
            ),
        ];
        let (bank, lists, outcome) = classify(&planes, ClassifyOptions::convex(false));
        assert_eq!(outcome, ClassifyOutcome::Classified);
        assert_eq!(lists.total(), bank.len());
        // Each bank entry appears in exactly the list its category names.
        for (i, tp) in bank.iter().enumerate() {
            let holders = (0..CATEGORY_COUNT)
                .filter(|&c| {
                    let cat = match c {
                        0 => PlaneCategory::ForwardVisible,
                        1 => PlaneCategory::ForwardInvisible,
                        2 => PlaneCategory::ReverseVisible,
                        3 => PlaneCategory::ReverseInvisible,
                        _ => PlaneCategory::Perpendicular,
                    };
                    lists.indices(cat).contains(&(i as u16))
                })
                .count();
            assert_eq!(holders, 1, "plane {} must sit in exactly one list", i);
            assert_eq!(lists.indices(tp.category).contains(&(i as u16)), true);
        }
    }

    #[test]
    fn degenerate_normal_is_dropped_not_classified() {
        let mut bad = Plane::from_point_normal(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        bad.normal = Vec3::ZERO;
        let good = Plane::from_point_normal(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        let (bank, lists, outcome) = classify(&[bad, good], ClassifyOptions::convex(false));
        assert_eq!(outcome, ClassifyOutcome::Classified);
        assert_eq!(bank.len(), 1);
        assert_eq!(lists.total(), 1);
        assert_eq!(bank[0].source, 1);
    }

    #[test]
    fn invisible_flag_respected_and_ignorable() {
        let mut plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 10.0), Vec3::Z);
        plane.invisible = true;

        let (_, lists, _) = classify(&[plane], ClassifyOptions::convex(false));
        assert_eq!(lists.count(PlaneCategory::ForwardInvisible), 1);

        let (_, lists, _) = classify(&[plane], ClassifyOptions::volume());
        assert_eq!(lists.count(PlaneCategory::ForwardVisible), 1);
    }

    #[test]
    fn packed_coeffs_match_inverse_depth_on_axis_ray() {
        let proj = proj();
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 8.0), Vec3::Z);
        let mut bank = Vec::new();
        let mut lists = PlaneCategoryLists::new();
        classify_planes(
            &[plane],
            &Mat4::IDENTITY,
            ClassifyOptions::convex(false),
            &proj,
            &mut bank,
            &mut lists,
        );
        // Along the centre pixel the plane sits at depth 8.
        let inv = bank[0]
            .coeffs
            .inv_depth_at(proj.centre.x, proj.centre.y, proj.overflow_rescale);
        assert!((inv - 1.0 / 8.0).abs() < 1e-4, "inv depth was {}", inv);
    }

    #[test]
    fn classification_is_idempotent() {
        let planes = vec![
            Plane::from_point_normal(Vec3::new(0.0, 0.0, 5.0), Vec3::Z),
            Plane::from_point_normal(Vec3::new(2.0, 1.0, 7.0), Vec3::new(0.6, 0.0, 0.8)),
        ];
        let (bank_a, lists_a, _) = classify(&planes, ClassifyOptions::convex(false));
        let (bank_b, lists_b, _) = classify(&planes, ClassifyOptions::convex(false));
        assert_eq!(bank_a.len(), bank_b.len());
        for (a, b) in bank_a.iter().zip(&bank_b) {
            assert_eq!(a.category, b.category);
            assert_eq!(a.coeffs, b.coeffs);
            assert_eq!(a.d, b.d);
        }
        for cat in [
            PlaneCategory::ForwardVisible,
            PlaneCategory::ForwardInvisible,
            PlaneCategory::ReverseVisible,
            PlaneCategory::ReverseInvisible,
            PlaneCategory::Perpendicular,
        ] {
            assert_eq!(lists_a.indices(cat), lists_b.indices(cat));
        }
    }

    #[test]
    fn mirrored_transform_keeps_normals_correct() {
        let proj = proj();
        // Mirror in X. The wall at z = 10 still faces the camera.
        let mirror = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        let plane = Plane::from_point_normal(Vec3::new(3.0, 0.0, 10.0), Vec3::Z);
        let mut bank = Vec::new();
        let mut lists = PlaneCategoryLists::new();
        classify_planes(
            &[plane],
            &mirror,
            ClassifyOptions::convex(false),
            &proj,
            &mut bank,
            &mut lists,
        );
        assert_eq!(lists.count(PlaneCategory::ForwardVisible), 1);
        assert!((bank[0].normal - Vec3::Z).length() < 1e-6);
    }
}
