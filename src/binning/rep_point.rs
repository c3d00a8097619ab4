//! Representative-point projection with near-clip substitution.
//!
//! Shading and texturing interpolate outward from one seed point per plane.
//! When the true projection of that point falls behind the near clip or far
//! outside the viewport, a finite extrapolated substitute is produced
//! instead; such points are good enough to seed interpolation but must
//! never drive tile-coverage decisions.

use glam::{Mat3, Vec2, Vec3};
use log::trace;

use crate::projection::{safe_recip, ProjectionState};

use super::TransformedPlane;

/// A 3x3 solve below this determinant magnitude is considered degenerate.
pub const DETERMINANT_EPS: f32 = 1.0e-20;

/// A corner-ray intersection with inverse depth below this is treated as
/// effectively at infinity, making the corner's own screen position a safe
/// stand-in for the plane.
pub const CORNER_INV_DEPTH_MAX: f32 = 1.0e-3;

/// How far outside the viewport a true projection may fall before the
/// substitute kicks in (3x enlarged viewport).
const VIEWPORT_MARGIN: f32 = 3.0;

/// Project a plane's representative point to screen space.
///
/// Returns the point and whether it is an extrapolated substitute. The
/// result is always finite.
pub fn project_rep(plane: &TransformedPlane, proj: &ProjectionState) -> (Vec2, bool) {
    if plane.rep_point.z >= proj.near_clip {
        let projected = proj.project(plane.rep_point);
        if projected.is_finite() && proj.within_enlarged_viewport(projected, VIEWPORT_MARGIN) {
            return (projected, false);
        }
    }
    (substitute_rep(plane, proj), true)
}

/// Fill `proj_rep`/`rep_extrapolated` for every visible plane in the bank.
pub fn project_reps(bank: &mut [TransformedPlane], proj: &ProjectionState) {
    for plane in bank.iter_mut() {
        if !plane.visible {
            continue;
        }
        let (point, extrapolated) = project_rep(plane, proj);
        plane.proj_rep = point;
        plane.rep_extrapolated = extrapolated;
        if extrapolated {
            crate::count_call!(crate::perf::PIPELINE_COUNTERS.rep_points_extrapolated);
        }
    }
}

/// Compute a bounded-error substitute for a representative point that does
/// not project cleanly.
fn substitute_rep(plane: &TransformedPlane, proj: &ProjectionState) -> Vec2 {
    // First choice: a viewport corner whose eye ray meets the plane far
    // away. The corner's own pixel is then a faithful stand-in.
    if let Some(corner) = best_corner(plane, proj) {
        return corner;
    }

    // Otherwise intersect the plane with each frustum side at the near
    // clip depth and keep the best-conditioned solve.
    if let Some(point) = best_side_intersection(plane, proj) {
        let projected = proj.project(Vec3::new(point.x, point.y, point.z.max(proj.near_clip)));
        if projected.is_finite() {
            return projected;
        }
    }

    trace!("rep-point substitution fell back to viewport centre");
    proj.centre
}

/// Try the four viewport corner rays. Picks the corner whose intersection
/// with the plane has the smallest non-negative inverse depth, accepting it
/// only when that intersection is effectively at infinity.
fn best_corner(plane: &TransformedPlane, proj: &ProjectionState) -> Option<Vec2> {
    let half = proj.half_extent;
    let corners = [
        (Vec3::new(-half.x, -half.y, 1.0), Vec2::new(0.0, 0.0)),
        (
            Vec3::new(half.x, -half.y, 1.0),
            Vec2::new(proj.device_width, 0.0),
        ),
        (
            Vec3::new(-half.x, half.y, 1.0),
            Vec2::new(0.0, proj.device_height),
        ),
        (
            Vec3::new(half.x, half.y, 1.0),
            Vec2::new(proj.device_width, proj.device_height),
        ),
    ];

    let inv_d = safe_recip(plane.d);
    let mut best: Option<(f32, Vec2)> = None;
    for (dir, pixel) in corners {
        // Ray P = t * dir meets the plane at t = -d / (n . dir); with
        // dir.z = 1 the inverse depth along the ray is -(n . dir) / d.
        let inv_depth = -plane.normal.dot(dir) * inv_d;
        if inv_depth < 0.0 {
            continue;
        }
        match best {
            Some((current, _)) if current <= inv_depth => {}
            _ => best = Some((inv_depth, pixel)),
        }
    }

    match best {
        Some((inv_depth, pixel)) if inv_depth < CORNER_INV_DEPTH_MAX => Some(pixel),
        _ => None,
    }
}

/// Intersect the plane with each of the four frustum side planes at
/// z = near. Each candidate is a 3x3 linear system; the one with the
/// largest determinant magnitude is the best conditioned.
fn best_side_intersection(plane: &TransformedPlane, proj: &ProjectionState) -> Option<Vec3> {
    let half = proj.half_extent;
    // Frustum side planes through the origin: n_side . P = 0.
    let sides = [
        Vec3::new(1.0, 0.0, half.x),  // left:  x = -half.x * z
        Vec3::new(1.0, 0.0, -half.x), // right: x =  half.x * z
        Vec3::new(0.0, 1.0, half.y),  // top:   y = -half.y * z
        Vec3::new(0.0, 1.0, -half.y), // bottom: y =  half.y * z
    ];

    let mut best: Option<(f32, Vec3)> = None;
    for side in sides {
        // Rows: plane (n . P = -d), side (n_side . P = 0), depth (z = near).
        let m = Mat3::from_cols(
            Vec3::new(plane.normal.x, side.x, 0.0),
            Vec3::new(plane.normal.y, side.y, 0.0),
            Vec3::new(plane.normal.z, side.z, 1.0),
        );
        let det = m.determinant();
        if det.abs() < DETERMINANT_EPS {
            continue;
        }
        let rhs = Vec3::new(-plane.d, 0.0, proj.near_clip);
        let point = m.inverse() * rhs;
        if !point.is_finite() {
            continue;
        }
        match best {
            Some((best_det, _)) if best_det >= det.abs() => {}
            _ => best = Some((det.abs(), point)),
        }
    }

    best.map(|(_, point)| point)
}
