//! Shadow and light volume construction.
//!
//! A volume is derived from a convex solid's plane set: the lit faces
//! stay as the volume's cap against the light, and each silhouette edge
//! (where a lit and an unlit face meet) gains an extrusion plane parallel
//! to the light direction. The volume is open away from the light; the
//! scene's far geometry bounds it implicitly. The resulting plane set is
//! submitted through the pipeline's volume path, which classifies it with
//! invisibility ignored.

use glam::{Mat3, Vec3};

use crate::binning::classify::DEGENERATE_NORMAL_EPS;
use crate::scene::Plane;

/// Determinant threshold below which the silhouette edge-point solve is
/// treated as singular and the pair skipped.
const EDGE_DETERMINANT_EPS: f32 = 1.0e-12;

/// Tolerance when checking that an extrusion plane keeps the whole solid
/// on its inner side.
const CONTAINMENT_EPS: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy)]
pub enum Light {
    /// Parallel light; the vector is the direction the light travels.
    Directional(Vec3),
    /// Positional light at the given point.
    Point(Vec3),
}

impl Light {
    /// Direction the light travels through `point`.
    fn travel_at(&self, point: Vec3) -> Vec3 {
        match *self {
            Light::Directional(dir) => dir,
            Light::Point(pos) => point - pos,
        }
    }

    /// Whether the outward side of an inward-facing plane sees the light.
    fn lights(&self, plane: &Plane) -> bool {
        match *self {
            Light::Directional(dir) => plane.normal.dot(dir) > 0.0,
            Light::Point(pos) => plane.normal.dot(pos) + plane.d < 0.0,
        }
    }
}

/// Build the shadow (or light) volume plane set for a convex solid.
///
/// Returns an empty set when no face is lit, in which case the solid
/// casts nothing and submission should be skipped.
pub fn build_volume(planes: &[Plane], light: &Light) -> Vec<Plane> {
    let mut lit = Vec::new();
    let mut unlit = Vec::new();
    for plane in planes {
        if light.lights(plane) {
            lit.push(*plane);
        } else {
            unlit.push(*plane);
        }
    }
    if lit.is_empty() {
        return Vec::new();
    }

    // Centroid of the face representative points, used to orient
    // extrusion planes towards the solid.
    let centroid = planes.iter().map(|p| p.rep_point).sum::<Vec3>() / planes.len() as f32;

    let mut volume = lit.clone();
    for a in &lit {
        for b in &unlit {
            if let Some(plane) = extrude_edge(a, b, light, centroid, planes) {
                volume.push(plane);
            }
        }
    }
    volume
}

/// Extrusion plane through the intersection edge of a lit/unlit face
/// pair, parallel to the light through that edge. None when the pair is
/// parallel, the light grazes the edge, or the candidate plane would cut
/// into the solid (the pair was not an adjacent silhouette edge).
fn extrude_edge(
    lit: &Plane,
    unlit: &Plane,
    light: &Light,
    centroid: Vec3,
    all: &[Plane],
) -> Option<Plane> {
    let edge = lit.normal.cross(unlit.normal);
    if edge.length_squared() < EDGE_DETERMINANT_EPS {
        return None;
    }

    // Point on the intersection line, pinned along the edge near the two
    // faces' representative points.
    let mid = (lit.rep_point + unlit.rep_point) * 0.5;
    let m = Mat3::from_cols(
        Vec3::new(lit.normal.x, unlit.normal.x, edge.x),
        Vec3::new(lit.normal.y, unlit.normal.y, edge.y),
        Vec3::new(lit.normal.z, unlit.normal.z, edge.z),
    );
    if m.determinant().abs() < EDGE_DETERMINANT_EPS {
        return None;
    }
    let point = m.inverse() * Vec3::new(-lit.d, -unlit.d, edge.dot(mid));

    let travel = light.travel_at(point);
    let raw = edge.cross(travel);
    if raw.length() < DEGENERATE_NORMAL_EPS {
        return None;
    }
    let mut normal = raw.normalize();
    let mut d = -normal.dot(point);

    // Orient so the solid sits inside; the plane is parallel to the light
    // so the swept volume follows.
    if normal.dot(centroid) + d < 0.0 {
        normal = -normal;
        d = -d;
    }
    for plane in all {
        if normal.dot(plane.rep_point) + d < -CONTAINMENT_EPS {
            return None;
        }
    }

    Some(Plane {
        normal,
        d,
        rep_point: point,
        invisible: true,
    })
}
