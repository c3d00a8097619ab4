//! The mesh fast path (per-vertex tile bounds) must agree with the
//! conservative bounding-box binner for geometry where both are exact:
//! axis-aligned faces at constant depth.

use glam::{Mat4, Vec2, Vec3};
use tilebin::binning::{
    bin_face, classify_planes, from_bounding_box, project_reps, transform_vertices,
    ClassifyOptions, PlaneCategoryLists,
};
use tilebin::{Face, Plane, ProjectionState, Viewport};

fn proj() -> ProjectionState {
    ProjectionState::new(&Viewport::new(640, 480, 32, 32, 1.0, Vec2::new(0.5, 0.375)))
}

fn quad_at(min: Vec2, max: Vec2, z: f32) -> (Vec<Vec3>, Face) {
    let vertices = vec![
        Vec3::new(min.x, min.y, z),
        Vec3::new(max.x, min.y, z),
        Vec3::new(max.x, max.y, z),
        Vec3::new(min.x, max.y, z),
    ];
    let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, z), Vec3::Z);
    (vertices, Face::quad(0, 1, 2, 3, plane))
}

fn fast_path_rect(
    vertices: &[Vec3],
    face: &Face,
    proj: &ProjectionState,
) -> tilebin::RegionRect {
    let mut bank = Vec::new();
    let mut lists = PlaneCategoryLists::new();
    classify_planes(
        std::slice::from_ref(&face.plane),
        &Mat4::IDENTITY,
        ClassifyOptions::mesh_faces(),
        proj,
        &mut bank,
        &mut lists,
    );
    project_reps(&mut bank, proj);

    let mut verts = Vec::new();
    let flags = transform_vertices(vertices, &Mat4::IDENTITY, proj, &mut verts);
    assert_eq!(flags, 0, "fast path requires a fully unclipped quad");

    let binned = bin_face(face, &bank[0], &verts, proj).unwrap();
    assert!(!binned.z_clipped);
    binned.rect
}

#[test]
fn fast_path_matches_bounding_box_for_constant_depth_quads() {
    let proj = proj();
    let cases = [
        (Vec2::new(-1.0, -0.5), Vec2::new(1.0, 0.5), 8.0),
        (Vec2::new(0.0, 0.0), Vec2::new(2.0, 1.5), 12.0),
        (Vec2::new(-2.4, 0.3), Vec2::new(-0.8, 1.1), 6.0),
        // Degenerate-thin quad still bins one tile row.
        (Vec2::new(0.5, 0.25), Vec2::new(0.5, 0.26), 4.0),
    ];

    for (min, max, z) in cases {
        let (vertices, face) = quad_at(min, max, z);
        let fast = fast_path_rect(&vertices, &face, &proj);
        let boxed = from_bounding_box(
            Vec3::new(min.x, min.y, z),
            Vec3::new(max.x, max.y, z),
            &proj,
        )
        .unwrap();
        assert_eq!(fast, boxed, "quad {min:?}..{max:?} at z {z}");
    }
}

#[test]
fn quad_edge_on_a_seam_matches_in_both_paths() {
    let proj = proj();
    // Right edge at x = -3 projects exactly onto the tile boundary at
    // pixel 128; both paths must agree on the boundary tile.
    let (vertices, face) = quad_at(Vec2::new(-3.5, -0.1), Vec2::new(-3.0, 0.1), 10.0);
    let fast = fast_path_rect(&vertices, &face, &proj);
    let boxed = from_bounding_box(
        Vec3::new(-3.5, -0.1, 10.0),
        Vec3::new(-3.0, 0.1, 10.0),
        &proj,
    )
    .unwrap();
    assert_eq!(fast, boxed);
    assert_eq!(fast.last_x, 4);
}
