/// Input data model consumed by the binning pipeline.
///
/// These records are produced by the display-list layer; the pipeline only
/// reads them. Plane normals follow the convex-solid convention: they point
/// into the solid, so the interior is `normal · P + d >= 0` and a face is
/// camera-facing when the camera sits in its negative half-space.
use glam::Vec3;

/// Object-space plane with a representative on-plane point.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Unit normal pointing into the solid.
    pub normal: Vec3,
    /// Plane offset: `normal · P + d = 0` for points P on the plane.
    pub d: f32,
    /// On-plane point seeding shading/texturing interpolation.
    pub rep_point: Vec3,
    /// Planes flagged invisible are classified but not shaded/emitted
    /// (shadow and light volumes ignore this flag).
    pub invisible: bool,
}

impl Plane {
    /// Build a plane through `point` with the given inward normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            d: -normal.dot(point),
            rep_point: point,
            invisible: false,
        }
    }

    /// Build the supporting plane of a polygon. Vertices are expected in
    /// the order the display list stores them; the normal is oriented by
    /// the winding (negated into the inward convention above).
    pub fn from_polygon(vertices: &[Vec3]) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let e1 = vertices[1] - vertices[0];
        let e2 = vertices[2] - vertices[0];
        let outward = e1.cross(e2);
        let len = outward.length();
        if len < 1.0e-12 {
            return None;
        }
        Some(Self::from_point_normal(vertices[0], -outward / len))
    }
}

/// Axis-aligned object-space bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

/// Shading variant resolved once per material batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingMode {
    Flat,
    Smooth,
}

/// Texturing variant resolved once per material batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMode {
    None,
    Premapped,
    Wrapped,
}

/// Per-batch surface description. The pipeline never interprets shading
/// results, it only resolves the (ShadingMode, TextureMode) pair and
/// forwards batches to the shading collaborator.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub translucent: bool,
    pub smooth_shaded: bool,
    pub texture: TextureMode,
}

impl Material {
    pub fn opaque() -> Self {
        Self {
            translucent: false,
            smooth_shaded: false,
            texture: TextureMode::None,
        }
    }

    pub fn translucent() -> Self {
        Self {
            translucent: true,
            ..Self::opaque()
        }
    }
}

/// A contiguous run of planes (or faces) sharing one material. Batch counts
/// partition the owning primitive's full plane/face list.
#[derive(Debug, Clone, Copy)]
pub struct MaterialBatch {
    pub material: Material,
    pub count: usize,
}

/// Convex solid bounded by a set of planes; no mesh connectivity.
#[derive(Debug, Clone)]
pub struct ConvexPrimitive {
    pub planes: Vec<Plane>,
    /// Batches partition `planes` in order; counts must sum to planes.len().
    pub batches: Vec<MaterialBatch>,
    /// Object-space bounds, or None for a conceptually unbounded solid
    /// (the camera may be inside; region coverage then comes from plane
    /// sampling instead of bounding-box projection).
    pub bounds: Option<Aabb>,
    /// When set, reverse (away-facing) planes stay visible so the solid
    /// renders correctly from the inside.
    pub see_inside: bool,
}

impl ConvexPrimitive {
    /// Single-material convex solid.
    pub fn with_material(planes: Vec<Plane>, material: Material, bounds: Option<Aabb>) -> Self {
        let count = planes.len();
        Self {
            planes,
            batches: vec![MaterialBatch { material, count }],
            bounds,
            see_inside: false,
        }
    }

    /// Axis-aligned box solid: six inward-facing planes plus exact bounds.
    pub fn cuboid(min: Vec3, max: Vec3, material: Material) -> Self {
        let planes = vec![
            Plane::from_point_normal(Vec3::new(min.x, 0.0, 0.0), Vec3::X),
            Plane::from_point_normal(Vec3::new(max.x, 0.0, 0.0), Vec3::NEG_X),
            Plane::from_point_normal(Vec3::new(0.0, min.y, 0.0), Vec3::Y),
            Plane::from_point_normal(Vec3::new(0.0, max.y, 0.0), Vec3::NEG_Y),
            Plane::from_point_normal(Vec3::new(0.0, 0.0, min.z), Vec3::Z),
            Plane::from_point_normal(Vec3::new(0.0, 0.0, max.z), Vec3::NEG_Z),
        ];
        Self::with_material(planes, material, Some(Aabb::new(min, max)))
    }
}

/// Which mesh faces survive back-face culling, in terms of the geometric
/// side the camera sees. A mirrored (negative-determinant) transform flips
/// the effective mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// Keep everything (double-sided).
    None,
    /// Cull faces whose front side looks away from the camera.
    Back,
    /// Cull faces whose front side looks at the camera.
    Front,
}

impl CullMode {
    /// Effective mode under the given transform handedness.
    #[inline]
    pub fn under_mirroring(self, mirrored: bool) -> CullMode {
        match (self, mirrored) {
            (CullMode::Back, true) => CullMode::Front,
            (CullMode::Front, true) => CullMode::Back,
            (mode, _) => mode,
        }
    }
}

/// Indexed mesh face: 3 or 4 vertex indices plus its supporting plane.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    pub vertices: [u32; 4],
    pub vertex_count: u8,
    pub plane: Plane,
}

impl Face {
    pub fn triangle(a: u32, b: u32, c: u32, plane: Plane) -> Self {
        Self {
            vertices: [a, b, c, 0],
            vertex_count: 3,
            plane,
        }
    }

    pub fn quad(a: u32, b: u32, c: u32, d: u32, plane: Plane) -> Self {
        Self {
            vertices: [a, b, c, d],
            vertex_count: 4,
            plane,
        }
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.vertices[..self.vertex_count as usize]
    }
}

/// Primitive defined by explicit vertices and indexed faces.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
    /// Batches partition `faces` in order; counts must sum to faces.len().
    pub batches: Vec<MaterialBatch>,
    pub cull: CullMode,
}

impl Mesh {
    /// Single-material mesh with back-face culling.
    pub fn with_material(vertices: Vec<Vec3>, faces: Vec<Face>, material: Material) -> Self {
        let count = faces.len();
        Self {
            vertices,
            faces,
            batches: vec![MaterialBatch { material, count }],
            cull: CullMode::Back,
        }
    }
}
