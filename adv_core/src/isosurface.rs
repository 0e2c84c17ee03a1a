//! Isosurface extraction.
//!
//! Each lattice cell is split into six tetrahedra sharing the cell's main diagonal, and each
//! tetrahedron contributes zero, one or two triangles. The decomposition is consistent across
//! neighbouring cells, so the result is watertight wherever the field is defined. Vertices
//! are welded on shared lattice edges.

use crate::alloc_prelude::{BTreeMap, Vec};
use crate::error::AdvCoreError;
use crate::mesh::TriangleMesh;
use crate::traits::ScalarField;
use crate::types::{Aabb, Point3};

/// Corner offsets of a cell; bit 0 is x, bit 1 is y, bit 2 is z.
const CORNER_OFFSETS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// Six tetrahedra walking from corner 0 to corner 7 along each axis permutation.
const CELL_TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Interpolate vertex position along an edge where the field crosses the iso-value.
///
/// # Arguments
/// * `p0` - Position of the first corner
/// * `p1` - Position of the second corner
/// * `v0` - Field value at the first corner
/// * `v1` - Field value at the second corner
/// * `iso_value` - The iso-surface value
///
/// # Returns
/// The interpolated position where the surface crosses the edge.
#[inline]
pub fn interpolate_vertex(p0: Point3, p1: Point3, v0: f32, v1: f32, iso_value: f32) -> Point3 {
    // Avoid division by zero for degenerate cases
    let denom = v1 - v0;
    if libm::fabsf(denom) < 1e-10 {
        return p0.lerp(p1, 0.5);
    }

    let t = ((iso_value - v0) / denom).clamp(0.0, 1.0);
    p0.lerp(p1, t)
}

/// A scalar field stored densely in memory, x fastest.
#[derive(Debug, Clone)]
pub struct DenseField {
    resolution: usize,
    bounds: Aabb,
    values: Vec<f32>,
}

impl DenseField {
    /// Wrap precomputed lattice values.
    pub fn from_values(
        resolution: usize,
        bounds: Aabb,
        values: Vec<f32>,
    ) -> Result<Self, AdvCoreError> {
        if resolution < 2 {
            return Err(AdvCoreError::InvalidResolution { resolution, min: 2 });
        }
        let expected = resolution * resolution * resolution;
        if values.len() != expected {
            return Err(AdvCoreError::LengthMismatch {
                expected,
                got: values.len(),
            });
        }
        Ok(Self {
            resolution,
            bounds,
            values,
        })
    }

    /// Sample `f` at every lattice point. Resolutions below 2 are raised to 2.
    pub fn from_fn<F: FnMut(Point3) -> f32>(resolution: usize, bounds: Aabb, mut f: F) -> Self {
        let resolution = resolution.max(2);
        let mut field = Self {
            resolution,
            bounds,
            values: Vec::with_capacity(resolution * resolution * resolution),
        };
        for k in 0..resolution {
            for j in 0..resolution {
                for i in 0..resolution {
                    let p = field.position(i, j, k);
                    field.values.push(f(p));
                }
            }
        }
        field
    }

    /// Lattice positions in storage order, for batched evaluation.
    pub fn lattice_points(resolution: usize, bounds: Aabb) -> Vec<Point3> {
        let probe = Self {
            resolution: resolution.max(2),
            bounds,
            values: Vec::new(),
        };
        let r = probe.resolution;
        let mut points = Vec::with_capacity(r * r * r);
        for k in 0..r {
            for j in 0..r {
                for i in 0..r {
                    points.push(probe.position(i, j, k));
                }
            }
        }
        points
    }

    /// Stored values, x fastest.
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

impl ScalarField for DenseField {
    #[inline]
    fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    fn value(&self, i: usize, j: usize, k: usize) -> f32 {
        self.values[(k * self.resolution + j) * self.resolution + i]
    }
}

/// Extract the surface `field == iso_value` as a welded triangle mesh.
///
/// Triangles are wound so their normals point toward increasing field values, i.e. outward
/// for a signed distance field.
pub fn extract_isosurface<F: ScalarField>(field: &F, iso_value: f32) -> TriangleMesh {
    let r = field.resolution();
    let mut mesh = TriangleMesh::default();
    if r < 2 {
        return mesh;
    }

    let mut edge_cache: BTreeMap<(usize, usize), u32> = BTreeMap::new();
    let flat = |i: usize, j: usize, k: usize| (k * r + j) * r + i;

    for k in 0..r - 1 {
        for j in 0..r - 1 {
            for i in 0..r - 1 {
                let mut ids = [0usize; 8];
                let mut values = [0.0f32; 8];
                let mut positions = [Point3::default(); 8];
                let mut any_in = false;
                let mut any_out = false;

                for (c, &(dx, dy, dz)) in CORNER_OFFSETS.iter().enumerate() {
                    let (ci, cj, ck) = (i + dx, j + dy, k + dz);
                    ids[c] = flat(ci, cj, ck);
                    values[c] = field.value(ci, cj, ck);
                    positions[c] = field.position(ci, cj, ck);
                    if values[c] < iso_value {
                        any_in = true;
                    } else {
                        any_out = true;
                    }
                }
                // Surface does not cross this cell
                if !(any_in && any_out) {
                    continue;
                }

                for tet in &CELL_TETS {
                    polygonize_tet(
                        tet,
                        &ids,
                        &values,
                        &positions,
                        iso_value,
                        &mut edge_cache,
                        &mut mesh,
                    );
                }
            }
        }
    }

    mesh.remove_degenerate_faces();
    mesh
}

fn polygonize_tet(
    tet: &[usize; 4],
    ids: &[usize; 8],
    values: &[f32; 8],
    positions: &[Point3; 8],
    iso_value: f32,
    edge_cache: &mut BTreeMap<(usize, usize), u32>,
    mesh: &mut TriangleMesh,
) {
    let mut inside = [0usize; 4];
    let mut outside = [0usize; 4];
    let (mut n_in, mut n_out) = (0, 0);
    for &c in tet {
        if values[c] < iso_value {
            inside[n_in] = c;
            n_in += 1;
        } else {
            outside[n_out] = c;
            n_out += 1;
        }
    }
    if n_in == 0 || n_out == 0 {
        return;
    }

    let mut vertex = |a: usize, b: usize| -> u32 {
        let key = if ids[a] < ids[b] { (ids[a], ids[b]) } else { (ids[b], ids[a]) };
        *edge_cache.entry(key).or_insert_with(|| {
            let p = interpolate_vertex(positions[a], positions[b], values[a], values[b], iso_value);
            mesh.vertices.push(p);
            (mesh.vertices.len() - 1) as u32
        })
    };

    // Direction of increasing field value, used to orient triangles
    let centroid = |cs: &[usize]| {
        let mut acc = Point3::default();
        for &c in cs {
            acc += positions[c];
        }
        acc / cs.len() as f32
    };
    let outward = centroid(&outside[..n_out]) - centroid(&inside[..n_in]);

    let mut tris: [[u32; 3]; 2] = [[0; 3]; 2];
    let count = match (n_in, n_out) {
        (1, 3) => {
            let a = inside[0];
            tris[0] = [vertex(a, outside[0]), vertex(a, outside[1]), vertex(a, outside[2])];
            1
        }
        (3, 1) => {
            let a = outside[0];
            tris[0] = [vertex(inside[0], a), vertex(inside[1], a), vertex(inside[2], a)];
            1
        }
        _ => {
            // Two in, two out: the crossing is a quad split along one diagonal
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let ac = vertex(a, c);
            let ad = vertex(a, d);
            let bc = vertex(b, c);
            let bd = vertex(b, d);
            tris[0] = [ac, ad, bd];
            tris[1] = [ac, bd, bc];
            2
        }
    };

    for tri in tris.iter().take(count) {
        let [i0, i1, i2] = *tri;
        let p0 = mesh.vertices[i0 as usize];
        let p1 = mesh.vertices[i1 as usize];
        let p2 = mesh.vertices[i2 as usize];
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.dot(outward) < 0.0 {
            mesh.faces.push([i0, i2, i1]);
        } else {
            mesh.faces.push([i0, i1, i2]);
        }
    }
}
