//! Triangle meshes and the cleanup passes applied before export.

use crate::alloc_prelude::{vec, BTreeMap, Vec};
use crate::traits::ViewProjector;
use crate::types::{Aabb, Point3};

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Triangles as vertex indices, counter-clockwise seen from outside.
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Create a mesh from parts.
    pub fn new(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// True if the mesh has no faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    #[inline]
    fn corners(&self, f: &[u32; 3]) -> [Point3; 3] {
        [
            self.vertices[f[0] as usize],
            self.vertices[f[1] as usize],
            self.vertices[f[2] as usize],
        ]
    }

    /// Bounding box of all vertices, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Aabb> {
        let first = *self.vertices.first()?;
        let mut b = Aabb::new(first, first);
        for &v in &self.vertices[1..] {
            b.expand(v);
        }
        Some(b)
    }

    /// Centroid of each face.
    pub fn face_centroids(&self) -> Vec<Point3> {
        self.faces
            .iter()
            .map(|f| {
                let [a, b, c] = self.corners(f);
                (a + b + c) / 3.0
            })
            .collect()
    }

    /// Unit normal of each face (zero for degenerate faces).
    pub fn face_normals(&self) -> Vec<Point3> {
        self.faces
            .iter()
            .map(|f| {
                let [a, b, c] = self.corners(f);
                (b - a).cross(c - a).normalize()
            })
            .collect()
    }

    /// Area-weighted vertex normals.
    pub fn vertex_normals(&self) -> Vec<Point3> {
        let mut normals = vec![Point3::default(); self.vertices.len()];
        for f in &self.faces {
            let [a, b, c] = self.corners(f);
            let n = (b - a).cross(c - a);
            for &v in f {
                normals[v as usize] += n;
            }
        }
        normals.into_iter().map(Point3::normalize).collect()
    }

    /// Mean edge length over all face edges.
    pub fn mean_edge_length(&self) -> f32 {
        if self.faces.is_empty() {
            return 0.0;
        }
        let mut total = 0.0f64;
        for f in &self.faces {
            let [a, b, c] = self.corners(f);
            total += ((b - a).length() + (c - b).length() + (a - c).length()) as f64;
        }
        (total / (3 * self.faces.len()) as f64) as f32
    }

    /// Drop faces that reference the same vertex twice.
    pub fn remove_degenerate_faces(&mut self) {
        self.faces
            .retain(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
    }

    /// Keep the faces for which `keep(face_index)` is true, then drop orphaned vertices.
    pub fn retain_faces<F: FnMut(usize) -> bool>(&mut self, mut keep: F) {
        let mut idx = 0;
        self.faces.retain(|_| {
            let k = keep(idx);
            idx += 1;
            k
        });
        self.remove_unreferenced_vertices();
    }

    /// Remove vertices no face uses and re-index faces.
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        for f in &mut self.faces {
            for v in f.iter_mut() {
                let old = *v as usize;
                if remap[old] == u32::MAX {
                    remap[old] = vertices.len() as u32;
                    vertices.push(self.vertices[old]);
                }
                *v = remap[old];
            }
        }
        self.vertices = vertices;
    }

    /// Group faces into vertex-connected components.
    ///
    /// Returns one list of face indices per component.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.vertices.len()).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for f in &self.faces {
            let a = find(&mut parent, f[0] as usize);
            for &v in &f[1..] {
                let b = find(&mut parent, v as usize);
                if a != b {
                    parent[b] = a;
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (fi, f) in self.faces.iter().enumerate() {
            let root = find(&mut parent, f[0] as usize);
            groups.entry(root).or_default().push(fi);
        }
        groups.into_values().collect()
    }

    /// Remove isolated pieces that are too small.
    ///
    /// A component is dropped if it has fewer than `min_faces` faces or if its bounding-box
    /// diagonal is below `min_diameter_pct` percent of the whole mesh's diagonal.
    /// Returns the number of faces removed.
    pub fn remove_small_components(&mut self, min_faces: usize, min_diameter_pct: f32) -> usize {
        let Some(bounds) = self.bounds() else {
            return 0;
        };
        let min_diameter = bounds.diagonal() * min_diameter_pct / 100.0;

        let mut keep = vec![false; self.faces.len()];
        for component in self.connected_components() {
            let mut cb: Option<Aabb> = None;
            for &fi in &component {
                for p in self.corners(&self.faces[fi]) {
                    match cb.as_mut() {
                        Some(b) => b.expand(p),
                        None => cb = Some(Aabb::new(p, p)),
                    }
                }
            }
            let diameter = cb.map(|b| b.diagonal()).unwrap_or(0.0);
            if component.len() >= min_faces && diameter >= min_diameter {
                for fi in component {
                    keep[fi] = true;
                }
            }
        }

        let before = self.faces.len();
        self.retain_faces(|fi| keep[fi]);
        before - self.faces.len()
    }

    /// Reduce the face count to at most `target_faces` by vertex clustering.
    ///
    /// Vertices falling in the same cell of a uniform grid are merged into their average;
    /// the grid is coarsened until the target is met. Meshes already under the target are
    /// left untouched.
    pub fn decimate(&mut self, target_faces: usize) {
        if target_faces == 0 || self.faces.len() <= target_faces {
            return;
        }
        let Some(bounds) = self.bounds() else {
            return;
        };
        let extent = bounds.extent().max_abs().max(1e-6);
        let edge = self.mean_edge_length().max(extent * 1e-4);

        // Start from the current sampling density scaled by the face ratio
        let ratio = libm::sqrtf(target_faces as f32 / self.faces.len() as f32);
        let mut resolution = ((extent / edge) * ratio).max(2.0);

        loop {
            let clustered = self.clustered(bounds, extent / resolution);
            if clustered.faces.len() <= target_faces || resolution <= 2.0 {
                *self = clustered;
                return;
            }
            resolution *= 0.8;
        }
    }

    fn clustered(&self, bounds: Aabb, cell: f32) -> TriangleMesh {
        let key = |p: Point3| {
            let q = (p - bounds.min) / cell;
            (q.x as i64, q.y as i64, q.z as i64)
        };

        let mut cluster_of: BTreeMap<(i64, i64, i64), u32> = BTreeMap::new();
        let mut sums: Vec<(Point3, u32)> = Vec::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        for &v in &self.vertices {
            let id = *cluster_of.entry(key(v)).or_insert_with(|| {
                sums.push((Point3::default(), 0));
                (sums.len() - 1) as u32
            });
            let slot = &mut sums[id as usize];
            slot.0 += v;
            slot.1 += 1;
            remap.push(id);
        }

        let vertices = sums.iter().map(|(s, n)| *s / *n as f32).collect();
        let mut seen: BTreeMap<[u32; 3], ()> = BTreeMap::new();
        let mut faces = Vec::new();
        for f in &self.faces {
            let g = [remap[f[0] as usize], remap[f[1] as usize], remap[f[2] as usize]];
            if g[0] == g[1] || g[1] == g[2] || g[0] == g[2] {
                continue;
            }
            // Deduplicate regardless of winding start
            let mut sorted = g;
            sorted.sort_unstable();
            if seen.insert(sorted, ()).is_none() {
                faces.push(g);
            }
        }

        let mut mesh = TriangleMesh::new(vertices, faces);
        mesh.remove_unreferenced_vertices();
        mesh
    }

    /// Keep only faces whose centroid is seen by at least one view.
    ///
    /// `dilation` widens each view's frame by that many pixels. Returns the number of
    /// faces removed.
    pub fn cull_invisible<V: ViewProjector>(&mut self, views: &[V], dilation: f32) -> usize {
        let centroids = self.face_centroids();
        let before = self.faces.len();
        self.retain_faces(|fi| views.iter().any(|v| v.sees(centroids[fi], dilation)));
        before - self.faces.len()
    }

    /// Total surface area.
    pub fn area(&self) -> f32 {
        self.faces
            .iter()
            .map(|f| {
                let [a, b, c] = self.corners(f);
                0.5 * (b - a).cross(c - a).length()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isosurface::{extract_isosurface, DenseField};

    fn unit_quad(offset: Point3) -> TriangleMesh {
        let vertices = vec![
            offset,
            offset + Point3::new(1.0, 0.0, 0.0),
            offset + Point3::new(1.0, 1.0, 0.0),
            offset + Point3::new(0.0, 1.0, 0.0),
        ];
        TriangleMesh::new(vertices, vec![[0, 1, 2], [0, 2, 3]])
    }

    fn merged(a: TriangleMesh, b: TriangleMesh) -> TriangleMesh {
        let mut out = a;
        let base = out.vertices.len() as u32;
        out.vertices.extend(b.vertices);
        out.faces
            .extend(b.faces.iter().map(|f| [f[0] + base, f[1] + base, f[2] + base]));
        out
    }

    fn sphere(resolution: usize) -> TriangleMesh {
        let field = DenseField::from_fn(resolution, Aabb::cube(1.0), |p| p.length() - 0.7);
        extract_isosurface(&field, 0.0)
    }

    #[test]
    fn test_quad_geometry() {
        let quad = unit_quad(Point3::default());
        assert!((quad.area() - 1.0).abs() < 1e-6);
        for n in quad.face_normals() {
            assert!((n.z - 1.0).abs() < 1e-6);
        }
        let normals = quad.vertex_normals();
        assert!((normals[0].z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_connected_components() {
        let mesh = merged(unit_quad(Point3::default()), unit_quad(Point3::splat(5.0)));
        let components = mesh.connected_components();
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn test_remove_small_components_by_face_count() {
        let big = sphere(12);
        let big_faces = big.num_faces();
        let mut mesh = merged(big, unit_quad(Point3::splat(0.9)));

        let removed = mesh.remove_small_components(8, 0.0);
        assert_eq!(removed, 2);
        assert_eq!(mesh.num_faces(), big_faces);
    }

    #[test]
    fn test_remove_small_components_by_diameter() {
        let mut tiny = unit_quad(Point3::default());
        for v in &mut tiny.vertices {
            *v = *v * 0.001;
        }
        let mut mesh = merged(unit_quad(Point3::splat(3.0)), tiny);

        let removed = mesh.remove_small_components(1, 5.0);
        assert_eq!(removed, 2);
        assert_eq!(mesh.num_vertices(), 4);
    }

    #[test]
    fn test_decimate_reaches_target() {
        let mut mesh = sphere(32);
        let before = mesh.num_faces();
        let target = before / 8;

        mesh.decimate(target);
        assert!(mesh.num_faces() <= target, "{} > {}", mesh.num_faces(), target);
        assert!(mesh.num_faces() > 0);
        assert!(mesh.faces.iter().flatten().all(|&v| (v as usize) < mesh.num_vertices()));
    }

    #[test]
    fn test_decimate_noop_under_target() {
        let mut mesh = unit_quad(Point3::default());
        let copy = mesh.clone();
        mesh.decimate(10);
        assert_eq!(mesh, copy);
    }

    struct HalfSpaceView;

    impl ViewProjector for HalfSpaceView {
        fn width(&self) -> usize {
            10
        }

        fn height(&self) -> usize {
            10
        }

        fn project(&self, p: Point3) -> Option<(f32, f32)> {
            if p.x < 2.0 {
                Some((5.0, 5.0))
            } else {
                None
            }
        }
    }

    #[test]
    fn test_cull_invisible() {
        let mut mesh = merged(unit_quad(Point3::default()), unit_quad(Point3::splat(5.0)));
        let removed = mesh.cull_invisible(&[HalfSpaceView], 0.0);
        assert_eq!(removed, 2);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_vertices(), 4);
    }
}
