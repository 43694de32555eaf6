//! Core input types: the triangle soup and concrete triangles.

use nalgebra::{Point2, Point3, Vector3};

use crate::bvh::Aabb;

/// An unstructured list of triangles.
///
/// Attributes are stored per corner: index `i` of every array refers to corner
/// `i`, and corners `3f`, `3f + 1`, `3f + 2` form face `f`. Faces share nothing
/// at the data-structure level; sharing is reconstructed by
/// [`TopologyBuilder`](crate::topology::TopologyBuilder).
///
/// Face indices are the currency of every result in this crate. They are the
/// corner-triple indices of the soup and never change.
#[derive(Debug, Clone, Default)]
pub struct TriangleSoup {
    /// Corner positions (required).
    pub positions: Vec<Point3<f64>>,

    /// Corner texture coordinates. Empty when the mesh carries no UVs.
    pub uvs: Vec<Point2<f64>>,

    /// Corner normals. Empty when the mesh carries no normals.
    pub normals: Vec<Vector3<f64>>,
}

impl TriangleSoup {
    /// Create an empty soup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a soup with room for `face_count` faces.
    pub fn with_capacity(face_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(face_count * 3),
            uvs: Vec::new(),
            normals: Vec::new(),
        }
    }

    /// Append a triangle without texture coordinates.
    pub fn push_triangle(&mut self, corners: [Point3<f64>; 3]) {
        self.positions.extend(corners);
    }

    /// Append a triangle with one UV per corner.
    pub fn push_triangle_with_uvs(&mut self, corners: [Point3<f64>; 3], uvs: [Point2<f64>; 3]) {
        self.positions.extend(corners);
        self.uvs.extend(uvs);
    }

    /// Expand an indexed mesh into a soup, one corner per face-vertex reference.
    ///
    /// Faces with out-of-range indices are skipped.
    pub fn from_indexed(vertices: &[Point3<f64>], faces: &[[u32; 3]]) -> Self {
        let mut soup = Self::with_capacity(faces.len());
        for face in faces {
            let corners = [
                vertices.get(face[0] as usize),
                vertices.get(face[1] as usize),
                vertices.get(face[2] as usize),
            ];
            if let [Some(a), Some(b), Some(c)] = corners {
                soup.push_triangle([*a, *b, *c]);
            }
        }
        soup
    }

    /// Number of complete faces. Trailing corners of a ragged soup are ignored.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of corners.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.positions.len()
    }

    /// Check if the soup has no complete face.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.face_count() == 0
    }

    /// Check if the corner count is not a multiple of three.
    #[inline]
    pub fn is_ragged(&self) -> bool {
        self.positions.len() % 3 != 0
    }

    /// Check if every corner carries a texture coordinate.
    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty() && self.uvs.len() >= self.face_count() * 3
    }

    /// Get face `face` as a triangle.
    pub fn triangle(&self, face: usize) -> Option<Triangle> {
        let base = face.checked_mul(3)?;
        let corners = self.positions.get(base..base + 3)?;
        Some(Triangle::new(corners[0], corners[1], corners[2]))
    }

    /// Iterate over all complete faces.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|c| Triangle::new(c[0], c[1], c[2]))
    }

    /// Get the UV triangle of face `face`, if UVs are present.
    pub fn uv_triangle(&self, face: usize) -> Option<[Point2<f64>; 3]> {
        let base = face.checked_mul(3)?;
        let uvs = self.uvs.get(base..base + 3)?;
        Some([uvs[0], uvs[1], uvs[2]])
    }

    /// Compute the axis-aligned bounding box of all finite corner positions.
    /// Returns (min_corner, max_corner) or None if there are none.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut finite = self
            .positions
            .iter()
            .filter(|p| p.iter().all(|c| c.is_finite()));
        let first = *finite.next()?;

        let mut min = first;
        let mut max = first;
        for p in finite {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }
}

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the front.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Squared edge lengths `[|v1 - v0|², |v2 - v1|², |v0 - v2|²]`.
    #[inline]
    pub fn edge_lengths_squared(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm_squared(),
            (self.v2 - self.v1).norm_squared(),
            (self.v0 - self.v2).norm_squared(),
        ]
    }

    /// Check that all coordinates are finite.
    pub fn is_finite(&self) -> bool {
        [self.v0, self.v1, self.v2]
            .iter()
            .all(|p| p.iter().all(|c| c.is_finite()))
    }

    /// Bounding box of the three corners.
    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_triangle(&self.v0, &self.v1, &self.v2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_triangle_area() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        );
        assert!(approx_eq(tri.area(), 2.0));
        let n = tri.normal().unwrap();
        assert!(approx_eq(n.z, 1.0));
    }

    #[test]
    fn test_degenerate_triangle_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_edge_lengths_squared() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        );
        let [a, b, c] = tri.edge_lengths_squared();
        assert!(approx_eq(a, 9.0));
        assert!(approx_eq(b, 25.0));
        assert!(approx_eq(c, 16.0));
    }

    #[test]
    fn test_soup_face_access() {
        let mut soup = TriangleSoup::new();
        soup.push_triangle([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        assert_eq!(soup.face_count(), 1);
        assert_eq!(soup.corner_count(), 3);
        assert!(!soup.has_uvs());
        assert!(soup.triangle(0).is_some());
        assert!(soup.triangle(1).is_none());
        assert!(soup.uv_triangle(0).is_none());
    }

    #[test]
    fn test_ragged_soup() {
        let mut soup = TriangleSoup::new();
        soup.positions.push(Point3::new(0.0, 0.0, 0.0));
        soup.positions.push(Point3::new(1.0, 0.0, 0.0));
        assert!(soup.is_ragged());
        assert!(soup.is_empty());
        assert_eq!(soup.triangles().count(), 0);
    }

    #[test]
    fn test_from_indexed_skips_bad_indices() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let soup = TriangleSoup::from_indexed(&vertices, &[[0, 1, 2], [0, 1, 9]]);
        assert_eq!(soup.face_count(), 1);
    }

    #[test]
    fn test_bounds_ignore_non_finite() {
        let mut soup = TriangleSoup::new();
        soup.push_triangle([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(2.0, 3.0, -1.0),
        ]);
        let (min, max) = soup.bounds().unwrap();
        assert!(approx_eq(min.z, -1.0));
        assert!(approx_eq(max.x, 2.0));
        assert!(approx_eq(max.y, 3.0));
        assert!(TriangleSoup::new().bounds().is_none());
    }
}
