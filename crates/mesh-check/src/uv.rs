//! UV island, overlap and bounds analysis.
//!
//! Works on the soup's per-corner texture coordinates directly. Topology is
//! not used: UV seams deliberately split vertices that share a position.

use std::collections::VecDeque;

use hashbrown::HashMap;
use nalgebra::Point2;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::OperationTimer;
use crate::types::TriangleSoup;

/// Largest accepted raster resolution.
pub const MAX_GRID_RESOLUTION: u32 = 8192;

/// Parameters for the UV overlap raster.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UvParams {
    /// Cells per side of the square raster covering `[0, 1]²`.
    ///
    /// Overlaps smaller than one cell are missed; memory grows with the
    /// square of this value.
    ///
    /// Default: `1024`
    pub grid_resolution: u32,
}

impl Default for UvParams {
    fn default() -> Self {
        Self {
            grid_resolution: 1024,
        }
    }
}

impl UvParams {
    /// Validate parameter ranges.
    pub fn validate(&self) -> MeshResult<()> {
        if !(1..=MAX_GRID_RESOLUTION).contains(&self.grid_resolution) {
            return Err(MeshError::invalid_params(
                "grid_resolution",
                format!(
                    "must be in 1..={}, got {}",
                    MAX_GRID_RESOLUTION, self.grid_resolution
                ),
            ));
        }
        Ok(())
    }
}

/// True if the soup carries a texture coordinate for every corner.
pub fn has_uvs(soup: &TriangleSoup) -> bool {
    soup.has_uvs()
}

/// Partition of faces into UV islands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UvIslands {
    /// Island id of each face.
    pub face_island: Vec<u32>,
    pub island_count: usize,
}

/// Bit pattern of a UV with `-0.0` folded into `0.0`.
fn uv_key(uv: &Point2<f64>) -> [u64; 2] {
    let bits = |v: f64| if v == 0.0 { 0 } else { v.to_bits() };
    [bits(uv.x), bits(uv.y)]
}

/// Group faces into islands.
///
/// Two faces are adjacent if they have a corner with exactly the same UV.
/// Islands are the connected components of that graph, numbered in order of
/// their lowest face.
pub fn find_uv_islands(soup: &TriangleSoup) -> UvIslands {
    let face_count = soup.face_count();
    if !soup.has_uvs() {
        return UvIslands::default();
    }

    let mut uv_faces: HashMap<[u64; 2], Vec<u32>> = HashMap::new();
    for face in 0..face_count {
        for corner in 0..3 {
            let uv = &soup.uvs[face * 3 + corner];
            uv_faces.entry(uv_key(uv)).or_default().push(face as u32);
        }
    }

    let mut face_island = vec![u32::MAX; face_count];
    let mut island_count = 0u32;
    let mut queue = VecDeque::new();

    for start in 0..face_count {
        if face_island[start] != u32::MAX {
            continue;
        }
        face_island[start] = island_count;
        queue.push_back(start);

        while let Some(face) = queue.pop_front() {
            for corner in 0..3 {
                let key = uv_key(&soup.uvs[face * 3 + corner]);
                let Some(neighbors) = uv_faces.get(&key) else {
                    continue;
                };
                for &n in neighbors {
                    let n = n as usize;
                    if face_island[n] == u32::MAX {
                        face_island[n] = island_count;
                        queue.push_back(n);
                    }
                }
            }
        }

        island_count += 1;
    }

    debug!(islands = island_count, "Found UV islands");

    UvIslands {
        face_island,
        island_count: island_count as usize,
    }
}

/// Result of the UV overlap raster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UvOverlapReport {
    /// Faces sharing at least one raster cell with another face, ascending.
    pub faces: Vec<u32>,
    /// Islands containing at least one of `faces`, ascending.
    pub islands: Vec<u32>,
    /// Total number of UV islands.
    pub island_count: usize,
}

impl UvOverlapReport {
    /// Number of culprit faces.
    pub fn count(&self) -> usize {
        self.faces.len()
    }
}

/// Twice the signed area of `(p, a, b)`.
#[inline]
fn edge_sign(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y)
}

/// Strict interior test: points on an edge are outside, so faces meeting
/// along a seam do not claim the same cells.
pub fn point_in_uv_triangle(p: &Point2<f64>, tri: &[Point2<f64>; 3]) -> bool {
    let d1 = edge_sign(p, &tri[0], &tri[1]);
    let d2 = edge_sign(p, &tri[1], &tri[2]);
    let d3 = edge_sign(p, &tri[2], &tri[0]);
    (d1 > 0.0 && d2 > 0.0 && d3 > 0.0) || (d1 < 0.0 && d2 < 0.0 && d3 < 0.0)
}

/// Cell range `[lo, hi]` covered by `[min, max]` on a raster of `res` cells.
fn cell_span(min: f64, max: f64, res: u32) -> Option<(u32, u32)> {
    let last = res as i64 - 1;
    let lo = ((min * res as f64).floor() as i64).max(0);
    let hi = ((max * res as f64).ceil() as i64).min(last);
    (lo <= hi).then_some((lo as u32, hi as u32))
}

/// Find faces whose UV triangles cover the same raster cells.
///
/// Each face is rasterized at cell centers over `[0, 1]²`. A cell already
/// claimed by a different face marks both faces as culprits; the result is
/// the same for any face order. Faces with non-finite UVs are skipped.
pub fn find_uv_overlaps(soup: &TriangleSoup, params: &UvParams) -> MeshResult<UvOverlapReport> {
    params.validate()?;
    if !soup.has_uvs() {
        return Ok(UvOverlapReport::default());
    }

    let _timer = OperationTimer::with_faces("uv_overlap", soup.face_count());
    let islands = find_uv_islands(soup);

    let res = params.grid_resolution;
    let mut grid = vec![u32::MAX; res as usize * res as usize];
    let mut culprit = vec![false; soup.face_count()];
    let mut skipped = 0usize;

    for face in 0..soup.face_count() {
        let Some(tri) = soup.uv_triangle(face) else {
            continue;
        };
        if tri.iter().any(|uv| !uv.x.is_finite() || !uv.y.is_finite()) {
            skipped += 1;
            continue;
        }

        let min_u = tri[0].x.min(tri[1].x).min(tri[2].x);
        let max_u = tri[0].x.max(tri[1].x).max(tri[2].x);
        let min_v = tri[0].y.min(tri[1].y).min(tri[2].y);
        let max_v = tri[0].y.max(tri[1].y).max(tri[2].y);
        let (Some((x0, x1)), Some((y0, y1))) =
            (cell_span(min_u, max_u, res), cell_span(min_v, max_v, res))
        else {
            continue;
        };

        for y in y0..=y1 {
            let sample_v = (y as f64 + 0.5) / res as f64;
            for x in x0..=x1 {
                let sample = Point2::new((x as f64 + 0.5) / res as f64, sample_v);
                if !point_in_uv_triangle(&sample, &tri) {
                    continue;
                }
                let cell = &mut grid[y as usize * res as usize + x as usize];
                if *cell != u32::MAX && *cell != face as u32 {
                    culprit[face] = true;
                    culprit[*cell as usize] = true;
                }
                *cell = face as u32;
            }
        }
    }

    if skipped > 0 {
        warn!(faces = skipped, "Skipped faces with non-finite UVs");
    }

    let faces: Vec<u32> = culprit
        .iter()
        .enumerate()
        .filter(|(_, c)| **c)
        .map(|(f, _)| f as u32)
        .collect();
    let mut involved: Vec<u32> = faces
        .iter()
        .map(|&f| islands.face_island[f as usize])
        .collect();
    involved.sort_unstable();
    involved.dedup();

    if faces.is_empty() {
        debug!(islands = islands.island_count, "No UV overlap");
    } else {
        info!(
            faces = faces.len(),
            islands = involved.len(),
            resolution = res,
            "Found overlapping UV faces"
        );
    }

    Ok(UvOverlapReport {
        faces,
        islands: involved,
        island_count: islands.island_count,
    })
}

/// Count texture coordinates with `u` or `v` outside `[0, 1]`.
///
/// Each corner's UV is counted on its own, so a coordinate shared by several
/// faces counts once per corner. NaN coordinates count as out of bounds.
pub fn count_uvs_out_of_bounds(soup: &TriangleSoup) -> usize {
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);
    soup.uvs
        .iter()
        .filter(|uv| !in_unit(uv.x) || !in_unit(uv.y))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn flat(points: [[f64; 2]; 3]) -> [Point3<f64>; 3] {
        points.map(|p| Point3::new(p[0], p[1], 0.0))
    }

    fn uvs(points: [[f64; 2]; 3]) -> [Point2<f64>; 3] {
        points.map(|p| Point2::new(p[0], p[1]))
    }

    /// Unit quad split along its diagonal, UVs equal to positions.
    fn quad() -> TriangleSoup {
        let mut soup = TriangleSoup::new();
        let t0 = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let t1 = [[0.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        soup.push_triangle_with_uvs(flat(t0), uvs(t0));
        soup.push_triangle_with_uvs(flat(t1), uvs(t1));
        soup
    }

    #[test]
    fn test_has_uvs() {
        assert!(has_uvs(&quad()));
        let mut soup = quad();
        soup.uvs.pop();
        assert!(!has_uvs(&soup));
        soup.uvs.clear();
        assert!(!has_uvs(&soup));
    }

    #[test]
    fn test_point_in_triangle_is_strict() {
        let tri = uvs([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(point_in_uv_triangle(&Point2::new(0.2, 0.2), &tri));
        assert!(!point_in_uv_triangle(&Point2::new(0.5, 0.5), &tri));
        assert!(!point_in_uv_triangle(&Point2::new(0.5, 0.0), &tri));
        assert!(!point_in_uv_triangle(&Point2::new(0.8, 0.8), &tri));

        // Winding does not matter
        let reversed = [tri[0], tri[2], tri[1]];
        assert!(point_in_uv_triangle(&Point2::new(0.2, 0.2), &reversed));
    }

    #[test]
    fn test_seam_sharing_quad_has_no_overlap() {
        let report = find_uv_overlaps(&quad(), &UvParams::default()).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(report.island_count, 1);
    }

    #[test]
    fn test_duplicated_uv_triangle_overlaps() {
        let mut soup = TriangleSoup::new();
        let t = [[0.1, 0.1], [0.6, 0.1], [0.1, 0.6]];
        soup.push_triangle_with_uvs(flat(t), uvs(t));
        // Different position, same UVs
        let p = [[5.0, 5.0], [6.0, 5.0], [5.0, 6.0]];
        soup.push_triangle_with_uvs(flat(p), uvs(t));

        let report = find_uv_overlaps(&soup, &UvParams::default()).unwrap();
        assert_eq!(report.faces, vec![0, 1]);
        assert!(report.count() >= 2);
        // Sharing UV coordinates puts them in one island
        assert_eq!(report.island_count, 1);
        assert_eq!(report.islands, vec![0]);
    }

    #[test]
    fn test_overlap_between_islands() {
        let mut soup = TriangleSoup::new();
        let a = [[0.1, 0.1], [0.6, 0.1], [0.1, 0.6]];
        let b = [[0.2, 0.2], [0.7, 0.2], [0.2, 0.7]];
        let c = [[0.8, 0.8], [0.9, 0.8], [0.8, 0.9]];
        soup.push_triangle_with_uvs(flat(a), uvs(a));
        soup.push_triangle_with_uvs(flat(b), uvs(b));
        soup.push_triangle_with_uvs(flat(c), uvs(c));

        let report = find_uv_overlaps(&soup, &UvParams::default()).unwrap();
        assert_eq!(report.faces, vec![0, 1]);
        assert_eq!(report.island_count, 3);
        assert_eq!(report.islands, vec![0, 1]);
    }

    #[test]
    fn test_outside_unit_square_not_rasterized() {
        let mut soup = TriangleSoup::new();
        let t = [[2.0, 2.0], [3.0, 2.0], [2.0, 3.0]];
        soup.push_triangle_with_uvs(flat(t), uvs(t));
        soup.push_triangle_with_uvs(flat(t), uvs(t));
        let report = find_uv_overlaps(&soup, &UvParams::default()).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(count_uvs_out_of_bounds(&soup), 6);
    }

    #[test]
    fn test_non_finite_uvs_skipped() {
        let mut soup = quad();
        soup.uvs[0].x = f64::NAN;
        let report = find_uv_overlaps(&soup, &UvParams::default()).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(count_uvs_out_of_bounds(&soup), 1);
    }

    #[test]
    fn test_count_out_of_bounds_per_corner() {
        let mut soup = TriangleSoup::new();
        let t = [[-0.1, 0.5], [1.0, 1.0], [0.5, 1.2]];
        soup.push_triangle_with_uvs(flat(t), uvs(t));
        assert_eq!(count_uvs_out_of_bounds(&soup), 2);
        assert_eq!(count_uvs_out_of_bounds(&quad()), 0);
    }

    #[test]
    fn test_islands_split_at_seams() {
        let mut soup = quad();
        // Third face reusing no UV of the quad
        let t = [[0.0, 0.0], [0.5, 0.0], [0.0, 0.5]];
        let shifted = [[2.0, 0.0], [2.5, 0.0], [2.0, 0.5]];
        soup.push_triangle_with_uvs(flat(shifted), uvs([[0.01, 0.0], t[1], t[2]]));

        let islands = find_uv_islands(&soup);
        assert_eq!(islands.island_count, 2);
        assert_eq!(islands.face_island, vec![0, 0, 1]);
    }

    #[test]
    fn test_params_validate() {
        assert!(UvParams::default().validate().is_ok());
        assert!(UvParams { grid_resolution: 0 }.validate().is_err());
        assert!(
            UvParams {
                grid_resolution: MAX_GRID_RESOLUTION + 1
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_no_uvs_gives_empty_report() {
        let mut soup = TriangleSoup::new();
        soup.push_triangle(flat([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]));
        let report = find_uv_overlaps(&soup, &UvParams::default()).unwrap();
        assert_eq!(report, UvOverlapReport::default());
        assert_eq!(find_uv_islands(&soup).island_count, 0);
    }
}
