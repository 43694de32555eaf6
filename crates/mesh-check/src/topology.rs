//! Topology reconstruction from a triangle soup.
//!
//! [`TopologyBuilder`] turns unstructured corners into a shared-vertex,
//! consistently oriented half-edge mesh:
//!
//! 1. Faces with NaN or infinite coordinates are dropped.
//! 2. Corners closer than the weld epsilon are merged into one vertex.
//! 3. Faces that collapse after welding, or repeat an earlier face's vertex
//!    set, are dropped.
//! 4. Each shell is oriented consistently and, when closed, outward.
//! 5. Half-edges are built and paired with opposite-direction twins.
//!
//! Every surviving face keeps the soup index it came from, and every dropped
//! face is recorded with its reason. Building never fails: if orientation hits
//! a numerical failure the topology is returned unoriented and flagged
//! degraded.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::OperationTimer;
use crate::types::TriangleSoup;

/// Parameters for topology reconstruction.
///
/// # Example
///
/// ```
/// use mesh_check::TopologyParams;
///
/// let params = TopologyParams {
///     weld_epsilon: 1e-6, // noisy scan data
///     ..Default::default()
/// };
/// assert!(params.orient);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TopologyParams {
    /// Absolute distance below which corners are merged.
    ///
    /// Default: `1e-9`
    pub weld_epsilon: f64,

    /// Weld distance as a fraction of the bounding-box diagonal.
    ///
    /// The effective epsilon is the larger of the absolute and relative values,
    /// so large meshes are not left unwelded by float noise.
    ///
    /// Default: `1e-9`
    pub relative_weld_epsilon: f64,

    /// Drop faces that reference the same three vertices as an earlier face.
    ///
    /// Default: `true`
    pub merge_duplicate_faces: bool,

    /// Orient each shell consistently before building half-edges.
    ///
    /// Default: `true`
    pub orient: bool,
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self {
            weld_epsilon: 1e-9,
            relative_weld_epsilon: 1e-9,
            merge_duplicate_faces: true,
            orient: true,
        }
    }
}

impl TopologyParams {
    /// Validate parameter ranges.
    pub fn validate(&self) -> MeshResult<()> {
        if !self.weld_epsilon.is_finite() || self.weld_epsilon < 0.0 {
            return Err(MeshError::invalid_params(
                "weld_epsilon",
                format!("must be finite and >= 0, got {}", self.weld_epsilon),
            ));
        }
        if !self.relative_weld_epsilon.is_finite() || self.relative_weld_epsilon < 0.0 {
            return Err(MeshError::invalid_params(
                "relative_weld_epsilon",
                format!("must be finite and >= 0, got {}", self.relative_weld_epsilon),
            ));
        }
        Ok(())
    }
}

/// Why a soup face has no topology face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RemovalReason {
    /// Two or more corners welded into the same vertex.
    Collapsed,
    /// Same vertex set as an earlier face.
    Duplicate,
    /// A corner has a NaN or infinite coordinate.
    NonFinite,
}

/// A soup face excluded from the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RemovedFace {
    /// Soup face index.
    pub source: u32,
    pub reason: RemovalReason,
}

/// A face of the built topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopoFace {
    /// Welded vertex indices, in oriented winding order.
    pub vertices: [u32; 3],
    /// Soup face index this face came from.
    pub source: u32,
    /// Orientation shell this face belongs to.
    pub shell: u32,
}

/// One directed edge of one face.
///
/// Half-edge `3f + k` runs from corner `k` to corner `k + 1` of face `f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfEdge {
    pub origin: u32,
    pub target: u32,
    pub face: u32,
    /// Opposite half-edge of the neighboring face; `None` on a boundary.
    pub twin: Option<u32>,
}

impl HalfEdge {
    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.twin.is_none()
    }
}

/// Shared-vertex half-edge mesh built from a soup.
///
/// Read-only once built; analyses may share it across threads.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    positions: Vec<Point3<f64>>,
    faces: Vec<TopoFace>,
    half_edges: Vec<HalfEdge>,
    /// Undirected edge `(min, max)` to the topology faces using it.
    edge_faces: HashMap<(u32, u32), Vec<u32>>,
    removed: Vec<RemovedFace>,
    shell_count: usize,
    flipped: usize,
    orientation_conflicts: usize,
    degraded: bool,
    weld_epsilon: f64,
}

impl Topology {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn faces(&self) -> &[TopoFace] {
        &self.faces
    }

    pub fn half_edges(&self) -> &[HalfEdge] {
        &self.half_edges
    }

    pub fn vertex_position(&self, vertex: u32) -> Point3<f64> {
        self.positions[vertex as usize]
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Next half-edge around the same face.
    #[inline]
    pub fn next(&self, half_edge: u32) -> u32 {
        let face = half_edge / 3;
        face * 3 + (half_edge % 3 + 1) % 3
    }

    /// Previous half-edge around the same face.
    #[inline]
    pub fn prev(&self, half_edge: u32) -> u32 {
        let face = half_edge / 3;
        face * 3 + (half_edge % 3 + 2) % 3
    }

    #[inline]
    pub fn twin(&self, half_edge: u32) -> Option<u32> {
        self.half_edges[half_edge as usize].twin
    }

    /// Soup face index of topology face `face`.
    #[inline]
    pub fn source_face(&self, face: u32) -> u32 {
        self.faces[face as usize].source
    }

    /// Topology faces incident to the undirected edge `(a, b)`.
    pub fn edge_faces(&self, a: u32, b: u32) -> &[u32] {
        let key = if a < b { (a, b) } else { (b, a) };
        self.edge_faces.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over undirected edges and their incident faces.
    pub fn edges(&self) -> impl Iterator<Item = ((u32, u32), &[u32])> + '_ {
        self.edge_faces.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_faces.len()
    }

    /// Soup faces excluded during reconstruction, in soup order.
    pub fn removed_faces(&self) -> &[RemovedFace] {
        &self.removed
    }

    pub fn shell_count(&self) -> usize {
        self.shell_count
    }

    /// Faces whose winding was reversed during orientation.
    pub fn flipped_face_count(&self) -> usize {
        self.flipped
    }

    /// Manifold edges still traversed in the same direction by both faces
    /// after orientation (non-orientable shells).
    pub fn orientation_conflicts(&self) -> usize {
        self.orientation_conflicts
    }

    /// True when orientation was abandoned after a numerical failure.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Weld distance that was actually applied.
    pub fn weld_epsilon(&self) -> f64 {
        self.weld_epsilon
    }

    /// Count half-edges without a twin.
    pub fn boundary_edge_count(&self) -> usize {
        self.half_edges.iter().filter(|h| h.is_boundary()).count()
    }
}

/// First NaN or infinite coordinate among the corners of `face`.
pub(crate) fn invalid_coordinate(soup: &TriangleSoup, face: usize) -> Option<MeshError> {
    (face * 3..face * 3 + 3).find_map(|corner| {
        let p = soup.positions.get(corner)?;
        ["x", "y", "z"]
            .into_iter()
            .zip(p.iter())
            .find(|(_, v)| !v.is_finite())
            .map(|(coordinate, &value)| MeshError::InvalidCoordinate {
                corner_index: corner,
                coordinate,
                value,
            })
    })
}

/// Builds a [`Topology`] from a [`TriangleSoup`].
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    params: TopologyParams,
}

impl TopologyBuilder {
    pub fn new(params: TopologyParams) -> Self {
        Self { params }
    }

    /// Reconstruct connectivity. Never fails; malformed input yields an empty
    /// or partial topology.
    pub fn build(&self, soup: &TriangleSoup) -> Topology {
        let _timer = OperationTimer::with_faces("topology", soup.face_count());

        if soup.is_ragged() {
            warn!(
                corners = soup.corner_count(),
                "Soup corner count is not a multiple of 3, ignoring trailing corners"
            );
        }

        let mut removed = Vec::new();
        let mut candidates: Vec<u32> = Vec::with_capacity(soup.face_count());
        for (face, tri) in soup.triangles().enumerate() {
            if tri.is_finite() {
                candidates.push(face as u32);
            } else {
                removed.push(RemovedFace {
                    source: face as u32,
                    reason: RemovalReason::NonFinite,
                });
            }
        }

        if let Some(first) = removed.first()
            && let Some(err) = invalid_coordinate(soup, first.source as usize)
        {
            warn!(
                faces = removed.len(),
                error = %err,
                "Faces with non-finite coordinates excluded"
            );
        }

        let weld_epsilon = self.effective_weld_epsilon(soup);
        let (positions, corner_vertex) = weld_corners(soup, &candidates, weld_epsilon);

        let mut faces: Vec<TopoFace> = Vec::with_capacity(candidates.len());
        let mut seen: HashSet<[u32; 3]> = HashSet::new();
        for &source in &candidates {
            let base = source as usize * 3;
            let vertices = [
                corner_vertex[base],
                corner_vertex[base + 1],
                corner_vertex[base + 2],
            ];

            if vertices[0] == vertices[1] || vertices[1] == vertices[2] || vertices[0] == vertices[2]
            {
                removed.push(RemovedFace {
                    source,
                    reason: RemovalReason::Collapsed,
                });
                continue;
            }

            if self.params.merge_duplicate_faces {
                let mut key = vertices;
                key.sort_unstable();
                if !seen.insert(key) {
                    removed.push(RemovedFace {
                        source,
                        reason: RemovalReason::Duplicate,
                    });
                    continue;
                }
            }

            faces.push(TopoFace {
                vertices,
                source,
                shell: 0,
            });
        }
        removed.sort_unstable_by_key(|r| r.source);

        let edge_faces = build_edge_map(&faces);
        let shell_count = assign_shells(&mut faces, &edge_faces);

        let mut flipped = 0;
        let mut degraded = false;
        if self.params.orient {
            match orient_shells(&faces, &edge_faces, &positions, shell_count) {
                Ok(flips) => {
                    for (face, flip) in faces.iter_mut().zip(&flips) {
                        if *flip {
                            face.vertices.swap(1, 2);
                            flipped += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Orientation failed, keeping input winding");
                    degraded = true;
                }
            }
        }

        let half_edges = build_half_edges(&faces);
        let orientation_conflicts = count_conflicts(&faces, &edge_faces);

        if !removed.is_empty() {
            debug!(removed = removed.len(), "Excluded faces from topology");
        }
        if flipped > 0 {
            info!(
                flipped,
                shells = shell_count,
                "Reoriented faces for consistent winding"
            );
        }
        if orientation_conflicts > 0 {
            warn!(
                conflicts = orientation_conflicts,
                "Shared edges run the same way in both faces and stay unpaired"
            );
        }

        debug!(
            vertices = positions.len(),
            faces = faces.len(),
            shells = shell_count,
            weld_epsilon,
            "Built topology"
        );

        Topology {
            positions,
            faces,
            half_edges,
            edge_faces,
            removed,
            shell_count,
            flipped,
            orientation_conflicts,
            degraded,
            weld_epsilon,
        }
    }

    fn effective_weld_epsilon(&self, soup: &TriangleSoup) -> f64 {
        let diagonal = soup
            .bounds()
            .map(|(min, max)| (max - min).norm())
            .unwrap_or(0.0);
        let relative = self.params.relative_weld_epsilon * diagonal;
        if relative.is_finite() {
            self.params.weld_epsilon.max(relative)
        } else {
            self.params.weld_epsilon
        }
    }
}

/// Merge corners of the candidate faces into shared vertices.
///
/// Returns the welded positions and, for every soup corner, its vertex index.
/// Corners of excluded faces map to `u32::MAX`.
fn weld_corners(
    soup: &TriangleSoup,
    candidates: &[u32],
    epsilon: f64,
) -> (Vec<Point3<f64>>, Vec<u32>) {
    let corner_count = soup.face_count() * 3;
    let corners: Vec<usize> = candidates
        .iter()
        .flat_map(|&f| {
            let base = f as usize * 3;
            [base, base + 1, base + 2]
        })
        .collect();

    // Greedy clustering in corner order: each unclaimed corner becomes a
    // representative and claims every unclaimed corner within `epsilon` of
    // itself. Clusters never chain, so remap always points at a root.
    let mut remap: Vec<usize> = (0..corner_count).collect();

    if epsilon > 0.0 {
        let cell_size = epsilon * 2.0;
        let mut spatial_hash: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for &c in &corners {
            spatial_hash
                .entry(pos_to_cell(&soup.positions[c], cell_size))
                .or_default()
                .push(c);
        }

        for &c in &corners {
            if remap[c] != c {
                continue;
            }
            let pos = soup.positions[c];
            let cell = pos_to_cell(&pos, cell_size);

            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let neighbor = (
                            cell.0.saturating_add(dx),
                            cell.1.saturating_add(dy),
                            cell.2.saturating_add(dz),
                        );
                        let Some(others) = spatial_hash.get(&neighbor) else {
                            continue;
                        };
                        for &other in others {
                            if other <= c || remap[other] != other {
                                continue;
                            }
                            if (soup.positions[other] - pos).norm() <= epsilon {
                                remap[other] = c;
                            }
                        }
                    }
                }
            }
        }
    } else {
        let mut exact: HashMap<[u64; 3], usize> = HashMap::new();
        for &c in &corners {
            let p = soup.positions[c];
            let key = [bits(p.x), bits(p.y), bits(p.z)];
            remap[c] = *exact.entry(key).or_insert(c);
        }
    }

    let mut corner_vertex = vec![u32::MAX; corner_count];
    let mut positions = Vec::new();
    let mut representative_vertex: HashMap<usize, u32> = HashMap::new();
    for &c in &corners {
        let rep = remap[c];
        let vertex = *representative_vertex.entry(rep).or_insert_with(|| {
            positions.push(soup.positions[rep]);
            (positions.len() - 1) as u32
        });
        corner_vertex[c] = vertex;
    }

    debug!(
        corners = corners.len(),
        vertices = positions.len(),
        epsilon,
        "Welded corners"
    );

    (positions, corner_vertex)
}

fn pos_to_cell(pos: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
        (pos.z / cell_size).floor() as i64,
    )
}

/// Bit pattern of a coordinate with `-0.0` folded into `0.0`.
fn bits(value: f64) -> u64 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

fn build_edge_map(faces: &[TopoFace]) -> HashMap<(u32, u32), Vec<u32>> {
    let mut edge_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::with_capacity(faces.len() * 3 / 2);
    for (face_idx, face) in faces.iter().enumerate() {
        for k in 0..3 {
            let key = edge_key(face.vertices[k], face.vertices[(k + 1) % 3]);
            edge_faces.entry(key).or_default().push(face_idx as u32);
        }
    }
    edge_faces
}

/// Label faces with shell ids. Shells are connected through manifold edges
/// (exactly two incident faces), the edges orientation can propagate across.
fn assign_shells(faces: &mut [TopoFace], edge_faces: &HashMap<(u32, u32), Vec<u32>>) -> usize {
    let mut visited = vec![false; faces.len()];
    let mut shell_count = 0u32;
    let mut queue = VecDeque::new();

    for start in 0..faces.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        while let Some(face_idx) = queue.pop_front() {
            faces[face_idx].shell = shell_count;
            let verts = faces[face_idx].vertices;
            for k in 0..3 {
                let key = edge_key(verts[k], verts[(k + 1) % 3]);
                let Some(neighbors) = edge_faces.get(&key) else {
                    continue;
                };
                if neighbors.len() != 2 {
                    continue;
                }
                for &n in neighbors {
                    let n = n as usize;
                    if !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }

        shell_count += 1;
    }

    shell_count as usize
}

/// Check if edge (a, b) appears in face in the same direction (a -> b).
/// Returns Some(true) if same direction, Some(false) if opposite, None if edge not found.
fn edge_direction_in_face(face: &[u32; 3], a: u32, b: u32) -> Option<bool> {
    for i in 0..3 {
        let v0 = face[i];
        let v1 = face[(i + 1) % 3];

        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}

/// Decide which faces to flip.
///
/// Within a shell, the first face seeds a BFS that makes every shared edge
/// run in opposite directions. The flip set is then inverted if it covers
/// more than half of the shell, so the majority winding wins. Closed shells
/// with negative signed volume are inverted once more to face outward.
fn orient_shells(
    faces: &[TopoFace],
    edge_faces: &HashMap<(u32, u32), Vec<u32>>,
    positions: &[Point3<f64>],
    shell_count: usize,
) -> MeshResult<Vec<bool>> {
    let mut flip = vec![false; faces.len()];
    let mut visited = vec![false; faces.len()];
    let mut shell_faces: Vec<Vec<usize>> = vec![Vec::new(); shell_count];
    for (i, face) in faces.iter().enumerate() {
        shell_faces[face.shell as usize].push(i);
    }

    let mut queue = VecDeque::new();
    for members in &shell_faces {
        let Some(&start) = members.first() else {
            continue;
        };

        visited[start] = true;
        queue.push_back(start);
        while let Some(face_idx) = queue.pop_front() {
            let verts = faces[face_idx].vertices;
            for k in 0..3 {
                let (a, b) = (verts[k], verts[(k + 1) % 3]);
                let Some(neighbors) = edge_faces.get(&edge_key(a, b)) else {
                    continue;
                };
                if neighbors.len() != 2 {
                    continue;
                }
                for &n in neighbors {
                    let n = n as usize;
                    if n == face_idx || visited[n] {
                        continue;
                    }
                    visited[n] = true;

                    // Neighbor must run b -> a once both flips are applied
                    let same = edge_direction_in_face(&faces[n].vertices, a, b).unwrap_or(false);
                    flip[n] = flip[face_idx] ^ same;
                    queue.push_back(n);
                }
            }
        }

        let flipped = members.iter().filter(|&&f| flip[f]).count();
        if flipped * 2 > members.len() {
            for &f in members {
                flip[f] = !flip[f];
            }
        }

        let closed = members.iter().all(|&f| {
            let v = faces[f].vertices;
            (0..3).all(|k| {
                edge_faces
                    .get(&edge_key(v[k], v[(k + 1) % 3]))
                    .is_some_and(|n| n.len() == 2)
            })
        });
        if closed {
            let volume = signed_volume(faces, positions, members, &flip);
            if !volume.is_finite() {
                return Err(MeshError::numerical(
                    "orientation",
                    format!("signed volume of a closed shell is {}", volume),
                ));
            }
            if volume < 0.0 {
                for &f in members {
                    flip[f] = !flip[f];
                }
            }
        }
    }

    Ok(flip)
}

/// Six times the signed volume enclosed by the shell, with flips applied.
///
/// Measured from a vertex of the shell so far-from-origin meshes keep
/// their precision.
fn signed_volume(
    faces: &[TopoFace],
    positions: &[Point3<f64>],
    members: &[usize],
    flip: &[bool],
) -> f64 {
    let Some(&first) = members.first() else {
        return 0.0;
    };
    let origin = positions[faces[first].vertices[0] as usize];
    members
        .iter()
        .map(|&f| {
            let [a, b, c] = faces[f].vertices;
            let (b, c) = if flip[f] { (c, b) } else { (b, c) };
            let p0 = positions[a as usize] - origin;
            let p1 = positions[b as usize] - origin;
            let p2 = positions[c as usize] - origin;
            p0.dot(&p1.cross(&p2))
        })
        .sum()
}

/// Build half-edges and pair each with an unpaired opposite-direction twin.
fn build_half_edges(faces: &[TopoFace]) -> Vec<HalfEdge> {
    let mut half_edges = Vec::with_capacity(faces.len() * 3);
    for (face_idx, face) in faces.iter().enumerate() {
        for k in 0..3 {
            half_edges.push(HalfEdge {
                origin: face.vertices[k],
                target: face.vertices[(k + 1) % 3],
                face: face_idx as u32,
                twin: None,
            });
        }
    }

    let mut unpaired: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
    for h in 0..half_edges.len() {
        let (origin, target) = (half_edges[h].origin, half_edges[h].target);
        let partner = unpaired
            .get_mut(&(target, origin))
            .and_then(|candidates| candidates.pop());

        match partner {
            Some(t) => {
                half_edges[h].twin = Some(t);
                half_edges[t as usize].twin = Some(h as u32);
            }
            None => unpaired.entry((origin, target)).or_default().push(h as u32),
        }
    }

    half_edges
}

fn count_conflicts(faces: &[TopoFace], edge_faces: &HashMap<(u32, u32), Vec<u32>>) -> usize {
    edge_faces
        .iter()
        .filter(|(_, incident)| incident.len() == 2)
        .filter(|((a, b), incident)| {
            let d0 = edge_direction_in_face(&faces[incident[0] as usize].vertices, *a, *b);
            let d1 = edge_direction_in_face(&faces[incident[1] as usize].vertices, *a, *b);
            d0 == d1
        })
        .count()
}
