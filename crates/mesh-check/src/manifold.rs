//! Closure, manifoldness, hole and degeneracy analysis over a built topology.
//!
//! All face indices in the reports are soup indices.

use hashbrown::HashMap;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::topology::{RemovalReason, Topology};

/// Default relative tolerance for [`is_degenerate_triangle`].
pub const DEFAULT_DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Result of the watertightness test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatertightReport {
    pub is_watertight: bool,
    /// Half-edges without a twin.
    pub boundary_edge_count: usize,
}

/// A mesh is watertight when it has faces and every half-edge has a twin.
pub fn check_watertight(topology: &Topology) -> WatertightReport {
    let boundary_edge_count = topology.boundary_edge_count();
    WatertightReport {
        is_watertight: !topology.is_empty() && boundary_edge_count == 0,
        boundary_edge_count,
    }
}

/// Vertices whose incident faces do not form a single fan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonManifoldReport {
    /// Topology vertex indices, ascending.
    pub vertices: Vec<u32>,
    /// Undirected edges shared by more than two faces.
    pub edge_count: usize,
    /// Soup faces touching a non-manifold vertex, ascending. Isolated faces,
    /// whose every edge belongs to them alone, are left out.
    pub faces: Vec<u32>,
}

impl NonManifoldReport {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

impl std::fmt::Display for NonManifoldReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.vertices.is_empty() {
            write!(f, "All vertices are manifold")
        } else {
            write!(
                f,
                "{} non-manifold vertices, {} non-manifold edges, {} faces affected",
                self.vertices.len(),
                self.edge_count,
                self.faces.len()
            )
        }
    }
}

/// True if no edge of `face` is shared with another face.
fn is_isolated_face(topology: &Topology, face: u32) -> bool {
    let [a, b, c] = topology.faces()[face as usize].vertices;
    [(a, b), (b, c), (c, a)]
        .into_iter()
        .all(|(u, v)| topology.edge_faces(u, v).len() <= 1)
}

/// Find non-manifold vertices.
///
/// Around each vertex, incident faces are grouped into fans connected through
/// edges shared by exactly two faces. A vertex is non-manifold if it has more
/// than one fan, or if any of its edges is shared by more than two faces.
///
/// The reported faces are those touching a non-manifold vertex that share at
/// least one edge with another face.
pub fn find_non_manifold(topology: &Topology) -> NonManifoldReport {
    let faces = topology.faces();
    let mut vertex_faces: Vec<Vec<u32>> = vec![Vec::new(); topology.vertex_count()];
    for (face_idx, face) in faces.iter().enumerate() {
        for &v in &face.vertices {
            vertex_faces[v as usize].push(face_idx as u32);
        }
    }

    let edge_count = topology
        .edges()
        .filter(|(_, incident)| incident.len() > 2)
        .count();

    let vertices: Vec<u32> = vertex_faces
        .par_iter()
        .enumerate()
        .filter(|(v, incident)| !is_single_fan(topology, *v as u32, incident))
        .map(|(v, _)| v as u32)
        .collect();

    let mut affected: Vec<u32> = vertices
        .iter()
        .flat_map(|&v| vertex_faces[v as usize].iter())
        .filter(|&&f| !is_isolated_face(topology, f))
        .map(|&f| topology.source_face(f))
        .collect();
    affected.sort_unstable();
    affected.dedup();

    if vertices.is_empty() {
        debug!("All vertices are manifold");
    } else {
        warn!(
            vertices = vertices.len(),
            edges = edge_count,
            faces = affected.len(),
            "Found non-manifold vertices"
        );
    }

    NonManifoldReport {
        vertices,
        edge_count,
        faces: affected,
    }
}

fn is_single_fan(topology: &Topology, vertex: u32, incident: &[u32]) -> bool {
    if incident.len() <= 1 {
        return true;
    }

    // Local union-find over the incident faces
    let mut parent: Vec<usize> = (0..incident.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let local: HashMap<u32, usize> = incident.iter().enumerate().map(|(i, &f)| (f, i)).collect();
    for &f in incident {
        for &w in &topology.faces()[f as usize].vertices {
            if w == vertex {
                continue;
            }
            let around = topology.edge_faces(vertex, w);
            if around.len() > 2 {
                return false;
            }
            if let [a, b] = around
                && let (Some(&ia), Some(&ib)) = (local.get(a), local.get(b))
            {
                let (ra, rb) = (find(&mut parent, ia), find(&mut parent, ib));
                parent[ra] = rb;
            }
        }
    }

    let root = find(&mut parent, 0);
    (1..incident.len()).all(|i| find(&mut parent, i) == root)
}

/// One boundary cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HoleLoop {
    /// Topology vertex indices in walk order.
    pub vertices: Vec<u32>,
    /// Positions of `vertices`.
    pub positions: Vec<Point3<f64>>,
    /// False when the walk stopped at a revisited vertex or a dead end
    /// instead of returning to its start.
    pub closed: bool,
}

impl HoleLoop {
    /// Number of vertices (and edges, when closed) in the loop.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Boundary loops of a mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoleReport {
    pub loops: Vec<HoleLoop>,
}

impl HoleReport {
    pub fn hole_count(&self) -> usize {
        self.loops.len()
    }

    /// Loops whose walk was cut short.
    pub fn truncated_count(&self) -> usize {
        self.loops.iter().filter(|l| !l.closed).count()
    }
}

/// Trace boundary loops by following twin-less half-edges.
///
/// Walks start from boundary half-edges in index order. From each target
/// vertex the next unused outgoing boundary half-edge is taken. A walk ends
/// when it returns to its start, revisits a vertex, or finds no continuation;
/// the latter two produce a loop with `closed == false`.
pub fn find_holes(topology: &Topology) -> HoleReport {
    let half_edges = topology.half_edges();

    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    for (h, he) in half_edges.iter().enumerate() {
        if he.is_boundary() {
            outgoing.entry(he.origin).or_default().push(h as u32);
        }
    }
    if outgoing.is_empty() {
        return HoleReport::default();
    }

    let mut used = vec![false; half_edges.len()];
    let mut loops = Vec::new();

    for (h, he) in half_edges.iter().enumerate() {
        if !he.is_boundary() || used[h] {
            continue;
        }
        used[h] = true;

        let start = he.origin;
        let mut vertices = vec![start];
        let mut visited = hashbrown::HashSet::new();
        visited.insert(start);
        let mut current = he.target;

        let closed = loop {
            if current == start {
                break true;
            }
            if !visited.insert(current) {
                break false;
            }
            vertices.push(current);

            let next = outgoing
                .get(&current)
                .and_then(|candidates| candidates.iter().copied().find(|&c| !used[c as usize]));
            match next {
                Some(next) => {
                    used[next as usize] = true;
                    current = half_edges[next as usize].target;
                }
                None => break false,
            }
        };

        if !closed {
            warn!(
                start,
                length = vertices.len(),
                "Boundary walk truncated on malformed border"
            );
        }

        let positions = vertices
            .iter()
            .map(|&v| topology.vertex_position(v))
            .collect();
        loops.push(HoleLoop {
            vertices,
            positions,
            closed,
        });
    }

    info!(
        holes = loops.len(),
        sizes = ?loops.iter().map(HoleLoop::len).collect::<Vec<_>>(),
        "Detected boundary loops"
    );

    HoleReport { loops }
}

/// Squared area over the largest squared edge length.
///
/// Returns `0.0` when any edge has zero length.
pub fn degeneracy_ratio(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    let e0 = p1 - p0;
    let e1 = p2 - p1;
    let e2 = p0 - p2;
    let a2 = e0.norm_squared();
    let b2 = e1.norm_squared();
    let c2 = e2.norm_squared();
    if a2 == 0.0 || b2 == 0.0 || c2 == 0.0 {
        return 0.0;
    }
    let area2 = e0.cross(&(p2 - p0)).norm_squared() / 4.0;
    area2 / a2.max(b2).max(c2)
}

/// A triangle is degenerate if an edge has zero length or its
/// [`degeneracy_ratio`] is below `tolerance`.
pub fn is_degenerate_triangle(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    tolerance: f64,
) -> bool {
    degeneracy_ratio(p0, p1, p2) < tolerance
}

/// Degenerate faces of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DegenerateReport {
    /// Soup face indices, ascending.
    pub faces: Vec<u32>,
}

impl DegenerateReport {
    pub fn count(&self) -> usize {
        self.faces.len()
    }
}

/// Find degenerate faces.
///
/// Topology faces are tested with their welded positions. Faces that
/// collapsed during welding have a zero-length edge and are reported too.
/// Fails if the ratio cannot be computed for some face (overflow to NaN).
pub fn find_degenerate(topology: &Topology, tolerance: f64) -> MeshResult<DegenerateReport> {
    let flagged: Vec<MeshResult<Option<u32>>> = topology
        .faces()
        .par_iter()
        .map(|face| {
            let [a, b, c] = face.vertices.map(|v| topology.vertex_position(v));
            let ratio = degeneracy_ratio(&a, &b, &c);
            if ratio.is_nan() {
                return Err(MeshError::numerical(
                    "degenerate",
                    format!("shape ratio of face {} is NaN", face.source),
                ));
            }
            Ok((ratio < tolerance).then_some(face.source))
        })
        .collect();

    let mut faces = Vec::new();
    for entry in flagged {
        if let Some(source) = entry? {
            faces.push(source);
        }
    }
    faces.extend(
        topology
            .removed_faces()
            .iter()
            .filter(|r| r.reason == RemovalReason::Collapsed)
            .map(|r| r.source),
    );
    faces.sort_unstable();

    if faces.is_empty() {
        debug!("No degenerate faces");
    } else {
        info!(count = faces.len(), tolerance, "Found degenerate faces");
    }

    Ok(DegenerateReport { faces })
}
