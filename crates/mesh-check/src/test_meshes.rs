//! Small fixture meshes for unit tests.

use nalgebra::Point3;

use crate::types::TriangleSoup;

const CUBE_VERTICES: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Outward CCW faces: bottom, top, front, back, left, right.
const CUBE_FACES: [[usize; 3]; 12] = [
    [0, 2, 1],
    [0, 3, 2],
    [4, 5, 6],
    [4, 6, 7],
    [0, 1, 5],
    [0, 5, 4],
    [3, 7, 6],
    [3, 6, 2],
    [0, 4, 7],
    [0, 7, 3],
    [1, 2, 6],
    [1, 6, 5],
];

fn point(v: [f64; 3]) -> Point3<f64> {
    Point3::new(v[0], v[1], v[2])
}

fn soup_from(faces: impl Iterator<Item = [usize; 3]>) -> TriangleSoup {
    let mut soup = TriangleSoup::new();
    for [a, b, c] in faces {
        soup.push_triangle([
            point(CUBE_VERTICES[a]),
            point(CUBE_VERTICES[b]),
            point(CUBE_VERTICES[c]),
        ]);
    }
    soup
}

/// Unit cube, 12 outward-wound triangles.
pub fn cube() -> TriangleSoup {
    soup_from(CUBE_FACES.into_iter())
}

/// Unit cube without its top face (faces 2 and 3).
pub fn open_cube() -> TriangleSoup {
    soup_from(
        CUBE_FACES
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != 2 && *i != 3)
            .map(|(_, f)| f),
    )
}

/// Tetrahedron with outward winding.
pub fn tetrahedron() -> TriangleSoup {
    let v = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    TriangleSoup::from_indexed(&v, &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]])
}
