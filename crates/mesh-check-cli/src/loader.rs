//! OBJ loading into a triangle soup.

use std::path::Path;

use mesh_check::{MeshError, MeshResult, TriangleSoup};
use nalgebra::{Point2, Point3, Vector3};
use tracing::debug;

/// Load an OBJ file, expanding every face into its own three corners.
///
/// All models in the file are merged. Texture coordinates and normals are
/// kept when the file has them; corners of models without them get zeros.
pub fn load_obj(path: &Path) -> MeshResult<TriangleSoup> {
    let id = path.display().to_string();
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::load_failed(&id, e.to_string()))?;

    let face_total: usize = models.iter().map(|m| m.mesh.indices.len() / 3).sum();
    let any_uvs = models.iter().any(|m| !m.mesh.texcoords.is_empty());
    let any_normals = models.iter().any(|m| !m.mesh.normals.is_empty());

    let mut soup = TriangleSoup::with_capacity(face_total);
    for model in &models {
        let mesh = &model.mesh;
        debug!(model = %model.name, faces = mesh.indices.len() / 3, "OBJ model");

        for face in mesh.indices.chunks_exact(3) {
            for &index in face {
                let i = index as usize;
                let position = mesh
                    .positions
                    .get(3 * i..3 * i + 3)
                    .ok_or_else(|| {
                        MeshError::load_failed(&id, format!("vertex index {} out of range", i))
                    })?;
                soup.positions.push(Point3::new(
                    position[0] as f64,
                    position[1] as f64,
                    position[2] as f64,
                ));

                if any_uvs {
                    let uv = mesh
                        .texcoords
                        .get(2 * i..2 * i + 2)
                        .map(|t| Point2::new(t[0] as f64, t[1] as f64))
                        .unwrap_or_else(Point2::origin);
                    soup.uvs.push(uv);
                }
                if any_normals {
                    let normal = mesh
                        .normals
                        .get(3 * i..3 * i + 3)
                        .map(|n| Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64))
                        .unwrap_or_else(Vector3::zeros);
                    soup.normals.push(normal);
                }
            }
        }
    }

    debug!(
        path = %id,
        models = models.len(),
        faces = soup.face_count(),
        has_uvs = soup.has_uvs(),
        "OBJ loaded"
    );

    Ok(soup)
}
