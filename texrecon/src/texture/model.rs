use std::collections::hash_map::Entry::Vacant;
use std::collections::HashMap;

use image::RgbImage;
use log::info;

use crate::mesh::Mesh;
use crate::texture::*;

pub struct Material {
    pub name: String,
    pub diffuse_map: RgbImage,
}

// Faces sharing a material; 'texcoords' is empty for the untextured group.
pub struct FaceGroup {
    pub material: Option<usize>,
    pub faces: Vec<[usize; 3]>,
    pub texcoords: Vec<[usize; 3]>,
}

pub struct Model {
    pub vertices: Vec<Point3>,
    pub normals: Vec<Vector3>,
    pub texcoords: Vec<Vector2>,
    pub materials: Vec<Material>,
    pub groups: Vec<FaceGroup>,
}

impl Model {
    pub fn num_faces(&self) -> usize {
        self.groups.iter().map(|g| g.faces.len()).sum()
    }
}

// Merges texture coordinates that agree up to EPS.
pub fn compress_uv_coords(uv_coords: &[[Vector2; 3]]) -> (Vec<Vector2>, Vec<[usize; 3]>) {
    const EPS: f64 = 1e-6;
    let up = |uv: Vector2| [(uv[0] / EPS).round() as i64, (uv[1] / EPS).round() as i64];
    let down = |uv: [i64; 2]| Vector2::new(uv[0] as f64 * EPS, uv[1] as f64 * EPS);

    let mut uv_unique: HashMap<[i64; 2], usize> = HashMap::new();
    let mut uv_ordered = vec![];
    let mut uv_idxs = vec![];
    for uvs in uv_coords {
        let mut idxs = [0; 3];
        for j in 0..3 {
            let uv = up(uvs[j]);
            if let Vacant(e) = uv_unique.entry(uv) {
                e.insert(uv_ordered.len());
                uv_ordered.push(down(uv));
            }
            idxs[j] = uv_unique[&uv];
        }
        uv_idxs.push(idxs);
    }
    (uv_ordered, uv_idxs)
}

// One material per atlas. Faces that no atlas covers go to a leading
// untextured group.
pub fn build_model(mesh: &Mesh, atlases: Vec<TextureAtlas>) -> Model {
    let mut textured = vec![false; mesh.faces.len()];
    let mut all_texcoords = vec![];
    for atlas in &atlases {
        for &face_idx in atlas.faces() {
            textured[face_idx] = true;
        }
        all_texcoords.extend_from_slice(atlas.texcoords());
    }
    let (texcoords, mut texcoord_idxs) = compress_uv_coords(&all_texcoords);

    let mut groups = vec![];
    let untextured: Vec<[usize; 3]> = (0..mesh.faces.len())
        .filter(|&f| !textured[f])
        .map(|f| mesh.faces[f])
        .collect();
    if !untextured.is_empty() {
        groups.push(FaceGroup {
            material: None,
            faces: untextured,
            texcoords: vec![],
        });
    }

    let mut materials = vec![];
    for (i, atlas) in atlases.into_iter().enumerate() {
        let (image, faces, _) = atlas.into_parts();
        let rest = texcoord_idxs.split_off(faces.len());
        groups.push(FaceGroup {
            material: Some(i),
            faces: faces.iter().map(|&f| mesh.faces[f]).collect(),
            texcoords: std::mem::replace(&mut texcoord_idxs, rest),
        });
        materials.push(Material {
            name: format!("material{}", i),
            diffuse_map: image,
        });
    }

    let model = Model {
        vertices: mesh.vertices.clone(),
        normals: mesh.normals.clone(),
        texcoords,
        materials,
        groups,
    };
    info!(
        "Built model with {} vertices, {} texture coordinates, {} faces and \
        {} materials",
        model.vertices.len(),
        model.texcoords.len(),
        model.num_faces(),
        model.materials.len()
    );
    model
}
