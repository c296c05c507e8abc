use base::defs::{Error, ErrorKind::*, Result};

pub type Vector3 = nalgebra::Vector3<f64>;
pub type Point3 = nalgebra::Point3<f64>;

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Point3>,
    pub normals: Vec<Vector3>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<Point3>, faces: Vec<[usize; 3]>) -> Result<Mesh> {
        let mut mesh = Mesh {
            vertices,
            normals: vec![],
            faces,
        };
        mesh.validate()?;
        mesh.compute_normals();
        Ok(mesh)
    }

    pub fn validate(&self) -> Result<()> {
        if self.faces.is_empty() {
            return Err(Error::new(MalformedData, "mesh has no faces".to_string()));
        }

        for (i, v) in self.vertices.iter().enumerate() {
            if !v.coords.iter().all(|c| c.is_finite()) {
                let desc = format!("vertex {} has non-finite coordinates", i);
                return Err(Error::new(MalformedData, desc));
            }
        }

        for (i, &[v0, v1, v2]) in self.faces.iter().enumerate() {
            for v in [v0, v1, v2] {
                if v >= self.vertices.len() {
                    let desc =
                        format!("face {} references unknown vertex {}", i, v);
                    return Err(Error::new(MalformedData, desc));
                }
            }
            if v0 == v1 || v0 == v2 || v1 == v2 {
                let desc = format!("face {} has duplicate vertices", i);
                return Err(Error::new(MalformedData, desc));
            }
        }

        Ok(())
    }

    // Area weighted vertex normals; isolated vertices get a zero normal.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for &[v0, v1, v2] in &self.faces {
            let n = (self.vertices[v1] - self.vertices[v0])
                .cross(&(self.vertices[v2] - self.vertices[v0]));
            normals[v0] += n;
            normals[v1] += n;
            normals[v2] += n;
        }
        for n in normals.iter_mut() {
            if let Some(unit) = n.try_normalize(f64::EPSILON) {
                *n = unit;
            }
        }
        self.normals = normals;
    }

    pub fn face_normal(&self, face_idx: usize) -> Vector3 {
        let [v0, v1, v2] = self.faces[face_idx];
        (self.vertices[v1] - self.vertices[v0])
            .cross(&(self.vertices[v2] - self.vertices[v0]))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn face_centroid(&self, face_idx: usize) -> Point3 {
        let [v0, v1, v2] = self.faces[face_idx];
        Point3::from(
            (self.vertices[v0].coords
                + self.vertices[v1].coords
                + self.vertices[v2].coords)
                / 3.0,
        )
    }
}

// Per-vertex incidence data derived once from a mesh. All lists are sorted,
// which keeps every traversal built on top of them deterministic.
#[derive(Clone, Debug)]
pub struct VertexInfos {
    pub faces_around_vertex: Vec<Vec<usize>>,
    pub neighbouring_vertices: Vec<Vec<usize>>,
}

impl VertexInfos {
    pub fn new(mesh: &Mesh) -> VertexInfos {
        let mut faces_around_vertex = vec![vec![]; mesh.vertices.len()];
        let mut neighbouring_vertices = vec![vec![]; mesh.vertices.len()];

        for (f_idx, &[v0, v1, v2]) in mesh.faces.iter().enumerate() {
            faces_around_vertex[v0].push(f_idx);
            faces_around_vertex[v1].push(f_idx);
            faces_around_vertex[v2].push(f_idx);
            for [a, b] in [[v0, v1], [v0, v2], [v1, v2]] {
                neighbouring_vertices[a].push(b);
                neighbouring_vertices[b].push(a);
            }
        }

        for list in faces_around_vertex
            .iter_mut()
            .chain(neighbouring_vertices.iter_mut())
        {
            list.sort_unstable();
            list.dedup();
        }

        VertexInfos {
            faces_around_vertex,
            neighbouring_vertices,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.faces_around_vertex.len()
    }

    // Faces containing both vertices, in ascending order.
    pub fn faces_around_edge(&self, v0: usize, v1: usize) -> Vec<usize> {
        let (a, b) = (&self.faces_around_vertex[v0], &self.faces_around_vertex[v1]);
        let (mut i, mut j) = (0, 0);
        let mut shared = vec![];
        while i < a.len() && j < b.len() {
            if a[i] < b[j] {
                i += 1;
            } else if a[i] > b[j] {
                j += 1;
            } else {
                shared.push(a[i]);
                i += 1;
                j += 1;
            }
        }
        shared
    }
}
