use image::{Luma, RgbImage};
use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use serde::{Deserialize, Serialize};

use crate::mesh::Mesh;
use crate::texture::*;
use base::defs::{Error, ErrorKind::*, Result};

// Pinhole camera. Focal length and principal point are normalized by the
// image size; rotation (row major) and translation map world to camera
// coordinates, with the camera looking down its positive z axis.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Camera {
    pub focal_length: f64,
    #[serde(default = "Camera::default_principal_point")]
    pub principal_point: [f64; 2],
    #[serde(default = "Camera::default_pixel_aspect")]
    pub pixel_aspect: f64,
    pub rotation: [f64; 9],
    pub translation: [f64; 3],
}

impl Camera {
    fn default_principal_point() -> [f64; 2] {
        [0.5, 0.5]
    }

    fn default_pixel_aspect() -> f64 {
        1.0
    }

    pub fn validate(&self) -> Result<()> {
        let finite = self
            .principal_point
            .iter()
            .chain(self.rotation.iter())
            .chain(self.translation.iter())
            .chain([self.focal_length, self.pixel_aspect].iter())
            .all(|c| c.is_finite());
        if !finite {
            return Err(Error::new(
                MalformedData,
                "camera has non-finite parameters".to_string(),
            ));
        }
        if self.focal_length <= 0.0 || self.pixel_aspect <= 0.0 {
            return Err(Error::new(
                MalformedData,
                "camera focal length and pixel aspect must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn rotation_matrix(&self) -> Matrix3 {
        Matrix3::from_row_slice(&self.rotation)
    }

    pub fn center(&self) -> Point3 {
        Point3::from(
            -(self.rotation_matrix().transpose()
                * Vector3::from(self.translation)),
        )
    }

    pub fn project(&self, p: &Point3, width: u32, height: u32) -> ProjectedPoint {
        let c = self.rotation_matrix() * p.coords + Vector3::from(self.translation);
        let fx = self.focal_length * width.max(height) as f64;
        let fy = fx / self.pixel_aspect;
        let [px, py] = self.principal_point;
        ProjectedPoint {
            point: Vector2::new(
                fx * c[0] / c[2] + px * width as f64 - 0.5,
                fy * c[1] / c[2] + py * height as f64 - 0.5,
            ),
            depth: c[2],
        }
    }
}

#[derive(Debug)]
pub struct TextureView {
    id: usize,
    camera: Camera,
    image: RgbImage,
    gradient_magnitude: GrayImage32,
}

impl TextureView {
    pub fn new(id: usize, camera: Camera, image: RgbImage) -> TextureView {
        let gradient_magnitude = compute_gradient_magnitude(&image);
        TextureView {
            id,
            camera,
            image,
            gradient_magnitude,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn project(&self, p: &Point3) -> ProjectedPoint {
        self.camera.project(p, self.width(), self.height())
    }

    pub fn sample_color(&self, xy: Vector2) -> Vector3 {
        sample_pixel(xy, &self.image)
    }

    pub fn sample_gradient(&self, xy: Vector2) -> f64 {
        let g = &self.gradient_magnitude;
        bilinear(xy, g.dimensions(), |x, y| g.get_pixel(x, y)[0] as f64)
    }

    // Inside the image with a one pixel margin.
    pub fn is_inside(&self, xy: Vector2) -> bool {
        let (w, h) = (self.width() as f64, self.height() as f64);
        xy[0] >= 1.0 && xy[1] >= 1.0 && xy[0] <= w - 2.0 && xy[1] <= h - 2.0
    }

    // Same camera, image replaced by a uniform color. Used to render the
    // view selection as a textured model.
    pub fn debug_embedding(&self) -> TextureView {
        let color = debug_color(self.id);
        let mut image = RgbImage::new(self.width(), self.height());
        for y in 0..image.height() {
            for x in 0..image.width() {
                set_pixel_as_vector3(x, y, color, &mut image);
            }
        }
        TextureView::new(self.id, self.camera.clone(), image)
    }
}

// Well separated hues for consecutive ids (golden ratio stepping).
pub fn debug_color(id: usize) -> Vector3 {
    let hue = (id as f64 * 0.618_033_988_75).fract() * 6.0;
    let (s, v) = (0.8, 230.0);
    let f = hue.fract();
    let (p, q, t) = (v * (1.0 - s), v * (1.0 - s * f), v * (1.0 - s * (1.0 - f)));
    match hue as u32 {
        0 => Vector3::new(v, t, p),
        1 => Vector3::new(q, v, p),
        2 => Vector3::new(p, v, t),
        3 => Vector3::new(p, q, v),
        4 => Vector3::new(t, p, v),
        _ => Vector3::new(v, p, q),
    }
}

// Sobel on luminance, normalized so that a step from 0 to 255 gives 255.
fn compute_gradient_magnitude(image: &RgbImage) -> GrayImage32 {
    let (w, h) = image.dimensions();
    let luma = |x: i64, y: i64| {
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        let c = get_pixel_as_vector3(x, y, image);
        0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
    };
    GrayImage32::from_fn(w, h, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let gx = (luma(x + 1, y - 1) + 2.0 * luma(x + 1, y) + luma(x + 1, y + 1))
            - (luma(x - 1, y - 1) + 2.0 * luma(x - 1, y) + luma(x - 1, y + 1));
        let gy = (luma(x - 1, y + 1) + 2.0 * luma(x, y + 1) + luma(x + 1, y + 1))
            - (luma(x - 1, y - 1) + 2.0 * luma(x, y - 1) + luma(x + 1, y - 1));
        Luma([((gx * gx + gy * gy).sqrt() / 4.0) as f32])
    })
}

// Every mesh vertex projected into one view, with occlusion flags.
pub struct ViewProjection {
    pub vertices: Vec<ProjectedPoint>,
    pub occluded: Vec<bool>,
    pub center: Point3,
}

impl ViewProjection {
    pub fn new(view: &TextureView, mesh: &Mesh) -> ViewProjection {
        let vertices: Vec<ProjectedPoint> =
            mesh.vertices.iter().map(|v| view.project(v)).collect();
        let occluded = compute_occlusion_for_all_vertices(&vertices, mesh);
        ViewProjection {
            vertices,
            occluded,
            center: view.camera().center(),
        }
    }

    pub fn face_points(&self, face: [usize; 3]) -> [Vector2; 3] {
        face.map(|v| self.vertices[v].point)
    }

    pub fn is_face_visible(
        &self,
        face_idx: usize,
        mesh: &Mesh,
        view: &TextureView,
    ) -> bool {
        let face = mesh.faces[face_idx];
        let in_front = face.iter().all(|&v| {
            let p = self.vertices[v];
            p.depth > 0.0 && !self.occluded[v] && view.is_inside(p.point)
        });
        let to_camera = self.center - mesh.face_centroid(face_idx);
        in_front && mesh.face_normal(face_idx).dot(&to_camera) > 0.0
    }
}

fn max(a: [f64; 3]) -> f64 {
    a[0].max(a[1]).max(a[2])
}

// A vertex is occluded when it projects strictly inside a face whose three
// vertices are all closer to the camera.
fn compute_occlusion_for_all_vertices(
    vertices_proj: &[ProjectedPoint],
    mesh: &Mesh,
) -> Vec<bool> {
    // Build 2d kdtree of all vertices in front of the camera.
    let mut kdtree = KdTree::new();
    for (i, v) in vertices_proj.iter().enumerate() {
        if v.depth > 0.0 && v.point.iter().all(|c| c.is_finite()) {
            let p: [f64; 2] = v.point.into();
            kdtree.add(&p, i).unwrap_or_default();
        }
    }

    let mut occluded = vec![false; vertices_proj.len()];

    for face in &mesh.faces {
        let [p0, p1, p2] = face.map(|v| vertices_proj[v]);
        if p0.depth <= 0.0 || p1.depth <= 0.0 || p2.depth <= 0.0 {
            continue;
        }
        let (v0, v1, v2) = (p0.point, p1.point, p2.point);
        let v = (v0 + v1 + v2) / 3.0;
        let radius = 1.1
            * max([
                (v0 - v).norm_squared(),
                (v1 - v).norm_squared(),
                (v2 - v).norm_squared(),
            ]);
        let center: [f64; 2] = v.into();
        let nearby = kdtree
            .within_unsorted(&center, radius, &squared_euclidean)
            .unwrap_or_default();
        for (_dist, &i) in nearby {
            let ProjectedPoint {
                point: vi,
                depth: di,
            } = vertices_proj[i];
            if p0.depth < di
                && p1.depth < di
                && p2.depth < di
                && containment_check(vi, [v0, v1, v2])
            {
                occluded[i] = true;
            }
        }
    }

    occluded
}
