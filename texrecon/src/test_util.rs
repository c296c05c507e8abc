// Synthetic meshes and views shared by the unit tests.

use image::{Rgb, RgbImage};
use nalgebra::Rotation3;

use crate::mesh::{Mesh, Point3, Vector3, VertexInfos};
use crate::texture::{
    generate_texture_patches, Camera, ColorImage, Graph, TexturePatch,
    TextureView, VertexProjectionInfos,
};

// Faces come in pairs per side: bottom, top, front (y = 0), back, left,
// right. All normals point outwards.
pub fn unit_cube() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
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
    Mesh::new(vertices, faces).unwrap()
}

// Camera at 'eye' looking at 'target'; the viewing direction becomes the
// camera's positive z axis.
pub fn look_at(eye: Point3, target: Point3, focal_length: f64) -> Camera {
    let dir = target - eye;
    let mut up = Vector3::y();
    if dir.cross(&up).norm() < 1e-9 * dir.norm() {
        up = Vector3::z();
    }
    let rotation = Rotation3::look_at_lh(&dir, &up);
    let matrix = rotation.matrix();
    let translation = -(matrix * eye.coords);

    let mut rows = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            rows[r * 3 + c] = matrix[(r, c)];
        }
    }
    Camera {
        focal_length,
        principal_point: [0.5, 0.5],
        pixel_aspect: 1.0,
        rotation: rows,
        translation: translation.into(),
    }
}

pub fn uniform_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

pub fn uniform_color_image(width: u32, height: u32, value: f64) -> ColorImage {
    ColorImage::from_pixel(width, height, Rgb([value as f32; 3]))
}

pub const CUBE_VIEW_COLORS: [[u8; 3]; 6] = [
    [200, 40, 40],
    [40, 200, 40],
    [40, 40, 200],
    [200, 200, 40],
    [40, 200, 200],
    [200, 40, 200],
];

// One uniformly colored view per side of 'unit_cube', looking from
// -z, +z, -y, +y, -x and +x in that order.
pub fn cube_views(size: u32) -> Vec<TextureView> {
    let center = Point3::new(0.5, 0.5, 0.5);
    let dirs = [
        -Vector3::z(),
        Vector3::z(),
        -Vector3::y(),
        Vector3::y(),
        -Vector3::x(),
        Vector3::x(),
    ];
    dirs.iter()
        .zip(CUBE_VIEW_COLORS)
        .enumerate()
        .map(|(id, (dir, color))| {
            let camera = look_at(center + dir * 3.0, center, 1.0);
            TextureView::new(id, camera, uniform_image(size, size, color))
        })
        .collect()
}

// The two triangles of a unit square in the z = 0 plane, each textured from
// its own uniformly colored view. Both views share one camera, so the
// patches line up pixel for pixel.
pub fn two_triangle_patches(
    left: [u8; 3],
    right: [u8; 3],
) -> (Mesh, VertexInfos, Graph, Vec<TexturePatch>, VertexProjectionInfos) {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let mesh = Mesh::new(vertices, vec![[0, 1, 2], [0, 2, 3]]).unwrap();
    let vertex_infos = VertexInfos::new(&mesh);
    let eye = Point3::new(0.5, 0.5, 3.0);
    let target = Point3::new(0.5, 0.5, 0.0);
    let views = vec![
        TextureView::new(0, look_at(eye, target, 1.0), uniform_image(64, 64, left)),
        TextureView::new(1, look_at(eye, target, 1.0), uniform_image(64, 64, right)),
    ];
    let mut graph = Graph::build(&mesh, &vertex_infos);
    graph.set_label(0, Some(0));
    graph.set_label(1, Some(1));
    let (patches, infos) = generate_texture_patches(&graph, &mesh, &views);
    (mesh, vertex_infos, graph, patches, infos)
}
