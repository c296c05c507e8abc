use log::info;
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use crate::mesh::Mesh;
use crate::texture::*;

// Invalid pixels around the projected footprint of a patch.
pub const PATCH_BORDER: u32 = 2;

// A pixel is valid when its center lies within half a pixel diagonal of a
// projected face.
const COVERAGE_RADIUS: f64 = std::f64::consts::FRAC_1_SQRT_2;

// Pixels this close to a face receive its color adjustment.
const ADJUSTMENT_RADIUS: f64 = PATCH_BORDER as f64;

// Connected faces textured from one view, cut out of that view's image.
#[derive(Clone, Debug)]
pub struct TexturePatch {
    label: usize,
    faces: Vec<usize>,
    texcoords: Vec<[Vector2; 3]>,
    image: ColorImage,
    validity_mask: ImageMask,
    adjust_values: Vec<[Vector3; 3]>,
}

impl TexturePatch {
    // 'faces' must be sorted; 'texcoords' are in pixel units of 'image'.
    pub fn new(
        label: usize,
        faces: Vec<usize>,
        texcoords: Vec<[Vector2; 3]>,
        image: ColorImage,
    ) -> TexturePatch {
        assert_eq!(faces.len(), texcoords.len());
        let num_faces = faces.len();
        let mut patch = TexturePatch {
            label,
            faces,
            texcoords,
            validity_mask: ImageMask::from_element(
                image.height() as usize,
                image.width() as usize,
                false,
            ),
            image,
            adjust_values: vec![[Vector3::zeros(); 3]; num_faces],
        };
        patch.compute_validity_mask();
        patch
    }

    pub fn label(&self) -> usize {
        self.label
    }

    pub fn faces(&self) -> &[usize] {
        &self.faces
    }

    pub fn texcoords(&self) -> &[[Vector2; 3]] {
        &self.texcoords
    }

    pub fn image(&self) -> &ColorImage {
        &self.image
    }

    pub fn validity_mask(&self) -> &ImageMask {
        &self.validity_mask
    }

    pub fn adjust_values(&self) -> &[[Vector3; 3]] {
        &self.adjust_values
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    // Position of a mesh face within this patch.
    pub fn local_face_idx(&self, face_idx: usize) -> Option<usize> {
        self.faces.binary_search(&face_idx).ok()
    }

    pub fn is_valid_pixel(&self, x: u32, y: u32) -> bool {
        x < self.width()
            && y < self.height()
            && self.validity_mask[(y as usize, x as usize)]
    }

    pub fn get_pixel_value(&self, xy: Vector2) -> Vector3 {
        sample_color(xy, &self.image)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Vector3 {
        get_color(x, y, &self.image)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Vector3) {
        set_color(x, y, color, &mut self.image);
    }

    pub fn compute_validity_mask(&mut self) {
        let (w, h) = (self.width(), self.height());
        let mut mask = ImageMask::from_element(h as usize, w as usize, false);
        for &tc in &self.texcoords {
            let bounds = Rectangle::bounding(&tc);
            let (x0, x1) = pixel_range(
                bounds.pos[0],
                bounds.pos[0] + bounds.size[0],
                1.0,
                w,
            );
            let (y0, y1) = pixel_range(
                bounds.pos[1],
                bounds.pos[1] + bounds.size[1],
                1.0,
                h,
            );
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let p = Vector2::new(x as f64, y as f64);
                    if point_triangle_distance(p, tc) <= COVERAGE_RADIUS {
                        mask[(y as usize, x as usize)] = true;
                    }
                }
            }
        }
        self.validity_mask = mask;
    }

    // Adds per face vertex color offsets to the image. Each pixel near the
    // footprint takes the offset of its nearest face (lowest index on ties),
    // interpolated barycentrically and extrapolated outside the face.
    pub fn adjust_colors(&mut self, adjust_values: &[[Vector3; 3]]) {
        assert_eq!(adjust_values.len(), self.faces.len());

        let any_nonzero = adjust_values.iter().flatten().any(|v| *v != Vector3::zeros());
        if any_nonzero {
            let (w, h) = (self.width(), self.height());
            let mut nearest = vec![(f64::INFINITY, usize::MAX); (w * h) as usize];
            let systems: Vec<Option<BarycentricCoordinateSystem>> = self
                .texcoords
                .iter()
                .map(|&tc| BarycentricCoordinateSystem::new(tc))
                .collect();

            for (i, &tc) in self.texcoords.iter().enumerate() {
                if systems[i].is_none() {
                    continue;
                }
                let bounds = Rectangle::bounding(&tc);
                let (x0, x1) = pixel_range(
                    bounds.pos[0],
                    bounds.pos[0] + bounds.size[0],
                    ADJUSTMENT_RADIUS,
                    w,
                );
                let (y0, y1) = pixel_range(
                    bounds.pos[1],
                    bounds.pos[1] + bounds.size[1],
                    ADJUSTMENT_RADIUS,
                    h,
                );
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let p = Vector2::new(x as f64, y as f64);
                        let d = point_triangle_distance(p, tc);
                        let slot = &mut nearest[(y * w + x) as usize];
                        if d <= ADJUSTMENT_RADIUS && d < slot.0 {
                            *slot = (d, i);
                        }
                    }
                }
            }

            for y in 0..h {
                for x in 0..w {
                    let (_, i) = nearest[(y * w + x) as usize];
                    let bcs = match systems.get(i) {
                        Some(Some(bcs)) => bcs,
                        _ => continue,
                    };
                    let u = bcs.infer(Vector2::new(x as f64, y as f64));
                    let [a0, a1, a2] = adjust_values[i];
                    let offset = a0 * u[0] + a1 * u[1] + a2 * u[2];
                    let color = self.get_pixel(x, y) + offset;
                    self.set_pixel(x, y, color);
                }
            }

            for (acc, adj) in self.adjust_values.iter_mut().zip(adjust_values) {
                for k in 0..3 {
                    acc[k] += adj[k];
                }
            }
        }

        self.compute_validity_mask();
    }
}

// Where a vertex lands in one of the patches that use it.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexProjectionInfo {
    pub patch_idx: usize,
    pub projection: Vector2,
    // Faces of the patch around the vertex, sorted.
    pub faces: Vec<usize>,
}

// Per mesh vertex, sorted by patch index.
pub type VertexProjectionInfos = Vec<Vec<VertexProjectionInfo>>;

// Connected components of equally labeled faces, ordered by their smallest
// face; faces within a component are sorted.
pub fn group_faces_by_label(graph: &Graph) -> Vec<(usize, Vec<usize>)> {
    let n = graph.num_nodes();
    let mut union_find = UnionFind::new(n);
    for face_idx in 0..n {
        if let Some(label) = graph.get_label(face_idx) {
            for &other in graph.adj_nodes(face_idx) {
                if other > face_idx && graph.get_label(other) == Some(label) {
                    union_find.union(face_idx, other);
                }
            }
        }
    }

    let mut component_of_root = vec![usize::MAX; n];
    let mut components: Vec<(usize, Vec<usize>)> = vec![];
    for (face_idx, root) in union_find.into_labeling().into_iter().enumerate() {
        let label = match graph.get_label(face_idx) {
            Some(label) => label,
            None => continue,
        };
        if component_of_root[root] == usize::MAX {
            component_of_root[root] = components.len();
            components.push((label, vec![]));
        }
        components[component_of_root[root]].1.push(face_idx);
    }
    components
}

fn build_patch(
    label: usize,
    faces: Vec<usize>,
    mesh: &Mesh,
    view: &TextureView,
) -> TexturePatch {
    // Faces that borrowed their label from a neighbour may project outside
    // the view; they are squashed onto the image border.
    let (w, h) = (view.width() as f64, view.height() as f64);
    let clamp = |p: ProjectedPoint| {
        let x = if p.point[0].is_finite() { p.point[0] } else { 0.0 };
        let y = if p.point[1].is_finite() { p.point[1] } else { 0.0 };
        Vector2::new(x.clamp(0.0, w - 1.0), y.clamp(0.0, h - 1.0))
    };
    let projected: Vec<[Vector2; 3]> = faces
        .iter()
        .map(|&f| mesh.faces[f].map(|v| clamp(view.project(&mesh.vertices[v]))))
        .collect();

    let points: Vec<Vector2> = projected.iter().flatten().cloned().collect();
    let bounds = Rectangle::bounding(&points);
    let border = PATCH_BORDER as f64;
    let min_x = bounds.pos[0].floor() - border;
    let min_y = bounds.pos[1].floor() - border;
    let width = ((bounds.pos[0] + bounds.size[0]).ceil() + border - min_x) as u32 + 1;
    let height = ((bounds.pos[1] + bounds.size[1]).ceil() + border - min_y) as u32 + 1;

    let offset = Vector2::new(min_x, min_y);
    let texcoords = projected
        .iter()
        .map(|tc| tc.map(|p| p - offset))
        .collect();

    let mut image = ColorImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let xy = offset + Vector2::new(x as f64, y as f64);
            set_color(x, y, view.sample_color(xy), &mut image);
        }
    }

    TexturePatch::new(label, faces, texcoords, image)
}

pub fn generate_texture_patches(
    graph: &Graph,
    mesh: &Mesh,
    views: &[TextureView],
) -> (Vec<TexturePatch>, VertexProjectionInfos) {
    let components = group_faces_by_label(graph);
    let patches: Vec<TexturePatch> = components
        .into_par_iter()
        .map(|(label, faces)| build_patch(label, faces, mesh, &views[label]))
        .collect();

    let mut infos: VertexProjectionInfos = vec![vec![]; mesh.vertices.len()];
    for (patch_idx, patch) in patches.iter().enumerate() {
        for (&face_idx, tc) in patch.faces().iter().zip(patch.texcoords()) {
            for (k, &v) in mesh.faces[face_idx].iter().enumerate() {
                match infos[v].last_mut() {
                    Some(info) if info.patch_idx == patch_idx => {
                        info.faces.push(face_idx)
                    }
                    _ => infos[v].push(VertexProjectionInfo {
                        patch_idx,
                        projection: tc[k],
                        faces: vec![face_idx],
                    }),
                }
            }
        }
    }

    let num_unlabeled = graph.num_nodes() - graph.num_labeled();
    info!(
        "Generated {} texture patches ({} faces without texture)",
        patches.len(),
        num_unlabeled
    );
    (patches, infos)
}
