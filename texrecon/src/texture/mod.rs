mod adjacency;
mod conjugate_gradients;
mod data_costs;
mod global_seam_leveling;
mod local_seam_leveling;
mod max_flow;
mod model;
mod texture_atlas;
mod texture_patch;
mod texture_view;
mod view_selection;

use std::ops::{Add, Mul};

use image::{ImageBuffer, Luma, Rgb, Rgb32FImage, RgbImage};
use nalgebra::{Dynamic, OMatrix};

pub use crate::mesh::{Point3, Vector3};
pub use crate::texture::{
    adjacency::*, conjugate_gradients::*, data_costs::*,
    global_seam_leveling::*, local_seam_leveling::*, max_flow::*, model::*,
    texture_atlas::*, texture_patch::*, texture_view::*, view_selection::*,
};

pub type Vector2 = nalgebra::Vector2<f64>;
pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;

// Indexed as (row, column), i.e. (y, x).
pub type ImageMask = OMatrix<bool, Dynamic, Dynamic>;

// Float RGB with channel values on the 0..255 scale.
pub type ColorImage = Rgb32FImage;
pub type GrayImage32 = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedPoint {
    pub point: Vector2,
    pub depth: f64,
}

// Pixel centers sit at integer coordinates; points beyond the border are
// clamped to it. Zero sized images only ever fetch (0, 0).
pub fn bilinear<T, F>(xy: Vector2, (width, height): (u32, u32), fetch: F) -> T
where
    T: Add<Output = T> + Mul<f64, Output = T>,
    F: Fn(u32, u32) -> T,
{
    let (max_x, max_y) = (width.saturating_sub(1), height.saturating_sub(1));
    let x = xy[0].clamp(0.0, max_x as f64);
    let y = xy[1].clamp(0.0, max_y as f64);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));
    let (dx, dy) = (x - x0 as f64, y - y0 as f64);
    let s0 = fetch(x0, y0) * (1.0 - dx) + fetch(x1, y0) * dx;
    let s1 = fetch(x0, y1) * (1.0 - dx) + fetch(x1, y1) * dx;
    s0 * (1.0 - dy) + s1 * dy
}

pub fn get_pixel_as_vector3(x: u32, y: u32, image: &RgbImage) -> Vector3 {
    let p = image.get_pixel(x, y);
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

pub fn set_pixel_as_vector3(x: u32, y: u32, color: Vector3, image: &mut RgbImage) {
    let [r, g, b]: [u8; 3] =
        color.map(|c| c.clamp(0.0, 255.0).round() as u8).into();
    image.put_pixel(x, y, Rgb([r, g, b]));
}

pub fn get_color(x: u32, y: u32, image: &ColorImage) -> Vector3 {
    let p = image.get_pixel(x, y);
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

pub fn set_color(x: u32, y: u32, color: Vector3, image: &mut ColorImage) {
    image.put_pixel(x, y, Rgb([color[0] as f32, color[1] as f32, color[2] as f32]));
}

pub fn sample_pixel(xy: Vector2, image: &RgbImage) -> Vector3 {
    bilinear(xy, image.dimensions(), |x, y| get_pixel_as_vector3(x, y, image))
}

pub fn sample_color(xy: Vector2, image: &ColorImage) -> Vector3 {
    bilinear(xy, image.dimensions(), |x, y| get_color(x, y, image))
}

pub struct BarycentricCoordinateSystem {
    vs: [Vector2; 3],
    inverse: Matrix2,
}

impl BarycentricCoordinateSystem {
    pub fn new(vs: [Vector2; 3]) -> Option<Self> {
        let m22 = Matrix2::from_columns(&[vs[1] - vs[0], vs[2] - vs[0]]);
        let inverse = m22.try_inverse()?;
        if inverse.iter().all(|c| c.is_finite()) {
            Some(Self { vs, inverse })
        } else {
            None // Degenerate triangle.
        }
    }

    // The functions 'infer' and 'apply' are mutually inverse. Points outside
    // the triangle get negative coordinates, which extrapolates linearly.

    pub fn infer(&self, v: Vector2) -> Vector3 {
        let l = self.inverse * (v - self.vs[0]);
        Vector3::new(1.0 - l[0] - l[1], l[0], l[1])
    }

    // Assuming the input 'u' sums to 1.0.
    pub fn apply(&self, u: Vector3) -> Vector2 {
        u[0] * self.vs[0] + u[1] * self.vs[1] + u[2] * self.vs[2]
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rectangle<T> {
    pub pos: [T; 2],
    pub size: [T; 2],
}

impl Rectangle<f64> {
    pub fn bounding(points: &[Vector2]) -> Rectangle<f64> {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for p in points {
            for k in 0..2 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Rectangle {
            pos: min,
            size: [max[0] - min[0], max[1] - min[1]],
        }
    }
}

impl Rectangle<u32> {
    pub fn overlaps(&self, other: &Rectangle<u32>) -> bool {
        (0..2).all(|k| {
            self.pos[k] < other.pos[k] + other.size[k]
                && other.pos[k] < self.pos[k] + self.size[k]
        })
    }
}

pub fn orientation(v0: Vector2, v1: Vector2, v2: Vector2) -> f64 {
    (v1[0] * v2[1] - v1[1] * v2[0])
        + (v2[0] * v0[1] - v2[1] * v0[0])
        + (v0[0] * v1[1] - v0[1] * v1[0])
}

// Strict containment, for either winding of the triangle.
pub fn containment_check(v: Vector2, f: [Vector2; 3]) -> bool {
    let [v0, v1, v2] = f;
    if v == v0 || v == v1 || v == v2 {
        return false;
    }
    let s = [
        orientation(v, v1, v2),
        orientation(v0, v, v2),
        orientation(v0, v1, v),
    ];
    s.iter().all(|&s| s > 0.0) || s.iter().all(|&s| s < 0.0)
}

fn point_segment_distance(p: Vector2, a: Vector2, b: Vector2) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + t * ab)).norm()
}

pub fn point_triangle_distance(p: Vector2, f: [Vector2; 3]) -> f64 {
    let [v0, v1, v2] = f;
    let s = [
        orientation(p, v1, v2),
        orientation(v0, p, v2),
        orientation(v0, v1, p),
    ];
    if s.iter().all(|&s| s >= 0.0) || s.iter().all(|&s| s <= 0.0) {
        return 0.0;
    }
    point_segment_distance(p, v0, v1)
        .min(point_segment_distance(p, v1, v2))
        .min(point_segment_distance(p, v2, v0))
}

pub fn ordered(e: [usize; 2]) -> [usize; 2] {
    if e[0] < e[1] {
        e
    } else {
        [e[1], e[0]]
    }
}

// Pixel range [from, to] of a float interval grown by 'margin', clipped to
// [0, limit).
pub fn pixel_range(from: f64, to: f64, margin: f64, limit: u32) -> (u32, u32) {
    let lo = (from - margin).floor().max(0.0);
    let hi = (to + margin).ceil().min(limit as f64 - 1.0);
    if hi < lo {
        (1, 0)
    } else {
        (lo as u32, hi as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::assert_eq_f64;

    #[test]
    fn test_bilinear_pixel_centers() {
        let mut image = RgbImage::new(2, 2);
        set_pixel_as_vector3(0, 0, Vector3::new(0.0, 0.0, 0.0), &mut image);
        set_pixel_as_vector3(1, 0, Vector3::new(100.0, 0.0, 0.0), &mut image);
        set_pixel_as_vector3(0, 1, Vector3::new(0.0, 200.0, 0.0), &mut image);
        set_pixel_as_vector3(1, 1, Vector3::new(100.0, 200.0, 0.0), &mut image);

        let c = sample_pixel(Vector2::new(0.5, 0.5), &image);
        assert_eq_f64!(c[0], 50.0, 1e-9);
        assert_eq_f64!(c[1], 100.0, 1e-9);

        let c = sample_pixel(Vector2::new(1.0, 0.0), &image);
        assert_eq_f64!(c[0], 100.0, 1e-9);

        // Clamped outside of the image.
        let c = sample_pixel(Vector2::new(-3.0, 7.0), &image);
        assert_eq_f64!(c[1], 200.0, 1e-9);
        assert_eq_f64!(c[0], 0.0, 1e-9);
    }

    #[test]
    fn test_bilinear_degenerate_sizes() {
        let fetch = |x: u32, y: u32| Vector2::new(x as f64, y as f64);
        let s = bilinear(Vector2::new(3.5, -2.0), (0, 0), fetch);
        assert_eq!(s, Vector2::zeros());

        let s = bilinear(Vector2::new(0.7, 0.25), (1, 4), fetch);
        assert_eq_f64!(s[0], 0.0, 1e-12);
        assert_eq_f64!(s[1], 0.25, 1e-12);
    }

    #[test]
    fn test_barycentric_coordinate_system() {
        let vs = [
            Vector2::new(1.0, 1.0),
            Vector2::new(4.0, 1.0),
            Vector2::new(1.0, 5.0),
        ];
        let bcs = BarycentricCoordinateSystem::new(vs).unwrap();
        let u = bcs.infer(Vector2::new(2.0, 2.0));
        assert_eq_f64!(u.sum(), 1.0, 1e-12);
        let v = bcs.apply(u);
        assert_eq_f64!(v[0], 2.0, 1e-12);
        assert_eq_f64!(v[1], 2.0, 1e-12);

        // Extrapolation beyond the first edge.
        let u = bcs.infer(Vector2::new(2.0, 0.0));
        assert!(u[2] < 0.0);

        let collinear = [Vector2::zeros(), Vector2::new(1.0, 1.0), Vector2::new(2.0, 2.0)];
        assert!(BarycentricCoordinateSystem::new(collinear).is_none());
    }

    #[test]
    fn test_point_triangle_distance() {
        let f = [Vector2::zeros(), Vector2::new(0.0, 4.0), Vector2::new(4.0, 0.0)];
        assert_eq!(point_triangle_distance(Vector2::new(1.0, 1.0), f), 0.0);
        assert_eq_f64!(point_triangle_distance(Vector2::new(-1.0, 2.0), f), 1.0, 1e-12);
        assert_eq_f64!(
            point_triangle_distance(Vector2::new(3.0, 3.0), f),
            2.0f64.sqrt(),
            1e-12
        );
        assert!(containment_check(Vector2::new(1.0, 1.0), f));
        assert!(!containment_check(Vector2::new(0.0, 2.0), f));
    }

    #[test]
    fn test_pixel_range() {
        assert_eq!(pixel_range(1.2, 3.7, 1.0, 10), (0, 5));
        assert_eq!(pixel_range(8.2, 12.0, 0.0, 10), (8, 9));
        let (lo, hi) = pixel_range(20.0, 30.0, 0.0, 10);
        assert!(lo > hi);
    }
}
