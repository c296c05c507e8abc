use std::collections::{HashMap, VecDeque};

use derive_more::{Add, AddAssign};
use log::{info, warn};
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use crate::mesh::Mesh;
use crate::texture::*;

// Distance in pixels over which a seam correction fades out.
const BLEND_BAND: u32 = 20;

const CG_MAX_ITERATIONS: usize = 1000;
const CG_TOLERANCE: f64 = 1e-6;

// Pixel (x, y) of a patch.
type PixelKey = (usize, u32, u32);

#[derive(Add, AddAssign, Clone, Copy, Debug)]
struct ColorSum {
    color: Vector3,
    count: usize,
}

impl ColorSum {
    fn zero() -> ColorSum {
        ColorSum {
            color: Vector3::zeros(),
            count: 0,
        }
    }

    fn single(color: Vector3) -> ColorSum {
        ColorSum { color, count: 1 }
    }

    fn mean(&self) -> Vector3 {
        self.color / self.count as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalLevelingReport {
    pub num_seam_pixels: usize,
    pub num_groups: usize,
    pub num_adjusted_patches: usize,
    pub max_offset: f64,
    pub converged: bool,
}

#[derive(Clone, Copy, Debug)]
struct PatchBlend {
    adjusted: bool,
    converged: bool,
    max_offset: f64,
}

fn nearest_pixel(p: Vector2) -> (u32, u32) {
    (p[0].round().max(0.0) as u32, p[1].round().max(0.0) as u32)
}

// Pairs of pixels that show the same surface point on both sides of a seam.
fn collect_seam_links(
    graph: &Graph,
    mesh: &Mesh,
    infos: &VertexProjectionInfos,
    patches: &[TexturePatch],
) -> Vec<(PixelKey, PixelKey)> {
    let mut face_patch = vec![None; graph.num_nodes()];
    for (patch_idx, patch) in patches.iter().enumerate() {
        for &face_idx in patch.faces() {
            face_patch[face_idx] = Some(patch_idx);
        }
    }
    let projection = |v: usize, patch_idx: usize| {
        infos[v]
            .iter()
            .find(|e| e.patch_idx == patch_idx)
            .map(|e| e.projection)
    };

    let mut links = vec![];
    for f in 0..graph.num_nodes() {
        let pf = match face_patch[f] {
            Some(p) => p,
            None => continue,
        };
        for &g in graph.adj_nodes(f) {
            let pg = match face_patch[g] {
                Some(p) if g > f && p != pf => p,
                _ => continue,
            };
            let shared: Vec<usize> = mesh.faces[f]
                .iter()
                .filter(|&&v| mesh.faces[g].contains(&v))
                .cloned()
                .collect();
            if shared.len() < 2 {
                continue;
            }
            let ends = (
                projection(shared[0], pf),
                projection(shared[1], pf),
                projection(shared[0], pg),
                projection(shared[1], pg),
            );
            let (a0, a1, b0, b1) = match ends {
                (Some(a0), Some(a1), Some(b0), Some(b1)) => (a0, a1, b0, b1),
                _ => continue,
            };

            let len = (a1 - a0).norm().max((b1 - b0).norm());
            let steps = len.ceil().max(1.0) as usize;
            for i in 0..=steps {
                let t = i as f64 / steps as f64;
                let (xa, ya) = nearest_pixel(a0 + (a1 - a0) * t);
                let (xb, yb) = nearest_pixel(b0 + (b1 - b0) * t);
                if patches[pf].is_valid_pixel(xa, ya) && patches[pg].is_valid_pixel(xb, yb) {
                    links.push(((pf, xa, ya), (pg, xb, yb)));
                }
            }
        }
    }
    links
}

fn pixel_id(
    key: PixelKey,
    ids: &mut HashMap<PixelKey, usize>,
    keys: &mut Vec<PixelKey>,
) -> usize {
    *ids.entry(key).or_insert_with(|| {
        keys.push(key);
        keys.len() - 1
    })
}

fn neighbours(x: u32, y: u32, w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let (x, y) = (x as i64, y as i64);
    [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
        .into_iter()
        .filter(move |&(x, y)| x >= 0 && y >= 0 && x < w as i64 && y < h as i64)
        .map(|(x, y)| (x as u32, y as u32))
}

// Sets the seam pixels of a patch to their targets and spreads the change
// into the nearby valid pixels as a harmonic offset field. Valid region
// boundary pixels and pixels beyond the blend band keep their colors.
fn blend_patch(patch: &mut TexturePatch, seam: &[(u32, u32, Vector3)]) -> PatchBlend {
    let offsets: Vec<Vector3> = seam
        .iter()
        .map(|&(x, y, target)| target - patch.get_pixel(x, y))
        .collect();
    let max_offset = offsets.iter().map(|d| d.amax()).fold(0.0, f64::max);
    if max_offset == 0.0 {
        return PatchBlend {
            adjusted: false,
            converged: true,
            max_offset,
        };
    }

    let (w, h) = (patch.width(), patch.height());
    let idx = |x: u32, y: u32| (y * w + x) as usize;
    let mut fixed_offset = vec![Vector3::zeros(); (w * h) as usize];
    let mut dist = vec![u32::MAX; (w * h) as usize];
    let mut queue = VecDeque::new();
    for (&(x, y, _), &d) in seam.iter().zip(&offsets) {
        fixed_offset[idx(x, y)] = d;
        dist[idx(x, y)] = 0;
        queue.push_back((x, y));
    }
    while let Some((x, y)) = queue.pop_front() {
        let next = dist[idx(x, y)] + 1;
        if next > BLEND_BAND {
            continue;
        }
        for (nx, ny) in neighbours(x, y, w, h) {
            if patch.is_valid_pixel(nx, ny) && dist[idx(nx, ny)] == u32::MAX {
                dist[idx(nx, ny)] = next;
                queue.push_back((nx, ny));
            }
        }
    }

    let is_boundary = |x: u32, y: u32| {
        x == 0
            || y == 0
            || x == w - 1
            || y == h - 1
            || neighbours(x, y, w, h).any(|(nx, ny)| !patch.is_valid_pixel(nx, ny))
    };
    let mut unknown_idx = vec![None; (w * h) as usize];
    let mut unknowns = vec![];
    for y in 0..h {
        for x in 0..w {
            let d = dist[idx(x, y)];
            if d > 0 && d != u32::MAX && !is_boundary(x, y) {
                unknown_idx[idx(x, y)] = Some(unknowns.len());
                unknowns.push((x, y));
            }
        }
    }

    let n = unknowns.len();
    let mut converged = true;
    let mut solved = vec![Vector3::zeros(); n];
    if n > 0 {
        let mut coo = CooMatrix::new(n, n);
        let mut rhs = vec![Vector3::zeros(); n];
        for (i, &(x, y)) in unknowns.iter().enumerate() {
            coo.push(i, i, 4.0);
            for (nx, ny) in neighbours(x, y, w, h) {
                match unknown_idx[idx(nx, ny)] {
                    Some(j) => coo.push(i, j, -1.0),
                    None => rhs[i] += fixed_offset[idx(nx, ny)],
                }
            }
        }
        let a = CsrMatrix::from(&coo);
        for channel in 0..3 {
            let b = DVector::from_iterator(n, rhs.iter().map(|r| r[channel]));
            let solution = conjugate_gradients_solve(
                &a,
                &b,
                DVector::zeros(n),
                CG_MAX_ITERATIONS,
                CG_TOLERANCE,
            );
            converged &= solution.converged;
            for (s, x) in solved.iter_mut().zip(solution.x.iter()) {
                s[channel] = *x;
            }
        }
    }

    for &(x, y, target) in seam {
        patch.set_pixel(x, y, target);
    }
    for (&(x, y), d) in unknowns.iter().zip(&solved) {
        let color = patch.get_pixel(x, y) + d;
        patch.set_pixel(x, y, color);
    }

    PatchBlend {
        adjusted: true,
        converged,
        max_offset,
    }
}

// Removes the color steps that remain along seams after global leveling.
// Pixels facing each other across a seam are grouped and pulled to the
// group mean; each patch then blends the change into its interior.
pub fn local_seam_leveling(
    graph: &Graph,
    mesh: &Mesh,
    infos: &VertexProjectionInfos,
    patches: &mut [TexturePatch],
) -> LocalLevelingReport {
    let links = collect_seam_links(graph, mesh, infos, patches);

    let mut ids = HashMap::new();
    let mut keys = vec![];
    let pairs: Vec<(usize, usize)> = links
        .iter()
        .map(|&(a, b)| {
            let a = pixel_id(a, &mut ids, &mut keys);
            let b = pixel_id(b, &mut ids, &mut keys);
            (a, b)
        })
        .collect();

    let mut union_find = UnionFind::new(keys.len());
    for &(a, b) in &pairs {
        union_find.union(a, b);
    }
    let roots = union_find.into_labeling();

    let mut sums = vec![ColorSum::zero(); keys.len()];
    for (&(patch_idx, x, y), &root) in keys.iter().zip(&roots) {
        sums[root] += ColorSum::single(patches[patch_idx].get_pixel(x, y));
    }
    let num_groups = roots.iter().enumerate().filter(|&(i, &r)| i == r).count();

    let mut seams: Vec<Vec<(u32, u32, Vector3)>> = vec![vec![]; patches.len()];
    for (&(patch_idx, x, y), &root) in keys.iter().zip(&roots) {
        seams[patch_idx].push((x, y, sums[root].mean()));
    }

    let blends: Vec<PatchBlend> = patches
        .par_iter_mut()
        .zip(seams.par_iter())
        .map(|(patch, seam)| blend_patch(patch, seam))
        .collect();

    let report = LocalLevelingReport {
        num_seam_pixels: keys.len(),
        num_groups,
        num_adjusted_patches: blends.iter().filter(|b| b.adjusted).count(),
        max_offset: blends.iter().map(|b| b.max_offset).fold(0.0, f64::max),
        converged: blends.iter().all(|b| b.converged),
    };
    if !report.converged {
        warn!(
            "Local seam leveling did not converge within {} iterations for \
            some patches",
            CG_MAX_ITERATIONS
        );
    }
    info!(
        "Local seam leveling: {} seam pixels in {} groups, {} patches \
        adjusted (max offset {:.3})",
        report.num_seam_pixels,
        report.num_groups,
        report.num_adjusted_patches,
        report.max_offset
    );
    report
}
