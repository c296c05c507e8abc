use log::{info, warn};
use rayon::prelude::*;

use crate::mesh::{Mesh, VertexInfos};
use crate::texture::*;

// Weight of keeping adjustments smooth along mesh edges within a patch.
const LAMBDA: f64 = 0.1;
// Keeps the system positive definite.
const EPSILON: f64 = 1e-6;

const CG_MAX_ITERATIONS: usize = 2000;
const CG_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelingReport {
    pub num_unknowns: usize,
    pub num_seam_rows: usize,
    pub iterations: usize,
    pub converged: bool,
    pub discontinuity_before: f64,
    pub discontinuity_after: f64,
}

// Sum of squared color differences between all patch pairs sharing a vertex.
pub fn seam_discontinuity(
    patches: &[TexturePatch],
    infos: &VertexProjectionInfos,
) -> f64 {
    let mut total = 0.0;
    for entries in infos {
        let colors: Vec<Vector3> = entries
            .iter()
            .map(|e| patches[e.patch_idx].get_pixel_value(e.projection))
            .collect();
        for a in 0..colors.len() {
            for b in a + 1..colors.len() {
                total += (colors[a] - colors[b]).norm_squared();
            }
        }
    }
    total
}

// Leaves colors as they are but finalizes the validity masks, as leveling
// would.
pub fn apply_zero_adjustments(patches: &mut [TexturePatch]) {
    patches
        .par_iter_mut()
        .for_each(|p| p.adjust_colors(&vec![[Vector3::zeros(); 3]; p.faces().len()]));
}

// Index of the unknown for each (vertex, patch entry).
fn unknown_offsets(infos: &VertexProjectionInfos) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(infos.len());
    let mut n = 0;
    for entries in infos {
        offsets.push(n);
        n += entries.len();
    }
    (offsets, n)
}

fn build_seam_matrix(infos: &VertexProjectionInfos, offsets: &[usize], n: usize) -> CsrMatrix {
    let num_rows: usize = infos
        .iter()
        .map(|e| e.len() * e.len().saturating_sub(1) / 2)
        .sum();
    let mut coo = CooMatrix::new(num_rows, n);
    let mut row = 0;
    for (v, entries) in infos.iter().enumerate() {
        for a in 0..entries.len() {
            for b in a + 1..entries.len() {
                coo.push(row, offsets[v] + a, 1.0);
                coo.push(row, offsets[v] + b, -1.0);
                row += 1;
            }
        }
    }
    CsrMatrix::from(&coo)
}

// Rows for edges whose two vertices both appear in the same patch, followed
// by a tiny diagonal.
fn build_regularization_matrix(
    infos: &VertexProjectionInfos,
    vertex_infos: &VertexInfos,
    offsets: &[usize],
    n: usize,
) -> CsrMatrix {
    let weight = LAMBDA.sqrt();
    let mut pairs = vec![];
    for (v, entries) in infos.iter().enumerate() {
        for &w in &vertex_infos.neighbouring_vertices[v] {
            if w < v {
                continue;
            }
            for (a, entry) in entries.iter().enumerate() {
                if let Some(b) = infos[w]
                    .iter()
                    .position(|other| other.patch_idx == entry.patch_idx)
                {
                    pairs.push((offsets[v] + a, offsets[w] + b));
                }
            }
        }
    }

    let mut coo = CooMatrix::new(pairs.len() + n, n);
    for (row, &(i, j)) in pairs.iter().enumerate() {
        coo.push(row, i, weight);
        coo.push(row, j, -weight);
    }
    let diagonal = EPSILON.sqrt();
    for i in 0..n {
        coo.push(pairs.len() + i, i, diagonal);
    }
    CsrMatrix::from(&coo)
}

// Finds per (vertex, patch) color offsets g minimizing
// |A (f + g)|^2 + lambda |G g|^2 + epsilon |g|^2, where A takes differences
// across seams and G along edges inside patches, then applies them to the
// patches.
pub fn global_seam_leveling(
    mesh: &Mesh,
    vertex_infos: &VertexInfos,
    infos: &VertexProjectionInfos,
    patches: &mut [TexturePatch],
) -> LevelingReport {
    let discontinuity_before = seam_discontinuity(patches, infos);
    let (offsets, n) = unknown_offsets(infos);

    let a = build_seam_matrix(infos, &offsets, n);
    let num_seam_rows = a.nrows();
    if num_seam_rows == 0 {
        info!("Global seam leveling: no seams to level");
        apply_zero_adjustments(patches);
        return LevelingReport {
            num_unknowns: n,
            num_seam_rows,
            iterations: 0,
            converged: true,
            discontinuity_before,
            discontinuity_after: discontinuity_before,
        };
    }
    let g = build_regularization_matrix(infos, vertex_infos, &offsets, n);
    let at = a.transpose();
    let lhs = &(&at * &a) + &(&g.transpose() * &g);

    let colors: Vec<Vector3> = infos
        .iter()
        .flatten()
        .map(|e| patches[e.patch_idx].get_pixel_value(e.projection))
        .collect();

    let solutions: Vec<CgSolution> = (0..3)
        .into_par_iter()
        .map(|channel| {
            let f = DVector::from_iterator(n, colors.iter().map(|c| c[channel]));
            let rhs = -(&at * (&a * &f));
            conjugate_gradients_solve(
                &lhs,
                &rhs,
                DVector::zeros(n),
                CG_MAX_ITERATIONS,
                CG_TOLERANCE,
            )
        })
        .collect();

    let converged = solutions.iter().all(|s| s.converged);
    let iterations = solutions.iter().map(|s| s.iterations).max().unwrap_or(0);
    if !converged {
        warn!(
            "Global seam leveling did not converge within {} iterations, \
            using the last iterate",
            CG_MAX_ITERATIONS
        );
    }

    let mut adjust_values: Vec<Vec<[Vector3; 3]>> = patches
        .iter()
        .map(|p| vec![[Vector3::zeros(); 3]; p.faces().len()])
        .collect();
    for (v, entries) in infos.iter().enumerate() {
        for (k, entry) in entries.iter().enumerate() {
            let u = offsets[v] + k;
            let offset = Vector3::new(solutions[0].x[u], solutions[1].x[u], solutions[2].x[u]);
            let patch = &patches[entry.patch_idx];
            for &face_idx in &entry.faces {
                let local = match patch.local_face_idx(face_idx) {
                    Some(local) => local,
                    None => continue,
                };
                if let Some(corner) = mesh.faces[face_idx].iter().position(|&w| w == v) {
                    adjust_values[entry.patch_idx][local][corner] = offset;
                }
            }
        }
    }

    patches
        .par_iter_mut()
        .zip(adjust_values.par_iter())
        .for_each(|(patch, values)| patch.adjust_colors(values));

    let discontinuity_after = seam_discontinuity(patches, infos);
    let report = LevelingReport {
        num_unknowns: n,
        num_seam_rows,
        iterations,
        converged,
        discontinuity_before,
        discontinuity_after,
    };
    info!(
        "Global seam leveling: {} unknowns, {} CG iterations, seam \
        discontinuity {:.3} -> {:.3}",
        report.num_unknowns,
        report.iterations,
        report.discontinuity_before,
        report.discontinuity_after
    );
    report
}
