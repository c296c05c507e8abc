use std::io::Write;
use std::path::Path;

use log::info;
use rayon::prelude::*;

use crate::mesh::Mesh;
use crate::texture::*;
use crate::texturing::Settings;
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::store::{Reader, Tag, Writer, WriterParams};
use base::util::fs;

pub const DATA_COSTS_TAG: Tag = *b"SPT1";

// Sparse face-by-view cost table. Rows hold (view, cost) pairs sorted by
// view; a pair exists only when the face is visible in the view.
#[derive(Clone, Debug, PartialEq)]
pub struct DataCosts {
    num_views: usize,
    rows: Vec<Vec<(usize, f32)>>,
}

impl DataCosts {
    pub fn new(num_faces: usize, num_views: usize) -> DataCosts {
        DataCosts {
            num_views,
            rows: vec![vec![]; num_faces],
        }
    }

    pub fn num_faces(&self) -> usize {
        self.rows.len()
    }

    pub fn num_views(&self) -> usize {
        self.num_views
    }

    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn set(&mut self, face_idx: usize, view_idx: usize, cost: f32) {
        assert!(view_idx < self.num_views);
        let row = &mut self.rows[face_idx];
        match row.binary_search_by_key(&view_idx, |&(v, _)| v) {
            Ok(pos) => row[pos].1 = cost,
            Err(pos) => row.insert(pos, (view_idx, cost)),
        }
    }

    pub fn get(&self, face_idx: usize, view_idx: usize) -> Option<f32> {
        let row = &self.rows[face_idx];
        row.binary_search_by_key(&view_idx, |&(v, _)| v)
            .ok()
            .map(|pos| row[pos].1)
    }

    pub fn row(&self, face_idx: usize) -> &[(usize, f32)] {
        &self.rows[face_idx]
    }

    pub fn save(&self, path: &Path, params: &WriterParams) -> Result<()> {
        let file = fs::create_file(path)?;
        let mut writer = Writer::new(file, DATA_COSTS_TAG, params)?;
        self.write_to(&mut writer)?;
        writer
            .into_inner()?
            .flush()
            .res(|| format!("failed to flush file '{}'", path.display()))
    }

    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        writer.write_u64(self.rows.len() as u64)?;
        writer.write_u64(self.num_views as u64)?;
        for row in &self.rows {
            writer.write_u32(row.len() as u32)?;
            for &(view_idx, cost) in row {
                writer.write_u32(view_idx as u32)?;
                writer.write_f32(cost)?;
            }
        }
        Ok(())
    }

    // Loads a table and checks that it belongs to the given mesh and scene.
    pub fn load(path: &Path, num_faces: usize, num_views: usize) -> Result<DataCosts> {
        let file = fs::open_file(path)?;
        let mut reader = Reader::new(file, DATA_COSTS_TAG)?;
        DataCosts::read_from(&mut reader, num_faces, num_views)
    }

    pub fn read_from(
        reader: &mut Reader,
        num_faces: usize,
        num_views: usize,
    ) -> Result<DataCosts> {
        let file_faces = reader.read_u64()? as usize;
        let file_views = reader.read_u64()? as usize;
        if file_faces != num_faces || file_views != num_views {
            return Err(Error::new(
                InconsistentState,
                format!(
                    "wrong data cost file for this mesh/scene combination \
                    (expected {} faces and {} views, found {} and {})",
                    num_faces, num_views, file_faces, file_views
                ),
            ));
        }

        let mut costs = DataCosts::new(num_faces, num_views);
        for face_idx in 0..num_faces {
            let len = reader.read_u32()? as usize;
            if len > num_views {
                return Err(malformed_row(face_idx));
            }
            let mut row: Vec<(usize, f32)> = Vec::with_capacity(len);
            for _ in 0..len {
                let view_idx = reader.read_u32()? as usize;
                let cost = reader.read_f32()?;
                let ascending = row.last().map_or(true, |&(v, _)| v < view_idx);
                if view_idx >= num_views || !ascending || !(cost >= 0.0) {
                    return Err(malformed_row(face_idx));
                }
                row.push((view_idx, cost));
            }
            costs.rows[face_idx] = row;
        }
        Ok(costs)
    }
}

fn malformed_row(face_idx: usize) -> Error {
    Error::new(
        MalformedData,
        format!("malformed data costs for face {}", face_idx),
    )
}

// Unnormalized quality of texturing a face from a view: projected area,
// discounted for oblique angles and for blurry or noisy image regions.
fn face_quality(
    face_idx: usize,
    mesh: &Mesh,
    view: &TextureView,
    projection: &ViewProjection,
    settings: &Settings,
) -> Option<f64> {
    if !projection.is_face_visible(face_idx, mesh, view) {
        return None;
    }

    let [p0, p1, p2] = projection.face_points(mesh.faces[face_idx]);
    let area = 0.5 * orientation(p0, p1, p2).abs();

    let to_camera = (projection.center - mesh.face_centroid(face_idx))
        .try_normalize(f64::EPSILON)?;
    let cos_angle = mesh.face_normal(face_idx).dot(&to_camera).clamp(0.0, 1.0);

    let centroid = (p0 + p1 + p2) / 3.0;
    let mean_gradient = [p0, p1, p2, centroid]
        .iter()
        .map(|&p| view.sample_gradient(p))
        .sum::<f64>()
        / 4.0;

    let quality = area * cos_angle
        / (1.0 + settings.gradient_weight * mean_gradient / 255.0);
    if quality > 0.0 && quality.is_finite() {
        Some(quality)
    } else {
        None
    }
}

pub fn calculate_data_costs(
    mesh: &Mesh,
    views: &[TextureView],
    settings: &Settings,
) -> DataCosts {
    let projections: Vec<ViewProjection> = views
        .par_iter()
        .map(|view| ViewProjection::new(view, mesh))
        .collect();

    let qualities: Vec<Vec<(usize, f64)>> = (0..mesh.faces.len())
        .into_par_iter()
        .map(|face_idx| {
            views
                .iter()
                .zip(&projections)
                .enumerate()
                .filter_map(|(view_idx, (view, projection))| {
                    face_quality(face_idx, mesh, view, projection, settings)
                        .map(|q| (view_idx, q))
                })
                .collect()
        })
        .collect();

    let max_quality = qualities
        .iter()
        .flatten()
        .map(|&(_, q)| q)
        .fold(0.0, f64::max);

    let rows: Vec<Vec<(usize, f32)>> = qualities
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(view_idx, q)| {
                    let cost = (1.0 - q / max_quality).clamp(0.0, 1.0);
                    (view_idx, cost as f32)
                })
                .collect()
        })
        .collect();

    let costs = DataCosts {
        num_views: views.len(),
        rows,
    };
    info!(
        "Computed {} data costs for {} faces and {} views",
        costs.num_entries(),
        costs.num_faces(),
        costs.num_views()
    );
    costs
}
