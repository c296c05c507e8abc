use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::texture::*;
use crate::texturing::Settings;
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::store::{Reader, Tag, Writer, WriterParams};
use base::util::fs;

pub const LABELING_TAG: Tag = *b"VEC1";

// Minimal energy decrease for a move to count as an improvement.
const ENERGY_EPS: f64 = 1e-9;

// What to do with faces that no view sees.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenFaces {
    // Borrow the label of the cheapest labeled neighbour, spreading outwards.
    Neighbourhood,
    // Keep the invalid label; such faces end up untextured.
    Leave,
}

impl FromStr for HiddenFaces {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "neighbourhood" => Ok(HiddenFaces::Neighbourhood),
            "leave" => Ok(HiddenFaces::Leave),
            _ => Err(Error::new(
                MalformedData,
                "unknown hidden face policy (can be 'neighbourhood' or 'leave')"
                    .to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionStats {
    pub initial_energy: f64,
    pub energy: f64,
    pub passes: usize,
    pub num_unseen: usize,
    pub num_filled: usize,
}

pub fn compute_energy(
    labels: &[Option<usize>],
    data_costs: &DataCosts,
    graph: &Graph,
    smoothness: f64,
) -> f64 {
    let mut energy = 0.0;
    for (face_idx, &label) in labels.iter().enumerate() {
        let label = match label {
            Some(l) => l,
            None => continue,
        };
        if let Some(cost) = data_costs.get(face_idx, label) {
            energy += cost as f64;
        } else {
            continue;
        }
        for &other in graph.adj_nodes(face_idx) {
            if other > face_idx && !data_costs.row(other).is_empty() {
                if let Some(other_label) = labels[other] {
                    if other_label != label {
                        energy += smoothness;
                    }
                }
            }
        }
    }
    energy
}

fn initial_labels(data_costs: &DataCosts) -> Vec<Option<usize>> {
    (0..data_costs.num_faces())
        .map(|face_idx| {
            let mut best: Option<(usize, f32)> = None;
            for &(view_idx, cost) in data_costs.row(face_idx) {
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((view_idx, cost));
                }
            }
            best.map(|(view_idx, _)| view_idx)
        })
        .collect()
}

// Best alpha-expansion move: every face that sees 'alpha' may switch to it,
// all other faces keep their label. Returns the new labeling when at least
// one face switches.
fn expansion_move(
    alpha: usize,
    labels: &[Option<usize>],
    data_costs: &DataCosts,
    graph: &Graph,
    smoothness: f64,
) -> Option<Vec<Option<usize>>> {
    let mut node_of = vec![None; labels.len()];
    let mut free = vec![];
    for (face_idx, &label) in labels.iter().enumerate() {
        if let Some(label) = label {
            if label != alpha && data_costs.get(face_idx, alpha).is_some() {
                node_of[face_idx] = Some(free.len());
                free.push(face_idx);
            }
        }
    }
    if free.is_empty() {
        return None;
    }

    // Unary costs of keeping the current label (0) or taking alpha (1).
    let mut keep_cost = vec![0.0; free.len()];
    let mut switch_cost = vec![0.0; free.len()];
    let mut flow_graph = FlowGraph::new(free.len());

    for (i, &face_idx) in free.iter().enumerate() {
        let label = labels[face_idx]?;
        keep_cost[i] += data_costs.get(face_idx, label)? as f64;
        switch_cost[i] += data_costs.get(face_idx, alpha)? as f64;

        for &other in graph.adj_nodes(face_idx) {
            if data_costs.row(other).is_empty() {
                continue;
            }
            let other_label = match labels[other] {
                Some(l) => l,
                None => continue,
            };
            match node_of[other] {
                None => {
                    if other_label != label {
                        keep_cost[i] += smoothness;
                    }
                    if other_label != alpha {
                        switch_cost[i] += smoothness;
                    }
                }
                Some(j) if other > face_idx => {
                    // E(0,0) = a, E(0,1) = b, E(1,0) = c, E(1,1) = 0.
                    let a = if label != other_label { smoothness } else { 0.0 };
                    let (b, c) = (smoothness, smoothness);
                    switch_cost[i] += c - a;
                    switch_cost[j] -= c;
                    flow_graph.add_edge(i, j, b + c - a, 0.0);
                }
                Some(_) => {}
            }
        }
    }

    for i in 0..free.len() {
        let m = keep_cost[i].min(switch_cost[i]);
        flow_graph.add_terminal_weights(i, switch_cost[i] - m, keep_cost[i] - m);
    }
    flow_graph.max_flow();

    // Faces without a strict preference keep their label.
    let switches = flow_graph.sink_segment();
    let mut new_labels = labels.to_vec();
    let mut changed = false;
    for (i, &face_idx) in free.iter().enumerate() {
        if switches[i] {
            new_labels[face_idx] = Some(alpha);
            changed = true;
        }
    }
    if changed {
        Some(new_labels)
    } else {
        None
    }
}

// Gives unseen faces the label of their cheapest labeled neighbour, layer by
// layer. Returns the number of faces labeled this way.
fn fill_hidden_faces(
    labels: &mut [Option<usize>],
    data_costs: &DataCosts,
    graph: &Graph,
) -> usize {
    let mut num_filled = 0;
    loop {
        let mut layer = vec![];
        for face_idx in 0..labels.len() {
            if labels[face_idx].is_some() {
                continue;
            }
            let mut best: Option<(f64, usize)> = None;
            for &other in graph.adj_nodes(face_idx) {
                if let Some(label) = labels[other] {
                    let cost = data_costs
                        .get(other, label)
                        .map_or(f64::INFINITY, |c| c as f64);
                    if best.map_or(true, |b| (cost, label) < b) {
                        best = Some((cost, label));
                    }
                }
            }
            if let Some((_, label)) = best {
                layer.push((face_idx, label));
            }
        }
        if layer.is_empty() {
            return num_filled;
        }
        num_filled += layer.len();
        for (face_idx, label) in layer {
            labels[face_idx] = Some(label);
        }
    }
}

// Chooses a view for every face by minimizing data costs plus a Potts
// smoothness term with alpha-expansion. Labels are written to the graph.
pub fn view_selection(
    data_costs: &DataCosts,
    graph: &mut Graph,
    settings: &Settings,
) -> Result<SelectionStats> {
    if data_costs.num_faces() != graph.num_nodes() {
        return Err(Error::new(
            InconsistentState,
            format!(
                "data costs cover {} faces, but the mesh has {}",
                data_costs.num_faces(),
                graph.num_nodes()
            ),
        ));
    }

    let smoothness = settings.smoothness;
    let mut labels = initial_labels(data_costs);
    let initial_energy = compute_energy(&labels, data_costs, graph, smoothness);
    let mut energy = initial_energy;
    let mut passes = 0;

    if smoothness > 0.0 {
        while passes < settings.max_passes {
            passes += 1;
            let mut improved = false;
            for alpha in 0..data_costs.num_views() {
                let candidate = match expansion_move(
                    alpha, &labels, data_costs, graph, smoothness,
                ) {
                    Some(c) => c,
                    None => continue,
                };
                let candidate_energy =
                    compute_energy(&candidate, data_costs, graph, smoothness);
                if candidate_energy + ENERGY_EPS < energy {
                    labels = candidate;
                    energy = candidate_energy;
                    improved = true;
                }
            }
            debug!("View selection pass {}: energy {:.6}", passes, energy);
            if !improved {
                break;
            }
        }
    }

    let num_unseen = labels.iter().filter(|l| l.is_none()).count();
    let num_filled = match settings.hidden_faces {
        HiddenFaces::Neighbourhood => {
            fill_hidden_faces(&mut labels, data_costs, graph)
        }
        HiddenFaces::Leave => 0,
    };

    for (face_idx, &label) in labels.iter().enumerate() {
        graph.set_label(face_idx, label);
    }

    let stats = SelectionStats {
        initial_energy,
        energy,
        passes,
        num_unseen,
        num_filled,
    };
    info!(
        "View selection: energy {:.3} -> {:.3} in {} passes, {} unseen faces \
        ({} labeled from neighbours)",
        stats.initial_energy,
        stats.energy,
        stats.passes,
        stats.num_unseen,
        stats.num_filled
    );
    Ok(stats)
}

pub fn load_labeling(path: &Path) -> Result<Vec<u64>> {
    let file = fs::open_file(path)?;
    let mut reader = Reader::new(file, LABELING_TAG)?;
    read_labeling(&mut reader)
}

pub fn read_labeling(reader: &mut Reader) -> Result<Vec<u64>> {
    let len = reader.read_u64()?;
    let mut labels = vec![];
    for _ in 0..len {
        labels.push(reader.read_u64()?);
    }
    Ok(labels)
}

pub fn save_labeling(path: &Path, graph: &Graph, params: &WriterParams) -> Result<()> {
    let file = fs::create_file(path)?;
    let mut writer = Writer::new(file, LABELING_TAG, params)?;
    write_labeling(&mut writer, graph)?;
    writer
        .into_inner()?
        .flush()
        .res(|| format!("failed to flush file '{}'", path.display()))
}

// Stored as 0 for the invalid label and k + 1 for view k.
pub fn write_labeling<W: Write>(writer: &mut Writer<W>, graph: &Graph) -> Result<()> {
    writer.write_u64(graph.num_nodes() as u64)?;
    for &label in graph.labels() {
        writer.write_u64(label.map_or(0, |l| l as u64 + 1))?;
    }
    Ok(())
}

// Validates the whole labeling before touching the graph.
pub fn apply_labeling(labels: &[u64], graph: &mut Graph, num_views: usize) -> Result<()> {
    if labels.len() != graph.num_nodes() {
        return Err(Error::new(
            InconsistentState,
            format!(
                "wrong labeling file for this mesh/scene combination \
                (expected {} labels, found {})",
                graph.num_nodes(),
                labels.len()
            ),
        ));
    }
    if let Some((face_idx, &label)) = labels
        .iter()
        .enumerate()
        .find(|&(_, &l)| l > num_views as u64)
    {
        return Err(Error::new(
            InconsistentState,
            format!(
                "wrong labeling file for this mesh/scene combination \
                (label {} of face {} exceeds {} views)",
                label, face_idx, num_views
            ),
        ));
    }

    for (face_idx, &label) in labels.iter().enumerate() {
        graph.set_label(face_idx, label.checked_sub(1).map(|l| l as usize));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::mesh::VertexInfos;
    use crate::test_util::unit_cube;
    use base::store::Compression;
    use base::util::test::temp_path;

    fn cube_graph() -> Graph {
        let mesh = unit_cube();
        Graph::build(&mesh, &VertexInfos::new(&mesh))
    }

    fn settings(smoothness: f64) -> Settings {
        Settings {
            smoothness,
            ..Settings::default()
        }
    }

    fn random_costs(rng: &mut StdRng, num_faces: usize, num_views: usize) -> DataCosts {
        let mut costs = DataCosts::new(num_faces, num_views);
        for face_idx in 0..num_faces {
            for view_idx in 0..num_views {
                if rng.gen_bool(0.6) {
                    costs.set(face_idx, view_idx, rng.gen_range(0.0..1.0));
                }
            }
        }
        costs
    }

    #[test]
    fn test_zero_smoothness_picks_cheapest_view() {
        let mut rng = StdRng::seed_from_u64(7);
        let costs = random_costs(&mut rng, 12, 4);
        let mut graph = cube_graph();
        view_selection(&costs, &mut graph, &settings(0.0)).unwrap();

        for face_idx in 0..12 {
            let row = costs.row(face_idx);
            match graph.get_label(face_idx) {
                Some(label) if !row.is_empty() => {
                    let cost = costs.get(face_idx, label).unwrap();
                    assert!(row.iter().all(|&(_, c)| cost <= c));
                }
                Some(_) => {} // Filled from a neighbour.
                None => assert!(row.is_empty()),
            }
        }
    }

    #[test]
    fn test_high_smoothness_uniform_labeling() {
        // All faces see views 0 and 1; view 1 is cheaper for only two faces.
        let mut costs = DataCosts::new(12, 2);
        for face_idx in 0..12 {
            costs.set(face_idx, 0, 0.2);
            costs.set(face_idx, 1, if face_idx < 2 { 0.0 } else { 0.9 });
        }

        let mut graph = cube_graph();
        view_selection(&costs, &mut graph, &settings(0.0)).unwrap();
        assert_eq!(graph.get_label(0), Some(1));
        assert_eq!(graph.get_label(5), Some(0));

        let mut graph = cube_graph();
        let stats = view_selection(&costs, &mut graph, &settings(10.0)).unwrap();
        assert!(graph.labels().iter().all(|&l| l == Some(0)));
        assert!(stats.energy < stats.initial_energy);
    }

    #[test]
    fn test_energy_never_increases_and_labels_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            let costs = random_costs(&mut rng, 12, 5);
            let mut graph = cube_graph();
            let stats = view_selection(&costs, &mut graph, &settings(0.5)).unwrap();
            assert!(stats.energy <= stats.initial_energy + 1e-12);

            for face_idx in 0..12 {
                if let Some(label) = graph.get_label(face_idx) {
                    assert!(label < 5);
                    // Seen faces always carry a view that sees them.
                    if !costs.row(face_idx).is_empty() {
                        assert!(costs.get(face_idx, label).is_some());
                    }
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let costs = random_costs(&mut rng, 12, 6);
        let mut g1 = cube_graph();
        let mut g2 = cube_graph();
        view_selection(&costs, &mut g1, &settings(0.3)).unwrap();
        view_selection(&costs, &mut g2, &settings(0.3)).unwrap();
        assert_eq!(g1.labels(), g2.labels());
    }

    #[test]
    fn test_hidden_faces() {
        // Only faces 0 and 1 are seen.
        let mut costs = DataCosts::new(12, 3);
        costs.set(0, 2, 0.1);
        costs.set(1, 1, 0.4);

        let mut graph = cube_graph();
        let leave = Settings {
            hidden_faces: HiddenFaces::Leave,
            ..settings(0.0)
        };
        let stats = view_selection(&costs, &mut graph, &leave).unwrap();
        assert_eq!(stats.num_unseen, 10);
        assert_eq!(stats.num_filled, 0);
        assert_eq!(graph.num_labeled(), 2);

        let mut graph = cube_graph();
        let stats = view_selection(&costs, &mut graph, &settings(0.0)).unwrap();
        assert_eq!(stats.num_filled, 10);
        assert_eq!(graph.num_labeled(), 12);
        assert_eq!(graph.get_label(0), Some(2));
        assert_eq!(graph.get_label(1), Some(1));
    }

    #[test]
    fn test_mismatched_costs() {
        let costs = DataCosts::new(5, 2);
        let mut graph = cube_graph();
        let err = view_selection(&costs, &mut graph, &settings(1.0)).unwrap_err();
        assert_eq!(err.kind, InconsistentState);
    }

    #[test]
    fn test_apply_labeling() {
        let mut graph = Graph::new(3);
        apply_labeling(&[0, 1, 4], &mut graph, 4).unwrap();
        assert_eq!(graph.labels(), &[None, Some(0), Some(3)]);

        let err = apply_labeling(&[0, 1], &mut graph, 4).unwrap_err();
        assert_eq!(err.kind, InconsistentState);
        assert_eq!(
            &err.description,
            "wrong labeling file for this mesh/scene combination \
            (expected 3 labels, found 2)"
        );

        let err = apply_labeling(&[1, 2, 5], &mut graph, 4).unwrap_err();
        assert_eq!(err.kind, InconsistentState);
        assert_eq!(
            &err.description,
            "wrong labeling file for this mesh/scene combination \
            (label 5 of face 2 exceeds 4 views)"
        );
        // The graph is untouched by a rejected labeling.
        assert_eq!(graph.labels(), &[None, Some(0), Some(3)]);
    }

    #[test]
    fn test_labeling_round_trip() {
        let mut graph = Graph::new(4);
        apply_labeling(&[3, 0, 1, 2], &mut graph, 3).unwrap();

        let path = temp_path("labeling.vec");
        save_labeling(&path, &graph, &WriterParams::default()).unwrap();
        let labels = load_labeling(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(labels, vec![3, 0, 1, 2]);

        let params = WriterParams {
            compression: Compression::None,
            gzip_level: 0,
        };
        let mut writer = Writer::new(Vec::new(), LABELING_TAG, &params).unwrap();
        write_labeling(&mut writer, &graph).unwrap();
        let data = writer.into_inner().unwrap();
        let mut reader = Reader::new(Cursor::new(data), LABELING_TAG).unwrap();
        assert_eq!(read_labeling(&mut reader).unwrap(), vec![3, 0, 1, 2]);
    }
}
