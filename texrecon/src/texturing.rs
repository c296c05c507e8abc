use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use crate::export_obj::export_obj;
use crate::import_obj::load_obj;
use crate::mesh::{Mesh, VertexInfos};
use crate::scene::load_scene;
use crate::texture::*;
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::store::WriterParams;
use base::util::cli::OutputPrefix;
use base::util::fs;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    pub smoothness: f64,
    pub gradient_weight: f64,
    pub max_passes: usize,
    pub hidden_faces: HiddenFaces,
    pub global_seam_leveling: bool,
    pub local_seam_leveling: bool,
    pub max_atlas_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            smoothness: 1.0,
            gradient_weight: 1.0,
            max_passes: 10,
            hidden_faces: HiddenFaces::Neighbourhood,
            global_seam_leveling: true,
            local_seam_leveling: true,
            max_atlas_size: 4096,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothness >= 0.0 && self.smoothness.is_finite()) {
            return Err(Error::new(
                MalformedData,
                "smoothness must be a non-negative number".to_string(),
            ));
        }
        if !(self.gradient_weight >= 0.0 && self.gradient_weight.is_finite()) {
            return Err(Error::new(
                MalformedData,
                "gradient weight must be a non-negative number".to_string(),
            ));
        }
        if self.max_atlas_size == 0 {
            return Err(Error::new(
                MalformedData,
                "maximum atlas size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .res(|| "failed to serialize settings".to_string())?;
        fs::write_file(path, json.as_bytes())
    }
}

#[derive(StructOpt)]
pub struct SettingsParams {
    #[structopt(
        help = "Weight of the smoothness term in view selection",
        long,
        default_value = "1.0"
    )]
    smoothness: f64,

    #[structopt(
        help = "How strongly image gradients lower the data term quality",
        long,
        default_value = "1.0"
    )]
    gradient_weight: f64,

    #[structopt(
        help = "Maximum number of view selection passes",
        long,
        default_value = "10"
    )]
    max_passes: usize,

    #[structopt(
        help = "Treatment of faces no view sees (neighbourhood or leave)",
        long,
        default_value = "neighbourhood"
    )]
    hidden_faces: HiddenFaces,

    #[structopt(help = "Skip global seam leveling", long)]
    skip_global_seam_leveling: bool,

    #[structopt(help = "Skip local seam leveling", long)]
    skip_local_seam_leveling: bool,

    #[structopt(
        help = "Maximum width and height of texture atlases",
        long,
        default_value = "4096"
    )]
    max_atlas_size: u32,
}

impl SettingsParams {
    pub fn settings(&self) -> Settings {
        Settings {
            smoothness: self.smoothness,
            gradient_weight: self.gradient_weight,
            max_passes: self.max_passes,
            hidden_faces: self.hidden_faces,
            global_seam_leveling: !self.skip_global_seam_leveling,
            local_seam_leveling: !self.skip_local_seam_leveling,
            max_atlas_size: self.max_atlas_size,
        }
    }
}

// Where view selection reads precomputed results from and writes its
// results to.
#[derive(Clone, Default)]
pub struct IntermediateFiles {
    pub data_costs_in: Option<PathBuf>,
    pub labeling_in: Option<PathBuf>,
    pub data_costs_out: Option<PathBuf>,
    pub labeling_out: Option<PathBuf>,
    pub writer_params: WriterParams,
}

// Labels every face of the graph with a view (or leaves it invalid). A given
// labeling file takes precedence over data costs.
pub fn select_views(
    mesh: &Mesh,
    views: &[TextureView],
    graph: &mut Graph,
    settings: &Settings,
    files: &IntermediateFiles,
) -> Result<()> {
    if let Some(path) = &files.labeling_in {
        let labels = load_labeling(path)?;
        apply_labeling(&labels, graph, views.len())?;
        info!("Loaded labeling from '{}'", path.display());
    } else {
        let data_costs = match &files.data_costs_in {
            Some(path) => {
                let costs = DataCosts::load(path, mesh.faces.len(), views.len())?;
                info!("Loaded data costs from '{}'", path.display());
                costs
            }
            None => calculate_data_costs(mesh, views, settings),
        };
        if let Some(path) = &files.data_costs_out {
            data_costs.save(path, &files.writer_params)?;
        }
        view_selection(&data_costs, graph, settings)?;
    }

    if let Some(path) = &files.labeling_out {
        save_labeling(path, graph, &files.writer_params)?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexturingReport {
    pub num_patches: usize,
    pub num_atlases: usize,
    pub global: Option<LevelingReport>,
    pub local: Option<LocalLevelingReport>,
}

pub fn build_textured_model(
    mesh: &Mesh,
    vertex_infos: &VertexInfos,
    graph: &Graph,
    views: &[TextureView],
    settings: &Settings,
) -> Result<(Model, TexturingReport)> {
    let (mut patches, infos) = generate_texture_patches(graph, mesh, views);

    let global = if settings.global_seam_leveling {
        Some(global_seam_leveling(mesh, vertex_infos, &infos, &mut patches))
    } else {
        info!("Skipping global seam leveling");
        apply_zero_adjustments(&mut patches);
        None
    };

    let local = if settings.local_seam_leveling {
        Some(local_seam_leveling(graph, mesh, &infos, &mut patches))
    } else {
        info!("Skipping local seam leveling");
        None
    };

    let atlases = generate_texture_atlases(&patches, settings.max_atlas_size)?;
    let report = TexturingReport {
        num_patches: patches.len(),
        num_atlases: atlases.len(),
        global,
        local,
    };
    Ok((build_model(mesh, atlases), report))
}

// Textures every face with the uniform color of its view, which shows the
// labeling.
pub fn build_view_selection_model(
    mesh: &Mesh,
    vertex_infos: &VertexInfos,
    graph: &Graph,
    views: &[TextureView],
    settings: &Settings,
) -> Result<Model> {
    let embeddings: Vec<TextureView> = views.iter().map(|v| v.debug_embedding()).collect();
    let settings = Settings {
        global_seam_leveling: false,
        local_seam_leveling: false,
        ..settings.clone()
    };
    let (model, _) = build_textured_model(mesh, vertex_infos, graph, &embeddings, &settings)?;
    Ok(model)
}

#[derive(StructOpt)]
#[structopt(about = "Reconstruct a textured model from a mesh and calibrated views")]
pub struct TextureCommand {
    #[structopt(help = "Input scene (JSON with view images and cameras)")]
    scene: PathBuf,

    #[structopt(help = "Input mesh (OBJ)")]
    mesh: PathBuf,

    #[structopt(flatten)]
    output: OutputPrefix,

    #[structopt(flatten)]
    settings: SettingsParams,

    #[structopt(help = "Read data costs from this file", long)]
    data_costs: Option<PathBuf>,

    #[structopt(help = "Read the labeling from this file", long)]
    labeling: Option<PathBuf>,

    #[structopt(
        help = "Write <prefix>_data_costs.spt and <prefix>_labeling.vec",
        long
    )]
    write_intermediate_results: bool,

    #[structopt(
        help = "Write <prefix>_view_selection.obj colored by view",
        long
    )]
    write_view_selection_model: bool,

    #[structopt(flatten)]
    writer_params: WriterParams,
}

impl TextureCommand {
    pub fn run(&self) -> Result<()> {
        self.output.check_dir()?;
        let settings = self.settings.settings();
        settings.validate()?;
        settings.save(&self.output.with_suffix(".conf"))?;

        let views = load_scene(&self.scene)?;
        let mesh = load_obj(&self.mesh)?;
        let vertex_infos = VertexInfos::new(&mesh);
        let mut graph = Graph::build(&mesh, &vertex_infos);

        let out = |suffix: &str| Some(self.output.with_suffix(suffix));
        let write = self.write_intermediate_results;
        let files = IntermediateFiles {
            data_costs_in: self.data_costs.clone(),
            labeling_in: self.labeling.clone(),
            data_costs_out: if write { out("_data_costs.spt") } else { None },
            labeling_out: if write { out("_labeling.vec") } else { None },
            writer_params: self.writer_params,
        };
        select_views(&mesh, &views, &mut graph, &settings, &files)?;

        let debug_output = if self.write_view_selection_model {
            Some(OutputPrefix {
                path: self.output.with_suffix("_view_selection"),
            })
        } else {
            None
        };
        export_models(
            &mesh,
            &vertex_infos,
            &graph,
            &views,
            &settings,
            &self.output,
            debug_output.as_ref(),
        )
    }
}

// The textured model is written before the optional view selection model.
fn export_models(
    mesh: &Mesh,
    vertex_infos: &VertexInfos,
    graph: &Graph,
    views: &[TextureView],
    settings: &Settings,
    output: &OutputPrefix,
    debug_output: Option<&OutputPrefix>,
) -> Result<()> {
    let (model, _) = build_textured_model(mesh, vertex_infos, graph, views, settings)?;
    export_obj(&model, output)?;

    if let Some(debug_output) = debug_output {
        let model = build_view_selection_model(mesh, vertex_infos, graph, views, settings)?;
        export_obj(&model, debug_output)?;
    }
    Ok(())
}

#[derive(StructOpt)]
#[structopt(about = "Select views only, writing data costs and labeling")]
pub struct SelectViewsCommand {
    #[structopt(help = "Input scene (JSON with view images and cameras)")]
    scene: PathBuf,

    #[structopt(help = "Input mesh (OBJ)")]
    mesh: PathBuf,

    #[structopt(flatten)]
    output: OutputPrefix,

    #[structopt(flatten)]
    settings: SettingsParams,

    #[structopt(help = "Read data costs from this file", long)]
    data_costs: Option<PathBuf>,

    #[structopt(flatten)]
    writer_params: WriterParams,
}

impl SelectViewsCommand {
    pub fn run(&self) -> Result<()> {
        self.output.check_dir()?;
        let settings = self.settings.settings();
        settings.validate()?;

        let views = load_scene(&self.scene)?;
        let mesh = load_obj(&self.mesh)?;
        let mut graph = Graph::build(&mesh, &VertexInfos::new(&mesh));

        let data_costs_out = if self.data_costs.is_none() {
            Some(self.output.with_suffix("_data_costs.spt"))
        } else {
            None
        };
        let files = IntermediateFiles {
            data_costs_in: self.data_costs.clone(),
            labeling_in: None,
            data_costs_out,
            labeling_out: Some(self.output.with_suffix("_labeling.vec")),
            writer_params: self.writer_params,
        };
        select_views(&mesh, &views, &mut graph, &settings, &files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{cube_views, look_at, uniform_image, unit_cube};
    use base::util::test::temp_path;

    const RED: [u8; 3] = [220, 30, 30];
    const BLUE: [u8; 3] = [30, 30, 220];

    // A red view mostly facing the left side (x = 0) and a blue one mostly
    // facing the front side (y = 0). Both see both sides, nothing else.
    fn overlapping_views() -> Vec<TextureView> {
        let center = Point3::new(0.5, 0.5, 0.5);
        let eye = |dir: Vector3| center + dir.normalize() * 3.0;
        vec![
            TextureView::new(
                0,
                look_at(eye(Vector3::new(-1.0, -0.4, 0.0)), center, 1.0),
                uniform_image(64, 64, RED),
            ),
            TextureView::new(
                1,
                look_at(eye(Vector3::new(-0.4, -1.0, 0.0)), center, 1.0),
                uniform_image(64, 64, BLUE),
            ),
        ]
    }

    fn num_label_changes(graph: &Graph) -> usize {
        (0..graph.num_nodes())
            .map(|n| {
                graph
                    .adj_nodes(n)
                    .iter()
                    .filter(|&&m| m > n)
                    .filter(|&&m| match (graph.get_label(n), graph.get_label(m)) {
                        (Some(a), Some(b)) => a != b,
                        _ => false,
                    })
                    .count()
            })
            .sum()
    }

    fn count_colored_pixels(image: &image::RgbImage, color: [u8; 3]) -> usize {
        image
            .pixels()
            .filter(|p| p.0.iter().zip(color).all(|(&a, b)| (a as i32 - b as i32).abs() <= 2))
            .count()
    }

    fn labeled_cube(settings: &Settings) -> (Mesh, VertexInfos, Graph, Vec<TextureView>) {
        let mesh = unit_cube();
        let vertex_infos = VertexInfos::new(&mesh);
        let mut graph = Graph::build(&mesh, &vertex_infos);
        let views = cube_views(64);
        select_views(&mesh, &views, &mut graph, settings, &IntermediateFiles::default())
            .unwrap();
        (mesh, vertex_infos, graph, views)
    }

    #[test]
    fn test_settings_defaults_and_serde() {
        let settings: Settings = serde_json::from_str(r#"{"smoothness": 2.5}"#).unwrap();
        assert_eq!(
            settings,
            Settings {
                smoothness: 2.5,
                ..Settings::default()
            }
        );
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains(r#""hidden_faces":"neighbourhood""#));
        assert_eq!(serde_json::from_str::<Settings>(&json).unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_validation() {
        assert!(Settings::default().validate().is_ok());
        let settings = Settings {
            smoothness: -1.0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind, MalformedData);
        assert_eq!(&err.description, "smoothness must be a non-negative number");
        let settings = Settings {
            max_atlas_size: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_save() {
        let path = temp_path("settings.conf");
        Settings::default().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(serde_json::from_str::<Settings>(&text).unwrap(), Settings::default());
    }

    #[test]
    fn test_cube_labels_follow_sides() {
        for smoothness in [0.0, 100.0] {
            let settings = Settings {
                smoothness,
                ..Settings::default()
            };
            let (_, _, graph, _) = labeled_cube(&settings);
            let expected: Vec<Option<usize>> = (0..12).map(|f| Some(f / 2)).collect();
            assert_eq!(graph.labels(), &expected[..]);
        }
    }

    #[test]
    fn test_all_leveling_combinations() {
        for global in [false, true] {
            for local in [false, true] {
                let settings = Settings {
                    global_seam_leveling: global,
                    local_seam_leveling: local,
                    ..Settings::default()
                };
                let (mesh, vertex_infos, graph, views) = labeled_cube(&settings);
                let (model, report) =
                    build_textured_model(&mesh, &vertex_infos, &graph, &views, &settings)
                        .unwrap();

                assert_eq!(report.global.is_some(), global);
                assert_eq!(report.local.is_some(), local);
                assert_eq!(report.num_patches, 6);
                assert_eq!(report.num_atlases, 1);
                if let Some(global) = report.global {
                    assert!(global.discontinuity_after <= global.discontinuity_before);
                }
                assert_eq!(model.num_faces(), 12);
                assert_eq!(model.groups.len(), 1);
                assert_eq!(model.groups[0].material, Some(0));
            }
        }
    }

    #[test]
    fn test_labeling_files() {
        let settings = Settings::default();
        let mesh = unit_cube();
        let vertex_infos = VertexInfos::new(&mesh);
        let views = cube_views(64);

        let files = IntermediateFiles {
            data_costs_out: Some(temp_path("cube_data_costs.spt")),
            labeling_out: Some(temp_path("cube_labeling.vec")),
            ..IntermediateFiles::default()
        };
        let mut graph = Graph::build(&mesh, &vertex_infos);
        select_views(&mesh, &views, &mut graph, &settings, &files).unwrap();

        // Reusing the labeling reproduces it.
        let reuse = IntermediateFiles {
            labeling_in: files.labeling_out.clone(),
            ..IntermediateFiles::default()
        };
        let mut reused = Graph::build(&mesh, &vertex_infos);
        select_views(&mesh, &views, &mut reused, &settings, &reuse).unwrap();
        assert_eq!(reused.labels(), graph.labels());

        // So do the data costs.
        let reuse = IntermediateFiles {
            data_costs_in: files.data_costs_out.clone(),
            ..IntermediateFiles::default()
        };
        let mut reused = Graph::build(&mesh, &vertex_infos);
        select_views(&mesh, &views, &mut reused, &settings, &reuse).unwrap();
        assert_eq!(reused.labels(), graph.labels());

        // A labeling for another scene is rejected.
        let err = select_views(&mesh, &views[..3], &mut reused, &settings, &IntermediateFiles {
            labeling_in: files.labeling_out.clone(),
            ..IntermediateFiles::default()
        })
        .unwrap_err();
        assert_eq!(err.kind, InconsistentState);

        for path in [files.data_costs_out, files.labeling_out].iter().flatten() {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn test_view_selection_model_uses_view_colors() {
        let settings = Settings::default();
        let (mesh, vertex_infos, graph, views) = labeled_cube(&settings);
        let model =
            build_view_selection_model(&mesh, &vertex_infos, &graph, &views, &settings).unwrap();
        assert_eq!(model.num_faces(), 12);

        let group = &model.groups[0];
        let image = &model.materials[0].diffuse_map;
        for (face, tc) in group.faces.iter().zip(&group.texcoords) {
            let face_idx = mesh.faces.iter().position(|f| f == face).unwrap();
            let label = graph.get_label(face_idx).unwrap();
            let uv = model.texcoords[tc[0]];
            let x = (uv[0] * image.width() as f64 - 0.5).round() as u32;
            let y = (uv[1] * image.height() as f64 - 0.5).round() as u32;
            let color = get_pixel_as_vector3(x, y, image);
            assert!((color - debug_color(label)).amax() <= 1.0);
        }
    }

    #[test]
    fn test_smoothness_on_overlapping_views() {
        let mesh = unit_cube();
        let vertex_infos = VertexInfos::new(&mesh);
        let views = overlapping_views();
        let left = [8, 9];
        let front = [4, 5];

        let mut results = vec![];
        for smoothness in [0.0, 100.0] {
            let settings = Settings {
                smoothness,
                hidden_faces: HiddenFaces::Leave,
                global_seam_leveling: false,
                local_seam_leveling: false,
                ..Settings::default()
            };
            let mut graph = Graph::build(&mesh, &vertex_infos);
            select_views(&mesh, &views, &mut graph, &settings, &IntermediateFiles::default())
                .unwrap();
            assert_eq!(graph.num_labeled(), 4);

            let (model, report) =
                build_textured_model(&mesh, &vertex_infos, &graph, &views, &settings).unwrap();
            assert_eq!(model.num_faces(), 12);
            results.push((graph, model, report));
        }
        let (sharp_graph, sharp_model, sharp_report) = &results[0];
        let (smooth_graph, smooth_model, smooth_report) = &results[1];

        // Without smoothness every side takes the view facing it.
        for f in left {
            assert_eq!(sharp_graph.get_label(f), Some(0));
        }
        for f in front {
            assert_eq!(sharp_graph.get_label(f), Some(1));
        }
        assert_eq!(num_label_changes(sharp_graph), 1);
        assert_eq!(sharp_report.num_patches, 2);

        // A high penalty merges both sides into a single patch.
        let label = smooth_graph.get_label(left[0]);
        assert!(label.is_some());
        for f in left.iter().chain(&front) {
            assert_eq!(smooth_graph.get_label(*f), label);
        }
        assert_eq!(num_label_changes(smooth_graph), 0);
        assert_eq!(smooth_report.num_patches, 1);

        let sharp_map = &sharp_model.materials[0].diffuse_map;
        assert!(count_colored_pixels(sharp_map, RED) > 0);
        assert!(count_colored_pixels(sharp_map, BLUE) > 0);
        let smooth_map = &smooth_model.materials[0].diffuse_map;
        let (other, chosen) = if label == Some(0) { (BLUE, RED) } else { (RED, BLUE) };
        assert!(count_colored_pixels(smooth_map, chosen) > 0);
        assert_eq!(count_colored_pixels(smooth_map, other), 0);

        // The exported OBJ keeps the unseen sides untextured.
        let output = OutputPrefix {
            path: temp_path("overlapping"),
        };
        export_obj(smooth_model, &output).unwrap();
        let obj = fs::read_file_to_string(output.with_suffix(".obj")).unwrap();
        let faces: Vec<&str> = obj.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces.len(), 12);
        assert_eq!(faces.iter().filter(|l| l.contains("//")).count(), 8);
        assert_eq!(obj.lines().filter(|l| l.starts_with("usemtl ")).count(), 1);
        for suffix in [".obj", ".mtl", "_material0_map_Kd.png"] {
            std::fs::remove_file(output.with_suffix(suffix)).unwrap();
        }
    }

    #[test]
    fn test_main_model_written_before_debug_model() {
        let settings = Settings::default();
        let (mesh, vertex_infos, graph, views) = labeled_cube(&settings);
        let output = OutputPrefix {
            path: temp_path("cube"),
        };
        let debug_output = OutputPrefix {
            path: output.with_suffix("_view_selection"),
        };
        // A directory in place of the debug OBJ makes its export fail.
        std::fs::create_dir(debug_output.with_suffix(".obj")).unwrap();

        let res = export_models(
            &mesh,
            &vertex_infos,
            &graph,
            &views,
            &settings,
            &output,
            Some(&debug_output),
        );
        assert_eq!(res.unwrap_err().kind, IoError);
        assert!(output.with_suffix(".obj").is_file());
        assert!(output.with_suffix("_material0_map_Kd.png").is_file());

        std::fs::remove_dir(debug_output.with_suffix(".obj")).unwrap();
        for suffix in [".obj", ".mtl", "_material0_map_Kd.png"] {
            std::fs::remove_file(output.with_suffix(suffix)).unwrap();
        }
    }
}
