use std::path::{Path, PathBuf};

use image::RgbImage;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::texture::{Camera, TextureView};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SceneView {
    pub image: PathBuf,
    pub camera: Camera,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Scene {
    pub views: Vec<SceneView>,
}

impl Scene {
    pub fn validate(&self) -> Result<()> {
        if self.views.is_empty() {
            return Err(Error::new(MalformedData, "scene has no views".to_string()));
        }
        for (i, view) in self.views.iter().enumerate() {
            view.camera.validate().map_err(|err| {
                Error::new(
                    err.kind,
                    format!("bad camera of view {}: {}", i, err.description),
                )
            })?;
        }
        Ok(())
    }
}

pub fn read_scene(path: &Path) -> Result<Scene> {
    let json = fs::read_file_to_string(path)?;
    let scene: Scene = serde_json::from_str(&json)
        .res(|| format!("failed to parse scene '{}'", path.display()))?;
    scene.validate()?;
    Ok(scene)
}

fn non_empty_image(id: usize, image: RgbImage) -> Result<RgbImage> {
    if image.width() == 0 || image.height() == 0 {
        let desc = format!("image of view {} is empty", id);
        return Err(Error::new(MalformedData, desc));
    }
    Ok(image)
}

// Image paths are taken relative to the directory of the scene file.
pub fn load_scene(path: &Path) -> Result<Vec<TextureView>> {
    let scene = read_scene(path)?;
    let dir = path.parent().unwrap_or_else(|| "".as_ref());

    let views = scene
        .views
        .into_par_iter()
        .enumerate()
        .map(|(id, view)| {
            let image_path = dir.join(&view.image);
            let image = image::open(&image_path).map_err(|err| {
                let desc = format!("failed to load image '{}'", image_path.display());
                Error::with_source(ImageError, desc, err)
            })?;
            let image = non_empty_image(id, image.to_rgb8())?;
            Ok(TextureView::new(id, view.camera, image))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Loaded {} views from '{}'", views.len(), path.display());
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{look_at, uniform_image};
    use crate::texture::Point3;
    use base::util::test::temp_path;

    fn camera() -> Camera {
        look_at(Point3::new(0.0, 0.0, 3.0), Point3::origin(), 1.0)
    }

    #[test]
    fn test_load_scene() {
        let image_path = temp_path("view.png");
        uniform_image(8, 6, [10, 20, 30]).save(&image_path).unwrap();

        let scene = Scene {
            views: vec![SceneView {
                image: PathBuf::from(image_path.file_name().unwrap()),
                camera: camera(),
            }],
        };
        let scene_path = temp_path("scene.json");
        fs::write_file(&scene_path, serde_json::to_string(&scene).unwrap().as_bytes())
            .unwrap();

        let views = load_scene(&scene_path).unwrap();
        std::fs::remove_file(&image_path).unwrap();
        std::fs::remove_file(&scene_path).unwrap();

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id(), 0);
        assert_eq!((views[0].width(), views[0].height()), (8, 6));
        assert_eq!(views[0].image().get_pixel(3, 3).0, [10, 20, 30]);
        assert_eq!(views[0].camera().focal_length, 1.0);
        assert_eq!(views[0].camera().principal_point, [0.5, 0.5]);
    }

    #[test]
    fn test_scene_errors() {
        let path = temp_path("empty_scene.json");
        fs::write_file(&path, br#"{"views": []}"#).unwrap();
        let err = load_scene(&path).unwrap_err();
        assert_eq!(err.kind, MalformedData);
        assert_eq!(&err.description, "scene has no views");

        fs::write_file(&path, b"{\"views\": 3}").unwrap();
        assert_eq!(load_scene(&path).unwrap_err().kind, MalformedData);

        let scene = Scene {
            views: vec![SceneView {
                image: PathBuf::from("missing.png"),
                camera: camera(),
            }],
        };
        fs::write_file(&path, serde_json::to_string(&scene).unwrap().as_bytes()).unwrap();
        assert_eq!(load_scene(&path).unwrap_err().kind, ImageError);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = non_empty_image(2, RgbImage::new(0, 5)).unwrap_err();
        assert_eq!(err.kind, MalformedData);
        assert_eq!(&err.description, "image of view 2 is empty");
        assert!(non_empty_image(0, uniform_image(1, 1, [0, 0, 0])).is_ok());
    }
}
