use std::fmt::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::texture::Model;
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::cli::OutputPrefix;
use base::util::fs;

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .res(|| format!("bad output path '{}'", path.display()))
}

fn map_path(prefix: &OutputPrefix, material: usize) -> PathBuf {
    prefix.with_suffix(&format!("_material{}_map_Kd.png", material))
}

fn format_mtl(model: &Model, prefix: &OutputPrefix) -> Result<String> {
    let mut mtl = String::new();
    let err = || "failed to format mtl data".to_string();
    for (i, material) in model.materials.iter().enumerate() {
        writeln!(mtl, "newmtl {}", material.name).res(err)?;
        writeln!(mtl, "Ka 1.000000 1.000000 1.000000").res(err)?;
        writeln!(mtl, "Kd 1.000000 1.000000 1.000000").res(err)?;
        writeln!(mtl, "Ks 0.000000 0.000000 0.000000").res(err)?;
        writeln!(mtl, "d 1.000000").res(err)?;
        writeln!(mtl, "illum 1").res(err)?;
        writeln!(mtl, "map_Kd {}", file_name(&map_path(prefix, i))?).res(err)?;
    }
    Ok(mtl)
}

// Indices in OBJ start at 1. Texture coordinates are flipped vertically since
// the atlas v axis points down.
fn format_obj(model: &Model, mtl_name: &str) -> Result<String> {
    let mut obj = String::new();
    let err = || "failed to format obj data".to_string();

    writeln!(obj, "mtllib {}", mtl_name).res(err)?;
    for v in &model.vertices {
        writeln!(obj, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]).res(err)?;
    }
    for vn in &model.normals {
        writeln!(obj, "vn {:.6} {:.6} {:.6}", vn[0], vn[1], vn[2]).res(err)?;
    }
    for vt in &model.texcoords {
        writeln!(obj, "vt {:.6} {:.6}", vt[0], 1.0 - vt[1]).res(err)?;
    }

    for group in &model.groups {
        match group.material {
            None => {
                for f in &group.faces {
                    writeln!(
                        obj,
                        "f {}//{} {}//{} {}//{}",
                        f[0] + 1,
                        f[0] + 1,
                        f[1] + 1,
                        f[1] + 1,
                        f[2] + 1,
                        f[2] + 1
                    )
                    .res(err)?;
                }
            }
            Some(material) => {
                writeln!(obj, "usemtl {}", model.materials[material].name).res(err)?;
                for (f, t) in group.faces.iter().zip(&group.texcoords) {
                    writeln!(
                        obj,
                        "f {}/{}/{} {}/{}/{} {}/{}/{}",
                        f[0] + 1,
                        t[0] + 1,
                        f[0] + 1,
                        f[1] + 1,
                        t[1] + 1,
                        f[1] + 1,
                        f[2] + 1,
                        t[2] + 1,
                        f[2] + 1
                    )
                    .res(err)?;
                }
            }
        }
    }
    Ok(obj)
}

// Writes <prefix>.obj, <prefix>.mtl and one <prefix>_material<i>_map_Kd.png
// per material.
pub fn export_obj(model: &Model, prefix: &OutputPrefix) -> Result<()> {
    let mtl_path = prefix.with_suffix(".mtl");
    let obj_path = prefix.with_suffix(".obj");
    let obj = format_obj(model, file_name(&mtl_path)?)?;
    fs::write_file(&obj_path, obj.as_bytes())?;
    fs::write_file(&mtl_path, format_mtl(model, prefix)?.as_bytes())?;

    for (i, material) in model.materials.iter().enumerate() {
        let path = map_path(prefix, i);
        material.diffuse_map.save(&path).map_err(|err| {
            let desc = format!("failed to save texture '{}'", path.display());
            Error::with_source(ImageError, desc, err)
        })?;
    }

    info!(
        "Exported model to '{}' ({} materials)",
        obj_path.display(),
        model.materials.len()
    );
    Ok(())
}
