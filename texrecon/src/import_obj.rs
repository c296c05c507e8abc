use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::{info, warn};

use crate::mesh::{Mesh, Point3, Vector3};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

const MAX_NUM_FACE_VERTICES: usize = 16;

pub fn load_obj(path: &Path) -> Result<Mesh> {
    let reader = fs::open_file(path)?;
    let mesh = import_obj(reader)?;
    info!(
        "Loaded mesh '{}' with {} vertices and {} faces",
        path.display(),
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

// Reads 'v', 'vn' and 'f' statements; anything else is skipped. Polygons are
// split into triangle fans.
pub fn import_obj<R: Read>(reader: R) -> Result<Mesh> {
    let mut state = ImportState::default();

    for line in BufReader::new(reader).lines() {
        let line = line.res(|| "failed to read obj data".to_string())?;
        state.line += 1;

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first() {
            Some(&"f") => import_f(&mut state, &parts)?,
            Some(&"v") => import_v(&mut state, &parts)?,
            Some(&"vn") => import_vn(&mut state, &parts)?,
            _ => (),
        }
    }

    let ImportState {
        vertices,
        normals,
        faces,
        vertex_normals,
        conflicting_normals,
        ..
    } = state;
    let mut mesh = Mesh::new(vertices, faces)?;

    let complete = vertex_normals.len() == mesh.vertices.len()
        && vertex_normals.iter().all(|n| n.is_some());
    if !conflicting_normals && complete {
        mesh.normals = vertex_normals
            .into_iter()
            .flatten()
            .map(|ni| normals[ni].try_normalize(0.0).unwrap_or_else(Vector3::zeros))
            .collect();
    } else if !normals.is_empty() {
        warn!("Ignoring incomplete or inconsistent vertex normals, recomputing them");
    }

    Ok(mesh)
}

#[derive(Default)]
struct ImportState {
    line: usize,
    vertices: Vec<Point3>,
    normals: Vec<Vector3>,
    faces: Vec<[usize; 3]>,
    // Normal index per vertex, as referenced by faces.
    vertex_normals: Vec<Option<usize>>,
    conflicting_normals: bool,
}

fn import_f(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    let num_vertices_err = |kind, prop| {
        let msg = "number of vertices in f-statement at line";
        Err(Error::new(kind, format!("{} {} {}", prop, msg, state.line)))
    };
    if parts.len() < 4 {
        return num_vertices_err(MalformedData, "bad");
    } else if parts.len() > MAX_NUM_FACE_VERTICES + 1 {
        return num_vertices_err(UnsupportedFeature, "unsupported");
    }

    let mut face_vertices = Vec::with_capacity(parts.len() - 1);
    for (i, part) in parts[1..].iter().enumerate() {
        let mut iter = part.split('/');
        let vertex = iter.next().unwrap_or_default();
        let vertex = resolve_index(state, vertex, state.vertices.len(), i + 1)?;
        let vertex = vertex.ok_or_else(|| malformed_vertex(state.line, i + 1))?;

        // Texture coordinates are not needed.
        iter.next();

        let normal = iter.next().unwrap_or_default();
        let normal = resolve_index(state, normal, state.normals.len(), i + 1)?;
        if iter.next().is_some() {
            return Err(malformed_vertex(state.line, i + 1));
        }

        add_vertex_normal(state, vertex, normal);
        face_vertices.push(vertex);
    }

    for i in 1..face_vertices.len() - 1 {
        state
            .faces
            .push([face_vertices[0], face_vertices[i], face_vertices[i + 1]]);
    }
    Ok(())
}

fn malformed_vertex(line: usize, vnum: usize) -> Error {
    let desc = format!("malformed vertex {} in f-statement at line {}", vnum, line);
    Error::new(MalformedData, desc)
}

// Turns a one based (or negative, relative) index into a zero based one.
fn resolve_index(
    state: &ImportState,
    component: &str,
    len: usize,
    vnum: usize,
) -> Result<Option<usize>> {
    if component.is_empty() {
        return Ok(None);
    }
    let num = component
        .parse::<i64>()
        .map_err(|_| malformed_vertex(state.line, vnum))?;

    let idx = if num > 0 {
        num - 1
    } else if num < 0 {
        len as i64 + num
    } else {
        return Err(malformed_vertex(state.line, vnum));
    };
    if idx < 0 || idx as usize >= len {
        let desc = format!(
            "reference to unknown element {} in f-statement at line {}",
            num, state.line
        );
        return Err(Error::new(MalformedData, desc));
    }
    Ok(Some(idx as usize))
}

fn add_vertex_normal(state: &mut ImportState, vertex: usize, normal: Option<usize>) {
    if state.vertex_normals.len() <= vertex {
        state.vertex_normals.resize(vertex + 1, None);
    }

    match (state.vertex_normals[vertex], normal) {
        (_, None) => state.conflicting_normals = true,
        (None, Some(n)) => state.vertex_normals[vertex] = Some(n),
        (Some(m), Some(n)) => {
            if state.normals[m] != state.normals[n] {
                state.conflicting_normals = true;
            }
        }
    }
}

fn import_v(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() < 4 || parts.len() > 5 {
        return Err(Error::new(
            MalformedData,
            format!("malformed v-statement at line {}", state.line),
        ));
    }

    let x = parse_coord("x-coordinate of v-statement", state.line, parts[1])?;
    let y = parse_coord("y-coordinate of v-statement", state.line, parts[2])?;
    let z = parse_coord("z-coordinate of v-statement", state.line, parts[3])?;

    state.vertices.push(Point3::new(x, y, z));
    Ok(())
}

fn import_vn(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() != 4 {
        return Err(Error::new(
            MalformedData,
            format!("malformed vn-statement at line {}", state.line),
        ));
    }

    let x = parse_coord("x-coordinate of vn-statement", state.line, parts[1])?;
    let y = parse_coord("y-coordinate of vn-statement", state.line, parts[2])?;
    let z = parse_coord("z-coordinate of vn-statement", state.line, parts[3])?;

    state.normals.push(Vector3::new(x, y, z));
    Ok(())
}

fn parse_coord(what: &str, line: usize, str: &str) -> Result<f64> {
    match str.parse::<f64>() {
        Ok(val) if val.is_finite() => Ok(val),
        _ => Err(Error::new(
            MalformedData,
            format!("failed to parse {} at line {}", what, line),
        )),
    }
}
