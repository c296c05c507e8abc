use std::collections::BTreeMap;

use image::RgbImage;
use log::{info, warn};
use rayon::prelude::*;
use rectangle_pack::{
    contains_smallest_box, pack_rects, volume_heuristic, GroupedRectsToPlace,
    RectToInsert, TargetBin,
};

use crate::texture::*;
use base::defs::{Error, ErrorKind::*, Result};

// Spacing around every patch inside an atlas.
const PADDING: u32 = 1;

// Rings of invalid pixels that get a copy of their valid neighbours.
const GUTTER_SIZE: usize = (PATCH_BORDER + PADDING) as usize;

pub struct TextureAtlas {
    image: RgbImage,
    validity_mask: ImageMask,
    faces: Vec<usize>,
    // Per face vertex, normalized to [0, 1] with v pointing down.
    texcoords: Vec<[Vector2; 3]>,
}

impl TextureAtlas {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn validity_mask(&self) -> &ImageMask {
        &self.validity_mask
    }

    pub fn faces(&self) -> &[usize] {
        &self.faces
    }

    pub fn texcoords(&self) -> &[[Vector2; 3]] {
        &self.texcoords
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_parts(self) -> (RgbImage, Vec<usize>, Vec<[Vector2; 3]>) {
        (self.image, self.faces, self.texcoords)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Placement {
    bin: usize,
    rect: Rectangle<u32>,
}

fn try_pack(
    sizes: &[[u32; 2]],
    atlas_size: u32,
    num_bins: usize,
) -> Option<Vec<Placement>> {
    let mut rects_to_place: GroupedRectsToPlace<usize, ()> =
        GroupedRectsToPlace::new();
    for (i, size) in sizes.iter().enumerate() {
        rects_to_place.push_rect(i, None, RectToInsert::new(size[0], size[1], 1));
    }

    let mut target_bins = BTreeMap::new();
    for bin in 0..num_bins {
        target_bins.insert(bin, TargetBin::new(atlas_size, atlas_size, 1));
    }

    let placements = pack_rects(
        &rects_to_place,
        &mut target_bins,
        &volume_heuristic,
        &contains_smallest_box,
    )
    .ok()?;
    let locations = placements.packed_locations();

    // The names x, y, width and height are those of rectangle_pack; x runs
    // along image columns here.
    Some(
        (0..sizes.len())
            .map(|i| {
                let (bin, location) = &locations[&i];
                Placement {
                    bin: *bin,
                    rect: Rectangle {
                        pos: [location.x(), location.y()],
                        size: [location.width(), location.height()],
                    },
                }
            })
            .collect(),
    )
}

// Smallest n in [lower, upper] for which 'attempt' succeeds, probing
// exponentially growing steps and then bisecting. 'attempt(upper)' is assumed
// to succeed whenever any attempt does.
fn smallest_feasible<T, F>(lower: usize, upper: usize, mut attempt: F) -> Option<T>
where
    F: FnMut(usize) -> Option<T>,
{
    let mut failed = lower.checked_sub(1);
    let mut step = 1;
    let mut candidate = lower;
    let (mut fits, mut best) = loop {
        if let Some(res) = attempt(candidate) {
            break (candidate, res);
        }
        if candidate >= upper {
            return None;
        }
        failed = Some(candidate);
        candidate = (candidate + step).min(upper);
        step *= 2;
    };

    while let Some(lo) = failed {
        if fits - lo <= 1 {
            break;
        }
        let mid = lo + (fits - lo) / 2;
        match attempt(mid) {
            Some(res) => {
                fits = mid;
                best = res;
            }
            None => failed = Some(mid),
        }
    }
    Some(best)
}

// Fills square bins of 'atlas_size'. The bin count starts from what the total
// area needs and grows until everything fits.
fn pack(sizes: &[[u32; 2]], atlas_size: u32) -> Result<Vec<Placement>> {
    let area: u64 = sizes.iter().map(|s| s[0] as u64 * s[1] as u64).sum();
    let bin_area = atlas_size as u64 * atlas_size as u64;
    let lower_bound = ((area + bin_area - 1) / bin_area).max(1) as usize;
    let upper_bound = sizes.len().max(lower_bound);

    smallest_feasible(lower_bound, upper_bound, |num_bins| {
        try_pack(sizes, atlas_size, num_bins)
    })
    .ok_or_else(|| {
        Error::new(
            InconsistentState,
            "failed to pack texture patches into atlases".to_string(),
        )
    })
}

fn extrapolate_gutter(image: &mut RgbImage, filled: &mut ImageMask, gutter_size: usize) {
    for _ in 0..gutter_size {
        for (x, y, sx, sy) in resolve_gutter_sources(filled) {
            let source = *image.get_pixel(sx, sy);
            image.put_pixel(x, y, source);
            filled[(y as usize, x as usize)] = true;
        }
    }
}

// Unfilled pixels next to a filled one, with the first such neighbour.
fn resolve_gutter_sources(filled: &ImageMask) -> Vec<(u32, u32, u32, u32)> {
    let (height, width) = filled.shape();
    let mut sources = vec![];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            if filled[(y as usize, x as usize)] {
                continue;
            }
            let source = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .into_iter()
                .find(|&(sx, sy)| {
                    0 <= sx
                        && (sx as usize) < width
                        && 0 <= sy
                        && (sy as usize) < height
                        && filled[(sy as usize, sx as usize)]
                });
            if let Some((sx, sy)) = source {
                sources.push((x as u32, y as u32, sx as u32, sy as u32));
            }
        }
    }
    sources
}

fn build_atlas(
    members: &[usize],
    patches: &[TexturePatch],
    placements: &[Placement],
) -> TextureAtlas {
    let extent = |k: usize| {
        members
            .iter()
            .map(|&i| placements[i].rect.pos[k] + placements[i].rect.size[k])
            .max()
            .unwrap_or(1)
    };
    let (width, height) = (extent(0), extent(1));

    let mut image = RgbImage::new(width, height);
    let mut filled = ImageMask::from_element(height as usize, width as usize, false);
    let mut faces = vec![];
    let mut texcoords = vec![];
    let size = Vector2::new(width as f64, height as f64);

    for &i in members {
        let patch = &patches[i];
        let [x0, y0] = placements[i].rect.pos;
        let (x0, y0) = (x0 + PADDING, y0 + PADDING);
        for y in 0..patch.height() {
            for x in 0..patch.width() {
                if patch.is_valid_pixel(x, y) {
                    set_pixel_as_vector3(x0 + x, y0 + y, patch.get_pixel(x, y), &mut image);
                    filled[((y0 + y) as usize, (x0 + x) as usize)] = true;
                }
            }
        }

        let offset = Vector2::new(x0 as f64 + 0.5, y0 as f64 + 0.5);
        for (&face_idx, tc) in patch.faces().iter().zip(patch.texcoords()) {
            faces.push(face_idx);
            texcoords.push(tc.map(|p| (p + offset).component_div(&size)));
        }
    }

    let validity_mask = filled.clone();
    extrapolate_gutter(&mut image, &mut filled, GUTTER_SIZE);

    TextureAtlas {
        image,
        validity_mask,
        faces,
        texcoords,
    }
}

pub fn generate_texture_atlases(
    patches: &[TexturePatch],
    max_atlas_size: u32,
) -> Result<Vec<TextureAtlas>> {
    if patches.is_empty() {
        return Ok(vec![]);
    }

    let sizes: Vec<[u32; 2]> = patches
        .iter()
        .map(|p| [p.width() + 2 * PADDING, p.height() + 2 * PADDING])
        .collect();

    let biggest = sizes.iter().flatten().cloned().max().unwrap_or(1);
    let mut atlas_size = max_atlas_size.max(1);
    if biggest > atlas_size {
        let enlarged = biggest.next_power_of_two();
        warn!(
            "Texture patch of {} pixels exceeds the maximum atlas size {}, \
            using atlases of {} pixels",
            biggest, atlas_size, enlarged
        );
        atlas_size = enlarged;
    }

    let placements = pack(&sizes, atlas_size)?;
    let num_bins = placements.iter().map(|p| p.bin + 1).max().unwrap_or(0);
    let atlases: Vec<TextureAtlas> = (0..num_bins)
        .into_par_iter()
        .filter_map(|bin| {
            let members: Vec<usize> = (0..patches.len())
                .filter(|&i| placements[i].bin == bin)
                .collect();
            if members.is_empty() {
                None
            } else {
                Some(build_atlas(&members, patches, &placements))
            }
        })
        .collect();

    info!(
        "Packed {} texture patches into {} atlases (at most {} pixels wide)",
        patches.len(),
        atlases.len(),
        atlas_size
    );
    Ok(atlases)
}
