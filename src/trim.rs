//! Trims blank borders off PNG images.
//!
//! Images with an alpha channel lose every fully transparent row and column
//! at the edges. Opaque images lose edges matching the background colour
//! (white, or the top-left pixel). Images without any content pixel are left
//! as they are.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::BorderColor;
use crate::error::HarvestError;
use crate::output::{ProgressEvent, ProgressSink};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, Default)]
pub struct TrimOptions {
    pub background: BorderColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrimOutcome {
    Trimmed {
        original: (u32, u32),
        trimmed: (u32, u32),
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrimmedFile {
    pub name: String,
    #[serde(flatten)]
    pub outcome: TrimOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrimSummary {
    pub input_dir: String,
    pub output_dir: String,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub files: Vec<TrimmedFile>,
}

/// Content rectangle as `(x, y, width, height)`.
pub type BoundingBox = (u32, u32, u32, u32);

/// Smallest rectangle holding every pixel for which `is_content` is true.
pub fn bounding_box<F>(width: u32, height: u32, is_content: F) -> Option<BoundingBox>
where
    F: Fn(u32, u32) -> bool,
{
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for y in 0..height {
        for x in 0..width {
            if is_content(x, y) {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

pub fn content_box(image: &DynamicImage, background: BorderColor) -> Option<BoundingBox> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        return bounding_box(width, height, |x, y| rgba.get_pixel(x, y)[3] != 0);
    }

    let rgb = image.to_rgb8();
    let background = match background {
        BorderColor::White => WHITE,
        BorderColor::Corner => *rgb.get_pixel(0, 0),
    };
    bounding_box(width, height, |x, y| *rgb.get_pixel(x, y) != background)
}

/// Crops `image` to its content; the colour type is preserved.
pub fn trim_borders(image: DynamicImage, background: BorderColor) -> DynamicImage {
    match content_box(&image, background) {
        Some((x, y, width, height)) => image.crop_imm(x, y, width, height),
        None => image,
    }
}

/// Trims one file and writes it to `destination`, which may equal `source`.
pub fn trim_file(
    source: &Path,
    destination: &Path,
    options: TrimOptions,
) -> Result<TrimOutcome, HarvestError> {
    let image = image::open(source).map_err(|err| HarvestError::Image(err.to_string()))?;
    let original = image.dimensions();
    let trimmed = trim_borders(image, options.background);
    let trimmed_size = trimmed.dimensions();
    write_png_atomic(&trimmed, destination)?;
    Ok(TrimOutcome::Trimmed {
        original,
        trimmed: trimmed_size,
    })
}

fn write_png_atomic(image: &DynamicImage, destination: &Path) -> Result<(), HarvestError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".trim-")
        .suffix(".png")
        .tempfile_in(parent)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        image
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|err| HarvestError::Image(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    }
    temp.persist(destination)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Visible `*.png` files directly inside `dir`, sorted by name.
pub fn list_pngs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, HarvestError> {
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if !path.is_file() || path.extension().map(|ext| ext != "png").unwrap_or(true) {
            continue;
        }
        match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => files.push(path),
            Err(path) => warn!(path = %path.display(), "skipping non-UTF-8 file name"),
        }
    }
    files.sort();
    Ok(files)
}

/// Trims every PNG in `input_dir`, into `output_dir` when given, in place otherwise.
/// A file that fails is reported and counted; the rest of the batch still runs.
pub fn trim_directory(
    input_dir: &Utf8Path,
    output_dir: Option<&Utf8Path>,
    options: TrimOptions,
    sink: &dyn ProgressSink,
) -> Result<TrimSummary, HarvestError> {
    if !input_dir.as_std_path().is_dir() {
        return Err(HarvestError::MissingInputDir(
            input_dir.as_std_path().to_path_buf(),
        ));
    }
    let target_dir = output_dir.unwrap_or(input_dir);
    fs::create_dir_all(target_dir.as_std_path()).map_err(|err| HarvestError::OutputDir {
        path: target_dir.to_string(),
        message: err.to_string(),
    })?;

    let files = list_pngs(input_dir)?;
    let total = files.len();
    sink.event(ProgressEvent::TrimStarted { total });

    let mut results = Vec::with_capacity(total);
    let mut failed = 0usize;
    for (position, path) in files.iter().enumerate() {
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        let destination = target_dir.join(&name);
        let outcome = trim_file(path.as_std_path(), destination.as_std_path(), options)
            .unwrap_or_else(|err| {
                warn!(file = %path, %err, "trim failed");
                TrimOutcome::Failed {
                    message: err.to_string(),
                }
            });
        if matches!(outcome, TrimOutcome::Failed { .. }) {
            failed += 1;
        } else {
            debug!(file = %path, "trimmed");
        }
        sink.event(ProgressEvent::Trimmed {
            index: position + 1,
            total,
            name: name.clone(),
            outcome: outcome.clone(),
        });
        results.push(TrimmedFile { name, outcome });
    }

    Ok(TrimSummary {
        input_dir: input_dir.to_string(),
        output_dir: target_dir.to_string(),
        total,
        processed: total - failed,
        failed,
        files: results,
    })
}
