use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array2;
use rayon::prelude::*;

use super::model::{DatasetError, ImageDataset, ImageShape, RoughnessClass};
use crate::config::AnalysisConfig;

/// Image file extensions picked up inside a class folder.
pub const IMAGE_EXTENSIONS: [&str; 1] = ["png"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load every class folder of a dataset root.
///
/// Expected layout:
///
/// ```text
/// root/
///   A2/0000.png 0001.png ...
///   A3/...
///   ...
///   B7/...
/// ```
///
/// Images are read as single-channel intensities without rescaling and
/// flattened row-major. `progress(done, total)` is called after each class.
pub fn load_dataset(
    root: &Path,
    config: &AnalysisConfig,
    progress: &dyn Fn(usize, usize),
) -> Result<ImageDataset> {
    let classes = config
        .classes
        .iter()
        .map(|name| RoughnessClass::parse(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut shape: Option<ImageShape> = None;
    let mut flat: Vec<f64> = Vec::new();
    let mut labels = Vec::new();
    let mut file_names = Vec::new();

    for (class_idx, class) in classes.iter().enumerate() {
        let dir = root.join(&class.name);
        let files = list_class_images(&dir, &class.name, config.images_per_class)?;

        let images = files
            .par_iter()
            .map(|path| decode_luma(path))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("loading class {}", class.name))?;

        for (path, (img_shape, values)) in files.iter().zip(images) {
            let expected = *shape.get_or_insert_with(|| {
                flat.reserve(img_shape.len() * files.len() * classes.len());
                img_shape
            });
            if img_shape != expected {
                return Err(DatasetError::ShapeMismatch {
                    file: path.display().to_string(),
                    expected,
                    found: img_shape,
                }
                .into());
            }
            flat.extend(values);
            labels.push(class_idx);
            file_names.push(file_name(path));
        }

        log::info!("Loaded {} images of class {}", files.len(), class.name);
        progress(class_idx + 1, classes.len());
    }

    // Every class holds at least one image, so the shape is known here.
    let shape = shape.unwrap_or(ImageShape::new(0, 0));
    let pixels = Array2::from_shape_vec((labels.len(), shape.len()), flat)
        .context("assembling pixel matrix")?;

    log::info!(
        "Dataset: {} images of {} pixels in {} classes",
        labels.len(),
        shape,
        classes.len()
    );

    Ok(ImageDataset {
        classes,
        shape,
        pixels,
        labels,
        file_names,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Image files of one class folder, sorted by name, truncated to `limit`.
fn list_class_images(dir: &Path, class: &str, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingClassDir(dir.display().to_string()).into());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry.with_context(|| format!("listing {}", dir.display()))?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        } else {
            log::debug!("Skipping {}", path.display());
        }
    }
    files.sort();

    match limit {
        Some(n) if files.len() < n => Err(DatasetError::TooFewImages {
            class: class.to_string(),
            found: files.len(),
            expected: n,
        }
        .into()),
        Some(n) => {
            files.truncate(n);
            Ok(files)
        }
        None if files.is_empty() => Err(DatasetError::EmptyClass(class.to_string()).into()),
        None => Ok(files),
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Decode one image into its shape and row-major intensities.
fn decode_luma(path: &Path) -> Result<(ImageShape, Vec<f64>)> {
    let img = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let shape = ImageShape::new(img.height() as usize, img.width() as usize);

    let values: Vec<f64> = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        other @ (DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)) => other
            .to_luma16()
            .into_raw()
            .into_iter()
            .map(f64::from)
            .collect(),
        other => other.to_luma8().into_raw().into_iter().map(f64::from).collect(),
    };

    Ok((shape, values))
}
