use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};
use roughness_pca::config::{AnalysisConfig, CONFIG_FILE_NAME, DEFAULT_CLASSES};
use roughness_pca::data::model::{Family, RoughnessClass};

/// Sinusoids summed into one machining-mark profile.
const N_WAVES: usize = 4;

struct Options {
    out: PathBuf,
    per_class: usize,
    size: u32,
    seed: u64,
}

impl Options {
    /// `generate_sample [out_dir] [images_per_class] [size] [seed]`
    fn from_args() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let parse = |i: usize, default: u64| -> Result<u64> {
            match args.get(i) {
                Some(v) => v.parse().with_context(|| format!("invalid argument '{v}'")),
                None => Ok(default),
            }
        };
        Ok(Self {
            out: args.first().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("sample_roughness")),
            per_class: parse(1, 40)? as usize,
            size: parse(2, 64)? as u32,
            seed: parse(3, 42)?,
        })
    }
}

/// Surface texture of one image: parallel marks whose depth grows with the
/// grade. Family A marks run horizontally, family B marks diagonally.
fn generate_image(class: &RoughnessClass, size: u32, rng: &mut ChaCha8Rng) -> Result<GrayImage> {
    let amplitude = 6.0 * (class.grade as f64 - 1.0);
    let (dx, dy) = match class.family {
        Family::A => (0.0, 1.0),
        Family::B => (PI / 4.0).sin_cos(),
    };

    let frequency = Uniform::new(0.05, 0.35)?;
    let waves: Vec<(f64, f64, f64)> = (0..N_WAVES)
        .map(|_| {
            let f = frequency.sample(rng);
            let phase = rng.random::<f64>() * 2.0 * PI;
            let weight = rng.random::<f64>() + 0.5;
            (f, phase, weight)
        })
        .collect();
    let norm: f64 = waves.iter().map(|w| w.2).sum();
    let noise = Normal::new(0.0, 2.0 + amplitude * 0.25)?;

    let mut img = GrayImage::new(size, size);
    for (x, y, px) in img.enumerate_pixels_mut() {
        let t = x as f64 * dx + y as f64 * dy;
        let profile: f64 = waves
            .iter()
            .map(|&(f, phase, weight)| weight * (2.0 * PI * f * t + phase).sin())
            .sum::<f64>()
            / norm;
        let value = 128.0 + amplitude * profile + noise.sample(rng);
        *px = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    Ok(img)
}

/// Write `<out>/<class>/<nnnn>.png` for every class plus a config file.
fn write_dataset(opts: &Options) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);

    for name in DEFAULT_CLASSES {
        let class = RoughnessClass::parse(name)?;
        let dir = opts.out.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("cannot create {}", dir.display()))?;
        for i in 0..opts.per_class {
            let path = dir.join(format!("{i:04}.png"));
            generate_image(&class, opts.size, &mut rng)?
                .save(&path)
                .with_context(|| format!("cannot write {}", path.display()))?;
        }
        log::info!("{name}: {} images", opts.per_class);
    }
    write_config(&opts.out, opts.per_class)
}

fn write_config(out: &Path, per_class: usize) -> Result<()> {
    let config = AnalysisConfig {
        images_per_class: Some(per_class),
        ..AnalysisConfig::default()
    };
    let path = out.join(CONFIG_FILE_NAME);
    fs::write(&path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("cannot write {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Options::from_args()?;
    write_dataset(&opts)?;

    println!(
        "Wrote {} images of {}x{} px to {}",
        DEFAULT_CLASSES.len() * opts.per_class,
        opts.size,
        opts.size,
        opts.out.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roughness_pca::data::loader::load_dataset;

    #[test]
    fn written_dataset_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let opts = Options {
            out: dir.path().to_path_buf(),
            per_class: 1,
            size: 8,
            seed: 7,
        };
        write_dataset(&opts).unwrap();

        let config = AnalysisConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.images_per_class, Some(1));

        let dataset = load_dataset(dir.path(), &config, &|_, _| {}).unwrap();
        assert_eq!(dataset.len(), DEFAULT_CLASSES.len());
        assert_eq!(dataset.shape.len(), 64);
        assert_eq!(dataset.class_of(11).name, "B7");
        assert_eq!(dataset.file_names[0], "0000.png");
    }

    #[test]
    fn texture_depth_grows_with_grade() {
        let spread = |name: &str| {
            let class = RoughnessClass::parse(name).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let img = generate_image(&class, 32, &mut rng).unwrap();
            let values: Vec<f64> = img.pixels().map(|p| p[0] as f64).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
        };
        assert!(spread("A7") > spread("A2"));
        assert!(spread("B7") > spread("B2"));
    }
}
