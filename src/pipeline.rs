use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result};
use eframe::egui;
use ndarray::{Array2, Axis, s};

use crate::analysis::{Pca, StandardScaler};
use crate::config::AnalysisConfig;
use crate::data::loader::load_dataset;
use crate::data::model::{ImageDataset, one_hot};

// ---------------------------------------------------------------------------
// Pipeline output
// ---------------------------------------------------------------------------

/// Everything one analysis run produces.
#[derive(Debug)]
pub struct AnalysisResult {
    pub root: PathBuf,
    /// Settings the result was computed with.
    pub config: AnalysisConfig,
    /// The loaded dataset; `pixels` holds the standardized values.
    pub dataset: ImageDataset,
    pub scaler: StandardScaler,
    pub pca: Pca,
    /// `n_samples × n_components` PCA scores.
    pub projections: Array2<f64>,
    /// Mean score of every class, `n_classes × n_components`.
    pub class_centroids: Array2<f64>,
}

/// Units of the images rebuilt from the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelUnits {
    /// Intensities as stored in the image files.
    Raw,
    /// Zero mean and unit variance per pixel, as seen by the PCA.
    Standardized,
}

impl AnalysisResult {
    /// One sample rebuilt from its first `k` scores.
    pub fn reconstruct(&self, row: usize, k: usize, units: PixelUnits) -> Result<Array2<f64>> {
        let n_fitted = self.pca.n_components();
        let k = k.clamp(1, n_fitted);
        let mut scores = Array2::<f64>::zeros((1, n_fitted));
        scores
            .slice_mut(s![0, ..k])
            .assign(&self.projections.slice(s![row, ..k]));
        let flat = self.pca.inverse_transform(scores.view())?;
        self.to_image(flat, units).context("reshaping reconstruction")
    }

    /// One sample as an image.
    pub fn sample_image(&self, row: usize, units: PixelUnits) -> Result<Array2<f64>> {
        let flat = self.dataset.pixels.slice(s![row..row + 1, ..]).to_owned();
        self.to_image(flat, units).context("reshaping sample")
    }

    fn to_image(&self, flat: Array2<f64>, units: PixelUnits) -> Result<Array2<f64>> {
        let flat = match units {
            PixelUnits::Standardized => flat,
            PixelUnits::Raw => self.scaler.inverse_transform(flat.view())?,
        };
        let shape = self.dataset.shape;
        Ok(flat.into_shape_with_order((shape.height, shape.width))?)
    }

    /// Whether running with `config` would change the loaded data or the fit.
    /// Display-only settings are ignored.
    pub fn is_stale(&self, config: &AnalysisConfig) -> bool {
        let ran = &self.config;
        ran.classes != config.classes
            || ran.images_per_class != config.images_per_class
            || ran.n_components != config.n_components
            || ran.seed != config.seed
            || ran.max_iterations != config.max_iterations
            || ran.tolerance != config.tolerance
    }
}

/// Mean score of every class, `(one_hotᵀ · scores) / class size`.
fn class_centroids(dataset: &ImageDataset, projections: &Array2<f64>) -> Result<Array2<f64>> {
    let indicator = one_hot(dataset.labels_full(), dataset.n_classes())?;
    let counts = indicator.sum_axis(Axis(0)).mapv(|c| c.max(1.0));
    let sums = indicator.t().dot(projections);
    Ok(sums / &counts.insert_axis(Axis(1)))
}

// ---------------------------------------------------------------------------
// Synchronous run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Standardizing,
    Fitting,
    Projecting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Loading => write!(f, "Loading images"),
            Stage::Standardizing => write!(f, "Standardizing"),
            Stage::Fitting => write!(f, "Fitting PCA"),
            Stage::Projecting => write!(f, "Projecting"),
        }
    }
}

/// Load → standardize → fit PCA → project.
pub fn run(
    root: &Path,
    config: &AnalysisConfig,
    progress: &dyn Fn(Stage, usize, usize),
) -> Result<AnalysisResult> {
    config.validate()?;

    log::info!("Loading dataset from {}", root.display());
    progress(Stage::Loading, 0, config.classes.len());
    let mut dataset = load_dataset(root, config, &|done, total| {
        progress(Stage::Loading, done, total)
    })?;

    log::info!("Standardizing {} features", dataset.shape.len());
    progress(Stage::Standardizing, 0, 1);
    let mut scaler = StandardScaler::new();
    scaler
        .fit(dataset.pixels.view())
        .context("fitting scaler")?;
    scaler
        .transform_inplace(dataset.pixels.view_mut())
        .context("standardizing pixels")?;

    log::info!("Fitting PCA with {} components", config.n_components);
    progress(Stage::Fitting, 0, 1);
    let mut pca = Pca::new(config.n_components)
        .seed(config.seed)
        .max_iterations(config.max_iterations)
        .tolerance(config.tolerance);
    pca.fit(dataset.pixels.view()).context("fitting PCA")?;

    progress(Stage::Projecting, 0, 1);
    let projections = pca
        .transform(dataset.pixels.view())
        .context("projecting samples")?;
    let class_centroids = class_centroids(&dataset, &projections).context("averaging class scores")?;

    if let Some(iterations) = pca.n_iterations() {
        log::info!("PCA fit took {iterations} iterations");
    }
    if let Some(share) = pca.cumulative_ratio(config.n_plotted) {
        log::info!(
            "The {} first PCA components contain {:.2}%",
            config.n_plotted,
            share * 100.0
        );
    }

    Ok(AnalysisResult {
        root: root.to_path_buf(),
        config: config.clone(),
        dataset,
        scaler,
        pca,
        projections,
        class_centroids,
    })
}

// ---------------------------------------------------------------------------
// Background run for the UI
// ---------------------------------------------------------------------------

pub enum PipelineEvent {
    Progress { stage: Stage, done: usize, total: usize },
    Finished(Box<AnalysisResult>),
    Failed(String),
}

/// Receiving end of a pipeline running on a worker thread.
pub struct PipelineHandle {
    rx: Receiver<PipelineEvent>,
}

impl PipelineHandle {
    /// Drain the events sent since the last call.
    pub fn poll(&self) -> Vec<PipelineEvent> {
        self.rx.try_iter().collect()
    }
}

/// Run the pipeline on a worker thread; every event requests a repaint.
pub fn spawn(root: PathBuf, config: AnalysisConfig, ctx: egui::Context) -> Result<PipelineHandle> {
    let (tx, rx) = mpsc::channel();

    std::thread::Builder::new()
        .name("pca-pipeline".into())
        .spawn(move || {
            let progress = |stage: Stage, done: usize, total: usize| {
                let _ = tx.send(PipelineEvent::Progress { stage, done, total });
                ctx.request_repaint();
            };
            let event = match run(&root, &config, &progress) {
                Ok(result) => PipelineEvent::Finished(Box::new(result)),
                Err(e) => {
                    log::error!("Analysis of {} failed: {e:#}", root.display());
                    PipelineEvent::Failed(format!("{e:#}"))
                }
            };
            let _ = tx.send(event);
            ctx.request_repaint();
        })
        .context("starting pipeline thread")?;

    Ok(PipelineHandle { rx })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{GrayImage, Luma};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Small textured dataset: brightness grows with the class index.
    pub(crate) fn write_textured_dataset(root: &Path, classes: &[&str], per_class: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for (ci, class) in classes.iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let img = GrayImage::from_fn(6, 5, |x, y| {
                    let base = 20.0 * ci as f64 + (x * y) as f64;
                    Luma([(base + rng.random::<f64>() * 30.0) as u8])
                });
                img.save(dir.join(format!("{i:03}.png"))).unwrap();
            }
        }
    }

    pub(crate) fn small_config(classes: &[&str]) -> AnalysisConfig {
        AnalysisConfig {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            n_components: 5,
            n_plotted: 3,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A2", "A3", "B2", "B3"];
        write_textured_dataset(dir.path(), &classes, 8);

        let stages = std::cell::RefCell::new(Vec::new());
        let result = run(dir.path(), &small_config(&classes), &|stage, _, _| {
            stages.borrow_mut().push(stage)
        })
        .unwrap();

        let stages = stages.into_inner();
        assert_eq!(stages.first(), Some(&Stage::Loading));
        assert_eq!(stages.last(), Some(&Stage::Projecting));

        assert_eq!(result.dataset.len(), 32);
        assert_eq!(result.dataset.shape.len(), 30);
        assert_eq!(result.projections.dim(), (32, 5));

        // Standardized in place.
        for col in result.dataset.pixels.columns() {
            assert_relative_eq!(col.mean().unwrap(), 0.0, epsilon = 1e-9);
        }

        let ratio = result.pca.explained_variance_ratio().unwrap();
        assert!(ratio.sum() <= 1.0 + 1e-9);
        assert!(ratio[0] > ratio[4]);

        let eigen = result.pca.component_image(0, result.dataset.shape).unwrap();
        assert_eq!(eigen.dim(), (5, 6));
    }

    #[test]
    fn reconstruction_improves_with_components() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A2", "B2"];
        write_textured_dataset(dir.path(), &classes, 10);
        let result = run(dir.path(), &small_config(&classes), &|_, _, _| {}).unwrap();

        let original = result.sample_image(3, PixelUnits::Standardized).unwrap();
        let error = |k| {
            let rec = result.reconstruct(3, k, PixelUnits::Standardized).unwrap();
            (&rec - &original).mapv(|v| v * v).sum()
        };
        assert!(error(5) <= error(1) + 1e-9);
    }

    #[test]
    fn raw_units_give_back_file_intensities() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A3", "B3"];
        write_textured_dataset(dir.path(), &classes, 4);
        let result = run(dir.path(), &small_config(&classes), &|_, _, _| {}).unwrap();

        let raw = result.sample_image(0, PixelUnits::Raw).unwrap();
        let file = image::open(dir.path().join("A3").join("000.png")).unwrap().to_luma8();
        assert_eq!(raw.dim(), (5, 6));
        for (x, y, px) in file.enumerate_pixels() {
            assert_relative_eq!(raw[[y as usize, x as usize]], px[0] as f64, epsilon = 1e-9);
        }

        let rec = result.reconstruct(0, 5, PixelUnits::Raw).unwrap();
        assert!(rec.iter().all(|v| v.is_finite()));
        assert!(rec.mean().unwrap() > 1.0);
    }

    #[test]
    fn centroids_are_class_means_of_scores() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A2", "A5", "B4"];
        write_textured_dataset(dir.path(), &classes, 5);
        let result = run(dir.path(), &small_config(&classes), &|_, _, _| {}).unwrap();

        assert_eq!(result.class_centroids.dim(), (3, 5));
        for class in 0..3 {
            let rows = result.dataset.class_rows(class);
            let mean = result
                .projections
                .slice(s![rows, ..])
                .mean_axis(Axis(0))
                .unwrap();
            for (c, m) in result.class_centroids.row(class).iter().zip(mean.iter()) {
                assert_relative_eq!(*c, *m, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn only_fit_settings_make_a_result_stale() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A2", "B2"];
        write_textured_dataset(dir.path(), &classes, 4);
        let config = small_config(&classes);
        let result = run(dir.path(), &config, &|_, _, _| {}).unwrap();

        let mut edited = config.clone();
        assert!(!result.is_stale(&edited));
        edited.n_plotted = 2;
        edited.histogram_bins = 7;
        edited.max_points_per_class = None;
        assert!(!result.is_stale(&edited));
        edited.n_components = 4;
        assert!(result.is_stale(&edited));
    }

    #[test]
    fn reports_invalid_config_and_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(&["A2"]);
        config.n_plotted = 9;
        assert!(run(dir.path(), &config, &|_, _, _| {}).is_err());

        let config = small_config(&["A2"]);
        let err = run(dir.path(), &config, &|_, _, _| {}).unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
    }
}
