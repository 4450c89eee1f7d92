use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Name of the optional configuration file looked up in a dataset root.
pub const CONFIG_FILE_NAME: &str = "roughness.json";

/// The twelve roughness classes, family A first.
pub const DEFAULT_CLASSES: [&str; 12] = [
    "A2", "A3", "A4", "A5", "A6", "A7", "B2", "B3", "B4", "B5", "B6", "B7",
];

// ---------------------------------------------------------------------------
// Analysis configuration
// ---------------------------------------------------------------------------

/// Settings for one analysis run.
///
/// Read from `roughness.json` in the dataset root when present:
///
/// ```json
/// {
///   "classes": ["A2", "A3", "B2", "B3"],
///   "images_per_class": 2200,
///   "n_components": 10,
///   "n_plotted": 4
/// }
/// ```
///
/// Missing keys take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Class folder names, in row order.
    pub classes: Vec<String>,
    /// Use only the first `n` images (sorted by name) of every class.
    pub images_per_class: Option<usize>,
    /// Number of principal components to fit.
    pub n_components: usize,
    /// Number of components shown in the scatter matrix and eigen images.
    pub n_plotted: usize,
    /// Bins of the per-class histograms on the scatter-matrix diagonal.
    pub histogram_bins: usize,
    /// Thin each class to at most this many markers per scatter cell.
    pub max_points_per_class: Option<usize>,
    /// Seed of the eigen-solver's random start.
    pub seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            classes: DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
            images_per_class: None,
            n_components: 10,
            n_plotted: 4,
            histogram_bins: 20,
            max_points_per_class: Some(500),
            seed: 42,
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

impl AnalysisConfig {
    /// Load `<root>/roughness.json`, falling back to defaults when absent.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            log::info!("No {CONFIG_FILE_NAME} in {}, using defaults", root.display());
            return Ok(Self::default());
        }
        let config = Self::from_file(&path)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            bail!("configuration lists no classes");
        }
        let mut seen = BTreeSet::new();
        for class in &self.classes {
            if !seen.insert(class.as_str()) {
                bail!("class {class} is listed twice");
            }
        }
        if self.n_components == 0 {
            bail!("n_components must be at least 1");
        }
        if self.n_plotted == 0 || self.n_plotted > self.n_components {
            bail!(
                "n_plotted must be between 1 and n_components ({}), got {}",
                self.n_components,
                self.n_plotted
            );
        }
        if self.histogram_bins == 0 {
            bail!("histogram_bins must be at least 1");
        }
        if self.images_per_class == Some(0) {
            bail!("images_per_class must be at least 1");
        }
        if self.max_points_per_class == Some(0) {
            bail!("max_points_per_class must be at least 1");
        }
        if self.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            bail!("tolerance must be a positive number");
        }
        Ok(())
    }
}
