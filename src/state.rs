use std::path::PathBuf;

use eframe::egui::{self, TextureHandle};

use crate::analysis::Histogram;
use crate::color::{ColorBy, ColorMap};
use crate::config::{AnalysisConfig, CONFIG_FILE_NAME};
use crate::data::filter::{ClassSelection, init_selection, thin_rows, visible_rows};
use crate::pipeline::{self, AnalysisResult, PipelineEvent, PipelineHandle, PixelUnits, Stage};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Which figure the central panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    ScatterMatrix,
    ExplainedVariance,
    Eigenvectors,
}

/// Reconstruction panel inputs and the textures drawn for them.
pub struct Reconstruction {
    pub row: usize,
    pub n_components: usize,
    pub units: PixelUnits,
    pub textures: Option<ReconstructionTextures>,
}

/// Sample and reconstruction textures, with the inputs they were built for.
pub struct ReconstructionTextures {
    pub row: usize,
    pub n_components: usize,
    pub units: PixelUnits,
    pub sample: TextureHandle,
    pub reconstruction: TextureHandle,
}

impl Reconstruction {
    fn new(n_components: usize) -> Self {
        Self {
            row: 0,
            n_components,
            units: PixelUnits::Raw,
            textures: None,
        }
    }

    /// Whether the cached textures match the current inputs.
    pub fn is_current(&self) -> bool {
        self.textures.as_ref().is_some_and(|t| {
            t.row == self.row && t.n_components == self.n_components && t.units == self.units
        })
    }
}

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Result of the last successful run.
    pub result: Option<AnalysisResult>,

    /// Settings for the next run; display knobs apply immediately.
    pub config: AnalysisConfig,

    /// Classes drawn in the plots.
    pub selection: ClassSelection,

    /// Rows drawn in the scatter matrix (selected and thinned).
    pub visible_rows: Vec<usize>,

    pub color_by: ColorBy,
    pub color_map: Option<ColorMap>,

    /// Per-class histograms of the plotted components: `[component][class]`.
    pub histograms: Vec<Vec<Option<Histogram>>>,

    pub view: View,

    /// Eigenvector images, built on first display.
    pub eigen_textures: Vec<TextureHandle>,

    pub reconstruction: Reconstruction,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    /// Running pipeline, if any.
    pub pipeline: Option<PipelineHandle>,
    pub progress: Option<(Stage, usize, usize)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            result: None,
            config: AnalysisConfig::default(),
            selection: ClassSelection::new(),
            visible_rows: Vec::new(),
            color_by: ColorBy::Class,
            color_map: None,
            histograms: Vec::new(),
            view: View::ScatterMatrix,
            eigen_textures: Vec::new(),
            reconstruction: Reconstruction::new(1),
            status_message: None,
            pipeline: None,
            progress: None,
        }
    }
}

impl AppState {
    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Components shown in the scatter matrix and eigen images.
    pub fn n_plotted(&self) -> usize {
        self.result
            .as_ref()
            .map(|r| self.config.n_plotted.min(r.pca.n_components()))
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Running the pipeline
    // -----------------------------------------------------------------------

    /// Start an analysis of `root`. A `roughness.json` in `root` replaces the
    /// current settings.
    pub fn start_analysis(&mut self, root: PathBuf, ctx: &egui::Context) {
        if root.join(CONFIG_FILE_NAME).is_file() {
            match AnalysisConfig::load_or_default(&root) {
                Ok(config) => self.config = config,
                Err(e) => {
                    log::error!("Invalid configuration: {e:#}");
                    self.status_message = Some(format!("Error: {e:#}"));
                    return;
                }
            }
        }
        self.launch(root, ctx);
    }

    /// Re-run on the folder of the current result with the edited settings.
    pub fn rerun(&mut self, ctx: &egui::Context) {
        if let Some(root) = self.result.as_ref().map(|r| r.root.clone()) {
            self.launch(root, ctx);
        }
    }

    fn launch(&mut self, root: PathBuf, ctx: &egui::Context) {
        if self.is_running() {
            return;
        }
        if let Err(e) = self.config.validate() {
            self.status_message = Some(format!("Error: {e:#}"));
            return;
        }
        match pipeline::spawn(root, self.config.clone(), ctx.clone()) {
            Ok(handle) => {
                self.pipeline = Some(handle);
                self.progress = Some((Stage::Loading, 0, self.config.classes.len()));
                self.status_message = None;
            }
            Err(e) => {
                log::error!("{e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Consume the worker's events.
    pub fn poll_pipeline(&mut self) {
        let Some(handle) = &self.pipeline else {
            return;
        };
        for event in handle.poll() {
            match event {
                PipelineEvent::Progress { stage, done, total } => {
                    self.progress = Some((stage, done, total));
                }
                PipelineEvent::Finished(result) => {
                    self.pipeline = None;
                    self.progress = None;
                    self.set_result(*result);
                    return;
                }
                PipelineEvent::Failed(msg) => {
                    self.pipeline = None;
                    self.progress = None;
                    self.status_message = Some(format!("Error: {msg}"));
                    return;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Derived display state
    // -----------------------------------------------------------------------

    /// Ingest a finished analysis, initialise selection and colour.
    pub fn set_result(&mut self, result: AnalysisResult) {
        log::info!(
            "Showing {} images from {}",
            result.dataset.len(),
            result.root.display()
        );
        self.selection = init_selection(&result.dataset);
        self.eigen_textures.clear();
        self.reconstruction = Reconstruction::new(result.pca.n_components());
        self.result = Some(result);
        self.status_message = None;

        self.rebuild_color_map();
        self.rebuild_histograms();
        self.refilter();
    }

    /// Rebuild the colour map from the current `color_by`.
    pub fn rebuild_color_map(&mut self) {
        self.color_map = self
            .result
            .as_ref()
            .map(|r| ColorMap::new(self.color_by, &r.dataset.classes));
    }

    pub fn set_color_by(&mut self, by: ColorBy) {
        self.color_by = by;
        self.rebuild_color_map();
    }

    /// Recompute the diagonal histograms for the current bin count.
    pub fn rebuild_histograms(&mut self) {
        let n_plotted = self.n_plotted();
        let bins = self.config.histogram_bins.max(1);
        self.histograms = match &self.result {
            Some(r) => (0..n_plotted)
                .map(|component| {
                    (0..r.dataset.n_classes())
                        .map(|class| {
                            let rows = r.dataset.class_rows(class);
                            let values = rows.map(|row| r.projections[[row, component]]);
                            Histogram::new(values, bins).ok()
                        })
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };
    }

    /// Recompute `visible_rows` after a selection or thinning change.
    pub fn refilter(&mut self) {
        if let Some(r) = &self.result {
            let rows = visible_rows(&r.dataset, &self.selection);
            self.visible_rows = thin_rows(&r.dataset, &rows, self.config.max_points_per_class);
        }
    }

    /// Toggle a single class.
    pub fn toggle_class(&mut self, class_idx: usize) {
        if !self.selection.remove(&class_idx) {
            self.selection.insert(class_idx);
        }
        self.refilter();
    }

    pub fn select_all(&mut self) {
        if let Some(r) = &self.result {
            self.selection = init_selection(&r.dataset);
            self.refilter();
        }
    }

    pub fn select_none(&mut self) {
        self.selection.clear();
        self.refilter();
    }

    /// Whether the edited settings differ from those of the shown result in
    /// a way that needs another run.
    pub fn needs_rerun(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.is_stale(&self.config))
    }

    /// The share of variance in the plotted components, as the sentence
    /// shown under the settings.
    pub fn variance_summary(&self) -> Option<String> {
        let r = self.result.as_ref()?;
        let n = self.n_plotted();
        let share = r.pca.cumulative_ratio(n)?;
        Some(format!(
            "The {n} first PCA components contain {:.2}%",
            share * 100.0
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run;
    use crate::pipeline::tests::{small_config, write_textured_dataset};

    fn state_with_result() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let classes = ["A2", "A3", "B2"];
        write_textured_dataset(dir.path(), &classes, 6);
        let config = small_config(&classes);
        let result = run(dir.path(), &config, &|_, _, _| {}).unwrap();

        let mut state = AppState {
            config,
            ..AppState::default()
        };
        state.set_result(result);
        (dir, state)
    }

    #[test]
    fn new_result_selects_everything() {
        let (_dir, state) = state_with_result();
        assert_eq!(state.selection.len(), 3);
        assert_eq!(state.visible_rows.len(), 18);
        assert_eq!(state.histograms.len(), 3);
        assert_eq!(state.histograms[0].len(), 3);
        let h = state.histograms[1][2].as_ref().unwrap();
        assert_eq!(h.total(), 6);
        assert_eq!(h.counts().len(), state.config.histogram_bins);
        assert!(state.color_map.is_some());
        assert!(state.variance_summary().unwrap().starts_with("The 3 first PCA components contain"));
    }

    #[test]
    fn selection_and_thinning_update_rows() {
        let (_dir, mut state) = state_with_result();
        state.toggle_class(1);
        assert_eq!(state.visible_rows.len(), 12);
        assert!(state.visible_rows.iter().all(|&r| !(6..12).contains(&r)));

        state.config.max_points_per_class = Some(2);
        state.refilter();
        assert_eq!(state.visible_rows.len(), 4);

        state.select_none();
        assert!(state.visible_rows.is_empty());
        state.select_all();
        assert_eq!(state.visible_rows.len(), 6);
    }

    #[test]
    fn editing_fit_settings_asks_for_a_rerun() {
        let (_dir, mut state) = state_with_result();
        assert!(!state.needs_rerun());
        state.config.histogram_bins = 5;
        assert!(!state.needs_rerun());
        state.config.seed += 1;
        assert!(state.needs_rerun());
    }

    #[test]
    fn colour_mode_switches() {
        let (_dir, mut state) = state_with_result();
        state.set_color_by(ColorBy::Family);
        let map = state.color_map.as_ref().unwrap();
        assert_eq!(map.by, ColorBy::Family);
        assert_eq!(map.color_for(0), map.color_for(1));
    }
}
