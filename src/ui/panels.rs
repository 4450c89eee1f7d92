use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::color::ColorBy;
use crate::export::export_projections;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – settings and class widgets
// ---------------------------------------------------------------------------

/// Render the left panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            settings_section(ui, state);
            ui.separator();

            if state.result.is_none() {
                ui.label("No dataset loaded.");
                return;
            }

            // ---- Colour-by selector ----
            ui.strong("Color by");
            let current = state.color_by;
            egui::ComboBox::from_id_salt("color_by")
                .selected_text(current.label())
                .show_ui(ui, |ui: &mut Ui| {
                    for by in ColorBy::ALL {
                        if ui.selectable_label(current == by, by.label()).clicked() {
                            state.set_color_by(by);
                        }
                    }
                });
            ui.separator();

            class_section(ui, state);

            if state.color_by != ColorBy::Class {
                ui.separator();
                legend(ui, state);
            }

            if let Some(summary) = state.variance_summary() {
                ui.separator();
                ui.label(summary);
            }
        });
}

fn settings_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Analysis");

    let mut plotted_changed = false;
    let mut thinning_changed = false;

    egui::Grid::new("settings_grid")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Components");
            ui.add(egui::DragValue::new(&mut state.config.n_components).range(1..=50));
            ui.end_row();

            ui.label("Plotted (N)");
            let max_plotted = state.config.n_components.max(1);
            plotted_changed |= ui
                .add(egui::DragValue::new(&mut state.config.n_plotted).range(1..=max_plotted))
                .changed();
            ui.end_row();

            ui.label("Histogram bins");
            plotted_changed |= ui
                .add(egui::DragValue::new(&mut state.config.histogram_bins).range(1..=200))
                .changed();
            ui.end_row();

            ui.label("Points / class");
            ui.horizontal(|ui: &mut Ui| {
                let mut thin = state.config.max_points_per_class.is_some();
                if ui.checkbox(&mut thin, "").changed() {
                    state.config.max_points_per_class = thin.then_some(500);
                    thinning_changed = true;
                }
                if let Some(max) = &mut state.config.max_points_per_class {
                    thinning_changed |= ui
                        .add(egui::DragValue::new(max).range(1..=100_000))
                        .changed();
                } else {
                    ui.label("all");
                }
            });
            ui.end_row();
        });

    // Keep N valid when the component count shrinks.
    if state.config.n_plotted > state.config.n_components {
        state.config.n_plotted = state.config.n_components;
        plotted_changed = true;
    }
    if plotted_changed {
        state.eigen_textures.clear();
        state.rebuild_histograms();
    }
    if thinning_changed {
        state.refilter();
    }

    let can_rerun = state.result.is_some() && !state.is_running();
    if ui
        .add_enabled(can_rerun, egui::Button::new("Run again"))
        .on_hover_text("Reload the current folder with these settings")
        .clicked()
    {
        state.rerun(ui.ctx());
    }
    if state.needs_rerun() && !state.is_running() {
        ui.label(RichText::new("Settings changed since the last run").color(Color32::YELLOW));
    }
}

fn class_section(ui: &mut Ui, state: &mut AppState) {
    let Some(result) = &state.result else {
        return;
    };
    let classes: Vec<(usize, String, usize)> = result
        .dataset
        .classes
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.name.clone(), result.dataset.class_rows(i).len()))
        .collect();

    let header_text = format!("Classes  ({}/{})", state.selection.len(), classes.len());
    egui::CollapsingHeader::new(RichText::new(header_text).strong())
        .id_salt("classes")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.small_button("All").clicked() {
                    state.select_all();
                }
                if ui.small_button("None").clicked() {
                    state.select_none();
                }
            });

            for (idx, name, count) in &classes {
                let mut text = RichText::new(format!("{name}  ({count})"));
                if let Some(cm) = &state.color_map {
                    text = text.color(cm.color_for(*idx));
                }
                let mut checked = state.selection.contains(idx);
                if ui.checkbox(&mut checked, text).changed() {
                    state.toggle_class(*idx);
                }
            }
        });
}

fn legend(ui: &mut Ui, state: &AppState) {
    let Some(cm) = &state.color_map else {
        return;
    };
    ui.strong("Legend");
    for (label, color) in cm.legend_entries() {
        ui.label(RichText::new(format!("● {label}")).color(*color));
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui
                .add_enabled(!state.is_running(), egui::Button::new("Open dataset folder…"))
                .clicked()
            {
                open_folder_dialog(ui.ctx(), state);
                ui.close_menu();
            }
            if ui
                .add_enabled(state.result.is_some(), egui::Button::new("Export projections…"))
                .clicked()
            {
                export_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(r) = &state.result {
            ui.label(format!(
                "{} images of {} px, {} classes, {} components",
                r.dataset.len(),
                r.dataset.shape,
                r.dataset.n_classes(),
                r.pca.n_components()
            ));
        }

        if let Some((stage, done, total)) = state.progress {
            ui.separator();
            let fraction = if total > 0 { done as f32 / total as f32 } else { 0.0 };
            ui.add(
                egui::ProgressBar::new(fraction)
                    .desired_width(200.0)
                    .text(format!("{stage}… {done}/{total}"))
                    .animate(true),
            );
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_folder_dialog(ctx: &egui::Context, state: &mut AppState) {
    let folder = rfd::FileDialog::new()
        .set_title("Open roughness dataset folder")
        .pick_folder();

    if let Some(root) = folder {
        log::info!("Opening dataset {}", root.display());
        state.start_analysis(root, ctx);
    }
}

pub fn export_dialog(state: &mut AppState) {
    let Some(result) = &state.result else {
        return;
    };
    let file = rfd::FileDialog::new()
        .set_title("Export PCA projections")
        .set_file_name("projections.csv")
        .add_filter("CSV", &["csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .save_file();

    if let Some(path) = file {
        match export_projections(&path, result) {
            Ok(()) => state.status_message = None,
            Err(e) => {
                log::error!("Failed to export projections: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
}
