use eframe::egui::{self, Color32, TextureOptions, Ui, Vec2};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Bar, BarChart, Line, MarkerShape, Plot, PlotPoints, Points};

use crate::color::{eigen_image, grayscale_image};
use crate::pipeline::PixelUnits;
use crate::state::{AppState, ReconstructionTextures, View};

// ---------------------------------------------------------------------------
// Central panel
// ---------------------------------------------------------------------------

/// Render the selected figure in the central panel.
pub fn central_view(ui: &mut Ui, state: &mut AppState) {
    if state.result.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            let text = if state.is_running() {
                "Analysing…"
            } else {
                "Open a dataset folder to start  (File → Open dataset folder…)"
            };
            ui.heading(text);
        });
        return;
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.selectable_value(&mut state.view, View::ScatterMatrix, "Scatter matrix");
        ui.selectable_value(&mut state.view, View::ExplainedVariance, "Explained variance");
        ui.selectable_value(&mut state.view, View::Eigenvectors, "Eigenvectors");
    });
    ui.separator();

    match state.view {
        View::ScatterMatrix => scatter_matrix(ui, state),
        View::ExplainedVariance => explained_variance(ui, state),
        View::Eigenvectors => eigenvectors(ui, state),
    }
}

// ---------------------------------------------------------------------------
// Scatter plot matrix of the PCA projections
// ---------------------------------------------------------------------------

/// `N × N` grid: component `col` against component `row` off the diagonal,
/// per-class histograms of component `col` on it.
fn scatter_matrix(ui: &mut Ui, state: &AppState) {
    let (Some(result), Some(color_map)) = (&state.result, &state.color_map) else {
        return;
    };
    let n = state.n_plotted();
    if n == 0 {
        return;
    }

    let label_width = 48.0;
    let spacing = 4.0;
    let available = ui.available_size() - Vec2::new(label_width, 24.0);
    let cell = ((available.x.min(available.y) - spacing * n as f32) / n as f32).max(60.0);

    // Visible rows grouped by class, as drawn in every off-diagonal cell.
    let labels = &result.dataset.labels;
    let groups: Vec<&[usize]> = state
        .visible_rows
        .chunk_by(|&a, &b| labels[a] == labels[b])
        .collect();

    egui::ScrollArea::both().show(ui, |ui: &mut Ui| {
        egui::Grid::new("scatter_matrix")
            .spacing([spacing, spacing])
            .show(ui, |ui: &mut Ui| {
                for row in 0..n {
                    ui.label(format!("PCA {}", row + 1));
                    for col in 0..n {
                        let plot = Plot::new(("scatter_cell", row, col))
                            .width(cell)
                            .height(cell)
                            .show_axes(false)
                            .show_grid(false)
                            .show_x(false)
                            .show_y(false)
                            .allow_drag(false)
                            .allow_zoom(false)
                            .allow_scroll(false)
                            .allow_boxed_zoom(false);

                        plot.show(ui, |plot_ui| {
                            if row == col {
                                let hists = state.histograms.get(col).map(Vec::as_slice).unwrap_or(&[]);
                                for (class, hist) in hists.iter().enumerate() {
                                    let Some(hist) = hist else { continue };
                                    if !state.selection.contains(&class) {
                                        continue;
                                    }
                                    let bars: Vec<Bar> = hist
                                        .centers()
                                        .zip(hist.counts())
                                        .map(|(x, &count)| Bar::new(x, count as f64).width(hist.width()))
                                        .collect();
                                    plot_ui.bar_chart(
                                        BarChart::new(bars).color(color_map.color_for(class)),
                                    );
                                }
                            } else {
                                for group in &groups {
                                    let class = labels[group[0]];
                                    let points: PlotPoints = group
                                        .iter()
                                        .map(|&r| {
                                            [result.projections[[r, col]], result.projections[[r, row]]]
                                        })
                                        .collect();
                                    plot_ui.points(
                                        Points::new(points)
                                            .shape(MarkerShape::Circle)
                                            .radius(1.5)
                                            .color(color_map.color_for(class).gamma_multiply(0.5)),
                                    );
                                }
                                // Class means on top of the markers.
                                for &class in &state.selection {
                                    let centroid = result.class_centroids.row(class);
                                    plot_ui.points(
                                        Points::new(vec![[centroid[col], centroid[row]]])
                                            .shape(MarkerShape::Diamond)
                                            .filled(true)
                                            .radius(5.0)
                                            .color(color_map.color_for(class)),
                                    );
                                }
                            }
                        });
                    }
                    ui.end_row();
                }

                ui.label("");
                for col in 0..n {
                    ui.vertical_centered(|ui: &mut Ui| {
                        ui.label(format!("PCA {}", col + 1));
                    });
                }
                ui.end_row();
            });
    });
}

// ---------------------------------------------------------------------------
// Explained variance
// ---------------------------------------------------------------------------

fn explained_variance(ui: &mut Ui, state: &AppState) {
    let Some(result) = &state.result else {
        return;
    };
    let (Some(ratio), Some(variance)) = (
        result.pca.explained_variance_ratio(),
        result.pca.explained_variance(),
    ) else {
        return;
    };

    let percent: Vec<[f64; 2]> = ratio
        .iter()
        .enumerate()
        .map(|(i, r)| [(i + 1) as f64, r * 100.0])
        .collect();

    Plot::new("explained_variance")
        .height(ui.available_height() * 0.6)
        .x_axis_label("PCA component")
        .y_axis_label("Explained variance [%]")
        .show_grid(true)
        .allow_boxed_zoom(true)
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new(PlotPoints::from(percent.clone())).color(Color32::LIGHT_BLUE).width(1.5));
            plot_ui.points(Points::new(PlotPoints::from(percent)).radius(3.0).color(Color32::LIGHT_BLUE));
        });

    ui.separator();
    if let (Some(total), Some(iterations)) = (result.pca.total_variance(), result.pca.n_iterations()) {
        ui.label(format!(
            "Total variance {total:.1} over {} pixels, {iterations} solver iterations",
            result.dataset.shape.len()
        ));
    }

    let mut cumulative = 0.0;
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::auto().at_least(90.0))
        .columns(Column::remainder(), 3)
        .header(20.0, |mut header| {
            for title in ["Component", "Eigenvalue", "Explained [%]", "Cumulative [%]"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for (i, (r, v)) in ratio.iter().zip(variance.iter()).enumerate() {
                cumulative += r;
                body.row(18.0, |mut row| {
                    row.col(|ui| {
                        ui.label(format!("PCA {}", i + 1));
                    });
                    row.col(|ui| {
                        ui.label(format!("{v:.3}"));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", r * 100.0));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", cumulative * 100.0));
                    });
                });
            }
        });
}

// ---------------------------------------------------------------------------
// Eigenvector images and reconstructions
// ---------------------------------------------------------------------------

fn eigenvectors(ui: &mut Ui, state: &mut AppState) {
    let n = state.n_plotted();
    let Some(result) = &state.result else {
        return;
    };
    let shape = result.dataset.shape;

    if state.eigen_textures.len() != n {
        state.eigen_textures.clear();
        for i in 0..n {
            match result.pca.component_image(i, shape) {
                Ok(values) => {
                    let image = eigen_image(values.view(), 0.0);
                    state.eigen_textures.push(ui.ctx().load_texture(
                        format!("eigenvector_{i}"),
                        image,
                        TextureOptions::NEAREST,
                    ));
                }
                Err(e) => {
                    log::error!("Cannot render eigenvector {}: {e}", i + 1);
                    break;
                }
            }
        }
    }

    let aspect = shape.height as f32 / shape.width.max(1) as f32;
    let width = ((ui.available_width() - 12.0 * n as f32) / n.max(1) as f32).clamp(64.0, 320.0);
    let size = Vec2::new(width, width * aspect);

    ui.horizontal_wrapped(|ui: &mut Ui| {
        for (i, texture) in state.eigen_textures.iter().enumerate() {
            ui.vertical(|ui: &mut Ui| {
                ui.label(format!("PCA Eigenvector {}", i + 1));
                ui.add(egui::Image::new(texture).fit_to_exact_size(size));
            });
        }
    });

    ui.separator();
    reconstruction(ui, state);
}

fn reconstruction(ui: &mut Ui, state: &mut AppState) {
    let Some(result) = &state.result else {
        return;
    };
    let n_samples = result.dataset.len();
    let n_fitted = result.pca.n_components();
    let rec = &mut state.reconstruction;

    ui.strong("Reconstruction");
    ui.horizontal(|ui: &mut Ui| {
        ui.label("Sample");
        ui.add(egui::DragValue::new(&mut rec.row).range(0..=n_samples.saturating_sub(1)));
        ui.label("Components");
        ui.add(egui::DragValue::new(&mut rec.n_components).range(1..=n_fitted.max(1)));
        ui.selectable_value(&mut rec.units, PixelUnits::Raw, "Raw");
        ui.selectable_value(&mut rec.units, PixelUnits::Standardized, "Standardized");
        let class = result.dataset.class_of(rec.row);
        ui.label(format!(
            "{} / {} (Ra {} µm)",
            class.name, result.dataset.file_names[rec.row], class.ra
        ));
    });

    if !rec.is_current() {
        let images = result
            .sample_image(rec.row, rec.units)
            .and_then(|sample| Ok((sample, result.reconstruct(rec.row, rec.n_components, rec.units)?)));
        match images {
            Ok((sample, recon)) => {
                let ctx = ui.ctx();
                rec.textures = Some(ReconstructionTextures {
                    row: rec.row,
                    n_components: rec.n_components,
                    units: rec.units,
                    sample: ctx.load_texture("sample", grayscale_image(sample.view()), TextureOptions::NEAREST),
                    reconstruction: ctx.load_texture(
                        "reconstruction",
                        grayscale_image(recon.view()),
                        TextureOptions::NEAREST,
                    ),
                });
            }
            Err(e) => {
                log::error!("Cannot reconstruct sample {}: {e:#}", rec.row);
                rec.textures = None;
            }
        }
    }

    let shape = result.dataset.shape;
    let aspect = shape.height as f32 / shape.width.max(1) as f32;
    let width = (ui.available_width() / 2.0 - 12.0).clamp(64.0, 320.0);
    let size = Vec2::new(width, width * aspect);

    if let Some(textures) = &rec.textures {
        ui.horizontal(|ui: &mut Ui| {
            ui.vertical(|ui: &mut Ui| {
                ui.label("Sample");
                ui.add(egui::Image::new(&textures.sample).fit_to_exact_size(size));
            });
            ui.vertical(|ui: &mut Ui| {
                ui.label(format!("From {} components", textures.n_components));
                ui.add(egui::Image::new(&textures.reconstruction).fit_to_exact_size(size));
            });
        });
    }
}
