use std::str::FromStr;

use eframe::egui::{Color32, ColorImage};
use ndarray::ArrayView2;
use palette::{Hsl, IntoColor, Mix, Srgb};

use crate::config::DEFAULT_CLASSES;
use crate::data::model::{Family, RA_VALUES, RoughnessClass};

/// Colours of the default classes: reds to yellows for A2–A7, light to dark
/// blues for B2–B7.
pub const CLASS_COLORS: [&str; 12] = [
    "#8b0000", "#ff0000", "#ff5a00", "#ff9a00", "#ffce00", "#f0ff00",
    "#66d4ff", "#00b8ff", "#009bd6", "#00719c", "#00415a", "#001f2b",
];

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            to_color32(rgb)
        })
        .collect()
}

/// Parse `#rrggbb`.
pub fn hex_color(hex: &str) -> Option<Color32> {
    let rgb = Srgb::<u8>::from_str(hex).ok()?;
    Some(Color32::from_rgb(rgb.red, rgb.green, rgb.blue))
}

fn to_color32(rgb: Srgb<f32>) -> Color32 {
    let rgb: Srgb<u8> = rgb.into_format();
    Color32::from_rgb(rgb.red, rgb.green, rgb.blue)
}

// ---------------------------------------------------------------------------
// Color mapping: class → Color32
// ---------------------------------------------------------------------------

/// What the class colour encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorBy {
    Class,
    Family,
    Grade,
}

impl ColorBy {
    pub const ALL: [ColorBy; 3] = [ColorBy::Class, ColorBy::Family, ColorBy::Grade];

    pub fn label(&self) -> &'static str {
        match self {
            ColorBy::Class => "Class",
            ColorBy::Family => "Family",
            ColorBy::Grade => "Roughness grade",
        }
    }
}

/// Colour of every class under one [`ColorBy`] mode, plus its legend.
#[derive(Debug, Clone)]
pub struct ColorMap {
    pub by: ColorBy,
    class_colors: Vec<Color32>,
    legend: Vec<(String, Color32)>,
}

impl ColorMap {
    pub fn new(by: ColorBy, classes: &[RoughnessClass]) -> Self {
        let (class_colors, legend) = match by {
            ColorBy::Class => {
                let fallback = generate_palette(classes.len());
                let colors: Vec<Color32> = classes
                    .iter()
                    .zip(fallback)
                    .map(|(class, fallback)| fixed_class_color(&class.name).unwrap_or(fallback))
                    .collect();
                let legend = classes
                    .iter()
                    .zip(&colors)
                    .map(|(c, &col)| (c.name.clone(), col))
                    .collect();
                (colors, legend)
            }
            ColorBy::Family => {
                let family_color = |f: Family| {
                    let hex = match f {
                        Family::A => CLASS_COLORS[1],
                        Family::B => CLASS_COLORS[7],
                    };
                    hex_color(hex).unwrap_or(Color32::GRAY)
                };
                let colors = classes.iter().map(|c| family_color(c.family)).collect();
                let mut families: Vec<Family> = classes.iter().map(|c| c.family).collect();
                families.sort();
                families.dedup();
                let legend = families
                    .into_iter()
                    .map(|f| (format!("Family {f}"), family_color(f)))
                    .collect();
                (colors, legend)
            }
            ColorBy::Grade => {
                let palette = generate_palette(RA_VALUES.len());
                let colors = classes.iter().map(|c| palette[c.grade_index()]).collect();
                let legend = RA_VALUES
                    .iter()
                    .zip(&palette)
                    .enumerate()
                    .filter(|(i, _)| classes.iter().any(|c| c.grade_index() == *i))
                    .map(|(_, (ra, &col))| (format!("Ra {ra} µm"), col))
                    .collect();
                (colors, legend)
            }
        };

        ColorMap {
            by,
            class_colors,
            legend,
        }
    }

    /// Look up the colour of a class index.
    pub fn color_for(&self, class_idx: usize) -> Color32 {
        self.class_colors
            .get(class_idx)
            .copied()
            .unwrap_or(Color32::GRAY)
    }

    /// Return the legend entries (label → colour) for the UI.
    pub fn legend_entries(&self) -> &[(String, Color32)] {
        &self.legend
    }
}

fn fixed_class_color(name: &str) -> Option<Color32> {
    let idx = DEFAULT_CLASSES.iter().position(|c| *c == name)?;
    hex_color(CLASS_COLORS[idx])
}

// ---------------------------------------------------------------------------
// Divergent colormap for eigen images
// ---------------------------------------------------------------------------

/// Linear normalization that puts `midpoint` at the centre of the colormap.
///
/// `vmin → 0`, `midpoint → 0.5`, `vmax → 1`, each side interpolated
/// separately and clamped outside `[vmin, vmax]`. A side with no extent
/// (e.g. `vmin == midpoint`) collapses to 0.5.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidpointNormalize {
    pub vmin: f64,
    pub vmax: f64,
    pub midpoint: f64,
}

impl MidpointNormalize {
    pub fn new(vmin: f64, vmax: f64, midpoint: f64) -> Self {
        Self { vmin, vmax, midpoint }
    }

    /// Take `vmin`/`vmax` from the finite values of the data.
    pub fn from_values(values: impl IntoIterator<Item = f64>, midpoint: f64) -> Self {
        let (vmin, vmax) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((midpoint, midpoint), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Self::new(vmin, vmax, midpoint)
    }

    pub fn normalize(&self, v: f64) -> f64 {
        if v.is_nan() {
            return 0.5;
        }
        if v <= self.midpoint {
            if self.midpoint > self.vmin {
                (0.5 * (v - self.vmin) / (self.midpoint - self.vmin)).clamp(0.0, 0.5)
            } else {
                0.5
            }
        } else if self.vmax > self.midpoint {
            (0.5 + 0.5 * (v - self.midpoint) / (self.vmax - self.midpoint)).clamp(0.5, 1.0)
        } else {
            0.5
        }
    }
}

/// Blue–white–red colormap on `[0, 1]`.
pub fn bwr(t: f64) -> Color32 {
    let blue = Srgb::new(0.0f32, 0.0, 1.0);
    let white = Srgb::new(1.0f32, 1.0, 1.0);
    let red = Srgb::new(1.0f32, 0.0, 0.0);
    let t = t.clamp(0.0, 1.0) as f32;
    let rgb = if t <= 0.5 {
        blue.mix(white, t * 2.0)
    } else {
        white.mix(red, (t - 0.5) * 2.0)
    };
    to_color32(rgb)
}

/// Render a signed image with [`bwr`], white at `midpoint`.
pub fn eigen_image(values: ArrayView2<f64>, midpoint: f64) -> ColorImage {
    let (height, width) = values.dim();
    let norm = MidpointNormalize::from_values(values.iter().copied(), midpoint);
    let rgb: Vec<u8> = values
        .iter()
        .flat_map(|&v| {
            let c = bwr(norm.normalize(v));
            [c.r(), c.g(), c.b()]
        })
        .collect();
    ColorImage::from_rgb([width, height], &rgb)
}

/// Render an image in gray levels, min–max scaled.
pub fn grayscale_image(values: ArrayView2<f64>) -> ColorImage {
    let (height, width) = values.dim();
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    let gray: Vec<u8> = values
        .iter()
        .map(|&v| {
            if range > 0.0 && v.is_finite() {
                ((v - lo) / range * 255.0).round() as u8
            } else {
                0
            }
        })
        .collect();
    ColorImage::from_gray([width, height], &gray)
}
