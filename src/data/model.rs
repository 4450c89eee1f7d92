use std::fmt;
use std::ops::Range;

use ndarray::Array2;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Problems with the dataset layout or its contents.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("class name '{0}' is not a family letter (A/B) followed by a grade 2-7")]
    InvalidClassName(String),
    #[error("class folder {0} does not exist")]
    MissingClassDir(String),
    #[error("class {class} has {found} images, {expected} requested")]
    TooFewImages {
        class: String,
        found: usize,
        expected: usize,
    },
    #[error("class {0} contains no images")]
    EmptyClass(String),
    #[error("{file}: image is {found} but the dataset shape is {expected}")]
    ShapeMismatch {
        file: String,
        expected: ImageShape,
        found: ImageShape,
    },
    #[error("label {label} is out of range for {n_labels} labels")]
    LabelOutOfRange { label: usize, n_labels: usize },
}

// ---------------------------------------------------------------------------
// Roughness classes
// ---------------------------------------------------------------------------

/// Ra value in µm for grades 2 to 7.
pub const RA_VALUES: [f64; 6] = [0.05, 0.1, 0.2, 0.4, 0.8, 1.6];
pub const MIN_GRADE: u8 = 2;
pub const MAX_GRADE: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    A,
    B,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::A => write!(f, "A"),
            Family::B => write!(f, "B"),
        }
    }
}

/// One labeled roughness category, e.g. `B5` (family B, Ra 0.4 µm).
#[derive(Debug, Clone, PartialEq)]
pub struct RoughnessClass {
    pub name: String,
    pub family: Family,
    pub grade: u8,
    pub ra: f64,
}

impl RoughnessClass {
    pub fn parse(name: &str) -> Result<Self, DatasetError> {
        let invalid = || DatasetError::InvalidClassName(name.to_string());
        // Exactly a family letter and one grade digit.
        let (family, digit) = match name.as_bytes() {
            [b'A', d] => (Family::A, *d),
            [b'B', d] => (Family::B, *d),
            _ => return Err(invalid()),
        };
        if !digit.is_ascii_digit() {
            return Err(invalid());
        }
        let grade = digit - b'0';
        if !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
            return Err(invalid());
        }
        Ok(RoughnessClass {
            name: name.to_string(),
            family,
            grade,
            ra: RA_VALUES[(grade - MIN_GRADE) as usize],
        })
    }

    /// Position of the grade among `2..=7`; shared by both families.
    pub fn grade_index(&self) -> usize {
        (self.grade - MIN_GRADE) as usize
    }
}

// ---------------------------------------------------------------------------
// Image shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of pixels, i.e. the length of a flattened image.
    pub fn len(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

// ---------------------------------------------------------------------------
// ImageDataset – every image flattened into one row
// ---------------------------------------------------------------------------

/// The loaded dataset: one row of raw pixel intensities per image.
///
/// Rows are grouped by class in the order of `classes`, so with the default
/// class list the first half of the rows is family A and the second half
/// family B.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    pub classes: Vec<RoughnessClass>,
    pub shape: ImageShape,
    /// `n_samples × shape.len()` raw intensities.
    pub pixels: Array2<f64>,
    /// Class index of every row.
    pub labels: Vec<usize>,
    /// Source file name of every row.
    pub file_names: Vec<String>,
}

impl ImageDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Row range of class `class_idx`.
    pub fn class_rows(&self, class_idx: usize) -> Range<usize> {
        let start = self.labels.partition_point(|&l| l < class_idx);
        let end = self.labels.partition_point(|&l| l <= class_idx);
        start..end
    }

    /// Class index per row.
    pub fn labels_full(&self) -> &[usize] {
        &self.labels
    }

    /// Grade index for the rows of the first half only.
    pub fn labels_half(&self) -> Vec<usize> {
        let half = self.class_rows(self.n_classes() / 2).start;
        self.labels[..half]
            .iter()
            .map(|&l| self.classes[l].grade_index())
            .collect()
    }

    /// Grade index per row; classes of equal grade share a label.
    pub fn labels_merged(&self) -> Vec<usize> {
        self.labels
            .iter()
            .map(|&l| self.classes[l].grade_index())
            .collect()
    }

    /// The class of a row.
    pub fn class_of(&self, row: usize) -> &RoughnessClass {
        &self.classes[self.labels[row]]
    }
}

/// Dense indicator matrix with one row per label.
pub fn one_hot(labels: &[usize], n_labels: usize) -> Result<Array2<f64>, DatasetError> {
    let mut out = Array2::zeros((labels.len(), n_labels));
    for (row, &label) in labels.iter().enumerate() {
        if label >= n_labels {
            return Err(DatasetError::LabelOutOfRange { label, n_labels });
        }
        out[[row, label]] = 1.0;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CLASSES;

    fn toy_dataset(per_class: usize) -> ImageDataset {
        let classes: Vec<RoughnessClass> = DEFAULT_CLASSES
            .iter()
            .map(|c| RoughnessClass::parse(c).unwrap())
            .collect();
        let n = classes.len() * per_class;
        let labels: Vec<usize> = (0..classes.len())
            .flat_map(|c| std::iter::repeat_n(c, per_class))
            .collect();
        ImageDataset {
            shape: ImageShape::new(1, 2),
            pixels: Array2::from_shape_fn((n, 2), |(r, c)| (r * 2 + c) as f64),
            file_names: (0..n).map(|i| format!("{i:04}.png")).collect(),
            labels,
            classes,
        }
    }

    #[test]
    fn parses_class_names() {
        let c = RoughnessClass::parse("B5").unwrap();
        assert_eq!(c.family, Family::B);
        assert_eq!(c.grade, 5);
        assert_eq!(c.ra, 0.4);
        assert_eq!(c.grade_index(), 3);

        assert_eq!(RoughnessClass::parse("A2").unwrap().ra, 0.05);
        assert_eq!(RoughnessClass::parse("A7").unwrap().ra, 1.6);

        for bad in ["C3", "A1", "A8", "A", "", "Ax", "A+3", "A03", "A 3", "B٣", "a3"] {
            assert!(RoughnessClass::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn label_views_follow_class_order() {
        let ds = toy_dataset(3);
        assert_eq!(ds.len(), 36);
        assert_eq!(ds.class_rows(0), 0..3);
        assert_eq!(ds.class_rows(11), 33..36);

        let half = ds.labels_half();
        assert_eq!(half.len(), 18);
        assert_eq!(&half[..7], &[0, 0, 0, 1, 1, 1, 2]);
        assert_eq!(half[17], 5);

        let merged = ds.labels_merged();
        assert_eq!(merged.len(), 36);
        assert_eq!(merged[0], merged[18]);
        assert_eq!(merged[35], 5);
    }

    #[test]
    fn one_hot_marks_one_column_per_row() {
        let m = one_hot(&[0, 2, 1, 2], 3).unwrap();
        assert_eq!(m.shape(), &[4, 3]);
        assert_eq!(m.row(1).to_vec(), vec![0.0, 0.0, 1.0]);
        assert!(m.rows().into_iter().all(|r| r.sum() == 1.0));

        assert!(matches!(
            one_hot(&[0, 3], 3),
            Err(DatasetError::LabelOutOfRange { label: 3, n_labels: 3 })
        ));
    }
}
