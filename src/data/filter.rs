use std::collections::BTreeSet;

use super::model::ImageDataset;

// ---------------------------------------------------------------------------
// Class selection: which classes are drawn
// ---------------------------------------------------------------------------

/// Selected class indices. An empty set hides everything.
pub type ClassSelection = BTreeSet<usize>;

/// Initialise a [`ClassSelection`] with every class selected.
pub fn init_selection(dataset: &ImageDataset) -> ClassSelection {
    (0..dataset.n_classes()).collect()
}

/// Row indices whose class is selected, in row order.
pub fn visible_rows(dataset: &ImageDataset, selection: &ClassSelection) -> Vec<usize> {
    if selection.len() == dataset.n_classes() {
        return (0..dataset.len()).collect();
    }
    dataset
        .labels
        .iter()
        .enumerate()
        .filter(|(_, label)| selection.contains(label))
        .map(|(i, _)| i)
        .collect()
}

/// Keep at most `max` evenly strided rows of every class.
///
/// `rows` must be grouped by class, as returned by [`visible_rows`].
pub fn thin_rows(dataset: &ImageDataset, rows: &[usize], max: Option<usize>) -> Vec<usize> {
    let Some(max) = max else {
        return rows.to_vec();
    };
    let mut out = Vec::with_capacity(rows.len().min(max * dataset.n_classes()));
    for group in rows.chunk_by(|&a, &b| dataset.labels[a] == dataset.labels[b]) {
        if group.len() <= max {
            out.extend_from_slice(group);
        } else {
            let step = group.len() as f64 / max as f64;
            out.extend((0..max).map(|i| group[(i as f64 * step) as usize]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ImageShape, RoughnessClass};
    use ndarray::Array2;

    fn dataset(per_class: usize) -> ImageDataset {
        let classes: Vec<RoughnessClass> = ["A2", "A3", "B2"]
            .iter()
            .map(|c| RoughnessClass::parse(c).unwrap())
            .collect();
        let labels: Vec<usize> = (0..3)
            .flat_map(|c| std::iter::repeat_n(c, per_class))
            .collect();
        ImageDataset {
            shape: ImageShape::new(1, 1),
            pixels: Array2::zeros((labels.len(), 1)),
            file_names: vec![String::new(); labels.len()],
            labels,
            classes,
        }
    }

    #[test]
    fn all_selected_shows_every_row() {
        let ds = dataset(4);
        let sel = init_selection(&ds);
        assert_eq!(visible_rows(&ds, &sel), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn hides_unselected_classes() {
        let ds = dataset(2);
        let sel: ClassSelection = [0, 2].into_iter().collect();
        assert_eq!(visible_rows(&ds, &sel), vec![0, 1, 4, 5]);
        assert!(visible_rows(&ds, &ClassSelection::new()).is_empty());
    }

    #[test]
    fn thins_each_class_separately() {
        let ds = dataset(10);
        let rows = visible_rows(&ds, &init_selection(&ds));

        let thinned = thin_rows(&ds, &rows, Some(5));
        assert_eq!(thinned.len(), 15);
        assert_eq!(&thinned[..5], &[0, 2, 4, 6, 8]);
        assert_eq!(&thinned[5..7], &[10, 12]);

        assert_eq!(thin_rows(&ds, &rows, Some(20)), rows);
        assert_eq!(thin_rows(&ds, &rows, None), rows);
    }
}
