use super::AnalysisError;

/// Equal-width histogram over the range of the data.
///
/// Bins are half-open `[lo, hi)` except the last one, which also holds its
/// right edge, so the maximum is always counted. A constant input is spread
/// over `[v - 0.5, v + 0.5]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<usize>,
}

impl Histogram {
    pub fn new<I>(values: I, bins: usize) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        if bins == 0 {
            return Err(AnalysisError::EmptyHistogram("zero bins"));
        }
        let values = values.into_iter().filter(|v| v.is_finite());

        let (mut lo, mut hi) = values
            .clone()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if lo > hi {
            return Err(AnalysisError::EmptyHistogram("no finite values"));
        }
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

        let mut counts = vec![0; bins];
        for v in values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }

        Ok(Histogram { edges, counts })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn centers(&self) -> impl Iterator<Item = f64> + '_ {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1]))
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn counts_every_value_once() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let h = Histogram::new(values.iter().copied(), 5).unwrap();
        assert_eq!(h.edges().len(), 6);
        assert_eq!(h.counts(), &[2, 2, 2, 2, 3]);
        assert_eq!(h.total(), values.len());
        assert_relative_eq!(h.width(), 2.0);
        assert_eq!(h.centers().collect::<Vec<_>>(), vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn constant_input_gets_unit_range() {
        let h = Histogram::new([4.0, 4.0, 4.0], 4).unwrap();
        assert_relative_eq!(h.edges()[0], 3.5);
        assert_relative_eq!(h.edges()[4], 4.5);
        assert_eq!(h.counts(), &[0, 0, 3, 0]);
    }

    #[test]
    fn ignores_non_finite_and_rejects_empty() {
        let h = Histogram::new([1.0, f64::NAN, 2.0, f64::INFINITY], 2).unwrap();
        assert_eq!(h.counts(), &[1, 1]);

        assert!(Histogram::new(std::iter::empty(), 3).is_err());
        assert!(Histogram::new([f64::NAN], 3).is_err());
        assert!(Histogram::new([1.0], 0).is_err());
    }
}
