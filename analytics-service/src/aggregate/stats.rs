use crate::error::AnalyticsError;

/// Rejects percentiles outside [0, 1] (and NaN).
pub fn check_percentile(p: f64) -> Result<(), AnalyticsError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(AnalyticsError::range(format!("percentile {p} outside [0, 1]")))
    }
}

/// Continuous percentile with linear interpolation between order statistics.
///
/// The input does not need to be sorted; a sorted copy is made internally.
/// With `n` values the rank is `p * (n - 1)` and the result interpolates
/// between the values at `floor(rank)` and `ceil(rank)`.
pub fn compute_percentile(values: &[f64], p: f64) -> Result<f64, AnalyticsError> {
    check_percentile(p)?;
    if values.is_empty() {
        return Err(AnalyticsError::empty("percentile of an empty sequence"));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Running arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl FromIterator<f64> for Mean {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut mean = Mean::default();
        for v in iter {
            mean.push(v);
        }
        mean
    }
}
