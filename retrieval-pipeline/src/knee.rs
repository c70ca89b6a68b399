//! Knee-point score cutoff. Grounded in
//! `archive_agent/util/knee_detection.py::find_score_cutoff_index`
//! (original_source): the Kneedle algorithm (Satopaa et al.) specialized to
//! a convex, descending curve — the shape every cosine-similarity ranking
//! already has.

/// Finds the cutoff index (exclusive) in a descending-order `scores` slice
/// past which relevance drops off. Returns `None` when there are too few
/// points (`< 3`) or no knee is detected, in which case the caller should
/// keep every point. `min_chunks` floors the returned cutoff.
pub fn find_score_cutoff_index(scores: &[f32], min_chunks: usize, sensitivity: f64) -> Option<usize> {
    let n = scores.len();
    if n < 3 {
        return None;
    }

    let y_min = scores.iter().copied().fold(f64::INFINITY, |a, b| a.min(f64::from(b)));
    let y_max = scores
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, |a, b| a.max(f64::from(b)));
    if (y_max - y_min).abs() < f64::EPSILON {
        return None;
    }

    let x_norm: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    let y_diff: Vec<f64> = scores
        .iter()
        .enumerate()
        .map(|(i, &y)| {
            let y_norm = (f64::from(y) - y_min) / (y_max - y_min);
            (1.0 - y_norm) - x_norm[i]
        })
        .collect();

    let local_maxima: Vec<usize> = (1..n - 1)
        .filter(|&i| y_diff[i] >= y_diff[i - 1] && y_diff[i] >= y_diff[i + 1])
        .collect();
    if local_maxima.is_empty() {
        return None;
    }

    let avg_x_step = 1.0 / (n - 1) as f64;
    let mut knee: Option<usize> = None;

    for &lm in &local_maxima {
        let threshold = y_diff[lm] - sensitivity * avg_x_step;
        let drops_below_threshold = ((lm + 1)..n).any(|j| y_diff[j] < threshold);
        if drops_below_threshold {
            knee = Some(lm);
        }
    }

    knee.map(|k| (k + 1).max(min_chunks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_points_returns_none() {
        assert_eq!(find_score_cutoff_index(&[0.9, 0.5], 1, 1.0), None);
    }

    #[test]
    fn flat_scores_have_no_knee() {
        assert_eq!(find_score_cutoff_index(&[0.5, 0.5, 0.5, 0.5], 1, 1.0), None);
    }

    #[test]
    fn sharp_drop_off_is_detected() {
        let scores = [0.95, 0.94, 0.93, 0.40, 0.38, 0.35, 0.33];
        let cutoff = find_score_cutoff_index(&scores, 1, 1.0);
        assert!(cutoff.is_some());
        let cutoff = cutoff.expect("knee expected");
        assert!(cutoff >= 3 && cutoff <= 5, "unexpected cutoff {cutoff}");
    }

    #[test]
    fn min_chunks_floors_the_cutoff() {
        let scores = [0.95, 0.10, 0.09, 0.08];
        let cutoff = find_score_cutoff_index(&scores, 3, 1.0).expect("knee expected");
        assert!(cutoff >= 3);
    }

    #[test]
    fn gentle_decline_has_no_sharp_knee() {
        let scores = [0.90, 0.85, 0.80, 0.75, 0.70, 0.65];
        assert_eq!(find_score_cutoff_index(&scores, 1, 1.0), None);
    }
}
