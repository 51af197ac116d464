//! Signal primitives for irregularly sampled mass traces
//!
//! Scans return `Option<usize>` and never look before their `from` index.

/// Trailing moving average over `window` samples.
///
/// The first `window − 1` outputs average the samples seen so far, so the
/// result is finite everywhere. `window <= 1` returns the input unchanged.
pub fn trailing_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Time derivative by centered differences, one-sided at both endpoints
pub fn derivative(values: &[f64], time: &[f64]) -> Vec<f64> {
    let n = values.len().min(time.len());
    if n < 2 {
        return vec![0.0; n];
    }

    (0..n)
        .map(|i| {
            let (lo, hi) = if i == 0 {
                (0, 1)
            } else if i == n - 1 {
                (n - 2, n - 1)
            } else {
                (i - 1, i + 1)
            };
            (values[hi] - values[lo]) / (time[hi] - time[lo])
        })
        .collect()
}

/// Largest absolute value, 0 for an empty slice
pub fn peak_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Median of a slice
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Mass just before a segment: median of `values[start-2 .. start)`.
///
/// Falls back to `values[start]` when no earlier sample exists.
pub fn mass_before(values: &[f64], start: usize) -> f64 {
    let lo = start.saturating_sub(2);
    median(&values[lo..start.min(values.len())]).unwrap_or_else(|| values[start])
}

/// Mass at the close of a segment: median of `values[end .. end+2)`
pub fn mass_after(values: &[f64], end: usize) -> f64 {
    let hi = (end + 2).min(values.len());
    median(&values[end..hi]).unwrap_or_else(|| values[values.len() - 1])
}

/// First index `i >= from` with `pred(values[i])`
pub fn first_index_from(values: &[f64], from: usize, pred: impl Fn(f64) -> bool) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| pred(**v))
        .map(|(i, _)| i)
}

/// First index `r >= from` that opens a run of `run_len` samples where both
/// derivatives are within their thresholds.
pub fn first_quiet_run(
    first: &[f64],
    second: &[f64],
    first_threshold: f64,
    second_threshold: f64,
    from: usize,
    run_len: usize,
) -> Option<usize> {
    let n = first.len().min(second.len());
    let run_len = run_len.max(1);
    let is_quiet = |i: usize| first[i].abs() <= first_threshold && second[i].abs() <= second_threshold;

    let mut run_start = from;
    let mut run = 0;
    for i in from..n {
        if is_quiet(i) {
            if run == 0 {
                run_start = i;
            }
            run += 1;
            if run == run_len {
                return Some(run_start);
            }
        } else {
            run = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_one_is_identity() {
        let v = vec![1.0, 5.0, 2.0];
        assert_eq!(trailing_moving_average(&v, 1), v);
    }

    #[test]
    fn test_trailing_average_warm_up() {
        let v = vec![3.0, 6.0, 9.0, 12.0];
        let avg = trailing_moving_average(&v, 3);
        assert_eq!(avg, vec![3.0, 4.5, 6.0, 9.0]);
    }

    #[test]
    fn test_derivative_endpoints_and_center() {
        let t = vec![0.0, 1.0, 3.0, 4.0];
        let m = vec![0.0, 1.0, 5.0, 5.0];
        let d = derivative(&m, &t);
        assert_eq!(d[0], 1.0);
        assert_eq!(d[1], 5.0 / 3.0);
        assert_eq!(d[2], 4.0 / 3.0);
        assert_eq!(d[3], 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0]), Some(2.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_boundary_masses_clamp() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(mass_before(&v, 0), 1.0);
        assert_eq!(mass_before(&v, 1), 1.0);
        assert_eq!(mass_before(&v, 3), 2.5);
        assert_eq!(mass_after(&v, 3), 4.0);
        assert_eq!(mass_after(&v, 1), 2.5);
    }

    #[test]
    fn test_first_index_respects_from() {
        let v = vec![5.0, 0.0, 5.0];
        assert_eq!(first_index_from(&v, 0, |x| x > 1.0), Some(0));
        assert_eq!(first_index_from(&v, 1, |x| x > 1.0), Some(2));
        assert_eq!(first_index_from(&v, 3, |x| x > 1.0), None);
    }

    #[test]
    fn test_quiet_run_requires_consecutive_samples() {
        let d1 = vec![1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let d2 = vec![0.0; 6];
        assert_eq!(first_quiet_run(&d1, &d2, 0.5, 0.5, 0, 1), Some(1));
        assert_eq!(first_quiet_run(&d1, &d2, 0.5, 0.5, 0, 2), Some(3));
        assert_eq!(first_quiet_run(&d1, &d2, 0.5, 0.5, 0, 4), None);
    }

    #[test]
    fn test_quiet_run_checks_both_derivatives() {
        let d1 = vec![0.0; 4];
        let d2 = vec![1.0, 1.0, 0.0, 0.0];
        assert_eq!(first_quiet_run(&d1, &d2, 0.5, 0.5, 0, 2), Some(2));
    }
}
