use std::cmp::Ordering;

use packedforest::Feature;

/// The cut separating projected values into two groups with the least squared error
///
/// A group error within rounding of the group's own magnitude is reported as exactly zero, so a
/// group of equal values is pure whatever the scale of its values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoMeansSplit<F> {
    /// Summed squared distance of every value to the mean of its group
    pub error: f64,
    pub cut_value: F,
    pub left_error: f64,
    pub right_error: f64,
}

/// Finds the best two-means cut of `values`, sorting them in place
///
/// Cuts are only placed between neighbours which differ, at their [`Feature::split_point`].
/// Returns `None` if all values are equal.
pub fn two_means_split<F: Feature>(values: &mut [F]) -> Option<TwoMeansSplit<F>> {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = values.len();
    if n < 2 || !values[0].differs(values[n - 1]) {
        return None;
    }

    // errors do not depend on the offset, centring on the smallest value limits cancellation
    let offset = values[0].as_f64();
    let (total_sum, total_squares) = values.iter().fold((0.0, 0.0), |(sum, squares), v| {
        let v = v.as_f64() - offset;
        (sum + v, squares + v * v)
    });

    let mut best: Option<TwoMeansSplit<F>> = None;
    let (mut left_sum, mut left_squares) = (0.0, 0.0);
    for (idx, window) in values.windows(2).enumerate() {
        let v = window[0].as_f64() - offset;
        left_sum += v;
        left_squares += v * v;
        if !window[0].differs(window[1]) {
            continue;
        }

        let left_size = (idx + 1) as f64;
        let right_size = (n - idx - 1) as f64;
        let left_error = group_error(left_sum, left_squares, left_size);
        let right_error =
            group_error(total_sum - left_sum, total_squares - left_squares, right_size);
        let error = left_error + right_error;

        if best.map_or(true, |b| error < b.error) {
            best = Some(TwoMeansSplit {
                error,
                cut_value: window[0].split_point(window[1]),
                left_error,
                right_error,
            });
        }
    }
    best
}

/// Squared error of a group from its sum and sum of squares
fn group_error(sum: f64, squares: f64, size: f64) -> f64 {
    let error = squares - sum * sum / size;
    if error <= f64::EPSILON * 4.0 * size * squares {
        0.0
    } else {
        error
    }
}
