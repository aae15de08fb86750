//! Testing utilities for ltrkit.
//!
//! Assertion helpers shared by the unit tests and the integration tests
//! under `tests/`.
//!
//! ```ignore
//! use ltrkit::testing::{assert_scores_eq, DEFAULT_TOLERANCE};
//! ```

use approx::AbsDiffEq;

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for floating point comparisons of model scores.
pub const DEFAULT_TOLERANCE: f32 = 1e-5;

/// Same tolerance as f64, for metric values and training statistics.
pub const DEFAULT_TOLERANCE_F64: f64 = 1e-5;

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two f32 values are approximately equal.
///
/// ```
/// # use ltrkit::assert_approx_eq;
/// assert_approx_eq!(1.0f32, 1.0001f32, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f32 = $left;
        let right_val: f32 = $right;
        let tol: f32 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f32 = $left;
        let right_val: f32 = $right;
        let tol: f32 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two f64 values are approximately equal.
///
/// ```
/// # use ltrkit::assert_approx_eq_f64;
/// assert_approx_eq_f64!(31.25, 31.251, 0.01);
/// ```
#[macro_export]
macro_rules! assert_approx_eq_f64 {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two slices of f32 values are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than tolerance.
pub fn assert_slice_approx_eq(actual: &[f32], expected: &[f32], tolerance: f32, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff <= tolerance,
            "{context}[{i}]: {a} ≠ {e} (diff={diff}, tolerance={tolerance})"
        );
    }
}

// =============================================================================
// Score Assertions
// =============================================================================

/// Render the rows whose scores differ, `-` for expected and `+` for actual.
fn diff_scores(actual: &[f32], expected: &[f32], epsilon: f32) -> String {
    let mut result = format!("Rows: {}\nEpsilon: {epsilon:.0e}\n\n", actual.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        if !a.abs_diff_eq(e, epsilon) {
            result.push_str(&format!("[{i:3}] - {e:>12.6}  (expected)\n"));
            result.push_str(&format!("      + {a:>12.6}  (actual, Δ={:+.2e})\n", a - e));
        }
    }
    result
}

/// Assert that per-document scores match, printing a diff of the mismatching rows.
pub fn assert_scores_eq(actual: &[f32], expected: &[f32], epsilon: f32) {
    assert_eq!(actual.len(), expected.len(), "score count mismatch");
    let all_match = actual
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff_eq(e, epsilon));
    if !all_match {
        panic!("scores differ:\n{}", diff_scores(actual, expected, epsilon));
    }
}
