//! Stable natural-run merge sort returning index permutations.
//!
//! Ranking code sorts documents by score or label many times per round and
//! relies on ties keeping their original relative order, so a stable sort
//! over indices (never over the values themselves) is used throughout.

use std::ops::Range;

/// Indices of `values` in sorted order. Ties keep their original order.
pub fn sort_indices<T: PartialOrd + Copy>(values: &[T], ascending: bool) -> Vec<usize> {
    sort_indices_range(values, 0..values.len(), ascending)
}

/// Sort the sub-range `range` of `values`, returning absolute indices.
///
/// # Panics
///
/// Panics if `range` is out of bounds of `values`.
pub fn sort_indices_range<T: PartialOrd + Copy>(
    values: &[T],
    range: Range<usize>,
    ascending: bool,
) -> Vec<usize> {
    let in_order = |a: usize, b: usize| {
        if ascending {
            values[a] <= values[b]
        } else {
            values[a] >= values[b]
        }
    };

    let mut idx: Vec<usize> = range.collect();
    let n = idx.len();
    if n < 2 {
        return idx;
    }

    // Boundaries of the already-ordered runs.
    let mut bounds = vec![0];
    for i in 1..n {
        if !in_order(idx[i - 1], idx[i]) {
            bounds.push(i);
        }
    }
    bounds.push(n);

    let mut buf = vec![0usize; n];
    while bounds.len() > 2 {
        let mut next = Vec::with_capacity(bounds.len() / 2 + 2);
        next.push(0);
        let mut run = 0;
        while run + 1 < bounds.len() {
            let start = bounds[run];
            let mid = bounds[run + 1];
            if run + 2 < bounds.len() {
                let end = bounds[run + 2];
                merge(&idx[start..mid], &idx[mid..end], &mut buf[start..end], &in_order);
                next.push(end);
                run += 2;
            } else {
                buf[start..mid].copy_from_slice(&idx[start..mid]);
                next.push(mid);
                run += 1;
            }
        }
        std::mem::swap(&mut idx, &mut buf);
        bounds = next;
    }
    idx
}

fn merge(
    left: &[usize],
    right: &[usize],
    out: &mut [usize],
    in_order: &impl Fn(usize, usize) -> bool,
) {
    let (mut i, mut j) = (0, 0);
    for slot in out.iter_mut() {
        let take_left = j >= right.len() || (i < left.len() && in_order(left[i], right[j]));
        if take_left {
            *slot = left[i];
            i += 1;
        } else {
            *slot = right[j];
            j += 1;
        }
    }
}
