//! Sorted-set algebra over node id slices.
//!
//! Community node sets are strictly sorted and deduplicated, so all of the
//! set operations the evaluator needs reduce to linear merges.

/// Union of two sorted slices, maintaining sorted order without duplicates.
pub fn union(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut j, mut k) = (0, 0);

    while j < a.len() || k < b.len() {
        let x = a.get(j).copied().unwrap_or(u32::MAX);
        let y = b.get(k).copied().unwrap_or(u32::MAX);

        if x < y {
            out.push(x);
            j += 1;
        } else if y < x {
            out.push(y);
            k += 1;
        } else {
            out.push(x);
            j += 1;
            k += 1;
        }
    }

    out
}

/// Elements of `a` not present in `b`.
pub fn minus(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len());
    let (mut j, mut k) = (0, 0);

    while j < a.len() {
        let x = a[j];
        let y = b.get(k).copied().unwrap_or(u32::MAX);

        if x < y {
            out.push(x);
            j += 1;
        } else if y < x {
            k += 1;
        } else {
            j += 1;
            k += 1;
        }
    }

    out
}

/// Number of elements common to both sorted slices.
pub fn common_elements(a: &[u32], b: &[u32]) -> usize {
    let mut count = 0;
    let (mut j, mut k) = (0, 0);

    while j < a.len() && k < b.len() {
        if a[j] < b[k] {
            j += 1;
        } else if b[k] < a[j] {
            k += 1;
        } else {
            count += 1;
            j += 1;
            k += 1;
        }
    }

    count
}
