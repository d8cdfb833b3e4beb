//! Small shared helpers: string-similarity scoring used by the theme
//! selector and vector math for the embedding path.

/// Similarity ratio between two strings, computed the way a sequence matcher
/// does it: twice the total size of the matching blocks divided by the
/// combined length. Returns a value in `[0, 1]`; two empty strings are
/// considered identical.
#[must_use]
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let mut matches = 0usize;
    let mut regions = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = regions.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size > 0 {
            matches += size;
            regions.push((alo, i, blo, j));
            regions.push((i + size, ahi, j + size, bhi));
        }
    }

    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

/// Find the longest block `a[i..i+size] == b[j..j+size]` within the given
/// bounds, preferring the earliest block on ties.
fn longest_match(
    a: &[u8],
    b: &[u8],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

    // j2len[j] = length of the longest match ending at a[i], b[j].
    let mut j2len = vec![0usize; b.len() + 1];
    for i in alo..ahi {
        let mut new_j2len = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = if j > 0 { j2len[j - 1] + 1 } else { 1 };
            new_j2len[j] = k;
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        j2len = new_j2len;
    }

    (best_i, best_j, best_size)
}

/// Cosine similarity between two dense vectors. Mismatched or empty inputs
/// score zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }
    dot / (norm_a.sqrt() * norm_b.sqrt() + 1e-12)
}
