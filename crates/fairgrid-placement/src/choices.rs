//! Power-of-k choices: sample a few candidates, keep the best.

use rand::Rng;
use rand::seq::index;

/// Up to `k` distinct indices in `0..n`, uniformly at random.
pub fn sample_k<R: Rng + ?Sized>(rng: &mut R, n: usize, k: usize) -> Vec<usize> {
    if n == 0 || k == 0 {
        return Vec::new();
    }
    index::sample(rng, n, k.min(n)).into_vec()
}

/// Samples `k` of `n` candidates and returns the one with the smallest
/// key. Candidates for which `key` returns `None` are ineligible. Equal
/// keys resolve to the lower index.
pub fn power_of_k<R, K, F>(rng: &mut R, n: usize, k: usize, mut key: F) -> Option<(usize, K)>
where
    R: Rng + ?Sized,
    K: PartialOrd,
    F: FnMut(usize) -> Option<K>,
{
    let mut sampled = sample_k(rng, n, k);
    sampled.sort_unstable();

    let mut best: Option<(usize, K)> = None;
    for i in sampled {
        let Some(score) = key(i) else { continue };
        let better = match &best {
            None => true,
            Some((_, b)) => score < *b,
        };
        if better {
            best = Some((i, score));
        }
    }
    best
}
