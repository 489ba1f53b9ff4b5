//! Shuffle order generation
//!
//! A shuffle history is a permutation of queue indices that next/previous
//! walk back and forth, so going back replays the same order.

use rand::seq::SliceRandom;
use rand::Rng;

/// Uniform random permutation of `0..len` (Fisher-Yates)
pub fn fresh_history<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// Random permutation of `0..len` with `current` swapped to the front
///
/// The permutation is built over valid indices only, so `current` is always
/// present when it is in range and nothing is ever dropped.
pub fn history_starting_at<R: Rng + ?Sized>(len: usize, current: usize, rng: &mut R) -> Vec<usize> {
    let mut order = fresh_history(len, rng);
    if let Some(pos) = order.iter().position(|&i| i == current) {
        order.swap(0, pos);
    }
    order
}

/// Whether `history` holds every index of `0..len` exactly once
pub fn is_permutation(history: &[usize], len: usize) -> bool {
    if history.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &index in history {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn current_index_moves_to_front() {
        let mut rng = StdRng::seed_from_u64(7);
        for current in 0..10 {
            let history = history_starting_at(10, current, &mut rng);
            assert_eq!(history[0], current);
            assert!(is_permutation(&history, 10));
        }
    }

    #[test]
    fn out_of_range_current_still_yields_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let history = history_starting_at(4, 9, &mut rng);
        assert!(is_permutation(&history, 4));
    }

    #[test]
    fn empty_and_single() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(fresh_history(0, &mut rng).is_empty());
        assert_eq!(history_starting_at(1, 0, &mut rng), vec![0]);
    }

    #[test]
    fn same_seed_same_order() {
        let a = fresh_history(20, &mut StdRng::seed_from_u64(42));
        let b = fresh_history(20, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_changes_order() {
        let history = fresh_history(8, &mut StdRng::seed_from_u64(3));
        // A fixed seed makes this deterministic
        let identity: Vec<usize> = (0..8).collect();
        assert_ne!(history, identity);
        assert!(is_permutation(&history, 8));
    }

    #[test]
    fn permutation_check_rejects_bad_histories() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
        assert!(is_permutation(&[], 0));
    }
}
