use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffles the first `window` items in place and leaves the tail in rank order
pub fn shuffle_top_window<T, R: Rng + ?Sized>(items: &mut [T], window: usize, rng: &mut R) {
    let end = window.min(items.len());
    if end > 1 {
        items[..end].shuffle(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_tail_keeps_rank_order() {
        let mut items: Vec<u32> = (0..50).collect();
        let mut rng = StdRng::seed_from_u64(7);
        shuffle_top_window(&mut items, 20, &mut rng);

        let head: HashSet<u32> = items[..20].iter().copied().collect();
        assert_eq!(head, (0..20).collect());
        assert_eq!(&items[20..], &(20..50).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let mut a: Vec<u32> = (0..30).collect();
        let mut b = a.clone();
        shuffle_top_window(&mut a, 24, &mut StdRng::seed_from_u64(42));
        shuffle_top_window(&mut b, 24, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_window_larger_than_input() {
        let mut items = vec![1, 2, 3];
        shuffle_top_window(&mut items, 100, &mut StdRng::seed_from_u64(1));
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3]);
    }
}
