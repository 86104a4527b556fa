//! Condition-ordering math shared by the schedule generator and the
//! per-block target sequencing.

use rand::Rng;
use rand::seq::SliceRandom;

/// Row of a balanced Latin square, keyed by participant id.
///
/// Consecutive participants get rows in which every item precedes and
/// follows every other item equally often. Odd-sized squares need twice
/// as many rows to balance, hence the reversal for odd participants.
pub fn balanced_latin_square<T: Clone>(items: &[T], participant_id: i32) -> Vec<T> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }
    let shift = participant_id.rem_euclid(n as i32) as usize;
    let mut row = Vec::with_capacity(n);
    let (mut low, mut high) = (0, 0);
    for i in 0..n {
        let value = if i < 2 || i % 2 != 0 {
            let v = low;
            low += 1;
            v
        } else {
            let v = n - 1 - high;
            high += 1;
            v
        };
        row.push(items[(value + shift) % n].clone());
    }
    if n % 2 != 0 && participant_id % 2 != 0 {
        row.reverse();
    }
    row
}

/// Endless diametric traversal over a ring of `count` targets.
///
/// Starting at 0, each step jumps `count / 2` positions, so consecutive
/// targets sit (nearly) opposite each other. `count` must be odd for the
/// traversal to visit every target once per lap.
pub fn diametric_indexes(count: usize) -> impl Iterator<Item = usize> {
    assert!(
        count > 0 && count % 2 == 1,
        "diametric traversal needs a positive odd target count, got {count}"
    );
    let mut current = 0;
    std::iter::repeat_with(move || {
        let out = current;
        current = (current + count / 2) % count;
        out
    })
}

/// Fresh shuffled copy of a slice.
pub fn shuffled<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(rng);
    out
}
