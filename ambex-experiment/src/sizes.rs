use ambex_core::{TargetSizeVariant, shuffled};
use rand::Rng;

/// Order in which target-size blocks run within one step.
///
/// A trial sequence is a one-shot shuffle of the four sizes; a training
/// sequence cycles through its shuffle forever and is only stopped by the
/// operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSizeSequence {
    order: Vec<TargetSizeVariant>,
    cursor: Option<usize>,
    cyclic: bool,
}

impl TargetSizeSequence {
    pub fn for_trial(rng: &mut impl Rng) -> Self {
        Self {
            order: shuffled(&TargetSizeVariant::ALL, rng),
            cursor: None,
            cyclic: false,
        }
    }

    pub fn for_training(rng: &mut impl Rng) -> Self {
        Self {
            order: shuffled(&TargetSizeVariant::ALL, rng),
            cursor: None,
            cyclic: true,
        }
    }

    pub fn current(&self) -> Option<TargetSizeVariant> {
        self.cursor.map(|i| self.order[i])
    }

    /// Moves to the next size and returns it; `None` once a trial sequence
    /// is exhausted.
    pub fn advance(&mut self) -> Option<TargetSizeVariant> {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next < self.order.len() {
            self.cursor = Some(next);
        } else if self.cyclic && !self.order.is_empty() {
            self.cursor = Some(0);
        } else {
            return None;
        }
        self.current()
    }

    /// Sizes still owed: the current block plus everything after it.
    pub fn remaining(&self) -> Vec<TargetSizeVariant> {
        match self.cursor {
            None => self.order.clone(),
            Some(i) => self.order[i..].to_vec(),
        }
    }

    /// Replacement sequence after an invalidated block: a fresh shuffle of
    /// all sizes, filtered down to the ones still owed. A training sequence
    /// is returned as-is; its endless cycle just keeps going.
    pub fn reshuffled_remaining(&self, rng: &mut impl Rng) -> Self {
        if self.cyclic {
            return self.clone();
        }
        let owed = self.remaining();
        let order = shuffled(&TargetSizeVariant::ALL, rng)
            .into_iter()
            .filter(|size| owed.contains(size))
            .collect();
        Self {
            order,
            cursor: None,
            cyclic: false,
        }
    }
}
