//! Weighted random selection.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid weighted choice table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("Choice table is empty")]
    Empty,

    #[error("Choice weights sum to zero")]
    ZeroTotalWeight,
}

/// A choice and its relative weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceWeight<T> {
    pub choice: T,
    pub weight: u32,
}

/// Table of weighted choices.
///
/// An entry is picked with probability `weight / sum(weights)`. Entries with
/// zero weight are allowed but never picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<ChoiceWeight<T>>",
    into = "Vec<ChoiceWeight<T>>",
    bound(
        serialize = "T: Clone + Serialize",
        deserialize = "T: Deserialize<'de>"
    )
)]
pub struct WeightedChoices<T> {
    choices: Vec<ChoiceWeight<T>>,
    total: u64,
}

impl<T> WeightedChoices<T> {
    /// Build a table from `(choice, weight)` pairs.
    pub fn new(choices: impl IntoIterator<Item = (T, u32)>) -> Result<Self, ChoiceError> {
        let choices: Vec<ChoiceWeight<T>> = choices
            .into_iter()
            .map(|(choice, weight)| ChoiceWeight { choice, weight })
            .collect();
        Self::try_from(choices)
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChoiceWeight<T>> {
        self.choices.iter()
    }

    /// Pick a choice at random.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let mut roll = rng.gen_range(0..self.total);
        for entry in &self.choices {
            let weight = u64::from(entry.weight);
            if roll < weight {
                return &entry.choice;
            }
            roll -= weight;
        }
        unreachable!("roll is always below the total weight")
    }
}

impl<T> TryFrom<Vec<ChoiceWeight<T>>> for WeightedChoices<T> {
    type Error = ChoiceError;

    fn try_from(choices: Vec<ChoiceWeight<T>>) -> Result<Self, Self::Error> {
        if choices.is_empty() {
            return Err(ChoiceError::Empty);
        }
        let total: u64 = choices.iter().map(|c| u64::from(c.weight)).sum();
        if total == 0 {
            return Err(ChoiceError::ZeroTotalWeight);
        }
        Ok(Self { choices, total })
    }
}

impl<T> From<WeightedChoices<T>> for Vec<ChoiceWeight<T>> {
    fn from(table: WeightedChoices<T>) -> Self {
        table.choices
    }
}
