//! Per-player probability matrices and cumulative sampling

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NashError, Result};
use crate::Proba;

/// Attempts made by [`sample_strategy`] before giving up
pub const SAMPLING_ATTEMPTS: usize = 3;

/// One probability row per player, stored row-major
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbaMatrix {
    n_players: usize,
    n_strategies: usize,
    values: Vec<Proba>,
}

impl ProbaMatrix {
    /// All-zero matrix, to be filled by the caller
    pub fn zeros(n_players: usize, n_strategies: usize) -> Self {
        Self {
            n_players,
            n_strategies,
            values: vec![0.0; n_players * n_strategies],
        }
    }

    /// Every player plays every strategy with the same probability
    pub fn uniform(n_players: usize, n_strategies: usize) -> Self {
        let mut proba = Self::zeros(n_players, n_strategies);
        proba.uniformize();
        proba
    }

    /// Build from explicit rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<Proba>>) -> Result<Self> {
        let n_players = rows.len();
        let n_strategies = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != n_strategies) {
            return Err(NashError::precondition(
                "probability rows must all have the same length",
            ));
        }
        Ok(Self {
            n_players,
            n_strategies,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_players(&self) -> usize {
        self.n_players
    }

    pub fn n_strategies(&self) -> usize {
        self.n_strategies
    }

    pub fn row(&self, player: usize) -> &[Proba] {
        let start = player * self.n_strategies;
        &self.values[start..start + self.n_strategies]
    }

    pub fn row_mut(&mut self, player: usize) -> &mut [Proba] {
        let start = player * self.n_strategies;
        &mut self.values[start..start + self.n_strategies]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Proba]> {
        // chunks() rejects a zero size
        self.values.chunks(self.n_strategies.max(1))
    }

    /// Row-major view of every value
    pub fn as_slice(&self) -> &[Proba] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [Proba] {
        &mut self.values
    }

    pub fn to_rows(&self) -> Vec<Vec<Proba>> {
        self.rows().map(<[Proba]>::to_vec).collect()
    }

    /// Reset every row to the uniform distribution
    pub fn uniformize(&mut self) {
        let p = 1.0 / self.n_strategies as Proba;
        self.values.iter_mut().for_each(|v| *v = p);
    }

    /// Divide every row by its sum
    ///
    /// A row without positive mass cannot be normalized and is reported as
    /// an invariant violation.
    pub fn normalize(&mut self) -> Result<()> {
        for player in 0..self.n_players {
            let row = self.row_mut(player);
            let sum: Proba = row.iter().sum();
            if !(sum > 0.0) || !sum.is_finite() {
                return Err(NashError::InvariantViolation(format!(
                    "row of player {} has no positive mass (sum {})",
                    player, sum
                )));
            }
            row.iter_mut().for_each(|v| *v /= sum);
        }
        Ok(())
    }

    /// Check the matrix can seed a run of a game with this shape
    pub fn validate(&self, n_players: usize, n_strategies: usize) -> Result<()> {
        if self.n_players != n_players || self.n_strategies != n_strategies {
            return Err(NashError::precondition(format!(
                "probability matrix is {}x{}, game is {}x{}",
                self.n_players, self.n_strategies, n_players, n_strategies
            )));
        }
        for (player, row) in self.rows().enumerate() {
            if row.iter().any(|v| !(0.0..=1.0).contains(v)) {
                return Err(NashError::precondition(format!(
                    "row of player {} has entries outside [0, 1]",
                    player
                )));
            }
            if !row.iter().any(|&v| v > 0.0) {
                return Err(NashError::precondition(format!(
                    "row of player {} has no positive mass",
                    player
                )));
            }
        }
        Ok(())
    }

    /// Largest deviation of a row sum from 1
    pub fn max_row_error(&self) -> Proba {
        self.rows()
            .map(|row| (row.iter().sum::<Proba>() - 1.0).abs())
            .fold(0.0, Proba::max)
    }
}

impl fmt::Display for ProbaMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            for v in row {
                write!(f, "{:.3} ", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Draw a strategy from a probability row by cumulative inversion
///
/// Rounding can leave the cumulative sum just short of 1, in which case the
/// draw is retried; strategies with zero probability are never returned.
pub fn sample_strategy<R: Rng>(row: &[Proba], rng: &mut R) -> Result<usize> {
    for _ in 0..SAMPLING_ATTEMPTS {
        let r: Proba = rng.gen();
        let mut cumulative = 0.0;
        for (strategy, &p) in row.iter().enumerate() {
            cumulative += p;
            if r < cumulative {
                return Ok(strategy);
            }
        }
    }
    Err(NashError::SamplingFailure {
        attempts: SAMPLING_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_uniform_rows() {
        let proba = ProbaMatrix::uniform(3, 4);
        for row in proba.rows() {
            assert_eq!(row, &[0.25; 4]);
        }
        assert!(proba.max_row_error() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut proba = ProbaMatrix::from_rows(vec![vec![1.0, 3.0], vec![0.5, 0.5]]).unwrap();
        proba.normalize().unwrap();
        assert_eq!(proba.row(0), &[0.25, 0.75]);
        assert_eq!(proba.row(1), &[0.5, 0.5]);
    }

    #[test]
    fn test_normalize_rejects_empty_row() {
        let mut proba = ProbaMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap();
        assert!(matches!(
            proba.normalize(),
            Err(NashError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(ProbaMatrix::from_rows(vec![vec![1.0], vec![0.5, 0.5]]).is_err());
    }

    #[test]
    fn test_validate() {
        let proba = ProbaMatrix::uniform(2, 3);
        assert!(proba.validate(2, 3).is_ok());
        assert!(proba.validate(3, 3).is_err());

        let dead = ProbaMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap();
        assert!(matches!(
            dead.validate(2, 2),
            Err(NashError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_sample_never_picks_zero_mass() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let row = [0.0, 0.3, 0.0, 0.7];
        let mut counts = [0usize; 4];
        for _ in 0..10_000 {
            counts[sample_strategy(&row, &mut rng).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        // roughly 30/70
        assert!(counts[1] > 2_500 && counts[1] < 3_500);
    }

    #[test]
    fn test_sample_fails_on_empty_row() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let err = sample_strategy(&[0.0, 0.0], &mut rng).unwrap_err();
        assert!(matches!(err, NashError::SamplingFailure { attempts: 3 }));
    }

    #[test]
    fn test_display() {
        let proba = ProbaMatrix::from_rows(vec![vec![0.25, 0.75], vec![1.0, 0.0]]).unwrap();
        assert_eq!(proba.to_string(), "0.250 0.750 \n1.000 0.000 \n");
    }
}
