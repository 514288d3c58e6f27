//! PayoffMatrix - dense payoff table of a normal-form game
//!
//! The table holds `n_strategies^(n_players+1)` entries: one payoff per player
//! for every strategy profile. Player `p` under profile `(s_0, .., s_{n-1})`
//! lives at `p + n_players * Σ s_i * n_strategies^i`.

use std::fmt;
use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NashError, Result};
use crate::game::PayoffFunction;
use crate::Payoff;

/// Only 2-player matrices can be read from text
const TEXT_FORMAT_PLAYERS: usize = 2;

/// Dense payoff table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoffMatrix {
    n_players: usize,
    n_strategies: usize,
    table: Vec<Payoff>,
    /// Largest entry, used to turn payoffs into costs
    max_payoff: Payoff,
}

impl PayoffMatrix {
    /// Zero-filled matrix
    pub fn new(n_players: usize, n_strategies: usize) -> Result<Self> {
        if n_players < 2 || n_strategies == 0 {
            return Err(NashError::precondition(format!(
                "payoff matrix needs at least 2 players and 1 strategy, got {}x{}",
                n_players, n_strategies
            )));
        }
        let too_large = || {
            NashError::precondition(format!(
                "payoff matrix for {} players and {} strategies is too large",
                n_players, n_strategies
            ))
        };
        let len = table_len(n_players, n_strategies).ok_or_else(too_large)?;
        let mut table = Vec::new();
        table.try_reserve_exact(len).map_err(|_| too_large())?;
        table.resize(len, 0.0);

        Ok(Self {
            n_players,
            n_strategies,
            table,
            max_payoff: 0.0,
        })
    }

    pub fn n_players(&self) -> usize {
        self.n_players
    }

    pub fn n_strategies(&self) -> usize {
        self.n_strategies
    }

    pub fn max_payoff(&self) -> Payoff {
        self.max_payoff
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Flat table index of `player`'s payoff under `profile`
    ///
    /// # Panics
    /// If `player` or any strategy is out of range, or `profile` does not
    /// hold exactly one strategy per player.
    pub fn index(&self, player: usize, profile: &[usize]) -> usize {
        assert!(player < self.n_players, "player {} out of range", player);
        assert_eq!(
            profile.len(),
            self.n_players,
            "profile must hold one strategy per player"
        );

        let mut index = player;
        let mut stride = self.n_players;
        for &strategy in profile {
            assert!(
                strategy < self.n_strategies,
                "strategy {} out of range",
                strategy
            );
            index += strategy * stride;
            stride *= self.n_strategies;
        }
        index
    }

    /// Payoff of `player` under `profile`
    pub fn get(&self, player: usize, profile: &[usize]) -> Payoff {
        self.table[self.index(player, profile)]
    }

    /// Store the payoff of `player` under `profile`
    ///
    /// Recomputes `max_payoff` over the whole table, which is fine for
    /// matrices built once before a run.
    pub fn set(&mut self, player: usize, value: Payoff, profile: &[usize]) {
        let index = self.index(player, profile);
        self.table[index] = value;
        self.refresh_max();
    }

    fn refresh_max(&mut self) {
        self.max_payoff = self.table.iter().copied().fold(Payoff::MIN, Payoff::max);
    }

    /// Cost of `player` under `profile`: `max_payoff - payoff`
    pub fn cost(&self, player: usize, profile: &[usize]) -> Payoff {
        self.max_payoff - self.get(player, profile)
    }

    /// Costs of every player for a joint action
    pub fn costs(&self, actions: &[usize], costs: &mut [Payoff]) {
        for (player, cost) in costs.iter_mut().enumerate().take(self.n_players) {
            *cost = self.cost(player, actions);
        }
    }

    // ========================================================================
    // TEXT FORMAT
    // ========================================================================

    /// Load a 2-player matrix from a text file
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| NashError::io(path, e))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse a 2-player matrix
    ///
    /// Format: player count line, strategy count line, then one line per row
    /// strategy with `;`-separated cells of `,`-separated integer payoffs.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()));

        let mut next_line = |what: &str| -> Result<(usize, String)> {
            match lines.next() {
                Some((number, Ok(line))) => Ok((number, line)),
                Some((number, Err(e))) => Err(NashError::malformed(number, e.to_string())),
                None => Err(NashError::malformed(0, format!("missing {}", what))),
            }
        };

        let (number, line) = next_line("player count")?;
        let n_players = parse_count(number, &line, "player count")?;
        if n_players != TEXT_FORMAT_PLAYERS {
            return Err(NashError::malformed(
                number,
                format!("expected {} players, got {}", TEXT_FORMAT_PLAYERS, n_players),
            ));
        }

        let (strategy_line, line) = next_line("strategy count")?;
        let n_strategies = parse_count(strategy_line, &line, "strategy count")?;
        if n_strategies == 0 {
            return Err(NashError::malformed(
                strategy_line,
                "strategy count must be positive",
            ));
        }

        // Rows are parsed before the table exists, so a bogus strategy count
        // fails on the first short row instead of sizing a huge table.
        let mut values: Vec<Payoff> = Vec::new();
        for row in 0..n_strategies {
            let (number, line) = next_line(&format!("row {}", row))?;
            let cells: Vec<&str> = line
                .split(';')
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .collect();
            if cells.len() != n_strategies {
                return Err(NashError::malformed(
                    number,
                    format!("expected {} cells, got {}", n_strategies, cells.len()),
                ));
            }

            for (column, cell) in cells.iter().enumerate() {
                let cell_values: Vec<&str> = cell.split(',').map(str::trim).collect();
                if cell_values.len() != n_players {
                    return Err(NashError::malformed(
                        number,
                        format!(
                            "cell {} holds {} values, expected {}",
                            column,
                            cell_values.len(),
                            n_players
                        ),
                    ));
                }
                for value in cell_values {
                    let value: i64 = value.parse().map_err(|_| {
                        NashError::malformed(number, format!("invalid payoff {:?}", value))
                    })?;
                    values.push(value as Payoff);
                }
            }
        }

        if let Some((number, _)) = lines.next() {
            return Err(NashError::malformed(
                number,
                format!("expected {} rows", n_strategies),
            ));
        }

        let mut matrix = Self::new(n_players, n_strategies)
            .map_err(|e| NashError::malformed(strategy_line, e.to_string()))?;
        for (cell, payoffs) in values.chunks(n_players).enumerate() {
            let profile = [cell / n_strategies, cell % n_strategies];
            for (player, &payoff) in payoffs.iter().enumerate() {
                let index = matrix.index(player, &profile);
                matrix.table[index] = payoff;
            }
        }
        matrix.refresh_max();

        Ok(matrix)
    }
}

impl std::str::FromStr for PayoffMatrix {
    type Err = NashError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }
}

impl PayoffFunction for PayoffMatrix {
    fn evaluate(&self, actions: &[usize], _thread_index: usize, payoffs: &mut [Payoff]) {
        for (player, payoff) in payoffs.iter_mut().enumerate().take(self.n_players) {
            *payoff = self.get(player, actions);
        }
    }
}

impl fmt::Display for PayoffMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} players, {} strategies",
            self.n_players, self.n_strategies
        )?;
        if self.n_players == 2 {
            for row in 0..self.n_strategies {
                for column in 0..self.n_strategies {
                    let cell: Vec<String> = (0..self.n_players)
                        .map(|player| format!("{}", self.get(player, &[row, column])))
                        .collect();
                    write!(f, "{};", cell.join(","))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Entries needed by the index formula
///
/// `S^(n+1)` covers every index while `n <= S`; with more players than
/// strategies the formula reaches up to `n * S^n - 1`.
fn table_len(n_players: usize, n_strategies: usize) -> Option<usize> {
    let profiles = n_strategies.checked_pow(u32::try_from(n_players).ok()?)?;
    let square = profiles.checked_mul(n_strategies)?;
    let indexed = profiles.checked_mul(n_players)?;
    Some(square.max(indexed))
}

fn parse_count(line_number: usize, line: &str, what: &str) -> Result<usize> {
    let line = line.trim();
    line.parse()
        .map_err(|_| NashError::malformed(line_number, format!("invalid {}: {:?}", what, line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const PRISONERS: &str = "2\n2\n3,3;0,5\n5,0;1,1\n";

    #[test]
    fn test_new_sizes_table() {
        let matrix = PayoffMatrix::new(2, 3).unwrap();
        assert_eq!(matrix.len(), 27);
        // more players than strategies: 3 * 2^3 entries
        let matrix = PayoffMatrix::new(3, 2).unwrap();
        assert_eq!(matrix.len(), 24);
        let matrix = PayoffMatrix::new(5, 2).unwrap();
        assert_eq!(matrix.len(), 160);
        assert_eq!(matrix.max_payoff(), 0.0);
    }

    #[test]
    fn test_new_rejects_bad_shapes() {
        assert!(PayoffMatrix::new(1, 2).is_err());
        assert!(PayoffMatrix::new(2, 0).is_err());
        assert!(PayoffMatrix::new(64, 1000).is_err());
    }

    #[test]
    fn test_index_formula() {
        let matrix = PayoffMatrix::new(2, 5).unwrap();
        // player 1, profile (3, 4): 1 + 2 * (3 + 4 * 5)
        assert_eq!(matrix.index(1, &[3, 4]), 47);
    }

    #[test]
    fn test_index_is_bijection() {
        let matrix = PayoffMatrix::new(3, 3).unwrap();
        let mut seen = HashSet::new();
        for a in 0..3 {
            for b in 0..3 {
                for c in 0..3 {
                    for player in 0..3 {
                        assert!(seen.insert(matrix.index(player, &[a, b, c])));
                    }
                }
            }
        }
        assert_eq!(seen.len(), matrix.len());
    }

    #[test]
    fn test_set_then_get() {
        let mut matrix = PayoffMatrix::new(3, 2).unwrap();
        let mut value = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    for player in 0..3 {
                        value += 1.5;
                        matrix.set(player, value, &[a, b, c]);
                        assert_eq!(matrix.get(player, &[a, b, c]), value);
                    }
                }
            }
        }
        assert_eq!(matrix.max_payoff(), value);
    }

    #[test]
    fn test_last_profile_fits_with_many_players() {
        for n_players in 3..=6 {
            let mut matrix = PayoffMatrix::new(n_players, 2).unwrap();
            let last = vec![1; n_players];
            let player = n_players - 1;
            assert_eq!(matrix.index(player, &last), matrix.len() - 1);
            matrix.set(player, 7.0, &last);
            assert_eq!(matrix.get(player, &last), 7.0);
        }
    }

    #[test]
    fn test_max_payoff_tracks_overwrites() {
        let mut matrix = PayoffMatrix::new(2, 2).unwrap();
        matrix.set(0, 9.0, &[0, 0]);
        assert_eq!(matrix.max_payoff(), 9.0);
        matrix.set(0, 2.0, &[0, 0]);
        assert_eq!(matrix.max_payoff(), 2.0);
    }

    #[test]
    fn test_costs() {
        let matrix: PayoffMatrix = PRISONERS.parse().unwrap();
        assert_eq!(matrix.max_payoff(), 5.0);
        let mut costs = [0.0; 2];
        matrix.costs(&[0, 1], &mut costs);
        assert_eq!(costs, [5.0, 0.0]);
    }

    #[test]
    fn test_load_two_player_text() {
        let matrix: PayoffMatrix = PRISONERS.parse().unwrap();
        assert_eq!(matrix.n_players(), 2);
        assert_eq!(matrix.n_strategies(), 2);
        assert_eq!(matrix.get(0, &[0, 1]), 0.0);
        assert_eq!(matrix.get(1, &[0, 1]), 5.0);
        assert_eq!(matrix.get(0, &[1, 0]), 5.0);
        assert_eq!(matrix.get(1, &[1, 1]), 1.0);
    }

    #[test]
    fn test_load_accepts_trailing_separator() {
        let matrix: PayoffMatrix = "2\n2\n3,3;0,5;\n5,0;1,1;\n".parse().unwrap();
        assert_eq!(matrix.get(1, &[0, 1]), 5.0);
    }

    #[test]
    fn test_load_rejects_three_players() {
        let err = "3\n2\n1,1,1;1,1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn test_load_rejects_bad_counts_and_values() {
        // missing column
        let err = "2\n2\n3,3\n5,0;1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 3, .. }));
        // three values in a cell
        let err = "2\n2\n3,3,3;0,5\n5,0;1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 3, .. }));
        // missing row
        let err = "2\n2\n3,3;0,5\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { .. }));
        // extra row
        let err = "2\n2\n3,3;0,5\n5,0;1,1\n1,1;1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 5, .. }));
        // bad value
        let err = "2\n2\n3,x;0,5\n5,0;1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 3, .. }));
        // zero strategies
        let err = "2\n0\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 2, .. }));
        // empty input
        assert!("".parse::<PayoffMatrix>().is_err());
    }

    #[test]
    fn test_load_huge_strategy_count_fails_on_first_row() {
        let err = "2\n2097152\n1,1\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 3, .. }));
        let err = "2\n5000\n1,1;2,2\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { line: 3, .. }));
        // overflowing table size with nothing to read
        let err = "2\n18446744073709551615\n".parse::<PayoffMatrix>().unwrap_err();
        assert!(matches!(err, NashError::MalformedInput { .. }));
    }

    #[test]
    fn test_load_large_game() {
        let n = 60;
        let mut text = format!("2\n{}\n", n);
        for row in 0..n {
            for column in 0..n {
                text.push_str(&format!("{},{};", row * n + column, column));
            }
            text.push('\n');
        }
        let matrix: PayoffMatrix = text.parse().unwrap();
        assert_eq!(matrix.get(0, &[2, 5]), 125.0);
        assert_eq!(matrix.get(1, &[2, 5]), 5.0);
        assert_eq!(matrix.get(0, &[n - 1, n - 1]), (n * n - 1) as Payoff);
        assert_eq!(matrix.max_payoff(), (n * n - 1) as Payoff);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PayoffMatrix::load(Path::new("/nonexistent/game.txt")).unwrap_err();
        assert!(matches!(err, NashError::IoFailure { .. }));
    }

    #[test]
    fn test_display() {
        let matrix: PayoffMatrix = PRISONERS.parse().unwrap();
        let text = matrix.to_string();
        assert!(text.starts_with("2 players, 2 strategies\n"));
        assert!(text.contains("3,3;0,5;"));
    }

    #[test]
    fn test_evaluates_any_player_count() {
        let mut matrix = PayoffMatrix::new(3, 2).unwrap();
        matrix.set(0, 1.0, &[1, 0, 1]);
        matrix.set(1, 2.0, &[1, 0, 1]);
        matrix.set(2, 3.0, &[1, 0, 1]);
        let mut payoffs = [0.0; 3];
        matrix.evaluate(&[1, 0, 1], 0, &mut payoffs);
        assert_eq!(payoffs, [1.0, 2.0, 3.0]);
    }
}
