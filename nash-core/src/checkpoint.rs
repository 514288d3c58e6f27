//! Binary checkpoints of a learning run
//!
//! Layout (little endian): `i32` iteration, `n_players * n_strategies` `f32`
//! probabilities row by row, `n_players` `i32` actions, `n_players` `f64`
//! payoffs. Files are named by the iteration, zero-padded to 12 digits.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{NashError, Result};
use crate::proba::ProbaMatrix;
use crate::Payoff;

/// Digits in a checkpoint file name
const NAME_DIGITS: usize = 12;

/// Snapshot of an engine after one iteration
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub iteration: u32,
    pub proba: ProbaMatrix,
    pub actions: Vec<usize>,
    pub payoffs: Vec<Payoff>,
}

impl Checkpoint {
    /// Encode into `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(to_i32(self.iteration as usize)?)?;
        for &p in self.proba.as_slice() {
            writer.write_f32::<LittleEndian>(p)?;
        }
        for &action in &self.actions {
            writer.write_i32::<LittleEndian>(to_i32(action)?)?;
        }
        for &payoff in &self.payoffs {
            writer.write_f64::<LittleEndian>(payoff)?;
        }
        Ok(())
    }

    /// Decode a checkpoint of a game with the given shape
    pub fn read_from<R: Read>(
        reader: &mut R,
        n_players: usize,
        n_strategies: usize,
    ) -> std::io::Result<Self> {
        let iteration = from_i32(reader.read_i32::<LittleEndian>()?)?;

        let mut proba = ProbaMatrix::zeros(n_players, n_strategies);
        reader.read_f32_into::<LittleEndian>(proba.as_mut_slice())?;

        let mut actions = Vec::with_capacity(n_players);
        for _ in 0..n_players {
            actions.push(from_i32(reader.read_i32::<LittleEndian>()?)?);
        }

        let mut payoffs = vec![0.0; n_players];
        reader.read_f64_into::<LittleEndian>(&mut payoffs)?;

        Ok(Self {
            iteration: iteration as u32,
            proba,
            actions,
            payoffs,
        })
    }
}

fn to_i32(value: usize) -> std::io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} does not fit a checkpoint field", value),
        )
    })
}

fn from_i32(value: i32) -> std::io::Result<usize> {
    usize::try_from(value).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("negative checkpoint field {}", value),
        )
    })
}

// ============================================================================
// STORE
// ============================================================================

/// Directory of checkpoint files keyed by iteration
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// The directory is created on the first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the checkpoint of `iteration`
    pub fn path_for(&self, iteration: u32) -> PathBuf {
        self.dir
            .join(format!("{:0width$}", iteration, width = NAME_DIGITS))
    }

    /// Write a checkpoint, returning the file it went to
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| NashError::io(&self.dir, e))?;

        let path = self.path_for(checkpoint.iteration);
        let file = File::create(&path).map_err(|e| NashError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        checkpoint
            .write_to(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| NashError::io(&path, e))?;
        Ok(path)
    }

    /// Read the checkpoint of `iteration`
    pub fn load(
        &self,
        iteration: u32,
        n_players: usize,
        n_strategies: usize,
    ) -> Result<Checkpoint> {
        Self::load_path(&self.path_for(iteration), n_players, n_strategies)
    }

    /// Read a checkpoint file
    pub fn load_path(path: &Path, n_players: usize, n_strategies: usize) -> Result<Checkpoint> {
        let file = File::open(path).map_err(|e| NashError::io(path, e))?;
        Checkpoint::read_from(&mut BufReader::new(file), n_players, n_strategies)
            .map_err(|e| NashError::io(path, e))
    }

    /// Iterations with a checkpoint in the directory, ascending
    pub fn iterations(&self) -> Result<Vec<u32>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| NashError::io(&self.dir, e))?;
        let mut iterations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NashError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() == NAME_DIGITS && name.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(iteration) = name.parse() {
                    iterations.push(iteration);
                }
            }
        }
        iterations.sort_unstable();
        Ok(iterations)
    }

    /// Most recent checkpointed iteration
    pub fn latest(&self) -> Result<Option<u32>> {
        Ok(self.iterations()?.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_checkpoint() -> Checkpoint {
        Checkpoint {
            iteration: 1234,
            proba: ProbaMatrix::from_rows(vec![
                vec![0.1, 0.2, 0.7],
                vec![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            ])
            .unwrap(),
            actions: vec![2, 0],
            payoffs: vec![0.125, -7.5e-9],
        }
    }

    #[test]
    fn test_layout() {
        let mut bytes = Vec::new();
        sample_checkpoint().write_to(&mut bytes).unwrap();
        // 4 + 6 * 4 + 2 * 4 + 2 * 8
        assert_eq!(bytes.len(), 52);
        assert_eq!(&bytes[..4], &1234i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.1f32.to_le_bytes());
        assert_eq!(&bytes[28..32], &2i32.to_le_bytes());
        assert_eq!(&bytes[36..44], &0.125f64.to_le_bytes());
    }

    #[test]
    fn test_decode_is_bit_exact() {
        let checkpoint = sample_checkpoint();
        let mut bytes = Vec::new();
        checkpoint.write_to(&mut bytes).unwrap();
        let decoded = Checkpoint::read_from(&mut bytes.as_slice(), 2, 3).unwrap();

        assert_eq!(decoded.iteration, checkpoint.iteration);
        assert_eq!(decoded.actions, checkpoint.actions);
        for (a, b) in decoded.proba.as_slice().iter().zip(checkpoint.proba.as_slice()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in decoded.payoffs.iter().zip(&checkpoint.payoffs) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_truncated_input() {
        let mut bytes = Vec::new();
        sample_checkpoint().write_to(&mut bytes).unwrap();
        bytes.truncate(40);
        assert!(Checkpoint::read_from(&mut bytes.as_slice(), 2, 3).is_err());
    }

    #[test]
    fn test_store_paths_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("run"));

        assert_eq!(
            store.path_for(42).file_name().unwrap().to_str().unwrap(),
            "000000000042"
        );

        let mut checkpoint = sample_checkpoint();
        for iteration in [0, 1000, 20] {
            checkpoint.iteration = iteration;
            store.save(&checkpoint).unwrap();
        }
        std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.iterations().unwrap(), vec![0, 20, 1000]);
        assert_eq!(store.latest().unwrap(), Some(1000));

        let loaded = store.load(20, 2, 3).unwrap();
        assert_eq!(loaded.iteration, 20);
        assert_eq!(loaded.proba, checkpoint.proba);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(matches!(
            store.load(7, 2, 2),
            Err(NashError::IoFailure { .. })
        ));
        assert_eq!(store.latest().unwrap(), None);
    }

    #[test]
    fn test_save_into_unwritable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = CheckpointStore::new(blocker.join("sub"));
        assert!(matches!(
            store.save(&sample_checkpoint()),
            Err(NashError::IoFailure { .. })
        ));
    }
}
