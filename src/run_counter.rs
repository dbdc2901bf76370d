//! Persisted run-number sequence.
//!
//! A small counter file holding the next run number. The counter is an
//! injected component rather than ambient global state: whoever owns the
//! `RunCounter` owns the sequence. Read-increment-write is atomic with
//! respect to this process via an internal mutex; the file is the source of
//! truth across processes that do not run concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{DaqError, DaqResult};

pub struct RunCounter {
    path: PathBuf,
    guard: Mutex<()>,
}

impl RunCounter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    /// Return the current run number and persist the increment.
    /// A missing counter file starts the sequence at 1.
    pub fn next(&self) -> DaqResult<u32> {
        let _held = self
            .guard
            .lock()
            .map_err(|_| DaqError::Pipeline("run counter mutex poisoned".into()))?;
        let current = self.read_value()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", current + 1))?;
        Ok(current)
    }

    /// Read the next run number without consuming it.
    pub fn peek(&self) -> DaqResult<u32> {
        let _held = self
            .guard
            .lock()
            .map_err(|_| DaqError::Pipeline("run counter mutex poisoned".into()))?;
        self.read_value()
    }

    /// Restart the sequence at 1.
    pub fn reset(&self) -> DaqResult<()> {
        let _held = self
            .guard
            .lock()
            .map_err(|_| DaqError::Pipeline("run counter mutex poisoned".into()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, "1\n")?;
        Ok(())
    }

    fn read_value(&self) -> DaqResult<u32> {
        match fs::read_to_string(&self.path) {
            Ok(text) => text.trim().parse::<u32>().map_err(|e| {
                DaqError::Configuration(format!(
                    "run counter file {} holds invalid number: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(1),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_one_and_increments() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RunCounter::new(dir.path().join("next_run_number.txt"));
        assert_eq!(counter.next().unwrap(), 1);
        assert_eq!(counter.next().unwrap(), 2);
        assert_eq!(counter.peek().unwrap(), 3);
    }

    #[test]
    fn sequence_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("next_run_number.txt");
        assert_eq!(RunCounter::new(&path).next().unwrap(), 1);
        assert_eq!(RunCounter::new(&path).next().unwrap(), 2);
    }

    #[test]
    fn reset_restarts_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RunCounter::new(dir.path().join("n.txt"));
        counter.next().unwrap();
        counter.next().unwrap();
        counter.reset().unwrap();
        assert_eq!(counter.next().unwrap(), 1);
    }

    #[test]
    fn garbage_counter_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.txt");
        fs::write(&path, "not a number").unwrap();
        assert!(RunCounter::new(&path).next().is_err());
    }
}
