//! Atomic trainer checkpoints.
//!
//! A checkpoint is a directory containing `state.json` (epoch counter, best
//! validation loss, scheduler states, loss histories), one
//! `<name>.safetensors` per model and one `<name>.optimizer.safetensors` per
//! optimizer. The whole directory is written into a `.tmp` sibling and
//! renamed into place on commit, so a crash mid-write never leaves a
//! readable partial checkpoint under the configured path.
//!
//! Loading fails fast on any missing file or field: resuming from an
//! incomplete checkpoint would silently corrupt experiment provenance.

use crate::history::LossHistory;
use crate::scheduler::StepLr;
use crate::{Result, TrainerError};
use mlx_rs::module::{ModuleParameters, ModuleParametersExt};
use mlx_rs::optimizers::Adam;
use mlx_rs::Array;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// File name of the JSON state inside a checkpoint directory.
pub const STATE_FILE: &str = "state.json";

/// The non-tensor part of a trainer checkpoint.
///
/// Data loaders are deliberately not part of this: a checkpoint restores the
/// trainer, not its data plumbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerState {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Best validation loss seen so far.
    pub best_valid_loss: Option<f64>,
    /// Scheduler state per optimizer name.
    pub schedulers: BTreeMap<String, StepLr>,
    /// Per-batch training loss series.
    pub train_losses: LossHistory,
    /// Per-epoch validation loss series.
    pub valid_losses: LossHistory,
}

/// Staged checkpoint directory, renamed into place on commit.
pub struct CheckpointWriter {
    staging: PathBuf,
    target: PathBuf,
}

impl CheckpointWriter {
    /// Start a checkpoint for the given target directory.
    ///
    /// Any stale staging directory from an earlier crash is discarded.
    pub fn create(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let file_name = target
            .file_name()
            .ok_or_else(|| {
                TrainerError::Checkpoint(format!("invalid checkpoint path {:?}", target))
            })?
            .to_string_lossy()
            .into_owned();
        let staging = target.with_file_name(format!("{}.tmp", file_name));

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        Ok(Self { staging, target })
    }

    /// Write the JSON trainer state.
    pub fn write_state(&self, state: &TrainerState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        fs::write(self.staging.join(STATE_FILE), json)?;
        Ok(())
    }

    /// Write one model's parameters as `<name>.safetensors`.
    pub fn write_model<M: ModuleParameters>(&self, name: &str, model: &M) -> Result<()> {
        let params: HashMap<Rc<str>, Array> = model
            .parameters()
            .flatten()
            .into_iter()
            .map(|(key, value)| (key, value.clone()))
            .collect();

        let path = self.staging.join(format!("{}.safetensors", name));
        Array::save_safetensors(params, None, &path).map_err(|e| {
            TrainerError::Checkpoint(format!("failed to save {} weights: {}", name, e))
        })?;
        Ok(())
    }

    /// Write one Adam optimizer's moments as `<name>.optimizer.safetensors`.
    ///
    /// The first and second moments of parameter `p` are stored as `p.m` and
    /// `p.v`.
    pub fn write_optimizer(&self, name: &str, optimizer: &Adam) -> Result<()> {
        let mut tensors: HashMap<Rc<str>, Array> = HashMap::new();
        for (key, (m, v)) in optimizer.state.iter() {
            tensors.insert(Rc::from(format!("{}.m", key).as_str()), m.clone());
            tensors.insert(Rc::from(format!("{}.v", key).as_str()), v.clone());
        }

        let path = self.staging.join(format!("{}.optimizer.safetensors", name));
        Array::save_safetensors(tensors, None, &path).map_err(|e| {
            TrainerError::Checkpoint(format!("failed to save {} optimizer state: {}", name, e))
        })?;
        Ok(())
    }

    /// Atomically replace the target directory with the staged checkpoint.
    pub fn commit(self) -> Result<PathBuf> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        Ok(self.target)
    }
}

/// Read and validate the JSON trainer state of a checkpoint directory.
pub fn read_state(dir: &Path) -> Result<TrainerState> {
    let path = dir.join(STATE_FILE);
    let json = fs::read_to_string(&path).map_err(|e| {
        TrainerError::Checkpoint(format!("cannot read checkpoint state {:?}: {}", path, e))
    })?;
    serde_json::from_str(&json).map_err(|e| {
        TrainerError::Checkpoint(format!("malformed checkpoint state {:?}: {}", path, e))
    })
}

/// Load `<name>.safetensors` into a model.
pub fn load_model<M: ModuleParametersExt>(dir: &Path, name: &str, model: &mut M) -> Result<()> {
    let path = dir.join(format!("{}.safetensors", name));
    if !path.exists() {
        return Err(TrainerError::Checkpoint(format!(
            "checkpoint is missing {:?}",
            path
        )));
    }
    model.load_safetensors(&path).map_err(|e| {
        TrainerError::Checkpoint(format!("failed to load {} weights: {}", name, e))
    })?;
    Ok(())
}

/// Load `<name>.optimizer.safetensors` back into an Adam optimizer.
pub fn load_optimizer(dir: &Path, name: &str, optimizer: &mut Adam) -> Result<()> {
    let path = dir.join(format!("{}.optimizer.safetensors", name));
    if !path.exists() {
        return Err(TrainerError::Checkpoint(format!(
            "checkpoint is missing {:?}",
            path
        )));
    }
    let tensors = Array::load_safetensors(&path).map_err(|e| {
        TrainerError::Checkpoint(format!("failed to load {} optimizer state: {}", name, e))
    })?;

    let mut moments: HashMap<String, (Option<Array>, Option<Array>)> = HashMap::new();
    for (key, value) in tensors {
        if let Some(base) = key.strip_suffix(".m") {
            moments.entry(base.to_string()).or_default().0 = Some(value);
        } else if let Some(base) = key.strip_suffix(".v") {
            moments.entry(base.to_string()).or_default().1 = Some(value);
        } else {
            return Err(TrainerError::Checkpoint(format!(
                "unexpected optimizer tensor {:?} in {:?}",
                key, path
            )));
        }
    }

    for (base, (m, v)) in moments {
        let (Some(m), Some(v)) = (m, v) else {
            return Err(TrainerError::Checkpoint(format!(
                "optimizer state for {:?} is missing a moment tensor",
                base
            )));
        };
        optimizer.state.insert(Rc::from(base.as_str()), (m, v));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use klavier_nn::nn::Conv1d;
    use tempfile::TempDir;

    fn sample_state() -> TrainerState {
        let mut schedulers = BTreeMap::new();
        schedulers.insert("generator".to_string(), StepLr::new(1e-4, 30, 0.5));

        let mut train_losses = LossHistory::new();
        train_losses.push("time_l2", 0.25);

        TrainerState {
            epoch: 3,
            best_valid_loss: Some(0.125),
            schedulers,
            train_losses,
            valid_losses: LossHistory::new(),
        }
    }

    #[test]
    fn test_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("checkpoint");

        let writer = CheckpointWriter::create(&target).unwrap();
        writer.write_state(&sample_state()).unwrap();
        writer.commit().unwrap();

        let state = read_state(&target).unwrap();
        assert_eq!(state.epoch, 3);
        assert_eq!(state.best_valid_loss, Some(0.125));
        assert_eq!(state.train_losses.series("time_l2"), &[0.25]);
        assert_eq!(state.schedulers["generator"].epoch(), 0);
    }

    #[test]
    fn test_commit_is_atomic() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("checkpoint");

        let writer = CheckpointWriter::create(&target).unwrap();
        writer.write_state(&sample_state()).unwrap();

        // Nothing visible at the target before commit
        assert!(!target.exists());
        writer.commit().unwrap();
        assert!(target.exists());
        assert!(!target.with_file_name("checkpoint.tmp").exists());
    }

    #[test]
    fn test_model_round_trip() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("checkpoint");

        let conv = Conv1d::new(2, 4, 3, Some(1), None).unwrap();
        let writer = CheckpointWriter::create(&target).unwrap();
        writer.write_state(&sample_state()).unwrap();
        writer.write_model("generator", &conv).unwrap();
        writer.commit().unwrap();

        let mut restored = Conv1d::new(2, 4, 3, Some(1), None).unwrap();
        load_model(&target, "generator", &mut restored).unwrap();

        let original = conv.weight.as_ref();
        let loaded = restored.weight.as_ref();
        original.eval().unwrap();
        loaded.eval().unwrap();
        assert_eq!(original.as_slice::<f32>(), loaded.as_slice::<f32>());
    }

    #[test]
    fn test_optimizer_round_trip() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("checkpoint");

        let mut optimizer = Adam::new(1e-4);
        let m = Array::from_slice(&[0.1f32, 0.2], &[2]);
        let v = Array::from_slice(&[0.3f32, 0.4], &[2]);
        optimizer.state.insert(Rc::from("weight"), (m, v));

        let writer = CheckpointWriter::create(&target).unwrap();
        writer.write_state(&sample_state()).unwrap();
        writer.write_optimizer("generator", &optimizer).unwrap();
        writer.commit().unwrap();

        let mut restored = Adam::new(1e-4);
        load_optimizer(&target, "generator", &mut restored).unwrap();

        let (m, v) = restored.state.get("weight").unwrap();
        m.eval().unwrap();
        v.eval().unwrap();
        assert_eq!(m.as_slice::<f32>(), &[0.1, 0.2]);
        assert_eq!(v.as_slice::<f32>(), &[0.3, 0.4]);
    }

    #[test]
    fn test_missing_state_fails_fast() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_state(dir.path()),
            Err(TrainerError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_malformed_state_fails_fast() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "{\"epoch\": 1}").unwrap();

        assert!(matches!(
            read_state(dir.path()),
            Err(TrainerError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_missing_model_file_fails_fast() {
        let dir = TempDir::new().unwrap();
        let mut conv = Conv1d::new(2, 4, 3, Some(1), None).unwrap();

        assert!(matches!(
            load_model(dir.path(), "generator", &mut conv),
            Err(TrainerError::Checkpoint(_))
        ));
    }
}
