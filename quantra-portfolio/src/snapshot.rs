use crate::{TradeRecord, position::Position};
use quantra_execution::balance::Balance;
use quantra_instrument::{asset::AssetName, symbol::Symbol};
use quantra_integration::error::ExchangeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SCHEMA_VERSION: u32 = 1;
const BACKUPS_KEPT: usize = 5;

/// On-disk portfolio state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortfolioSnapshot {
    pub schema_version: u32,
    pub base_currency: AssetName,
    pub balances: HashMap<AssetName, Balance>,
    pub positions: HashMap<Symbol, Position>,
    pub trades: Vec<TradeRecord>,
    pub initial_balance: Decimal,
    pub peak_balance: Decimal,
}

impl PortfolioSnapshot {
    fn validate(self) -> Result<Self, ExchangeError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ExchangeError::StateCorrupt(format!(
                "unsupported schema_version {}",
                self.schema_version
            )));
        }
        for (asset, balance) in &self.balances {
            if balance.free < Decimal::ZERO || balance.used < Decimal::ZERO {
                return Err(ExchangeError::StateCorrupt(format!(
                    "negative balance for {asset}"
                )));
            }
        }
        for (symbol, position) in &self.positions {
            if position.size <= Decimal::ZERO {
                return Err(ExchangeError::StateCorrupt(format!(
                    "non-positive position size for {symbol}"
                )));
            }
        }
        Ok(self)
    }
}

/// Snapshot file manager: atomic writes, backup rotation and a lock file that keeps
/// two engine instances from racing on the same state.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SnapshotStore {
    /// Open the store, acquiring the lock file beside the snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ExchangeError> {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|error| ExchangeError::Config(format!("state dir: {error}")))?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut lock) => {
                let _ = writeln!(lock, "{}", std::process::id());
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ExchangeError::Config(format!(
                    "state file is locked by another engine instance ({})",
                    lock_path.display()
                )));
            }
            Err(error) => {
                return Err(ExchangeError::Config(format!("state lock: {error}")));
            }
        }

        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a snapshot atomically: write to a temp file, rotate backups, rename
    /// into place.
    pub fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), ExchangeError> {
        let payload = serde_json::to_vec_pretty(snapshot)
            .map_err(|error| ExchangeError::Internal(format!("snapshot serialize: {error}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &payload)
            .map_err(|error| ExchangeError::Internal(format!("snapshot write: {error}")))?;

        self.rotate_backups();

        fs::rename(&tmp_path, &self.path)
            .map_err(|error| ExchangeError::Internal(format!("snapshot rename: {error}")))?;
        info!(path = %self.path.display(), "portfolio snapshot saved");
        Ok(())
    }

    /// Shift `portfolio.json -> .1 -> .2 ...`, keeping the last [`BACKUPS_KEPT`].
    fn rotate_backups(&self) {
        if !self.path.exists() {
            return;
        }
        for index in (1..BACKUPS_KEPT).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                let _ = fs::rename(&from, self.backup_path(index + 1));
            }
        }
        if let Err(error) = fs::copy(&self.path, self.backup_path(1)) {
            warn!(?error, "failed to rotate snapshot backup");
        }
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    /// Load and integrity-check the snapshot. `Ok(None)` when no snapshot exists yet;
    /// a present-but-unreadable snapshot is [`ExchangeError::StateCorrupt`].
    pub fn load(&self) -> Result<Option<PortfolioSnapshot>, ExchangeError> {
        let payload = match fs::read(&self.path) {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(ExchangeError::StateCorrupt(format!(
                    "snapshot read: {error}"
                )));
            }
        };
        let snapshot: PortfolioSnapshot = serde_json::from_slice(&payload).map_err(|error| {
            ExchangeError::StateCorrupt(format!("snapshot parse: {error}"))
        })?;
        snapshot.validate().map(Some)
    }
}

impl Drop for SnapshotStore {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
