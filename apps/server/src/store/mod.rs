//! Session state store: file layout of one game directory, atomic
//! writes, and the pre-resolution archive copies.
//!
//! Layout (all JSON):
//!   state.json            engine-owned live snapshot
//!   meta.json             orchestrator-owned session metadata
//!   plan.json             live night plan (absent during Day)
//!   ballot.json           live day ballot (absent during Night)
//!   state.json.dawn.N     snapshot at the start of night N's resolution
//!   state.json.dusk.N     snapshot at the start of day N's resolution
//!   plan.json.N           plan as it stood when night N resolved
//!   ballot.json.N         ballot as it stood when day N resolved
//!   night_result.json.N   composed night-N outcome
//!   day_result.json.N     composed day-N outcome
//!
//! Invariant: exactly one snapshot is live; archives are written before
//! being superseded and never modified afterwards.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::{DayResult, GameMeta, NightResult, Phase, Turn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("game directory {path} is locked by another server process")]
    Locked { path: PathBuf },
}

impl StoreError {
    /// True when the failure is just a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// The live snapshot is opaque to the orchestrator except for its turn
/// counter.
#[derive(Debug, Deserialize)]
struct TurnOnly {
    turn: Turn,
}

pub struct GameStore {
    root: PathBuf,
    meta: GameMeta,
    turn: Turn,
    // Held for the process lifetime; dropping releases the OS lock.
    _lock: File,
}

impl GameStore {
    /// Open a game directory, taking an exclusive lock so two server
    /// processes cannot drive the same session.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        use fs4::fs_std::FileExt;

        let root = root.into();

        let lock_path = root.join(".lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;
        match lock.try_lock_exclusive() {
            Ok(true) => {}
            Ok(false) => return Err(StoreError::Locked { path: root }),
            Err(source) => {
                return Err(StoreError::Io {
                    path: lock_path,
                    source,
                })
            }
        }

        let meta: GameMeta = read_json(&root.join("meta.json"))?;
        let TurnOnly { turn } = read_json(&root.join("state.json"))?;

        info!(game = %meta.name, turn, phase = meta.phase.label(), "opened game directory");

        Ok(Self {
            root,
            meta,
            turn,
            _lock: lock,
        })
    }

    pub fn meta(&self) -> &GameMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut GameMeta {
        &mut self.meta
    }

    pub fn current_phase(&self) -> Phase {
        self.meta.phase
    }

    pub fn current_turn(&self) -> Turn {
        self.turn
    }

    /// Persist `meta.json` atomically: write a sibling temp file, then
    /// rename over the live one. A crash mid-save never leaves a
    /// half-written file observable.
    pub fn save_meta(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.meta_path(), &self.meta)
    }

    /// Re-read the turn counter after the engine rewrote the snapshot.
    pub fn reload_turn(&mut self) -> Result<Turn, StoreError> {
        let TurnOnly { turn } = read_json(&self.state_path())?;
        self.turn = turn;
        Ok(turn)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.root.join("plan.json")
    }

    pub fn ballot_path(&self) -> PathBuf {
        self.root.join("ballot.json")
    }

    pub fn dawn_state_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("state.json.dawn.{turn}"))
    }

    pub fn dusk_state_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("state.json.dusk.{turn}"))
    }

    pub fn archived_plan_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("plan.json.{turn}"))
    }

    pub fn archived_ballot_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("ballot.json.{turn}"))
    }

    fn night_result_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("night_result.json.{turn}"))
    }

    fn day_result_path(&self, turn: Turn) -> PathBuf {
        self.root.join(format!("day_result.json.{turn}"))
    }

    /// Copy the live snapshot and plan into their night-N archive slots
    /// before resolution overwrites them. Returns (snapshot, plan)
    /// archive paths.
    pub fn archive_night_inputs(&self, turn: Turn) -> Result<(PathBuf, PathBuf), StoreError> {
        let state = self.dawn_state_path(turn);
        let plan = self.archived_plan_path(turn);
        copy_file(&self.state_path(), &state)?;
        copy_file(&self.plan_path(), &plan)?;
        Ok((state, plan))
    }

    /// Copy the live snapshot and ballot into their day-N archive slots.
    pub fn archive_day_inputs(&self, turn: Turn) -> Result<(PathBuf, PathBuf), StoreError> {
        let state = self.dusk_state_path(turn);
        let ballot = self.archived_ballot_path(turn);
        copy_file(&self.state_path(), &state)?;
        copy_file(&self.ballot_path(), &ballot)?;
        Ok((state, ballot))
    }

    /// Start an empty plan working set for the incoming night.
    pub fn make_plan(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.plan_path(), &serde_json::json!({}))
    }

    /// Start an empty ballot working set for the incoming day.
    pub fn make_ballot(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.ballot_path(), &serde_json::json!({}))
    }

    pub fn remove_plan(&self) -> Result<(), StoreError> {
        remove_file(&self.plan_path())
    }

    pub fn remove_ballot(&self) -> Result<(), StoreError> {
        remove_file(&self.ballot_path())
    }

    pub fn write_night_result(&self, turn: Turn, result: &NightResult) -> Result<(), StoreError> {
        write_json_atomic(&self.night_result_path(turn), result)
    }

    pub fn read_night_result(&self, turn: Turn) -> Result<NightResult, StoreError> {
        read_json(&self.night_result_path(turn))
    }

    pub fn write_day_result(&self, turn: Turn, result: &DayResult) -> Result<(), StoreError> {
        write_json_atomic(&self.day_result_path(turn), result)
    }

    pub fn read_day_result(&self, turn: Turn) -> Result<DayResult, StoreError> {
        read_json(&self.day_result_path(turn))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn copy_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::copy(from, to).map(|_| ()).map_err(|source| StoreError::Io {
        path: to.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Already gone is fine; only one working set is ever live.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;
    use crate::domain::{GameMeta, Phase, Schedule};

    pub(crate) fn test_meta() -> GameMeta {
        GameMeta {
            name: "test game".to_string(),
            motd: None,
            secret: "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0".to_string(),
            phase: Phase::Night,
            schedule: Schedule {
                night_end: "10:00:00".to_string(),
                day_end: "12:15:00".to_string(),
                twilight_secs: 0,
                utc_offset: "+00:00".to_string(),
                phase_end: None,
            },
            players: BTreeMap::new(),
            factions: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    pub(crate) fn seed_game_dir(dir: &TempDir, meta: &GameMeta) {
        let meta_json = serde_json::to_vec_pretty(meta).unwrap();
        fs::write(dir.path().join("meta.json"), meta_json).unwrap();
        fs::write(dir.path().join("state.json"), br#"{"turn": 1, "rng": []}"#).unwrap();
    }

    #[test]
    fn opens_and_reads_turn_from_opaque_snapshot() {
        let dir = TempDir::new().unwrap();
        seed_game_dir(&dir, &test_meta());

        let store = GameStore::open(dir.path()).unwrap();
        assert_eq!(store.current_turn(), 1);
        assert_eq!(store.current_phase(), Phase::Night);
    }

    #[test]
    fn second_open_is_refused_while_locked() {
        let dir = TempDir::new().unwrap();
        seed_game_dir(&dir, &test_meta());

        let _store = GameStore::open(dir.path()).unwrap();
        match GameStore::open(dir.path()) {
            Err(StoreError::Locked { .. }) => {}
            other => panic!("expected Locked, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn save_meta_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        seed_game_dir(&dir, &test_meta());

        {
            let mut store = GameStore::open(dir.path()).unwrap();
            store.meta_mut().schedule.phase_end = Some(1_700_000_000);
            store.meta_mut().phase = Phase::Day;
            store.save_meta().unwrap();
        }

        let store = GameStore::open(dir.path()).unwrap();
        assert_eq!(store.meta().schedule.phase_end, Some(1_700_000_000));
        assert_eq!(store.current_phase(), Phase::Day);
    }

    #[test]
    fn archives_copy_live_files() {
        let dir = TempDir::new().unwrap();
        seed_game_dir(&dir, &test_meta());

        let store = GameStore::open(dir.path()).unwrap();
        store.make_plan().unwrap();
        let (state, plan) = store.archive_night_inputs(1).unwrap();
        assert!(state.exists());
        assert!(plan.exists());

        // The live plan can be removed without touching the archive.
        store.remove_plan().unwrap();
        assert!(plan.exists());
        assert!(!store.plan_path().exists());
    }
}
