//! 永続状態のチェックポイント保存・復元。
//!
//! 保存は同一ディレクトリ内の一時ファイルへ書き切ってから rename する。
//! 書き込み途中のクラッシュや並行読みが中途半端なドキュメントを観測する
//! ことはない。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::state::PersistentState;

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// チェックポイントを読み込む。
    ///
    /// ファイルが無ければ新規状態を返す（エラーではない）。読めない・
    /// パースできない場合も警告を出した上で新規状態から始める。読み込みが
    /// 実行を止めることはない。
    pub fn load(&self) -> PersistentState {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "no previous checkpoint at {}; starting fresh",
                    self.path.display()
                );
                return PersistentState::default();
            }
            Err(e) => {
                log::warn!(
                    "could not read checkpoint {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                return PersistentState::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                log::warn!(
                    "could not parse checkpoint {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                PersistentState::default()
            }
        }
    }

    /// 状態を原子的に保存する。
    ///
    /// 失敗は致命的。再開可能性を保証できなくなるため、呼び出し側は実行を
    /// 止めること。
    pub fn save(&self, state: &PersistentState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp checkpoint in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, state).context("failed to serialize checkpoint")?;
        tmp.flush().context("failed to flush checkpoint")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to persist checkpoint {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Ply, Score};

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let mut state = PersistentState::default();
        state.emit_record(
            &[Ply::new("e2e4", "e4"), Ply::new("e7e5", "e5")],
            Score(-20),
            1000,
        );
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "this is not json {").unwrap();
        let store = CheckpointStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_replaces_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let mut state = PersistentState::default();
        store.save(&state).unwrap();
        state.emit_record(&[Ply::new("e2e4", "e4")], Score(10), 1);
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
        // 一時ファイルが残っていないこと
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, ["progress.json"]);
    }
}
