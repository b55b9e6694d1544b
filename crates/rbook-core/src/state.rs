//! チェックポイント対象の永続状態。

use serde::{Deserialize, Serialize};

use crate::cache::ResultCache;
use crate::record::{move_path_label, LineRecord};
use crate::types::{Ply, Score};

/// 1回の探索実行が所有・変更する永続状態の集約。
///
/// チェックポイントはこの値を丸ごと1つのJSONドキュメントとして保存・復元
/// する。全フィールドに既定値があるので、欠けたフィールドは空/ゼロとして
/// 読み込まれ、古いドキュメントの読み込みが失敗することはない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// 解析結果キャッシュと完全探索済み集合。
    #[serde(flatten)]
    pub cache: ResultCache,
    /// 最後に割り当てたレコード連番。
    #[serde(default)]
    pub variation_counter: u64,
    /// これまでに発行した全レコード（追記専用）。
    #[serde(default)]
    pub variations: Vec<LineRecord>,
}

impl PersistentState {
    /// 新規計算されたラインのレコードを発行して追加する。
    ///
    /// コールドパス（評価器を実際に呼んだ直後）専用。連番は単調増加で、
    /// 発行済みレコードが変更・削除されることはない。
    pub fn emit_record(&mut self, plies: &[Ply], eval: Score, games: u64) -> LineRecord {
        self.variation_counter += 1;
        let record = LineRecord {
            number: self.variation_counter,
            moves: move_path_label(plies),
            eval,
            games,
            depth: plies.len(),
        };
        self.variations.push(record.clone());
        record
    }

    /// まだ何も記録されていない新規状態かどうか。
    pub fn is_empty(&self) -> bool {
        self.cache.analyzed_len() == 0
            && self.cache.explored_len() == 0
            && self.variation_counter == 0
            && self.variations.is_empty()
    }
}
