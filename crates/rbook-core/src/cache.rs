//! 解析結果キャッシュ。
//!
//! `(局面, 候補手)` → 最善応手の表と、完全探索済み局面の集合。どちらも
//! チェックポイントの主要部であり、BTree ベースで保存順を決定的にしている。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::position::PositionKey;
use crate::types::Score;

/// キャッシュキー。`"<正準FEN>|<uci>"`。
///
/// 「この局面からこの候補手を指した場合の最善応手計算」を一意に識別する。
/// 探索順にも実行回数にも依存しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(pos: &PositionKey, uci: &str) -> Self {
        CacheKey(format!("{}|{}", pos.as_str(), uci))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn into_inner(self) -> String {
        self.0
    }
}

/// キャッシュ済みの最善応手。
///
/// `eval` は反転適用後の値、つまり応手を指した側から見た評価値。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestReply {
    pub uci: String,
    pub san: String,
    pub eval: Score,
}

/// [`ResultCache::store`] の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StoreOutcome {
    /// 新規登録。
    Inserted,
    /// 同一値の再登録（no-op）。
    Duplicate,
    /// 既存と異なる値が来た。既存値を保持する。評価器が決定的である前提が
    /// 崩れているか、キー衝突のバグなので、呼び出し側は大きく報告すること。
    Conflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCache {
    #[serde(default)]
    analyzed: BTreeMap<String, BestReply>,
    #[serde(default)]
    explored: BTreeSet<String>,
}

impl ResultCache {
    /// 純粋な読み取り。副作用なし。
    pub fn lookup(&self, key: &CacheKey) -> Option<&BestReply> {
        self.analyzed.get(key.as_str())
    }

    /// 結果を登録する。同一値の再登録は no-op。既存と異なる値は拒否し、
    /// 既存値を保持したまま [`StoreOutcome::Conflict`] を返す。
    pub fn store(&mut self, key: CacheKey, reply: BestReply) -> StoreOutcome {
        match self.analyzed.get(key.as_str()) {
            Some(existing) if *existing == reply => StoreOutcome::Duplicate,
            Some(_) => StoreOutcome::Conflict,
            None => {
                self.analyzed.insert(key.into_inner(), reply);
                StoreOutcome::Inserted
            }
        }
    }

    /// 局面を完全探索済みとして記録する。
    ///
    /// 以後この局面に（別経路からでも）到達した探索は、オラクルにも評価器
    /// にも問い合わせず即座に引き返す。
    pub fn mark_explored(&mut self, pos: &PositionKey) {
        self.explored.insert(pos.as_str().to_string());
    }

    pub fn is_explored(&self, pos: &PositionKey) -> bool {
        self.explored.contains(pos.as_str())
    }

    pub fn analyzed_len(&self) -> usize {
        self.analyzed.len()
    }

    pub fn explored_len(&self) -> usize {
        self.explored.len()
    }
}
