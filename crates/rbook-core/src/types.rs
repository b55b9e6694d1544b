//! 探索全体で共有する値型とコラボレータ境界。

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::Chess;

use crate::position::PositionKey;
use crate::record::LineRecord;

/// 1手分の指し手。UCI表記（機械用）と表示用SANラベルの組。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ply {
    pub uci: String,
    pub san: String,
}

impl Ply {
    pub fn new(uci: impl Into<String>, san: impl Into<String>) -> Self {
        Self {
            uci: uci.into(),
            san: san.into(),
        }
    }
}

/// センチポーン単位の固定小数点評価値。
///
/// 表示はポーン換算の `{:+.2}`（例: `+0.20`）。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Score(pub i32);

impl Score {
    pub const fn centipawns(self) -> i32 {
        self.0
    }

    /// 視点反転。局面の手番側から見た値を、その相手側から見た値へ写す。
    pub const fn flipped(self) -> Score {
        Score(-self.0)
    }

    pub fn pawns(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.2}", self.pawns())
    }
}

/// 人気オラクルが返す候補手。支持数の内訳は元データベースの勝敗分布。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMove {
    pub uci: String,
    pub san: String,
    /// 支持数（white + draws + black の合計）。
    pub games: u64,
    #[serde(default)]
    pub white: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default)]
    pub black: u64,
}

/// 評価器が返す生の応手。
///
/// `eval` は応手後の局面を解析したときの、その局面の手番側から見た生スコア。
/// 探索エンジン側が [`Score::flipped`] で応手側視点へ反転してから記録・
/// キャッシュする。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub uci: String,
    pub san: String,
    pub eval: Score,
}

/// 人気オラクル。候補手を支持数降順で最大 `breadth` 件返す。
///
/// 失敗は空列で表現し、エラーとしては伝播させない。レート制限のための
/// 問い合わせ後ディレイは、成功・失敗を問わず実装側が必ず挟む。
pub trait PopularityOracle {
    fn popular_moves(&mut self, pos: &PositionKey, breadth: usize) -> Vec<CandidateMove>;
}

/// 局面評価器。与えられた局面への最善応手と生スコアを返す。
///
/// 内部エラー（エンジン異常・タイムアウト・指し手なし）は `None`。
pub trait ReplyEvaluator {
    fn best_reply(&mut self, pos: &Chess) -> Option<EngineReply>;
}

/// 新規レコード1件ごとに呼ばれるシンク。完成した手順（ply列）付き。
///
/// キャッシュヒットの再帰では呼ばれない。エラーは探索全体を停止させる。
pub type RecordSink<'a> = dyn FnMut(&LineRecord, &[Ply]) -> anyhow::Result<()> + 'a;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_display_is_signed_pawns() {
        assert_eq!(Score(20).to_string(), "+0.20");
        assert_eq!(Score(-15).to_string(), "-0.15");
        assert_eq!(Score(0).to_string(), "+0.00");
        assert_eq!(Score(123).to_string(), "+1.23");
    }

    #[test]
    fn score_flip_negates() {
        assert_eq!(Score(20).flipped(), Score(-20));
        assert_eq!(Score(-15).flipped(), Score(15));
        assert_eq!(Score(0).flipped(), Score(0));
    }
}
