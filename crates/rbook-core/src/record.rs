//! 完成ラインの出力レコードと手順ラベル整形。

use serde::{Deserialize, Serialize};

use crate::types::{Ply, Score};

/// 完成した1ライン（候補手と最善応手で終わる手順）の出力レコード。
///
/// 該当する (局面, 候補手) の結果が初めて計算されたときに1度だけ発行される。
/// キャッシュ再生の再帰では発行されないので、チェックポイントからの再実行が
/// レコードを重複させることはない。追記専用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    /// 連番ID（1始まり）。
    pub number: u64,
    /// `1. e4 e5 2. Nf3` 形式の手順ラベル。
    pub moves: String,
    /// 最終評価値（応手側視点）。
    pub eval: Score,
    /// このラインを完成させた候補手の支持数。
    pub games: u64,
    /// 手順の長さ（ply）。
    pub depth: usize,
}

/// ply列を `N. white black` 形式で連結する。
pub fn move_path_label(plies: &[Ply]) -> String {
    let mut label = String::new();
    for (i, ply) in plies.iter().enumerate() {
        if i % 2 == 0 {
            if !label.is_empty() {
                label.push(' ');
            }
            label.push_str(&format!("{}.", i / 2 + 1));
        }
        label.push(' ');
        label.push_str(&ply.san);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ply(san: &str) -> Ply {
        Ply::new("0000", san)
    }

    #[test]
    fn label_empty_path() {
        assert_eq!(move_path_label(&[]), "");
    }

    #[test]
    fn label_groups_full_moves() {
        let plies = [ply("e4"), ply("e5"), ply("Nf3"), ply("Nc6")];
        assert_eq!(move_path_label(&plies), "1. e4 e5 2. Nf3 Nc6");
    }

    #[test]
    fn label_trailing_white_move() {
        let plies = [ply("Nf3"), ply("d5"), ply("g3")];
        assert_eq!(move_path_label(&plies), "1. Nf3 d5 2. g3");
    }
}
