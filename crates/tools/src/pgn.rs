//! 完成ラインをPGNファイルへ書き出すレコードシンク。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use rbook_core::record::{move_path_label, LineRecord};
use rbook_core::types::Ply;

/// 変化譜の書き出し先。レコード1件につき `variation_<N>.pgn` を1つ作る。
pub struct VariationWriter {
    out_dir: PathBuf,
    /// PGNヘッダに書くイベント名。
    pub event: String,
    /// 評価コメントに記す探索深さ。
    pub search_depth: u32,
}

impl VariationWriter {
    pub fn new(out_dir: impl Into<PathBuf>, search_depth: u32) -> Self {
        Self {
            out_dir: out_dir.into(),
            event: "Popular moves vs engine best response".to_string(),
            search_depth,
        }
    }

    pub fn path_for(&self, record: &LineRecord) -> PathBuf {
        self.out_dir.join(format!("variation_{}.pgn", record.number))
    }

    /// PGNテキストを組み立てる。
    pub fn render(&self, record: &LineRecord, plies: &[Ply]) -> String {
        let mut pgn = String::new();
        pgn.push_str(&format!("[Event \"{}\"]\n", self.event));
        pgn.push_str(&format!("[Variation \"Variation {}\"]\n", record.number));
        pgn.push_str("[Result \"*\"]\n");
        pgn.push('\n');
        pgn.push_str(&move_path_label(plies));
        pgn.push_str(&format!(
            " {{ engine (depth {}) evaluation: {} }} *\n",
            self.search_depth, record.eval
        ));
        pgn
    }

    /// レコード1件をPGNとして書き出し、書いたパスを返す。
    pub fn write(&self, record: &LineRecord, plies: &[Ply]) -> Result<PathBuf> {
        let path = self.path_for(record);
        fs::write(&path, self.render(record, plies))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// 書き出し先ディレクトリを用意する（既にあれば何もしない）。
pub fn ensure_out_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbook_core::types::Score;

    fn sample_record() -> LineRecord {
        LineRecord {
            number: 7,
            moves: "1. e4 e5".to_string(),
            eval: Score(-20),
            games: 1000,
            depth: 2,
        }
    }

    #[test]
    fn render_has_headers_movetext_and_comment() {
        let writer = VariationWriter::new("out", 40);
        let plies = [Ply::new("e2e4", "e4"), Ply::new("e7e5", "e5")];
        let pgn = writer.render(&sample_record(), &plies);
        assert_eq!(
            pgn,
            "[Event \"Popular moves vs engine best response\"]\n\
             [Variation \"Variation 7\"]\n\
             [Result \"*\"]\n\
             \n\
             1. e4 e5 { engine (depth 40) evaluation: -0.20 } *\n"
        );
    }

    #[test]
    fn write_places_file_by_record_number() {
        let dir = tempfile::tempdir().unwrap();
        let writer = VariationWriter::new(dir.path(), 40);
        let plies = [Ply::new("e2e4", "e4"), Ply::new("e7e5", "e5")];
        let path = writer.write(&sample_record(), &plies).unwrap();
        assert_eq!(path, dir.path().join("variation_7.pgn"));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("1. e4 e5"));
        assert!(text.ends_with("*\n"));
    }
}
