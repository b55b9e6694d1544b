//! 実行終了時のサマリ出力（JSON + 深さ別ツリーテキスト + 標準出力）。

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use rbook_core::record::LineRecord;
use rbook_core::state::PersistentState;

/// `complete_analysis.json` のドキュメント。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub starting_position: String,
    pub total_variations: u64,
    pub min_games_threshold: u64,
    pub analysis_depth: u32,
    pub generated_at: String,
    pub variations: Vec<LineRecord>,
}

impl AnalysisSummary {
    pub fn from_state(
        state: &PersistentState,
        starting_position: &str,
        min_games: u64,
        analysis_depth: u32,
    ) -> Self {
        Self {
            starting_position: starting_position.to_string(),
            total_variations: state.variation_counter,
            min_games_threshold: min_games,
            analysis_depth,
            generated_at: chrono::Utc::now().to_rfc3339(),
            variations: state.variations.clone(),
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("failed to write summary JSON")?;
        Ok(())
    }
}

/// 変化をply深さごとにまとめたツリーテキストを組み立てる。
pub fn render_tree(records: &[LineRecord], starting_position: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("Opening tree for: {starting_position}\n"));
    out.push_str(&"=".repeat(60));
    out.push('\n');

    let mut by_depth: BTreeMap<usize, Vec<&LineRecord>> = BTreeMap::new();
    for record in records {
        by_depth.entry(record.depth).or_default().push(record);
    }
    for (depth, group) in by_depth {
        out.push_str(&format!("\nDepth {depth} plies:\n"));
        out.push_str(&"-".repeat(40));
        out.push('\n');
        for record in group {
            out.push_str(&format!(
                "Var {:3}: {} (eval: {}, {} games)\n",
                record.number, record.moves, record.eval, record.games
            ));
        }
    }
    out
}

pub fn save_tree(path: &Path, records: &[LineRecord], starting_position: &str) -> Result<()> {
    fs::write(path, render_tree(records, starting_position))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// 標準出力向けの短い集計。
pub fn print_report(state: &PersistentState) {
    println!("\n=== Analysis Summary ===");
    println!("Cached (position, move) pairs: {}", state.cache.analyzed_len());
    println!("Fully explored positions: {}", state.cache.explored_len());
    println!("Saved variations: {}", state.variation_counter);
}
