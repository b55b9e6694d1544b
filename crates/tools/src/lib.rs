//! 開幕ツリー探索のコラボレータ実装とCLIユーティリティ。
//!
//! - [`lichess`]: 人気オラクル（Lichess opening explorer, HTTP）
//! - [`engine`]: 局面評価器（UCIエンジンのサブプロセス）
//! - [`pgn`]: 完成ラインのPGN書き出し（レコードシンク）
//! - [`summary`]: 実行終了時のサマリ出力

pub mod engine;
pub mod lichess;
pub mod pgn;
pub mod summary;

pub use engine::{EngineConfig, UciEvaluator};
pub use lichess::{LichessOracle, OracleConfig};
pub use pgn::VariationWriter;
pub use summary::AnalysisSummary;
