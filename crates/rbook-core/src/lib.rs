//! 開幕ツリー探索のコアライブラリ。
//!
//! 人気オラクル（実対局での採用頻度）と局面評価器（最善応手と評価値）を
//! 組み合わせ、開幕ツリーを深さ優先で展開する。高価な結果はすべて
//! (局面, 候補手) 単位でキャッシュされ、あらゆる状態変化の直後に
//! チェックポイントへ保存されるため、実行は任意の時点で中断・再開できる。
//!
//! このクレートはネットワークにもプロセスにも触れない。コラボレータは
//! [`types`] のトレイト境界で注入される（実装は `tools` クレート側）。

pub mod cache;
pub mod checkpoint;
pub mod explore;
pub mod position;
pub mod record;
pub mod state;
pub mod types;

pub use cache::{BestReply, CacheKey, ResultCache, StoreOutcome};
pub use checkpoint::CheckpointStore;
pub use explore::{ExploreConfig, ExploreStatus, Explorer};
pub use position::{
    apply_uci, parse_opening_line, san_label, starting_position, LineParseError, ParsedLine,
    PositionKey,
};
pub use record::{move_path_label, LineRecord};
pub use state::PersistentState;
pub use types::{
    CandidateMove, EngineReply, Ply, PopularityOracle, RecordSink, ReplyEvaluator, Score,
};
