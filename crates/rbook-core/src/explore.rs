//! 開幕ツリーの深さ優先探索エンジン。
//!
//! 各局面で人気オラクルに候補手を問い合わせ、候補ごとに最善応手を
//! キャッシュ経由で取得し、応手後の局面へ再帰する。高価な計算は
//! (局面, 候補手) ごとに最大1回。状態が変わるたびにチェックポイントを
//! 保存するので、中断で失われるのは実行中の評価1件分だけ。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use shakmaty::Chess;

use crate::cache::{BestReply, CacheKey, StoreOutcome};
use crate::checkpoint::CheckpointStore;
use crate::position::{apply_uci, PositionKey};
use crate::record::{move_path_label, LineRecord};
use crate::state::PersistentState;
use crate::types::{CandidateMove, Ply, PopularityOracle, RecordSink, ReplyEvaluator};

/// 探索パラメータ。実行ごとの設定であり、局面ごとの状態ではない。
/// 実行間で変えても既存キャッシュは無効にならない。
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// 各局面で検討する候補手の最大数。
    pub breadth: usize,
    /// 候補手として採用する最小対局数。全候補がこれを下回る局面で枝は
    /// 打ち切り（オラクル枯渇が基底ケース。評価器枯渇ではない）。
    pub min_games: u64,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            breadth: 5,
            min_games: 500,
        }
    }
}

/// 再帰1回分の結果。
///
/// キャンセルはここを伝って根まで戻る。途中で切り上げた部分木の祖先は
/// explored になってはならない（再開時にその部分木を取りこぼすため）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreStatus {
    Completed,
    Cancelled,
}

/// 探索エンジン本体。
///
/// 実行中の [`PersistentState`] はこの型が排他的に所有・変更する。
/// チェックポイントストアは保存・復元の依頼を受けるだけで状態を持たない。
pub struct Explorer<'a, O, E> {
    cfg: ExploreConfig,
    oracle: &'a mut O,
    evaluator: &'a mut E,
    store: &'a CheckpointStore,
    state: PersistentState,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a, O: PopularityOracle, E: ReplyEvaluator> Explorer<'a, O, E> {
    pub fn new(
        cfg: ExploreConfig,
        oracle: &'a mut O,
        evaluator: &'a mut E,
        store: &'a CheckpointStore,
        state: PersistentState,
    ) -> Self {
        Self {
            cfg,
            oracle,
            evaluator,
            store,
            state,
            stop: None,
        }
    }

    /// 停止フラグを設定する。各局面の処理に入る直前に検査される。
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn into_state(self) -> PersistentState {
        self.state
    }

    /// `start` から探索を実行する。`history` は開始局面までの手順
    /// （レコードのラベルとPGNに使う）。
    pub fn run(
        &mut self,
        start: Chess,
        history: Vec<Ply>,
        sink: Option<&mut RecordSink<'_>>,
    ) -> Result<ExploreStatus> {
        let mut noop = |_: &LineRecord, _: &[Ply]| -> anyhow::Result<()> { Ok(()) };
        let sink: &mut RecordSink<'_> = match sink {
            Some(sink) => sink,
            None => &mut noop,
        };
        let mut path = history;
        self.explore(start, &mut path, 0, sink)
    }

    fn cancelled(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn explore(
        &mut self,
        pos: Chess,
        path: &mut Vec<Ply>,
        depth: usize,
        sink: &mut RecordSink<'_>,
    ) -> Result<ExploreStatus> {
        if self.cancelled() {
            return Ok(ExploreStatus::Cancelled);
        }

        let key = PositionKey::from_position(&pos);
        let indent = "  ".repeat(depth);
        let here = move_path_label(path);

        // 別経路で到達済みの局面（トランスポジション）も、再開で再訪した
        // 部分木も、ここで等しく枝刈りされる
        if self.state.cache.is_explored(&key) {
            println!("{indent}skipping fully explored position: {here}");
            return Ok(ExploreStatus::Completed);
        }

        println!("\n{indent}analyzing position after: {here}");
        let candidates: Vec<CandidateMove> = self
            .oracle
            .popular_moves(&key, self.cfg.breadth)
            .into_iter()
            .filter(|c| c.games >= self.cfg.min_games)
            .collect();

        if candidates.is_empty() {
            println!(
                "{indent}no continuations with at least {} games",
                self.cfg.min_games
            );
            self.state.cache.mark_explored(&key);
            self.store.save(&self.state)?;
            return Ok(ExploreStatus::Completed);
        }
        println!("{indent}found {} popular continuations", candidates.len());

        let total = candidates.len();
        for (i, cand) in candidates.into_iter().enumerate() {
            if self.cancelled() {
                return Ok(ExploreStatus::Cancelled);
            }

            // オラクル由来の表記が不正なら、その候補だけ捨てて続行する
            let after_candidate = match apply_uci(&pos, &cand.uci) {
                Ok((_, next)) => next,
                Err(e) => {
                    log::warn!("skipping candidate `{}` ({}): {e:#}", cand.san, cand.uci);
                    continue;
                }
            };

            let cache_key = CacheKey::new(&key, &cand.uci);
            let (reply, fresh) = match self.state.cache.lookup(&cache_key) {
                Some(cached) => {
                    println!(
                        "{indent}move {}/{}: {} ({} games) [cached - best: {}, eval: {}]",
                        i + 1,
                        total,
                        cand.san,
                        cand.games,
                        cached.san,
                        cached.eval
                    );
                    (cached.clone(), false)
                }
                None => {
                    println!(
                        "{indent}move {}/{}: {} ({} games)",
                        i + 1,
                        total,
                        cand.san,
                        cand.games
                    );
                    let Some(raw) = self.evaluator.best_reply(&after_candidate) else {
                        // 評価器の失敗は記憶しない。explored 前に再訪すれば
                        // 再試行される
                        log::warn!(
                            "no best reply after `{}`; leaving candidate unanalyzed",
                            cand.san
                        );
                        continue;
                    };
                    let reply = BestReply {
                        uci: raw.uci,
                        san: raw.san,
                        eval: raw.eval.flipped(),
                    };
                    println!("{indent}  best reply: {} (eval: {})", reply.san, reply.eval);
                    match self.state.cache.store(cache_key, reply.clone()) {
                        StoreOutcome::Inserted | StoreOutcome::Duplicate => {}
                        StoreOutcome::Conflict => {
                            log::error!(
                                "cache conflict at ({}, {}): evaluator returned a different \
                                 result for a known key; keeping the stored one",
                                key,
                                cand.uci
                            );
                        }
                    }
                    (reply, true)
                }
            };

            path.push(Ply::new(cand.uci.clone(), cand.san.clone()));
            path.push(Ply::new(reply.uci.clone(), reply.san.clone()));

            if fresh {
                let record = self.state.emit_record(path, reply.eval, cand.games);
                sink(&record, path)?;
                self.store.save(&self.state)?;
            }

            // キャッシュヒットでもここは通る。再開した実行が下流の部分木を
            // 掘り直せるのは、ウォームパスでも再帰するからである
            match apply_uci(&after_candidate, &reply.uci) {
                Ok((_, after_reply)) => {
                    let status = self.explore(after_reply, path, depth + 1, sink)?;
                    path.pop();
                    path.pop();
                    if status == ExploreStatus::Cancelled {
                        return Ok(ExploreStatus::Cancelled);
                    }
                }
                Err(e) => {
                    log::warn!(
                        "cached reply `{}` does not apply after `{}`: {e:#}; not recursing",
                        reply.uci,
                        cand.uci
                    );
                    path.pop();
                    path.pop();
                }
            }
        }

        // 全候補を処理し終えた局面だけが explored になる
        self.state.cache.mark_explored(&key);
        self.store.save(&self.state)?;
        Ok(ExploreStatus::Completed)
    }
}
