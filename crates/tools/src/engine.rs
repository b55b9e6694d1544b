//! UCIエンジンを局面評価器として使うアダプタ。
//!
//! エンジンは実行全体で1プロセスだけ起動し、Drop時に quit → 猶予付き待機 →
//! kill の順で必ず解放する。探索中の失敗（タイムアウト・プロセス死・不正な
//! bestmove）は `None` に落とし、トラバーサル全体は止めない。

use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use shakmaty::Chess;

use rbook_core::position::{apply_uci, san_label, PositionKey};
use rbook_core::types::{EngineReply, ReplyEvaluator, Score};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_SEARCH_TIMEOUT: Duration = Duration::from_secs(600);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 詰みスコアのセンチポーン換算の上限。`mate n` は `±(10000 - |n|)` に写す。
pub const MATE_SCORE_CP: i32 = 10_000;

/// エンジンプロセス起動時の設定。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub threads: usize,
    pub hash_mb: u32,
    /// 最善応手を求める探索深さ。
    pub search_depth: u32,
    /// 応手後局面の評価に使う（浅めの）探索深さ。
    pub eval_depth: u32,
    /// 追加のUCIオプション (Name=Value 形式)。
    pub uci_options: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            args: Vec::new(),
            threads: 8,
            hash_mb: 2048,
            search_depth: 40,
            eval_depth: 20,
            uci_options: Vec::new(),
        }
    }
}

/// info行のスナップショット。multipv≠1 の行は無視する。
#[derive(Debug, Clone, Default)]
pub struct InfoSnapshot {
    pub depth: Option<u32>,
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
}

impl InfoSnapshot {
    /// info 行を解析して直近値を上書きする。
    pub fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        let mut i = 1;
        while i + 1 < tokens.len() {
            if tokens[i] == "multipv" && tokens[i + 1] != "1" {
                return;
            }
            i += 1;
        }
        let mut i = 1;
        while i < tokens.len() {
            match tokens[i] {
                "depth" => {
                    if let Some(v) = tokens.get(i + 1).and_then(|t| t.parse().ok()) {
                        self.depth = Some(v);
                    }
                }
                "score" => match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(&"cp"), Some(v)) => {
                        if let Ok(v) = v.parse() {
                            self.score_cp = Some(v);
                            self.score_mate = None;
                        }
                    }
                    (Some(&"mate"), Some(v)) => {
                        if let Ok(v) = v.parse() {
                            self.score_mate = Some(v);
                            self.score_cp = None;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
            i += 1;
        }
    }

    /// 直近スコアをセンチポーンへ正規化する。
    ///
    /// 値は解析局面の手番側視点。`mate n` は n > 0（手番側が詰ます）を正、
    /// n <= 0（手番側が詰まされる）を負として `±(MATE_SCORE_CP - |n|)` に写す。
    pub fn score(&self) -> Option<Score> {
        if let Some(mate) = self.score_mate {
            let magnitude = MATE_SCORE_CP - mate.abs();
            return Some(Score(if mate > 0 { magnitude } else { -magnitude }));
        }
        self.score_cp.map(Score)
    }
}

/// 1本のUCIエンジンプロセスに対する入出力をカプセル化する。
pub struct UciEvaluator {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    cfg: EngineConfig,
    label: String,
}

impl UciEvaluator {
    /// エンジンプロセスを起動してUCI初期化する。
    pub fn spawn(cfg: EngineConfig) -> Result<Self> {
        let label = cfg
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("engine")
            .to_string();
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

        // 非同期読み込みスレッド。エンジン終了かチャネル切断で抜ける
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            cfg,
            label,
        };
        engine.initialize()?;
        Ok(engine)
    }

    fn initialize(&mut self) -> Result<()> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }
        let threads = self.cfg.threads.to_string();
        self.set_option_if_available("Threads", &threads)?;
        let hash = self.cfg.hash_mb.to_string();
        self.set_option_if_available("Hash", &hash)?;
        let extra = self.cfg.uci_options.clone();
        for opt in &extra {
            if let Some((name, value)) = opt.split_once('=') {
                self.set_option_if_available(name.trim(), value.trim())?;
            } else {
                self.write_line(&format!("setoption name {}", opt.trim()))?;
            }
        }
        self.sync_ready()?;
        self.write_line("ucinewgame")?;
        self.sync_ready()?;
        Ok(())
    }

    fn sync_ready(&mut self) -> Result<()> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == "readyok" {
                break;
            }
        }
        Ok(())
    }

    fn recv_line(&self, timeout: Duration) -> Result<String> {
        self.rx
            .recv_timeout(timeout)
            .map_err(|_| anyhow!("{}: engine read timeout", self.label))
    }

    fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {name} value {value}"))?;
        }
        Ok(())
    }

    fn write_line(&mut self, msg: &str) -> Result<()> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// 指定局面を固定深さで探索し、(bestmove, 最終infoスナップショット) を返す。
    fn go_depth(&mut self, fen: &str, depth: u32) -> Result<(Option<String>, InfoSnapshot)> {
        self.write_line(&format!("position fen {fen}"))?;
        self.write_line(&format!("go depth {depth}"))?;
        let mut snapshot = InfoSnapshot::default();
        loop {
            match self.rx.recv_timeout(ENGINE_SEARCH_TIMEOUT) {
                Ok(line) => {
                    if line.starts_with("info") {
                        snapshot.update_from_line(&line);
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix("bestmove") {
                        let mv = match rest.split_whitespace().next() {
                            None | Some("(none)") | Some("0000") => None,
                            Some(m) => Some(m.to_string()),
                        };
                        return Ok((mv, snapshot));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    bail!("{}: engine search timeout", self.label)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("{}: engine exited unexpectedly", self.label)
                }
            }
        }
    }

    fn best_reply_inner(&mut self, pos: &Chess) -> Result<Option<EngineReply>> {
        let fen = PositionKey::from_position(pos);
        let (Some(uci), _) = self.go_depth(fen.as_str(), self.cfg.search_depth)? else {
            // 指し手なし（詰み・ステイルメイト）。失敗ではなく「応手なし」
            return Ok(None);
        };
        let (mv, after_reply) = apply_uci(pos, &uci)
            .with_context(|| format!("engine returned unusable bestmove `{uci}`"))?;
        let san = san_label(pos, &mv);

        // 応手後の局面を浅めに解析してスコアを取る。この値は応手後局面の
        // 手番側視点であり、符号反転は探索エンジン側の責務
        let after_fen = PositionKey::from_position(&after_reply);
        let (_, info) = self.go_depth(after_fen.as_str(), self.cfg.eval_depth)?;
        let Some(eval) = info.score() else {
            bail!("{}: no score in post-reply analysis", self.label);
        };
        Ok(Some(EngineReply { uci, san, eval }))
    }
}

impl ReplyEvaluator for UciEvaluator {
    fn best_reply(&mut self, pos: &Chess) -> Option<EngineReply> {
        match self.best_reply_inner(pos) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("{}: best-reply query failed: {e:#}", self.label);
                None
            }
        }
    }
}

impl Drop for UciEvaluator {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `name <Name> type ...` 形式の option 行本体からオプション名を取り出す。
fn parse_option_name(rest: &str) -> Option<String> {
    let rest = rest.strip_prefix("name ")?;
    let name = match rest.find(" type ") {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_line_updates_snapshot() {
        let mut snap = InfoSnapshot::default();
        snap.update_from_line("info depth 18 seldepth 24 score cp 35 nodes 123456 pv e2e4");
        assert_eq!(snap.depth, Some(18));
        assert_eq!(snap.score_cp, Some(35));
        assert_eq!(snap.score(), Some(Score(35)));
    }

    #[test]
    fn later_score_overrides_earlier() {
        let mut snap = InfoSnapshot::default();
        snap.update_from_line("info depth 10 score cp 35");
        snap.update_from_line("info depth 12 score cp -8");
        assert_eq!(snap.score(), Some(Score(-8)));
    }

    #[test]
    fn mate_scores_are_clamped_and_signed() {
        let mut snap = InfoSnapshot::default();
        snap.update_from_line("info depth 12 score mate 3");
        assert_eq!(snap.score(), Some(Score(9997)));
        snap.update_from_line("info depth 12 score mate -5");
        assert_eq!(snap.score(), Some(Score(-9995)));
        // mate 0: 手番側が詰まされている
        snap.update_from_line("info depth 0 score mate 0");
        assert_eq!(snap.score(), Some(Score(-MATE_SCORE_CP)));
    }

    #[test]
    fn secondary_multipv_lines_are_ignored() {
        let mut snap = InfoSnapshot::default();
        snap.update_from_line("info depth 12 multipv 1 score cp 40");
        snap.update_from_line("info depth 12 multipv 2 score cp -300");
        assert_eq!(snap.score(), Some(Score(40)));
    }

    #[test]
    fn non_info_lines_are_ignored() {
        let mut snap = InfoSnapshot::default();
        snap.update_from_line("bestmove e2e4 ponder e7e5");
        assert_eq!(snap.score(), None);
    }

    #[test]
    fn option_names_are_extracted() {
        assert_eq!(
            parse_option_name("name Hash type spin default 16 min 1 max 33554432"),
            Some("Hash".to_string())
        );
        assert_eq!(
            parse_option_name("name Skill Level type spin default 20"),
            Some("Skill Level".to_string())
        );
        assert_eq!(parse_option_name("type spin default 16"), None);
    }
}
