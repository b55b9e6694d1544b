//! Lichess opening explorer を人気オラクルとして使うアダプタ。

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use rbook_core::position::PositionKey;
use rbook_core::types::{CandidateMove, PopularityOracle};

/// Lichess opening explorer のエンドポイント（一般対局データベース）。
pub const DEFAULT_ENDPOINT: &str = "https://explorer.lichess.ovh/lichess";

/// オラクルの問い合わせ設定。
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: String,
    /// 集計対象のレーティング帯。カンマ区切りでAPIへ渡す。
    pub ratings: Vec<u32>,
    /// 集計対象の時間形式。
    pub speeds: Vec<String>,
    /// 問い合わせ後に必ず挟むディレイ（レート制限対策）。
    pub delay: Duration,
    /// HTTPタイムアウト。超過はその問い合わせ1回の失敗として扱う。
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ratings: vec![1600, 1800, 2000, 2200, 2500],
            speeds: vec![
                "blitz".to_string(),
                "rapid".to_string(),
                "classical".to_string(),
            ],
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// explorer API のレスポンスのうち使うフィールドだけを取り出す。
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    moves: Vec<ExplorerMove>,
}

#[derive(Debug, Deserialize)]
struct ExplorerMove {
    uci: String,
    san: String,
    #[serde(default)]
    white: u64,
    #[serde(default)]
    draws: u64,
    #[serde(default)]
    black: u64,
}

/// レスポンス本文を候補手列へ変換する。APIは採用数降順で返す契約なので
/// ここでは並べ替えない。
fn decode_moves(body: &str, breadth: usize) -> Result<Vec<CandidateMove>> {
    let decoded: ExplorerResponse =
        serde_json::from_str(body).context("malformed opening explorer response")?;
    Ok(decoded
        .moves
        .into_iter()
        .take(breadth)
        .map(|m| CandidateMove {
            games: m.white + m.draws + m.black,
            uci: m.uci,
            san: m.san,
            white: m.white,
            draws: m.draws,
            black: m.black,
        })
        .collect())
}

pub struct LichessOracle {
    client: Client,
    cfg: OracleConfig,
}

impl LichessOracle {
    pub fn new(cfg: OracleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, cfg })
    }

    fn fetch(&self, fen: &str, breadth: usize) -> Result<Vec<CandidateMove>> {
        let ratings = self
            .cfg
            .ratings
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let speeds = self.cfg.speeds.join(",");
        let moves_param = breadth.to_string();
        let response = self
            .client
            .get(&self.cfg.endpoint)
            .query(&[
                ("fen", fen),
                ("ratings", ratings.as_str()),
                ("speeds", speeds.as_str()),
                ("moves", moves_param.as_str()),
            ])
            .send()
            .with_context(|| format!("GET {}", self.cfg.endpoint))?;
        let status = response.status();
        anyhow::ensure!(status.is_success(), "HTTP {status} from opening explorer");
        let body = response
            .text()
            .context("failed to read opening explorer response")?;
        decode_moves(&body, breadth)
    }
}

impl PopularityOracle for LichessOracle {
    /// 候補手を問い合わせる。失敗は空列として返し、成功・失敗にかかわらず
    /// 問い合わせ後ディレイを必ず挟む。
    fn popular_moves(&mut self, pos: &PositionKey, breadth: usize) -> Vec<CandidateMove> {
        let result = self.fetch(pos.as_str(), breadth);
        thread::sleep(self.cfg.delay);
        match result {
            Ok(moves) => moves,
            Err(e) => {
                log::error!("opening explorer query failed: {e:#}");
                Vec::new()
            }
        }
    }
}
