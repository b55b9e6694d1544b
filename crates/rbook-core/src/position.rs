//! 局面の正準キーとルールエンジン境界（shakmaty の薄いラッパ）。
//!
//! コアの他モジュールは shakmaty の API に直接触れず、ここを経由する。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};
use thiserror::Error;

use crate::types::Ply;

/// 局面の正準キー。
///
/// 完全なFEN（配置・手番・キャスリング権・アンパッサン・手数カウンタ）。
/// アンパッサン欄は `EnPassantMode::Legal` で出力するため、実際に取れる
/// 場合にしか現れない。これにより、手順違いで合流した同一局面
/// （トランスポジション）はもちろん、死んだアンパッサン権だけが異なる
/// ルール等価な局面も同じキーに潰れる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn from_position(pos: &Chess) -> Self {
        PositionKey(Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 初期局面。
pub fn starting_position() -> Chess {
    Chess::default()
}

/// UCI表記の指し手を合法性確認込みで適用し、(指し手, 適用後局面) を返す。
///
/// 不正な表記・非合法手はエラー。呼び出し側は該当候補をスキップして続行する。
pub fn apply_uci(pos: &Chess, uci: &str) -> Result<(Move, Chess)> {
    let parsed: UciMove = uci
        .parse()
        .with_context(|| format!("malformed uci move `{uci}`"))?;
    let mv = parsed
        .to_move(pos)
        .with_context(|| format!("illegal move `{uci}` in this position"))?;
    let next = pos
        .clone()
        .play(&mv)
        .map_err(|e| anyhow::anyhow!("failed to apply `{uci}`: {e}"))?;
    Ok((mv, next))
}

/// 表示用SANラベル（チェック・メイトの接尾辞付き）。
pub fn san_label(pos: &Chess, mv: &Move) -> String {
    SanPlus::from_move(pos.clone(), mv).to_string()
}

/// 開始手順の1トークン分のパース失敗。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LineParseError {
    #[error("unparseable move token `{0}`")]
    BadToken(String),
    #[error("illegal move `{0}` in this position")]
    IllegalMove(String),
}

/// 開始手順のパース結果。
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// 正常に適用できた手順。
    pub plies: Vec<Ply>,
    /// 手順を適用し終えた局面。
    pub position: Chess,
    /// 読み飛ばしたトークンとその理由。呼び出し側が警告ログに流す。
    pub skipped: Vec<LineParseError>,
}

/// `"1. Nf3 d5 2. g3"` 形式の手順テキストをパースする。
///
/// 手数トークン（`1.` `12...`）と結果トークン（`*` `1-0` など）は読み飛ばし、
/// 残りをSANとして初期局面から順に適用する。解釈できないトークンは
/// `skipped` に理由を残して捨て、1トークンの失敗で全体を失敗させない。
pub fn parse_opening_line(text: &str) -> ParsedLine {
    let mut pos = Chess::default();
    let mut plies = Vec::new();
    let mut skipped = Vec::new();

    for raw in text.split_whitespace() {
        if matches!(raw, "*" | "1-0" | "0-1" | "1/2-1/2") {
            continue;
        }
        let token = raw.trim_end_matches('.');
        if token.is_empty() || token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let san: SanPlus = match token.parse() {
            Ok(san) => san,
            Err(_) => {
                skipped.push(LineParseError::BadToken(raw.to_string()));
                continue;
            }
        };
        let mv = match san.san.to_move(&pos) {
            Ok(mv) => mv,
            Err(_) => {
                skipped.push(LineParseError::IllegalMove(raw.to_string()));
                continue;
            }
        };
        let label = san_label(&pos, &mv);
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        match pos.clone().play(&mv) {
            Ok(next) => pos = next,
            Err(_) => {
                skipped.push(LineParseError::IllegalMove(raw.to_string()));
                continue;
            }
        }
        plies.push(Ply::new(uci, label));
    }

    ParsedLine {
        plies,
        position: pos,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn starting_position_key() {
        let key = PositionKey::from_position(&starting_position());
        assert_eq!(key.as_str(), START_FEN);
    }

    #[test]
    fn parse_line_with_move_numbers() {
        let parsed = parse_opening_line("1. Nf3 d5 2. g3");
        assert!(parsed.skipped.is_empty());
        let sans: Vec<&str> = parsed.plies.iter().map(|p| p.san.as_str()).collect();
        assert_eq!(sans, ["Nf3", "d5", "g3"]);
        let ucis: Vec<&str> = parsed.plies.iter().map(|p| p.uci.as_str()).collect();
        assert_eq!(ucis, ["g1f3", "d7d5", "g2g3"]);
        assert_eq!(
            PositionKey::from_position(&parsed.position).as_str(),
            "rnbqkbnr/ppp1pppp/8/3p4/8/5NP1/PPPPPP1P/RNBQKB1R b KQkq - 0 2"
        );
    }

    #[test]
    fn parse_line_skips_bad_tokens() {
        let parsed = parse_opening_line("1. Nf3 xyz9 d5 *");
        let sans: Vec<&str> = parsed.plies.iter().map(|p| p.san.as_str()).collect();
        assert_eq!(sans, ["Nf3", "d5"]);
        assert_eq!(
            parsed.skipped,
            vec![LineParseError::BadToken("xyz9".to_string())]
        );
    }

    #[test]
    fn parse_line_skips_illegal_moves() {
        // e5 は白番の初手としては指せない
        let parsed = parse_opening_line("e5 e4");
        let sans: Vec<&str> = parsed.plies.iter().map(|p| p.san.as_str()).collect();
        assert_eq!(sans, ["e4"]);
        assert_eq!(
            parsed.skipped,
            vec![LineParseError::IllegalMove("e5".to_string())]
        );
    }

    #[test]
    fn parse_empty_line_is_startpos() {
        let parsed = parse_opening_line("");
        assert!(parsed.plies.is_empty());
        assert!(parsed.skipped.is_empty());
        assert_eq!(PositionKey::from_position(&parsed.position).as_str(), START_FEN);
    }

    #[test]
    fn transpositions_share_a_key() {
        let a = parse_opening_line("1. Nf3 d5 2. g3 c6");
        let b = parse_opening_line("1. g3 d5 2. Nf3 c6");
        assert!(a.skipped.is_empty() && b.skipped.is_empty());
        assert_eq!(
            PositionKey::from_position(&a.position),
            PositionKey::from_position(&b.position)
        );
    }

    #[test]
    fn apply_uci_rejects_garbage() {
        let pos = starting_position();
        assert!(apply_uci(&pos, "zz99").is_err());
        assert!(apply_uci(&pos, "e2e5").is_err());
        let (_, next) = apply_uci(&pos, "e2e4").unwrap();
        assert_eq!(
            PositionKey::from_position(&next).as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }
}
