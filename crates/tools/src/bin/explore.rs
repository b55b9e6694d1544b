use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rbook_core::{
    parse_opening_line, CheckpointStore, ExploreConfig, ExploreStatus, Explorer, LineRecord, Ply,
    PositionKey,
};
use tools::engine::{EngineConfig, UciEvaluator};
use tools::lichess::{LichessOracle, OracleConfig};
use tools::pgn::{ensure_out_dir, VariationWriter};
use tools::summary::{self, AnalysisSummary};

/// Lichessの人気手にUCIエンジンの最善応手を当てて開幕ツリーを掘り下げる。
///
/// # よく使うコマンド例
///
/// - レフェレンス設定そのままで探索:
///   `cargo run -p tools --bin explore -- --engine /path/to/stockfish --start "1. Nf3 d5 2. g3"`
///
/// - 浅く広く（深さを落として候補を増やす）:
///   `cargo run -p tools --bin explore -- --engine stockfish --breadth 10 --search-depth 20 --min-games 1000`
///
/// 中断はCtrl-C。進捗は出力ディレクトリの progress.json に保存され、
/// 同じコマンドの再実行で続きから再開する。
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "explore popular opening lines vs engine best replies"
)]
struct Cli {
    /// Path to a UCI engine binary (e.g. stockfish)
    #[arg(long)]
    engine: PathBuf,

    /// Opening line to start from, as movetext (e.g. "1. Nf3 d5 2. g3")
    #[arg(long, default_value = "")]
    start: String,

    /// Minimum games required to keep exploring a candidate move
    #[arg(long, default_value_t = 500)]
    min_games: u64,

    /// Maximum candidate moves per position
    #[arg(long, default_value_t = 5)]
    breadth: usize,

    /// Engine search depth for the best reply
    #[arg(long, default_value_t = 40)]
    search_depth: u32,

    /// Engine analysis depth for the post-reply evaluation
    #[arg(long, default_value_t = 20)]
    eval_depth: u32,

    /// Delay after every opening-explorer query, in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Engine Threads option
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Engine Hash option, in MiB
    #[arg(long, default_value_t = 2048)]
    hash_mb: u32,

    /// Additional UCI options (Name=Value), repeatable
    #[arg(long = "uci-option")]
    uci_options: Vec<String>,

    /// Rating buckets forwarded to the opening explorer
    #[arg(long, value_delimiter = ',', default_values_t = [1600u32, 1800, 2000, 2200, 2500])]
    ratings: Vec<u32>,

    /// Time controls forwarded to the opening explorer
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = ["blitz".to_string(), "rapid".to_string(), "classical".to_string()]
    )]
    speeds: Vec<String>,

    /// Output directory (default: derived from the start line)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Checkpoint file name inside the output directory
    #[arg(long, default_value = "progress.json")]
    checkpoint_file: String,
}

/// 出力ディレクトリ名を開始手順から導出する（`analysis_1_Nf3_d5_2_g3` 形式）。
fn default_out_dir(start: &str) -> PathBuf {
    let trimmed = start.trim();
    if trimmed.is_empty() {
        return PathBuf::from("analysis_startpos");
    }
    let slug = trimmed.replace(' ', "_").replace('.', "");
    PathBuf::from(format!("analysis_{slug}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let parsed = parse_opening_line(&cli.start);
    for skipped in &parsed.skipped {
        log::warn!("start line: {skipped}; token dropped");
    }

    let out_dir = cli.out_dir.clone().unwrap_or_else(|| default_out_dir(&cli.start));
    ensure_out_dir(&out_dir)?;

    println!("Popular moves vs engine best response");
    println!("{}", "=".repeat(60));
    println!(
        "Starting position: {}",
        if cli.start.trim().is_empty() {
            "(initial position)"
        } else {
            cli.start.trim()
        }
    );
    println!("FEN: {}", PositionKey::from_position(&parsed.position));
    println!("Minimum games threshold: {}", cli.min_games);
    println!("Candidate breadth: {}", cli.breadth);
    println!("{}", "=".repeat(60));

    let store = CheckpointStore::new(out_dir.join(&cli.checkpoint_file));
    let state = store.load();
    if !state.is_empty() {
        println!(
            "Resumed progress: {} cached pairs, {} fully explored, {} variations saved.",
            state.cache.analyzed_len(),
            state.cache.explored_len(),
            state.variation_counter
        );
    }

    let mut oracle = LichessOracle::new(OracleConfig {
        ratings: cli.ratings.clone(),
        speeds: cli.speeds.clone(),
        delay: Duration::from_millis(cli.delay_ms),
        ..OracleConfig::default()
    })?;

    let mut evaluator = UciEvaluator::spawn(EngineConfig {
        path: cli.engine.clone(),
        threads: cli.threads,
        hash_mb: cli.hash_mb,
        search_depth: cli.search_depth,
        eval_depth: cli.eval_depth,
        uci_options: cli.uci_options.clone(),
        ..EngineConfig::default()
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
            eprintln!("stop requested; finishing the current step...");
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let writer = VariationWriter::new(&out_dir, cli.search_depth);
    let mut sink = |record: &LineRecord, plies: &[Ply]| -> Result<()> {
        let path = writer.write(record, plies)?;
        println!("  saved {}", path.display());
        Ok(())
    };

    let cfg = ExploreConfig {
        breadth: cli.breadth,
        min_games: cli.min_games,
    };
    let mut explorer = Explorer::new(cfg, &mut oracle, &mut evaluator, &store, state)
        .with_stop_flag(Arc::clone(&stop));
    let status = explorer.run(parsed.position.clone(), parsed.plies.clone(), Some(&mut sink))?;
    let state = explorer.into_state();

    println!("\n{}", "=".repeat(60));
    match status {
        ExploreStatus::Completed => {
            println!(
                "Analysis complete! Generated {} variations",
                state.variation_counter
            );
        }
        ExploreStatus::Cancelled => {
            println!(
                "Exploration interrupted; progress saved to {}",
                store.path().display()
            );
        }
    }

    let summary = AnalysisSummary::from_state(&state, &cli.start, cli.min_games, cli.search_depth);
    summary.save_json(&out_dir.join("complete_analysis.json"))?;
    summary::save_tree(&out_dir.join("variation_tree.txt"), &state.variations, &cli.start)?;
    summary::print_report(&state);
    Ok(())
}
