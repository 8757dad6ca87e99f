mod config;
mod output;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tierrank_core::{LoadReport, RankingEngine, RankingMetric};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::TierrankConfig;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

const DEFAULT_STATE_FILE: &str = "tierrank.json";

#[derive(Parser)]
#[command(name = "tierrank", version, about = "Sort images into tiers by voting on pairs")]
struct Cli {
    /// Snapshot file holding the collection (default: config `state`, else ./tierrank.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Path to config file (default: ~/.config/tierrank/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log selection and tier moves to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a default config file at ~/.config/tierrank/config.toml
    Init,
    /// Pick the next pair to compare
    Next(NextArgs),
    /// Record the outcome of one comparison
    Vote {
        #[arg(long)]
        winner: String,
        #[arg(long)]
        loser: String,
    },
    /// Take an item out of the comparison pool
    Exclude { id: String },
    /// Put an excluded item back into the pool
    Restore { id: String },
    /// Show the collection ordered by one metric
    Rankings {
        /// votes, win-rate, tier, stability or recency
        #[arg(long, default_value = "tier")]
        by: RankingMetric,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Collection statistics, tier bounds and distribution
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Items with the lowest (or highest) confidence
    Confidence {
        #[arg(long, default_value_t = 10, conflicts_with = "highest")]
        lowest: usize,
        #[arg(long)]
        highest: Option<usize>,
    },
    /// List algorithm settings, or change them with --set name=value
    Settings {
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Interactive rating loop
    Rate(RateArgs),
}

#[derive(Parser)]
struct NextArgs {
    /// File with one item per line (or a JSON array); default is every active item
    #[arg(long)]
    items: Option<PathBuf>,

    /// Inline item (repeatable)
    #[arg(long = "item")]
    inline_items: Vec<String>,

    /// Skip this pair (as "left,right"), e.g. one the user just passed on
    #[arg(long)]
    skip: Option<String>,

    /// Fixed seed for selection
    #[arg(long)]
    seed: Option<u64>,

    /// Folder the item IDs refer to, stored in the snapshot
    #[arg(long)]
    folder: Option<String>,

    /// Print the pair and explanation as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct RateArgs {
    /// File with one item per line (or a JSON array); default is every active item
    #[arg(long)]
    items: Option<PathBuf>,

    /// Inline item (repeatable)
    #[arg(long = "item")]
    inline_items: Vec<String>,

    /// Fixed seed for selection
    #[arg(long)]
    seed: Option<u64>,

    /// Folder the item IDs refer to, stored in the snapshot
    #[arg(long)]
    folder: Option<String>,
}

/// Parse a string as either a JSON array of strings or plain text (one item per line).
fn parse_items_from_str(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        let items: Vec<String> = serde_json::from_str(trimmed)
            .unwrap_or_else(|e| bail(format!("File looks like JSON but failed to parse: {e}")));
        items.into_iter().filter(|s| !s.trim().is_empty()).collect()
    } else {
        trimmed
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Load candidates from --items and --item. Empty means "every active item".
fn load_items(file: Option<&Path>, inline: &[String]) -> Vec<String> {
    let mut items = Vec::new();

    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| bail(format!("Failed to read items file {}: {e}", path.display())));
        items = parse_items_from_str(&content);
    }
    items.extend(inline.iter().cloned());
    items
}

fn parse_setting(arg: &str) -> (&str, f64) {
    let (name, value) = arg
        .split_once('=')
        .unwrap_or_else(|| bail(format!("Expected NAME=VALUE, got \"{arg}\"")));
    let value: f64 = value
        .trim()
        .parse()
        .unwrap_or_else(|_| bail(format!("Invalid number for {name}: \"{value}\"")));
    (name.trim(), value)
}

/// An engine bound to its snapshot file.
struct Session {
    engine: RankingEngine,
    state: PathBuf,
}

impl Session {
    /// Build the engine from config, then load the snapshot if one exists.
    fn open(cli: &Cli, seed: Option<u64>) -> Session {
        let config_path = cli.config.clone().unwrap_or_else(config::config_path);
        let cfg: TierrankConfig = config::load_config(&config_path);

        let state = cli
            .state
            .clone()
            .or_else(|| cfg.state.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

        let mut engine = RankingEngine::new(cfg.engine_config(seed))
            .unwrap_or_else(|e| bail(format!("Invalid configuration in {}: {e}", config_path.display())));

        match std::fs::read_to_string(&state) {
            Ok(json) => {
                let report = engine
                    .load_snapshot(&json)
                    .unwrap_or_else(|e| bail(format!("Failed to load {}: {e}", state.display())));
                report_load(&state, &report);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %state.display(), "no snapshot yet, starting a new collection");
            }
            Err(e) => bail(format!("Failed to read {}: {e}", state.display())),
        }

        Session { engine, state }
    }

    /// Write the snapshot next to the target and rename it into place.
    /// The previous snapshot, if any, is kept as `<state>.bak`.
    fn save(&self) {
        let json = self
            .engine
            .save_snapshot()
            .unwrap_or_else(|e| bail(format!("Failed to encode snapshot: {e}")));
        let tmp = self.state.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .unwrap_or_else(|e| bail(format!("Failed to write {}: {e}", tmp.display())));
        if self.state.exists() {
            let backup = backup_path(&self.state);
            std::fs::copy(&self.state, &backup)
                .unwrap_or_else(|e| bail(format!("Failed to back up to {}: {e}", backup.display())));
        }
        std::fs::rename(&tmp, &self.state)
            .unwrap_or_else(|e| bail(format!("Failed to replace {}: {e}", self.state.display())));
        debug!(path = %self.state.display(), votes = self.engine.vote_count(), "snapshot saved");
    }
}

fn backup_path(state: &Path) -> PathBuf {
    let mut name = state.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn report_load(path: &Path, report: &LoadReport) {
    debug!(path = %path.display(), version = %report.version, items = report.items, "snapshot loaded");
    if let Some(ref from) = report.migrated_from {
        eprintln!("Migrated {} from format {from}", path.display());
    }
    if report.has_repairs() {
        eprintln!(
            "Repaired {}: {} vote counts, {} tier histories",
            path.display(),
            report.corrected_vote_counts,
            report.repaired_histories,
        );
    }
    for section in &report.defaulted_sections {
        eprintln!("Section \"{section}\" was malformed and reset to defaults");
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set tier bounds, selection weights, etc.");
        }
        Commands::Next(args) => run_next(&cli, args),
        Commands::Vote { winner, loser } => {
            let mut session = Session::open(&cli, None);
            let outcome = session
                .engine
                .record_vote(winner, loser)
                .unwrap_or_else(|e| bail(e));
            session.save();
            println!(
                "{winner} → tier {} ({}) | {loser} → tier {} ({})",
                outcome.winner_tier, outcome.winner_move, outcome.loser_tier, outcome.loser_move,
            );
        }
        Commands::Exclude { id } => {
            let mut session = Session::open(&cli, None);
            if session.engine.exclude(id).unwrap_or_else(|e| bail(e)) {
                session.save();
                println!("Excluded {id}");
            } else {
                println!("{id} was already excluded");
            }
        }
        Commands::Restore { id } => {
            let mut session = Session::open(&cli, None);
            if session.engine.unexclude(id).unwrap_or_else(|e| bail(e)) {
                session.save();
                println!("Restored {id}");
            } else {
                println!("{id} was not excluded");
            }
        }
        Commands::Rankings { by, limit, json } => {
            let mut session = Session::open(&cli, None);
            let rankings = session.engine.all_rankings();
            if *json {
                output::print_rankings_json(&rankings, *by, *limit);
            } else {
                output::print_rankings_table(&rankings, *by, *limit);
            }
        }
        Commands::Status { json } => {
            let session = Session::open(&cli, None);
            let engine = &session.engine;
            let issues = engine.validate_integrity();
            let status = output::Status::new(
                engine.image_folder(),
                engine.overall_statistics(),
                engine.bounds_info(),
                engine.tier_distribution_info(),
                &issues,
            );
            if *json {
                output::print_json(&status);
            } else {
                output::print_status(&status);
            }
        }
        Commands::Confidence { lowest, highest } => {
            let session = Session::open(&cli, None);
            let ids = session.engine.store().active_ids();
            let calc = session.engine.confidence_calculator();
            let (title, rows) = match highest {
                Some(n) => (format!("Highest confidence ({n})"), calc.highest(&ids, *n)),
                None => (format!("Lowest confidence ({lowest})"), calc.lowest(&ids, *lowest)),
            };
            output::print_confidence(&title, &rows, &calc.statistics(&ids));
        }
        Commands::Settings { set } => {
            let mut session = Session::open(&cli, None);
            if !set.is_empty() {
                for arg in set {
                    let (name, value) = parse_setting(arg);
                    session
                        .engine
                        .set_setting(name, value)
                        .unwrap_or_else(|e| bail(e));
                }
                session.save();
            }
            output::print_settings(&session.engine.settings().describe());
        }
        Commands::Rate(args) => run_rate(&cli, args),
    }
}

fn run_next(cli: &Cli, args: &NextArgs) {
    let mut session = Session::open(cli, args.seed);
    if let Some(ref folder) = args.folder {
        session.engine.set_image_folder(folder.clone());
    }

    let items = load_items(args.items.as_deref(), &args.inline_items);
    let skip = args.skip.as_deref().map(|s| {
        s.split_once(',')
            .unwrap_or_else(|| bail(format!("--skip expects \"left,right\", got \"{s}\"")))
    });

    let pair = if items.is_empty() {
        session.engine.select_from_active(skip)
    } else {
        session.engine.select_next_pair(&items, skip)
    };
    // New candidates get records, so persist even when no pair comes back.
    session.save();

    let Some((left, right)) = pair else {
        bail("Not enough eligible items to form a pair (need at least 2 active items)");
    };
    let explanation = session
        .engine
        .explain_selection(&left, &right)
        .unwrap_or_else(|e| bail(e));

    if args.json {
        output::print_json(&serde_json::json!({
            "left": left,
            "right": right,
            "explanation": explanation,
        }));
    } else {
        println!("{left}\n{right}\n\n{explanation}");
    }
}

fn run_rate(cli: &Cli, args: &RateArgs) {
    let mut session = Session::open(cli, args.seed);
    if let Some(ref folder) = args.folder {
        session.engine.set_image_folder(folder.clone());
    }
    let items = load_items(args.items.as_deref(), &args.inline_items);

    eprintln!("1 = left wins, 2 = right wins, s = skip, q = quit");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut skipped: Option<(String, String)> = None;
    let mut session_votes = 0usize;

    loop {
        let exclude = skipped.as_ref().map(|(a, b)| (a.as_str(), b.as_str()));
        let pair = if items.is_empty() {
            session.engine.select_from_active(exclude)
        } else {
            session.engine.select_next_pair(&items, exclude)
        };
        let Some((left, right)) = pair else {
            eprintln!("Not enough eligible items to form a pair");
            break;
        };

        println!("\n[1] {left}\n[2] {right}");
        print!("> ");
        io::stdout().flush().unwrap_or_else(|e| bail(format!("Failed to write to stdout: {e}")));

        let Some(line) = lines.next() else { break };
        let line = line.unwrap_or_else(|e| bail(format!("Failed to read from stdin: {e}")));

        let (winner, loser) = match line.trim() {
            "1" => (&left, &right),
            "2" => (&right, &left),
            "s" => {
                skipped = Some((left, right));
                continue;
            }
            "q" => break,
            other => {
                eprintln!("Unrecognised input \"{other}\"");
                skipped = None;
                continue;
            }
        };

        let outcome = session
            .engine
            .record_vote(winner, loser)
            .unwrap_or_else(|e| bail(e));
        session.save();
        session_votes += 1;
        skipped = None;

        println!(
            "{winner} → tier {} | {loser} → tier {}",
            outcome.winner_tier, outcome.loser_tier,
        );
        if !outcome.winner_move.is_allowed() {
            println!("  {winner} held: {}", outcome.winner_move);
        }
        if !outcome.loser_move.is_allowed() {
            println!("  {loser} held: {}", outcome.loser_move);
        }
    }

    // Records created for new candidates still need saving after a quit.
    session.save();
    eprintln!("{session_votes} votes this session, {} total", session.engine.vote_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierrank_core::EngineConfig;

    #[test]
    fn test_parse_items_lines() {
        let items = parse_items_from_str("a.png\n\n  b.png  \nc.png\n");
        assert_eq!(items, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_parse_items_json() {
        let items = parse_items_from_str(r#"["a.png", "", "b.png"]"#);
        assert_eq!(items, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(parse_setting("overflow_threshold=1.5"), ("overflow_threshold", 1.5));
        assert_eq!(parse_setting(" min_overflow_images = 3 "), ("min_overflow_images", 3.0));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["tierrank", "rankings", "--by", "win-rate", "--limit", "5"]).unwrap();
        match cli.command {
            Commands::Rankings { by, limit, json } => {
                assert_eq!(by, RankingMetric::WinRate);
                assert_eq!(limit, Some(5));
                assert!(!json);
            }
            _ => panic!("expected rankings"),
        }

        let cli = Cli::try_parse_from(["tierrank", "vote", "--winner", "a", "--loser", "b", "--state", "s.json"]).unwrap();
        assert_eq!(cli.state, Some(PathBuf::from("s.json")));
        assert!(Cli::try_parse_from(["tierrank", "rankings", "--by", "elo"]).is_err());
    }

    #[test]
    fn test_save_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("tierrank.json");
        let mut session = Session {
            engine: RankingEngine::new(EngineConfig::default()).unwrap(),
            state: state.clone(),
        };
        session.engine.initialize_items(&["a.png", "b.png"]);

        session.save();
        let backup = dir.path().join("tierrank.json.bak");
        assert!(state.exists());
        assert!(!backup.exists());

        session.engine.record_vote("a.png", "b.png").unwrap();
        session.save();
        let vote_count = |path: &Path| {
            let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
            json["vote_count"].as_u64().unwrap()
        };
        assert_eq!(vote_count(backup.as_path()), 0);
        assert_eq!(vote_count(state.as_path()), 1);
        assert!(!state.with_extension("json.tmp").exists());
    }
}
