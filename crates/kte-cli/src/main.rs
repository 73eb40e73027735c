//! External CLI contract (spec §6): `backtest`, `trade`, `verify`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kte")]
#[command(about = "Korea trend-ATR trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay historical daily bars through the strategy/risk/executor stack.
    Backtest {
        /// Layered config paths in merge order.
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Symbol to include (repeatable).
        #[arg(long = "symbol", required = true)]
        symbols: Vec<String>,

        #[arg(long, value_parser = parse_date)]
        from: chrono::NaiveDate,

        #[arg(long, value_parser = parse_date)]
        to: chrono::NaiveDate,

        /// Starting cash in major units (KRW).
        #[arg(long, default_value_t = 10_000_000)]
        starting_cash: i64,
    },

    /// Run the live/paper scheduler loop against the KIS broker.
    Trade {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Symbol to include (repeatable); overrides the configured universe
        /// with a fixed selection when given.
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// Overrides every configured tick interval, in seconds.
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many ticks instead of running forever.
        #[arg(long)]
        max_runs: Option<u64>,

        /// Second factor required (alongside ENABLE_REAL_TRADING) to promote
        /// EXECUTION_MODE=REAL out of the DRY_RUN fallback (spec §9).
        #[arg(long, default_value_t = false)]
        confirm_real_trading: bool,

        /// In REAL mode, scales every order quantity by this percentage for
        /// the invocation (a ramp-up safety knob; 100 = unchanged).
        #[arg(long)]
        real_first_order_percent: Option<f64>,

        /// In REAL mode, trades only the first N of the given/selected
        /// symbols (a ramp-up safety knob for the first live day).
        #[arg(long)]
        real_limit_symbols_first_day: Option<usize>,

        /// Path to the instance lock file.
        #[arg(long, default_value = "./kte.lock")]
        lock_path: String,

        /// Path to the append-only audit log.
        #[arg(long, default_value = "./audit.jsonl")]
        audit_path: String,

        /// Root directory for position/universe-cache state files.
        #[arg(long, default_value = "./state")]
        state_dir: String,

        /// Path to the order-state journal.
        #[arg(long, default_value = "./state/journal.jsonl")]
        journal_path: String,
    },

    /// Verify the hash chain of an audit log written by `trade`.
    Verify {
        /// Path to the audit log to check.
        path: String,
    },
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate, String> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{s}': {e}"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Commands::Backtest { config_paths, symbols, from, to, starting_cash } => {
            commands::backtest::run(config_paths, symbols, from, to, starting_cash).await
        }
        Commands::Trade {
            config_paths,
            symbols,
            interval,
            max_runs,
            confirm_real_trading,
            real_first_order_percent,
            real_limit_symbols_first_day,
            lock_path,
            audit_path,
            state_dir,
            journal_path,
        } => {
            commands::trade::run(commands::trade::TradeArgs {
                config_paths,
                symbols,
                interval,
                max_runs,
                confirm_real_trading,
                real_first_order_percent,
                real_limit_symbols_first_day,
                lock_path,
                audit_path,
                state_dir,
                journal_path,
            })
            .await
        }
        Commands::Verify { path } => commands::verify::run(&path),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
