mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::fund::{BatchArgs, FundArgs};
use commands::irr::IrrArgs;
use commands::nav::NavArgs;
use commands::portfolio::{CohortArgs, ConcentrationArgs};
use commands::vesting::VestingArgs;
use commands::waterfall::{CarryArgs, DistributeArgs, ReplayArgs};

/// Fund economics: distribution waterfall, carry vesting, NAV and portfolio analytics
#[derive(Parser)]
#[command(
    name = "fundeng",
    version,
    about = "Fund economics calculations with decimal precision",
    long_about = "A CLI for fund economics: European distribution waterfalls with \
                  compounded hurdle and catch-up, carried-interest vesting, NAV, \
                  cohort performance and concentration risk. Inputs are JSON \
                  (--input <file> or stdin); every amount is a fixed-point decimal."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log computation steps to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Vested fraction and vesting curve of a carry grant
    Vesting(VestingArgs),
    /// Allocate a distribution through the waterfall tiers
    Waterfall(DistributeArgs),
    /// Rebuild the waterfall state from completed distribution events
    Replay(ReplayArgs),
    /// Carry accrual snapshot by hypothetical liquidation at an as-of date
    Carry(CarryArgs),
    /// Net asset value and NAV per share
    Nav(NavArgs),
    /// Cohort performance (MOIC, IRR, TVPI, DPI) by vintage, sector, stage or company
    Cohorts(CohortArgs),
    /// Concentration risk and Herfindahl-Hirschman index
    Concentration(ConcentrationArgs),
    /// Internal rate of return of dated cash flows
    Irr(IrrArgs),
    /// Full fund computation from an event snapshot
    Fund(FundArgs),
    /// Compute many fund snapshots independently
    Batch(BatchArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fund_engine_core=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Vesting(args) => commands::vesting::run_vesting(args),
        Commands::Waterfall(args) => commands::waterfall::run_distribute(args),
        Commands::Replay(args) => commands::waterfall::run_replay(args),
        Commands::Carry(args) => commands::waterfall::run_carry(args),
        Commands::Nav(args) => commands::nav::run_nav(args),
        Commands::Cohorts(args) => commands::portfolio::run_cohorts(args),
        Commands::Concentration(args) => commands::portfolio::run_concentration(args),
        Commands::Irr(args) => commands::irr::run_irr(args),
        Commands::Fund(args) => commands::fund::run_fund(args),
        Commands::Batch(args) => commands::fund::run_batch(args),
        Commands::Version => {
            println!("fundeng {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
