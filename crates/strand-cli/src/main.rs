//! strand model checker CLI.
//!
//! Commands:
//! - `strand list` - List the built-in demo programs
//! - `strand run <demo>` - Search the state space of a demo program

mod demos;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use strand_search::{
    BreadthFirst, DfsSearch, FootprintMonitor, HeuristicSearch, PreferThreadSwitch, RandomSearch,
    SearchConfig, SearchCore, SearchReport, SearchStrategy,
};
use strand_vm::{Vm, VmConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Explicit-state model checker for bytecode programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in demo programs
    List,

    /// Search the state space of a demo program
    Run {
        /// Demo name (see `strand list`)
        demo: String,

        #[arg(short, long, value_enum, default_value_t = Strategy::Dfs)]
        strategy: Strategy,

        /// Maximum number of choices per path (0 = unlimited)
        #[arg(short, long, default_value_t = 0)]
        depth: usize,

        /// Paths sampled after the first one (random search)
        #[arg(short, long, default_value_t = 0)]
        paths: usize,

        /// Seed for random choice selection
        #[arg(long)]
        seed: Option<u64>,

        /// Keep searching after a property is violated
        #[arg(long)]
        keep_going: bool,

        /// Expand every choice point, even in states seen before
        #[arg(long)]
        no_state_matching: bool,

        /// Break transitions after this many steps (0 = never)
        #[arg(long, default_value_t = 5000)]
        max_transition_length: usize,

        /// Methods (`class.name`) to execute without scheduling points
        #[arg(long = "atomic", value_name = "METHOD")]
        atomic_methods: Vec<String>,

        /// Sample the heap size every N transitions
        #[arg(long, value_name = "N")]
        footprint: Option<usize>,

        /// Print the choice trail of each violation
        #[arg(long)]
        trail: bool,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Dfs,
    Random,
    Bfs,
    Switch,
}

impl Strategy {
    fn create(self) -> Box<dyn SearchStrategy> {
        match self {
            Self::Dfs => Box::new(DfsSearch::new()),
            Self::Random => Box::new(RandomSearch::new()),
            Self::Bfs => Box::new(HeuristicSearch::new(BreadthFirst)),
            Self::Switch => Box::new(HeuristicSearch::new(PreferThreadSwitch)),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::List => {
            cmd_list();
            Ok(true)
        }
        Commands::Run {
            demo,
            strategy,
            depth,
            paths,
            seed,
            keep_going,
            no_state_matching,
            max_transition_length,
            atomic_methods,
            footprint,
            trail,
            verbose: _,
        } => {
            let search = SearchConfig {
                depth_limit: depth,
                path_limit: paths,
                stop_on_first_error: !keep_going,
                state_matching: !no_state_matching,
                seed,
            };
            let vm = VmConfig {
                max_transition_length,
                atomic_methods,
            };
            cmd_run(&demo, strategy, search, vm, footprint)
                .map(|report| print_report(&report, trail))
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn cmd_list() {
    for demo in demos::DEMOS {
        println!("{:<14} {}", demo.name, demo.about);
    }
}

fn cmd_run(
    name: &str,
    strategy: Strategy,
    search: SearchConfig,
    vm_config: VmConfig,
    footprint: Option<usize>,
) -> Result<SearchReport> {
    let demo = demos::find(name).ok_or_else(|| anyhow!("unknown demo `{}`", name))?;
    let program = demo.build().with_context(|| format!("building demo `{}`", name))?;

    let mut vm = Vm::new(Arc::new(program), vm_config);
    vm.start(demos::MAIN)?;

    let mut core = SearchCore::new(vm, search);
    if let Some(interval) = footprint {
        core.add_listener(Box::new(FootprintMonitor::new(interval)));
    }
    let mut strategy = strategy.create();
    Ok(core.run(strategy.as_mut())?)
}

/// Print the report; true if no property was violated.
fn print_report(report: &SearchReport, trail: bool) -> bool {
    for line in output::format_report(report, trail) {
        println!("{}", line);
    }
    report.is_ok()
}
