use std::path::PathBuf;

use clap::Parser;

use smc_rs::config::{Configuration, MemoryModel};
use smc_rs::driver::Driver;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Assembly file to check.
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Run under total store order.
    #[clap(long, conflicts_with = "sc")]
    tso: bool,

    /// Run under sequential consistency (default).
    #[clap(long)]
    sc: bool,

    /// Report executions that are not sequentially consistent.
    #[clap(long)]
    robustness: bool,

    /// Keep exploring after the first error.
    #[clap(long)]
    explore_all: bool,

    /// Keep the trace of every execution.
    #[clap(long)]
    collect_all: bool,

    /// Rebuild the module every that many executions (0 disables).
    #[clap(long, value_name = "INT", default_value = "1000")]
    recycle: usize,

    /// Maximum number of scheduling points per execution.
    #[clap(long, value_name = "INT")]
    depth: Option<usize>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let memory_model = if args.tso {
        MemoryModel::TotalStoreOrder
    } else {
        MemoryModel::SequentialConsistency
    };
    let config = Configuration::new(memory_model)
        .with_check_robustness(args.robustness)
        .with_explore_all_traces(args.explore_all)
        .with_debug_collect_all_traces(args.collect_all)
        .with_recycle_interval((args.recycle > 0).then_some(args.recycle))
        .with_max_search_depth(args.depth);

    smc_rs::init();
    let mut driver = Driver::from_file(&args.path, config)?;
    let result = driver.run()?;

    println!("{}", result);
    if args.collect_all {
        for (i, trace) in result.all_traces.iter().enumerate() {
            println!("--- Trace {} ---", i);
            println!("{}", trace);
        }
    }

    println!("\nTotal time: {:.3} s", time_total.elapsed().as_secs_f64());
    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
