use std::{path::PathBuf, process::exit};

use clap::Parser;
use dex_simplifier::{
    launcher::{Launcher, Options},
    vm,
};
use regex::Regex;

/// dex-simplify - deobfuscates a Dalvik executable by symbolic execution
#[derive(Debug, Parser)]
#[command(name = "dex-simplify", version, about, long_about = None)]
struct Cli {
    /// Path to the serialized class model of the APK or DEX.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path; defaults to the input with a `.simplified.json` suffix.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Only optimize methods whose signature matches this pattern.
    #[arg(long, value_name = "REGEX")]
    include_filter: Option<String>,

    /// Skip methods whose signature matches this pattern.
    #[arg(long, value_name = "REGEX")]
    exclude_filter: Option<String>,

    /// Also optimize Android support-library classes.
    #[arg(long)]
    include_support_library: bool,

    /// API level to record in the output.
    #[arg(long, value_name = "INT")]
    output_api_level: Option<u32>,

    /// Maximum visits of any single instruction address per method.
    #[arg(long, value_name = "INT")]
    max_address_visits: Option<usize>,

    /// Maximum call depth for recursive invokes.
    #[arg(long, value_name = "INT")]
    max_call_depth: Option<usize>,

    /// Maximum total instruction visits per method execution.
    #[arg(long, value_name = "INT")]
    max_method_visits: Option<usize>,

    /// Wall-clock budget per method execution, in seconds (0 disables).
    #[arg(long, value_name = "SECONDS")]
    max_execution_time: Option<u64>,

    /// Maximum optimizer sweeps per method.
    #[arg(long, value_name = "INT")]
    max_optimization_passes: Option<usize>,

    /// Silence all logging.
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,

    /// Logging verbosity: 1 = info, 2 = debug, 3 = trace.
    #[arg(short, long, value_name = "LEVEL", num_args = 0..=1, default_missing_value = "1")]
    verbose: Option<u8>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            if error.use_stderr() {
                // An argument error exits with -1; help and version are not
                // errors.
                let _ = error.print();
                exit(-1);
            }
            let _ = error.print();
            exit(0);
        }
    };

    init_logging(&cli);

    let options = match build_options(&cli) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            exit(-1);
        }
    };

    match Launcher::new(options).run() {
        Ok(_) => {}
        Err(error) => {
            eprintln!("{error}");
            exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        log::LevelFilter::Off
    } else {
        match cli.verbose {
            None => log::LevelFilter::Warn,
            Some(0 | 1) => log::LevelFilter::Info,
            Some(2) => log::LevelFilter::Debug,
            // Ok, you asked for it.
            Some(_) => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_module("dex_simplifier", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();
}

fn build_options(cli: &Cli) -> Result<Options, String> {
    let compile = |name: &str, pattern: &Option<String>| -> Result<Option<Regex>, String> {
        match pattern {
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|error| format!("Invalid {name}: {error}")),
            None => Ok(None),
        }
    };

    let mut config = vm::Config::default();
    if let Some(value) = cli.max_address_visits {
        config = config.with_max_address_visits(value);
    }
    if let Some(value) = cli.max_call_depth {
        config = config.with_max_call_depth(value);
    }
    if let Some(value) = cli.max_method_visits {
        config = config.with_max_method_visits(value);
    }
    if let Some(value) = cli.max_execution_time {
        config = config.with_max_execution_time_seconds(value);
    }
    if let Some(value) = cli.max_optimization_passes {
        config = config.with_max_optimization_passes(value);
    }

    let mut options = Options::new(cli.input.clone());
    options.output = cli.out.clone();
    options.include_filter = compile("--include-filter", &cli.include_filter)?;
    options.exclude_filter = compile("--exclude-filter", &cli.exclude_filter)?;
    options.include_support_library = cli.include_support_library;
    options.output_api_level = cli.output_api_level;
    options.vm_config = config;

    Ok(options)
}
