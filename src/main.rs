//! tlswedge command line interface
//!
//! The startup driver: parse command line options, load the config file,
//! apply `key=value` overrides, parse positional proxyspecs, freeze the
//! configuration, and hand the frozen root to the connection engine. On
//! any configuration failure a single diagnostic line is printed and the
//! process exits non-zero.

use std::process::ExitCode;

use clap::Parser;

use tlswedge::common::init_logger;
use tlswedge::config::{Global, LoadState};
use tlswedge::{Result, APP_NAME, VERSION};

#[derive(Parser)]
#[command(name = "tlswedge", version, about = "Transparent TLS/TCP interception proxy")]
struct Cli {
    /// Configuration file
    #[arg(short = 'f', long = "conffile")]
    conffile: Option<String>,

    /// Configuration option override (key=value), repeatable
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Default NAT engine for proxyspecs without an explicit destination
    #[arg(short = 'n', long = "natengine")]
    natengine: Option<String>,

    /// Force split mode: never open the auxiliary divert path
    #[arg(short = 's', long = "split")]
    split: bool,

    /// Check the configuration and exit
    #[arg(short = 't', long = "test-config")]
    test_config: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: String,

    /// Positional proxy specifications
    #[arg(trailing_var_arg = true)]
    proxyspecs: Vec<String>,
}

fn load(cli: &Cli) -> Result<std::sync::Arc<Global>> {
    let mut global = Global::new();
    let mut natengine = cli.natengine.clone();
    let mut state = LoadState::new(cli.split);

    if let Some(conffile) = &cli.conffile {
        global.load_conffile(conffile, &mut natengine, &mut state)?;
    }
    for option in &cli.options {
        global.set_option_kv(option, &mut natengine, &mut state)?;
    }
    if let Some(engine) = natengine.as_deref() {
        if !tlswedge::nat::exists(engine) {
            return Err(tlswedge::ProxyError::UnknownNatEngine { token: engine.to_string() });
        }
    }
    global.load_proxyspecs(&cli.proxyspecs, natengine.as_deref(), &state)?;

    global.freeze()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(&cli.log_level);

    let global = match load(&cli) {
        Ok(global) => global,
        Err(e) => {
            eprintln!("{}: {}", APP_NAME, e);
            return ExitCode::FAILURE;
        }
    };

    if global.specs.is_empty() {
        eprintln!("{}: no proxyspec configured", APP_NAME);
        return ExitCode::FAILURE;
    }

    log::info!("{} {} configured, {} proxyspec(s)", APP_NAME, VERSION, global.specs.len());
    for spec in &global.specs {
        log::info!("{}", spec);
    }

    if cli.test_config {
        println!("configuration ok");
        return ExitCode::SUCCESS;
    }

    // The connection engine (event loop, TLS forging, NAT lookups) picks
    // up the frozen configuration from here.
    ExitCode::SUCCESS
}
