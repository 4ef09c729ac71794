extern crate clap;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::{info, warn};
use net_scanner::engine::{MeasurementEngine, TestConfig};
use net_scanner::errors::{exit_codes, ErrorKind, ScannerError};
use net_scanner::history::HistoryStore;
use net_scanner::measurements::{ConnectionHint, EffectiveConnectionType};
use net_scanner::network::NetworkScanner;
use net_scanner::probes::remote::DEFAULT_DOWNLOAD_URL;
use net_scanner::probes::{
    DownloadProbe, HttpProbe, LocalDataProbe, RemoteDownloadProbe, SimulatedUploadProbe,
};
use net_scanner::progress::{NoProgress, ProgressSink};
use net_scanner::render::{self, ConsoleProgress, DisplayMode};
use net_scanner::results::TestResult;
use net_scanner::scheduler::{RefreshScheduler, DEFAULT_REFRESH_INTERVAL};
use net_scanner::store::{default_history_path, JsonFileStore};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const VERSION: &str = match option_env!("NET_SCANNER_BUILD_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

type Engine = MeasurementEngine<HttpProbe, DownloadProbe, SimulatedUploadProbe>;

#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    /// History file (default: $XDG_DATA_HOME/net-scanner/history.json)
    #[arg(long, global = true, value_name = "PATH")]
    history_file: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a speed test and record it (default)
    Test(TestArgs),
    /// Show connectivity facts about this host
    Info(LinkArgs),
    /// List recorded results, newest first
    History,
    /// Delete every recorded result
    Clear,
    /// Refresh connectivity facts periodically until Ctrl-C
    Watch(WatchArgs),
}

#[derive(Args, Default)]
struct LinkArgs {
    /// Effective connection type, used when a measurement must be simulated
    #[arg(long, value_name = "slow-2g|2g|3g|4g")]
    connection_type: Option<EffectiveConnectionType>,

    /// Downlink estimate in Mbps, used when no connection type is given
    #[arg(long, value_name = "MBPS")]
    downlink: Option<f64>,
}

impl LinkArgs {
    fn hint(&self) -> ConnectionHint {
        ConnectionHint::new(self.connection_type, self.downlink)
    }
}

#[derive(Args)]
struct TestArgs {
    /// Number of latency samples
    #[arg(long, default_value_t = 5)]
    samples: usize,

    /// Per-probe timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    timeout_ms: u64,

    /// Download from a speed-test server instead of timing a local transfer
    #[arg(long)]
    remote: bool,

    /// Do not record the result in the history
    #[arg(long)]
    no_save: bool,

    #[command(flatten)]
    link: LinkArgs,
}

impl Default for TestArgs {
    fn default() -> Self {
        Self {
            samples: 5,
            timeout_ms: 3000,
            remote: false,
            no_save: false,
            link: LinkArgs::default(),
        }
    }
}

#[derive(Args)]
struct WatchArgs {
    /// Seconds between refreshes
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
    interval: u64,

    /// Also run one speed test while watching
    #[arg(long)]
    with_test: bool,

    #[command(flatten)]
    test: TestArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".bold().red(), e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), ScannerError> {
    let mode = DisplayMode::detect(cli.json, std::io::stdout().is_terminal());
    let history_path = cli.history_file.unwrap_or_else(default_history_path);
    let mut history = HistoryStore::new(JsonFileStore::new(history_path));

    match cli.command.unwrap_or_else(|| Command::Test(TestArgs::default())) {
        Command::Test(args) => {
            let engine = build_engine(&args)?;
            let result = run_test(&engine, mode).await?;
            report(&result, mode)?;
            if !args.no_save {
                save(&mut history, result)?;
            }
            Ok(())
        }
        Command::Info(args) => {
            let config = TestConfig::default();
            let scanner = NetworkScanner::new(&config, args.hint())?;
            let info = scanner.scan().await;
            if mode == DisplayMode::Json {
                render::print_json(&info)
            } else {
                render::print_network_info(&info);
                Ok(())
            }
        }
        Command::History => {
            let entries = history.load();
            if mode == DisplayMode::Json {
                render::print_json(&entries)
            } else {
                render::print_history(&entries);
                Ok(())
            }
        }
        Command::Clear => {
            history.load();
            let entries = history.clear()?;
            if mode == DisplayMode::Json {
                render::print_json(&entries)
            } else {
                println!("{}", "History cleared".green());
                Ok(())
            }
        }
        Command::Watch(args) => watch(args, mode, &mut history).await,
    }
}

fn build_config(args: &TestArgs) -> Result<TestConfig, ScannerError> {
    let config = TestConfig {
        latency_samples: args.samples,
        probe_timeout: Duration::from_millis(args.timeout_ms),
        ..TestConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn build_engine(args: &TestArgs) -> Result<Engine, ScannerError> {
    let config = build_config(args)?;

    let latency = HttpProbe::new(config.probe_timeout)?;
    let download = if args.remote {
        let base = Url::parse(DEFAULT_DOWNLOAD_URL).map_err(|e| {
            ScannerError::config("invalid download URL").with_source(e)
        })?;
        DownloadProbe::Remote(RemoteDownloadProbe::new(base, config.probe_timeout)?)
    } else {
        DownloadProbe::Local(LocalDataProbe::new())
    };
    let upload = SimulatedUploadProbe::new(config.upload_delay_min, config.upload_delay_max);

    Ok(MeasurementEngine::new(config, latency, download, upload)
        .with_connection_hint(args.link.hint()))
}

/// Run one test; Ctrl-C drops the run and leaves the engine aborted.
async fn run_test(engine: &Engine, mode: DisplayMode) -> Result<TestResult, ScannerError> {
    let progress: &dyn ProgressSink =
        if mode.shows_progress() { &ConsoleProgress } else { &NoProgress };

    if mode.shows_progress() {
        render::print_test_plan(engine.config());
    }

    let outcome = tokio::select! {
        outcome = engine.run_speed_test(progress) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => result,
        None => {
            warn!("Speed test interrupted, engine is {:?}", engine.state());
            Err(ScannerError::new(ErrorKind::Interrupted, "speed test aborted"))
        }
    }
}

fn report(result: &TestResult, mode: DisplayMode) -> Result<(), ScannerError> {
    if mode == DisplayMode::Json {
        render::print_json(result)
    } else {
        render::print_result(result);
        Ok(())
    }
}

fn save(
    history: &mut HistoryStore<JsonFileStore>,
    result: TestResult,
) -> Result<(), ScannerError> {
    history.load();
    let entries = history.record(result)?;
    info!("History now holds {} results", entries.len());
    Ok(())
}

async fn watch(
    args: WatchArgs,
    mode: DisplayMode,
    history: &mut HistoryStore<JsonFileStore>,
) -> Result<(), ScannerError> {
    if args.interval == 0 {
        return Err(ScannerError::config("refresh interval must be at least 1 second"));
    }

    let engine = Arc::new(build_engine(&args.test)?);
    let scanner = Arc::new(NetworkScanner::new(engine.config(), args.test.link.hint())?);

    let busy = engine.clone();
    let handle = RefreshScheduler::start(
        Duration::from_secs(args.interval),
        move || busy.is_running(),
        move || {
            let scanner = scanner.clone();
            async move {
                let info = scanner.scan().await;
                if mode == DisplayMode::Json {
                    if let Err(e) = render::print_json(&info) {
                        warn!("{}", e);
                    }
                } else {
                    render::print_network_info(&info);
                    println!();
                }
            }
        },
    );

    let interrupted = if args.with_test {
        tokio::select! {
            outcome = engine.run_speed_test(&NoProgress) => {
                let result = outcome?;
                report(&result, mode)?;
                if !args.test.no_save {
                    save(history, result)?;
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        }
    } else {
        false
    };

    if !interrupted {
        let _ = tokio::signal::ctrl_c().await;
    }

    handle.stop().await;
    Ok(())
}
