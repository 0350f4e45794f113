//! semmon bank demo
//!
//! Runs a bank scenario: every step is a thread that deposits or withdraws
//! through one shared monitor. Withdrawals that cannot be covered wait for
//! deposits; the ledger shows who waited and who woke whom.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use log::{warn, LevelFilter, Log, Metadata, Record};

use semmon::scenario::{run_scenario, ScenarioConfig};
use semmon::{SemKey, SemaphoreSet};

/// Signals that end the demo early; the semaphore set is removed first.
const TERMINATION_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// Demo configuration
struct Config {
    /// Scenario file; the built-in scenario is used when absent
    scenario: Option<PathBuf>,
    /// Overrides the scenario's key name
    key: Option<String>,
    /// Remove a set leaked under the key by an earlier run
    reclaim: bool,
    /// Print the ledger as JSON lines
    json: bool,
    /// Log level for stderr
    level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario: None,
            key: None,
            reclaim: false,
            json: false,
            level: LevelFilter::Warn,
        }
    }
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl StderrLogger {
    fn init(level: LevelFilter) {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("-");
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "[{} {name}] {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn print_usage() {
    println!("bank-demo - Hoare monitor bank scenario");
    println!();
    println!("USAGE:");
    println!("    bank-demo [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>   Scenario JSON file (default: built-in scenario)");
    println!("    -k, --key <NAME>      Key name for the semaphore set");
    println!("        --reclaim         Remove a semaphore set left behind under the key");
    println!("        --json            Print the ledger as JSON lines");
    println!("    -v, --verbose         Log monitor activity (repeat for trace)");
    println!("    -h, --help            Print help information");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.scenario = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--key" | "-k" => {
                if i + 1 < args.len() {
                    config.key = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("error: --key requires a value");
                    std::process::exit(1);
                }
            }
            "--reclaim" => {
                config.reclaim = true;
                i += 1;
            }
            "--json" => {
                config.json = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                config.level = match config.level {
                    LevelFilter::Warn => LevelFilter::Info,
                    LevelFilter::Info => LevelFilter::Debug,
                    _ => LevelFilter::Trace,
                };
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {}", arg);
                print_usage();
                std::process::exit(1);
            }
        }
    }

    config
}

/// Blocks the termination signals for this thread and every thread spawned
/// after it, then waits for them on a dedicated thread. On delivery the set
/// under `key` is removed and the process exits with `128 + signo`.
///
/// SIGKILL cannot be caught; `--reclaim` removes what it leaves behind.
fn remove_set_on_signal(key: SemKey) -> io::Result<()> {
    // SAFETY: `mask` is a valid, exclusively owned sigset_t.
    let mask = unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        for signo in TERMINATION_SIGNALS {
            libc::sigaddset(&mut mask, signo);
        }
        let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        mask
    };

    thread::Builder::new().name("signals".to_string()).spawn(move || {
        let mut signo: libc::c_int = 0;
        // SAFETY: both pointers refer to live locals.
        let rc = unsafe { libc::sigwait(&mask, &mut signo) };
        if rc != 0 {
            warn!("sigwait failed: {}", io::Error::from_raw_os_error(rc));
            return;
        }
        match SemaphoreSet::remove_existing(key) {
            Ok(true) => eprintln!("signal {signo}: removed semaphore set for key {key}"),
            Ok(false) => {}
            Err(err) => eprintln!("signal {signo}: {err}"),
        }
        std::process::exit(128 + signo);
    })?;
    Ok(())
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut scenario = match &config.scenario {
        Some(path) => ScenarioConfig::from_file(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(key) = &config.key {
        scenario.key = key.clone();
    }

    if config.reclaim && SemaphoreSet::remove_existing(scenario.sem_key())? {
        eprintln!("removed leftover semaphore set for key '{}'", scenario.key);
    }
    remove_set_on_signal(scenario.sem_key())?;

    let report = run_scenario(&scenario)?;

    if config.json {
        print!("{}", report.to_json_lines()?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let config = parse_args();
    StderrLogger::init(config.level);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
