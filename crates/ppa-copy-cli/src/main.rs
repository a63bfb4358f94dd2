use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};

use ppa_copy_core::archive::{CachedArchive, LaunchpadArchive};
use ppa_copy_core::config::ConfigFile;
use ppa_copy_core::engine;
use ppa_copy_core::report::{Reporter, Verbosity};
use ppa_copy_core::types::{CopySpec, RuntimeOptions};
use ppa_copy_launchpad::{Credentials, Instance, LaunchpadClient};

/// Exit status when the run is interrupted from the keyboard.
const INTERRUPTED_EXIT: i32 = 2;

const DEFAULT_PPA_NAME: &str = "ppa";
const DEFAULT_POCKET: &str = "Release";
const DEFAULT_ARCHITECTURES: &[&str] = &["i386", "amd64"];
const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "ppa-copy", version)]
#[command(about = "Copy published PPA packages from one release pocket to another")]
struct Cli {
    /// Owner of the PPA
    #[arg(short = 'O', long)]
    owner: Option<String>,

    /// Name of the PPA (default: ppa)
    #[arg(short = 'N', long)]
    name: Option<String>,

    /// Names of packages to copy
    #[arg(short = 'p', long = "packages", value_name = "NAME", num_args = 1..)]
    packages: Vec<String>,

    /// Source series (e.g. focal)
    #[arg(short = 's', long, value_name = "SERIES")]
    source_series: Option<String>,

    /// Target series (e.g. jammy)
    #[arg(short = 't', long = "target-series", value_name = "SERIES", num_args = 1..)]
    target_series: Vec<String>,

    /// Architectures to check for published binaries (default: i386 amd64)
    #[arg(long, value_name = "ARCH", num_args = 1..)]
    architectures: Vec<String>,

    /// Pocket name (you probably don't want to change this; default: Release)
    #[arg(long)]
    pocket: Option<String>,

    /// Launchpad instance (production, staging, qastaging)
    #[arg(long, value_name = "INSTANCE")]
    launchpad_instance: Option<String>,

    /// Override the API root URL (mostly useful for testing)
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,

    /// Configuration file (default: .ppa-copy.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More verbose output (can be stacked)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Less verbose output
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,

    /// Don't make any changes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Wait for pending packages to be published
    #[arg(short, long)]
    wait: bool,

    /// Sleep between polling passes (e.g. 60s, 2m)
    #[arg(long, value_name = "DURATION")]
    wait_interval: Option<String>,

    /// Open the PPA page in a browser, don't do anything else
    #[arg(short, long)]
    browse: bool,

    /// Very verbose logging plus request-count instrumentation
    #[arg(long)]
    debug: bool,
}

#[derive(Debug)]
struct Settings {
    spec: CopySpec,
    opts: RuntimeOptions,
    api_base: String,
    verbosity: Verbosity,
}

fn resolve(cli: &Cli, config: &ConfigFile) -> Result<Settings> {
    let owner = cli
        .owner
        .clone()
        .or_else(|| config.ppa.owner.clone())
        .context("the PPA owner is required (-O/--owner or [ppa] owner)")?;
    let ppa_name = cli
        .name
        .clone()
        .or_else(|| config.ppa.name.clone())
        .unwrap_or_else(|| DEFAULT_PPA_NAME.to_string());

    let packages = if cli.packages.is_empty() {
        config.copy.packages.clone().unwrap_or_default()
    } else {
        cli.packages.clone()
    };
    if packages.is_empty() {
        bail!("at least one package name is required (-p/--packages or [copy] packages)");
    }

    let source_series = cli
        .source_series
        .clone()
        .or_else(|| config.copy.source_series.clone())
        .context("the source series is required (-s/--source-series or [copy] source-series)")?;

    let target_series = if cli.target_series.is_empty() {
        config.copy.target_series.clone().unwrap_or_default()
    } else {
        cli.target_series.clone()
    };
    if target_series.is_empty() {
        bail!("at least one target series is required (-t/--target-series or [copy] target-series)");
    }

    let architectures = if cli.architectures.is_empty() {
        config.copy.architectures.clone().unwrap_or_else(|| {
            DEFAULT_ARCHITECTURES.iter().map(|a| a.to_string()).collect()
        })
    } else {
        cli.architectures.clone()
    };

    let pocket = cli
        .pocket
        .clone()
        .or_else(|| config.copy.pocket.clone())
        .unwrap_or_else(|| DEFAULT_POCKET.to_string());

    let api_base = match &cli.api_base {
        Some(url) => url.clone(),
        None => {
            let instance = cli
                .launchpad_instance
                .clone()
                .or_else(|| config.ppa.instance.clone())
                .unwrap_or_else(|| Instance::Production.to_string());
            instance.parse::<Instance>()?.api_root().to_string()
        }
    };

    let wait_interval = match &cli.wait_interval {
        Some(raw) => humantime::parse_duration(raw)
            .with_context(|| format!("invalid wait interval: {raw}"))?,
        None => config.wait.interval.unwrap_or(DEFAULT_WAIT_INTERVAL),
    };

    let verbosity = if cli.debug {
        Verbosity::Debug
    } else {
        Verbosity::from_counts(cli.verbose, cli.quiet)
    };

    Ok(Settings {
        spec: CopySpec {
            owner,
            ppa_name,
            packages,
            source_series,
            target_series,
            architectures,
            pocket,
        },
        opts: RuntimeOptions {
            dry_run: cli.dry_run,
            wait: cli.wait,
            wait_interval,
        },
        api_base,
        verbosity,
    })
}

/// Reporter writing plain lines: info to stdout, warnings and errors to
/// stderr, diagnostics to stderr behind the debug level.
struct CliReporter {
    level: Verbosity,
}

impl Reporter for CliReporter {
    fn debug(&mut self, msg: &str) {
        if self.level >= Verbosity::Debug {
            eprintln!("[debug] {msg}");
        }
    }

    fn info(&mut self, msg: &str) {
        if self.level >= Verbosity::Info {
            println!("{msg}");
        }
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("{msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

fn ppa_url(owner: &str, name: &str) -> String {
    format!("https://launchpad.net/~{owner}/+archive/{name}/+packages")
}

/// Best-effort browser launch: `$BROWSER`, then the usual platform openers.
fn open_browser(url: &str) -> Result<()> {
    let mut candidates: Vec<String> = Vec::new();
    if let Ok(browser) = std::env::var("BROWSER")
        && !browser.is_empty()
    {
        candidates.push(browser);
    }
    candidates.push("xdg-open".to_string());
    candidates.push("open".to_string());

    for candidate in &candidates {
        if let Ok(status) = Command::new(candidate).arg(url).status()
            && status.success()
        {
            return Ok(());
        }
    }
    bail!("no way to open a browser found")
}

/// Abort immediately on SIGINT with a distinct exit status. Queued copies
/// are abandoned; copies already issued to the archive are not undone.
#[cfg(unix)]
fn install_interrupt_handler() -> Result<()> {
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT]).context("failed to install SIGINT handler")?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            std::process::exit(INTERRUPTED_EXIT);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_interrupt_handler() -> Result<()> {
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    install_interrupt_handler()?;

    let config = ConfigFile::discover(cli.config.as_deref())?;
    let settings = resolve(&cli, &config)?;
    let mut reporter = CliReporter {
        level: settings.verbosity,
    };

    if cli.browse {
        let url = ppa_url(&settings.spec.owner, &settings.spec.ppa_name);
        if open_browser(&url).is_err() {
            println!("{url}");
        }
        return Ok(());
    }

    let mut client = LaunchpadClient::new(&settings.api_base);
    if let Some(credentials) = Credentials::from_env()? {
        client = client.with_credentials(credentials);
    }
    let api = LaunchpadArchive::new(client, &settings.spec.owner, &settings.spec.ppa_name);
    let mut archive = CachedArchive::new(api);

    engine::run(&mut archive, &settings.spec, &settings.opts, &mut reporter)?;

    reporter.debug(&format!(
        "{} HTTP requests",
        archive.api().client().request_count()
    ));
    Ok(())
}
