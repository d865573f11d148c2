//! `rowlink` – runs the device manager and relays erg telemetry.
//!
//! 1. Loads `~/.rowlink/config.toml` (defaults when absent) plus `ROWLINK_*`
//!    overrides.
//! 2. Starts an [`ErgManager`] over a simulated bus with `sim_devices` ergs.
//! 3. Writes one JSON object per event to stdout, or to `relay_addr` over TCP.
//! 4. On **Ctrl-C** stops the manager and exits once every queued event has
//!    been written out.  A TCP peer gets at most `io_timeout_ms` to take the
//!    backlog.
//!
//! Human-facing output goes to stderr so stdout stays machine readable.

mod config;
mod relay;

use colored::Colorize;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use rowlink_hal::{LoopbackCodec, SimBus};
use rowlink_runtime::{ErgManager, ErgObserver, init_tracing};

use crate::config::Config;
use crate::relay::{StdoutRelay, TcpRelay};

fn main() {
    let (cfg, config_error) = match config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Installed before the runtime exists; see telemetry::build_provider.
    let _guard = init_tracing("rowlink", cfg.log_format);

    print_banner();
    match config_error {
        None => match config::write_defaults_if_missing() {
            Ok(true) => eprintln!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Ok(false) => eprintln!(
                "  Config: {}",
                config::config_path().display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "could not write default config"),
        },
        Some(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start tokio runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(cfg)) {
        error!(error = %e, "rowlink exited with an error");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<(), rowlink_types::RowError> {
    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!(
            "{}",
            "⚠  Ctrl-C received – stopping device manager …".yellow().bold()
        );
        notify.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with SIGKILL");
    }

    let (observer, writer) = build_observer(&cfg).await;
    let bus = SimBus::with_ergs(cfg.sim_devices);
    let manager = ErgManager::start(
        Arc::new(bus),
        Arc::new(LoopbackCodec),
        cfg.manager_config(),
        observer,
    )?;
    eprintln!(
        "  Watching {} simulated erg(s). Press {} to stop.\n",
        cfg.sim_devices.to_string().bold(),
        "Ctrl-C".bold().cyan()
    );

    shutdown.notified().await;
    manager.stop().await;
    // The joined dispatcher has dropped the relay, so the writer exits once
    // its backlog is written.
    if let Some(writer) = writer {
        flush_relay(writer, cfg.manager_config().session.io_timeout).await;
    }
    eprintln!("{}", "  ✓ Device manager stopped.".green());
    Ok(())
}

async fn build_observer(cfg: &Config) -> (Arc<dyn ErgObserver>, Option<JoinHandle<()>>) {
    if let Some(addr) = &cfg.relay_addr {
        match TcpRelay::connect(addr, cfg.aliases.clone()).await {
            Ok((relay, writer)) => return (Arc::new(relay), Some(writer)),
            Err(e) => warn!(addr = %addr, error = %e, "tcp relay unavailable; using stdout"),
        }
    }
    (Arc::new(StdoutRelay::stdout(cfg.aliases.clone())), None)
}

async fn flush_relay(writer: JoinHandle<()>, limit: std::time::Duration) {
    match tokio::time::timeout(limit, writer).await {
        Ok(Ok(())) => debug!("tcp relay flushed"),
        Ok(Err(e)) => warn!(error = %e, "tcp relay writer failed"),
        Err(_) => warn!(?limit, "tcp relay still busy; remaining lines dropped"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    eprintln!();
    eprintln!("{}", r#"   ___                __ _      __"#.bold().cyan());
    eprintln!("{}", r#"  / _ \___ _    __   / /(_)__  / /__"#.bold().cyan());
    eprintln!("{}", r#" / , _/ _ \ |/|/ /  / // / _ \/  '_/"#.bold().cyan());
    eprintln!("{}", r#"/_/|_|\___/__,__/  /_//_/_//_/_/\_\ "#.bold().cyan());
    eprintln!();
    eprintln!(
        "  {} {}",
        "rowlink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Concept2 ergometer manager");
    eprintln!();
}
