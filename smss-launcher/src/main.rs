//! Binary entrypoint for the SMSS maintenance pass.
//!
//! Loads `smss.json`, runs one maintenance pass against the server
//! database and exits. Launching the server itself is left to the caller.
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use smss_core::maintenance::{run_maintenance_pass, PassReport};
use smss_core::{Category, SmssConfig};

#[derive(Parser)]
#[command(name = "smss")]
#[command(about = "Run database maintenance for a Miscreated dedicated server")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, default_value = "smss.json")]
    config: PathBuf,

    /// Server installation directory holding miscreated.db
    #[arg(short, long, default_value = "MiscreatedServer")]
    server_dir: PathBuf,

    /// Print the pass report as JSON on stdout
    #[arg(long)]
    report: bool,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, debug_marker_present(&cli.config));

    let config = load_config(&cli.config);
    let db_path = cli.server_dir.join("miscreated.db");

    let root = info_span!("smss", version = env!("CARGO_PKG_VERSION"));
    let report = run_maintenance_pass(&db_path, &config, &root)?;

    log_summary(&report);
    if report.has_failures() {
        warn!("Some maintenance steps failed; see the log above");
    }
    if cli.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn log_summary(report: &PassReport) {
    let Some(timers) = &report.timers else {
        return;
    };
    for category in Category::ALL {
        let outcome = timers.category(category);
        info!(%category, rows = outcome.rows(), failed = outcome.is_failed(), "Category summary");
    }
    info!(server_id = report.server_id, "Server database maintained");
}

/// `RUST_LOG` wins; otherwise verbosity flags or a `debug*` marker file.
fn init_logging(verbosity: u8, debug_marker: bool) {
    let level = match verbosity {
        0 if debug_marker => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Whether a file whose name starts with `debug` sits next to the config.
fn debug_marker_present(config_path: &Path) -> bool {
    let dir = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries
            .filter_map(std::result::Result::ok)
            .any(|e| e.file_name().to_string_lossy().starts_with("debug"))
    })
}

/// A missing or unreadable config file falls back to defaults.
fn load_config(path: &Path) -> SmssConfig {
    match SmssConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Configuration load error, using defaults");
            SmssConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["smss"]);
        assert_eq!(cli.config, PathBuf::from("smss.json"));
        assert_eq!(cli.server_dir, PathBuf::from("MiscreatedServer"));
        assert!(!cli.report);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from(["smss", "-vv", "--report", "-c", "cfg/smss.toml", "-s", "/srv/mis"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.report);
        assert_eq!(cli.config, PathBuf::from("cfg/smss.toml"));
        assert_eq!(cli.server_dir, PathBuf::from("/srv/mis"));
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("smss.json"));
        assert_eq!(config, SmssConfig::default());
    }

    #[test]
    fn debug_marker_is_detected_next_to_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("smss.json");
        assert!(!debug_marker_present(&config));
        std::fs::write(dir.path().join("debug.txt"), "").expect("marker");
        assert!(debug_marker_present(&config));
    }
}
