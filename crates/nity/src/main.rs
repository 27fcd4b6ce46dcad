//! nity - attach the connect4 interception program and publish its maps
//!
//! The control-plane agent is started separately and finds the maps under
//! the pin root.

use clap::{Parser, Subcommand};
use nity_loader::config::{ConfigLoader, LoaderConfig};
use nity_loader::contract::{CONTRACT_MAPS, CONTRACT_VERSION, ENTRY_PROGRAM};
use nity_loader::{env, pin};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "nity")]
#[command(version)]
#[command(about = "Load and attach the nity connect4 program", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NITY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a cgroup, pin maps, and hold the attachment until Ctrl+C
    Attach {
        /// cgroup v2 directory (defaults to config attach.cgroup_path)
        #[arg(long)]
        cgroup: Option<PathBuf>,

        /// Pin root directory (defaults to config attach.pin_root)
        #[arg(long, conflicts_with = "no_pin")]
        pin_root: Option<PathBuf>,

        /// Do not pin maps
        #[arg(long)]
        no_pin: bool,
    },

    /// Check the embedded object against the contract surface
    Verify,

    /// Show host capabilities and pin state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone())?;

    // CLI verbose flag takes precedence, then config
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.loader.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Attach {
            cgroup,
            pin_root,
            no_pin,
        } => {
            let cgroup = cgroup.unwrap_or_else(|| PathBuf::from(&config.attach.cgroup_path));
            let pin_root = if no_pin {
                None
            } else {
                pin_root.or_else(|| config.attach.pin_root())
            };
            attach_command(cgroup, pin_root).await
        }
        Commands::Verify => verify_command(),
        Commands::Status => status_command(&config),
    }
}

/// Load configuration from file/env. A broken config is fatal: falling back
/// to defaults would attach to the root cgroup.
fn load_config(cli_path: Option<PathBuf>) -> anyhow::Result<LoaderConfig> {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    loader.load().map_err(|e| {
        // Logging is not initialised yet.
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!(e)
    })
}

#[cfg(target_os = "linux")]
async fn attach_command(cgroup: PathBuf, pin_root: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Starting nity loader v{}...", nity_loader::LOADER_VERSION);

    let mut handle = match nity_loader::load_and_attach(cgroup.clone(), pin_root.as_deref()) {
        Ok(handle) => handle,
        Err(e) => {
            if e.is_build_defect() {
                warn!("The embedded object does not match contract v{CONTRACT_VERSION}; rebuild it");
            }
            return Err(e.into());
        }
    };

    println!();
    println!("===========================================");
    println!("  nity - Attached");
    println!("===========================================");
    println!("  Program:  {}", ENTRY_PROGRAM);
    println!("  cgroup:   {}", cgroup.display());
    match handle.pin_report() {
        Some(report) => {
            println!("  Pin root: {}", report.root.display());
            println!("  Pinned:   {}", report.pinned.len());
            println!("  Kept:     {}", report.preserved.len());
        }
        None => println!("  Pin root: (pinning disabled)"),
    }
    println!();
    println!("  Press Ctrl+C to detach");
    println!("===========================================");
    println!();

    tokio::signal::ctrl_c().await?;

    info!("Detaching {} from {}...", ENTRY_PROGRAM, cgroup.display());
    handle.close()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn attach_command(_cgroup: PathBuf, _pin_root: Option<PathBuf>) -> anyhow::Result<()> {
    anyhow::bail!("cgroup eBPF attachment is only available on Linux")
}

#[cfg(target_os = "linux")]
fn verify_command() -> anyhow::Result<()> {
    use nity_loader::{EmbeddedObject, SpecificationSource};

    let spec = EmbeddedObject::new().load()?;

    println!();
    println!("Contract v{} against embedded object", CONTRACT_VERSION);
    println!();
    for map in CONTRACT_MAPS.iter() {
        match spec.map(map.name) {
            Some(m) => println!(
                "  [ok]      {:<20} {:<14} max_entries={:<7} {}",
                map.name,
                m.type_name(),
                m.max_entries,
                map.role.describe()
            ),
            None => println!("  [missing] {:<20} {}", map.name, map.role.describe()),
        }
    }
    match spec.program(ENTRY_PROGRAM).and_then(|p| p.hook) {
        Some(hook) => println!("  [ok]      {:<20} {}", ENTRY_PROGRAM, hook),
        None => println!("  [missing] {:<20} entry point", ENTRY_PROGRAM),
    }
    println!();

    spec.check_contract()
        .map_err(|v| anyhow::anyhow!("contract surface violation: {v}"))?;
    println!("Embedded object satisfies the contract surface.");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn verify_command() -> anyhow::Result<()> {
    anyhow::bail!("the embedded eBPF object is only built on Linux")
}

fn status_command(config: &LoaderConfig) -> anyhow::Result<()> {
    println!();
    println!("nity loader v{}", nity_loader::LOADER_VERSION);
    println!("Contract version: {}", CONTRACT_VERSION);
    println!();

    println!("Host:");
    println!("  Running as root: {}", env::is_root());
    println!("  bpffs mounted: {}", env::check_bpffs_mounted());
    println!("  BTF available: {}", env::has_btf());
    if let Some(version) = env::get_kernel_version() {
        println!(
            "  Kernel: {}.{}.{} (memlock accounting: {})",
            version.0,
            version.1,
            version.2,
            if env::memlock_accounting_is_cgroup_based(version) {
                "cgroup"
            } else {
                "rlimit"
            }
        );
    }

    let cgroup = Path::new(&config.attach.cgroup_path);
    println!();
    println!("Attach target:");
    println!("  cgroup: {}", cgroup.display());
    println!("  cgroup v2: {}", env::is_cgroup_v2(cgroup));

    println!();
    match config.attach.pin_root() {
        Some(root) => {
            println!("Pins under {}:", root.display());
            for map in CONTRACT_MAPS.iter() {
                let present = pin::pin_path(&root, map.name).exists();
                println!(
                    "  {:<20} {}",
                    map.name,
                    if present { "pinned" } else { "absent" }
                );
            }
        }
        None => println!("Pinning disabled"),
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_pin_conflicts_with_pin_root() {
        let result = Cli::try_parse_from(["nity", "attach", "--no-pin", "--pin-root", "/tmp/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[attach]\ncgroup_path = \"\"\n").unwrap();

        assert!(load_config(Some(path)).is_err());
    }

    #[test]
    fn test_malformed_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[attach\ncgroup_path = ").unwrap();

        assert!(load_config(Some(path)).is_err());
    }

    #[test]
    fn test_attach_flags_parse() {
        let cli = Cli::try_parse_from([
            "nity",
            "-vv",
            "attach",
            "--cgroup",
            "/sys/fs/cgroup/app.slice",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Attach {
                cgroup, no_pin, ..
            } => {
                assert_eq!(cgroup, Some(PathBuf::from("/sys/fs/cgroup/app.slice")));
                assert!(!no_pin);
            }
            _ => panic!("expected attach"),
        }
    }
}
