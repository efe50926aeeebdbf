use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use glot_cli::commands;
use glot_logger as logger;
use glot_runtime::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Polyglot plugin runtime package manager")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// Base directory holding modules/ and plugins/
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    /// Path to a glot.json configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase output verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package, or everything a manifest lists
    Install {
        /// Package to install, as name or name@version
        package: Option<String>,
        /// Manifest path or URL to install from
        #[arg(short = 'f', long = "file", conflicts_with = "package")]
        manifest: Option<String>,
        /// Also download packages that are already installed
        #[arg(long, requires = "manifest")]
        reinstall: bool,
        /// Install everything the last scan reported missing
        #[arg(long, conflicts_with_all = ["package", "manifest"])]
        missing: bool,
    },
    /// Update installed packages
    Update {
        /// Package to update, as name or name@version
        package: Option<String>,
        /// Update every installed package
        #[arg(long, conflicts_with = "package")]
        all: bool,
    },
    /// Remove installed packages
    Uninstall {
        /// Package to remove
        package: Option<String>,
        /// Remove every installed package
        #[arg(long, conflicts_with = "package")]
        all: bool,
        /// Remove packages with unresolvable conflicts
        #[arg(long, conflicts_with_all = ["package", "all"])]
        conflicted: bool,
    },
    /// Write a manifest describing the installed set
    Snapshot {
        /// Destination path (*.gmanifest)
        path: PathBuf,
        /// Pretty-print the manifest
        #[arg(long)]
        pretty: bool,
    },
    /// List installed packages
    List,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            logger::error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = match &cli.global.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::new(&cli.global.base_dir),
    };
    if config.base_dir.as_os_str().is_empty() {
        config.base_dir = cli.global.base_dir.clone();
    }

    let severity = match cli.global.verbose {
        0 => config.log_severity.unwrap_or(logger::Severity::Info),
        1 => logger::Severity::Debug,
        _ => logger::Severity::Verbose,
    };
    logger::set_severity(severity);
    let _ = logger::init();
    logger::reset_error_count();

    let mut manager = glot_runtime::PackageManager::new(config);
    manager.initialize();

    match cli.command {
        Commands::Install {
            package,
            manifest,
            reinstall,
            missing,
        } => commands::install(&mut manager, package, manifest, reinstall, missing),
        Commands::Update { package, all } => commands::update(&mut manager, package, all),
        Commands::Uninstall {
            package,
            all,
            conflicted,
        } => commands::uninstall(&mut manager, package, all, conflicted),
        Commands::Snapshot { path, pretty } => commands::snapshot(&manager, &path, pretty),
        Commands::List => commands::list(&manager),
    }

    manager.terminate();

    Ok(if logger::error_count() > 0 { 1 } else { 0 })
}
