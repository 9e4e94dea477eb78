use clap::{Parser, Subcommand};
use nix::unistd::Pid;
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vpn_pk::launch::Caller;
use vpn_pk::platform::get_process_table;
use vpn_pk::{CommandError, Helper, HelperConfig, LaunchMode, StopOutcome};

#[derive(Parser)]
#[command(name = "vpn-pk")]
#[command(about = "Privileged launcher for OpenVPN client profiles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the VPN client for a profile until it exits
    Start {
        /// Profile path (.../<app_dir>/profiles/<id>.ovpn)
        profile: PathBuf,
        /// Temporary credentials file; deleted once the client exits
        credentials: Option<PathBuf>,
    },
    /// Like start, but only for profiles authorized with set-autostart
    Autostart {
        profile: PathBuf,
        credentials: Option<PathBuf>,
    },
    /// Stop a running VPN client process
    Stop {
        #[arg(value_parser = clap::value_parser!(i32).range(1..))]
        pid: i32,
    },
    /// Authorize the profile's current contents for autostart
    SetAutostart { profile: PathBuf },
    /// Revoke an autostart authorization by digest
    ClearAutostart { digest: String },
    /// List authorized profile digests
    ListAutostart,
    /// Print the digest of a profile's current contents
    Digest { profile: PathBuf },
    /// Print the effective configuration
    PrintConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries command output, logs go to stderr
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    let config = match HelperConfig::load_system() {
        Ok(config) => config,
        Err(e) => {
            error!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    match run(cli.command, &config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, config: &HelperConfig) -> Result<i32, CommandError> {
    let helper = Helper::new(config, Caller::detect());

    match command {
        Commands::Start {
            profile,
            credentials,
        } => {
            helper
                .launch(LaunchMode::Start, &profile, credentials.as_deref())
                .await
        }
        Commands::Autostart {
            profile,
            credentials,
        } => {
            helper
                .launch(LaunchMode::Autostart, &profile, credentials.as_deref())
                .await
        }
        Commands::Stop { pid } => {
            let table = get_process_table()?;
            match helper.stop(table.as_ref(), Pid::from_raw(pid)).await? {
                StopOutcome::NotRunning => info!("Process {} was not running", pid),
                StopOutcome::Stopped => info!("Stopped process {}", pid),
                StopOutcome::StillRunning => warn!("Process {} did not exit in time", pid),
            }
            Ok(0)
        }
        Commands::SetAutostart { profile } => {
            let digest = helper.set_autostart(&profile)?;
            println!("{}", digest);
            Ok(0)
        }
        Commands::ClearAutostart { digest } => {
            helper.clear_autostart(&digest)?;
            Ok(0)
        }
        Commands::ListAutostart => {
            for digest in helper.list_autostart()? {
                println!("{}", digest);
            }
            Ok(0)
        }
        Commands::Digest { profile } => {
            println!("{}", helper.digest(&profile)?);
            Ok(0)
        }
        Commands::PrintConfig => match config.to_toml() {
            Ok(text) => {
                print!("{}", text);
                Ok(0)
            }
            Err(e) => {
                error!("{}", e);
                Ok(1)
            }
        },
    }
}
