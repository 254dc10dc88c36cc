use anyhow::{Context, Result};
use camrec::{ArchiveKey, EventBus, Recorder, RecorderConfig, ResolutionProfile};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "camrec")]
#[command(about = "Camera recorder with a local video archive")]
#[command(version)]
#[command(long_about = "Records the camera at a chosen resolution profile, stores each \
recording in a local archive, and lists, exports or clears stored recordings.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camrec.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a file
    #[arg(long, value_name = "PATH", help = "Append logs to this file")]
    log_file: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record until the duration elapses or Ctrl+C, then store the recording
    Record {
        /// Recording length in seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Resolution profile label, e.g. 720p
        #[arg(long, value_name = "LABEL")]
        profile: Option<String>,

        /// Record video only
        #[arg(long)]
        no_audio: bool,
    },
    /// Control recording from the keyboard
    Interactive,
    /// List stored recordings
    List,
    /// Show one stored recording, or write it to a file
    Get {
        key: ArchiveKey,

        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Export every stored recording
    Export {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Delete the whole archive
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// List resolution profiles
    Profiles,
    /// Show what the camera delivers at its preferred settings
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting camrec v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match RecorderConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let Some(command) = args.command else {
        eprintln!("No command given, see --help");
        std::process::exit(2);
    };

    if let Command::Profiles = command {
        for profile in ResolutionProfile::all() {
            println!("{}", profile);
        }
        return Ok(());
    }

    if let Command::Clear { yes: false } = command {
        eprintln!("Refusing to delete the archive without --yes");
        std::process::exit(1);
    }

    let timezone: Tz = config
        .archive
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid timezone: {}", e))?;

    let recorder = Recorder::open(config, Arc::new(EventBus::default()))
        .await
        .context("Failed to initialize recorder")?;

    match command {
        Command::Record {
            duration,
            profile,
            no_audio,
        } => {
            if let Some(label) = profile {
                recorder.set_profile(&label).await?;
            }
            if no_audio {
                recorder.set_audio(false).await;
            }

            println!("Recording at {}, press Ctrl+C to stop", recorder.profile().await);
            let saved = recorder
                .record_for(duration.map(Duration::from_secs))
                .await?;
            println!("Saved recording {} ({} bytes)", saved.key, saved.bytes);
        }
        Command::Interactive => {
            let reason = recorder.run_interactive().await?;
            info!("Interactive session ended: {:?}", reason);
        }
        Command::List => {
            let records = recorder.list().await?;
            if records.is_empty() {
                println!("No stored recordings");
            }
            for record in &records {
                let created = record.created_at.with_timezone(&timezone);
                let size = match &record.payload {
                    Some(payload) => format!("{} bytes", payload.len()),
                    None => "missing payload".to_string(),
                };
                println!(
                    "{}  {}  {}  {}",
                    record.key,
                    created.format("%Y-%m-%d %H:%M:%S %Z"),
                    record.mime_type(),
                    size
                );
            }
        }
        Command::Get { key, output } => match output {
            Some(path) => match recorder.export_one(key, &path).await? {
                Some(path) => println!("Wrote {}", path.display()),
                None => {
                    eprintln!("No recording stored under key {}", key);
                    std::process::exit(1);
                }
            },
            None => match recorder.get(key).await? {
                Some(record) => {
                    let created = record.created_at.with_timezone(&timezone);
                    println!("key:        {}", record.key);
                    println!("created:    {}", created.format("%Y-%m-%d %H:%M:%S %Z"));
                    println!("media type: {}", record.mime_type());
                    println!("size:       {} bytes", record.size());
                }
                None => {
                    eprintln!("No recording stored under key {}", key);
                    std::process::exit(1);
                }
            },
        },
        Command::Export { dir } => {
            let written = recorder.export_all(dir.as_deref()).await?;
            for path in &written {
                println!("{}", path.display());
            }
            println!("Exported {} recordings", written.len());
        }
        Command::Clear { .. } => {
            recorder.clear().await?;
            println!("Archive cleared");
        }
        Command::Inspect => {
            let settings = recorder.inspect_camera().await?;
            println!(
                "Camera {} delivers {} at {} fps (audio: {})",
                recorder.config().camera.index,
                settings,
                settings.fps,
                settings.audio
            );
        }
        Command::Profiles => {}
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camrec={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camrec configuration file");
    println!("# Every option with its default value. Environment variables override");
    println!("# file values, e.g. CAMREC__ARCHIVE__PATH=/data/archive");
    println!();
    println!("{}", RecorderConfig::default().to_toml()?);
    Ok(())
}
