//! Light CLI - format messages, render configs and talk to a running syslog-ng
//!
//! Usage:
//!     light format --ietf --message "hello" --count 3
//!     light render --source tcp --template '$MSG\n'
//!     light stats --control /tmp/light/syslog_ng.ctl --json
//!     light query --control /tmp/light/syslog_ng.ctl --mode sum 'src.*'
//!     light version

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use light_core::{
    format_message, ConfigDocument, ControlClient, DaemonController, FileDestinationOptions, FileSourceOptions,
    HarnessConfig, LightError, LogMessageFields, MessageFormat, MessageGenerator, NetworkOptions, Poller, QueryMode,
    ResourceRegistry, SocketKind, StatsSnapshot, UnixSocketOptions,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "light")]
#[command(about = "Helpers for syslog-ng functional tests")]
#[command(version)]
struct Args {
    /// Harness config JSON; LIGHT_* environment variables apply on top
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print formatted log messages
    Format {
        /// IETF (octet-counted) instead of BSD
        #[arg(long)]
        ietf: bool,
        #[arg(long)]
        priority: Option<u16>,
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        pid: Option<String>,
        #[arg(long)]
        msgid: Option<String>,
        #[arg(long)]
        sdata: Option<String>,
        #[arg(long)]
        message: Option<String>,
        /// Numbered messages from the generator instead of one message
        #[arg(long)]
        count: Option<u64>,
    },

    /// Render a one-source, one-file-destination config
    Render {
        #[arg(long, value_enum, default_value_t = SourceKind::File)]
        source: SourceKind,
        /// Destination template
        #[arg(long)]
        template: Option<String>,
    },

    /// Dump counters of a running daemon
    Stats {
        #[arg(long)]
        control: PathBuf,
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        json: bool,
    },

    /// Query counters of a running daemon
    Query {
        #[arg(long)]
        control: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Get)]
        mode: Mode,
        pattern: String,
    },

    /// Config version and modules of the daemon binary
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceKind {
    File,
    Tcp,
    Udp,
    Tcp6,
    Udp6,
    UnixStream,
    UnixDgram,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Get,
    Sum,
    Reset,
    List,
}

impl From<Mode> for QueryMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Get => QueryMode::Get,
            Mode::Sum => QueryMode::GetSum,
            Mode::Reset => QueryMode::GetReset,
            Mode::List => QueryMode::List,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "light=info,light_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> light_core::Result<()> {
    let config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)?.with_env_overrides(),
        None => HarnessConfig::from_env(),
    };
    tracing::debug!(
        syslog_ng = %config.syslog_ng_binary.display(),
        working_dir = %config.working_dir.display(),
        "harness config loaded"
    );

    match args.command {
        Command::Format {
            ietf,
            priority,
            timestamp,
            hostname,
            program,
            pid,
            msgid,
            sdata,
            message,
            count,
        } => {
            let (mut fields, format) = if ietf {
                (LogMessageFields::ietf_defaults(), MessageFormat::Ietf)
            } else {
                (LogMessageFields::bsd_defaults(), MessageFormat::Bsd)
            };
            fields.priority = priority.or(fields.priority);
            fields.timestamp = timestamp.or(fields.timestamp);
            fields.hostname = hostname.or(fields.hostname);
            fields.program = program.or(fields.program);
            fields.pid = pid.or(fields.pid);
            fields.msgid = msgid.or(fields.msgid);
            fields.sdata = sdata.or(fields.sdata);
            fields.message = message.or(fields.message);

            match count {
                Some(count) => {
                    for line in MessageGenerator::new(fields, format).generate(count) {
                        print!("{line}");
                    }
                }
                None => println!("{}", format_message(&fields, format, false)),
            }
        }

        Command::Render { source, template } => {
            let registry = Arc::new(ResourceRegistry::new(&config.working_dir)?);
            let mut doc = ConfigDocument::new(registry, &config);
            let source_id = match source {
                SourceKind::File => doc.file_source(FileSourceOptions::new().follow_freq(1))?.id().clone(),
                SourceKind::UnixStream => doc
                    .unix_source(SocketKind::UnixStream, UnixSocketOptions::new())?
                    .id()
                    .clone(),
                SourceKind::UnixDgram => doc
                    .unix_source(SocketKind::UnixDgram, UnixSocketOptions::new())?
                    .id()
                    .clone(),
                SourceKind::Tcp => doc.network_source(SocketKind::Tcp, NetworkOptions::new())?.id().clone(),
                SourceKind::Udp => doc.network_source(SocketKind::Udp, NetworkOptions::new())?.id().clone(),
                SourceKind::Tcp6 => doc.network_source(SocketKind::Tcp6, NetworkOptions::new())?.id().clone(),
                SourceKind::Udp6 => doc.network_source(SocketKind::Udp6, NetworkOptions::new())?.id().clone(),
            };
            let mut options = FileDestinationOptions::new();
            if let Some(template) = template {
                options = options.template(template);
            }
            let destination = doc.file_destination(options)?;
            doc.create_logpath([&source_id, destination.id()])?;
            print!("{}", doc.render()?);
        }

        Command::Stats { control, reset, json } => {
            let ctl = ControlClient::new(&config.syslog_ng_ctl_binary, control, Poller::from(config.poll));
            let output = ctl.stats(reset)?;
            if !output.success() {
                return Err(LightError::CommandFailed {
                    command: "stats".to_string(),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            if json {
                let snapshot = StatsSnapshot::parse_stats(&output.stdout)?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", output.stdout);
            }
        }

        Command::Query { control, mode, pattern } => {
            let ctl = ControlClient::new(&config.syslog_ng_ctl_binary, control, Poller::from(config.poll));
            let output = ctl.query(mode.into(), &pattern)?;
            print!("{}", output.stdout);
            if !output.success() {
                return Err(LightError::CommandFailed {
                    command: format!("query {pattern}"),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }

        Command::Version => {
            let registry = ResourceRegistry::new(&config.working_dir)?;
            let daemon = DaemonController::new(&config, &registry, "probe")?;
            println!("Config version: {}", daemon.config_version()?);
            println!("Available-Modules: {}", daemon.available_modules()?.join(","));
        }
    }
    Ok(())
}
