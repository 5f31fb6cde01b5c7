//! CLI Entry Point for msquared
//!
//! Talks to one ICE Bloc module at a time:
//! - List the operation catalogue of a module type
//! - Ping, read status, issue any catalogued operation
//! - Watch TeraScan telemetry and final reports
//!
//! # Usage
//!
//! ```bash
//! msquared --module solstis ping "Hello World"
//! msquared --module sfg call --op wavelength --params '{"beam":"visible","target":540.0}'
//! msquared --simulate status
//! msquared config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use msquared_daq::config::MsquaredConfig;
use msquared_daq::hardware::mock::SimulatedIceBloc;
use msquared_daq::hardware::{AnyModule, Module};
use msquared_daq::logging::{self, OutputFormat, TracingConfig};
use msquared_daq::protocol::notification::Notification;
use msquared_daq::protocol::{Args, Connection, ModuleKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "msquared")]
#[command(about = "Control client for M Squared ICE Bloc laser modules", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/msquared.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target module
    #[arg(long, global = true, default_value = "solstis")]
    module: ModuleKind,

    /// Talk to an in-process simulated ICE Bloc instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the operation catalogue of the module
    Ops,

    /// Echo text off the module
    Ping {
        /// Text to send
        #[arg(default_value = "Hello World")]
        text: String,
    },

    /// Read the module status
    Status,

    /// Issue any catalogued operation
    Call {
        /// Operation name
        #[arg(long)]
        op: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Request the final report and wait for it
        #[arg(long)]
        report: bool,

        /// Seconds to wait for the final report
        #[arg(long, default_value = "60")]
        report_timeout: u64,
    },

    /// Print telemetry and final reports until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MsquaredConfig::load_from(path),
        None => MsquaredConfig::load(),
    }
    .context("loading configuration")?;
    logging::init(TracingConfig::from_config(&config)?.with_format(cli.log_format))?;

    match cli.command {
        Commands::Ops => {
            list_operations(cli.module);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ref command => run_against_module(&cli, command, &config).await,
    }
}

fn list_operations(kind: ModuleKind) {
    println!("{kind} operations:");
    for spec in kind.operations() {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}:{:?}", p.name, p.kind)
                } else {
                    format!("[{}:{:?}]", p.name, p.kind)
                }
            })
            .collect();
        let report = if spec.reports { " (report)" } else { "" };
        println!(
            "  {:>3}  {:<30} {}{report}\n       {}",
            spec.id,
            spec.name,
            params.join(" "),
            spec.summary
        );
    }
}

async fn run_against_module(cli: &Cli, command: &Commands, config: &MsquaredConfig) -> Result<()> {
    let options = config.protocol.call_options();
    // keep the simulator alive for the whole session
    let (_simulator, conn) = if cli.simulate {
        let simulator = SimulatedIceBloc::start().await?;
        let conn = Connection::open("127.0.0.1", simulator.port(), options).await?;
        (Some(simulator), conn)
    } else {
        let (host, port) = config.modules.get(cli.module).address(cli.module);
        let conn = Connection::open(&host, port, options)
            .await
            .with_context(|| format!("connecting to {} at {host}:{port}", cli.module))?;
        (None, conn)
    };

    let any = AnyModule::from_connection(cli.module, conn);
    let module = any.as_module();
    module.start_link(&config.application.client_ip).await?;

    let outcome = execute(&any, command).await;
    module.close().await;
    outcome
}

async fn execute(any: &AnyModule, command: &Commands) -> Result<()> {
    let module = any.as_module();
    match command {
        Commands::Ping { text } => {
            println!("{}", module.ping(text).await?);
        }
        Commands::Status => {
            let rendered = match any {
                AnyModule::Solstis(m) => serde_json::to_string_pretty(&m.get_status().await?)?,
                AnyModule::Equinox(m) => serde_json::to_string_pretty(&m.laser_status().await?)?,
                AnyModule::Sfg(m) => serde_json::to_string_pretty(&m.status().await?)?,
                AnyModule::Dfg(m) => serde_json::to_string_pretty(&m.status().await?)?,
            };
            println!("{rendered}");
        }
        Commands::Call {
            op,
            params,
            report,
            report_timeout,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(params).context("--params is not valid JSON")?;
            let args = Args::from_json(op, &value)?;
            if *report {
                let limit = Duration::from_secs(*report_timeout);
                let final_report = module.invoke_and_wait(op, &args, limit).await?;
                println!("{}", serde_json::to_string_pretty(&final_report)?);
            } else {
                let reply = module.invoke(op, &args).await?;
                println!("{}", serde_json::to_string_pretty(reply.parameters())?);
            }
        }
        Commands::Watch { duration } => {
            let mut notifications = module.subscribe();
            let watch = async {
                loop {
                    match notifications.recv().await {
                        Ok(notification) => print_notification(&notification),
                        Err(RecvError::Lagged(skipped)) => eprintln!("skipped {skipped} messages"),
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            match duration {
                Some(secs) => {
                    let _ = tokio::time::timeout(Duration::from_secs(*secs), watch).await;
                }
                None => {
                    tokio::select! {
                        () = watch => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
            }
        }
        Commands::Ops | Commands::Config => {}
    }
    Ok(())
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::ScanProgress(progress) => match progress.wavelength_nm {
            Some(nm) => println!("{:<24} {nm:>12.6} nm  {}", progress.source, progress.activity),
            None => println!("{:<24} {:>15}  {}", progress.source, "-", progress.activity),
        },
        Notification::TaskReport(report) => {
            let outcome = if report.failed { "failed" } else { "completed" };
            println!("{:<24} final report: {outcome}", report.op);
        }
        Notification::Unsolicited(envelope) => {
            println!("{:<24} unsolicited {:?}", envelope.op, envelope.parameters);
        }
    }
}
