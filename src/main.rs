use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vpn_reroute::vpn::collect_hosts;
use vpn_reroute::{platform, reroute_host_list, Config, Mode, RerouteError, RerouteSummary};

#[derive(Parser)]
#[command(name = "vpn-reroute")]
#[command(about = "Restore the pre-VPN default route and keep selected hosts on the VPN")]
#[command(version)]
struct Cli {
    /// Read hosts from FILE, one per line (# starts a comment)
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Print the route commands without running them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Config file (default: ./vpn-reroute.toml, then the user config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Hosts to route through the VPN (read from stdin when none are given)
    hosts: Vec<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

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

    match run(&cli) {
        Ok(summary) => {
            if let Err(e) = print_summary(&summary, cli.json) {
                error!("Failed to print summary: {}", e);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            if let RerouteError::HostRoutesFailed { failures } = &e {
                for failure in failures {
                    error!("  {}: {}", failure.host, failure.error);
                }
            }
            exit_code(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<RerouteSummary, RerouteError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };

    let file = cli.file.as_deref().or(config.hosts.file.as_deref());
    let stdin = io::stdin();
    // Don't block waiting on a terminal
    let input = if stdin.is_terminal() {
        None
    } else {
        Some(stdin.lock())
    };

    let list = collect_hosts(file, &cli.hosts, input)?;

    let mode = if cli.dry_run {
        Mode::DryRun
    } else {
        if !platform::is_privileged() {
            warn!("Not running as root, route changes will probably be refused");
        }
        Mode::Apply
    };

    let mut table = platform::get_route_table(config.routing.interface_prefix.as_deref())?;
    reroute_host_list(table.as_mut(), &list, mode)
}

fn print_summary(summary: &RerouteSummary, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    if summary.dry_run {
        println!("Dry run, no routes changed. Would run:");
        for command in &summary.commands {
            println!("  {}", command);
        }
        return Ok(());
    }

    let restored = match &summary.restored_gateway {
        Some(gateway) => format!("{} dev {}", gateway, summary.restored_interface),
        None => format!("dev {}", summary.restored_interface),
    };
    println!(
        "Default route: {} (was dev {})",
        restored, summary.vpn_interface
    );
    println!("Routed via {}:", summary.vpn_interface);
    for host in &summary.hosts {
        println!("  {}", host);
    }
    Ok(())
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(0) | Err(_) => ExitCode::from(1),
        Ok(code) => ExitCode::from(code),
    }
}
