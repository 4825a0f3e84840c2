use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{Level, error, info};
use sriov_cloudinit::constants::{DIR_HOOK_SOCKETS, FILE_ETC_RESOLV_CONF, FILE_HOOK_SOCKET};
use sriov_cloudinit::hooks::{HookConfig, Hooks};
use sriov_cloudinit::link::NetlinkInspector;
use sriov_cloudinit::logger::init_logger;
use sriov_cloudinit::resolv::ResolvConfFile;
use sriov_cloudinit::server::{Server, shutdown_signal};
use tokio::runtime::Handle;

#[derive(Parser)]
#[command(name = "sriov-discovery")]
#[command(about = "Cloud-init hook sidecar configuring SR-IOV interfaces in the guest")]
struct Cli {
    /// Directory shared with the VM launcher for hook sockets
    #[arg(long, env = "HOOK_SOCKETS_DIR", default_value = DIR_HOOK_SOCKETS)]
    socket_dir: PathBuf,

    /// Socket file name inside the socket directory
    #[arg(long, default_value = FILE_HOOK_SOCKET)]
    socket_name: String,

    /// Address mapped to the VM hostname in the guest /etc/hosts
    #[arg(long, env = "HOSTS_IP_ADDRESS")]
    hosts_ip_address: Option<String>,

    /// Resolver configuration handed to the guest
    #[arg(long, default_value = FILE_ETC_RESOLV_CONF)]
    resolv_conf: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let config = HookConfig {
        hosts_ip_address: cli.hosts_ip_address.filter(|ip| !ip.is_empty()),
    };
    let inspector = NetlinkInspector::new(Handle::current())?;
    let resolver = ResolvConfFile::new(&cli.resolv_conf);
    let hooks = Hooks::new(config, Arc::new(inspector), Arc::new(resolver));

    let socket_path = cli.socket_dir.join(&cli.socket_name);
    let server = Server::bind(&socket_path, hooks).context("unable to start hook server")?;
    info!("SR-IOV discovery hook sidecar started");
    server.serve(shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { Level::Debug } else { Level::Info };
    if let Err(e) = init_logger("cloudinit-hook-sidecar", level) {
        // Use eprintln! here since the logger did not initialize.
        eprintln!("Failed to initialize logger: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
