mod logging;
mod repl;
mod setup;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{error, info};

use dapper_command::{CommandTable, DebuggerInterface, Dispatcher, RemoteCommandListener};
use dapper_config::{load_config, DapperPaths, DefaultPaths};
use dapper_dap::{Connection, ProcessConnector};
use dapper_provider::{publish_providers, ServiceDirectory};

struct Args {
    connection: Option<String>,
    listen: Option<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args {
            connection: None,
            listen: None,
        };
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--connection" | "-c" => {
                    args.connection = Some(it.next().context("--connection needs a value")?);
                }
                "--listen" | "-l" => {
                    args.listen = Some(it.next().context("--listen needs an address")?);
                }
                "--help" | "-h" => {
                    println!("usage: dapper [--connection <local|host[:port]>] [--listen <addr>]");
                    std::process::exit(0);
                }
                other => anyhow::bail!("unexpected argument '{other}'"),
            }
        }
        Ok(args)
    }
}

async fn run() -> Result<()> {
    let args = Args::parse()?;
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;

    let project_dir: Option<PathBuf> = std::env::current_dir().ok();
    let config_result = load_config(&paths.config_dir(), project_dir.as_deref());
    let config = match &config_result {
        Ok(config) => config.clone(),
        Err(_) => dapper_config::Config::default(),
    };

    let log_path = logging::init(&config, &paths)?;
    if let Err(e) = &config_result {
        error!("config load failed, using defaults: {e}");
        eprintln!("dapper: config load failed, using defaults: {e}");
    }
    info!(log = %log_path.display(), "dapper starting");

    let registry = Arc::new(setup::build_registry(&config)?);
    let directory = ServiceDirectory::new();
    let publication = publish_providers(&registry, &directory)
        .await
        .context("failed to publish providers")?;
    info!(offered = ?publication.published(), "providers published");

    let mut interface = DebuggerInterface::new(
        Arc::clone(&registry),
        Arc::new(ProcessConnector),
        setup::session_options(&config),
    );
    if let Some(descriptor) = &args.connection {
        let connection = Connection::parse(descriptor)
            .with_context(|| format!("invalid --connection '{descriptor}'"))?;
        interface = interface.with_connection(connection);
    }
    let dispatcher = Dispatcher::new(CommandTable::builtin(), interface).spawn();

    let listen = args
        .listen
        .clone()
        .or_else(|| config.listener.enabled.then(|| config.listener.address.clone()));
    let listener = match listen {
        Some(address) => {
            let handle = RemoteCommandListener::bind(&address, dispatcher.clone())
                .await
                .with_context(|| format!("failed to listen on {address}"))?;
            if let Some(addr) = handle.local_addr() {
                println!("dapper: accepting triggers on {addr}");
            }
            Some(handle)
        }
        None => None,
    };

    println!(
        "dapper: runtimes {} (type 'help' for commands)",
        publication.published().join(", ")
    );
    let mut stdout = tokio::io::stdout();
    let exit = repl::run(BufReader::new(tokio::io::stdin()), &mut stdout, &dispatcher).await;

    if let Some(listener) = listener {
        listener.shutdown().await;
    }
    dispatcher.shutdown().await;
    publication.withdraw();
    info!(?exit, "dapper stopped");
    exit.map(|_| ())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("dapper: {:#}", e);
        std::process::exit(1);
    }
}
