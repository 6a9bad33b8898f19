use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use gadget_core::{load_settings, Gadget, GadgetSettings, InMemoryDocumentEngine};
use shared::domain::TransportProtocol;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod frames;

/// Runs an editor gadget against JSON-lines host messages on stdin.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file. Defaults to `gadget.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_address: Option<String>,
    /// `ws` or `none`.
    #[arg(long)]
    protocol: Option<String>,
    /// Stay offline until the host sends CONFIGURE.
    #[arg(long)]
    no_connect: bool,
    /// Overrides RUST_LOG.
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn apply(&self, settings: &mut GadgetSettings) {
        if let Some(address) = &self.server_address {
            settings.server_address = address.clone();
        }
        if let Some(protocol) = &self.protocol {
            settings.transport_protocol = TransportProtocol::parse(protocol);
        }
        if self.no_connect {
            settings.connect_on_launch = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = match &args.log_filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = load_settings(args.config.as_deref())?;
    args.apply(&mut settings);
    info!(
        address = %settings.server_address,
        protocol = ?settings.transport_protocol,
        connect_on_launch = settings.connect_on_launch,
        "gadget_host: starting"
    );

    let engine = Arc::new(InMemoryDocumentEngine::new(settings.initial_content.clone()));
    let (mut gadget, mut events) = Gadget::launch(settings, engine);

    let mut stdout = tokio::io::stdout();
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            Some(event) = events.recv() => frames::write_event(&mut stdout, &event).await?,
            line = lines.next() => match line {
                Some(Ok(line)) => match frames::decode_line(&line) {
                    Some(Ok(envelope)) => gadget.post(envelope),
                    Some(Err(event)) => frames::write_event(&mut stdout, &event).await?,
                    None => {}
                },
                Some(Err(err)) => {
                    warn!(error = %err, "gadget_host: stdin failed");
                    break;
                }
                None => {
                    info!("gadget_host: stdin closed");
                    break;
                }
            },
            _ = &mut interrupt => {
                info!("gadget_host: interrupted");
                break;
            }
        }
    }

    gadget.destroy().await;
    while let Ok(event) = events.try_recv() {
        frames::write_event(&mut stdout, &event).await?;
    }
    Ok(())
}
