use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyrag::{
    api, config, logging,
    service::{RagApi, RagService},
};
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "rustyrag",
    about = "Retrieval-augmented question answering over Markdown and Confluence"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Ingest Markdown files below a folder.
    IngestFolder { path: PathBuf },
    /// Ingest pages of Confluence spaces.
    IngestConfluence {
        /// Space key; repeat for several. Defaults to CONFLUENCE_SPACES.
        #[arg(long = "space")]
        spaces: Vec<String>,
    },
    /// Ask a question against the indexed documents.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let service = Arc::new(RagService::from_config(config).context("failed to build service")?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service, config).await,
        Command::IngestFolder { path } => {
            let report = service.ingest_path(path).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::IngestConfluence { spaces } => {
            let spaces = (!spaces.is_empty()).then_some(spaces);
            let report = service.ingest_confluence(spaces).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ask { question, top_k } => {
            let response = service.query(question, top_k).await?;
            println!("{}", response.answer);
            for (position, source) in response.sources.iter().enumerate() {
                let title = source
                    .metadata
                    .get("title")
                    .and_then(|value| value.as_text())
                    .unwrap_or("untitled");
                println!("[{}] {title}", position + 1);
            }
            Ok(())
        }
    }
}

async fn serve(service: Arc<RagService>, config: &config::Config) -> Result<()> {
    if config.knowledgebase_init {
        match service.ingest_folder(None).await {
            Ok(report) => tracing::info!(
                documents = report.documents_found,
                chunks = report.chunks_stored,
                "Startup folder ingestion finished"
            ),
            Err(error) => tracing::error!(error = %error, "Startup folder ingestion failed"),
        }
    }
    if config.confluence_scrape {
        match service.ingest_confluence(None).await {
            Ok(report) => tracing::info!(
                documents = report.documents_found,
                chunks = report.chunks_stored,
                "Startup Confluence ingestion finished"
            ),
            Err(error) => tracing::error!(error = %error, "Startup Confluence ingestion failed"),
        }
    }

    let app = api::create_router(service);
    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
