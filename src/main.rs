use clap::{Parser, Subcommand};
use docrag::Result;
use docrag::commands::{IngestOverrides, ask, ingest_document, print_config, serve, show_stats};
use docrag::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Ask questions about your documents, answered from a vector index")]
#[command(version)]
struct Cli {
    /// Path to a configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk, embed and store a document (.docx, .md, .txt)
    Ingest {
        /// Document to ingest
        path: PathBuf,
        /// Maximum characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Characters shared by consecutive chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Namespace to write into
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Start the HTTP query server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Answer a single question from the terminal
    Ask {
        /// The question
        query: String,
    },
    /// Show record counts and dimension of the configured collection
    Stats,
    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            path,
            chunk_size,
            chunk_overlap,
            namespace,
        } => {
            let overrides = IngestOverrides {
                chunk_size,
                chunk_overlap,
                namespace,
            };
            ingest_document(config, &path, overrides).await?;
        }
        Commands::Serve { host, port } => {
            serve(config, host, port).await?;
        }
        Commands::Ask { query } => {
            ask(&config, query).await?;
        }
        Commands::Stats => {
            show_stats(&config).await?;
        }
        Commands::Config { show } => {
            if show {
                print_config(&config, cli.config.as_deref());
            } else {
                println!("Configuration is read from a TOML file and the environment.");
                println!("Run 'docrag config --show' to print the effective settings.");
            }
        }
    }

    Ok(())
}
