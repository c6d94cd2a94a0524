use anyhow::Result;
use clap::{Parser, Subcommand};
use manual_qa::commands::{ask_once, list_documents, run_chat, serve_stdio, show_status};
use manual_qa::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "manual-qa")]
#[command(about = "Answer questions about vehicle owner's manuals")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, documents and vectors (default: ~/.manual-qa)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// List documents available for loading
    Documents,
    /// Show Ollama and vector database health
    Status,
    /// Load a document and answer a single question
    Ask {
        /// Document name, e.g. Lada_Vesta.pdf
        document: String,
        /// Question about the document
        question: String,
    },
    /// Chat interactively in the terminal
    Chat,
    /// Serve chat requests as line-delimited JSON on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Documents => {
            list_documents(&Config::load(&base_dir)?)?;
        }
        Commands::Status => {
            show_status(&Config::load(&base_dir)?).await?;
        }
        Commands::Ask { document, question } => {
            ask_once(&Config::load(&base_dir)?, &document, &question).await?;
        }
        Commands::Chat => {
            run_chat(&Config::load(&base_dir)?).await?;
        }
        Commands::Serve => {
            serve_stdio(&Config::load(&base_dir)?).await?;
        }
    }

    Ok(())
}
