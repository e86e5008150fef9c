// docqa - ask questions about images and PDFs from the command line
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

use docqa::{logging, DocQaConfig, Document, DocumentQa};

#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(author, version, about = "Answer questions about images and PDFs using OCR and an extractive QA model")]
struct Cli {
    /// Configuration file (defaults to ./docqa.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question about a document
    Ask {
        /// Image or PDF file
        file: PathBuf,
        /// Question to ask
        question: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the text OCR finds in a document
    Extract {
        /// Image or PDF file
        file: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            file,
            question,
            format,
        } => {
            let document = Document::open(&file)?;
            let mut qa = build(cli.config.as_deref())?;
            let answer = qa
                .answer(&document, &question)
                .with_context(|| format!("failed to answer question about {}", file.display()))?;
            match format {
                OutputFormat::Text => println!("{answer}"),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "file": file,
                        "question": question,
                        "answer": answer,
                    }))?
                ),
            }
        }
        Commands::Extract { file } => {
            let document = Document::open(&file)?;
            let mut qa = build(cli.config.as_deref())?;
            let text = qa
                .extract_text(&document)
                .with_context(|| format!("failed to extract text from {}", file.display()))?;
            println!("{text}");
        }
    }

    Ok(())
}

fn build(config_path: Option<&std::path::Path>) -> Result<DocumentQa> {
    let config = DocQaConfig::load(config_path)?;
    debug!(?config, "configuration loaded");
    DocumentQa::from_config(&config).context("failed to initialize document QA engines")
}
