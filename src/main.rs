use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docvec::commands::{
    ingest_document, init_config, purge_document, query_document, repair_index, show_config,
    show_status,
};

#[derive(Parser)]
#[command(name = "docvec")]
#[command(about = "Document-scoped vector retrieval over local embeddings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed, and store a document from a text file
    Ingest {
        /// Caller-assigned document id
        document_id: String,
        /// Path to the text file to ingest
        file: PathBuf,
        /// Metadata to attach to every chunk, as key=value (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
    /// Find the chunks of one document nearest to a question
    Query {
        /// Document id to search within
        document_id: String,
        /// Question text
        question: String,
        /// Number of nearest neighbors to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Remove a document's chunks from the index and store
    Purge {
        /// Document id to purge
        document_id: String,
    },
    /// Show store/index counts and consistency
    Status,
    /// Repair store/index divergence
    Repair,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Ingest {
            document_id,
            file,
            metadata,
        } => {
            ingest_document(&document_id, &file, &metadata).await?;
        }
        Commands::Query {
            document_id,
            question,
            top_k,
        } => {
            query_document(&document_id, &question, top_k).await?;
        }
        Commands::Purge { document_id } => {
            purge_document(&document_id).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Repair => {
            repair_index().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docvec", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_metadata() {
        let cli = Cli::try_parse_from([
            "docvec",
            "ingest",
            "doc-1",
            "notes.txt",
            "--meta",
            "source=manual",
            "--meta",
            "lang=en",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                document_id,
                file,
                metadata,
            } = parsed.command
            {
                assert_eq!(document_id, "doc-1");
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(metadata, vec!["source=manual", "lang=en"]);
            }
        }
    }

    #[test]
    fn query_command_with_top_k() {
        let cli = Cli::try_parse_from([
            "docvec", "query", "doc-1", "how does ingest work", "--top-k", "3",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                document_id,
                question,
                top_k,
            } = parsed.command
            {
                assert_eq!(document_id, "doc-1");
                assert_eq!(question, "how does ingest work");
                assert_eq!(top_k, Some(3));
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docvec", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docvec", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docvec", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
