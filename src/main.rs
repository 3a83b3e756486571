//! # Sentra CLI
//!
//! The `sentra` binary answers security questionnaires from a per-user
//! knowledge base of reference documents.
//!
//! ## Usage
//!
//! ```bash
//! sentra --config ./config/sentra.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sentra init` | Create the SQLite database and run schema migrations |
//! | `sentra ingest --user <id> <files…>` | Build or rebuild the user's knowledge base |
//! | `sentra ask --user <id> "<question>"` | Answer a one-off question |
//! | `sentra answer --user <id> <file>` | Answer every question in a questionnaire |
//! | `sentra list --user <id>` | List the user's questionnaires, newest first |
//! | `sentra review --user <id> <qid>` | List a questionnaire's stored answers |
//! | `sentra edit --user <id> <answer-id> <text>` | Record an edited answer |
//! | `sentra export --user <id> <qid>` | Export answers to DOCX or CSV |
//! | `sentra status --user <id> <qid>` | Coverage summary for a questionnaire |
//! | `sentra reset --user <id>` | Delete the user's knowledge base |

mod answer;
mod chunk;
mod config;
mod db;
mod embedding;
mod export;
mod index;
mod ingest;
mod llm;
mod migrate;
mod models;
mod parse;
mod store;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::export::ExportFormat;
use crate::index::IndexManager;

/// Sentra: security questionnaire answering with retrieval-augmented
/// generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sentra.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sentra",
    about = "Sentra: answer security questionnaires from your own reference documents",
    version,
    long_about = "Sentra builds a per-user semantic knowledge base from reference documents \
    (PDF, TXT, DOCX), retrieves the most relevant passages for each questionnaire question, \
    generates answers with a local (Ollama) or hosted (Groq) LLM, and exports the results \
    with citations and confidence scores."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sentra.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the questionnaires/answers
    /// tables. Idempotent; running it multiple times is safe.
    Init,

    /// Build or rebuild a user's knowledge base from reference documents.
    ///
    /// Parses each file, chunks and embeds the text, and atomically swaps
    /// the user's index. A file that fails to parse is skipped; an
    /// embedding failure leaves the previous index untouched.
    Ingest {
        /// User id scoping the knowledge base.
        #[arg(long)]
        user: String,

        /// Reference documents (PDF, TXT, or DOCX).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Answer a one-off question against the knowledge base.
    Ask {
        /// User id scoping the knowledge base.
        #[arg(long)]
        user: String,

        /// The question to answer.
        question: String,
    },

    /// Parse a questionnaire and answer every question in it.
    ///
    /// Questions are answered sequentially; a failed question degrades that
    /// single answer and the rest of the batch still completes. Results are
    /// persisted for review and export.
    Answer {
        /// User id scoping the knowledge base and stored answers.
        #[arg(long)]
        user: String,

        /// Questionnaire file (PDF, TXT, or DOCX) with numbered questions.
        file: PathBuf,
    },

    /// List a user's questionnaires, newest first.
    List {
        /// User id whose questionnaires to list.
        #[arg(long)]
        user: String,
    },

    /// List the stored answers for a questionnaire.
    Review {
        /// User id owning the questionnaire.
        #[arg(long)]
        user: String,

        /// Questionnaire id (printed by `answer`).
        questionnaire_id: String,
    },

    /// Record an edited answer. The edit wins over the generated text at
    /// review and export time.
    Edit {
        /// User id owning the answer's questionnaire.
        #[arg(long)]
        user: String,

        /// Answer id (printed by `review`).
        answer_id: String,

        /// Replacement answer text.
        text: String,
    },

    /// Export a questionnaire's answers.
    Export {
        /// User id owning the questionnaire.
        #[arg(long)]
        user: String,

        /// Questionnaire id.
        questionnaire_id: String,

        /// Output format: `docx` or `csv`.
        #[arg(long, default_value = "docx")]
        format: String,

        /// Output path. Defaults to `questionnaire-<id>.<ext>`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the coverage summary for a questionnaire.
    Status {
        /// User id owning the questionnaire.
        #[arg(long)]
        user: String,

        /// Questionnaire id.
        questionnaire_id: String,
    },

    /// Delete a user's knowledge base index.
    Reset {
        /// User id whose index should be removed.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Ingest { user, files } => {
            let embedder = embedding::create_embedder(&config.embedding)?;
            ingest::run_ingest(&config, embedder.as_ref(), &user, &files).await?;
        }

        Commands::Ask { user, question } => {
            let embedder = embedding::create_embedder(&config.embedding)?;
            let provider = llm::create_provider(&config.llm)?;
            answer::run_ask(&config, embedder.as_ref(), provider.as_ref(), &user, &question)
                .await?;
        }

        Commands::Answer { user, file } => {
            let embedder = embedding::create_embedder(&config.embedding)?;
            let provider = llm::create_provider(&config.llm)?;
            answer::run_answer(&config, embedder.as_ref(), provider.as_ref(), &user, &file)
                .await?;
        }

        Commands::List { user } => {
            let pool = db::connect(&config).await?;
            let records = store::list_questionnaires(&pool, &user).await?;
            if records.is_empty() {
                println!("no questionnaires for {}", user);
            } else {
                for q in &records {
                    println!("{}  {}  ({})", q.id, q.filename, q.status);
                }
            }
            pool.close().await;
        }

        Commands::Review {
            user,
            questionnaire_id,
        } => {
            let pool = db::connect(&config).await?;
            let questionnaire = store::get_questionnaire(&pool, &questionnaire_id)
                .await?
                .with_context(|| format!("No questionnaire with id {}", questionnaire_id))?;
            if questionnaire.user_id != user {
                anyhow::bail!("Questionnaire {} does not belong to this user", questionnaire_id);
            }

            let rows = store::list_answers(&pool, &questionnaire_id).await?;
            println!("{} ({})", questionnaire.filename, questionnaire.status);
            for row in &rows {
                let edited = if row.is_edited() { " [edited]" } else { "" };
                println!("Q{}. {}", row.question_number, row.question_text);
                println!("    answer: {}{}", row.effective_answer(), edited);
                println!(
                    "    citation: {}  confidence: {:.0}  status: {}",
                    row.citation, row.confidence, row.status
                );
                println!("    id: {}", row.id);
                println!();
            }
            pool.close().await;
        }

        Commands::Edit {
            user,
            answer_id,
            text,
        } => {
            let pool = db::connect(&config).await?;
            if store::set_edited_answer(&pool, &user, &answer_id, &text).await? {
                println!("edited {}", answer_id);
            } else {
                anyhow::bail!("No answer with id {} for this user", answer_id);
            }
            pool.close().await;
        }

        Commands::Export {
            user,
            questionnaire_id,
            format,
            output,
        } => {
            let format = ExportFormat::from_str(&format)
                .with_context(|| format!("Unknown export format: {}. Use docx or csv.", format))?;
            export::run_export(&config, &user, &questionnaire_id, format, output).await?;
        }

        Commands::Status {
            user,
            questionnaire_id,
        } => {
            let pool = db::connect(&config).await?;
            let questionnaire = store::get_questionnaire(&pool, &questionnaire_id)
                .await?
                .with_context(|| format!("No questionnaire with id {}", questionnaire_id))?;
            if questionnaire.user_id != user {
                anyhow::bail!("Questionnaire {} does not belong to this user", questionnaire_id);
            }

            let rows = store::list_answers(&pool, &questionnaire_id).await?;
            let summary = answer::coverage(&rows);
            println!("{} ({})", questionnaire.filename, questionnaire.status);
            println!("  total questions: {}", summary.total);
            println!("  answered: {}", summary.answered);
            println!("  not found: {}", summary.not_found);
            println!("  avg confidence: {:.0}", summary.avg_confidence);
            pool.close().await;
        }

        Commands::Reset { user } => {
            let manager = IndexManager::new(&config.index.root);
            if manager.delete(&user).await? {
                println!("deleted knowledge base for {}", user);
            } else {
                println!("no knowledge base found for {}", user);
            }
        }
    }

    Ok(())
}
