//! # Podsage CLI (`sage`)
//!
//! The `sage` binary is the primary interface for Podsage. It provides
//! commands for database initialization, transcript ingestion, embedding
//! management, similarity search, episode browsing, and starting the MCP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! sage --config ./podsage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sage config-init` | Write a starter `podsage.toml` |
//! | `sage init` | Create the SQLite database and run schema migrations |
//! | `sage ingest` | Parse, segment, and embed the transcript corpus |
//! | `sage embed pending` | Backfill missing embeddings |
//! | `sage embed rebuild` | Delete and regenerate all embeddings |
//! | `sage search "<query>"` | Semantic search over transcript chunks |
//! | `sage episodes` | List indexed episodes |
//! | `sage stats` | Corpus totals and embedding coverage |
//! | `sage serve` | Start the MCP-compatible HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! sage init --config ./podsage.toml
//!
//! # Ingest every <slug>/transcript.md under the configured root
//! sage ingest --config ./podsage.toml
//!
//! # Preview what ingestion would do
//! sage ingest --dry-run
//!
//! # Semantic search with a custom floor
//! sage search "how to price an enterprise product" --threshold 0.75
//!
//! # Most-viewed episodes for one guest
//! sage episodes --guest "Jane Doe" --sort views
//!
//! # Start the MCP server for agent integration
//! sage serve --config ./podsage.toml
//! ```

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use podsage::{config, embed_cmd, episodes, ingest, migrate, search, server, stats};

/// Podsage CLI — a podcast-transcript knowledge base with semantic
/// retrieval and advisory synthesis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Run `sage config-init` to write a starter file.
#[derive(Parser)]
#[command(
    name = "sage",
    about = "Podsage — a podcast-transcript knowledge base with semantic retrieval and advisory synthesis",
    version,
    long_about = "Podsage ingests interview transcripts into speaker-aware chunks, embeds them, \
    and answers questions over the corpus: semantic search, grouped advice, expert comparison, \
    playbook generation, and metrics extraction, via a CLI and MCP-compatible HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./podsage.toml`. All transcript, database, embedding,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./podsage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    ///
    /// Creates the file named by `--config` (default `./podsage.toml`)
    /// with documented defaults. Refuses to overwrite an existing file.
    ConfigInit,

    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (guests,
    /// episodes, episode_guests, transcript_chunks). This command is
    /// idempotent; running it multiple times is safe.
    Init,

    /// Ingest the transcript corpus.
    ///
    /// Discovers every `<episode-slug>/transcript.md` under the configured
    /// root, parses front matter and speaker turns, segments turns into
    /// chunks, embeds changed chunks, and upserts everything into SQLite.
    /// Re-running over an unchanged corpus is a no-op.
    Ingest {
        /// Show transcript and chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of transcripts to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage embedding vectors.
    ///
    /// Subcommands for backfilling and rebuilding embeddings. Requires an
    /// embedding provider (Gemini or OpenAI) to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Semantic search over transcript chunks.
    ///
    /// Embeds the query and prints chunks ranked by cosine similarity.
    /// Only hits strictly above the threshold are returned.
    Search {
        /// The search query string.
        query: String,

        /// Minimum cosine similarity in [0.0, 1.0]. Defaults to the
        /// `[retrieval] threshold` config value.
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum number of results. Defaults to `[retrieval] limit`.
        #[arg(long)]
        limit: Option<i64>,

        /// Only return chunks from episodes featuring this guest
        /// (case-insensitive substring match).
        #[arg(long)]
        guest: Option<String>,
    },

    /// List indexed episodes.
    Episodes {
        /// Filter to episodes featuring this guest (case-insensitive
        /// substring match).
        #[arg(long)]
        guest: Option<String>,

        /// Filter to episodes whose title or description contains this term.
        #[arg(long)]
        search: Option<String>,

        /// Sort order: views, duration, or recent.
        #[arg(long, default_value = "views")]
        sort: String,

        /// Maximum number of episodes to list.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Show corpus statistics and embedding coverage.
    Stats,

    /// Start the MCP-compatible HTTP server.
    ///
    /// Exposes the query tools via a JSON API (`/tools/*`) and an MCP
    /// endpoint (`/mcp`) for integration with Claude, Cursor, and other
    /// MCP-compatible AI tools.
    Serve,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing embeddings.
    ///
    /// Finds chunks whose embedding column is null (ingestion ran with the
    /// provider disabled, or a batch failed) and fills them in.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models. Clears every stored vector
    /// and re-embeds every chunk.
    Rebuild {
        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config-init runs before config loading; the file may not exist yet.
    if let Commands::ConfigInit = cli.command {
        if cli.config.exists() {
            bail!(
                "Refusing to overwrite existing config: {}",
                cli.config.display()
            );
        }
        std::fs::write(&cli.config, config::example_toml())?;
        println!("Wrote starter config to {}", cli.config.display());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::ConfigInit => unreachable!(),
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dry_run, limit } => {
            ingest::run_ingest(&cfg, dry_run, limit).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Search {
            query,
            threshold,
            limit,
            guest,
        } => {
            search::run_search(&cfg, &query, threshold, limit, guest).await?;
        }
        Commands::Episodes {
            guest,
            search,
            sort,
            limit,
        } => {
            episodes::run_episodes(&cfg, guest, search, sort, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
