//! # Podsage
//!
//! A podcast-transcript knowledge base with semantic retrieval and
//! advisory synthesis.
//!
//! Podsage ingests interview transcripts (one `transcript.md` per
//! episode), segments them into speaker-aware chunks, embeds the chunks,
//! and stores everything in SQLite. On top of that corpus it serves six
//! query tools (search, advice, expert comparison, playbooks, metrics,
//! episode listing) over a CLI and an MCP-compatible HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ Transcripts  │──▶│   Pipeline    │──▶│  SQLite   │
//! │ <slug>/*.md  │   │ Segment+Embed │   │ episodes/ │
//! └──────────────┘   └───────────────┘   │ chunks    │
//!                                        └────┬──────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                     ┌──────────┐      ┌──────────┐
//!                     │   CLI    │      │   HTTP   │
//!                     │  (sage)  │      │  (MCP)   │
//!                     └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sage config-init              # write a starter podsage.toml
//! sage init                     # create database
//! sage ingest                   # parse, segment, embed transcripts
//! sage embed pending            # backfill missing embeddings
//! sage search "pricing strategy"
//! sage serve                    # start HTTP + MCP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`transcripts`] | Corpus discovery and transcript parsing |
//! | [`segment`] | Speaker-turn segmentation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Idempotent SQLite persistence |
//! | [`search`] | Cosine similarity search |
//! | [`wisdom`] | Query orchestration and synthesis |
//! | [`tools`] | Tool registry for the serving surface |
//! | [`server`] | HTTP tool server |
//! | [`mcp`] | MCP protocol bridge |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod episodes;
pub mod error;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod search;
pub mod segment;
pub mod server;
pub mod stats;
pub mod store;
pub mod synthesis;
pub mod tools;
pub mod transcripts;
pub mod wisdom;
