//! # groundwork
//!
//! Retrieval-augmented question answering over a small curated knowledge base.
//!
//! groundwork chunks documents (scraped pages, Markdown folders, inline
//! catalog sections), embeds the chunks into a persistent SQLite vector
//! index, and answers questions by retrieving the most similar chunks and
//! asking a generative model to answer from them alone, with sources and a
//! confidence score.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Sources   │──▶│ Chunk+Embed  │──▶│ SQLite index │
//! │ JSON/Dir/Cat│   │   (build)    │   │  (vectors)   │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ retrieve
//!                                      ┌──────▼───────┐
//!                                      │ Answer (LLM) │
//!                                      └──────┬───────┘
//!                                  ┌──────────┴──────────┐
//!                                  ▼                     ▼
//!                             ┌──────────┐          ┌──────────┐
//!                             │   CLI    │          │   HTTP   │
//!                             │   (gw)   │          │  (axum)  │
//!                             └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gw init                           # create database
//! gw build                          # chunk, embed, and index all sources
//! gw search "tuition fees"          # inspect retrieval
//! gw ask "What are the fees for B.Tech?"
//! gw serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed pipeline errors |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sentence-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Generation provider abstraction |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`retrieve`] | Query embedding and similarity search |
//! | [`answer`] | Grounded prompt and answer composition |
//! | [`ingest`] | Index build pipeline |
//! | [`sources`] | Document loaders |
//! | [`engine`] | The assembled pipeline |
//! | [`search`] | `gw search` and `gw ask` output |
//! | [`stats`] | `gw stats` output |
//! | [`server`] | HTTP server |
//! | [`http`] | JSON-over-HTTP calls with retry and backoff |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod http;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod search;
pub mod server;
pub mod sources;
pub mod stats;
