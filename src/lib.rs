//! # Shariah Audit
//!
//! Retrieval-augmented compliance auditing for Islamic finance products.
//!
//! A folder of reference PDFs (standards, fatwas, guidelines) is chunked,
//! embedded and stored in a local SQLite index. At request time the product
//! text is used to retrieve the closest reference passages, which are sent
//! together with the text to a completion model; its answer is parsed into
//! a verdict, a list of violations and an analysis.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │ PDF dir  │──▶│ Chunk+Embed │──▶│  SQLite  │
//! │ (loader) │   │  (ingest)   │   │ (store)  │
//! └──────────┘   └─────────────┘   └────┬─────┘
//!                                       │ retrieve
//!                                       ▼
//!               ┌────────┐   ┌─────┐   ┌────────┐
//!  text ──────▶ │ prompt │──▶│ llm │──▶│ parse  │──▶ AuditResult
//!               └────────┘   └─────┘   └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF folder loading |
//! | [`chunk`] | Recursive character chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Vector store over SQLite |
//! | [`ingest`] | Index rebuild pipeline |
//! | [`retrieve`] | Nearest-chunk retrieval |
//! | [`prompt`] | Prompt templates |
//! | [`llm`] | Completion client and retry policy |
//! | [`parse`] | Lenient response parsing and classification |
//! | [`audit`] | Request-time audit pipeline |
//! | [`server`] | HTTP API |
//! | [`stats`] | Index statistics |

pub mod audit;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod parse;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod stats;
pub mod store;
