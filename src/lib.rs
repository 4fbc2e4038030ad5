//! # Support Harness
//!
//! Local-first support answering. Questions are answered from a directory of
//! Markdown documentation when it has something relevant; otherwise they are
//! handed to an incident diagnoser fed by an incident-log webhook.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Markdown  │──▶│ Chunk+TF-IDF │──▶│  JSON index  │
//! │   docs    │   │   (index)    │   │ (mtime-fresh)│
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           ▼
//!                 ┌──────────┐       ┌──────────────┐      ┌──────────┐
//!  query ───────▶ │ workflow │──────▶│    ranker    │      │ sessions │
//!                 │          │◀──────│   (rayon)    │      │ (SQLite) │
//!                 └────┬─────┘       └──────────────┘      └────▲─────┘
//!                      │ hits: Answerer / none: IncidentSource  │
//!                      └────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! support index                       # build or refresh the index
//! support search "refund policy"      # ranked passages
//! support resolve "invoice sync fails"
//! support serve                       # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping passage windows |
//! | [`corpus`] | Markdown discovery and decoding |
//! | [`vectorizer`] | Sparse TF-IDF model |
//! | [`index`] | Index build, persistence, staleness |
//! | [`search`] | Passage ranking |
//! | [`reply`] | Lenient collaborator reply parsing |
//! | [`llm`] | Chat completions client |
//! | [`agents`] | Model-backed answerer and diagnoser |
//! | [`traits`] | Collaborator seams |
//! | [`session`] | Session cache and stores |
//! | [`workflow`] | Resolution workflow |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agents;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod index;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod reply;
pub mod search;
pub mod server;
pub mod session;
pub mod stats;
pub mod traits;
pub mod vectorizer;
pub mod workflow;
