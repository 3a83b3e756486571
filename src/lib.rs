//! # Sentra
//!
//! Security questionnaire answering with retrieval-augmented generation.
//!
//! Sentra builds a per-user semantic knowledge base from reference documents
//! (PDF, TXT, DOCX), extracts numbered questions from an uploaded
//! questionnaire, answers each question against the knowledge base with an
//! LLM, and exports the reviewed answers to DOCX or CSV.
//!
//! ## Pipeline
//!
//! ```text
//! reference files ──▶ parse ──▶ chunk ──▶ embed ──▶ per-user index
//!                                                       │
//! questionnaire ──▶ parse ──▶ questions ──▶ retrieve ◀──┘
//!                                              │
//!                                         LLM answer ──▶ SQLite ──▶ export
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parse`] | PDF/TXT/DOCX parsing and question extraction |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`embedding`] | Embedding provider abstraction (Ollama, OpenAI) |
//! | [`index`] | Per-user vector index with atomic rebuild |
//! | [`llm`] | LLM completion providers (Ollama, Groq) |
//! | [`answer`] | Prompting, confidence scoring, batch answering |
//! | [`ingest`] | Knowledge base build orchestration |
//! | [`export`] | DOCX/CSV export |
//! | [`store`] | Questionnaire/answer persistence |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod parse;
pub mod store;
