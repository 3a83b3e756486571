//! Core data models used throughout Sentra.
//!
//! These types represent the documents, chunks, questions, and answers that
//! flow through the parse → index → retrieve → answer → export pipeline.

use serde::{Deserialize, Serialize};

/// A span of plain text extracted from an uploaded file, with its location.
///
/// For PDFs `page` is the 1-based page number; for DOCX and plain text it is
/// the 1-based paragraph-block position.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    pub page: i64,
}

/// A parsed upload: the filename plus its ordered segments.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub filename: String,
    pub segments: Vec<Segment>,
}

/// A bounded span of document text stored with its embedding for retrieval.
///
/// Immutable once created; its lifetime is tied to the index that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Source document filename, used for citations.
    pub filename: String,
    pub page: i64,
    /// Position of this chunk within the knowledge base build, starting at 0.
    pub ordinal: i64,
    pub text: String,
}

/// A numbered question extracted from an uploaded questionnaire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub number: i64,
    pub text: String,
}

/// A chunk returned from the retriever with its similarity score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk: Chunk,
    pub score: f32,
}

/// Per-question outcome. `answered` covers both a generated answer and the
/// canned not-found reply; `failed` marks an embedding or LLM failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStatus {
    Answered,
    Failed,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Answered => "answered",
            AnswerStatus::Failed => "failed",
        }
    }
}

/// Questionnaire lifecycle state.
///
/// `uploaded → parsed → answering → reviewed → exported`, with `failed`
/// reserved for a parse-level failure (per-question failures do not fail
/// the questionnaire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionnaireStatus {
    Uploaded,
    Parsed,
    Answering,
    Reviewed,
    Exported,
    Failed,
}

impl QuestionnaireStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionnaireStatus::Uploaded => "uploaded",
            QuestionnaireStatus::Parsed => "parsed",
            QuestionnaireStatus::Answering => "answering",
            QuestionnaireStatus::Reviewed => "reviewed",
            QuestionnaireStatus::Exported => "exported",
            QuestionnaireStatus::Failed => "failed",
        }
    }
}

/// A stored questionnaire upload.
#[derive(Debug, Clone)]
pub struct QuestionnaireRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub uploaded_at: i64,
    pub status: String,
}

/// A stored answer row, as persisted and as consumed by the exporter.
///
/// `edited_answer` wins over `generated_answer` wherever the answer is
/// displayed or exported. Confidence is bounded `0..=100`.
#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub id: String,
    pub questionnaire_id: String,
    pub question_number: i64,
    pub question_text: String,
    pub generated_answer: String,
    pub edited_answer: Option<String>,
    pub citation: String,
    pub confidence: f64,
    pub snippet: String,
    pub status: String,
}

impl AnswerRow {
    /// The answer to display: the user's edit when present, otherwise the
    /// generated text.
    pub fn effective_answer(&self) -> &str {
        match &self.edited_answer {
            Some(e) if !e.is_empty() => e,
            _ => &self.generated_answer,
        }
    }

    pub fn is_edited(&self) -> bool {
        matches!(&self.edited_answer, Some(e) if !e.is_empty())
    }
}

/// Coverage summary over a questionnaire's answers.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub total: usize,
    pub answered: usize,
    pub not_found: usize,
    pub avg_confidence: f64,
}
