//! Answer generation over retrieved context.
//!
//! Builds a bounded prompt from the question and the retrieved chunks, makes
//! one LLM call per question, and derives a confidence score through the
//! configured scoring source. An LLM failure degrades that single answer
//! (marked unavailable, confidence 0) instead of aborting the batch.

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::index::{IndexManager, VectorIndex};
use crate::llm::LlmProvider;
use crate::models::{
    AnswerRow, AnswerStatus, CoverageSummary, Question, QuestionnaireStatus, Retrieved,
};
use crate::parse;
use crate::store;

/// Instructions prepended to every prompt.
pub const SYSTEM_PROMPT: &str = "You are a compliance and security questionnaire assistant. \
Answer the question using ONLY the provided context from reference documents.\n\
Guidelines:\n\
1. Be concise and factual.\n\
2. If the context does not contain enough information, respond with exactly: Not found in references.\n\
3. Do not make up information or infer beyond what is in the context.\n\
4. Format your answer as a complete, professional response suitable for a security questionnaire.";

/// Canned answer when retrieval finds nothing relevant.
pub const NO_CONTEXT_ANSWER: &str = "Not found in references.";

/// Canned answer when the LLM call fails or times out.
pub const UNAVAILABLE_ANSWER: &str =
    "Answer unavailable: the language model could not be reached.";

const SNIPPET_CHARS: usize = 300;

/// The generated (not yet persisted) outcome for one question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub answer: String,
    pub confidence: f64,
    pub citation: String,
    pub snippet: String,
    pub status: AnswerStatus,
}

impl AnswerOutcome {
    fn degraded(answer: &str, status: AnswerStatus) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 0.0,
            citation: "N/A".to_string(),
            snippet: String::new(),
            status,
        }
    }
}

/// Build the prompt: instructions, retrieved context, question.
///
/// Context blocks are rendered as `[filename p.N]` headers followed by the
/// chunk text, in similarity order. The combined context is capped at
/// `context_chars`; the block that crosses the budget is truncated, lower
/// ranked blocks are dropped, and a block whose header would leave no room
/// for text is dropped whole rather than emitted body-less.
pub fn build_prompt(question: &str, retrieved: &[Retrieved], context_chars: usize) -> String {
    let mut context = String::new();
    for r in retrieved {
        let header = format!("[{} p.{}]\n", r.chunk.filename, r.chunk.page);
        let separator = if context.is_empty() { 0 } else { 2 };
        let remaining = context_chars
            .saturating_sub(context.chars().count() + separator + header.chars().count());
        if remaining == 0 {
            break;
        }

        if separator > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&header);

        if r.chunk.text.chars().count() > remaining {
            context.extend(r.chunk.text.chars().take(remaining));
            break;
        }
        context.push_str(&r.chunk.text);
    }

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        SYSTEM_PROMPT, context, question
    )
}

/// Derive a confidence score in `0..=100` and the cleaned answer text.
///
/// `retrieval` maps the mean similarity of the retrieved chunks onto the
/// scale; `model` takes a trailing `Confidence: N` line out of the model
/// output, falling back to `retrieval` when no such line exists.
pub fn score_confidence(
    source: &str,
    retrieved: &[Retrieved],
    answer: &str,
) -> (f64, String) {
    let retrieval_score = || {
        if retrieved.is_empty() {
            return 0.0;
        }
        let mean =
            retrieved.iter().map(|r| r.score as f64).sum::<f64>() / retrieved.len() as f64;
        (mean * 100.0).round().clamp(0.0, 100.0)
    };

    if source == "model" {
        if let Some((cleaned, reported)) = split_reported_confidence(answer) {
            return (reported.clamp(0.0, 100.0), cleaned);
        }
    }

    (retrieval_score(), answer.to_string())
}

/// Split a trailing `Confidence: N` line off the answer, if present.
fn split_reported_confidence(answer: &str) -> Option<(String, f64)> {
    let last = answer.lines().last()?.trim();
    let value = last.strip_prefix("Confidence:")?.trim();
    let reported: f64 = value.trim_end_matches('%').trim().parse().ok()?;
    let cleaned = answer
        .lines()
        .take(answer.lines().count() - 1)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    Some((cleaned, reported))
}

fn citation_for(retrieved: &[Retrieved]) -> String {
    let mut seen = Vec::new();
    for r in retrieved {
        let cite = format!("{} p.{}", r.chunk.filename, r.chunk.page);
        if !seen.contains(&cite) {
            seen.push(cite);
        }
    }
    seen.join(", ")
}

fn snippet_for(retrieved: &[Retrieved]) -> String {
    let Some(first) = retrieved.first() else {
        return String::new();
    };
    let text = &first.chunk.text;
    if text.chars().count() <= SNIPPET_CHARS {
        text.clone()
    } else {
        let truncated: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    }
}

/// Answer a single question against one user's index.
///
/// Every failure mode degrades this one answer rather than propagating:
/// empty retrieval yields the canned not-found answer, an embedding or LLM
/// failure yields an unavailable answer with `failed` status.
pub async fn answer_question(
    config: &Config,
    embedder: &dyn Embedder,
    llm: &dyn LlmProvider,
    index: &VectorIndex,
    question: &str,
) -> AnswerOutcome {
    let query_vec = match embedder.embed_one(question).await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Warning: query embedding failed: {}", e);
            return AnswerOutcome::degraded(UNAVAILABLE_ANSWER, AnswerStatus::Failed);
        }
    };

    let retrieved = index.search(
        &query_vec,
        config.retrieval.top_k,
        config.retrieval.min_score,
    );

    if retrieved.is_empty() {
        return AnswerOutcome::degraded(NO_CONTEXT_ANSWER, AnswerStatus::Answered);
    }

    let prompt = build_prompt(question, &retrieved, config.llm.context_chars);

    let raw = match llm.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Warning: generation failed: {}", e);
            return AnswerOutcome {
                citation: citation_for(&retrieved),
                snippet: snippet_for(&retrieved),
                ..AnswerOutcome::degraded(UNAVAILABLE_ANSWER, AnswerStatus::Failed)
            };
        }
    };

    let (confidence, answer) = score_confidence(&config.confidence.source, &retrieved, &raw);

    AnswerOutcome {
        answer,
        confidence,
        citation: citation_for(&retrieved),
        snippet: snippet_for(&retrieved),
        status: AnswerStatus::Answered,
    }
}

/// Coverage summary over a set of stored answers.
pub fn coverage(rows: &[AnswerRow]) -> CoverageSummary {
    let total = rows.len();
    let answered = rows
        .iter()
        .filter(|r| r.status == AnswerStatus::Answered.as_str() && r.generated_answer != NO_CONTEXT_ANSWER)
        .count();
    let confidences: Vec<f64> = rows
        .iter()
        .filter(|r| r.status == AnswerStatus::Answered.as_str() && r.generated_answer != NO_CONTEXT_ANSWER)
        .map(|r| r.confidence)
        .collect();
    let avg_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    CoverageSummary {
        total,
        answered,
        not_found: total - answered,
        avg_confidence,
    }
}

/// Answer every question in an uploaded questionnaire file and persist the
/// results. Returns the new questionnaire id.
pub async fn run_answer(
    config: &Config,
    embedder: &dyn Embedder,
    llm: &dyn LlmProvider,
    user_id: &str,
    questionnaire_path: &std::path::Path,
) -> Result<String> {
    let manager = IndexManager::new(&config.index.root);
    let index = manager
        .load(user_id)?
        .context("No knowledge base found for this user. Run `sentra ingest` first.")?;

    let pool = db::connect(config).await?;

    let filename = questionnaire_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| questionnaire_path.display().to_string());
    let bytes = std::fs::read(questionnaire_path)
        .with_context(|| format!("Failed to read {}", questionnaire_path.display()))?;

    let questionnaire_id = store::insert_questionnaire(&pool, user_id, &filename).await?;

    let doc = match parse::parse_document(&filename, &bytes) {
        Ok(doc) => doc,
        Err(e) => {
            store::set_questionnaire_status(&pool, &questionnaire_id, QuestionnaireStatus::Failed)
                .await?;
            pool.close().await;
            anyhow::bail!("Failed to parse questionnaire {}: {}", filename, e);
        }
    };

    let questions = parse::extract_questions(&parse::assemble_text(&doc));
    if questions.is_empty() {
        store::set_questionnaire_status(&pool, &questionnaire_id, QuestionnaireStatus::Failed)
            .await?;
        pool.close().await;
        anyhow::bail!("No numbered questions found in {}", filename);
    }
    store::set_questionnaire_status(&pool, &questionnaire_id, QuestionnaireStatus::Parsed).await?;

    println!("answer {}", filename);
    println!("  questions found: {}", questions.len());

    store::set_questionnaire_status(&pool, &questionnaire_id, QuestionnaireStatus::Answering)
        .await?;

    // Questions are answered sequentially; the dominant latency is the LLM
    // call, and one failed question must not abort the rest.
    let mut rows = Vec::with_capacity(questions.len());
    for (i, question) in questions.iter().enumerate() {
        let outcome = answer_question(config, embedder, llm, &index, &question.text).await;
        println!(
            "  [{}/{}] Q{} {}",
            i + 1,
            questions.len(),
            question.number,
            outcome.status.as_str()
        );
        rows.push(row_from_outcome(&questionnaire_id, question, outcome));
    }

    store::replace_answers(&pool, &questionnaire_id, &rows).await?;
    store::set_questionnaire_status(&pool, &questionnaire_id, QuestionnaireStatus::Reviewed)
        .await?;

    let summary = coverage(&rows);
    println!("  answered: {}", summary.answered);
    println!("  not found: {}", summary.not_found);
    println!("  avg confidence: {:.0}", summary.avg_confidence);
    println!("  questionnaire id: {}", questionnaire_id);
    println!("ok");

    pool.close().await;
    Ok(questionnaire_id)
}

fn row_from_outcome(
    questionnaire_id: &str,
    question: &Question,
    outcome: AnswerOutcome,
) -> AnswerRow {
    AnswerRow {
        id: Uuid::new_v4().to_string(),
        questionnaire_id: questionnaire_id.to_string(),
        question_number: question.number,
        question_text: question.text.clone(),
        generated_answer: outcome.answer,
        edited_answer: None,
        citation: outcome.citation,
        confidence: outcome.confidence,
        snippet: outcome.snippet,
        status: outcome.status.as_str().to_string(),
    }
}

/// Answer a one-off question without persisting anything.
pub async fn run_ask(
    config: &Config,
    embedder: &dyn Embedder,
    llm: &dyn LlmProvider,
    user_id: &str,
    question: &str,
) -> Result<()> {
    let manager = IndexManager::new(&config.index.root);
    let index = manager
        .load(user_id)?
        .context("No knowledge base found for this user. Run `sentra ingest` first.")?;

    let outcome = answer_question(config, embedder, llm, &index, question).await;

    println!("{}", outcome.answer);
    println!();
    println!("  citation: {}", if outcome.citation.is_empty() { "N/A" } else { &outcome.citation });
    println!("  confidence: {:.0}", outcome.confidence);
    if !outcome.snippet.is_empty() {
        println!("  evidence: \"{}\"", outcome.snippet.replace('\n', " "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn retrieved(filename: &str, page: i64, text: &str, score: f32) -> Retrieved {
        Retrieved {
            chunk: Chunk {
                id: "c".to_string(),
                filename: filename.to_string(),
                page,
                ordinal: 0,
                text: text.to_string(),
            },
            score,
        }
    }

    #[test]
    fn prompt_contains_instructions_context_and_question() {
        let hits = vec![retrieved("policy.txt", 1, "We use AES-256 encryption.", 0.9)];
        let prompt = build_prompt("How is data encrypted?", &hits, 1000);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("[policy.txt p.1]"));
        assert!(prompt.contains("AES-256"));
        assert!(prompt.ends_with("Question: How is data encrypted?\n\nAnswer:"));
    }

    #[test]
    fn prompt_truncates_context_to_budget() {
        let long = "x".repeat(500);
        let hits = vec![
            retrieved("a.txt", 1, &long, 0.9),
            retrieved("b.txt", 1, &long, 0.8),
        ];
        let prompt = build_prompt("q", &hits, 200);
        // First block is truncated at the budget; the second never appears.
        assert!(prompt.contains("[a.txt p.1]"));
        assert!(!prompt.contains("b.txt"));
        let context_len = prompt.matches('x').count();
        assert!(context_len <= 200);
    }

    #[test]
    fn exhausted_budget_drops_next_header_entirely() {
        // Header "[a.txt p.1]\n" is 12 chars; 188 chars of text land the
        // first block exactly on the 200-char budget.
        let filler = "x".repeat(188);
        let hits = vec![
            retrieved("a.txt", 1, &filler, 0.9),
            retrieved("b.txt", 1, "more text", 0.8),
        ];
        let prompt = build_prompt("q", &hits, 200);
        assert!(prompt.contains("[a.txt p.1]"));
        assert!(!prompt.contains("[b.txt"));
        assert!(prompt.contains(&filler));
    }

    #[test]
    fn prompt_keeps_highest_similarity_first() {
        let hits = vec![
            retrieved("best.txt", 2, "best chunk", 0.95),
            retrieved("worse.txt", 7, "worse chunk", 0.5),
        ];
        let prompt = build_prompt("q", &hits, 1000);
        let best = prompt.find("best chunk").unwrap();
        let worse = prompt.find("worse chunk").unwrap();
        assert!(best < worse);
    }

    #[test]
    fn retrieval_confidence_is_mean_similarity_scaled() {
        let hits = vec![
            retrieved("a.txt", 1, "", 0.9),
            retrieved("a.txt", 2, "", 0.7),
        ];
        let (confidence, answer) = score_confidence("retrieval", &hits, "Yes.");
        assert_eq!(confidence, 80.0);
        assert_eq!(answer, "Yes.");
    }

    #[test]
    fn retrieval_confidence_empty_is_zero() {
        let (confidence, _) = score_confidence("retrieval", &[], "Yes.");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn model_confidence_parses_and_strips_trailing_line() {
        let hits = vec![retrieved("a.txt", 1, "", 0.4)];
        let (confidence, answer) =
            score_confidence("model", &hits, "We encrypt at rest.\nConfidence: 85");
        assert_eq!(confidence, 85.0);
        assert_eq!(answer, "We encrypt at rest.");
    }

    #[test]
    fn model_confidence_clamps_out_of_range_values() {
        let hits = vec![retrieved("a.txt", 1, "", 0.4)];
        let (confidence, _) = score_confidence("model", &hits, "Sure.\nConfidence: 250");
        assert_eq!(confidence, 100.0);
    }

    #[test]
    fn model_confidence_falls_back_to_retrieval() {
        let hits = vec![retrieved("a.txt", 1, "", 0.6)];
        let (confidence, answer) = score_confidence("model", &hits, "No trailing line here.");
        assert_eq!(confidence, 60.0);
        assert_eq!(answer, "No trailing line here.");
    }

    #[test]
    fn citation_deduplicates_and_keeps_similarity_order() {
        let hits = vec![
            retrieved("Security_Policy.pdf", 3, "", 0.9),
            retrieved("handbook.docx", 1, "", 0.8),
            retrieved("Security_Policy.pdf", 3, "", 0.7),
        ];
        assert_eq!(
            citation_for(&hits),
            "Security_Policy.pdf p.3, handbook.docx p.1"
        );
    }

    #[test]
    fn snippet_truncates_long_chunks() {
        let hits = vec![retrieved("a.txt", 1, &"y".repeat(400), 0.9)];
        let snippet = snippet_for(&hits);
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 303);
    }

    #[test]
    fn coverage_counts_not_found_and_failed() {
        let row = |answer: &str, status: AnswerStatus, confidence: f64| AnswerRow {
            id: "a".into(),
            questionnaire_id: "q".into(),
            question_number: 1,
            question_text: "?".into(),
            generated_answer: answer.into(),
            edited_answer: None,
            citation: String::new(),
            confidence,
            snippet: String::new(),
            status: status.as_str().into(),
        };
        let rows = vec![
            row("Yes, via AES-256.", AnswerStatus::Answered, 90.0),
            row(NO_CONTEXT_ANSWER, AnswerStatus::Answered, 0.0),
            row(UNAVAILABLE_ANSWER, AnswerStatus::Failed, 0.0),
            row("Daily backups.", AnswerStatus::Answered, 70.0),
        ];
        let summary = coverage(&rows);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.answered, 2);
        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.avg_confidence, 80.0);
    }
}
