//! Export a questionnaire's answers as DOCX or CSV.
//!
//! Rendering is a pure function of the answer rows (the DOCX title block
//! carries a generation timestamp); files are fully rendered in memory and
//! written via a temp file + rename, so a failed export never leaves a
//! partial file behind.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docx_rs::{AlignmentType, Docx, Paragraph, Run};
use thiserror::Error;

use crate::answer::{self, NO_CONTEXT_ANSWER};
use crate::config::Config;
use crate::db;
use crate::models::{AnswerRow, QuestionnaireStatus};
use crate::store;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("DOCX rendering failed: {0}")]
    Docx(String),
    #[error("CSV rendering failed: {0}")]
    Csv(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Docx,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "docx" => Some(ExportFormat::Docx),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Render the answer set as a DOCX document.
pub fn render_docx(questionnaire_name: &str, rows: &[AnswerRow]) -> Result<Vec<u8>, ExportError> {
    let mut docx = Docx::new()
        .add_paragraph(
            Paragraph::new()
                .add_run(
                    Run::new()
                        .add_text("Completed Security Questionnaire")
                        .size(32)
                        .bold(),
                )
                .align(AlignmentType::Center),
        )
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!(
            "Generated: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        ))))
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("Questionnaire: {}", questionnaire_name))),
        )
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Summary").size(28).bold()));

    let summary = answer::coverage(rows);
    docx = docx
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("Total questions: {}", summary.total))),
        )
        .add_paragraph(Paragraph::new().add_run(
            Run::new().add_text(format!("Answered with citations: {}", summary.answered)),
        ))
        .add_paragraph(Paragraph::new().add_run(
            Run::new().add_text(format!("Not found in references: {}", summary.not_found)),
        ))
        .add_paragraph(
            Paragraph::new().add_run(Run::new().add_text("Questions & Answers").size(28).bold()),
        );

    for row in rows {
        docx = docx
            .add_paragraph(
                Paragraph::new().add_run(
                    Run::new()
                        .add_text(format!("Q{}. {}", row.question_number, row.question_text))
                        .bold(),
                ),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Answer: ").bold())
                    .add_run(Run::new().add_text(row.effective_answer())),
            )
            .add_paragraph(Paragraph::new().add_run(
                Run::new()
                    .add_text(format!(
                        "Citation: {}  |  Confidence: {}",
                        row.citation, row.confidence
                    ))
                    .size(18),
            ));
        if !row.snippet.is_empty() {
            docx = docx.add_paragraph(
                Paragraph::new().add_run(
                    Run::new()
                        .add_text(format!("Evidence: {}", row.snippet))
                        .size(16)
                        .italic(),
                ),
            );
        }
        docx = docx.add_paragraph(Paragraph::new());
    }

    let mut cursor = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut cursor)
        .map_err(|e| ExportError::Docx(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Render the answer set as CSV.
pub fn render_csv(rows: &[AnswerRow]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "question_number",
            "question",
            "answer",
            "confidence",
            "citation",
            "evidence_snippet",
        ])
        .map_err(|e| ExportError::Csv(e.to_string()))?;

    for row in rows {
        writer
            .write_record([
                row.question_number.to_string().as_str(),
                row.question_text.as_str(),
                row.effective_answer(),
                row.confidence.to_string().as_str(),
                row.citation.as_str(),
                row.snippet.as_str(),
            ])
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))
}

/// Export a questionnaire owned by `user_id` to `output` (or a default
/// filename next to the working directory).
pub async fn run_export(
    config: &Config,
    user_id: &str,
    questionnaire_id: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let pool = db::connect(config).await?;

    let questionnaire = store::get_questionnaire(&pool, questionnaire_id)
        .await?
        .with_context(|| format!("No questionnaire with id {}", questionnaire_id))?;
    if questionnaire.user_id != user_id {
        pool.close().await;
        anyhow::bail!("Questionnaire {} does not belong to this user", questionnaire_id);
    }

    let rows = store::list_answers(&pool, questionnaire_id).await?;
    if rows.is_empty() {
        pool.close().await;
        anyhow::bail!("Questionnaire {} has no answers to export", questionnaire_id);
    }

    let bytes = match format {
        ExportFormat::Docx => render_docx(&questionnaire.filename, &rows)?,
        ExportFormat::Csv => render_csv(&rows)?,
    };

    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!("questionnaire-{}.{}", questionnaire_id, format.extension()))
    });
    write_atomic(&path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    store::set_questionnaire_status(&pool, questionnaire_id, QuestionnaireStatus::Exported)
        .await?;

    let not_found = rows
        .iter()
        .filter(|r| r.effective_answer() == NO_CONTEXT_ANSWER)
        .count();
    println!("export {}", path.display());
    println!("  answers: {}", rows.len());
    println!("  not found: {}", not_found);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Write the rendered bytes through a temp file in the target directory,
/// then rename. Either the complete file appears or nothing does.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample_row() -> AnswerRow {
        AnswerRow {
            id: "a1".to_string(),
            questionnaire_id: "q1".to_string(),
            question_number: 3,
            question_text: "How is data encrypted at rest?".to_string(),
            generated_answer: "All data at rest is encrypted with AES-256.".to_string(),
            edited_answer: None,
            citation: "Security_Policy.pdf p.3".to_string(),
            confidence: 85.0,
            snippet: "We use AES-256 encryption for data at rest.".to_string(),
            status: "answered".to_string(),
        }
    }

    /// Pull the raw document XML out of a rendered DOCX.
    fn docx_document_xml(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn csv_contains_confidence_and_citation_verbatim() {
        let bytes = render_csv(&[sample_row()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("85"));
        assert!(text.contains("Security_Policy.pdf p.3"));
        assert!(text.contains("How is data encrypted at rest?"));
    }

    #[test]
    fn csv_prefers_edited_answer() {
        let mut row = sample_row();
        row.edited_answer = Some("Edited: we use AES-256-GCM.".to_string());
        let text = String::from_utf8(render_csv(&[row]).unwrap()).unwrap();
        assert!(text.contains("AES-256-GCM"));
        assert!(!text.contains("All data at rest is encrypted"));
    }

    #[test]
    fn docx_contains_confidence_and_citation_verbatim() {
        let bytes = render_docx("vendor-questionnaire.pdf", &[sample_row()]).unwrap();
        let xml = docx_document_xml(&bytes);
        assert!(xml.contains("Confidence: 85"));
        assert!(xml.contains("Security_Policy.pdf"));
        assert!(xml.contains("AES-256"));
        assert!(xml.contains("vendor-questionnaire.pdf"));
    }

    #[test]
    fn renders_are_deterministic_for_fixed_rows() {
        let rows = vec![sample_row()];
        assert_eq!(render_csv(&rows).unwrap(), render_csv(&rows).unwrap());
    }

    #[test]
    fn write_atomic_leaves_no_tmp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("out.csv");
        write_atomic(&target, b"a,b,c\n").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"a,b,c\n");
        assert!(!tmp.path().join("out.tmp").exists());
    }
}
