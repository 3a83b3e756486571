//! Multi-format document parsing (PDF, DOCX, plain text).
//!
//! Turns uploaded file bytes into ordered [`Segment`]s with page/location
//! metadata, and extracts numbered questions from questionnaire text.
//! Parsing is deterministic and never retried; a failed file is surfaced
//! to the caller and skipped.

use std::io::Read;

use regex::Regex;
use thiserror::Error;

use crate::models::{ParsedDocument, Question, Segment};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF parsing failed: {0}")]
    Pdf(String),
    #[error("DOCX parsing failed: {0}")]
    Docx(String),
    #[error("text file is not valid UTF-8")]
    Encoding,
    #[error("file contains no extractable text")]
    Empty,
}

/// Parse an uploaded file into ordered segments, dispatching on extension.
pub fn parse_document(filename: &str, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let lower = filename.to_ascii_lowercase();
    let segments = if lower.ends_with(".pdf") {
        parse_pdf(bytes)?
    } else if lower.ends_with(".docx") {
        parse_docx(bytes)?
    } else if lower.ends_with(".txt") {
        parse_txt(bytes)?
    } else {
        return Err(ParseError::Unsupported(filename.to_string()));
    };

    if segments.iter().all(|s| s.text.trim().is_empty()) {
        return Err(ParseError::Empty);
    }

    Ok(ParsedDocument {
        filename: filename.to_string(),
        segments,
    })
}

/// Concatenate a document's segments back into one text blob, in order.
pub fn assemble_text(doc: &ParsedDocument) -> String {
    doc.segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_pdf(bytes: &[u8]) -> Result<Vec<Segment>, ParseError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ParseError::Pdf(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Segment {
            text: text.trim().to_string(),
            page: i as i64 + 1,
        })
        .collect())
}

fn parse_txt(bytes: &[u8]) -> Result<Vec<Segment>, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;

    Ok(text
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .enumerate()
        .map(|(i, block)| Segment {
            text: block.trim().to_string(),
            page: i as i64 + 1,
        })
        .collect())
}

/// Extract DOCX paragraphs as segments by streaming `word/document.xml`
/// and collecting `w:t` runs, flushed on each `w:p` close.
fn parse_docx(bytes: &[u8]) -> Result<Vec<Segment>, ParseError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ParseError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ParseError::Docx("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ParseError::Docx(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ParseError::Docx(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    let mut segments = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut paragraph = String::new();
    let mut page: i64 = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        paragraph.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !paragraph.trim().is_empty() {
                    page += 1;
                    segments.push(Segment {
                        text: paragraph.trim().to_string(),
                        page,
                    });
                    paragraph.clear();
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ParseError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !paragraph.trim().is_empty() {
        segments.push(Segment {
            text: paragraph.trim().to_string(),
            page: page + 1,
        });
    }

    Ok(segments)
}

/// Extract numbered questions from questionnaire text.
///
/// Recognizes `1.` / `1)` line starts and `Question 1:` headers; the first
/// pattern that matches anything wins. Duplicated numbers keep the first
/// occurrence and results are ordered by question number.
pub fn extract_questions(text: &str) -> Vec<Question> {
    let patterns = [
        r"(?ms)^\s*(\d+)[.)]\s+(.+?)(?=^\s*\d+[.)]\s|\z)",
        r"(?ms)^\s*Question\s+(\d+)[:.]?\s+(.+?)(?=^\s*Question\s+\d+|\z)",
    ];

    let mut questions: Vec<Question> = Vec::new();
    for pattern in patterns {
        let re = Regex::new(pattern).expect("question pattern is valid");
        for caps in re.captures_iter(text) {
            let number: i64 = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let body = caps[2].split_whitespace().collect::<Vec<_>>().join(" ");
            if !body.is_empty() {
                questions.push(Question { number, text: body });
            }
        }
        if !questions.is_empty() {
            break;
        }
    }

    questions.sort_by_key(|q| q.number);
    questions.dedup_by_key(|q| q.number);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let err = parse_document("notes.xlsx", b"whatever").unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = parse_document("broken.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ParseError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = parse_document("broken.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, ParseError::Docx(_)));
    }

    #[test]
    fn non_utf8_text_returns_error() {
        let err = parse_document("latin1.txt", &[0xff, 0xfe, 0x41]).unwrap_err();
        assert!(matches!(err, ParseError::Encoding));
    }

    #[test]
    fn blank_file_returns_empty_error() {
        let err = parse_document("blank.txt", b"\n\n   \n").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn txt_segments_reassemble_to_original_content() {
        let body = "First block of policy text.\n\nSecond block.\n\nThird block.";
        let doc = parse_document("policy.txt", body.as_bytes()).unwrap();
        assert_eq!(doc.segments.len(), 3);
        assert_eq!(doc.segments[0].page, 1);
        assert_eq!(doc.segments[2].page, 3);

        let whitespace_normalized = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(
            whitespace_normalized(&assemble_text(&doc)),
            whitespace_normalized(body)
        );
    }

    #[test]
    fn extracts_dot_numbered_questions() {
        let text = "1. How is data encrypted at rest?\n2. Do you rotate keys?\n";
        let questions = extract_questions(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].number, 1);
        assert_eq!(questions[0].text, "How is data encrypted at rest?");
        assert_eq!(questions[1].number, 2);
    }

    #[test]
    fn extracts_paren_numbered_questions_with_wrapped_lines() {
        let text = "1) Describe your incident response\nprocess in detail.\n2) Who is the DPO?";
        let questions = extract_questions(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(
            questions[0].text,
            "Describe your incident response process in detail."
        );
    }

    #[test]
    fn extracts_question_header_format() {
        let text = "Question 1: What is your SLA?\nSome filler.\nQuestion 2: Where is data hosted?";
        let questions = extract_questions(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].text, "Where is data hosted?");
    }

    #[test]
    fn duplicate_numbers_keep_first_occurrence() {
        let text = "1. Original question?\n2. Second question?\n1. Duplicate question?";
        let questions = extract_questions(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "Original question?");
    }

    #[test]
    fn no_questions_yields_empty_list() {
        assert!(extract_questions("Just prose, no numbering at all.").is_empty());
    }
}
