//! Knowledge base build: parse → chunk → embed → atomic index swap.
//!
//! Rebuilding is all-or-nothing. A file that fails to parse is reported and
//! skipped; an embedding failure aborts the whole build and leaves the
//! user's previous index untouched. The new index only becomes visible via
//! the [`IndexManager`]'s rename swap once it is complete.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::chunk::chunk_segments;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{IndexManager, VectorIndex};
use crate::models::Chunk;
use crate::parse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks: usize,
}

pub async fn run_ingest(
    config: &Config,
    embedder: &dyn Embedder,
    user_id: &str,
    files: &[PathBuf],
) -> Result<IngestReport> {
    if files.is_empty() {
        anyhow::bail!("No files given. Pass one or more PDF, TXT, or DOCX files.");
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut next_ordinal: i64 = 0;
    let mut files_indexed = 0usize;
    let mut files_skipped = 0usize;

    for path in files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                files_skipped += 1;
                continue;
            }
        };

        match parse::parse_document(&filename, &bytes) {
            Ok(doc) => {
                let before = chunks.len();
                next_ordinal = chunk_segments(
                    &doc.filename,
                    &doc.segments,
                    config.chunking.chunk_words,
                    config.chunking.overlap_words,
                    next_ordinal,
                    &mut chunks,
                );
                println!("  processed {}: {} chunks", filename, chunks.len() - before);
                files_indexed += 1;
            }
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", filename, e);
                files_skipped += 1;
            }
        }
    }

    if chunks.is_empty() {
        anyhow::bail!("No text could be extracted from the given files.");
    }

    let mut index = VectorIndex::new(embedder.model_name(), embedder.dims());

    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .context("Embedding failed; the existing knowledge base was left unchanged")?;
        for (chunk, vector) in batch.iter().zip(vectors.into_iter()) {
            index.push(chunk.clone(), vector);
        }
    }

    let manager = IndexManager::new(&config.index.root);
    let chunk_count = index.len();
    manager
        .replace(user_id, &index)
        .await
        .context("Failed to write the knowledge base index")?;

    println!("ingest");
    println!("  files indexed: {}", files_indexed);
    println!("  files skipped: {}", files_skipped);
    println!("  chunks embedded: {}", chunk_count);
    println!("ok");

    Ok(IngestReport {
        files_indexed,
        files_skipped,
        chunks: chunk_count,
    })
}
