//! `LocalDocument` (lazy-loaded text/metadata for a document id) and its
//! `DocumentResult` subtype: the query-time section renderer that stitches
//! a document's top-scoring chunks back into token-budgeted passages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::collaborators::Tokenizer;
use crate::error::{Result, VectraError};
use crate::metadata::Metadata;
use crate::vector_index::QueryResult as ChunkQueryResult;

/// A rendered, token-budgeted passage of a document.
#[derive(Debug, Clone)]
pub struct DocumentTextSection {
    pub text: String,
    pub token_count: usize,
    pub score: f32,
}

/// Lazily loads a document's full text and optional user metadata from the
/// `<id>.txt` / `<id>.json` sidecars next to the index.
pub struct LocalDocument {
    folder_path: PathBuf,
    id: String,
    uri: String,
    tokenizer: Arc<dyn Tokenizer>,
    text: Mutex<Option<String>>,
    metadata: Mutex<Option<Metadata>>,
}

impl LocalDocument {
    pub fn new(folder_path: PathBuf, id: String, uri: String, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            folder_path,
            id,
            uri,
            tokenizer,
            text: Mutex::new(None),
            metadata: Mutex::new(None),
        }
    }

    pub fn folder_path(&self) -> &Path {
        &self.folder_path
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn text_path(&self) -> PathBuf {
        self.folder_path.join(format!("{}.txt", self.id))
    }

    fn metadata_path(&self) -> PathBuf {
        self.folder_path.join(format!("{}.json", self.id))
    }

    pub async fn has_metadata(&self) -> bool {
        tokio::fs::metadata(self.metadata_path()).await.is_ok()
    }

    pub async fn load_metadata(&self) -> Result<Metadata> {
        let mut cached = self.metadata.lock().await;
        if let Some(meta) = cached.as_ref() {
            return Ok(meta.clone());
        }
        let text = tokio::fs::read_to_string(self.metadata_path()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VectraError::NotFound(format!("metadata file for document '{}' not found", self.uri))
            } else {
                VectraError::Io(e)
            }
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            VectraError::DataCorruption(format!("error parsing metadata for document '{}': {e}", self.uri))
        })?;
        let obj = value.as_object().cloned().ok_or_else(|| {
            VectraError::DataCorruption(format!("metadata for document '{}' is not a JSON object", self.uri))
        })?;
        *cached = Some(obj.clone());
        Ok(obj)
    }

    /// Loads the full document text, caching it for subsequent calls.
    pub async fn load_text(&self) -> Result<String> {
        let mut cached = self.text.lock().await;
        if let Some(text) = cached.as_ref() {
            return Ok(text.clone());
        }
        let text = tokio::fs::read_to_string(self.text_path()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VectraError::NotFound(format!("text file for document '{}' not found", self.uri))
            } else {
                VectraError::Io(e)
            }
        })?;
        *cached = Some(text.clone());
        Ok(text)
    }

    /// Document length in tokens. Above 40,000 characters, estimates at
    /// 4 chars/token instead of paying for a full tokenizer pass.
    pub async fn get_length(&self) -> Result<usize> {
        let text = self.load_text().await?;
        if text.chars().count() <= 40_000 {
            Ok(self.tokenizer.encode(&text).len())
        } else {
            Ok(text.chars().count() / 4)
        }
    }
}

/// One packed, token-budgeted span while assembling sections.
#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    start_pos: i64,
    end_pos: i64,
    score: f32,
    token_count: usize,
}

struct Section {
    chunks: Vec<Chunk>,
    score: f32,
    token_count: usize,
}

/// A document ranked by the mean score of its surviving chunks, with
/// section-rendering on top.
pub struct DocumentResult {
    local: LocalDocument,
    chunks: Vec<ChunkQueryResult>,
    tokenizer: Arc<dyn Tokenizer>,
    score: f32,
}

impl DocumentResult {
    pub fn new(
        folder_path: PathBuf,
        id: String,
        uri: String,
        chunks: Vec<ChunkQueryResult>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let score = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32
        };
        Self {
            local: LocalDocument::new(folder_path, id, uri, tokenizer.clone()),
            chunks,
            tokenizer,
            score,
        }
    }

    pub fn id(&self) -> &str {
        self.local.id()
    }

    pub fn uri(&self) -> &str {
        self.local.uri()
    }

    pub fn folder_path(&self) -> &Path {
        self.local.folder_path()
    }

    pub fn chunks(&self) -> &[ChunkQueryResult] {
        &self.chunks
    }

    /// Arithmetic mean of this document's chunk scores.
    pub fn score(&self) -> f32 {
        self.score
    }

    pub async fn load_text(&self) -> Result<String> {
        self.local.load_text().await
    }

    pub async fn get_length(&self) -> Result<usize> {
        self.local.get_length().await
    }

    /// Splits every chunk's recorded span into `max_tokens`-sized
    /// sub-chunks, independent of score, and packs them into sections with
    /// the same packing rule as [`Self::render_sections`]. Unlike
    /// `render_sections`, nothing is discarded and no section-count cap
    /// applies: the entire document is re-chunked.
    pub async fn render_all_sections(&self, max_tokens: usize) -> Result<Vec<DocumentTextSection>> {
        let text = self.load_text().await?;
        let chars: Vec<char> = text.chars().collect();

        let mut pieces = Vec::new();
        for chunk in &self.chunks {
            let (start, end) = chunk_span(&chunk.item.metadata);
            let chunk_text = char_span(&chars, start, end);
            let tokens = self.tokenizer.encode(&chunk_text);
            let mut offset = 0usize;
            while offset < tokens.len() {
                let len = max_tokens.min(tokens.len() - offset);
                pieces.push(Chunk {
                    text: self.tokenizer.decode(&tokens[offset..offset + len]),
                    start_pos: (start + offset) as i64,
                    end_pos: (start + offset + len - 1) as i64,
                    score: chunk.score,
                    token_count: len,
                });
                offset += len;
            }
        }
        pieces.sort_by_key(|c| c.start_pos);

        let sections = assemble_sections(pieces, max_tokens);
        Ok(sections.into_iter().map(finalize_section).collect())
    }

    /// Assembles token-budgeted sections from this document's top-scoring
    /// chunks: discards chunks whose span exceeds `max_tokens`, packs
    /// survivors into `max_sections` sections ordered by mean score, merges
    /// chunks that abut in the source text, and (if `overlapping_chunks`)
    /// inserts a separator between stitched chunks and expands each
    /// section symmetrically into its surrounding context until the token
    /// budget is exhausted.
    pub async fn render_sections(
        &self,
        max_tokens: usize,
        max_sections: usize,
        overlapping_chunks: bool,
    ) -> Result<Vec<DocumentTextSection>> {
        let text = self.load_text().await?;
        let length = self.get_length().await?;
        if length <= max_tokens {
            return Ok(vec![DocumentTextSection {
                text,
                token_count: length,
                score: 1.0,
            }]);
        }

        let chars: Vec<char> = text.chars().collect();

        let mut candidates = Vec::new();
        for chunk in &self.chunks {
            let (start, end) = chunk_span(&chunk.item.metadata);
            let chunk_text = char_span(&chars, start, end);
            let tokens = self.tokenizer.encode(&chunk_text);
            if tokens.len() <= max_tokens {
                candidates.push(Chunk {
                    text: chunk_text,
                    start_pos: start as i64,
                    end_pos: end as i64,
                    score: chunk.score,
                    token_count: tokens.len(),
                });
            }
        }

        if candidates.is_empty() {
            // None of the retrieved spans fit; fall back to the
            // highest-scoring chunk (chunks are already score-sorted by
            // the caller), truncated to the budget.
            let Some(top) = self.chunks.first() else {
                return Ok(vec![]);
            };
            let (start, end) = chunk_span(&top.item.metadata);
            let chunk_text = char_span(&chars, start, end);
            let tokens = self.tokenizer.encode(&chunk_text);
            let truncated = &tokens[..tokens.len().min(max_tokens)];
            return Ok(vec![DocumentTextSection {
                text: self.tokenizer.decode(truncated),
                token_count: max_tokens,
                score: top.score,
            }]);
        }

        candidates.sort_by_key(|c| c.start_pos);

        let mut sections = assemble_sections(candidates, max_tokens);
        sections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        sections.truncate(max_sections);

        for section in &mut sections {
            combine_adjacent_chunks(section);
        }

        if overlapping_chunks {
            for section in &mut sections {
                add_overlapping_chunks(section, &chars, max_tokens, self.tokenizer.as_ref());
            }
        }

        Ok(sections.into_iter().map(finalize_section).collect())
    }
}

fn chunk_span(metadata: &Metadata) -> (usize, usize) {
    let start = metadata.get("start_pos").and_then(Value::as_u64).unwrap_or(0) as usize;
    let end = metadata.get("end_pos").and_then(Value::as_u64).unwrap_or(0) as usize;
    (start, end)
}

fn char_span(chars: &[char], start: usize, end_inclusive: usize) -> String {
    if chars.is_empty() || start >= chars.len() {
        return String::new();
    }
    let end = end_inclusive.min(chars.len() - 1);
    if start > end {
        return String::new();
    }
    chars[start..=end].iter().collect()
}

/// Scans chunks in order, accumulating into a section while the running
/// token count stays within budget; closes a section (normalizing its score
/// to the mean of its constituent chunks) and starts a new one otherwise.
fn assemble_sections(chunks: Vec<Chunk>, max_tokens: usize) -> Vec<Section> {
    let mut sections = Vec::new();
    if chunks.is_empty() {
        return sections;
    }
    let mut current = Section {
        chunks: Vec::new(),
        score: 0.0,
        token_count: 0,
    };
    for chunk in chunks {
        if current.token_count + chunk.token_count > max_tokens && !current.chunks.is_empty() {
            current.score /= current.chunks.len() as f32;
            sections.push(current);
            current = Section {
                chunks: Vec::new(),
                score: 0.0,
                token_count: 0,
            };
        }
        current.score += chunk.score;
        current.token_count += chunk.token_count;
        current.chunks.push(chunk);
    }
    current.score /= current.chunks.len() as f32;
    sections.push(current);
    sections
}

fn combine_adjacent_chunks(section: &mut Section) {
    let mut i = 0;
    while i + 1 < section.chunks.len() {
        let merges = section.chunks[i].end_pos + 1 == section.chunks[i + 1].start_pos;
        if merges {
            let next = section.chunks.remove(i + 1);
            let chunk = &mut section.chunks[i];
            chunk.text.push_str(&next.text);
            chunk.end_pos = next.end_pos;
            chunk.token_count += next.token_count;
        } else {
            i += 1;
        }
    }
}

const CONNECTOR_TEXT: &str = "\n\n...\n\n";

/// Inserts a fixed connector between stitched chunks, then expands the
/// section symmetrically into its surrounding document text while more
/// than 40 tokens of budget remain.
fn add_overlapping_chunks(section: &mut Section, chars: &[char], max_tokens: usize, tokenizer: &dyn Tokenizer) {
    if section.chunks.len() > 1 {
        let connector_tokens = tokenizer.encode(CONNECTOR_TEXT).len();
        let mut i = 0;
        while i + 1 < section.chunks.len() {
            section.chunks.insert(
                i + 1,
                Chunk {
                    text: CONNECTOR_TEXT.to_string(),
                    start_pos: -1,
                    end_pos: -1,
                    score: 0.0,
                    token_count: connector_tokens,
                },
            );
            section.token_count += connector_tokens;
            i += 2;
        }
    }

    let budget = max_tokens as i64 - section.token_count as i64;
    if budget > 40 {
        add_adjacent_text(section, chars, budget as usize, tokenizer);
    }
}

fn add_adjacent_text(section: &mut Section, chars: &[char], mut budget: usize, tokenizer: &dyn Tokenizer) {
    let Some(first) = section.chunks.first() else { return };
    let Some(last) = section.chunks.last() else { return };
    let section_start = first.start_pos;
    let section_end = last.end_pos;

    if section_start > 0 {
        let before_text = char_span(chars, 0, (section_start - 1) as usize);
        let before_tokens = tokenizer.encode(&before_text);
        let before_budget = before_tokens.len().min(budget / 2);
        let decoded = tokenizer.decode(&before_tokens[before_tokens.len() - before_budget..]);
        section.chunks.insert(
            0,
            Chunk {
                text: decoded,
                start_pos: section_start - before_budget as i64,
                end_pos: section_start - 1,
                score: 0.0,
                token_count: before_budget,
            },
        );
        section.token_count += before_budget;
        budget = budget.saturating_sub(before_budget);
    }

    let doc_len = chars.len() as i64;
    if section_end < doc_len - 1 && budget > 0 {
        let after_text = char_span(chars, (section_end + 1) as usize, chars.len().saturating_sub(1));
        let after_tokens = tokenizer.encode(&after_text);
        let after_budget = after_tokens.len().min(budget);
        let decoded = tokenizer.decode(&after_tokens[..after_budget]);
        section.chunks.push(Chunk {
            text: decoded,
            start_pos: section_end + 1,
            end_pos: section_end + after_budget as i64,
            score: 0.0,
            token_count: after_budget,
        });
        section.token_count += after_budget;
    }
}

fn finalize_section(section: Section) -> DocumentTextSection {
    DocumentTextSection {
        text: section.chunks.iter().map(|c| c.text.as_str()).collect(),
        token_count: section.token_count,
        score: section.score,
    }
}
