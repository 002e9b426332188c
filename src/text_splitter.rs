//! Language-aware recursive text chunker.
//!
//! Produces token-bounded [`TextChunk`] records with contiguous,
//! non-overlapping `[start_pos, end_pos]` character spans (inclusive at
//! both ends) plus optional overlap-token decoration.

use std::sync::Arc;

use crate::collaborators::Tokenizer;

const ALPHANUMERIC_TEST: fn(char) -> bool = |c| c.is_ascii_alphanumeric();

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub tokens: Vec<u32>,
    pub start_pos: usize,
    pub end_pos: usize,
    pub start_overlap: Vec<u32>,
    pub end_overlap: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct TextSplitterConfig {
    pub separators: Vec<String>,
    pub keep_separators: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub doc_type: Option<String>,
}

impl Default for TextSplitterConfig {
    fn default() -> Self {
        Self {
            separators: vec![],
            keep_separators: false,
            chunk_size: 400,
            chunk_overlap: 40,
            doc_type: None,
        }
    }
}

pub struct TextSplitter {
    config: TextSplitterConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TextSplitter {
    pub fn new(mut config: TextSplitterConfig, tokenizer: Arc<dyn Tokenizer>) -> anyhow::Result<Self> {
        if config.chunk_size < 1 {
            anyhow::bail!("chunk_size must be >= 1");
        }
        if config.chunk_overlap > config.chunk_size {
            anyhow::bail!("chunk_overlap must be <= chunk_size");
        }
        if config.separators.is_empty() {
            config.separators = get_separators(config.doc_type.as_deref());
        }
        Ok(Self { config, tokenizer })
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = self.recursive_split(text, &self.config.separators, 0);

        if self.config.chunk_overlap > 0 {
            let overlap = self.config.chunk_overlap;
            let prev_overlaps: Vec<Vec<u32>> = chunks
                .iter()
                .map(|c| last_n(&c.tokens, overlap))
                .collect();
            let next_overlaps: Vec<Vec<u32>> = chunks
                .iter()
                .map(|c| first_n(&c.tokens, overlap))
                .collect();
            let len = chunks.len();
            for i in 1..len {
                chunks[i].start_overlap = prev_overlaps[i - 1].clone();
                chunks[i].end_overlap = if i < len - 1 {
                    next_overlaps[i + 1].clone()
                } else {
                    vec![]
                };
            }
        }

        chunks
    }

    fn recursive_split(&self, text: &str, separators: &[String], start_pos: usize) -> Vec<TextChunk> {
        let mut chunks: Vec<TextChunk> = Vec::new();
        if text.is_empty() {
            return chunks;
        }

        let next_separators: Vec<String> = if separators.len() > 1 {
            separators[1..].to_vec()
        } else {
            vec![]
        };

        let (parts, separator): (Vec<String>, String) = if !separators.is_empty() {
            let sep = separators[0].clone();
            (text.split(sep.as_str()).map(|s| s.to_string()).collect(), sep)
        } else {
            let chars: Vec<char> = text.chars().collect();
            let half = chars.len() / 2;
            let first: String = chars[..half].iter().collect();
            let second: String = chars[half..].iter().collect();
            (vec![first, second], String::new())
        };

        let mut pos = start_pos;
        let n = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            let last_chunk = i == n - 1;
            let part_len = part.chars().count();
            let end_pos = pos + part_len.saturating_sub(1) + if last_chunk { 0 } else { separator.chars().count() };

            let mut chunk_text = part;
            if self.config.keep_separators && !last_chunk {
                chunk_text.push_str(&separator);
            }

            if !chunk_text.chars().any(ALPHANUMERIC_TEST) {
                // Skip whitespace/punctuation-only parts *without* advancing
                // `pos` — matches the original splitter's exact behavior.
                continue;
            }

            if (chunk_text.chars().count() as f64) / 6.0 > self.config.chunk_size as f64 {
                let sub = self.recursive_split(&chunk_text, &next_separators, pos);
                chunks.extend(sub);
            } else {
                let tokens = self.tokenizer.encode(&chunk_text);
                if tokens.len() > self.config.chunk_size {
                    let sub = self.recursive_split(&chunk_text, &next_separators, pos);
                    chunks.extend(sub);
                } else {
                    chunks.push(TextChunk {
                        text: chunk_text,
                        tokens,
                        start_pos: pos,
                        end_pos,
                        start_overlap: vec![],
                        end_overlap: vec![],
                    });
                }
            }

            pos = end_pos + 1;
        }

        self.combine_chunks(chunks)
    }

    fn combine_chunks(&self, chunks: Vec<TextChunk>) -> Vec<TextChunk> {
        let joiner = if self.config.keep_separators { "" } else { " " };
        let mut combined: Vec<TextChunk> = Vec::new();
        let mut current: Option<TextChunk> = None;

        for chunk in chunks {
            match current.take() {
                Some(mut cur) => {
                    let combined_len = cur.tokens.len() + chunk.tokens.len();
                    if combined_len > self.config.chunk_size {
                        combined.push(cur);
                        current = Some(chunk);
                    } else {
                        // Note: `end_pos` is deliberately left as the first
                        // chunk's own span, matching the reference chunker —
                        // combined chunks do not widen their recorded span
                        // even though their text now spans further.
                        cur.text.push_str(joiner);
                        cur.text.push_str(&chunk.text);
                        cur.tokens.extend(chunk.tokens);
                        current = Some(cur);
                    }
                }
                None => current = Some(chunk),
            }
        }
        if let Some(cur) = current {
            combined.push(cur);
        }
        combined
    }
}

fn last_n(tokens: &[u32], n: usize) -> Vec<u32> {
    let len = tokens.len().min(n);
    tokens[tokens.len() - len..].to_vec()
}

fn first_n(tokens: &[u32], n: usize) -> Vec<u32> {
    let len = tokens.len().min(n);
    tokens[..len].to_vec()
}

/// The fixed, per-`doc_type` separator table. Reproduced verbatim from the
/// reference chunker so chunking stays deterministic across implementations;
/// any unrecognized `doc_type` falls back to `["\n\n", "\n", " "]`.
pub fn get_separators(doc_type: Option<&str>) -> Vec<String> {
    let strs: &[&str] = match doc_type.unwrap_or("") {
        "cpp" => &[
            "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ", "\nwhile ",
            "\nswitch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "go" => &[
            "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ", "\ncase ",
            "\n\n", "\n", " ",
        ],
        "java" => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "c#" | "csharp" | "cs" => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "ts" | "tsx" | "typescript" => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "js" | "jsx" | "javascript" => &[
            "\nclass ", "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ",
        ],
        "php" => &[
            "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ", "\nswitch ",
            "\ncase ", "\n\n", "\n", " ",
        ],
        "proto" => &[
            "\nmessage ", "\nservice ", "\nenum ", "\noption ", "\nimport ", "\nsyntax ", "\n\n",
            "\n", " ",
        ],
        "python" | "py" => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " "],
        "rst" => &[
            "\n===\n", "\n---\n", "\n***\n", "\n.. ", "\n\n", "\n", " ",
        ],
        "ruby" => &[
            "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ", "\nbegin ",
            "\nrescue ", "\n\n", "\n", " ",
        ],
        "rust" => &[
            "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ", "\nmatch ",
            "\nconst ", "\n\n", "\n", " ",
        ],
        "scala" => &[
            "\nclass ", "\nobject ", "\ndef ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
            "\nmatch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "swift" => &[
            "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ", "\ndo ",
            "\nswitch ", "\ncase ", "\n\n", "\n", " ",
        ],
        "md" => &[
            "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n\n", "\n\n***\n\n",
            "\n\n---\n\n", "\n\n___\n\n", "<table>", "\n\n", "\n", " ",
        ],
        "latex" => &[
            "\n\\chapter{", "\n\\section{", "\n\\subsection{", "\n\\subsubsection{",
            "\n\\begin{enumerate}", "\n\\begin{itemize}", "\n\\begin{description}",
            "\n\\begin{list}", "\n\\begin{quote}", "\n\\begin{quotation}", "\n\\begin{verse}",
            "\n\\begin{verbatim}", "\n\\begin{align}", "$$", "$", "\n\n", "\n", " ",
        ],
        "html" => &[
            "<body>", "<div>", "<p>", "<br>", "<li>", "<h1>", "<h2>", "<h3>", "<h4>", "<h5>",
            "<h6>", "<span>", "<table>", "<tr>", "<td>", "<th>", "<ul>", "<ol>", "<header>",
            "<footer>", "<nav>", "<head>", "<style>", "<script>", "<meta>", "<title>", " ",
        ],
        "sol" => &[
            "\npragma ", "\nusing ", "\ncontract ", "\ninterface ", "\nlibrary ", "\nconstructor ",
            "\ntype ", "\nfunction ", "\nevent ", "\nmodifier ", "\nerror ", "\nstruct ", "\nenum ",
            "\nif ", "\nfor ", "\nwhile ", "\ndo while ", "\nassembly ", "\n\n", "\n", " ",
        ],
        _ => &["\n\n", "\n", " "],
    };
    strs.iter().map(|s| s.to_string()).collect()
}
