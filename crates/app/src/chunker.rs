//! Splits file text into contiguous code blocks.
//!
//! Cut lines come from syntax boundaries, markdown headings or, when neither
//! is available, every line. Segments between cut lines are packed greedily
//! into blocks of about `max_block_chars` characters. Block contents always
//! concatenate back to the original text.

use code_index_domain::constants::{
    MAX_BLOCK_CHARS, MIN_BLOCK_CHARS, MIN_CHUNK_REMAINDER_CHARS, max_block_ceiling,
};
use code_index_domain::{CodeBlock, Language, LineSpan, RelativePath};
use code_index_ports::{StructureParserPort, StructureRequest};
use code_index_shared::{ErrorCode, ErrorEnvelope, Result};
use std::collections::VecDeque;
use std::sync::Arc;

/// Block size bounds, in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerOptions {
    /// Size at which a block is closed.
    pub max_block_chars: usize,
    /// Smallest block that may be closed early.
    pub min_block_chars: usize,
    /// Smallest acceptable trailing block.
    pub min_remainder_chars: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            max_block_chars: MAX_BLOCK_CHARS,
            min_block_chars: MIN_BLOCK_CHARS,
            min_remainder_chars: MIN_CHUNK_REMAINDER_CHARS,
        }
    }
}

impl ChunkerOptions {
    /// Hard ceiling for a non-oversized block.
    #[must_use]
    pub const fn ceiling(self) -> usize {
        max_block_ceiling(self.max_block_chars)
    }
}

/// Origin of the cut lines used for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSource {
    /// Start lines of syntax nodes.
    Syntax,
    /// Markdown ATX headings.
    Headings,
    /// Every line; the language has no grammar.
    Lines,
    /// Every line; the grammar rejected the text.
    ParseFailed,
}

/// Blocks of one file plus where their cut lines came from.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    /// Blocks in file order.
    pub blocks: Vec<CodeBlock>,
    /// Cut line origin.
    pub cuts: CutSource,
}

impl ChunkedFile {
    /// `index:parse_failed` when the syntax parser rejected the file.
    pub fn parse_error(&self, file_path: &RelativePath) -> Option<ErrorEnvelope> {
        (self.cuts == CutSource::ParseFailed).then(|| {
            ErrorEnvelope::expected(
                ErrorCode::new("index", "parse_failed"),
                "syntax parse failed; chunked by lines",
            )
            .with_metadata("path", file_path.as_str())
        })
    }
}

/// Structure-aware chunker.
#[derive(Clone)]
pub struct Chunker {
    structure: Arc<dyn StructureParserPort>,
    options: ChunkerOptions,
}

impl Chunker {
    /// Chunker using `structure` for syntax boundaries.
    pub fn new(structure: Arc<dyn StructureParserPort>, options: ChunkerOptions) -> Self {
        Self { structure, options }
    }

    /// Configured size bounds.
    pub const fn options(&self) -> ChunkerOptions {
        self.options
    }

    /// Split `text` into blocks. Whitespace-only text has no blocks.
    pub fn chunk(&self, file_path: &RelativePath, text: &str) -> Result<ChunkedFile> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let language = Language::from_path(file_path.as_str());
        if text.trim().is_empty() {
            return Ok(ChunkedFile {
                blocks: Vec::new(),
                cuts: CutSource::Lines,
            });
        }

        let (cuts, source) = self.cut_lines(text, language, &lines);
        let line_chars: Vec<usize> = lines.iter().map(|line| line.chars().count()).collect();
        let blocks = plan_blocks(&line_chars, &cuts, self.options)
            .into_iter()
            .map(|range| build_block(file_path, &lines, range))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChunkedFile {
            blocks,
            cuts: source,
        })
    }

    fn cut_lines(
        &self,
        text: &str,
        language: Language,
        lines: &[&str],
    ) -> (Vec<usize>, CutSource) {
        if language.is_markdown() {
            return (heading_cuts(lines), CutSource::Headings);
        }
        if !self.structure.supports(language) {
            return (every_line(lines.len()), CutSource::Lines);
        }
        let boundaries = self.structure.boundaries(StructureRequest {
            text,
            language,
            max_node_chars: self.options.ceiling(),
        });
        match boundaries {
            Some(starts) => (syntax_cuts(&starts, lines.len()), CutSource::Syntax),
            None => (every_line(lines.len()), CutSource::ParseFailed),
        }
    }
}

/// Half-open line range `[start, end)` with its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockRange {
    start: usize,
    end: usize,
    chars: usize,
    oversized: bool,
}

impl BlockRange {
    const fn line_count(self) -> usize {
        self.end - self.start
    }

    const fn joined(self, next: Self) -> Self {
        Self {
            start: self.start,
            end: next.end,
            chars: self.chars + next.chars,
            oversized: false,
        }
    }

    /// Joined range that no longer fits the ceiling.
    const fn folded(self, next: Self) -> Self {
        Self {
            oversized: true,
            ..self.joined(next)
        }
    }
}

fn every_line(line_count: usize) -> Vec<usize> {
    (0..line_count).collect()
}

/// 1-based syntax start lines to sorted 0-based cut indexes starting at 0.
fn syntax_cuts(starts: &[u32], line_count: usize) -> Vec<usize> {
    let mut cuts: Vec<usize> = starts
        .iter()
        .filter_map(|line| usize::try_from(*line).ok())
        .filter_map(|line| line.checked_sub(1))
        .filter(|index| *index < line_count)
        .collect();
    cuts.push(0);
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}

fn heading_cuts(lines: &[&str]) -> Vec<usize> {
    let mut cuts = vec![0];
    let mut fence: Option<char> = None;
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start_matches(' ');
        if line.len() - trimmed.len() > 3 {
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = match fence {
                None => Some(marker),
                Some(open) if open == marker => None,
                Some(open) => Some(open),
            };
            continue;
        }
        if fence.is_none() && is_atx_heading(trimmed) && index > 0 {
            cuts.push(index);
        }
    }
    cuts
}

fn fence_marker(line: &str) -> Option<char> {
    ['`', '~']
        .into_iter()
        .find(|marker| line.chars().take_while(|ch| ch == marker).count() >= 3)
}

fn is_atx_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    (1..=6).contains(&hashes)
        && line
            .get(hashes..)
            .and_then(|rest| rest.chars().next())
            .is_none_or(char::is_whitespace)
}

/// Segments between cut lines; segments above the ceiling become single lines.
fn segments(line_chars: &[usize], cuts: &[usize], ceiling: usize) -> VecDeque<BlockRange> {
    let mut out = VecDeque::new();
    for (position, &start) in cuts.iter().enumerate() {
        let end = cuts.get(position + 1).copied().unwrap_or(line_chars.len());
        let chars = range_chars(line_chars, start, end);
        if chars > ceiling && end - start > 1 {
            out.extend(single_lines(line_chars, start, end, ceiling));
        } else {
            out.push_back(BlockRange {
                start,
                end,
                chars,
                oversized: chars > ceiling,
            });
        }
    }
    out
}

fn single_lines(
    line_chars: &[usize],
    start: usize,
    end: usize,
    ceiling: usize,
) -> impl DoubleEndedIterator<Item = BlockRange> + '_ {
    (start..end).map(move |index| {
        let chars = line_chars.get(index).copied().unwrap_or(0);
        BlockRange {
            start: index,
            end: index + 1,
            chars,
            oversized: chars > ceiling,
        }
    })
}

fn range_chars(line_chars: &[usize], start: usize, end: usize) -> usize {
    line_chars.get(start..end).map_or(0, |chars| chars.iter().sum())
}

fn plan_blocks(line_chars: &[usize], cuts: &[usize], options: ChunkerOptions) -> Vec<BlockRange> {
    let total: usize = line_chars.iter().sum();
    if line_chars.is_empty() {
        return Vec::new();
    }
    if total < options.min_block_chars {
        return vec![BlockRange {
            start: 0,
            end: line_chars.len(),
            chars: total,
            oversized: false,
        }];
    }

    let ceiling = options.ceiling();
    let mut queue = segments(line_chars, cuts, ceiling);
    let mut blocks = Vec::new();
    let mut open: Option<BlockRange> = None;

    while let Some(segment) = queue.pop_front() {
        if segment.oversized {
            blocks.extend(open.take());
            blocks.push(segment);
            continue;
        }
        let next = match open.take() {
            None => segment,
            Some(block) if block.chars + segment.chars <= ceiling => block.joined(segment),
            Some(block) if block.chars >= options.min_block_chars => {
                blocks.push(block);
                segment
            },
            Some(block) if segment.line_count() > 1 => {
                // Too small to close: continue line by line.
                open = Some(block);
                for line in single_lines(line_chars, segment.start, segment.end, ceiling).rev() {
                    queue.push_front(line);
                }
                continue;
            },
            Some(block) => {
                // Below the minimum and the next line does not fit.
                blocks.push(block.folded(segment));
                continue;
            },
        };
        if next.chars >= options.max_block_chars {
            blocks.push(next);
        } else {
            open = Some(next);
        }
    }
    blocks.extend(open);
    rebalance_tail(&mut blocks, line_chars, options);
    blocks
}

/// Merges a short trailing block into its predecessor, or moves lines over.
fn rebalance_tail(blocks: &mut Vec<BlockRange>, line_chars: &[usize], options: ChunkerOptions) {
    let ceiling = options.ceiling();
    let Some(mut tail) = blocks.pop() else {
        return;
    };
    let Some(mut previous) = blocks.pop() else {
        blocks.push(tail);
        return;
    };
    if tail.oversized || previous.oversized || tail.chars >= options.min_remainder_chars {
        blocks.extend([previous, tail]);
        return;
    }
    if previous.chars + tail.chars <= ceiling {
        blocks.push(previous.joined(tail));
        return;
    }
    while tail.chars < options.min_remainder_chars && previous.line_count() > 1 {
        let moved = line_chars.get(previous.end - 1).copied().unwrap_or(0);
        if previous.chars - moved < options.min_block_chars || tail.chars + moved > ceiling {
            break;
        }
        previous.end -= 1;
        previous.chars -= moved;
        tail.start -= 1;
        tail.chars += moved;
    }
    if tail.chars < options.min_block_chars {
        blocks.push(previous.folded(tail));
    } else {
        blocks.extend([previous, tail]);
    }
}

fn build_block(file_path: &RelativePath, lines: &[&str], range: BlockRange) -> Result<CodeBlock> {
    let content = lines
        .get(range.start..range.end)
        .map_or_else(String::new, |slice| slice.concat());
    let span = LineSpan::new(line_number(range.start + 1)?, line_number(range.end)?)
        .map_err(ErrorEnvelope::from)?;
    Ok(CodeBlock::new(file_path.clone(), span, content, range.oversized))
}

fn line_number(line: usize) -> Result<u32> {
    u32::try_from(line).map_err(|_| {
        ErrorEnvelope::expected(ErrorCode::invalid_input(), "file has too many lines")
    })
}
