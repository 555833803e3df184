//! Context packer - trims ranked candidates into a character-budgeted
//! context block with per-segment citations.
//!
//! Candidates are included greedily in rank order. The first candidate that
//! no longer fits whole is truncated at a whitespace boundary rather than
//! dropped, and packing stops there. Citations are emitted in inclusion
//! order - the generation step must keep that ordering so markers in the
//! text map back to the right sources.

use crate::error::{QuarryError, QuarryResult};
use crate::types::{Citation, RankedCandidates, RetrievalContext};

/// Separator placed between packed segments.
const SEGMENT_SEPARATOR: &str = "\n\n";

/// Packs ranked candidates into a budget-constrained context block.
#[derive(Debug, Default)]
pub struct ContextPacker;

impl ContextPacker {
    /// Create a packer.
    pub fn new() -> Self {
        Self
    }

    /// Pack candidates in rank order until the character budget is spent.
    ///
    /// Budget accounting is in Unicode characters and covers the citation
    /// markers and separators, not just chunk text.
    ///
    /// # Errors
    /// Returns a validation error when `max_context_chars` is zero.
    pub fn pack(
        &self,
        ranked: &RankedCandidates,
        max_context_chars: usize,
    ) -> QuarryResult<RetrievalContext> {
        if max_context_chars == 0 {
            return Err(QuarryError::validation("max_context_chars must be positive"));
        }

        let mut context_text = String::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut used = 0usize;

        for candidate in &ranked.candidates {
            let marker = format!("[{}] ", citations.len() + 1);
            let segment_chars =
                marker.chars().count() + candidate.chunk.text.chars().count();
            let separator_chars = if citations.is_empty() {
                0
            } else {
                SEGMENT_SEPARATOR.chars().count()
            };

            if used + separator_chars + segment_chars <= max_context_chars {
                if !citations.is_empty() {
                    context_text.push_str(SEGMENT_SEPARATOR);
                }
                context_text.push_str(&marker);
                context_text.push_str(&candidate.chunk.text);
                used += separator_chars + segment_chars;
                citations.push(citation(candidate, false));
                continue;
            }

            // Doesn't fit whole. Truncate it into the remaining budget -
            // but only as the first segment, or after at least one full
            // candidate has already been packed.
            let remaining = max_context_chars
                .saturating_sub(used)
                .saturating_sub(separator_chars);
            let truncated = truncate_at_whitespace(
                &candidate.chunk.text,
                remaining.saturating_sub(marker.chars().count()),
            );
            if !truncated.is_empty() {
                if !citations.is_empty() {
                    context_text.push_str(SEGMENT_SEPARATOR);
                }
                context_text.push_str(&marker);
                context_text.push_str(&truncated);
                citations.push(citation(candidate, true));
            }
            break;
        }

        Ok(RetrievalContext {
            context_text,
            citations,
            total_chunks_considered: ranked.total_considered,
            retrieval_time: ranked.elapsed,
            degraded: ranked.degraded,
        })
    }
}

/// Cut `text` down to at most `limit` characters, preferring the last
/// whitespace boundary inside the limit. Falls back to a hard cut when the
/// prefix has no whitespace (CJK text, long identifiers).
fn truncate_at_whitespace(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }

    let cut: String = match chars[..limit]
        .iter()
        .rposition(|ch| ch.is_whitespace())
    {
        Some(pos) if pos > 0 => chars[..pos].iter().collect(),
        _ => chars[..limit].iter().collect(),
    };
    cut.trim_end().to_string()
}

fn citation(
    candidate: &crate::types::RetrievalCandidate,
    truncated: bool,
) -> Citation {
    Citation {
        document_id: candidate.chunk.document_id.clone(),
        chunk_id: candidate.chunk.id.clone(),
        sequence_index: candidate.chunk.sequence_index,
        score: candidate.fused_score,
        truncated,
    }
}
