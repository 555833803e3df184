//! Lexical (BM25) index over chunk text.
//!
//! A small inverted index scoring chunks against a query by term frequency
//! weighted with inverse document frequency. Corpus statistics are
//! maintained incrementally as chunk generations come and go, so both
//! stages of one query observe the same IDF snapshot.
//!
//! Tokenization is case-insensitive and mixed-script aware: alphanumeric
//! runs become word tokens, CJK ideographs and kana are emitted as
//! single-character tokens so multilingual corpora score without a
//! language-specific segmenter.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, QuarryResult};
use crate::types::{CategoryFilter, Chunk, ChunkId};

/// BM25 scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation. Standard value from the literature.
    pub k1: f32,
    /// Document-length normalization, in [0, 1].
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    /// Validate parameter ranges.
    pub fn validate(&self) -> QuarryResult<()> {
        if self.k1 <= 0.0 {
            return Err(QuarryError::configuration(format!(
                "bm25 k1 must be positive, got {}",
                self.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(QuarryError::configuration(format!(
                "bm25 b must be in [0, 1], got {}",
                self.b
            )));
        }
        Ok(())
    }
}

struct ChunkEntry {
    document_id: String,
    category: String,
    token_count: u32,
    // Unique terms of this chunk, kept so removal doesn't scan all postings.
    terms: Vec<String>,
}

#[derive(Default)]
struct IndexState {
    // term -> chunk -> term frequency
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    chunks: HashMap<ChunkId, ChunkEntry>,
    total_tokens: u64,
}

/// Term-frequency scorer over the chunk corpus.
pub struct LexicalIndex {
    params: Bm25Params,
    state: RwLock<IndexState>,
}

impl LexicalIndex {
    /// Create an empty index.
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            state: RwLock::new(IndexState::default()),
        }
    }

    // State mutations below are plain map operations that cannot panic
    // midway, so a poisoned lock still holds consistent state.
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, IndexState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, IndexState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Index one chunk, replacing any previous entry with the same id.
    pub fn index_chunk(&self, chunk: &Chunk) {
        let mut state = self.write_state();
        remove_chunk(&mut state, &chunk.id);
        insert_chunk(&mut state, chunk);
    }

    /// Swap a document's entire chunk generation in one step.
    ///
    /// Runs under a single write lock: a concurrent query sees the old
    /// generation or the new one, never a mix.
    pub fn replace_document(&self, document_id: &str, chunks: &[Chunk]) {
        let mut state = self.write_state();
        remove_document_entries(&mut state, document_id);
        for chunk in chunks {
            insert_chunk(&mut state, chunk);
        }
    }

    /// Remove a document's chunks from the index.
    pub fn remove_document(&self, document_id: &str) {
        let mut state = self.write_state();
        remove_document_entries(&mut state, document_id);
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.read_state().chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score an explicit candidate set against a query.
    ///
    /// Every candidate gets an entry; chunks with no term overlap (or
    /// unknown to the index) score 0. Never an error.
    pub fn score(&self, query: &str, candidates: &BTreeSet<ChunkId>) -> HashMap<ChunkId, f32> {
        let state = self.read_state();
        let mut scores: HashMap<ChunkId, f32> =
            candidates.iter().map(|id| (id.clone(), 0.0)).collect();
        for (id, score) in self.score_where(&state, query, |id, _| candidates.contains(id)) {
            scores.insert(id, score);
        }
        scores
    }

    /// Top `limit` chunks by lexical score, optionally restricted to a
    /// category set (applied while generating candidates).
    ///
    /// Only chunks with a positive score are returned. There is no
    /// similarity floor: exact identifiers and numeric strings that no
    /// embedding model handles well still match here.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&CategoryFilter>,
    ) -> Vec<(ChunkId, f32)> {
        let state = self.read_state();
        let scores = self.score_where(&state, query, |_, entry| {
            filter.map_or(true, |f| f.matches(&entry.category))
        });

        let mut results: Vec<(ChunkId, f32)> =
            scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        results.sort_by(|a, b| {
            OrderedFloat(b.1)
                .cmp(&OrderedFloat(a.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(limit);
        results
    }

    fn score_where(
        &self,
        state: &IndexState,
        query: &str,
        accept: impl Fn(&ChunkId, &ChunkEntry) -> bool,
    ) -> HashMap<ChunkId, f32> {
        let mut scores: HashMap<ChunkId, f32> = HashMap::new();
        if state.chunks.is_empty() {
            return scores;
        }

        let corpus_size = state.chunks.len() as f32;
        let avg_len = state.total_tokens as f32 / corpus_size;

        for term in tokenize(query) {
            let Some(postings) = state.postings.get(&term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((corpus_size - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (chunk_id, tf) in postings {
                let Some(entry) = state.chunks.get(chunk_id) else {
                    continue;
                };
                if !accept(chunk_id, entry) {
                    continue;
                }
                let tf = *tf as f32;
                let len_norm =
                    1.0 - self.params.b + self.params.b * entry.token_count as f32 / avg_len;
                let contribution = idf * (tf * (self.params.k1 + 1.0))
                    / (tf + self.params.k1 * len_norm);
                *scores.entry(chunk_id.clone()).or_insert(0.0) += contribution;
            }
        }
        scores
    }
}

fn insert_chunk(state: &mut IndexState, chunk: &Chunk) {
    let tokens = tokenize(&chunk.text);
    let token_count = tokens.len() as u32;

    let mut term_freqs: HashMap<String, u32> = HashMap::new();
    for token in tokens {
        *term_freqs.entry(token).or_insert(0) += 1;
    }

    let terms: Vec<String> = term_freqs.keys().cloned().collect();
    for (term, freq) in term_freqs {
        state
            .postings
            .entry(term)
            .or_default()
            .insert(chunk.id.clone(), freq);
    }

    state.total_tokens += u64::from(token_count);
    state.chunks.insert(
        chunk.id.clone(),
        ChunkEntry {
            document_id: chunk.document_id.clone(),
            category: chunk.category.clone(),
            token_count,
            terms,
        },
    );
}

fn remove_chunk(state: &mut IndexState, id: &ChunkId) {
    let Some(entry) = state.chunks.remove(id) else {
        return;
    };
    state.total_tokens -= u64::from(entry.token_count);
    for term in &entry.terms {
        if let Some(postings) = state.postings.get_mut(term) {
            postings.remove(id);
            if postings.is_empty() {
                state.postings.remove(term);
            }
        }
    }
}

fn remove_document_entries(state: &mut IndexState, document_id: &str) {
    let ids: Vec<ChunkId> = state
        .chunks
        .iter()
        .filter(|(_, entry)| entry.document_id == document_id)
        .map(|(id, _)| id.clone())
        .collect();
    for id in ids {
        remove_chunk(state, &id);
    }
}

/// Split text into lowercase tokens with Unicode-aware boundaries.
///
/// Alphanumeric runs form word tokens; CJK ideographs and kana become
/// single-character tokens, which lets a query like "人工智能应用" overlap
/// chunks written with different word spacing.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
        | 0x3040..=0x309F    // Hiragana
        | 0x30A0..=0x30FF    // Katakana
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, text: &str, category: &str) -> Chunk {
        let mut c = Chunk::new(doc, 0, text, category).unwrap();
        c.id = ChunkId::from(id);
        c
    }

    #[test]
    fn tokenize_latin_text() {
        assert_eq!(
            tokenize("The quick, brown fox!"),
            vec!["the", "quick", "brown", "fox"]
        );
    }

    #[test]
    fn tokenize_mixed_script() {
        assert_eq!(
            tokenize("GPT-4 模型 evaluation"),
            vec!["gpt", "4", "模", "型", "evaluation"]
        );
    }

    #[test]
    fn tokenize_unspaced_cjk() {
        assert_eq!(tokenize("人工智能"), vec!["人", "工", "智", "能"]);
    }

    #[test]
    fn search_ranks_by_term_overlap() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.index_chunk(&chunk("a", "d1", "storage engine compaction tuning", "tech"));
        index.index_chunk(&chunk("b", "d1", "compaction compaction backlog alert", "tech"));
        index.index_chunk(&chunk("c", "d2", "quarterly revenue report", "biz"));

        let results = index.search("compaction", 10, None);
        assert_eq!(results.len(), 2);
        // Higher term frequency ranks first.
        assert_eq!(results[0].0, ChunkId::from("b"));
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn search_matches_unspaced_cjk_query() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.index_chunk(&chunk("a", "d1", "人工智能 水务 应用", "tech-docs"));
        index.index_chunk(&chunk("b", "d2", "财务报表 年度", "business"));

        let results = index.search("人工智能应用", 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ChunkId::from("a"));
    }

    #[test]
    fn search_respects_category_filter() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.index_chunk(&chunk("a", "d1", "report on storage", "tech"));
        index.index_chunk(&chunk("b", "d2", "report on revenue", "biz"));

        let filter = CategoryFilter::new(["biz"]).unwrap();
        let results = index.search("report", 10, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ChunkId::from("b"));
    }

    #[test]
    fn score_returns_zero_for_no_match() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.index_chunk(&chunk("a", "d1", "storage engine", "tech"));

        let candidates: BTreeSet<ChunkId> =
            [ChunkId::from("a"), ChunkId::from("missing")].into_iter().collect();
        let scores = index.score("unrelated query", &candidates);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&ChunkId::from("a")], 0.0);
        assert_eq!(scores[&ChunkId::from("missing")], 0.0);
    }

    #[test]
    fn remove_document_purges_postings() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.index_chunk(&chunk("a", "d1", "storage engine", "tech"));
        index.index_chunk(&chunk("b", "d2", "storage backlog", "tech"));

        index.remove_document("d1");
        assert_eq!(index.len(), 1);
        let results = index.search("engine", 10, None);
        assert!(results.is_empty());
        let results = index.search("storage", 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ChunkId::from("b"));
    }

    #[test]
    fn replace_document_swaps_generation() {
        let index = LexicalIndex::new(Bm25Params::default());
        index.replace_document("d1", &[chunk("a", "d1", "old content here", "tech")]);
        index.replace_document("d1", &[chunk("b", "d1", "new content here", "tech")]);

        assert!(index.search("old", 10, None).is_empty());
        assert_eq!(index.search("new", 10, None).len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_index_scores_nothing() {
        let index = LexicalIndex::new(Bm25Params::default());
        assert!(index.search("anything", 10, None).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn ties_break_by_chunk_id() {
        let index = LexicalIndex::new(Bm25Params::default());
        // Identical text, so identical scores.
        index.index_chunk(&chunk("b", "d1", "same text", "tech"));
        index.index_chunk(&chunk("a", "d2", "same text", "tech"));

        let results = index.search("same", 10, None);
        assert_eq!(results[0].0, ChunkId::from("a"));
        assert_eq!(results[1].0, ChunkId::from("b"));
    }
}
