use std::collections::HashMap;

use crate::analysis::Analyzer;
use crate::search::posting::Posting;
use crate::search::scorer::BM25Scorer;

/// Term -> postings, plus the per-document length bookkeeping BM25 needs
/// for length normalization.
pub struct InvertedIndex {
    analyzer: Analyzer,
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: HashMap<String, usize>,
    scorer: BM25Scorer,
}

impl Default for InvertedIndex {
    fn default() -> Self {
        InvertedIndex {
            analyzer: Analyzer::default(),
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            scorer: BM25Scorer::default(),
        }
    }
}

impl InvertedIndex {
    pub fn new(analyzer: Analyzer) -> Self {
        InvertedIndex {
            analyzer,
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            scorer: BM25Scorer::default(),
        }
    }

    /// Re-indexes `text` under `doc_id`, replacing any prior content for
    /// that document.
    pub fn index(&mut self, doc_id: &str, text: &str) {
        self.remove(doc_id);
        let tokens = self.analyzer.analyze_with_positions(text);
        self.doc_lengths.insert(doc_id.to_string(), tokens.len());

        let mut term_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for token in tokens {
            term_positions.entry(token.text).or_default().push(token.position);
        }
        for (term, positions) in term_positions {
            let term_freq = positions.len() as u32;
            self.postings.entry(term).or_default().push(Posting {
                doc_id: doc_id.to_string(),
                term_freq,
                positions,
            });
        }
    }

    pub fn remove(&mut self, doc_id: &str) {
        if self.doc_lengths.remove(doc_id).is_none() {
            return;
        }
        self.postings.retain(|_, postings| {
            postings.retain(|p| p.doc_id != doc_id);
            !postings.is_empty()
        });
    }

    fn avg_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.doc_lengths.values().sum::<usize>() as f32 / self.doc_lengths.len() as f32
    }

    /// Returns (docId, score) pairs for the query text, sorted by descending
    /// score with ties broken by docId for determinism.
    pub fn search(&self, query: &str) -> Vec<(String, f32)> {
        let terms = self.analyzer.analyze(query);
        let total_docs = self.doc_lengths.len();
        let avg_doc_len = self.avg_doc_length();
        if total_docs == 0 || avg_doc_len == 0.0 {
            return Vec::new();
        }

        let mut scores: HashMap<String, f32> = HashMap::new();
        for term in &terms {
            let Some(postings) = self.postings.get(term) else { continue };
            let idf = BM25Scorer::idf(total_docs, postings.len());
            for posting in postings {
                let doc_len = self.doc_lengths.get(&posting.doc_id).copied().unwrap_or(0);
                let score = self.scorer.score(posting.term_freq, doc_len, avg_doc_len, idf);
                *scores.entry(posting.doc_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_ranks_more_relevant_document_first() {
        let mut idx = InvertedIndex::default();
        idx.index("doc1", "the quick brown fox jumps over the lazy dog");
        idx.index("doc2", "quick quick quick fox");
        let hits = idx.search("quick fox");
        assert_eq!(hits[0].0, "doc2");
    }

    #[test]
    fn remove_drops_document_from_future_searches() {
        let mut idx = InvertedIndex::default();
        idx.index("doc1", "database systems are fast");
        idx.remove("doc1");
        assert!(idx.search("database").is_empty());
    }

    #[test]
    fn reindexing_a_doc_id_replaces_its_content() {
        let mut idx = InvertedIndex::default();
        idx.index("doc1", "apples and oranges");
        idx.index("doc1", "bananas only");
        assert!(idx.search("apples").is_empty());
        assert!(!idx.search("bananas").is_empty());
    }
}
