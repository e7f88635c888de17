/// Okapi BM25. Constants fixed at the values the ranking contract requires:
/// k1 controls term-frequency saturation, b controls length normalization.
pub struct BM25Scorer {
    pub k1: f32,
    pub b: f32,
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer { k1: 1.5, b: 0.75 }
    }
}

impl BM25Scorer {
    /// Smoothed IDF: guarantees a positive score even when a term appears in
    /// more than half the collection.
    pub fn idf(total_docs: usize, doc_freq: usize) -> f32 {
        let n = total_docs as f32;
        let df = doc_freq as f32;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    pub fn score(&self, term_freq: u32, doc_len: usize, avg_doc_len: f32, idf: f32) -> f32 {
        let tf = term_freq as f32;
        let dl = doc_len as f32;
        let numerator = idf * tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * (dl / avg_doc_len));
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_is_positive_for_common_terms() {
        let idf = BM25Scorer::idf(100, 60);
        assert!(idf > 0.0);
    }

    #[test]
    fn higher_term_frequency_increases_score_but_saturates() {
        let scorer = BM25Scorer::default();
        let idf = 1.0;
        let low = scorer.score(1, 10, 10.0, idf);
        let high = scorer.score(10, 10, 10.0, idf);
        let higher = scorer.score(100, 10, 10.0, idf);
        assert!(high > low);
        assert!(higher > high);
        assert!((higher - high) < (high - low));
    }

    #[test]
    fn longer_documents_score_lower_for_same_term_frequency() {
        let scorer = BM25Scorer::default();
        let idf = 1.0;
        let short_doc = scorer.score(2, 10, 20.0, idf);
        let long_doc = scorer.score(2, 100, 20.0, idf);
        assert!(short_doc > long_doc);
    }
}
