//! Fuzzy token index over a fixed record set
//!
//! Each record exposes a handful of named text fields. At build time the
//! selected fields are lowercased and split into tokens; a query is split the
//! same way and every query token is compared against the field's tokens.
//!
//! Scoring:
//! - token similarity is the mean of Jaro-Winkler and normalized Levenshtein
//!   similarity, with exact matches at 1.0 and prefixes of longer tokens
//!   floored at [`PREFIX_SCORE`]
//! - a field scores the mean, over query tokens, of each token's best match
//! - a record is a hit when one of its fields reaches the threshold
//!
//! Results are ordered by descending score; equal scores keep record order.

/// Default acceptance threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Minimum similarity for a query token that prefixes a record token
const PREFIX_SCORE: f64 = 0.75;

/// Shortest query token that earns the prefix floor
const MIN_PREFIX_LEN: usize = 3;

/// Records searchable through a [`TokenIndex`]
pub trait Indexable {
    /// Text of the named field, if the record has one
    fn field(&self, name: &str) -> Option<&str>;
}

/// Index build options
#[derive(Debug, Clone)]
pub struct TokenIndexOptions {
    /// Token delimiter
    pub delimiter: char,
    /// Minimum field score for a record to match
    pub threshold: f64,
    /// Keep only the best-scoring field per record
    pub unique: bool,
}

impl Default for TokenIndexOptions {
    fn default() -> Self {
        Self {
            delimiter: ' ',
            threshold: DEFAULT_THRESHOLD,
            unique: true,
        }
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Position of the record in the indexed set
    pub index: usize,
    /// Field that produced the score
    pub field: usize,
    /// Similarity in `[0, 1]`
    pub score: f64,
}

/// Read-only fuzzy index
#[derive(Debug, Clone)]
pub struct TokenIndex {
    fields: Vec<String>,
    /// tokens[record][field]
    tokens: Vec<Vec<Vec<String>>>,
    options: TokenIndexOptions,
}

impl TokenIndex {
    /// Build the index over `records`, tokenizing each of `fields`
    pub fn new<R: Indexable>(records: &[R], fields: &[&str], options: TokenIndexOptions) -> Self {
        let tokens = records
            .iter()
            .map(|record| {
                fields
                    .iter()
                    .map(|field| {
                        record
                            .field(field)
                            .map(|text| tokenize(text, options.delimiter))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tokens,
            options,
        }
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Name of an indexed field by position
    pub fn field_name(&self, field: usize) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn options(&self) -> &TokenIndexOptions {
        &self.options
    }

    /// Top `max_results` hits for `query`
    pub fn search(&self, query: &str, max_results: usize) -> Vec<Hit> {
        let query_tokens = tokenize(query, self.options.delimiter);
        if query_tokens.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for (index, record) in self.tokens.iter().enumerate() {
            let mut best: Option<Hit> = None;
            for (field, field_tokens) in record.iter().enumerate() {
                let score = field_score(&query_tokens, field_tokens);
                if score < self.options.threshold {
                    continue;
                }
                let hit = Hit { index, field, score };
                if !self.options.unique {
                    hits.push(hit);
                } else if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(hit);
                }
            }
            hits.extend(best);
        }

        // Stable sort keeps record order among equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(max_results);
        hits
    }
}

fn tokenize(text: &str, delimiter: char) -> Vec<String> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_score(query_tokens: &[String], field_tokens: &[String]) -> f64 {
    if field_tokens.is_empty() {
        return 0.0;
    }
    let total: f64 = query_tokens
        .iter()
        .map(|q| {
            field_tokens
                .iter()
                .map(|t| token_similarity(q, t))
                .fold(0.0, f64::max)
        })
        .sum();
    total / query_tokens.len() as f64
}

/// Similarity of two lowercase tokens in `[0, 1]`
pub fn token_similarity(query: &str, token: &str) -> f64 {
    if query == token {
        return 1.0;
    }
    let blended =
        (strsim::jaro_winkler(query, token) + strsim::normalized_levenshtein(query, token)) / 2.0;
    if query.chars().count() >= MIN_PREFIX_LEN && token.starts_with(query) {
        blended.max(PREFIX_SCORE)
    } else {
        blended
    }
}
