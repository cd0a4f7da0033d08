//! Chapter number extraction from reading URLs.
//!
//! Patterns run in a fixed order against the URL's path and query. The bare
//! digit-run pattern goes last: it also matches years, ids and any stray
//! number, so it must never shadow the specific forms.

use regex::Regex;
use url::Url;

/// Bundled patterns as (expression, capture group) pairs, in match order.
pub const DEFAULT_CHAPTER_PATTERNS: &[(&str, usize)] = &[
    (r"(?i)chapter-(\d+)", 1),
    (r"(?i)ch-(\d+)", 1),
    (r"(?i)chapter/(\d+)", 1),
    (r"(?i)ch/(\d+)", 1),
    (r"(\d+)", 1),
];

/// One compiled pattern and the group holding the number.
#[derive(Debug, Clone)]
pub struct ChapterPattern {
    regex: Regex,
    group: usize,
}

impl ChapterPattern {
    pub fn new(pattern: &str, group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            group,
        })
    }

    fn capture(&self, haystack: &str) -> Option<i64> {
        self.regex
            .captures(haystack)?
            .get(self.group)?
            .as_str()
            .parse()
            .ok()
    }
}

/// Ordered pattern cascade recovering a chapter ordinal from a URL.
#[derive(Debug, Clone)]
pub struct ChapterExtractor {
    patterns: Vec<ChapterPattern>,
}

impl Default for ChapterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChapterExtractor {
    /// Extractor over [`DEFAULT_CHAPTER_PATTERNS`].
    pub fn new() -> Self {
        let patterns = DEFAULT_CHAPTER_PATTERNS
            .iter()
            .map(|(p, group)| ChapterPattern::new(p, *group).expect("Invalid regex pattern"))
            .collect();

        Self { patterns }
    }

    pub fn with_patterns(patterns: Vec<ChapterPattern>) -> Self {
        Self { patterns }
    }

    /// Parses `raw` and extracts a chapter number from it.
    pub fn extract(&self, raw: &str) -> Result<Option<i64>, url::ParseError> {
        let url = Url::parse(raw.trim())?;
        Ok(self.extract_from_url(&url))
    }

    /// First pattern whose capture parses as an integer wins.
    pub fn extract_from_url(&self, url: &Url) -> Option<i64> {
        let haystack = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        self.patterns.iter().find_map(|p| p.capture(&haystack))
    }
}
