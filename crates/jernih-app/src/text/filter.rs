use regex::Regex;
use thiserror::Error;

/// Literal tokens removed after the pattern list, in this order.
pub const LITERAL_REMOVALS: [&str; 2] = ["user", "kntl"];

#[derive(Debug, Error)]
#[error("abusive pattern #{index} `{pattern}` is not a valid regular expression: {source}")]
pub struct MalformedPatternError {
    pub index: usize,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Ordered abusive-word patterns compiled once.
///
/// Every entry is a regular expression, not a literal: a source entry that
/// contains metacharacters (`.`, `*`, `(` ...) matches as a regex. Authors of
/// the pattern table must escape them when a literal match is intended.
#[derive(Debug, Clone)]
pub struct AbusiveFilter {
    patterns: Vec<Regex>,
}

impl AbusiveFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, MalformedPatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .enumerate()
            .map(|(index, pattern)| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| MalformedPatternError {
                    index,
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Deletes every match of every pattern in order, then the literal
    /// removals. Later patterns see the output of earlier ones.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }
        for literal in LITERAL_REMOVALS {
            if out.contains(literal) {
                out = out.replace(literal, "");
            }
        }
        out
    }
}
