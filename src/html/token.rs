use regex::Regex;

use crate::error::TranslateError;

const OPEN: &str = "[[[";
const CLOSE: &str = "]]]";
const TAG: &str = "T";
const MAX_SALT: u32 = 4096;

/// Placeholder format for one document: `[[[T<n>]]]`, or `[[[T<salt>_<n>]]]`
/// when the document already contains the plain prefix.
///
/// Square brackets are left alone by the html5ever serializer in both text
/// and attribute context, so tokens survive serialization verbatim.
#[derive(Debug, Clone)]
pub struct TokenScheme {
    prefix: String,
    pattern: Regex,
}

impl TokenScheme {
    /// Picks the first prefix that occurs in none of `sources`.
    pub fn for_document(sources: &[&str]) -> Result<Self, TranslateError> {
        for salt in 0..MAX_SALT {
            let prefix = if salt == 0 {
                format!("{}{}", OPEN, TAG)
            } else {
                format!("{}{}{}_", OPEN, TAG, salt)
            };
            if sources.iter().any(|source| source.contains(&prefix)) {
                continue;
            }
            return Self::with_prefix(prefix);
        }
        Err(TranslateError::Extraction(
            "document collides with every placeholder prefix".to_string(),
        ))
    }

    fn with_prefix(prefix: String) -> Result<Self, TranslateError> {
        let pattern = format!(r"{}(\d+){}", regex::escape(&prefix), regex::escape(CLOSE));
        let pattern = Regex::new(&pattern)
            .map_err(|err| TranslateError::Extraction(format!("bad token pattern: {}", err)))?;
        Ok(Self { prefix, pattern })
    }

    pub fn token(&self, index: usize) -> String {
        format!("{}{}{}", self.prefix, index, CLOSE)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// True when `text` carries anything that looks like one of our tokens.
    pub fn leaks_into(&self, text: &str) -> bool {
        text.contains(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prefix_when_document_is_clean() {
        let scheme = TokenScheme::for_document(&["<p>Hello [world]</p>"]).unwrap();
        assert_eq!(scheme.token(0), "[[[T0]]]");
        assert_eq!(scheme.token(12), "[[[T12]]]");
    }

    #[test]
    fn salts_prefix_when_document_already_uses_it() {
        let html = "<p>literal [[[T0]]] and [[[T1_3]]]</p>";
        let scheme = TokenScheme::for_document(&[html]).unwrap();
        assert_eq!(scheme.token(0), "[[[T2_0]]]");
        assert!(!html.contains(scheme.prefix()));
    }

    #[test]
    fn pattern_captures_index() {
        let scheme = TokenScheme::for_document(&[""]).unwrap();
        let captured = scheme
            .pattern()
            .captures_iter("a [[[T3]]] b [[[T10]]] [[[X1]]]")
            .map(|caps| caps[1].to_string())
            .collect::<Vec<_>>();
        assert_eq!(captured, vec!["3", "10"]);
    }
}
