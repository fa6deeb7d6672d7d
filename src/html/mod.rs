mod extract;
mod reassemble;
mod token;

pub use extract::{
    DocumentShape, EXCLUDED_ELEMENTS, Skeleton, TRANSLATABLE_ATTRIBUTES, TranslatableUnit,
    UnitKind, skeletonize,
};
pub use reassemble::reassemble;
pub use token::TokenScheme;

/// How a unit's text has to be escaped when it is written back into the
/// serialized skeleton. Mirrors what the html5ever serializer does for the
/// same position, so an unchanged value serializes byte-identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escape {
    Text,
    RawText,
    Attribute,
}

impl Escape {
    pub(crate) fn apply(self, value: &str) -> String {
        match self {
            Escape::Text => escape_with(value, |ch| match ch {
                '&' => Some("&amp;"),
                '\u{00A0}' => Some("&nbsp;"),
                '<' => Some("&lt;"),
                '>' => Some("&gt;"),
                _ => None,
            }),
            Escape::Attribute => escape_with(value, |ch| match ch {
                '&' => Some("&amp;"),
                '\u{00A0}' => Some("&nbsp;"),
                '"' => Some("&quot;"),
                _ => None,
            }),
            Escape::RawText => value.to_string(),
        }
    }
}

fn escape_with(value: &str, entity: impl Fn(char) -> Option<&'static str>) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match entity(ch) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(ch),
        }
    }
    out
}

/// Byte range of `text` without its surrounding whitespace, or `None` when
/// nothing but whitespace is left.
pub(crate) fn split_text_bounds(text: &str) -> Option<(usize, usize)> {
    let start = text.char_indices().find(|(_, ch)| !ch.is_whitespace())?.0;
    let (idx, ch) = text.char_indices().rev().find(|(_, ch)| !ch.is_whitespace())?;
    let end = idx + ch.len_utf8();
    if start < end { Some((start, end)) } else { None }
}
