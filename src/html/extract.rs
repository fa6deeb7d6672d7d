use std::ops::Range;

use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::*;
use kuchiki::{ElementData, NodeData, NodeRef};
use serde::Serialize;
use tracing::debug;

use super::token::TokenScheme;
use super::{Escape, split_text_bounds};
use crate::error::TranslateError;

/// Attributes whose values are visible to readers and get translated.
pub const TRANSLATABLE_ATTRIBUTES: &[&str] = &["alt", "title", "placeholder", "aria-label"];

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose whole subtree is left untouched.
pub const EXCLUDED_ELEMENTS: &[&str] = &["script", "style", "noscript", "code", "pre", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Text,
    Attribute(&'static str),
}

#[derive(Debug, Clone)]
pub struct TranslatableUnit {
    pub position: usize,
    pub token: String,
    pub kind: UnitKind,
    /// Decoded source value, surrounding whitespace included.
    pub original: String,
    pub translated: Option<String>,
    core: Range<usize>,
    escape: Escape,
}

impl TranslatableUnit {
    /// The value sent to the gateway: `original` minus surrounding whitespace.
    pub fn source_text(&self) -> &str {
        &self.original[self.core.clone()]
    }

    fn leading(&self) -> &str {
        &self.original[..self.core.start]
    }

    fn trailing(&self) -> &str {
        &self.original[self.core.end..]
    }

    /// Escaped replacement for this unit's token, once translated.
    pub(crate) fn rendered(&self) -> Option<String> {
        let translated = self.translated.as_deref()?;
        let value = format!("{}{}{}", self.leading(), translated, self.trailing());
        Some(self.escape.apply(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentShape {
    /// Doctype/html/head/body present in the input; emitted as a whole.
    Document,
    /// Body-level markup only; emitted without the wrapper the parser adds.
    Fragment,
}

impl DocumentShape {
    fn detect(html: &str) -> Self {
        let lower = html.to_ascii_lowercase();
        let is_document = lower.trim_start().starts_with("<!doctype")
            || start_tag_names(&lower)
                .iter()
                .any(|name| matches!(*name, "html" | "head" | "body"));
        if is_document {
            DocumentShape::Document
        } else {
            DocumentShape::Fragment
        }
    }
}

/// Elements whose content the tokenizer reads as text, so tag-like text
/// inside them is not markup.
const TEXT_CONTENT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// Start tag names of `lower` in source order, skipping comments and the
/// bodies of text-content elements.
fn start_tag_names(lower: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = lower;
    while let Some(idx) = rest.find('<') {
        rest = &rest[idx..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }
        let Some(name) = tag_name(rest) else {
            rest = &rest[1..];
            continue;
        };
        names.push(name);
        rest = &rest[1..];
        if TEXT_CONTENT_ELEMENTS.contains(&name) {
            let close = format!("</{}", name);
            rest = match rest.find(&close) {
                Some(end) => &rest[end..],
                None => "",
            };
        }
    }
    names
}

fn tag_name(tag: &str) -> Option<&str> {
    let name = tag.strip_prefix('<')?;
    let end = name
        .find(|ch: char| ch == '>' || ch == '/' || ch.is_ascii_whitespace())
        .unwrap_or(name.len());
    let name = &name[..end];
    let valid = name.starts_with(|ch: char| ch.is_ascii_alphabetic())
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
    valid.then_some(name)
}

/// Element a fragment is parsed inside of. Table parts only survive parsing
/// in their own table context.
fn fragment_context(html: &str) -> &'static str {
    let lower = html.to_ascii_lowercase();
    match start_tag_names(&lower).first().copied() {
        Some("tr") => "tbody",
        Some("td" | "th") => "tr",
        Some("thead" | "tbody" | "tfoot" | "caption" | "colgroup") => "table",
        Some("col") => "colgroup",
        _ => "body",
    }
}

fn parse(html: &str, shape: DocumentShape) -> NodeRef {
    match shape {
        DocumentShape::Document => kuchiki::parse_html().one(html),
        DocumentShape::Fragment => {
            let context = QualName::new(
                None,
                Namespace::from(HTML_NAMESPACE),
                LocalName::from(fragment_context(html)),
            );
            kuchiki::parse_fragment(context, Vec::new()).one(html)
        }
    }
}

/// Moves `<template>` content from the element's separate fragment into the
/// element itself, where the walk and the serializer both see it.
fn hoist_template_contents(document: &NodeRef) {
    loop {
        let templates = document
            .descendants()
            .filter_map(|node| {
                let contents = node.as_element()?.template_contents.clone()?;
                contents.first_child().map(|_| (node, contents))
            })
            .collect::<Vec<_>>();
        if templates.is_empty() {
            return;
        }
        for (template, contents) in templates {
            for child in contents.children().collect::<Vec<_>>() {
                template.append(child);
            }
        }
    }
}

/// Serialized document with every translatable unit replaced by its token.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub html: String,
    pub units: Vec<TranslatableUnit>,
    pub scheme: TokenScheme,
    pub shape: DocumentShape,
}

impl Skeleton {
    pub fn source_texts(&self) -> Vec<String> {
        self.units
            .iter()
            .map(|unit| unit.source_text().to_string())
            .collect()
    }
}

/// Parses `html` into a private working tree, swaps every translatable unit
/// for a token in a single pre-order pass, and serializes the result.
///
/// The tree does not outlive this call.
pub fn skeletonize(html: &str) -> Result<Skeleton, TranslateError> {
    let shape = DocumentShape::detect(html);
    let document = parse(html, shape);
    hoist_template_contents(&document);
    let before = serialize(&document, shape)?;
    let scheme = TokenScheme::for_document(&[html, &before])?;

    let units = substitute_units(&document, &scheme);
    let html = serialize(&document, shape)?;
    debug!(
        "extracted {} units ({} text, {} attribute)",
        units.len(),
        units
            .iter()
            .filter(|unit| unit.kind == UnitKind::Text)
            .count(),
        units
            .iter()
            .filter(|unit| unit.kind != UnitKind::Text)
            .count()
    );
    Ok(Skeleton {
        html,
        units,
        scheme,
        shape,
    })
}

fn substitute_units(document: &NodeRef, scheme: &TokenScheme) -> Vec<TranslatableUnit> {
    let mut units = Vec::new();
    let mut stack = vec![document.clone()];
    while let Some(node) = stack.pop() {
        match node.data() {
            NodeData::Element(element) => {
                if is_excluded_element(element) {
                    continue;
                }
                substitute_attributes(element, scheme, &mut units);
                push_children(&node, &mut stack);
            }
            NodeData::Text(text) => {
                let escape = if parent_is_raw_text(&node) {
                    Escape::RawText
                } else {
                    Escape::Text
                };
                let mut content = text.borrow_mut();
                if let Some(unit) = take_unit(&mut content, UnitKind::Text, escape, scheme, &units)
                {
                    units.push(unit);
                }
            }
            NodeData::Document(_) | NodeData::DocumentFragment => {
                push_children(&node, &mut stack);
            }
            NodeData::Comment(_) | NodeData::Doctype(_) | NodeData::ProcessingInstruction(_) => {}
        }
    }
    units
}

fn substitute_attributes(
    element: &ElementData,
    scheme: &TokenScheme,
    units: &mut Vec<TranslatableUnit>,
) {
    let mut attributes = element.attributes.borrow_mut();
    for name in TRANSLATABLE_ATTRIBUTES {
        let Some(value) = attributes.get_mut(*name) else {
            continue;
        };
        let kind = UnitKind::Attribute(*name);
        if let Some(unit) = take_unit(value, kind, Escape::Attribute, scheme, units.as_slice()) {
            units.push(unit);
        }
    }
}

/// Replaces `slot` with the next token and returns the unit it held, unless
/// the slot is blank.
fn take_unit(
    slot: &mut String,
    kind: UnitKind,
    escape: Escape,
    scheme: &TokenScheme,
    units: &[TranslatableUnit],
) -> Option<TranslatableUnit> {
    let (start, end) = split_text_bounds(slot)?;
    let position = units.len();
    let token = scheme.token(position);
    let original = std::mem::replace(slot, token.clone());
    Some(TranslatableUnit {
        position,
        token,
        kind,
        original,
        translated: None,
        core: start..end,
        escape,
    })
}

fn push_children(node: &NodeRef, stack: &mut Vec<NodeRef>) {
    let children = node.children().collect::<Vec<_>>();
    stack.extend(children.into_iter().rev());
}

fn is_excluded_element(element: &ElementData) -> bool {
    let name: &str = element.name.local.as_ref();
    EXCLUDED_ELEMENTS.contains(&name)
}

fn parent_is_raw_text(node: &NodeRef) -> bool {
    node.parent()
        .and_then(|parent| {
            parent
                .as_element()
                .map(|element| is_raw_text_element(element.name.local.as_ref()))
        })
        .unwrap_or(false)
}

fn is_raw_text_element(name: &str) -> bool {
    matches!(
        name,
        "xmp" | "iframe" | "noembed" | "noframes" | "plaintext"
    )
}

fn serialize(document: &NodeRef, shape: DocumentShape) -> Result<String, TranslateError> {
    match shape {
        DocumentShape::Document => Ok(document.to_string()),
        DocumentShape::Fragment => {
            let root = document
                .first_child()
                .filter(|node| node.as_element().is_some())
                .ok_or_else(|| {
                    TranslateError::Extraction("parsed fragment has no root element".to_string())
                })?;
            Ok(root.children().map(|child| child.to_string()).collect())
        }
    }
}
