//! Script-driven dropdowns (ARIA listboxes, component-library menus) that
//! have no native `<select>` behind them.

use async_trait::async_trait;

use crate::detection::ElementContext;
use crate::dom::{Document, NodeId, Selector};
use crate::errors::FormPilotResult;

/// Picks the option text that best answers a desired value.
#[async_trait]
pub trait OptionMatcher: Send + Sync {
    async fn choose(
        &self,
        dropdown_html: &str,
        options: &[String],
        desired: &str,
        context: &ElementContext,
    ) -> FormPilotResult<Option<String>>;
}

/// Generic option patterns, most specific first.
pub const OPTION_SELECTORS: &[&str] = &[
    r#"[role="option"]"#,
    r#"[role="listbox"] li"#,
    ".select-option",
    r#"[class*="option"]"#,
    r#"[class*="menu-item"]"#,
    "ul li",
    "[data-value]",
];

/// The element to click to open a dropdown: the nearest combobox or button
/// around `element`, a combobox inside it, or the element itself.
pub fn trigger_for(doc: &Document, element: NodeId) -> NodeId {
    let parse = |s: &str| Selector::parse(s).ok();
    let combobox = parse(r#"[role="combobox"]"#);
    let button = parse(r#"[role="button"]"#);
    combobox
        .as_ref()
        .and_then(|s| doc.closest(element, s))
        .or_else(|| button.as_ref().and_then(|s| doc.closest(element, s)))
        .or_else(|| combobox.as_ref().and_then(|s| doc.query_selector(element, s)))
        .unwrap_or(element)
}

/// Visible options from the first pattern that has any.
pub fn visible_options(doc: &Document) -> Vec<NodeId> {
    for raw in OPTION_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let visible: Vec<NodeId> = doc
            .query_selector_all(doc.root(), &selector)
            .into_iter()
            .filter(|&o| doc.is_visible(o))
            .collect();
        if !visible.is_empty() {
            tracing::debug!(selector = raw, count = visible.len(), "dropdown options found");
            return visible;
        }
    }
    Vec::new()
}

pub fn option_texts(doc: &Document, options: &[NodeId]) -> Vec<String> {
    options
        .iter()
        .map(|&o| doc.text_content(o).trim().to_string())
        .collect()
}

/// The single option whose text equals `desired` ignoring case. `None` when
/// there is no such option or more than one.
pub fn unique_exact(texts: &[String], desired: &str) -> Option<usize> {
    let desired = desired.trim().to_lowercase();
    let mut hits = texts
        .iter()
        .enumerate()
        .filter(|(_, t)| t.to_lowercase() == desired)
        .map(|(i, _)| i);
    let first = hits.next()?;
    hits.next().is_none().then_some(first)
}

/// First option, in DOM order, equal to `desired` or containing it or
/// contained in it. Options without text never match.
pub fn fuzzy(texts: &[String], desired: &str) -> Option<usize> {
    let desired = desired.trim().to_lowercase();
    texts.iter().position(|t| {
        let t = t.to_lowercase();
        !t.is_empty() && (t == desired || t.contains(&desired) || desired.contains(&t))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[test]
    fn trigger_prefers_enclosing_combobox() {
        let doc = parse_document(
            r#"<div role="combobox" id="cb"><input id="inner"></div>
               <div id="wrap"><span role="combobox" id="nested"></span></div>
               <div id="plain"></div>"#,
            "about:blank",
        )
        .unwrap();
        let id = |s: &str| doc.element_by_id(doc.root(), s).unwrap();
        assert_eq!(trigger_for(&doc, id("inner")), id("cb"));
        assert_eq!(trigger_for(&doc, id("wrap")), id("nested"));
        assert_eq!(trigger_for(&doc, id("plain")), id("plain"));
    }

    #[test]
    fn first_pattern_with_visible_hits_wins() {
        let doc = parse_document(
            r#"<ul role="listbox" hidden><li role="option">Hidden</li></ul>
               <ul class="menu"><li class="menu-item">Canada</li><li class="menu-item">United States</li></ul>"#,
            "about:blank",
        )
        .unwrap();
        let options = visible_options(&doc);
        assert_eq!(option_texts(&doc, &options), vec!["Canada", "United States"]);
    }

    #[test]
    fn matching_rules() {
        let texts: Vec<String> = ["", "Canada", "United States", "canada"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_exact(&texts, "United States"), Some(2));
        assert_eq!(unique_exact(&texts, "Canada"), None);
        assert_eq!(fuzzy(&texts, "States"), Some(2));
        assert_eq!(fuzzy(&texts, "Canada (CA)"), Some(1));
        assert_eq!(fuzzy(&texts, "USA"), None);
    }
}
