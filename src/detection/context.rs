use serde::{Deserialize, Serialize};

use crate::dom::node::collapse_whitespace;
use crate::dom::{Document, NodeId, Selector};

/// Text around a control that helps a remote matcher understand it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    pub label: String,
    pub parent_text: String,
    pub placeholder: String,
    pub aria_label: String,
}

const PARENT_TEXT_LIMIT: usize = 200;

pub fn element_context(doc: &Document, id: NodeId) -> ElementContext {
    let label = associated_label(doc, id)
        .map(|l| collapse_whitespace(&doc.text_content(l)))
        .unwrap_or_default();
    let parent_text = Selector::parse(r#"div[class*="field"], div[class*="form-group"]"#)
        .ok()
        .and_then(|s| doc.closest(id, &s))
        .map(|p| doc.text_content(p).chars().take(PARENT_TEXT_LIMIT).collect())
        .unwrap_or_default();
    ElementContext {
        label,
        parent_text,
        placeholder: doc.attr(id, "placeholder").unwrap_or_default().to_string(),
        aria_label: doc.attr(id, "aria-label").unwrap_or_default().to_string(),
    }
}

/// `label[for=id]` within the same tree, else the nearest enclosing `<label>`.
pub fn associated_label(doc: &Document, id: NodeId) -> Option<NodeId> {
    if let Some(el_id) = doc.attr(id, "id").filter(|v| !v.is_empty()) {
        let scope = doc.tree_root(id);
        let by_for = doc
            .descendants(scope)
            .into_iter()
            .find(|&n| doc.tag_name(n) == Some("label") && doc.attr(n, "for") == Some(el_id));
        if by_for.is_some() {
            return by_for;
        }
    }
    let mut current = doc.parent(id);
    while let Some(c) = current {
        if doc.tag_name(c) == Some("label") {
            return Some(c);
        }
        current = doc.parent(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[test]
    fn collects_label_parent_text_and_hints() {
        let doc = parse_document(
            r#"<div class="form-field"><label for="c">Country  of residence</label>
               <div role="combobox" id="c" aria-label="Country" placeholder="Pick one"></div></div>"#,
            "about:blank",
        )
        .unwrap();
        let combo = doc.element_by_id(doc.root(), "c").unwrap();
        let ctx = element_context(&doc, combo);
        assert_eq!(ctx.label, "Country of residence");
        assert!(ctx.parent_text.starts_with("Country  of residence"));
        assert_eq!(ctx.aria_label, "Country");
        assert_eq!(ctx.placeholder, "Pick one");
    }

    #[test]
    fn falls_back_to_wrapping_label() {
        let doc = parse_document(
            r#"<label>Yes <input type="radio" name="auth" value="y"></label>"#,
            "about:blank",
        )
        .unwrap();
        let radio = doc.query_selector(doc.root(), &Selector::parse("input").unwrap()).unwrap();
        let label = associated_label(&doc, radio).unwrap();
        assert_eq!(doc.text_content(label).trim(), "Yes");
    }
}
