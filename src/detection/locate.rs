//! Three-tier element search: the document itself, then open shadow roots
//! depth-first, then same-origin iframe documents. Cross-origin frames are
//! skipped without error.

use serde::Serialize;

use crate::dom::{Document, ElementRef, NodeId, Selector};

/// A node together with the chain of iframes leading to its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
    pub frames: Vec<NodeId>,
    pub node: NodeId,
}

impl Located {
    pub fn to_ref(&self, top: &Document) -> ElementRef {
        top.element_ref(self.frames.clone(), self.node)
    }
}

/// The document reached by following `frames` from `top`.
pub fn document_at<'a>(top: &'a Document, frames: &[NodeId]) -> Option<&'a Document> {
    let mut doc = top;
    for &frame in frames {
        doc = doc.frame_document(frame)?;
    }
    Some(doc)
}

/// Every match from the first tier that yields any.
pub fn find_all(top: &Document, selector: &Selector, max_depth: usize) -> Vec<Located> {
    let direct: Vec<Located> = top
        .query_selector_all(top.root(), selector)
        .into_iter()
        .map(|node| Located {
            frames: Vec::new(),
            node,
        })
        .collect();
    if !direct.is_empty() {
        return direct;
    }

    let mut shadow = Vec::new();
    search_shadow_roots(top, top.root(), selector, &[], 1, max_depth, &mut shadow);
    if !shadow.is_empty() {
        return shadow;
    }

    let mut framed = Vec::new();
    search_frames(top, selector, &[], 1, max_depth, &mut framed);
    framed
}

pub fn find_first(top: &Document, selector: &Selector, max_depth: usize) -> Option<Located> {
    if let Some(node) = top.query_selector(top.root(), selector) {
        return Some(Located {
            frames: Vec::new(),
            node,
        });
    }
    // The lower tiers collect everything; the first hit is still the one a
    // depth-first search would return.
    let mut shadow = Vec::new();
    search_shadow_roots(top, top.root(), selector, &[], 1, max_depth, &mut shadow);
    if let Some(first) = shadow.into_iter().next() {
        return Some(first);
    }
    let mut framed = Vec::new();
    search_frames(top, selector, &[], 1, max_depth, &mut framed);
    framed.into_iter().next()
}

/// Matches across all tiers at once, in tier order. Used for counting.
pub fn find_everywhere(top: &Document, selector: &Selector, max_depth: usize) -> Vec<Located> {
    let mut out = Vec::new();
    collect_everywhere(top, selector, &[], 0, max_depth, &mut out);
    out
}

fn collect_everywhere(
    doc: &Document,
    selector: &Selector,
    frames: &[NodeId],
    depth: usize,
    max_depth: usize,
    out: &mut Vec<Located>,
) {
    out.extend(
        doc.query_selector_all(doc.root(), selector)
            .into_iter()
            .map(|node| Located {
                frames: frames.to_vec(),
                node,
            }),
    );
    search_shadow_roots(doc, doc.root(), selector, frames, depth + 1, max_depth, out);
    if depth + 1 > max_depth {
        return;
    }
    for iframe in iframes(doc) {
        if let Some(inner) = doc.frame_document(iframe) {
            let mut chain = frames.to_vec();
            chain.push(iframe);
            collect_everywhere(inner, selector, &chain, depth + 1, max_depth, out);
        }
    }
}

fn search_shadow_roots(
    doc: &Document,
    scope: NodeId,
    selector: &Selector,
    frames: &[NodeId],
    depth: usize,
    max_depth: usize,
    out: &mut Vec<Located>,
) {
    if depth > max_depth {
        return;
    }
    for host in doc.descendants(scope) {
        let Some(shadow) = doc.shadow_root(host) else {
            continue;
        };
        out.extend(
            doc.query_selector_all(shadow, selector)
                .into_iter()
                .map(|node| Located {
                    frames: frames.to_vec(),
                    node,
                }),
        );
        search_shadow_roots(doc, shadow, selector, frames, depth + 1, max_depth, out);
    }
}

fn search_frames(
    doc: &Document,
    selector: &Selector,
    frames: &[NodeId],
    depth: usize,
    max_depth: usize,
    out: &mut Vec<Located>,
) {
    if depth > max_depth {
        return;
    }
    for iframe in iframes(doc) {
        let Some(inner) = doc.frame_document(iframe) else {
            tracing::trace!(frame = ?iframe, "skipping cross-origin frame");
            continue;
        };
        let mut chain = frames.to_vec();
        chain.push(iframe);
        let before = out.len();
        out.extend(
            inner
                .query_selector_all(inner.root(), selector)
                .into_iter()
                .map(|node| Located {
                    frames: chain.clone(),
                    node,
                }),
        );
        search_shadow_roots(inner, inner.root(), selector, &chain, depth + 1, max_depth, out);
        if out.len() == before {
            search_frames(inner, selector, &chain, depth + 1, max_depth, out);
        }
    }
}

fn iframes(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|&id| doc.tag_name(id) == Some("iframe"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn direct_tier_wins_over_shadow() {
        let doc = parse_document(
            r#"<input name="email"><x-box><template shadowrootmode="open"><input name="email"></template></x-box>"#,
            "https://example.com/",
        )
        .unwrap();
        let found = find_all(&doc, &sel("input[name=email]"), 8);
        assert_eq!(found.len(), 1);
        assert_eq!(doc.tree_root(found[0].node), doc.root());
        assert_eq!(find_everywhere(&doc, &sel("input"), 8).len(), 2);
    }

    #[test]
    fn nested_shadow_roots_and_depth_bound() {
        let html = r#"<a-el><template shadowrootmode="open"><b-el><template shadowrootmode="open"><input name="deep"></template></b-el></template></a-el>"#;
        let doc = parse_document(html, "https://example.com/").unwrap();
        assert!(find_first(&doc, &sel("input"), 8).is_some());
        assert!(find_first(&doc, &sel("input"), 1).is_none());
    }

    #[test]
    fn same_origin_frames_only() {
        let doc = parse_document(
            r#"<iframe sandbox srcdoc="<input name='a'>"></iframe><iframe srcdoc="<input name='b'>"></iframe>"#,
            "https://example.com/",
        )
        .unwrap();
        let found = find_all(&doc, &sel("input"), 8);
        assert_eq!(found.len(), 1);
        let inner = document_at(&doc, &found[0].frames).unwrap();
        assert_eq!(inner.attr(found[0].node, "name"), Some("b"));
        let r = found[0].to_ref(&doc);
        assert!(doc.resolve(&r).is_some());
    }
}
