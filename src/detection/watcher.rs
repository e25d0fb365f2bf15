use crate::detection::detector::INPUT_SELECTOR;
use crate::dom::{Document, MutationRecord, Selector};

/// Decides whether a batch of subtree mutations warrants a new detection pass.
pub struct MutationWatcher {
    interesting: Selector,
}

impl Default for MutationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationWatcher {
    pub fn new() -> Self {
        let interesting = match Selector::parse(&format!("form, {INPUT_SELECTOR}")) {
            Ok(s) => s,
            Err(e) => unreachable!("watcher selector failed to parse: {e}"),
        };
        Self { interesting }
    }

    /// True when an added node is a form control or contains one.
    pub fn should_redetect(&self, doc: &Document, records: &[MutationRecord]) -> bool {
        records.iter().flat_map(|r| r.added.iter()).any(|&node| {
            doc.element(node).is_some()
                && (self.interesting.matches(doc, node)
                    || doc.query_selector(node, &self.interesting).is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[test]
    fn only_form_bearing_insertions_trigger() {
        let mut doc = parse_document("<body><div id='root'></div></body>", "about:blank").unwrap();
        let root = doc.element_by_id(doc.root(), "root").unwrap();
        let watcher = MutationWatcher::new();

        doc.append_html(root, "<p>Loading…</p>").unwrap();
        let records = doc.take_mutations();
        assert!(!watcher.should_redetect(&doc, &records));

        doc.append_html(root, "<section><div><input name='email'></div></section>").unwrap();
        let records = doc.take_mutations();
        assert!(watcher.should_redetect(&doc, &records));

        doc.append_html(root, "<div role='combobox'></div>").unwrap();
        let records = doc.take_mutations();
        assert!(watcher.should_redetect(&doc, &records));
    }
}
