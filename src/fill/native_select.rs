use crate::dom::{Document, EventKind, NodeId};
use crate::errors::FormPilotResult;

/// The option a native `<select>` should take for `desired`: an exact
/// case-insensitive match on value or label, otherwise the first option in
/// DOM order whose non-empty label contains, or is contained in, `desired`.
pub fn match_option(doc: &Document, select: NodeId, desired: &str) -> Option<NodeId> {
    let desired = desired.to_lowercase();
    let options = doc.options(select);
    let exact = options.iter().copied().find(|&o| {
        doc.option_value(o).to_lowercase() == desired || doc.option_label(o).to_lowercase() == desired
    });
    exact.or_else(|| {
        options.into_iter().find(|&o| {
            let label = doc.option_label(o).to_lowercase();
            !label.is_empty() && (label.contains(&desired) || desired.contains(&label))
        })
    })
}

/// Select the matching option and fire `change`. Returns false, touching
/// nothing, when no option matches.
pub fn select_native(doc: &mut Document, select: NodeId, desired: &str) -> FormPilotResult<bool> {
    let Some(option) = match_option(doc, select, desired) else {
        tracing::debug!(desired, "no native option matches");
        return Ok(false);
    };
    doc.select_option(select, option)?;
    doc.dispatch(select, EventKind::Change);
    tracing::debug!(option = %doc.option_label(option), "native option selected");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_document, Selector};

    fn select_in(html: &str) -> (Document, NodeId) {
        let doc = parse_document(html, "about:blank").unwrap();
        let sel = doc.query_selector(doc.root(), &Selector::parse("select").unwrap()).unwrap();
        (doc, sel)
    }

    #[test]
    fn exact_match_beats_earlier_substring() {
        let (mut doc, sel) = select_in(
            r#"<select><option value="">Choose</option><option value="ca-east">Canada East</option><option value="CA">Canada</option></select>"#,
        );
        assert!(select_native(&mut doc, sel, "canada").unwrap());
        assert_eq!(doc.value(sel).unwrap(), "CA");
        assert_eq!(doc.events_for(sel), vec![EventKind::Change]);
    }

    #[test]
    fn value_match_counts_as_exact() {
        let (mut doc, sel) = select_in(r#"<select><option value="US">United States</option><option value="CA">Canada</option></select>"#);
        assert!(select_native(&mut doc, sel, "ca").unwrap());
        assert_eq!(doc.value(sel).unwrap(), "CA");
    }

    #[test]
    fn substring_either_direction() {
        let (mut doc, sel) = select_in(r#"<select><option>No</option><option>Yes, I am authorized</option></select>"#);
        assert!(select_native(&mut doc, sel, "Yes").unwrap());
        assert_eq!(doc.value(sel).unwrap(), "Yes, I am authorized");

        let (mut doc, sel) = select_in(r#"<select><option>Female</option><option>Male</option></select>"#);
        assert!(select_native(&mut doc, sel, "Male (he/him)").unwrap());
        assert_eq!(doc.value(sel).unwrap(), "Male");
    }

    #[test]
    fn no_match_is_a_silent_no_op() {
        let (mut doc, sel) = select_in(r#"<select><option>United States</option><option>Canada</option></select>"#);
        assert!(!select_native(&mut doc, sel, "USA").unwrap());
        assert!(doc.explicitly_selected(sel).is_none());
        assert!(doc.events_for(sel).is_empty());
    }
}
