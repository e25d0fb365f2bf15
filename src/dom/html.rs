//! Lenient HTML reader and serializer for page snapshots.
//!
//! Besides plain markup it understands declarative shadow roots
//! (`<template shadowrootmode>`) and `<iframe>` content: `srcdoc` frames are
//! parsed as child documents, and `src` frames are marked same-origin only
//! when their origin matches the embedding page.

use crate::dom::node::{Document, Frame, NodeId, NodeKind};
use crate::errors::{FormPilotError, FormPilotResult};

/// Nested `srcdoc` documents deeper than this are left empty.
const MAX_FRAME_NESTING: usize = 8;

pub fn parse_document(html: &str, url: &str) -> FormPilotResult<Document> {
    parse_nested(html, url, 0)
}

fn parse_nested(html: &str, url: &str, frame_depth: usize) -> FormPilotResult<Document> {
    let mut doc = Document::new(url);
    let root = doc.root();
    parse_into(&mut doc, root, html, frame_depth)?;
    Ok(doc)
}

impl Document {
    /// Parse `html` and append the result under `parent`, recording one
    /// mutation with the top-level nodes that were added.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> FormPilotResult<Vec<NodeId>> {
        if self.node(parent).is_none() {
            return Err(FormPilotError::Dom(format!("{parent:?} does not exist")));
        }
        let added = parse_into(self, parent, html, 0)?;
        self.record_added(parent, added.clone());
        Ok(added)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => {
                let raw = self
                    .parent(id)
                    .and_then(|p| self.tag_name(p))
                    .is_some_and(|t| matches!(t, "script" | "style"));
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(el.tag());
                for (k, v) in el.attrs() {
                    out.push(' ');
                    out.push_str(k);
                    if !v.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_attr(v));
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void_tag(el.tag()) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(el.tag());
                out.push('>');
            }
            NodeKind::Document | NodeKind::ShadowRoot { .. } => {
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
            }
        }
    }
}

struct OpenElement {
    node: NodeId,
    tag: String,
}

fn parse_into(
    doc: &mut Document,
    parent: NodeId,
    html: &str,
    frame_depth: usize,
) -> FormPilotResult<Vec<NodeId>> {
    let bytes = html.as_bytes();
    let mut stack = vec![OpenElement {
        node: parent,
        tag: String::new(),
    }];
    let mut top_level = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            i = find_subslice(bytes, i + 4, b"-->").map_or(bytes.len(), |end| end + 3);
            continue;
        }
        if starts_with_at(bytes, i, b"<!") || starts_with_at(bytes, i, b"<?") {
            i = find_byte(bytes, i, b'>').map_or(bytes.len(), |end| end + 1);
            continue;
        }

        if bytes[i] == b'<' && starts_with_at(bytes, i, b"</") {
            let (tag, next) = parse_end_tag(html, i)?;
            i = next;
            if stack.iter().skip(1).any(|open| open.tag == tag) {
                while stack.len() > 1 {
                    let Some(open) = stack.pop() else {
                        break;
                    };
                    if open.tag == tag {
                        break;
                    }
                }
            }
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;

            if matches!(tag.as_str(), "option" | "li")
                && stack.last().is_some_and(|open| open.tag == tag)
            {
                stack.pop();
            }
            let container = stack
                .last()
                .map(|open| open.node)
                .ok_or_else(|| FormPilotError::HtmlParse("missing parent element".into()))?;

            if tag == "template" && has_attr(&attrs, "shadowrootmode") {
                let shadow = doc.attach_shadow(container)?;
                stack.push(OpenElement {
                    node: shadow,
                    tag,
                });
                continue;
            }

            let node = doc.create_element(container, &tag, attrs);
            if stack.len() == 1 {
                top_level.push(node);
            }

            if is_raw_text_tag(&tag) {
                let close = find_end_tag(bytes, i, tag.as_bytes()).unwrap_or(bytes.len());
                let body = html.get(i..close).unwrap_or_default();
                i = if close < bytes.len() {
                    parse_end_tag(html, close)?.1
                } else {
                    close
                };
                finish_raw_text(doc, node, &tag, body, frame_depth)?;
                continue;
            }

            if !self_closing && !is_void_tag(&tag) {
                stack.push(OpenElement { node, tag });
            }
            continue;
        }

        let text_start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        if let Some(text) = html.get(text_start..i) {
            let container = stack.last().map(|open| open.node).unwrap_or(parent);
            let node_is_root = matches!(doc.node(container).map(|n| &n.kind), Some(NodeKind::Document));
            if node_is_root && text.trim().is_empty() {
                continue;
            }
            let node = doc.create_text(container, &decode_entities(text));
            if stack.len() == 1 {
                top_level.push(node);
            }
        }
    }

    Ok(top_level)
}

fn finish_raw_text(
    doc: &mut Document,
    node: NodeId,
    tag: &str,
    body: &str,
    frame_depth: usize,
) -> FormPilotResult<()> {
    match tag {
        "textarea" => {
            let text = decode_entities(body.strip_prefix('\n').unwrap_or(body));
            if !text.is_empty() {
                doc.create_text(node, &text);
            }
            doc.set_value_native(node, &text)?;
        }
        "title" => {
            let text = decode_entities(body);
            if !text.is_empty() {
                doc.create_text(node, &text);
            }
            if doc.title().is_empty() {
                doc.set_title(text.split_whitespace().collect::<Vec<_>>().join(" "));
            }
        }
        "iframe" => {
            let frame = frame_for(doc, node, frame_depth)?;
            doc.set_frame(node, frame)?;
        }
        _ => {
            if !body.is_empty() {
                doc.create_text(node, body);
            }
        }
    }
    Ok(())
}

fn frame_for(doc: &Document, iframe: NodeId, frame_depth: usize) -> FormPilotResult<Frame> {
    let sandboxed_opaque = doc.attr(iframe, "sandbox").is_some_and(|tokens| {
        !tokens
            .split_ascii_whitespace()
            .any(|t| t.eq_ignore_ascii_case("allow-same-origin"))
    });

    if let Some(srcdoc) = doc.attr(iframe, "srcdoc") {
        let document = if frame_depth + 1 >= MAX_FRAME_NESTING {
            tracing::debug!(depth = frame_depth, "srcdoc nesting limit reached; frame left empty");
            Document::new("about:srcdoc")
        } else {
            parse_nested(srcdoc, "about:srcdoc", frame_depth + 1)?
        };
        return Ok(Frame {
            same_origin: !sandboxed_opaque,
            document: Some(Box::new(document)),
        });
    }

    let same_origin = !sandboxed_opaque
        && doc.attr(iframe, "src").is_some_and(|src| same_origin(doc.url(), src));
    let document = same_origin.then(|| {
        let url = url::Url::parse(doc.url())
            .and_then(|base| base.join(doc.attr(iframe, "src").unwrap_or_default()))
            .map(|u| u.to_string())
            .unwrap_or_default();
        Box::new(Document::new(url))
    });
    Ok(Frame {
        same_origin,
        document,
    })
}

fn same_origin(base: &str, src: &str) -> bool {
    let Ok(base) = url::Url::parse(base) else {
        return false;
    };
    match base.join(src) {
        Ok(target) => base.origin() == target.origin() && target.origin().is_tuple(),
        Err(_) => false,
    }
}

fn has_attr(attrs: &[(String, String)], name: &str) -> bool {
    attrs.iter().any(|(k, _)| k == name)
}

fn parse_start_tag(
    html: &str,
    at: usize,
) -> FormPilotResult<(String, Vec<(String, String)>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 1;

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| FormPilotError::HtmlParse("invalid tag name".into()))?
        .to_ascii_lowercase();

    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        if i >= bytes.len() {
            return Err(FormPilotError::HtmlParse(format!("unclosed <{tag}> start tag")));
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }
        if bytes[i] == b'/' {
            i += 1;
            if bytes.get(i) == Some(&b'>') {
                self_closing = true;
                i += 1;
                break;
            }
            continue;
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        let name = html
            .get(name_start..i)
            .ok_or_else(|| FormPilotError::HtmlParse("invalid attribute name".into()))?
            .to_ascii_lowercase();
        if name.is_empty() {
            // Skip one stray byte rather than failing on sloppy markup.
            i += html[i..].chars().next().map_or(1, char::len_utf8);
            continue;
        }

        skip_ws(bytes, &mut i);
        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, bytes, &mut i)?
        } else {
            String::new()
        };

        if !has_attr(&attrs, &name) {
            attrs.push((name, value));
        }
    }

    Ok((tag, attrs, self_closing, i))
}

fn parse_end_tag(html: &str, at: usize) -> FormPilotResult<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    skip_ws(bytes, &mut i);
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| FormPilotError::HtmlParse("invalid end tag".into()))?
        .to_ascii_lowercase();
    let end = find_byte(bytes, i, b'>')
        .ok_or_else(|| FormPilotError::HtmlParse(format!("unclosed </{tag}> end tag")))?;
    Ok((tag, end + 1))
}

fn parse_attr_value(html: &str, bytes: &[u8], i: &mut usize) -> FormPilotResult<String> {
    if *i >= bytes.len() {
        return Err(FormPilotError::HtmlParse("missing attribute value".into()));
    }
    if bytes[*i] == b'\'' || bytes[*i] == b'"' {
        let quote = bytes[*i];
        *i += 1;
        let start = *i;
        let end = find_byte(bytes, start, quote)
            .ok_or_else(|| FormPilotError::HtmlParse("unclosed quoted attribute value".into()))?;
        *i = end + 1;
        return Ok(decode_entities(html.get(start..end).unwrap_or_default()));
    }
    let start = *i;
    while *i < bytes.len()
        && !bytes[*i].is_ascii_whitespace()
        && bytes[*i] != b'>'
        && !(bytes[*i] == b'/' && bytes.get(*i + 1) == Some(&b'>'))
    {
        *i += 1;
    }
    Ok(decode_entities(html.get(start..*i).unwrap_or_default()))
}

pub(crate) fn decode_entities(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &after[..semi];
            let ch = match entity.strip_prefix('#') {
                Some(num) => match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
                    None => num.parse::<u32>().ok().and_then(char::from_u32),
                },
                None => named_entity(entity),
            }?;
            Some((ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        "hellip" => '…',
        "middot" => '·',
        "ndash" => '–',
        "mdash" => '—',
        _ => return None,
    })
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title" | "iframe")
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.len() >= at + needle.len() && &bytes[at..at + needle.len()] == needle
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes.get(from..)?.iter().position(|&b| b == needle).map(|p| p + from)
}

/// Offset of the `</tag` that closes a raw-text element, case-insensitively.
fn find_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while let Some(lt) = find_subslice(bytes, i, b"</") {
        let name_start = lt + 2;
        let name_end = name_start + tag.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag)
            && bytes.get(name_end).map_or(true, |b| !is_tag_char(*b))
        {
            return Some(lt);
        }
        i = lt + 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::selector::Selector;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn parses_forms_and_control_state() {
        let doc = parse_document(
            r#"<!DOCTYPE html><html><head><title> Apply  now </title></head><body>
               <form id="f"><input name="a" value="x &amp; y" checked type="checkbox">
               <select name="s"><option value="1">One<option value="2" selected>Two</select>
               <textarea name="t">
hello</textarea></form></body></html>"#,
            "https://jobs.example.com/apply",
        )
        .unwrap();
        assert_eq!(doc.title(), "Apply now");
        let input = doc.query_selector(doc.root(), &sel("input")).unwrap();
        assert_eq!(doc.value(input).unwrap(), "x & y");
        assert!(doc.checked(input).unwrap());
        let select = doc.query_selector(doc.root(), &sel("select")).unwrap();
        assert_eq!(doc.options(select).len(), 2);
        assert_eq!(doc.value(select).unwrap(), "2");
        let textarea = doc.query_selector(doc.root(), &sel("textarea")).unwrap();
        assert_eq!(doc.value(textarea).unwrap(), "hello");
    }

    #[test]
    fn declarative_shadow_root_is_attached() {
        let doc = parse_document(
            r#"<my-field><template shadowrootmode="open"><input name="email"></template></my-field>"#,
            "https://example.com/",
        )
        .unwrap();
        let host = doc.query_selector(doc.root(), &sel("my-field")).unwrap();
        let shadow = doc.shadow_root(host).unwrap();
        assert!(doc.query_selector(doc.root(), &sel("input")).is_none());
        assert!(doc.query_selector(shadow, &sel("input")).is_some());
    }

    #[test]
    fn iframe_origin_rules() {
        let doc = parse_document(
            r#"<iframe id="a" srcdoc="<input name='phone'>"></iframe>
               <iframe id="b" sandbox srcdoc="<input>"></iframe>
               <iframe id="c" src="/embedded"></iframe>
               <iframe id="d" src="https://other.example.net/x"></iframe>"#,
            "https://example.com/",
        )
        .unwrap();
        let frame = |id: &str| doc.element_by_id(doc.root(), id).unwrap();
        let inner = doc.frame_document(frame("a")).unwrap();
        assert!(inner.query_selector(inner.root(), &sel("input[name=phone]")).is_some());
        assert!(doc.frame_document(frame("b")).is_none());
        assert!(doc.frame_document(frame("c")).is_some());
        assert!(doc.frame_document(frame("d")).is_none());
    }

    #[test]
    fn append_html_records_mutation() {
        let mut doc = parse_document("<body><div id='host'></div></body>", "about:blank").unwrap();
        let host = doc.element_by_id(doc.root(), "host").unwrap();
        let added = doc.append_html(host, "<form><input name='x'></form>").unwrap();
        assert_eq!(added.len(), 1);
        let records = doc.take_mutations();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].added, added);
        assert_eq!(doc.outer_html(host), r#"<div id="host"><form><input name="x"></form></div>"#);
    }

    #[test]
    fn unknown_entities_survive() {
        assert_eq!(decode_entities("a &bogus; b &#65;&#x42;"), "a &bogus; b AB");
    }
}
