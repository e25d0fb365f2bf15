//! A CSS selector subset sufficient for form heuristics: type, universal,
//! `#id`, `.class`, attribute conditions (`=`, `^=`, `$=`, `*=`, `~=`, `|=`,
//! with the ` i` flag), `:not(...)`, selector lists and the descendant,
//! child, adjacent and general sibling combinators.

use crate::dom::node::{Document, NodeId};
use crate::errors::{FormPilotError, FormPilotResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<SelectorPart>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorPart {
    compound: Compound,
    // Relation to the part on the left.
    combinator: Option<Combinator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    negations: Vec<Selector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Eq,
    Prefix,
    Suffix,
    Substring,
    Includes,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

impl Selector {
    pub fn parse(source: &str) -> FormPilotResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(FormPilotError::UnsupportedSelector(source.into()));
        }
        let mut groups = Vec::new();
        for group in split_top_level(trimmed, ',') {
            let group = group.trim();
            if group.is_empty() {
                return Err(FormPilotError::UnsupportedSelector(source.into()));
            }
            groups.push(parse_complex(group).ok_or_else(|| {
                FormPilotError::UnsupportedSelector(source.into())
            })?);
        }
        Ok(Self {
            source: trimmed.to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups
            .iter()
            .any(|parts| matches_from(doc, node, parts, parts.len() - 1))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = FormPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Matching ────────────────────────────────────────────────────────────────

fn matches_from(doc: &Document, node: NodeId, parts: &[SelectorPart], idx: usize) -> bool {
    let part = &parts[idx];
    if !matches_compound(doc, node, &part.compound) {
        return false;
    }
    let Some(combinator) = part.combinator else {
        return true;
    };
    let prev = idx - 1;
    match combinator {
        Combinator::Child => doc
            .parent(node)
            .filter(|&p| doc.element(p).is_some())
            .is_some_and(|p| matches_from(doc, p, parts, prev)),
        Combinator::Descendant => {
            let mut current = doc.parent(node);
            while let Some(p) = current {
                if doc.element(p).is_none() {
                    return false;
                }
                if matches_from(doc, p, parts, prev) {
                    return true;
                }
                current = doc.parent(p);
            }
            false
        }
        Combinator::AdjacentSibling => previous_element_siblings(doc, node)
            .first()
            .is_some_and(|&s| matches_from(doc, s, parts, prev)),
        Combinator::GeneralSibling => previous_element_siblings(doc, node)
            .into_iter()
            .any(|s| matches_from(doc, s, parts, prev)),
    }
}

/// Element siblings before `node`, nearest first.
fn previous_element_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let Some(parent) = doc.parent(node) else {
        return Vec::new();
    };
    let siblings = doc.children(parent);
    let Some(pos) = siblings.iter().position(|&c| c == node) else {
        return Vec::new();
    };
    siblings[..pos]
        .iter()
        .rev()
        .copied()
        .filter(|&s| doc.element(s).is_some())
        .collect()
}

fn matches_compound(doc: &Document, node: NodeId, compound: &Compound) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if !el.tag().eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if el.attr("id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let class_attr = el.attr("class").unwrap_or("");
        if !compound
            .classes
            .iter()
            .all(|c| class_attr.split_ascii_whitespace().any(|t| t == c))
        {
            return false;
        }
    }
    for cond in &compound.attrs {
        let Some(actual) = el.attr(&cond.name) else {
            return false;
        };
        if !attr_condition_holds(cond, actual) {
            return false;
        }
    }
    compound.negations.iter().all(|n| !n.matches(doc, node))
}

fn attr_condition_holds(cond: &AttrCondition, actual: &str) -> bool {
    let (actual, expected) = if cond.case_insensitive {
        (actual.to_lowercase(), cond.value.to_lowercase())
    } else {
        (actual.to_string(), cond.value.clone())
    };
    match cond.op {
        AttrOp::Exists => true,
        AttrOp::Eq => actual == expected,
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
        AttrOp::Includes => actual.split_ascii_whitespace().any(|t| t == expected),
        AttrOp::DashMatch => actual == expected || actual.starts_with(&format!("{expected}-")),
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Split on `sep` outside brackets, parentheses and quotes.
fn split_top_level(src: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, ch) in src.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                out.push(&src[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&src[start..]);
    out
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> Option<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
                out.push(c);
                self.pos += 1;
            } else if c == '\\' {
                self.pos += 1;
                out.push(self.bump()?);
            } else {
                break;
            }
        }
        (!out.is_empty()).then_some(out)
    }

    /// Raw text up to the parenthesis matching the one just consumed.
    fn balanced_parens(&mut self) -> Option<String> {
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        None
    }
}

fn parse_complex(src: &str) -> Option<Vec<SelectorPart>> {
    let mut cur = Cursor::new(src);
    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut pending: Option<Combinator> = None;

    loop {
        let saw_ws = cur.skip_ws();
        let Some(c) = cur.peek() else {
            break;
        };
        let explicit = match c {
            '>' => Some(Combinator::Child),
            '+' => Some(Combinator::AdjacentSibling),
            '~' => Some(Combinator::GeneralSibling),
            _ => None,
        };
        if let Some(comb) = explicit {
            if parts.is_empty() || pending.is_some() {
                return None;
            }
            cur.bump();
            pending = Some(comb);
            continue;
        }
        let compound = parse_compound(&mut cur)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            match pending.take() {
                Some(comb) => Some(comb),
                None if saw_ws => Some(Combinator::Descendant),
                None => return None,
            }
        };
        parts.push(SelectorPart {
            compound,
            combinator,
        });
    }

    if parts.is_empty() || pending.is_some() {
        return None;
    }
    Some(parts)
}

fn parse_compound(cur: &mut Cursor) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut any = false;
    while let Some(c) = cur.peek() {
        match c {
            '*' => {
                cur.bump();
            }
            '#' => {
                cur.bump();
                compound.id = Some(cur.ident()?);
            }
            '.' => {
                cur.bump();
                compound.classes.push(cur.ident()?);
            }
            '[' => {
                cur.bump();
                compound.attrs.push(parse_attr(cur)?);
            }
            ':' => {
                cur.bump();
                let name = cur.ident()?.to_ascii_lowercase();
                if name != "not" || cur.bump() != Some('(') {
                    return None;
                }
                let inner = cur.balanced_parens()?;
                compound.negations.push(Selector::parse(&inner).ok()?);
            }
            c if c.is_whitespace() || matches!(c, '>' | '+' | '~') => break,
            _ => {
                if any {
                    return None;
                }
                compound.tag = Some(cur.ident()?.to_ascii_lowercase());
            }
        }
        any = true;
    }
    any.then_some(compound)
}

fn parse_attr(cur: &mut Cursor) -> Option<AttrCondition> {
    cur.skip_ws();
    let name = cur.ident()?.to_ascii_lowercase();
    cur.skip_ws();
    let op = match cur.bump()? {
        ']' => {
            return Some(AttrCondition {
                name,
                op: AttrOp::Exists,
                value: String::new(),
                case_insensitive: false,
            })
        }
        '=' => AttrOp::Eq,
        c => {
            let op = match c {
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Substring,
                '~' => AttrOp::Includes,
                '|' => AttrOp::DashMatch,
                _ => return None,
            };
            if cur.bump()? != '=' {
                return None;
            }
            op
        }
    };
    cur.skip_ws();
    let value = match cur.peek()? {
        q @ ('"' | '\'') => {
            cur.bump();
            let mut v = String::new();
            loop {
                match cur.bump()? {
                    c if c == q => break,
                    '\\' => v.push(cur.bump()?),
                    c => v.push(c),
                }
            }
            v
        }
        _ => cur.ident()?,
    };
    cur.skip_ws();
    let mut case_insensitive = false;
    if matches!(cur.peek(), Some('i' | 'I')) {
        cur.bump();
        case_insensitive = true;
        cur.skip_ws();
    } else if matches!(cur.peek(), Some('s' | 'S')) {
        cur.bump();
        cur.skip_ws();
    }
    if cur.bump()? != ']' {
        return None;
    }
    Some(AttrCondition {
        name,
        op,
        value,
        case_insensitive,
    })
}
