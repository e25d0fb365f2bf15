use serde::{Deserialize, Serialize};

use crate::dom::selector::Selector;
use crate::errors::{FormPilotError, FormPilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    /// Root of a shadow tree. Not reachable through the host's children.
    ShadowRoot { host: NodeId },
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) tag: String,
    /// Kept in source order so serialization round-trips.
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) shadow_root: Option<NodeId>,
    pub(crate) frame: Option<Frame>,
    pub(crate) value: String,
    pub(crate) checked: bool,
    pub(crate) selected: bool,
    /// Last value a framework-bound listener has seen; `None` when no framework owns the field.
    pub(crate) tracker: Option<String>,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Lowercased `type` attribute for inputs, `""` otherwise.
    pub fn input_type(&self) -> String {
        if self.tag != "input" {
            return String::new();
        }
        self.attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "text".into())
    }
}

/// Content of an `<iframe>`. Cross-origin frames may have a document that is
/// simply not accessible from the embedding page.
#[derive(Debug, Clone)]
pub struct Frame {
    pub same_origin: bool,
    pub document: Option<Box<Document>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Not a DOM event; recorded so the fill trace shows where the page scrolled.
    ScrollIntoView,
    Focus,
    Input,
    Change,
    Blur,
    Click,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: EventKind,
}

/// A change observed by a framework listener (a value-tracker mismatch on input/change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkUpdate {
    pub target: NodeId,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub parent: Option<NodeId>,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Address of an element anywhere in a page: the chain of `<iframe>` nodes
/// leading to its document, the node itself, and the top document's
/// generation at the time the reference was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub frames: Vec<NodeId>,
    pub node: NodeId,
    pub generation: u64,
}

/// Event and framework-update logs keep at most this many entries. Past the
/// limit the oldest entries are dropped down to half of it.
pub const EVENT_LOG_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) url: String,
    pub(crate) title: String,
    pub(crate) generation: u64,
    pub(crate) active: Option<NodeId>,
    pub(crate) events: Vec<DomEvent>,
    pub(crate) framework_updates: Vec<FrameworkUpdate>,
    pub(crate) mutations: Vec<MutationRecord>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            url: url.into(),
            title: String::new(),
            generation: 0,
            active: None,
            events: Vec::new(),
            framework_updates: Vec::new(),
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace this document with `next`, as a navigation does. Every
    /// `ElementRef` taken before the call stops resolving.
    pub fn navigate(&mut self, next: Document) {
        let generation = self.generation + 1;
        *self = next;
        self.generation = generation;
        tracing::debug!(url = %self.url, generation, "document replaced");
    }

    // ── Tree construction ───────────────────────────────────────────────

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    pub fn create_element(&mut self, parent: NodeId, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let has = |name: &str| attrs.iter().any(|(k, _)| k == name);
        let value = if tag == "input" || tag == "option" {
            attrs
                .iter()
                .find(|(k, _)| k == "value")
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };
        let element = Element {
            checked: tag == "input" && has("checked"),
            selected: tag == "option" && has("selected"),
            value,
            tag,
            attrs,
            shadow_root: None,
            frame: None,
            tracker: None,
        };
        self.push_node(Some(parent), NodeKind::Element(element))
    }

    pub fn create_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_node(Some(parent), NodeKind::Text(text.to_string()))
    }

    /// Attach an open shadow root to `host` and return the root node.
    pub fn attach_shadow(&mut self, host: NodeId) -> FormPilotResult<NodeId> {
        if let Some(existing) = self.element(host).and_then(|e| e.shadow_root) {
            return Ok(existing);
        }
        self.element(host)
            .ok_or_else(|| FormPilotError::Dom(format!("shadow host {host:?} is not an element")))?;
        let root = self.push_node(None, NodeKind::ShadowRoot { host });
        if let Some(el) = self.element_mut(host) {
            el.shadow_root = Some(root);
        }
        Ok(root)
    }

    pub fn set_frame(&mut self, iframe: NodeId, frame: Frame) -> FormPilotResult<()> {
        let el = self
            .element_mut(iframe)
            .ok_or_else(|| FormPilotError::Dom(format!("{iframe:?} is not an element")))?;
        el.frame = Some(frame);
        Ok(())
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    // ── Node access ─────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn require_element(&self, id: NodeId) -> FormPilotResult<&Element> {
        self.element(id)
            .ok_or_else(|| FormPilotError::Dom(format!("{id:?} is not an element")))
    }

    fn require_element_mut(&mut self, id: NodeId) -> FormPilotResult<&mut Element> {
        self.element_mut(id)
            .ok_or_else(|| FormPilotError::Dom(format!("{id:?} is not an element")))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> FormPilotResult<()> {
        let el = self.require_element_mut(id)?;
        let name = name.to_ascii_lowercase();
        match el.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => el.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> FormPilotResult<()> {
        let el = self.require_element_mut(id)?;
        el.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    /// Parent in the flat tree: the light parent, or the host for a shadow root.
    pub(crate) fn flat_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id.0)?;
        match node.kind {
            NodeKind::ShadowRoot { host } => Some(host),
            _ => node.parent,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn shadow_root(&self, id: NodeId) -> Option<NodeId> {
        self.element(id)?.shadow_root
    }

    /// The content document of a same-origin iframe. Cross-origin frames yield `None`.
    pub fn frame_document(&self, iframe: NodeId) -> Option<&Document> {
        let frame = self.element(iframe)?.frame.as_ref()?;
        if !frame.same_origin {
            return None;
        }
        frame.document.as_deref()
    }

    pub fn frame_document_mut(&mut self, iframe: NodeId) -> Option<&mut Document> {
        let frame = self.element_mut(iframe)?.frame.as_mut()?;
        if !frame.same_origin {
            return None;
        }
        frame.document.as_deref_mut()
    }

    /// Element descendants of `scope` in tree order, not entering shadow roots or frames.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.element(id).is_some() {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// True when `id` is attached to this document, possibly through shadow hosts.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        let mut hops = 0usize;
        while let Some(c) = current {
            if c == self.root {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            current = self.flat_parent(c);
        }
        false
    }

    /// The document root or shadow root whose tree contains `id`.
    pub fn tree_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(p) = self.parent(current) {
            current = p;
        }
        current
    }

    pub fn body(&self) -> NodeId {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.tag_name(id) == Some("body"))
            .unwrap_or(self.root)
    }

    // ── Selectors ───────────────────────────────────────────────────────

    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&id| selector.matches(self, id))
            .collect()
    }

    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&id| selector.matches(self, id))
    }

    /// Nearest inclusive ancestor matching `selector` within the same tree.
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(c) = current {
            if self.element(c).is_some() && selector.matches(self, c) {
                return Some(c);
            }
            current = self.parent(c);
        }
        None
    }

    pub fn element_by_id(&self, scope: NodeId, id: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(id))
    }

    // ── Text ────────────────────────────────────────────────────────────

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        if let NodeKind::Text(t) = &node.kind {
            out.push_str(t);
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    /// Text nodes under `scope` with their parent element, in tree order.
    pub fn text_nodes(&self, scope: NodeId) -> Vec<(NodeId, String)> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            if let NodeKind::Text(t) = &node.kind {
                if let Some(p) = node.parent {
                    out.push((p, t.clone()));
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> FormPilotResult<()> {
        self.require_element(id)?;
        let old = std::mem::take(&mut self.nodes[id.0].children);
        for &child in &old {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.create_text(id, text);
        }
        Ok(())
    }

    // ── Visibility ──────────────────────────────────────────────────────

    /// Approximates computed visibility from inline styles and attributes:
    /// `display:none`, `visibility:hidden`, `opacity:0`, the `hidden`
    /// attribute, hidden inputs, non-rendered containers and a zero-sized
    /// layout box all make an element invisible. Shadow hosts pass their
    /// state down to their shadow trees.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        if el.input_type() == "hidden" {
            return false;
        }
        let own = parse_style(el.attr("style"));
        let zero = |key: &str| {
            own.iter()
                .any(|(k, v)| k == key && matches!(v.as_str(), "0" | "0px" | "0%"))
        };
        if zero("width") || zero("height") {
            return false;
        }

        let mut current = Some(id);
        while let Some(c) = current {
            if let Some(el) = self.element(c) {
                if matches!(
                    el.tag.as_str(),
                    "head" | "script" | "style" | "template" | "noscript"
                ) || el.attr("hidden").is_some()
                {
                    return false;
                }
                for (k, v) in parse_style(el.attr("style")) {
                    match (k.as_str(), v.as_str()) {
                        ("display", "none") | ("visibility", "hidden") => return false,
                        ("opacity", o) if o.parse::<f32>().map(|f| f <= 0.0).unwrap_or(false) => {
                            return false
                        }
                        _ => {}
                    }
                }
            }
            current = self.flat_parent(c);
        }
        true
    }

    pub fn is_content_editable(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            match self.attr(c, "contenteditable").map(|v| v.to_ascii_lowercase()) {
                Some(v) if v.is_empty() || v == "true" || v == "plaintext-only" => return true,
                Some(v) if v == "false" => return false,
                _ => {}
            }
            current = self.parent(c);
        }
        false
    }

    // ── Form state ──────────────────────────────────────────────────────

    pub fn value(&self, id: NodeId) -> FormPilotResult<String> {
        let el = self.require_element(id)?;
        if el.tag == "select" {
            return Ok(self
                .selected_option(id)
                .map(|o| self.option_value(o))
                .unwrap_or_default());
        }
        Ok(el.value.clone())
    }

    /// Property assignment as seen by page scripts. Frameworks that own the
    /// field intercept this setter, so their tracker follows the new value.
    pub fn assign_value(&mut self, id: NodeId, value: &str) -> FormPilotResult<()> {
        let el = self.require_element_mut(id)?;
        el.value = value.to_string();
        if let Some(tracker) = el.tracker.as_mut() {
            *tracker = value.to_string();
        }
        Ok(())
    }

    /// The element prototype's native setter. Bypasses framework trackers, so
    /// a following input/change event is seen by the framework as a change.
    pub fn set_value_native(&mut self, id: NodeId, value: &str) -> FormPilotResult<()> {
        let el = self.require_element_mut(id)?;
        el.value = value.to_string();
        Ok(())
    }

    /// Install a framework value tracker on a field, as React-style bindings do.
    pub fn bind_value_tracker(&mut self, id: NodeId) -> FormPilotResult<()> {
        let el = self.require_element_mut(id)?;
        el.tracker = Some(el.value.clone());
        Ok(())
    }

    pub fn checked(&self, id: NodeId) -> FormPilotResult<bool> {
        Ok(self.require_element(id)?.checked)
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> FormPilotResult<()> {
        let kind = self.require_element(id)?.input_type();
        if kind != "checkbox" && kind != "radio" {
            return Err(FormPilotError::Dom(format!("{id:?} is not a checkbox or radio")));
        }
        if checked && kind == "radio" {
            self.uncheck_radio_group(id);
        }
        if let Some(el) = self.element_mut(id) {
            el.checked = checked;
        }
        Ok(())
    }

    fn uncheck_radio_group(&mut self, id: NodeId) {
        let Some(name) = self.attr(id, "name").map(str::to_string) else {
            return;
        };
        let scope = self.tree_root(id);
        let peers: Vec<NodeId> = self
            .descendants(scope)
            .into_iter()
            .filter(|&n| {
                n != id
                    && self.element(n).map(|e| e.input_type()) == Some("radio".into())
                    && self.attr(n, "name") == Some(name.as_str())
            })
            .collect();
        for peer in peers {
            if let Some(el) = self.element_mut(peer) {
                el.checked = false;
            }
        }
    }

    /// `<option>` elements of a `<select>`, including those inside `<optgroup>`.
    pub fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|&id| self.tag_name(id) == Some("option"))
            .collect()
    }

    pub fn option_value(&self, option: NodeId) -> String {
        match self.attr(option, "value") {
            Some(v) => v.to_string(),
            None => collapse_whitespace(&self.text_content(option)),
        }
    }

    pub fn option_label(&self, option: NodeId) -> String {
        match self.attr(option, "label") {
            Some(v) => v.to_string(),
            None => collapse_whitespace(&self.text_content(option)),
        }
    }

    pub fn selected_option(&self, select: NodeId) -> Option<NodeId> {
        let options = self.options(select);
        options
            .iter()
            .rev()
            .find(|&&o| self.element(o).map(|e| e.selected).unwrap_or(false))
            .or_else(|| {
                if self.attr(select, "multiple").is_some() {
                    None
                } else {
                    options.first()
                }
            })
            .copied()
    }

    /// Explicitly chosen option (ignores the implicit first-option default).
    pub fn explicitly_selected(&self, select: NodeId) -> Option<NodeId> {
        self.options(select)
            .into_iter()
            .find(|&o| self.element(o).map(|e| e.selected).unwrap_or(false))
    }

    pub fn select_option(&mut self, select: NodeId, option: NodeId) -> FormPilotResult<()> {
        if self.tag_name(select) != Some("select") {
            return Err(FormPilotError::Dom(format!("{select:?} is not a <select>")));
        }
        let options = self.options(select);
        if !options.contains(&option) {
            return Err(FormPilotError::Dom(format!("{option:?} is not an option of {select:?}")));
        }
        for o in options {
            if let Some(el) = self.element_mut(o) {
                el.selected = o == option;
            }
        }
        Ok(())
    }

    // ── Interaction ─────────────────────────────────────────────────────

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    pub fn events_for(&self, id: NodeId) -> Vec<EventKind> {
        self.events
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.kind)
            .collect()
    }

    pub fn framework_updates(&self) -> &[FrameworkUpdate] {
        &self.framework_updates
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.active
    }

    /// Record an event on `target`. Input and change events let a framework
    /// tracker compare its last-seen value with the field's current value.
    pub fn dispatch(&mut self, target: NodeId, kind: EventKind) {
        self.events.push(DomEvent { target, kind });
        trim_log(&mut self.events);
        if !matches!(kind, EventKind::Input | EventKind::Change) {
            return;
        }
        let observed = self.element_mut(target).and_then(|el| {
            let tracker = el.tracker.as_mut()?;
            if *tracker == el.value {
                return None;
            }
            *tracker = el.value.clone();
            Some(el.value.clone())
        });
        if let Some(value) = observed {
            self.framework_updates.push(FrameworkUpdate { target, value });
            trim_log(&mut self.framework_updates);
        }
    }

    pub fn scroll_into_view(&mut self, target: NodeId) {
        self.dispatch(target, EventKind::ScrollIntoView);
    }

    pub fn focus(&mut self, target: NodeId) {
        if let Some(prev) = self.active.take() {
            if prev != target {
                self.dispatch(prev, EventKind::Blur);
            }
        }
        self.active = Some(target);
        self.dispatch(target, EventKind::Focus);
    }

    /// A user-equivalent click with the default actions the engine relies on:
    /// toggling checkboxes, checking radios, expanding `aria-controls`
    /// popups, and marking `role=option` items as selected.
    pub fn click(&mut self, target: NodeId) -> FormPilotResult<()> {
        self.require_element(target)?;
        self.dispatch(target, EventKind::Click);

        let input_type = self.element(target).map(|e| e.input_type()).unwrap_or_default();
        let was_checked = self.checked(target)?;
        match input_type.as_str() {
            "checkbox" => {
                self.set_checked(target, !was_checked)?;
                self.dispatch(target, EventKind::Input);
                self.dispatch(target, EventKind::Change);
            }
            "radio" if !was_checked => {
                self.set_checked(target, true)?;
                self.dispatch(target, EventKind::Input);
                self.dispatch(target, EventKind::Change);
            }
            _ => {}
        }

        if let Some(controls) = self.attr(target, "aria-controls").map(str::to_string) {
            let scope = self.tree_root(target);
            if let Some(popup) = self.element_by_id(scope, &controls) {
                if self.attr(popup, "hidden").is_some() {
                    self.remove_attr(popup, "hidden")?;
                    self.set_attr(target, "aria-expanded", "true")?;
                } else {
                    self.set_attr(popup, "hidden", "")?;
                    self.set_attr(target, "aria-expanded", "false")?;
                }
            }
        }

        if self.attr(target, "role") == Some("option") {
            let list = self.parent(target);
            if let Some(list) = list {
                let siblings: Vec<NodeId> = self
                    .children(list)
                    .iter()
                    .copied()
                    .filter(|&s| self.attr(s, "role") == Some("option"))
                    .collect();
                for s in siblings {
                    self.set_attr(s, "aria-selected", if s == target { "true" } else { "false" })?;
                }
            }
        }
        Ok(())
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Detach `id` from its parent and record the removal.
    pub fn remove(&mut self, id: NodeId) -> FormPilotResult<()> {
        let parent = self
            .parent(id)
            .ok_or_else(|| FormPilotError::Dom(format!("{id:?} has no parent")))?;
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        self.mutations.push(MutationRecord {
            parent: Some(parent),
            added: Vec::new(),
            removed: vec![id],
        });
        Ok(())
    }

    pub(crate) fn record_added(&mut self, parent: NodeId, added: Vec<NodeId>) {
        if !added.is_empty() {
            self.mutations.push(MutationRecord {
                parent: Some(parent),
                added,
                removed: Vec::new(),
            });
        }
    }

    /// Drain the mutation records accumulated since the last call.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    // ── Cross-frame references ──────────────────────────────────────────

    pub fn element_ref(&self, frames: Vec<NodeId>, node: NodeId) -> ElementRef {
        ElementRef {
            frames,
            node,
            generation: self.generation,
        }
    }

    /// The document holding `r.node`, provided the reference is still live.
    pub fn resolve(&self, r: &ElementRef) -> Option<&Document> {
        if r.generation != self.generation {
            return None;
        }
        let mut doc = self;
        for &frame in &r.frames {
            doc = doc.frame_document(frame)?;
        }
        (doc.element(r.node).is_some() && doc.is_connected(r.node)).then_some(doc)
    }

    pub fn resolve_mut(&mut self, r: &ElementRef) -> Option<&mut Document> {
        if r.generation != self.generation {
            return None;
        }
        let mut doc = self;
        for &frame in &r.frames {
            doc = doc.frame_document_mut(frame)?;
        }
        if doc.element(r.node).is_some() && doc.is_connected(r.node) {
            Some(doc)
        } else {
            None
        }
    }
}

pub(crate) fn parse_style(style: Option<&str>) -> Vec<(String, String)> {
    let Some(style) = style else {
        return Vec::new();
    };
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let v = v.trim().trim_end_matches("!important").trim();
            Some((k.trim().to_ascii_lowercase(), v.to_ascii_lowercase()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_log<T>(log: &mut Vec<T>) {
    if log.len() > EVENT_LOG_LIMIT {
        log.drain(..log.len() - EVENT_LOG_LIMIT / 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_is_bounded() {
        let (mut doc, input) = doc_with_input("");
        for _ in 0..EVENT_LOG_LIMIT + 10 {
            doc.dispatch(input, EventKind::Focus);
        }
        assert!(doc.events().len() <= EVENT_LOG_LIMIT);
        assert!(doc.events().len() >= EVENT_LOG_LIMIT / 2);

        // The newest entry always survives a trim.
        doc.dispatch(input, EventKind::Blur);
        assert_eq!(doc.events().last().map(|e| e.kind), Some(EventKind::Blur));
    }

    fn doc_with_input(style: &str) -> (Document, NodeId) {
        let mut doc = Document::new("https://example.com/");
        let root = doc.root();
        let div = doc.create_element(root, "div", vec![("style".into(), style.into())]);
        let input = doc.create_element(div, "input", vec![("name".into(), "email".into())]);
        (doc, input)
    }

    #[test]
    fn visibility_follows_ancestor_styles() {
        let (doc, input) = doc_with_input("color: red");
        assert!(doc.is_visible(input));
        let (doc, input) = doc_with_input("display: none");
        assert!(!doc.is_visible(input));
        let (doc, input) = doc_with_input("visibility:hidden");
        assert!(!doc.is_visible(input));
        let (doc, input) = doc_with_input("opacity: 0");
        assert!(!doc.is_visible(input));
    }

    #[test]
    fn zero_box_and_hidden_inputs_are_invisible() {
        let mut doc = Document::new("about:blank");
        let root = doc.root();
        let a = doc.create_element(root, "input", vec![("style".into(), "width:0px".into())]);
        let b = doc.create_element(root, "input", vec![("type".into(), "hidden".into())]);
        let c = doc.create_element(root, "input", vec![("hidden".into(), String::new())]);
        assert!(!doc.is_visible(a));
        assert!(!doc.is_visible(b));
        assert!(!doc.is_visible(c));
    }

    #[test]
    fn tracker_only_sees_native_writes() {
        let (mut doc, input) = doc_with_input("");
        doc.bind_value_tracker(input).unwrap();

        doc.assign_value(input, "typed").unwrap();
        doc.dispatch(input, EventKind::Input);
        assert!(doc.framework_updates().is_empty());

        doc.set_value_native(input, "Ada").unwrap();
        doc.dispatch(input, EventKind::Input);
        assert_eq!(
            doc.framework_updates(),
            &[FrameworkUpdate { target: input, value: "Ada".into() }]
        );
    }

    #[test]
    fn radio_group_is_exclusive() {
        let mut doc = Document::new("about:blank");
        let root = doc.root();
        let attrs = |v: &str| {
            vec![
                ("type".to_string(), "radio".to_string()),
                ("name".to_string(), "sponsor".to_string()),
                ("value".to_string(), v.to_string()),
            ]
        };
        let yes = doc.create_element(root, "input", attrs("yes"));
        let no = doc.create_element(root, "input", attrs("no"));
        doc.set_checked(yes, true).unwrap();
        doc.set_checked(no, true).unwrap();
        assert!(!doc.checked(yes).unwrap());
        assert!(doc.checked(no).unwrap());
    }

    #[test]
    fn stale_references_stop_resolving() {
        let (mut doc, input) = doc_with_input("");
        let r = doc.element_ref(Vec::new(), input);
        assert!(doc.resolve(&r).is_some());
        doc.navigate(Document::new("https://example.com/next"));
        assert!(doc.resolve(&r).is_none());
    }
}
