use std::collections::{HashMap, HashSet};

use crate::config::DetectionConfig;
use crate::detection::context::associated_label;
use crate::detection::locate::{document_at, find_all, find_everywhere, Located};
use crate::detection::taxonomy::{self, is_job_application_field};
use crate::detection::types::{
    AnalysisSource, DetectionResult, ElementType, FieldDescriptor, FillInstruction, FillTarget,
    FillValue, FormScope, FormType,
};
use crate::dom::node::collapse_whitespace;
use crate::dom::{Document, NodeId, Selector};
use crate::profile::{ProfileValue, UserProfile};

/// Controls that count as fillable inputs for form-presence checks.
pub const INPUT_SELECTOR: &str =
    r#"input, select, textarea, [role="textbox"], [role="combobox"]"#;

pub const NO_FORM_MESSAGE: &str = "No form detected on this page";

pub const LOCAL_CONFIDENCE: f32 = 0.6;

pub struct FieldDetector {
    max_depth: usize,
    forms: Selector,
    inputs: Selector,
    passwords: Selector,
}

impl FieldDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_depth(config.max_traversal_depth)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            forms: parse_static("form"),
            inputs: parse_static(INPUT_SELECTOR),
            passwords: parse_static(r#"input[type="password"]"#),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Classify every visible control the taxonomy recognises.
    pub fn scan(&self, doc: &Document) -> Vec<FieldDescriptor> {
        let mut claimed: HashSet<(Vec<NodeId>, NodeId)> = HashSet::new();
        let mut counters: HashMap<&'static str, usize> = HashMap::new();
        let mut fields = Vec::new();

        for compiled in taxonomy::compiled() {
            let entry = compiled.entry;
            for (raw, selector) in &compiled.selectors {
                for hit in find_all(doc, selector, self.max_depth) {
                    let Some(owner) = document_at(doc, &hit.frames) else {
                        continue;
                    };
                    if !owner.is_visible(hit.node) {
                        continue;
                    }
                    if !claimed.insert((hit.frames.clone(), hit.node)) {
                        continue;
                    }
                    let index = counters.entry(entry.name).or_insert(0);
                    fields.push(FieldDescriptor {
                        key: format!("{}_{}", entry.name, index),
                        field_name: entry.name.to_string(),
                        source: entry.source,
                        element_type: element_type(owner, hit.node),
                        selector: raw.to_string(),
                        element: hit.to_ref(doc),
                    });
                    *index += 1;
                }
            }
        }

        tracing::debug!(count = fields.len(), "field scan complete");
        fields
    }

    /// Real forms, or one synthetic form spanning bare inputs. Empty when
    /// the page has neither.
    pub fn forms(&self, doc: &Document) -> Vec<FormScope> {
        let forms = find_everywhere(doc, &self.forms, self.max_depth);
        if forms.is_empty() {
            let inputs = find_everywhere(doc, &self.inputs, self.max_depth);
            if inputs.is_empty() {
                return Vec::new();
            }
            return vec![FormScope {
                synthetic: true,
                element: None,
                inputs: inputs.iter().map(|l| l.to_ref(doc)).collect(),
            }];
        }
        forms
            .iter()
            .map(|form| {
                let owner = document_at(doc, &form.frames);
                let inputs = owner
                    .map(|o| o.query_selector_all(form.node, &self.inputs))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|node| doc.element_ref(form.frames.clone(), node))
                    .collect();
                FormScope {
                    synthetic: false,
                    element: Some(form.to_ref(doc)),
                    inputs,
                }
            })
            .collect()
    }

    /// Markup sent to the remote analyser: each form's outer HTML separated
    /// by blank lines, or the bare inputs concatenated when there is no form.
    pub fn form_markup(&self, doc: &Document) -> String {
        let outer = |l: &Located| {
            document_at(doc, &l.frames)
                .map(|d| d.outer_html(l.node))
                .unwrap_or_default()
        };
        let forms = find_everywhere(doc, &self.forms, self.max_depth);
        if forms.is_empty() {
            return find_everywhere(doc, &self.inputs, self.max_depth)
                .iter()
                .map(outer)
                .collect();
        }
        forms.iter().map(|f| outer(f) + "\n\n").collect()
    }

    pub fn has_password_field(&self, doc: &Document) -> bool {
        !find_everywhere(doc, &self.passwords, self.max_depth).is_empty()
    }

    /// Full local detection pass: forms, fields and a fill plan from `profile`.
    pub fn detect(&self, doc: &Document, profile: &UserProfile) -> DetectionResult {
        let forms = self.forms(doc);
        if forms.is_empty() {
            tracing::info!(url = %doc.url(), "no forms or inputs on page");
            return DetectionResult::failure(NO_FORM_MESSAGE);
        }

        let fields = self.scan(doc);
        let instructions = build_instructions(doc, &fields, profile);
        let form_type = if fields.iter().any(|f| is_job_application_field(f.source)) {
            FormType::JobApplication
        } else if self.has_password_field(doc) {
            FormType::Registration
        } else {
            FormType::Other
        };

        tracing::info!(
            url = %doc.url(),
            forms = forms.len(),
            fields = fields.len(),
            instructions = instructions.len(),
            form_type = ?form_type,
            "local detection complete"
        );

        DetectionResult {
            success: true,
            field_count: fields.len(),
            form_type,
            confidence: LOCAL_CONFIDENCE,
            source: AnalysisSource::Local,
            message: format!(
                "Found {} fields ({}% confidence)",
                fields.len(),
                (LOCAL_CONFIDENCE * 100.0).round() as u32
            ),
            instructions,
            fields,
            forms,
        }
    }
}

fn parse_static(s: &str) -> Selector {
    match Selector::parse(s) {
        Ok(sel) => sel,
        Err(e) => unreachable!("built-in selector {s:?} failed to parse: {e}"),
    }
}

pub fn element_type(doc: &Document, id: NodeId) -> ElementType {
    let Some(el) = doc.element(id) else {
        return ElementType::Text;
    };
    match el.tag() {
        "select" => ElementType::Select,
        "input" => match el.input_type().as_str() {
            "checkbox" => ElementType::Checkbox,
            "radio" => ElementType::Radio,
            "file" => ElementType::File,
            _ => ElementType::Text,
        },
        "textarea" => ElementType::Text,
        _ if doc.is_content_editable(id) || el.attr("role") == Some("textbox") => {
            ElementType::ContentEditable
        }
        _ => ElementType::Text,
    }
}

/// Turn classified fields into a fill plan. Empty answers produce nothing.
pub fn build_instructions(
    doc: &Document,
    fields: &[FieldDescriptor],
    profile: &UserProfile,
) -> Vec<FillInstruction> {
    let mut out = Vec::new();
    for field in fields {
        let target = FillTarget::Element {
            element: field.element.clone(),
            label: field.key.clone(),
        };
        let answer = match (profile.value_of(field.source), field.element_type) {
            (ProfileValue::Upload(Some(file_name)), ElementType::File) => {
                out.push(FillInstruction::Upload {
                    target,
                    value: file_name,
                });
                continue;
            }
            (ProfileValue::Upload(_), _) | (_, ElementType::File) => continue,
            (ProfileValue::Text(t), _) if t.trim().is_empty() => continue,
            (ProfileValue::Text(t), _) => t,
            (ProfileValue::Bool(b), ElementType::Checkbox) => b.to_string(),
            (ProfileValue::Bool(b), _) => (if b { "Yes" } else { "No" }).to_string(),
        };

        let instruction = match field.element_type {
            ElementType::Select => FillInstruction::Select {
                target,
                value: answer,
            },
            ElementType::Radio => {
                let checked = doc
                    .resolve(&field.element)
                    .is_some_and(|owner| radio_matches(owner, field.element.node, &answer));
                FillInstruction::Fill {
                    target,
                    value: FillValue::Text(checked.to_string()),
                    field_type: Some("radio".into()),
                }
            }
            ElementType::Checkbox => FillInstruction::Fill {
                target,
                value: FillValue::Text(answer),
                field_type: Some("checkbox".into()),
            },
            ElementType::ContentEditable => FillInstruction::Fill {
                target,
                value: FillValue::Text(answer),
                field_type: Some("contenteditable".into()),
            },
            ElementType::Text | ElementType::File => {
                let field_type = doc
                    .resolve(&field.element)
                    .and_then(|owner| owner.element(field.element.node))
                    .map(|el| match el.tag() {
                        "input" => el.input_type(),
                        other => other.to_string(),
                    });
                FillInstruction::Fill {
                    target,
                    value: FillValue::Text(answer),
                    field_type,
                }
            }
        };
        out.push(instruction);
    }
    out
}

/// A radio answers `desired` when its value or label matches it,
/// case-insensitively, by equality or containment either way.
fn radio_matches(doc: &Document, radio: NodeId, desired: &str) -> bool {
    let desired = desired.trim().to_lowercase();
    if desired.is_empty() {
        return false;
    }
    let value = doc.attr(radio, "value").unwrap_or_default().to_string();
    let label = associated_label(doc, radio)
        .map(|l| collapse_whitespace(&doc.text_content(l)))
        .unwrap_or_default();
    [value, label]
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .any(|c| c == desired || c.contains(&desired) || desired.contains(&c))
}
