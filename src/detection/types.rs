use serde::{Deserialize, Serialize};

use crate::dom::ElementRef;
use crate::profile::ProfileField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Select,
    Checkbox,
    Radio,
    #[serde(rename = "contenteditable")]
    ContentEditable,
    File,
}

/// One classified control, owned by the detection pass that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// `fieldName_index`, unique within one detection pass.
    pub key: String,
    pub field_name: String,
    #[serde(skip)]
    pub source: ProfileField,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    /// The taxonomy selector that matched.
    pub selector: String,
    pub element: ElementRef,
}

/// Where an instruction acts: a CSS selector from a remote plan, or an
/// element reference taken by local detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillTarget {
    Selector(String),
    Element { element: ElementRef, label: String },
}

impl FillTarget {
    /// Name used in logs and progress reports.
    pub fn describe(&self) -> &str {
        match self {
            Self::Selector(s) => s,
            Self::Element { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Bool(bool),
    Text(String),
}

impl FillValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for FillValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FillValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FillValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A single step of a fill plan. Consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FillInstruction {
    Fill {
        target: FillTarget,
        value: FillValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        field_type: Option<String>,
    },
    Select {
        target: FillTarget,
        value: String,
    },
    Click {
        target: FillTarget,
    },
    Upload {
        target: FillTarget,
        value: String,
    },
}

impl FillInstruction {
    pub fn target(&self) -> &FillTarget {
        match self {
            Self::Fill { target, .. }
            | Self::Select { target, .. }
            | Self::Click { target }
            | Self::Upload { target, .. } => target,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Fill { .. } => "fill",
            Self::Select { .. } => "select",
            Self::Click { .. } => "click",
            Self::Upload { .. } => "upload",
        }
    }

    pub fn value(&self) -> Option<FillValue> {
        match self {
            Self::Fill { value, .. } => Some(value.clone()),
            Self::Select { value, .. } | Self::Upload { value, .. } => {
                Some(FillValue::Text(value.clone()))
            }
            Self::Click { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    JobApplication,
    Registration,
    Other,
    #[serde(other)]
    Unknown,
}

/// A logical form: a real `<form>` element, or a synthetic one spanning
/// inputs that have no form wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormScope {
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementRef>,
    pub inputs: Vec<ElementRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub success: bool,
    pub field_count: usize,
    pub form_type: FormType,
    pub confidence: f32,
    pub source: AnalysisSource,
    pub message: String,
    pub instructions: Vec<FillInstruction>,
    pub fields: Vec<FieldDescriptor>,
    pub forms: Vec<FormScope>,
}

impl DetectionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            field_count: 0,
            form_type: FormType::Unknown,
            confidence: 0.0,
            source: AnalysisSource::Local,
            message: message.into(),
            instructions: Vec::new(),
            fields: Vec::new(),
            forms: Vec::new(),
        }
    }
}
