//! Wire shapes of the analysis service and validation of the plans it returns.

use serde::{Deserialize, Serialize};

use crate::detection::{ElementContext, FillInstruction, FillTarget, FillValue, FormType};
use crate::dom::Selector;
use crate::errors::{FormPilotError, FormPilotResult};
use crate::profile::UserProfile;

pub const MAX_SELECTOR_LEN: usize = 512;
pub const MAX_VALUE_LEN: usize = 4096;

#[derive(Debug, Serialize)]
pub struct AnalyzeFormRequest<'a> {
    pub html: &'a str,
    pub url: &'a str,
    pub user_profile: &'a UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub field_purpose: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub user_data_path: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub field_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeFormResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default = "unknown_form_type")]
    pub form_type: FormType,
    #[serde(default)]
    pub confidence: f32,
    /// Kept untyped until validated.
    #[serde(default)]
    pub instructions: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

fn unknown_form_type() -> FormType {
    FormType::Unknown
}

/// An instruction as the service sends it, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInstruction {
    pub action: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A validated remote plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlan {
    pub form_type: FormType,
    pub confidence: f32,
    pub field_count: usize,
    pub instructions: Vec<FillInstruction>,
}

impl RemotePlan {
    /// Validate a service response, whether it came back over HTTP or was
    /// pushed on the duplex channel.
    pub fn from_response(response: AnalyzeFormResponse, max_instructions: usize) -> FormPilotResult<Self> {
        if !response.success {
            return Err(FormPilotError::Remote(
                response.error.unwrap_or_else(|| "Failed to analyze form".into()),
            ));
        }
        let instructions = validate_instructions(&response.instructions, max_instructions)?;
        Ok(Self {
            form_type: response.form_type,
            confidence: response.confidence.clamp(0.0, 1.0),
            field_count: response.field_mappings.len(),
            instructions,
        })
    }
}

/// Result of asking the service to analyse a page. Transport and protocol
/// problems are folded into `Failed` so callers can fall back locally.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Plan(RemotePlan),
    Failed { message: String },
}

#[derive(Debug, Serialize)]
pub struct SmartDropdownRequest<'a> {
    pub dropdown_html: &'a str,
    pub options: &'a [String],
    pub desired_value: &'a str,
    pub context: &'a ElementContext,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmartDropdownResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub page_url: &'a str,
    pub page_context: &'a serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub action: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateRequest<'a> {
    pub text: &'a str,
    pub source_lang: &'a str,
    pub target_lang: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a pushed `next_action` asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Instruction(FillInstruction),
    /// Every mapped field has been handled.
    Complete { message: String },
}

/// Parse a `next_action` payload: either one instruction or the
/// `{"action":"complete"}` terminator.
pub fn parse_next_action(data: &serde_json::Value, max_instructions: usize) -> FormPilotResult<NextAction> {
    if data.get("action").and_then(|a| a.as_str()) == Some("complete") {
        let message = data
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        return Ok(NextAction::Complete { message });
    }
    let mut instructions = validate_instructions(std::slice::from_ref(data), max_instructions)?;
    instructions
        .pop()
        .map(NextAction::Instruction)
        .ok_or_else(|| FormPilotError::InvalidPlan("empty next action".into()))
}

/// The service's suggestion after a field failed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternativeStrategy {
    pub alternative_selector: String,
    pub alternative_action: String,
    #[serde(default)]
    pub reasoning: String,
}

impl AlternativeStrategy {
    /// Retry instruction for `failed`. Only `fill` and `click` can be acted
    /// on; keystroke, script and manual suggestions are refused.
    pub fn into_instruction(self, failed: Option<&FillInstruction>) -> FormPilotResult<FillInstruction> {
        let selector = self.alternative_selector;
        if selector.len() > MAX_SELECTOR_LEN {
            return Err(FormPilotError::InvalidPlan(format!(
                "selector longer than {MAX_SELECTOR_LEN} bytes"
            )));
        }
        Selector::parse(&selector)?;
        let target = FillTarget::Selector(selector);

        match self.alternative_action.as_str() {
            "fill" => {
                let failed = failed.ok_or_else(|| {
                    FormPilotError::InvalidPlan("no failed field to take a value from".into())
                })?;
                Ok(match failed {
                    FillInstruction::Fill { value, field_type, .. } => FillInstruction::Fill {
                        target,
                        value: value.clone(),
                        field_type: field_type.clone(),
                    },
                    FillInstruction::Select { value, .. } => FillInstruction::Select {
                        target,
                        value: value.clone(),
                    },
                    FillInstruction::Upload { value, .. } => FillInstruction::Upload {
                        target,
                        value: value.clone(),
                    },
                    FillInstruction::Click { .. } => FillInstruction::Click { target },
                })
            }
            "click" => Ok(FillInstruction::Click { target }),
            other @ ("keyboard" | "javascript" | "manual") => Err(FormPilotError::InvalidPlan(format!(
                "alternative action '{other}' is not supported"
            ))),
            other => Err(FormPilotError::InvalidPlan(format!("unknown alternative action '{other}'"))),
        }
    }
}

/// Check shape and size of every remote instruction. Any bad entry rejects
/// the whole plan.
pub fn validate_instructions(
    raw: &[serde_json::Value],
    max_instructions: usize,
) -> FormPilotResult<Vec<FillInstruction>> {
    if raw.len() > max_instructions {
        return Err(FormPilotError::InvalidPlan(format!(
            "{} instructions exceeds the limit of {max_instructions}",
            raw.len()
        )));
    }
    raw.iter()
        .enumerate()
        .map(|(i, value)| {
            let instr: RawInstruction = serde_json::from_value(value.clone())
                .map_err(|e| FormPilotError::InvalidPlan(format!("instruction {i}: {e}")))?;
            validate_one(instr).map_err(|reason| FormPilotError::InvalidPlan(format!("instruction {i}: {reason}")))
        })
        .collect()
}

fn validate_one(raw: RawInstruction) -> Result<FillInstruction, String> {
    let selector = raw.selector.ok_or("missing selector")?;
    if selector.len() > MAX_SELECTOR_LEN {
        return Err(format!("selector longer than {MAX_SELECTOR_LEN} bytes"));
    }
    Selector::parse(&selector).map_err(|e| e.to_string())?;
    let target = FillTarget::Selector(selector);

    let value = match raw.value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Bool(b)) => Some(FillValue::Bool(b)),
        Some(serde_json::Value::String(s)) => Some(FillValue::Text(s)),
        Some(serde_json::Value::Number(n)) => Some(FillValue::Text(n.to_string())),
        Some(other) => return Err(format!("unsupported value {other}")),
    };
    if let Some(FillValue::Text(s)) = &value {
        if s.len() > MAX_VALUE_LEN {
            return Err(format!("value longer than {MAX_VALUE_LEN} bytes"));
        }
    }
    let text_value = |v: Option<FillValue>| v.map(|v| v.as_text()).ok_or("missing value");

    match raw.action.as_str() {
        "fill" => Ok(FillInstruction::Fill {
            target,
            value: value.ok_or("missing value")?,
            field_type: raw.field_type,
        }),
        "select" => Ok(FillInstruction::Select {
            target,
            value: text_value(value)?,
        }),
        "click" => Ok(FillInstruction::Click { target }),
        "upload" => Ok(FillInstruction::Upload {
            target,
            value: value.map(|v| v.as_text()).unwrap_or_default(),
        }),
        other => Err(format!("unknown action '{other}'")),
    }
}
