//! `{action, ...}` request routing for a page session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::detection::DetectionResult;
use crate::errors::FormPilotError;
use crate::fill::FillOutcome;
use crate::profile::Settings;
use crate::session::page_session::PageSession;

pub const UNKNOWN_ACTION: &str = "Unknown action";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    DetectForm,
    FillForm,
    GetUserData,
    UpdateUserData {
        data: Value,
    },
    GetPageContext,
    #[serde(rename = "highlightAI")]
    HighlightAi,
    AnalyzePage,
    ExtractText,
    GetFormFields,
    LoadPage {
        html: String,
        #[serde(default = "blank_url")]
        url: String,
    },
    /// Script-style insertion into the live page; re-detects when new
    /// controls appear.
    AppendHtml {
        selector: String,
        html: String,
    },
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
    Chat {
        message: String,
    },
    Translate {
        text: String,
        #[serde(rename = "sourceLang")]
        source_lang: String,
        #[serde(rename = "targetLang", default = "english")]
        target_lang: String,
    },
}

const KNOWN_ACTIONS: &[&str] = &[
    "detectForm",
    "fillForm",
    "getUserData",
    "updateUserData",
    "getPageContext",
    "highlightAI",
    "analyzePage",
    "extractText",
    "getFormFields",
    "loadPage",
    "appendHtml",
    "getSettings",
    "saveSettings",
    "chat",
    "translate",
];

fn blank_url() -> String {
    "about:blank".into()
}

fn english() -> String {
    "EN".into()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectionSummary<'a> {
    success: bool,
    field_count: usize,
    form_type: crate::detection::FormType,
    confidence: f32,
    source: crate::detection::AnalysisSource,
    message: &'a str,
}

impl<'a> From<&'a DetectionResult> for DetectionSummary<'a> {
    fn from(r: &'a DetectionResult) -> Self {
        Self {
            success: r.success,
            field_count: r.field_count,
            form_type: r.form_type,
            confidence: r.confidence,
            source: r.source,
            message: &r.message,
        }
    }
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// `{success: true}` merged with the fields of `body`.
fn success(body: Value) -> Value {
    let mut out = json!({ "success": true });
    if let (Some(target), Value::Object(fields)) = (out.as_object_mut(), body) {
        target.extend(fields);
    }
    out
}

fn to_value(body: impl Serialize) -> Result<Value, FormPilotError> {
    Ok(serde_json::to_value(body)?)
}

/// Answer one request. Never fails: problems become `{success: false, error}`.
pub async fn handle_message(session: &PageSession, raw: Value) -> Value {
    let action = raw
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let request: Request = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) if KNOWN_ACTIONS.contains(&action.as_str()) => {
            tracing::warn!(action = %action, error = %e, "malformed request");
            return failure(format!("Invalid request: {e}"));
        }
        Err(_) => {
            tracing::warn!(action = %action, "unknown action");
            return failure(UNKNOWN_ACTION);
        }
    };
    tracing::debug!(action = %action, session = %session.id(), "handling request");

    let response = match request {
        Request::DetectForm => {
            let result = session.detect().await;
            to_value(DetectionSummary::from(&result))
        }
        Request::FillForm => match session.fill().await {
            Ok(outcome) => match &outcome {
                FillOutcome::Completed { .. } => Ok(success(json!({ "outcome": outcome }))),
                FillOutcome::Rejected => return failure("Form fill already in progress"),
                FillOutcome::Aborted { reason, .. } => {
                    return json!({ "success": false, "error": reason, "outcome": outcome })
                }
            },
            Err(FormPilotError::Fill(message)) => return failure(message),
            Err(e) => Err(e),
        },
        Request::GetUserData => {
            let profile = session.user_profile().await;
            to_value(&profile).map(|data| success(json!({ "data": data })))
        }
        Request::UpdateUserData { data } => session
            .update_profile(&data)
            .await
            .map(|_| success(json!({}))),
        Request::GetPageContext => session
            .page_context()
            .await
            .and_then(to_value)
            .map(success),
        Request::HighlightAi => session
            .highlight_keywords()
            .await
            .map(|count| success(json!({ "highlighted": count }))),
        Request::AnalyzePage => session
            .analyze_page()
            .await
            .and_then(to_value)
            .map(|analysis| success(json!({ "analysis": analysis }))),
        Request::ExtractText => {
            let extracted = session.extract_text().await;
            Ok(success(json!({ "text": extracted.text, "cleanText": extracted.clean_text })))
        }
        Request::GetFormFields => to_value(session.form_fields().await)
            .map(|fields| success(json!({ "fields": fields }))),
        Request::LoadPage { html, url } => match session.load_page(&html, &url).await {
            Ok(Some(result)) => to_value(DetectionSummary::from(&result))
                .map(|detection| success(json!({ "detection": detection }))),
            Ok(None) => Ok(success(json!({}))),
            Err(e) => Err(e),
        },
        Request::AppendHtml { selector, html } => match session.append_html(&selector, &html).await {
            Ok((added, Some(result))) => to_value(DetectionSummary::from(&result))
                .map(|detection| success(json!({ "added": added, "detection": detection }))),
            Ok((added, None)) => Ok(success(json!({ "added": added }))),
            Err(e) => Err(e),
        },
        Request::GetSettings => to_value(session.settings().await)
            .map(|settings| success(json!({ "settings": settings }))),
        Request::SaveSettings { settings } => session
            .save_settings(settings)
            .await
            .and_then(to_value)
            .map(|settings| success(json!({ "settings": settings }))),
        Request::Chat { message } => session
            .chat(&message)
            .await
            .and_then(to_value)
            .map(|reply| success(json!({ "reply": reply }))),
        Request::Translate {
            text,
            source_lang,
            target_lang,
        } => session
            .translate(&text, &source_lang, &target_lang)
            .await
            .map(|translated| success(json!({ "translatedText": translated }))),
    };

    response.unwrap_or_else(|e| {
        tracing::warn!(action = %action, error = %e, "request failed");
        failure(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_action() {
        let parse = |v: Value| serde_json::from_value::<Request>(v).unwrap();
        assert_eq!(parse(json!({"action": "detectForm"})), Request::DetectForm);
        assert_eq!(parse(json!({"action": "highlightAI"})), Request::HighlightAi);
        assert_eq!(
            parse(json!({"action": "loadPage", "html": "<form></form>"})),
            Request::LoadPage {
                html: "<form></form>".into(),
                url: "about:blank".into()
            }
        );
        assert!(matches!(
            parse(json!({"action": "updateUserData", "data": {"resume": {}}})),
            Request::UpdateUserData { .. }
        ));
        assert_eq!(
            parse(json!({"action": "translate", "text": "Hallo", "sourceLang": "DE"})),
            Request::Translate {
                text: "Hallo".into(),
                source_lang: "DE".into(),
                target_lang: "EN".into()
            }
        );
        assert!(matches!(
            parse(json!({"action": "saveSettings", "settings": {"mode": "advanced"}})),
            Request::SaveSettings { settings } if settings.mode == "advanced" && settings.highlight_color == "#ffeb3b"
        ));
        assert_eq!(KNOWN_ACTIONS.len(), 15);
    }

    #[test]
    fn success_merges_body() {
        let v = success(json!({"text": "hi"}));
        assert_eq!(v, json!({"success": true, "text": "hi"}));
    }
}
