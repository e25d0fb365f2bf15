use std::time::Duration;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::detection::ElementContext;
use crate::errors::{FormPilotError, FormPilotResult};
use crate::fill::OptionMatcher;
use crate::profile::UserProfile;
use crate::remote::types::{
    AnalysisOutcome, AnalyzeFormRequest, AnalyzeFormResponse, ChatReply,
    ChatRequest, RemotePlan, SmartDropdownRequest, SmartDropdownResponse, TranslateRequest,
    TranslateResponse,
};

/// Produces a fill plan for a page. Never fails outright: problems become
/// `AnalysisOutcome::Failed`.
#[async_trait]
pub trait FormAnalyzer: Send + Sync {
    async fn analyze(&self, markup: &str, url: &str, profile: &UserProfile) -> AnalysisOutcome;
}

/// Free-form help from the service: page-aware chat and translation.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn chat(&self, message: &str, page_url: &str, page_context: &serde_json::Value) -> FormPilotResult<ChatReply>;

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> FormPilotResult<String>;
}

/// HTTP client for the analysis service.
pub struct RemoteAnalysisClient {
    base: url::Url,
    client: reqwest::Client,
    max_instructions: usize,
}

impl RemoteAnalysisClient {
    pub fn new(config: &BackendConfig) -> FormPilotResult<Self> {
        let base = config.base_url()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base,
            client,
            max_instructions: config.max_remote_instructions,
        })
    }

    /// `path` is relative to the configured base.
    fn endpoint(&self, path: &str) -> FormPilotResult<url::Url> {
        Ok(self.base.join(path)?)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> FormPilotResult<R>
    where
        B: serde::Serialize + ?Sized + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        tracing::debug!(url = %url, "posting to analysis service");
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FormPilotError::Remote(format!("{status}: {body}")));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn try_analyze(&self, markup: &str, url: &str, profile: &UserProfile) -> FormPilotResult<RemotePlan> {
        let request = AnalyzeFormRequest {
            html: markup,
            url,
            user_profile: profile,
        };
        let response: AnalyzeFormResponse = self.post("api/analyze-form", &request).await?;
        RemotePlan::from_response(response, self.max_instructions)
    }

    /// Ask the service which of `options` best answers `desired_value`.
    pub async fn smart_dropdown(
        &self,
        dropdown_html: &str,
        options: &[String],
        desired_value: &str,
        context: &ElementContext,
    ) -> FormPilotResult<Option<String>> {
        let request = SmartDropdownRequest {
            dropdown_html,
            options,
            desired_value,
            context,
        };
        let response: SmartDropdownResponse = self.post("api/smart-dropdown", &request).await?;
        if !response.success {
            return Err(FormPilotError::Remote(
                response.error.unwrap_or_else(|| "dropdown selection failed".into()),
            ));
        }
        tracing::debug!(
            selected = ?response.selected_option,
            confidence = response.confidence,
            "remote dropdown choice"
        );
        Ok(response.selected_option)
    }

    pub async fn chat(
        &self,
        message: &str,
        page_url: &str,
        page_context: &serde_json::Value,
    ) -> FormPilotResult<ChatReply> {
        let request = ChatRequest {
            message,
            page_url,
            page_context,
        };
        self.post("api/chat", &request).await
    }

    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> FormPilotResult<String> {
        let request = TranslateRequest {
            text,
            source_lang,
            target_lang,
        };
        let response: TranslateResponse = self.post("api/translate", &request).await?;
        if !response.success {
            return Err(FormPilotError::Remote(
                response.error.unwrap_or_else(|| "translation failed".into()),
            ));
        }
        Ok(response.translated_text)
    }
}

#[async_trait]
impl FormAnalyzer for RemoteAnalysisClient {
    async fn analyze(&self, markup: &str, url: &str, profile: &UserProfile) -> AnalysisOutcome {
        match self.try_analyze(markup, url, profile).await {
            Ok(plan) => {
                tracing::info!(
                    instructions = plan.instructions.len(),
                    confidence = plan.confidence,
                    form_type = ?plan.form_type,
                    "remote analysis accepted"
                );
                AnalysisOutcome::Plan(plan)
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote analysis unavailable");
                AnalysisOutcome::Failed {
                    message: format!("Analysis error: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl OptionMatcher for RemoteAnalysisClient {
    async fn choose(
        &self,
        dropdown_html: &str,
        options: &[String],
        desired: &str,
        context: &ElementContext,
    ) -> FormPilotResult<Option<String>> {
        self.smart_dropdown(dropdown_html, options, desired, context).await
    }
}

#[async_trait]
impl Assistant for RemoteAnalysisClient {
    async fn chat(&self, message: &str, page_url: &str, page_context: &serde_json::Value) -> FormPilotResult<ChatReply> {
        RemoteAnalysisClient::chat(self, message, page_url, page_context).await
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> FormPilotResult<String> {
        RemoteAnalysisClient::translate(self, text, source_lang, target_lang).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemoteAnalysisClient {
        let config = BackendConfig {
            url: server.uri(),
            request_timeout_secs: 5,
            max_remote_instructions: 3,
            ..BackendConfig::default()
        };
        RemoteAnalysisClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_validated_plan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze-form"))
            .and(body_partial_json(json!({"url": "https://jobs.example.com/apply"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "field_mappings": [{"selector": "#fn", "value": "Ada"}],
                "form_type": "job_application",
                "confidence": 0.9,
                "instructions": [{"action": "fill", "selector": "#fn", "value": "Ada"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .analyze("<form></form>", "https://jobs.example.com/apply", &UserProfile::default())
            .await;
        match outcome {
            AnalysisOutcome::Plan(plan) => {
                assert_eq!(plan.field_count, 1);
                assert_eq!(plan.instructions.len(), 1);
                assert_eq!(plan.form_type, crate::detection::FormType::JobApplication);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_and_plan_errors_become_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze-form"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "instructions": [
                    {"action": "click", "selector": "a"},
                    {"action": "click", "selector": "a"},
                    {"action": "click", "selector": "a"},
                    {"action": "click", "selector": "a"}
                ]
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);
        let outcome = client.analyze("<form></form>", "about:blank", &UserProfile::default()).await;
        assert!(matches!(outcome, AnalysisOutcome::Failed { .. }));

        let unreachable = RemoteAnalysisClient::new(&BackendConfig {
            url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 1,
            ..BackendConfig::default()
        })
        .unwrap();
        let outcome = unreachable.analyze("<form></form>", "about:blank", &UserProfile::default()).await;
        assert!(matches!(outcome, AnalysisOutcome::Failed { message } if message.starts_with("Analysis error")));
    }

    #[tokio::test]
    async fn base_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/formpilot/api/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "translated_text": "Bonjour"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = RemoteAnalysisClient::new(&BackendConfig {
            url: format!("{}/formpilot", server.uri()),
            request_timeout_secs: 5,
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(client.translate("Hello", "EN", "FR").await.unwrap(), "Bonjour");
    }

    #[tokio::test]
    async fn smart_dropdown_chat_and_translate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/smart-dropdown"))
            .and(body_partial_json(json!({"desired_value": "USA"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "selected_option": "United States", "confidence": 0.8
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "response": "Sure", "action": {"type": "fill_form"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "translated_text": "Hello"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = vec!["United States".to_string(), "Canada".to_string()];
        let chosen = client
            .smart_dropdown("<div></div>", &options, "USA", &ElementContext::default())
            .await
            .unwrap();
        assert_eq!(chosen.as_deref(), Some("United States"));

        let reply = client
            .chat("fill the form", "https://example.com", &json!({}))
            .await
            .unwrap();
        assert_eq!(reply.response, "Sure");
        assert!(reply.action.is_some());

        assert_eq!(client.translate("Hallo", "DE", "EN").await.unwrap(), "Hello");
    }
}
