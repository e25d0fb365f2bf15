use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{AppConfig, BackendConfig};
use crate::detection::{
    AnalysisSource, DetectionResult, FieldDetector, FieldDescriptor, FormType, MutationWatcher,
};
use crate::dom::{parse_document, Document, Selector};
use crate::errors::{FormPilotError, FormPilotResult};
use crate::fill::{FillOrchestrator, FillOutcome, FillReporter, OptionMatcher, SharedPage};
use crate::profile::{profile_or_first_run, settings_or_default, ProfileStore, Settings, UserProfile};
use crate::remote::types::{
    parse_next_action, AlternativeStrategy, AnalyzeFormResponse, ChatReply, NextAction,
};
use crate::remote::{
    AnalysisOutcome, Assistant, DuplexChannel, FormAnalyzer, InboundMessage, RemoteAnalysisClient,
    RemotePlan,
};
use crate::session::notify::Notifier;
use crate::session::page_analysis::{extract_text, ExtractedText, PageAnalysis, PageAnalyzer};

pub const DETECT_FIRST_MESSAGE: &str = "Please detect form first";

/// The optional remote pieces a session can be wired with.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub analyzer: Option<Arc<dyn FormAnalyzer>>,
    pub matcher: Option<Arc<dyn OptionMatcher>>,
    pub reporter: Option<Arc<dyn FillReporter>>,
    pub assistant: Option<Arc<dyn Assistant>>,
}

impl Collaborators {
    /// HTTP client plus duplex channel for `backend`. Nothing when the
    /// backend is disabled.
    pub fn connect(
        backend: &BackendConfig,
    ) -> FormPilotResult<(Self, Option<mpsc::UnboundedReceiver<InboundMessage>>)> {
        if !backend.enabled {
            tracing::info!("remote analysis disabled; running local-only");
            return Ok((Self::default(), None));
        }
        let client = Arc::new(RemoteAnalysisClient::new(backend)?);
        let (channel, inbound) = DuplexChannel::spawn(backend.ws_url()?, backend.reconnect_delay());
        tracing::info!(backend = %backend.url, "remote collaborators configured");
        Ok((
            Self {
                analyzer: Some(client.clone()),
                matcher: Some(client.clone()),
                assistant: Some(client),
                reporter: Some(Arc::new(channel)),
            },
            Some(inbound),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub field_count: usize,
    pub form_type: FormType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub title: String,
    pub has_form: bool,
    pub input_count: usize,
    pub current_analysis: Option<AnalysisSummary>,
}

/// Everything tied to one page: the document, the last detection, the fill
/// guard and the collaborators. Replaced wholesale by nothing; navigation
/// swaps the document inside it.
pub struct PageSession {
    id: Uuid,
    page: SharedPage,
    store: Arc<dyn ProfileStore>,
    detector: FieldDetector,
    watcher: MutationWatcher,
    analyzer: Option<Arc<dyn FormAnalyzer>>,
    assistant: Option<Arc<dyn Assistant>>,
    orchestrator: Arc<FillOrchestrator>,
    notifier: Notifier,
    max_remote_instructions: usize,
    auto_detect: bool,
    last: Mutex<Option<DetectionResult>>,
    content: Mutex<PageAnalyzer>,
}

impl PageSession {
    pub fn new(
        document: Document,
        config: &AppConfig,
        store: Arc<dyn ProfileStore>,
        collaborators: Collaborators,
    ) -> Self {
        let page: SharedPage = Arc::new(Mutex::new(document));
        let notifier = Notifier::new();
        let mut orchestrator = FillOrchestrator::new(
            page.clone(),
            config.fill.clone(),
            config.detection.max_traversal_depth,
            notifier.clone(),
        );
        if let Some(matcher) = collaborators.matcher {
            orchestrator = orchestrator.with_matcher(matcher);
        }
        if let Some(reporter) = collaborators.reporter {
            orchestrator = orchestrator.with_reporter(reporter);
        }
        let id = Uuid::new_v4();
        tracing::info!(session = %id, remote = collaborators.analyzer.is_some(), "page session created");

        Self {
            id,
            page,
            store,
            detector: FieldDetector::new(&config.detection),
            watcher: MutationWatcher::new(),
            analyzer: collaborators.analyzer,
            assistant: collaborators.assistant,
            orchestrator: Arc::new(orchestrator),
            notifier,
            max_remote_instructions: config.backend.max_remote_instructions,
            auto_detect: config.detection.auto_detect,
            last: Mutex::new(None),
            content: Mutex::new(PageAnalyzer::new(&Default::default())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn page(&self) -> SharedPage {
        self.page.clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_filling(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub async fn last_detection(&self) -> Option<DetectionResult> {
        self.last.lock().await.clone()
    }

    /// Detect forms and build a plan. The remote analyzer is preferred when
    /// configured; any failure there falls back to the local taxonomy.
    pub async fn detect(&self) -> DetectionResult {
        let profile = profile_or_first_run(self.store.as_ref()).await;
        let (local, markup, url) = {
            let doc = self.page.lock().await;
            (
                self.detector.detect(&doc, &profile),
                self.detector.form_markup(&doc),
                doc.url().to_string(),
            )
        };

        let result = match (&self.analyzer, local.success) {
            (Some(analyzer), true) => match analyzer.analyze(&markup, &url, &profile).await {
                AnalysisOutcome::Plan(plan) => with_remote_plan(local, plan),
                AnalysisOutcome::Failed { message } => {
                    tracing::warn!(session = %self.id, reason = %message, "falling back to local detection");
                    local
                }
            },
            _ => local,
        };

        tracing::info!(
            session = %self.id,
            success = result.success,
            fields = result.field_count,
            source = ?result.source,
            "detection finished"
        );
        *self.last.lock().await = Some(result.clone());
        result
    }

    /// Fill using the last successful detection. Errors only when there is none.
    pub async fn fill(&self) -> FormPilotResult<FillOutcome> {
        let snapshot = self
            .last
            .lock()
            .await
            .as_ref()
            .filter(|r| r.success)
            .map(|r| r.instructions.clone());
        let Some(instructions) = snapshot else {
            self.notifier.warning(DETECT_FIRST_MESSAGE);
            return Err(FormPilotError::Fill(DETECT_FIRST_MESSAGE.into()));
        };
        Ok(self.orchestrator.fill(instructions).await)
    }

    /// Replace the page, as a navigation would. The previous detection is
    /// dropped; with auto-detect on, the new page is detected straight away.
    pub async fn load_page(&self, html: &str, url: &str) -> FormPilotResult<Option<DetectionResult>> {
        let next = parse_document(html, url)?;
        self.page.lock().await.navigate(next);
        *self.last.lock().await = None;
        tracing::info!(session = %self.id, url, "page loaded");
        if !self.auto_detect {
            return Ok(None);
        }
        let result = self.detect().await;
        if result.success {
            self.notifier
                .success(format!("Auto-detected: {} fields ready to fill!", result.field_count));
        }
        Ok(Some(result))
    }

    /// Drain pending mutations and re-detect when new form controls appeared.
    pub async fn observe_mutations(&self) -> Option<DetectionResult> {
        let redetect = {
            let mut doc = self.page.lock().await;
            let records = doc.take_mutations();
            self.watcher.should_redetect(&doc, &records)
        };
        if !(redetect && self.auto_detect) {
            return None;
        }
        tracing::info!(session = %self.id, "new form content; re-detecting");
        Some(self.detect().await)
    }

    /// Insert `html` at the end of the first element matching `selector`, as a
    /// script-rendered form would appear, then run the mutation check.
    pub async fn append_html(&self, selector: &str, html: &str) -> FormPilotResult<(usize, Option<DetectionResult>)> {
        let parsed = Selector::parse(selector)?;
        let added = {
            let mut doc = self.page.lock().await;
            let parent = doc
                .query_selector(doc.root(), &parsed)
                .ok_or_else(|| FormPilotError::Dom(format!("no element matches '{selector}'")))?;
            doc.append_html(parent, html)?.len()
        };
        tracing::debug!(session = %self.id, selector, added, "content appended");
        Ok((added, self.observe_mutations().await))
    }

    /// Fresh classification of the current page without building a plan.
    pub async fn form_fields(&self) -> Vec<FieldDescriptor> {
        let doc = self.page.lock().await;
        self.detector.scan(&doc)
    }

    pub async fn page_context(&self) -> FormPilotResult<PageContext> {
        let current_analysis = self
            .last
            .lock()
            .await
            .as_ref()
            .filter(|r| r.success)
            .map(|r| AnalysisSummary {
                field_count: r.field_count,
                form_type: r.form_type,
            });
        let doc = self.page.lock().await;
        let forms = Selector::parse("form")?;
        let inputs = Selector::parse("input, select, textarea")?;
        Ok(PageContext {
            title: doc.title().to_string(),
            has_form: doc.query_selector(doc.root(), &forms).is_some(),
            input_count: doc.query_selector_all(doc.root(), &inputs).len(),
            current_analysis,
        })
    }

    pub async fn user_profile(&self) -> UserProfile {
        profile_or_first_run(self.store.as_ref()).await
    }

    /// Replace the top-level profile sections present in `patch` and persist
    /// the whole record.
    pub async fn update_profile(&self, patch: &serde_json::Value) -> FormPilotResult<UserProfile> {
        let current = self.user_profile().await;
        let updated = current.merge_sections(patch)?;
        self.store.save_profile(&updated).await?;
        tracing::info!(session = %self.id, "profile updated");
        Ok(updated)
    }

    pub async fn settings(&self) -> Settings {
        settings_or_default(self.store.as_ref()).await
    }

    /// Persist the whole settings record, stamped with the save time.
    pub async fn save_settings(&self, mut settings: Settings) -> FormPilotResult<Settings> {
        settings.last_updated = Some(chrono::Utc::now());
        self.store.save_settings(&settings).await?;
        self.content.lock().await.refresh(&settings);
        tracing::info!(session = %self.id, mode = %settings.mode, "settings saved");
        Ok(settings)
    }

    fn assistant(&self) -> FormPilotResult<&Arc<dyn Assistant>> {
        self.assistant
            .as_ref()
            .ok_or_else(|| FormPilotError::Remote("remote assistant is not configured".into()))
    }

    /// Ask the service about the current page.
    pub async fn chat(&self, message: &str) -> FormPilotResult<ChatReply> {
        let assistant = self.assistant()?;
        let context = serde_json::to_value(self.page_context().await?)?;
        let url = self.page.lock().await.url().to_string();
        assistant.chat(message, &url, &context).await
    }

    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> FormPilotResult<String> {
        self.assistant()?.translate(text, source_lang, target_lang).await
    }

    pub async fn highlight_keywords(&self) -> FormPilotResult<usize> {
        let settings = settings_or_default(self.store.as_ref()).await;
        let mut content = self.content.lock().await;
        content.refresh(&settings);
        let mut doc = self.page.lock().await;
        content.highlight(&mut doc, &settings)
    }

    pub async fn analyze_page(&self) -> FormPilotResult<PageAnalysis> {
        let settings = settings_or_default(self.store.as_ref()).await;
        let mut content = self.content.lock().await;
        content.refresh(&settings);
        let doc = self.page.lock().await;
        content.analyze(&doc)
    }

    pub async fn extract_text(&self) -> ExtractedText {
        extract_text(&*self.page.lock().await)
    }

    /// React to a message pushed by the analysis service.
    pub async fn handle_inbound(&self, message: InboundMessage) {
        match message {
            InboundMessage::FormAnalysis { data } => {
                match serde_json::from_value::<AnalyzeFormResponse>(data)
                    .map_err(FormPilotError::from)
                    .and_then(|r| RemotePlan::from_response(r, self.max_remote_instructions))
                {
                    Ok(plan) => {
                        let profile = profile_or_first_run(self.store.as_ref()).await;
                        let local = {
                            let doc = self.page.lock().await;
                            self.detector.detect(&doc, &profile)
                        };
                        tracing::info!(session = %self.id, instructions = plan.instructions.len(), "pushed form analysis stored");
                        *self.last.lock().await = Some(with_remote_plan(local, plan));
                    }
                    Err(e) => tracing::warn!(session = %self.id, error = %e, "pushed form analysis rejected"),
                }
            }
            InboundMessage::NextAction { data } => match parse_next_action(&data, self.max_remote_instructions) {
                Ok(NextAction::Instruction(instruction)) => {
                    let outcome = self.orchestrator.fill(vec![instruction]).await;
                    tracing::info!(session = %self.id, ?outcome, "pushed instruction applied");
                }
                Ok(NextAction::Complete { message }) => {
                    tracing::info!(session = %self.id, message = %message, "service reports the form complete");
                }
                Err(e) => tracing::warn!(session = %self.id, error = %e, "pushed instruction rejected"),
            },
            InboundMessage::AlternativeStrategy { data } => {
                let failed = self.orchestrator.last_failed().await;
                match serde_json::from_value::<AlternativeStrategy>(data)
                    .map_err(FormPilotError::from)
                    .and_then(|alt| {
                        tracing::debug!(session = %self.id, reasoning = %alt.reasoning, "alternative strategy received");
                        alt.into_instruction(failed.as_ref())
                    }) {
                    Ok(instruction) => {
                        let outcome = self.orchestrator.fill(vec![instruction]).await;
                        tracing::info!(session = %self.id, ?outcome, "alternative strategy applied");
                    }
                    Err(e) => tracing::warn!(session = %self.id, error = %e, "alternative strategy rejected"),
                }
            }
            InboundMessage::Ack { field, status } => {
                tracing::debug!(session = %self.id, field = %field, ?status, "field acknowledged");
            }
        }
    }

    /// Feed inbound channel messages to this session until the channel closes.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                session.handle_inbound(message).await;
            }
            tracing::debug!(session = %session.id, "inbound channel closed");
        })
    }
}

/// A remote plan in place of the local one. Local fields and forms are kept
/// for reference.
fn with_remote_plan(local: DetectionResult, plan: RemotePlan) -> DetectionResult {
    DetectionResult {
        success: true,
        field_count: plan.field_count,
        form_type: plan.form_type,
        confidence: plan.confidence,
        source: AnalysisSource::Remote,
        message: format!(
            "Found {} fields ({}% confidence)",
            plan.field_count,
            (plan.confidence * 100.0).round() as u32
        ),
        instructions: plan.instructions,
        fields: local.fields,
        forms: local.forms,
    }
}
