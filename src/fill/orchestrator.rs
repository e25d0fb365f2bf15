//! Applies a fill plan to the page, one instruction at a time, with
//! user-like pacing. At most one batch runs per orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::FillConfig;
use crate::detection::{element_context, locate, FillInstruction, FillTarget, FillValue};
use crate::dom::{Document, ElementRef, EventKind, NodeId, Selector};
use crate::errors::{FormPilotError, FormPilotResult};
use crate::fill::coerce::truthy;
use crate::fill::custom_dropdown::{self, OptionMatcher};
use crate::fill::native_select::select_native;
use crate::session::notify::Notifier;

/// The live page shared between detection, fill and the host.
pub type SharedPage = Arc<Mutex<Document>>;

/// Receives per-field progress while a batch runs.
pub trait FillReporter: Send + Sync {
    fn field_filled(&self, field: &str, value: Option<&FillValue>);
    fn field_failed(&self, error: &str, instruction: &FillInstruction);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FillOutcome {
    Completed {
        filled: usize,
        skipped: usize,
        failed: usize,
    },
    /// Another batch was already running; nothing was touched.
    Rejected,
    /// The page navigated mid-batch. Instructions after `filled` never ran.
    Aborted { filled: usize, reason: String },
}

enum Step {
    Applied,
    Missing,
}

/// Releases the busy flag however the batch ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Select,
    Toggle,
    Editable,
    Text,
}

pub struct FillOrchestrator {
    page: SharedPage,
    config: FillConfig,
    max_depth: usize,
    busy: AtomicBool,
    notifier: Notifier,
    reporter: Option<Arc<dyn FillReporter>>,
    matcher: Option<Arc<dyn OptionMatcher>>,
    last_failed: Mutex<Option<FillInstruction>>,
}

impl FillOrchestrator {
    pub fn new(page: SharedPage, config: FillConfig, max_depth: usize, notifier: Notifier) -> Self {
        Self {
            page,
            config,
            max_depth,
            busy: AtomicBool::new(false),
            notifier,
            reporter: None,
            matcher: None,
            last_failed: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FillReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Consulted first for every custom dropdown.
    pub fn with_matcher(mut self, matcher: Arc<dyn OptionMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// The most recent instruction that failed, as reported to the service.
    pub async fn last_failed(&self) -> Option<FillInstruction> {
        self.last_failed.lock().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Run `instructions` in order. A missing element or a failing field is
    /// logged and skipped; navigation aborts the rest of the batch.
    pub async fn fill(&self, instructions: Vec<FillInstruction>) -> FillOutcome {
        // Taken before the first await so a concurrent call sees it.
        let Some(_guard) = self.try_acquire() else {
            tracing::warn!("fill already in progress; request ignored");
            return FillOutcome::Rejected;
        };

        self.notifier.info("Starting intelligent form fill...");
        let generation = self.page.lock().await.generation();
        tracing::info!(count = instructions.len(), generation, "fill batch started");

        let (mut filled, mut skipped, mut failed) = (0, 0, 0);
        let total = instructions.len();
        for (i, instruction) in instructions.iter().enumerate() {
            let field = instruction.target().describe();
            match self.apply(instruction, generation).await {
                Ok(Step::Applied) => {
                    filled += 1;
                    tracing::info!(action = instruction.action(), field, "field filled");
                    if let Some(reporter) = &self.reporter {
                        reporter.field_filled(field, instruction.value().as_ref());
                    }
                }
                Ok(Step::Missing) => {
                    skipped += 1;
                    tracing::warn!(field, "element not found; skipping");
                }
                Err(FormPilotError::Navigated) => {
                    let reason = FormPilotError::Navigated.to_string();
                    tracing::warn!(filled, remaining = total - i, "fill batch aborted");
                    self.notifier.error(format!("Error: {reason}"));
                    return FillOutcome::Aborted { filled, reason };
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(field, error = %e, "field failed");
                    *self.last_failed.lock().await = Some(instruction.clone());
                    if let Some(reporter) = &self.reporter {
                        reporter.field_failed(&e.to_string(), instruction);
                    }
                }
            }
            if i + 1 < total {
                pause(self.config.field_delay_ms).await;
            }
        }

        tracing::info!(filled, skipped, failed, "fill batch finished");
        self.notifier.success("Form filled successfully!");
        FillOutcome::Completed {
            filled,
            skipped,
            failed,
        }
    }

    async fn apply(&self, instruction: &FillInstruction, generation: u64) -> FormPilotResult<Step> {
        let Some(target) = self.resolve(instruction.target(), generation).await? else {
            return Ok(Step::Missing);
        };

        self.with_element(&target, generation, |doc, node| {
            doc.scroll_into_view(node);
            Ok(())
        })
        .await?;
        pause(self.config.settle_delay_ms).await;

        match instruction {
            FillInstruction::Fill { value, .. } => self.fill_field(&target, generation, value).await?,
            FillInstruction::Select { value, .. } => self.select(&target, generation, value).await?,
            FillInstruction::Click { .. } => {
                self.with_element(&target, generation, |doc, node| doc.click(node))
                    .await?;
                pause(self.config.click_delay_ms).await;
            }
            FillInstruction::Upload { value, .. } => self.upload(&target, generation, value).await?,
        }
        Ok(Step::Applied)
    }

    async fn resolve(&self, target: &FillTarget, generation: u64) -> FormPilotResult<Option<ElementRef>> {
        let page = self.page.lock().await;
        if page.generation() != generation {
            return Err(FormPilotError::Navigated);
        }
        match target {
            FillTarget::Selector(raw) => {
                let selector = Selector::parse(raw)?;
                Ok(locate::find_first(&page, &selector, self.max_depth).map(|l| l.to_ref(&page)))
            }
            FillTarget::Element { element, .. } => {
                if page.resolve(element).is_none() {
                    tracing::debug!(?element, "stale element reference");
                    return Ok(None);
                }
                Ok(Some(element.clone()))
            }
        }
    }

    /// Lock the page and run `f` against the element's own document.
    async fn with_element<R>(
        &self,
        target: &ElementRef,
        generation: u64,
        f: impl FnOnce(&mut Document, NodeId) -> FormPilotResult<R>,
    ) -> FormPilotResult<R> {
        let mut page = self.page.lock().await;
        if page.generation() != generation {
            return Err(FormPilotError::Navigated);
        }
        let doc = page
            .resolve_mut(target)
            .ok_or_else(|| FormPilotError::Fill(format!("{:?} is no longer attached", target.node)))?;
        f(doc, target.node)
    }

    async fn fill_field(&self, target: &ElementRef, generation: u64, value: &FillValue) -> FormPilotResult<()> {
        let control = self
            .with_element(target, generation, |doc, node| {
                doc.focus(node);
                Ok(classify(doc, node))
            })
            .await?;
        pause(self.config.focus_delay_ms).await;

        match control {
            Control::Select => {
                self.with_element(target, generation, |doc, node| {
                    select_native(doc, node, &value.as_text()).map(|_| ())
                })
                .await
            }
            Control::Toggle => {
                let checked = truthy(value);
                self.with_element(target, generation, |doc, node| {
                    doc.set_checked(node, checked)?;
                    doc.dispatch(node, EventKind::Change);
                    Ok(())
                })
                .await
            }
            Control::Editable => {
                let text = value.as_text();
                self.with_element(target, generation, |doc, node| {
                    doc.set_text_content(node, &text)?;
                    doc.dispatch(node, EventKind::Input);
                    doc.dispatch(node, EventKind::Change);
                    Ok(())
                })
                .await
            }
            Control::Text => {
                self.with_element(target, generation, |doc, node| doc.assign_value(node, ""))
                    .await?;
                pause(self.config.clear_delay_ms).await;
                let text = value.as_text();
                self.with_element(target, generation, |doc, node| {
                    // Native setter, so framework trackers see the events below as a change.
                    doc.set_value_native(node, &text)?;
                    doc.dispatch(node, EventKind::Input);
                    doc.dispatch(node, EventKind::Change);
                    doc.dispatch(node, EventKind::Blur);
                    Ok(())
                })
                .await
            }
        }
    }

    async fn select(&self, target: &ElementRef, generation: u64, desired: &str) -> FormPilotResult<()> {
        let native = self
            .with_element(target, generation, |doc, node| Ok(doc.tag_name(node) == Some("select")))
            .await?;
        if native {
            return self
                .with_element(target, generation, |doc, node| select_native(doc, node, desired).map(|_| ()))
                .await;
        }

        self.with_element(target, generation, |doc, node| {
            let trigger = custom_dropdown::trigger_for(doc, node);
            doc.click(trigger)
        })
        .await?;
        pause(self.config.dropdown_open_delay_ms).await;

        let (options, texts, markup, context) = self
            .with_element(target, generation, |doc, node| {
                let options = custom_dropdown::visible_options(doc);
                let texts = custom_dropdown::option_texts(doc, &options);
                Ok((options, texts, doc.outer_html(node), element_context(doc, node)))
            })
            .await?;
        if options.is_empty() {
            tracing::warn!(desired, "dropdown opened but no options are visible");
            return Ok(());
        }

        let mut choice = None;
        if let Some(matcher) = &self.matcher {
            match matcher.choose(&markup, &texts, desired, &context).await {
                Ok(Some(picked)) => choice = texts.iter().position(|t| *t == picked),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "option matcher failed; using local match"),
            }
        }
        let choice = choice
            .or_else(|| custom_dropdown::unique_exact(&texts, desired))
            .or_else(|| custom_dropdown::fuzzy(&texts, desired));

        let Some(index) = choice else {
            tracing::info!(desired, options = texts.len(), "no dropdown option matched; left unselected");
            return Ok(());
        };
        let option = options[index];
        self.with_element(target, generation, |doc, _| doc.click(option))
            .await?;
        pause(self.config.click_delay_ms).await;
        tracing::debug!(option = %texts[index], "dropdown option clicked");
        Ok(())
    }

    /// Browsers never let a script set a file input, so the user is asked to
    /// pick the file and the chooser is opened for them.
    async fn upload(&self, target: &ElementRef, generation: u64, file_name: &str) -> FormPilotResult<()> {
        let is_file = self
            .with_element(target, generation, |doc, node| {
                Ok(doc.element(node).map(|e| e.input_type() == "file" && e.tag() == "input").unwrap_or(false))
            })
            .await?;
        if !is_file {
            return Err(FormPilotError::Fill("upload target is not a file input".into()));
        }
        if file_name.is_empty() {
            self.notifier.info("Please click to select your file");
        } else {
            self.notifier.info(format!("Please click to select your file ({file_name})"));
        }
        self.with_element(target, generation, |doc, node| doc.click(node))
            .await
    }
}

fn classify(doc: &Document, node: NodeId) -> Control {
    let Some(el) = doc.element(node) else {
        return Control::Text;
    };
    if el.tag() == "select" {
        return Control::Select;
    }
    if el.tag() == "input" && matches!(el.input_type().as_str(), "checkbox" | "radio") {
        return Control::Toggle;
    }
    if doc.is_content_editable(node) || el.attr("role") == Some("textbox") {
        return Control::Editable;
    }
    Control::Text
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;
    use crate::session::notify::NotificationLevel;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn page(html: &str) -> SharedPage {
        Arc::new(Mutex::new(parse_document(html, "https://jobs.example.com/apply").unwrap()))
    }

    fn orchestrator(page: &SharedPage, config: FillConfig) -> FillOrchestrator {
        FillOrchestrator::new(page.clone(), config, 16, Notifier::new())
    }

    fn fill(selector: &str, value: impl Into<FillValue>) -> FillInstruction {
        FillInstruction::Fill {
            target: FillTarget::Selector(selector.into()),
            value: value.into(),
            field_type: None,
        }
    }

    async fn node(page: &SharedPage, selector: &str) -> NodeId {
        let doc = page.lock().await;
        doc.query_selector(doc.root(), &Selector::parse(selector).unwrap()).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        filled: StdMutex<Vec<String>>,
        failed: StdMutex<Vec<String>>,
    }

    impl FillReporter for Recorder {
        fn field_filled(&self, field: &str, _value: Option<&FillValue>) {
            self.filled.lock().unwrap().push(field.to_string());
        }
        fn field_failed(&self, error: &str, _instruction: &FillInstruction) {
            self.failed.lock().unwrap().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn text_fill_fires_events_and_reaches_framework() {
        let page = page(r#"<input id="first" name="firstName">"#);
        let input = node(&page, "#first").await;
        page.lock().await.bind_value_tracker(input).unwrap();

        let outcome = orchestrator(&page, FillConfig::immediate())
            .fill(vec![fill("#first", "Ada")])
            .await;
        assert_eq!(outcome, FillOutcome::Completed { filled: 1, skipped: 0, failed: 0 });

        let doc = page.lock().await;
        assert_eq!(doc.value(input).unwrap(), "Ada");
        assert_eq!(
            doc.events_for(input),
            vec![
                EventKind::ScrollIntoView,
                EventKind::Focus,
                EventKind::Input,
                EventKind::Change,
                EventKind::Blur
            ]
        );
        assert_eq!(doc.framework_updates().last().unwrap().value, "Ada");
    }

    #[tokio::test]
    async fn toggles_and_editables() {
        let page = page(
            r#"<input type="checkbox" id="auth">
               <input type="checkbox" id="sponsor" checked>
               <div id="bio" contenteditable="true">old</div>"#,
        );
        let outcome = orchestrator(&page, FillConfig::immediate())
            .fill(vec![fill("#auth", "Yes"), fill("#sponsor", "yes"), fill("#bio", "Engineer")])
            .await;
        assert_eq!(outcome, FillOutcome::Completed { filled: 3, skipped: 0, failed: 0 });

        let (auth, sponsor, bio) = (node(&page, "#auth").await, node(&page, "#sponsor").await, node(&page, "#bio").await);
        let doc = page.lock().await;
        assert!(doc.checked(auth).unwrap());
        assert!(!doc.checked(sponsor).unwrap());
        assert_eq!(doc.text_content(bio), "Engineer");
        assert!(doc.events_for(bio).contains(&EventKind::Input));
    }

    #[tokio::test]
    async fn missing_elements_are_skipped_and_failures_reported() {
        let page = page(r#"<input id="email"><div id="box"></div>"#);
        let recorder = Arc::new(Recorder::default());
        let outcome = orchestrator(&page, FillConfig::immediate())
            .with_reporter(recorder.clone())
            .fill(vec![
                fill("#nope", "x"),
                fill("#email", "ada@example.com"),
                FillInstruction::Upload {
                    target: FillTarget::Selector("#box".into()),
                    value: "cv.pdf".into(),
                },
            ])
            .await;
        assert_eq!(outcome, FillOutcome::Completed { filled: 1, skipped: 1, failed: 1 });
        assert_eq!(*recorder.filled.lock().unwrap(), vec!["#email"]);
        assert_eq!(recorder.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn custom_dropdown_opens_and_clicks_exact_option() {
        let page = page(
            r#"<div role="combobox" id="country" aria-controls="list">Select...</div>
               <ul id="list" role="listbox" hidden>
                 <li role="option">Canada</li><li role="option">United States</li>
               </ul>"#,
        );
        let outcome = orchestrator(&page, FillConfig::immediate())
            .fill(vec![FillInstruction::Select {
                target: FillTarget::Selector("#country".into()),
                value: "united states".into(),
            }])
            .await;
        assert_eq!(outcome, FillOutcome::Completed { filled: 1, skipped: 0, failed: 0 });

        let us = node(&page, r#"li:not([aria-selected="false"])"#).await;
        let doc = page.lock().await;
        assert_eq!(doc.text_content(us), "United States");
        assert_eq!(doc.attr(us, "aria-selected"), Some("true"));
    }

    struct FixedMatcher(&'static str);

    #[async_trait]
    impl OptionMatcher for FixedMatcher {
        async fn choose(
            &self,
            _dropdown_html: &str,
            _options: &[String],
            _desired: &str,
            _context: &crate::detection::ElementContext,
        ) -> FormPilotResult<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    #[tokio::test]
    async fn matcher_decides_when_no_exact_option() {
        let page = page(
            r#"<div role="combobox" id="deg"></div>
               <ul role="listbox"><li role="option">High school</li><li role="option">Bachelor's degree</li></ul>"#,
        );
        orchestrator(&page, FillConfig::immediate())
            .with_matcher(Arc::new(FixedMatcher("Bachelor's degree")))
            .fill(vec![FillInstruction::Select {
                target: FillTarget::Selector("#deg".into()),
                value: "BSc Computer Science".into(),
            }])
            .await;
        let picked = node(&page, r#"[aria-selected="true"]"#).await;
        assert_eq!(page.lock().await.text_content(picked), "Bachelor's degree");
    }

    #[derive(Default)]
    struct CountingMatcher {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl OptionMatcher for CountingMatcher {
        async fn choose(
            &self,
            _dropdown_html: &str,
            _options: &[String],
            _desired: &str,
            _context: &crate::detection::ElementContext,
        ) -> FormPilotResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn matcher_is_asked_even_with_an_exact_option() {
        let page = page(
            r#"<div role="combobox" id="c"></div>
               <ul role="listbox"><li role="option">United States</li><li role="option">Canada</li></ul>"#,
        );
        let matcher = Arc::new(CountingMatcher::default());
        orchestrator(&page, FillConfig::immediate())
            .with_matcher(matcher.clone())
            .fill(vec![FillInstruction::Select {
                target: FillTarget::Selector("#c".into()),
                value: "United States".into(),
            }])
            .await;
        assert_eq!(matcher.calls.load(Ordering::SeqCst), 1);

        // An empty answer falls back to the exact match.
        let picked = node(&page, r#"[aria-selected="true"]"#).await;
        assert_eq!(page.lock().await.text_content(picked), "United States");
    }

    #[tokio::test]
    async fn matcher_overrides_exact_option() {
        let page = page(
            r#"<div role="combobox" id="c"></div>
               <ul role="listbox"><li role="option">Yes</li><li role="option">Yes, authorized to work</li></ul>"#,
        );
        orchestrator(&page, FillConfig::immediate())
            .with_matcher(Arc::new(FixedMatcher("Yes, authorized to work")))
            .fill(vec![FillInstruction::Select {
                target: FillTarget::Selector("#c".into()),
                value: "Yes".into(),
            }])
            .await;
        let picked = node(&page, r#"[aria-selected="true"]"#).await;
        assert_eq!(page.lock().await.text_content(picked), "Yes, authorized to work");
    }

    #[tokio::test]
    async fn no_option_match_clicks_nothing() {
        let page = page(
            r#"<div role="combobox" id="c"></div>
               <ul role="listbox"><li role="option">Canada</li><li role="option">Mexico</li></ul>"#,
        );
        orchestrator(&page, FillConfig::immediate())
            .fill(vec![FillInstruction::Select {
                target: FillTarget::Selector("#c".into()),
                value: "Japan".into(),
            }])
            .await;
        let doc = page.lock().await;
        let any_selected = doc.query_selector(doc.root(), &Selector::parse("[aria-selected]").unwrap());
        assert!(any_selected.is_none());
    }

    #[tokio::test]
    async fn upload_prompts_and_opens_chooser() {
        let page = page(r#"<input type="file" id="cv">"#);
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let orch = FillOrchestrator::new(page.clone(), FillConfig::immediate(), 16, notifier);
        orch.fill(vec![FillInstruction::Upload {
            target: FillTarget::Selector("#cv".into()),
            value: "ada.pdf".into(),
        }])
        .await;

        let mut messages = Vec::new();
        while let Ok(n) = rx.try_recv() {
            messages.push(n.message);
        }
        assert!(messages.iter().any(|m| m.contains("select your file")));
        let cv = node(&page, "#cv").await;
        assert!(page.lock().await.events_for(cv).contains(&EventKind::Click));
    }

    #[tokio::test(start_paused = true)]
    async fn second_concurrent_fill_is_rejected() {
        let page = page(r#"<input id="a"><input id="b">"#);
        let orch = orchestrator(&page, FillConfig::default());
        let (first, second) = tokio::join!(orch.fill(vec![fill("#a", "1")]), orch.fill(vec![fill("#b", "2")]));
        assert_eq!(first, FillOutcome::Completed { filled: 1, skipped: 0, failed: 0 });
        assert_eq!(second, FillOutcome::Rejected);
        assert!(!orch.is_busy());

        let b = node(&page, "#b").await;
        assert_eq!(page.lock().await.value(b).unwrap(), "");
        assert!(matches!(orch.fill(vec![fill("#b", "2")]).await, FillOutcome::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_aborts_the_rest_of_the_batch() {
        let page = page(r#"<input id="a"><input id="b">"#);
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let orch = Arc::new(FillOrchestrator::new(page.clone(), FillConfig::default(), 16, notifier));

        let task = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.fill(vec![fill("#a", "1"), fill("#b", "2")]).await })
        };
        // First field completes at 450ms; the second starts after an 800ms pause.
        tokio::time::sleep(Duration::from_millis(600)).await;
        page.lock()
            .await
            .navigate(parse_document(r#"<input id="b">"#, "https://jobs.example.com/next").unwrap());

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, FillOutcome::Aborted { filled: 1, .. }));
        assert!(!orch.is_busy());

        let b = node(&page, "#b").await;
        assert_eq!(page.lock().await.value(b).unwrap(), "");
        let mut last = None;
        while let Ok(n) = rx.try_recv() {
            last = Some(n);
        }
        assert_eq!(last.unwrap().level, NotificationLevel::Error);
    }
}
