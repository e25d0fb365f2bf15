//! Content utilities: keyword highlighting, page summaries and text extraction.

use std::collections::VecDeque;

use regex::Regex;
use serde::Serialize;

use crate::dom::{Document, NodeId, Selector};
use crate::errors::FormPilotResult;
use crate::profile::Settings;

pub const AI_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural network",
    "AI",
    "ML",
    "DL",
    "algorithm",
    "data science",
    "chatbot",
    "GPT",
    "OpenAI",
    "Claude",
    "Bard",
    "ChatGPT",
    "automation",
    "robotics",
    "computer vision",
    "natural language processing",
    "NLP",
    "predictive analytics",
    "big data",
];

pub const HIGHLIGHT_CLASS: &str = "formpilot-highlight";
const STYLE_ID: &str = "formpilot-highlight-styles";
const HISTORY_LEN: usize = 10;
const MIN_PARAGRAPH_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PageContent {
    pub headings: Vec<Heading>,
    pub paragraphs: Vec<String>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStats {
    pub word_count: usize,
    pub ai_mentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub ai_keywords: Vec<KeywordCount>,
    pub content: PageContent,
    pub stats: PageStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    pub title: String,
    pub url: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Raw text of the body, script and style contents included.
    pub text: String,
    /// Visible text only, whitespace collapsed.
    pub clean_text: String,
    pub word_count: usize,
}

/// Keeps the most recent analyses, newest first.
pub struct PageAnalyzer {
    keywords: Vec<(String, Regex)>,
    history: VecDeque<PageAnalysis>,
}

impl PageAnalyzer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            keywords: compile_keywords(settings),
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Pick up edited custom keywords. History is kept.
    pub fn refresh(&mut self, settings: &Settings) {
        self.keywords = compile_keywords(settings);
    }

    pub fn history(&self) -> impl Iterator<Item = &PageAnalysis> {
        self.history.iter()
    }

    fn mentions(&self, text: &str) -> bool {
        self.keywords.iter().any(|(_, re)| re.is_match(text))
    }

    /// Mark every element whose own text mentions a keyword. Earlier marks
    /// are cleared first. Returns the number of highlighted elements.
    pub fn highlight(&self, doc: &mut Document, settings: &Settings) -> FormPilotResult<usize> {
        inject_styles(doc, settings)?;

        let marked = Selector::parse(&format!(".{HIGHLIGHT_CLASS}"))?;
        for el in doc.query_selector_all(doc.root(), &marked) {
            remove_class(doc, el)?;
        }

        let mut targets: Vec<NodeId> = doc
            .text_nodes(doc.body())
            .into_iter()
            .filter(|(parent, text)| doc.element(*parent).is_some() && self.mentions(text))
            .map(|(parent, _)| parent)
            .filter(|&p| !matches!(doc.tag_name(p), Some("script" | "style")))
            .collect();
        targets.dedup();
        for &el in &targets {
            add_class(doc, el)?;
        }
        tracing::info!(count = targets.len(), "keyword content highlighted");
        Ok(targets.len())
    }

    pub fn analyze(&mut self, doc: &Document) -> FormPilotResult<PageAnalysis> {
        let root = doc.root();
        let headings = doc
            .query_selector_all(root, &Selector::parse("h1, h2, h3, h4, h5, h6")?)
            .into_iter()
            .map(|h| Heading {
                level: doc.tag_name(h).unwrap_or_default().to_ascii_uppercase(),
                text: doc.text_content(h).trim().to_string(),
            })
            .collect();
        let paragraphs = doc
            .query_selector_all(root, &Selector::parse("p")?)
            .into_iter()
            .map(|p| doc.text_content(p).trim().to_string())
            .filter(|t| t.chars().count() > MIN_PARAGRAPH_LEN)
            .collect();
        let base = url::Url::parse(doc.url()).ok();
        let links = doc
            .query_selector_all(root, &Selector::parse("a[href]")?)
            .into_iter()
            .map(|a| {
                let raw = doc.attr(a, "href").unwrap_or_default();
                let href = base
                    .as_ref()
                    .and_then(|b| b.join(raw).ok())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| raw.to_string());
                Link {
                    text: doc.text_content(a).trim().to_string(),
                    href,
                }
            })
            .collect();

        let all_text = doc.text_content(doc.body());
        let ai_keywords: Vec<KeywordCount> = self
            .keywords
            .iter()
            .map(|(k, re)| KeywordCount {
                keyword: k.clone(),
                count: re.find_iter(&all_text).count(),
            })
            .filter(|k| k.count > 0)
            .collect();
        let stats = PageStats {
            word_count: all_text.split_whitespace().count(),
            ai_mentions: ai_keywords.iter().map(|k| k.count).sum(),
        };

        let analysis = PageAnalysis {
            url: doc.url().to_string(),
            title: doc.title().to_string(),
            timestamp: chrono::Utc::now(),
            ai_keywords,
            content: PageContent {
                headings,
                paragraphs,
                links,
            },
            stats,
        };
        self.history.push_front(analysis.clone());
        self.history.truncate(HISTORY_LEN);
        tracing::info!(
            url = %analysis.url,
            words = analysis.stats.word_count,
            mentions = analysis.stats.ai_mentions,
            "page analysis completed"
        );
        Ok(analysis)
    }
}

/// Built-in keywords plus the user's custom ones, matched on word boundaries.
fn compile_keywords(settings: &Settings) -> Vec<(String, Regex)> {
    let mut keywords: Vec<String> = AI_KEYWORDS.iter().map(|k| k.to_string()).collect();
    for custom in settings.custom_keywords() {
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&custom)) {
            keywords.push(custom);
        }
    }
    keywords
        .into_iter()
        .filter_map(|k| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(&k));
            match Regex::new(&pattern) {
                Ok(re) => Some((k, re)),
                Err(e) => {
                    tracing::warn!(keyword = %k, error = %e, "keyword skipped");
                    None
                }
            }
        })
        .collect()
}

pub fn extract_text(doc: &Document) -> ExtractedText {
    let body = doc.body();
    let text = doc.text_content(body);
    let visible: Vec<String> = doc
        .text_nodes(body)
        .into_iter()
        .filter(|(parent, _)| doc.is_visible(*parent))
        .map(|(_, t)| t)
        .collect();
    let clean_text = crate::dom::node::collapse_whitespace(&visible.join(" "));
    ExtractedText {
        title: doc.title().to_string(),
        url: doc.url().to_string(),
        timestamp: chrono::Utc::now(),
        word_count: text.split_whitespace().count(),
        text,
        clean_text,
    }
}

fn inject_styles(doc: &mut Document, settings: &Settings) -> FormPilotResult<()> {
    if doc.element_by_id(doc.root(), STYLE_ID).is_some() {
        return Ok(());
    }
    let head = doc
        .query_selector(doc.root(), &Selector::parse("head")?)
        .unwrap_or_else(|| doc.body());
    let style = doc.create_element(head, "style", vec![("id".into(), STYLE_ID.into())]);
    let css = format!(
        ".{HIGHLIGHT_CLASS} {{ background-color: {} !important; opacity: {} !important; padding: 2px 4px !important; border-radius: 3px !important; }}",
        settings.highlight_color, settings.highlight_opacity
    );
    doc.create_text(style, &css);
    Ok(())
}

fn classes(doc: &Document, el: NodeId) -> Vec<String> {
    doc.attr(el, "class")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn add_class(doc: &mut Document, el: NodeId) -> FormPilotResult<()> {
    let mut list = classes(doc, el);
    if !list.iter().any(|c| c == HIGHLIGHT_CLASS) {
        list.push(HIGHLIGHT_CLASS.to_string());
    }
    doc.set_attr(el, "class", &list.join(" "))
}

fn remove_class(doc: &mut Document, el: NodeId) -> FormPilotResult<()> {
    let list: Vec<String> = classes(doc, el)
        .into_iter()
        .filter(|c| c != HIGHLIGHT_CLASS)
        .collect();
    if list.is_empty() {
        doc.remove_attr(el, "class")
    } else {
        doc.set_attr(el, "class", &list.join(" "))
    }
}
