//! Page Normalizer
//!
//! This module handles turning a fetched response into a normalized page:
//! - Resolving the page's URL Key (final URL, same-host canonical link)
//! - Collecting the URL variants that lead to it (redirect hops, aliases)
//! - Canonicalizing outbound links and form actions into URL Keys
//! - Fingerprinting the visible text
//!
//! HTML parsing itself sits behind the [`DocumentParser`] seam.

mod fingerprint;
mod form;
mod html;

pub use fingerprint::{content_fingerprint, normalize_text};
pub use form::{FieldKind, FormDescriptor, FormField, FormMethod, FormPurpose, TextFormat};
pub use html::HtmlDocumentParser;

use crate::fetch::FetchResponse;
use crate::url::{canonicalize, canonicalize_parsed, host_with_port, UrlKey};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// The document parser could not make sense of a body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("document of {bytes} bytes exceeds the {limit} byte limit")]
    TooLarge { bytes: usize, limit: usize },

    #[error("invalid selector: {0}")]
    Selector(String),
}

/// A form as the parser saw it, before action canonicalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawForm {
    pub id: Option<String>,
    /// Absolute action URL; `None` submits to the page itself
    pub action: Option<String>,
    pub method: FormMethod,
    pub fields: Vec<FormField>,
    /// CSS selector of the form element
    pub locator: Option<String>,
    /// CSS selector of its submit control, if it has one
    pub submit: Option<String>,
}

/// What the parser extracts from one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: Option<String>,
    /// Absolute `<link rel="canonical">` target
    pub canonical: Option<String>,
    /// Absolute link targets in document order
    pub links: Vec<String>,
    pub forms: Vec<RawForm>,
    /// Visible text used for the content fingerprint
    pub text: String,
}

/// HTML/DOM parsing collaborator
pub trait DocumentParser: Send + Sync {
    /// Parses `body`, resolving relative references against `base`
    fn parse(&self, body: &str, base: &Url) -> Result<ParsedDocument, ParseError>;
}

/// Fetch status recorded on a page node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Parsed HTML
    Ok,
    /// Fetched, but the body could not be parsed
    Error,
    /// Fetched non-HTML content, recorded as a leaf
    Skipped,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Ok => "ok",
            PageStatus::Error => "error",
            PageStatus::Skipped => "skipped",
        }
    }
}

/// A fetched page reduced to what the frontier and the flow graph need
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    /// Key of the page node
    pub key: UrlKey,
    /// Key the frontier scheduled
    pub requested: UrlKey,
    /// Other keys that lead to this page (requested URL, redirect hops, superseded final URL)
    pub aliases: Vec<UrlKey>,
    pub title: Option<String>,
    /// Distinct outbound link targets, self-links removed
    pub links: Vec<UrlKey>,
    pub forms: Vec<FormDescriptor>,
    pub fingerprint: String,
    pub content_type: Option<String>,
    pub status_code: u16,
    pub page_status: PageStatus,
    pub error: Option<String>,
}

impl NormalizedPage {
    /// True if `key` names this page
    pub fn answers_to(&self, key: &UrlKey) -> bool {
        &self.key == key || self.aliases.contains(key)
    }
}

/// Normalizes one fetched response
///
/// Never fails: a body that cannot be parsed yields an error leaf, and
/// non-HTML content yields a skipped leaf. Both have no outbound edges.
///
/// # Arguments
///
/// * `requested` - Key of the frontier entry that was fetched
/// * `response` - The successful fetch
/// * `parser` - HTML collaborator
pub fn normalize_page(
    requested: &UrlKey,
    response: &FetchResponse,
    parser: &dyn DocumentParser,
) -> NormalizedPage {
    let final_key = canonicalize_parsed(response.final_url.clone())
        .map(|url| UrlKey::from_canonical(&url))
        .unwrap_or_else(|_| requested.clone());

    let mut page = NormalizedPage {
        key: final_key.clone(),
        requested: requested.clone(),
        aliases: Vec::new(),
        title: None,
        links: Vec::new(),
        forms: Vec::new(),
        fingerprint: content_fingerprint(&response.body),
        content_type: response.content_type().map(str::to_string),
        status_code: response.status,
        page_status: PageStatus::Ok,
        error: None,
    };

    let mut variants: Vec<UrlKey> = vec![requested.clone()];
    variants.extend(
        response
            .redirects
            .iter()
            .filter_map(|hop| canonicalize(hop.as_str()).ok()),
    );

    if !response.is_html() {
        page.page_status = PageStatus::Skipped;
        page.aliases = collect_aliases(&page.key, variants);
        return page;
    }

    let parsed = match parser.parse(&response.body, &response.final_url) {
        Ok(parsed) => parsed,
        Err(e) => {
            page.page_status = PageStatus::Error;
            page.error = Some(e.to_string());
            page.aliases = collect_aliases(&page.key, variants);
            return page;
        }
    };

    // A same-host canonical link names the logical page
    if let Some(canonical) = parsed
        .canonical
        .as_deref()
        .and_then(|raw| same_host_key(raw, &response.final_url))
    {
        if canonical != page.key {
            variants.push(page.key.clone());
            page.key = canonical;
        }
    }

    page.aliases = collect_aliases(&page.key, variants);
    page.title = parsed.title;
    page.fingerprint = content_fingerprint(&parsed.text);

    let mut seen: HashSet<UrlKey> = HashSet::new();
    for raw in &parsed.links {
        let Ok(key) = canonicalize(raw) else {
            continue;
        };
        if page.answers_to(&key) || !seen.insert(key.clone()) {
            continue;
        }
        page.links.push(key);
    }

    page.forms = parsed
        .forms
        .into_iter()
        .map(|form| {
            let action = form
                .action
                .as_deref()
                .and_then(|raw| canonicalize(raw).ok())
                .filter(|action| !page.aliases.contains(action))
                .unwrap_or_else(|| page.key.clone());
            FormDescriptor::new(form.id, action, form.method, form.fields)
                .with_locators(form.locator, form.submit)
        })
        .collect();

    page
}

fn same_host_key(raw: &str, final_url: &Url) -> Option<UrlKey> {
    let url = Url::parse(raw).ok()?;
    if host_with_port(&url)? != host_with_port(final_url)? {
        return None;
    }
    canonicalize(url.as_str()).ok()
}

fn collect_aliases(key: &UrlKey, variants: Vec<UrlKey>) -> Vec<UrlKey> {
    let mut aliases: Vec<UrlKey> = Vec::new();
    for variant in variants {
        if &variant != key && !aliases.contains(&variant) {
            aliases.push(variant);
        }
    }
    aliases
}
