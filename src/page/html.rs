//! HTML parser for extracting links, forms and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Page title and `<link rel="canonical">`
//! - Links to follow (from `<a>` and `<area>` tags)
//! - Forms with their typed fields and labels
//! - Visible text for the content fingerprint

use crate::page::form::{FieldKind, FormField, FormMethod, TextFormat};
use crate::page::{DocumentParser, ParseError, ParsedDocument, RawForm};
use crate::url::is_app_state_fragment;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Default upper bound on the size of a parsed body
const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Options kept per select field
const MAX_SELECT_OPTIONS: usize = 20;

/// `DocumentParser` backed by `scraper`
#[derive(Debug, Clone)]
pub struct HtmlDocumentParser {
    max_body_bytes: usize,
}

impl HtmlDocumentParser {
    pub fn new() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }
}

impl Default for HtmlDocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled selectors for one parse
struct Selectors {
    title: Selector,
    base: Selector,
    canonical: Selector,
    links: Selector,
    forms: Selector,
    fields: Selector,
    buttons: Selector,
    labels: Selector,
    options: Selector,
    body: Selector,
}

impl Selectors {
    fn compile() -> Result<Self, ParseError> {
        Ok(Self {
            title: selector("title")?,
            base: selector("base[href]")?,
            canonical: selector("link[rel][href]")?,
            links: selector("a[href], area[href]")?,
            forms: selector("form")?,
            fields: selector("input, select, textarea")?,
            buttons: selector("button, input")?,
            labels: selector("label[for]")?,
            options: selector("option")?,
            body: selector("body")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)))
}

impl DocumentParser for HtmlDocumentParser {
    /// Parses HTML content
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href>` and `<area href>` anywhere in the document
    /// - Hash-bang and hash-route links (`#!/x`, `#/x`), which address app states
    ///
    /// **Exclude:**
    /// - `<a href download>`
    /// - `javascript:`, `mailto:`, `tel:` and `data:` links
    /// - Plain in-page anchors (`#section`)
    fn parse(&self, body: &str, base: &Url) -> Result<ParsedDocument, ParseError> {
        if body.len() > self.max_body_bytes {
            return Err(ParseError::TooLarge {
                bytes: body.len(),
                limit: self.max_body_bytes,
            });
        }

        let selectors = Selectors::compile()?;
        let document = Html::parse_document(body);

        // <base href> changes how relative links resolve
        let base = document
            .select(&selectors.base)
            .next()
            .and_then(|element| element.value().attr("href"))
            .and_then(|href| base.join(href.trim()).ok())
            .unwrap_or_else(|| base.clone());

        Ok(ParsedDocument {
            title: extract_title(&document, &selectors),
            canonical: extract_canonical(&document, &selectors, &base),
            links: extract_links(&document, &selectors, &base),
            forms: extract_forms(&document, &selectors, &base),
            text: extract_visible_text(&document, &selectors),
        })
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html, selectors: &Selectors) -> Option<String> {
    document
        .select(&selectors.title)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_canonical(document: &Html, selectors: &Selectors, base: &Url) -> Option<String> {
    document
        .select(&selectors.canonical)
        .find(|element| {
            element
                .value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
                .unwrap_or(false)
        })
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| resolve_link(href, base))
}

/// Extracts all followable links from the HTML document
fn extract_links(document: &Html, selectors: &Selectors, base: &Url) -> Vec<String> {
    let mut links = Vec::new();

    for element in document.select(&selectors.links) {
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_link(href, base) {
                links.push(absolute_url);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - Fragment-only links that are plain anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    if let Some(fragment) = href.strip_prefix('#') {
        if !is_app_state_fragment(fragment) {
            return None;
        }
    }

    match base.join(href) {
        Ok(absolute_url) if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" => {
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}

/// Extracts every form with its fields
fn extract_forms(document: &Html, selectors: &Selectors, base: &Url) -> Vec<RawForm> {
    // <label for="id"> text by target id
    let mut labels: HashMap<String, String> = HashMap::new();
    for label in document.select(&selectors.labels) {
        if let Some(target) = label.value().attr("for") {
            let text = collapse_whitespace(&label.text().collect::<String>());
            if !text.is_empty() {
                labels.entry(target.to_string()).or_insert(text);
            }
        }
    }

    document
        .select(&selectors.forms)
        .enumerate()
        .map(|(index, form)| extract_form(form, index, selectors, base, &labels))
        .collect()
}

fn extract_form(
    form: ElementRef<'_>,
    index: usize,
    selectors: &Selectors,
    base: &Url,
    labels: &HashMap<String, String>,
) -> RawForm {
    let element = form.value();
    let locator = form_locator(form, index);

    let action = element
        .attr("action")
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .and_then(|action| base.join(action).ok())
        .map(|url| url.to_string());

    let mut fields: Vec<FormField> = Vec::new();
    let mut seen_groups: HashSet<String> = HashSet::new();

    for control in form.select(&selectors.fields) {
        let value = control.value();

        if value.attr("disabled").is_some() {
            continue;
        }

        let input_type = value
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string());

        let kind = match value.name() {
            "select" => FieldKind::Select {
                options: control
                    .select(&selectors.options)
                    .filter_map(|option| {
                        let text = collapse_whitespace(&option.text().collect::<String>());
                        let value = option.value().attr("value").map(str::to_string).unwrap_or(text);
                        Some(value).filter(|v| !v.is_empty())
                    })
                    .take(MAX_SELECT_OPTIONS)
                    .collect(),
            },
            "textarea" => FieldKind::Text {
                format: TextFormat::Multiline,
            },
            _ => match input_type.as_str() {
                "submit" | "button" | "reset" | "image" => continue,
                "checkbox" | "radio" => FieldKind::Checkbox,
                "file" => FieldKind::File,
                "hidden" => FieldKind::Hidden,
                other => FieldKind::Text {
                    format: TextFormat::from_input_type(other),
                },
            },
        };

        let Some(name) = value
            .attr("name")
            .or_else(|| value.attr("id"))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            continue;
        };

        // A radio group is one field
        if input_type == "radio" && !seen_groups.insert(name.clone()) {
            if value.attr("required").is_some() {
                if let Some(existing) = fields.iter_mut().find(|f| f.name == name) {
                    existing.required = true;
                }
            }
            continue;
        }

        let required = value.attr("required").is_some()
            || value
                .attr("aria-required")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);

        fields.push(FormField {
            label: find_label(control, labels),
            locator: Some(control_locator(control, &locator)),
            name,
            kind,
            required,
        });
    }

    RawForm {
        id: element
            .attr("id")
            .or_else(|| element.attr("name"))
            .map(str::to_string),
        action,
        method: FormMethod::from_attr(element.attr("method")),
        fields,
        submit: submit_locator(form, selectors, &locator),
        locator: Some(locator),
    }
}

/// Selector for a form: `form#id`, then `form[name]`, then `form[action]`,
/// then its position in the document
fn form_locator(form: ElementRef<'_>, index: usize) -> String {
    let element = form.value();
    if let Some(id) = non_empty_attr(form, "id") {
        return id_selector("form", id);
    }
    if let Some(name) = non_empty_attr(form, "name") {
        return format!("form[name={}]", css_string(name));
    }
    if let Some(action) = element.attr("action").filter(|a| !a.trim().is_empty()) {
        return format!("form[action={}]", css_string(action));
    }
    format!("form:nth-of-type({})", index + 1)
}

/// Selector for a control: `#id` when it has one, else its name within the form
fn control_locator(control: ElementRef<'_>, form: &str) -> String {
    if let Some(id) = non_empty_attr(control, "id") {
        return id_selector("", id);
    }
    let tag = control.value().name();
    match non_empty_attr(control, "name") {
        Some(name) => format!("{} {}[name={}]", form, tag, css_string(name)),
        None => format!("{} {}", form, tag),
    }
}

/// First enabled submit control of a form
///
/// A `<button>` without a `type` submits, as do `type="submit"` buttons and
/// `submit` or `image` inputs.
fn submit_locator(form: ElementRef<'_>, selectors: &Selectors, form_css: &str) -> Option<String> {
    let control = form.select(&selectors.buttons).find(|control| {
        let value = control.value();
        if value.attr("disabled").is_some() {
            return false;
        }
        let input_type = value.attr("type").map(|t| t.trim().to_ascii_lowercase());
        matches!(
            (value.name(), input_type.as_deref()),
            ("button", None | Some("submit")) | ("input", Some("submit" | "image"))
        )
    })?;

    if non_empty_attr(control, "id").is_some() || non_empty_attr(control, "name").is_some() {
        return Some(control_locator(control, form_css));
    }
    let tag = control.value().name();
    Some(match control.value().attr("type") {
        Some(input_type) => format!("{} {}[type={}]", form_css, tag, css_string(input_type)),
        None => format!("{} {}:not([type])", form_css, tag),
    })
}

fn non_empty_attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

/// `tag#id` when the id is a plain identifier, else `tag[id="..."]`
fn id_selector(tag: &str, id: &str) -> String {
    let mut chars = id.chars();
    let plain = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("{}#{}", tag, id)
    } else {
        format!("{}[id={}]", tag, css_string(id))
    }
}

/// Double-quoted CSS string literal
fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Finds a human-readable label for a form control
///
/// Tries `<label for>`, then a wrapping `<label>`, then `placeholder`, then `aria-label`.
fn find_label(control: ElementRef<'_>, labels: &HashMap<String, String>) -> Option<String> {
    let value = control.value();

    if let Some(text) = value.attr("id").and_then(|id| labels.get(id)) {
        return Some(text.clone());
    }

    let wrapping = control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "label")
        .map(|label| collapse_whitespace(&label.text().collect::<String>()))
        .filter(|text| !text.is_empty());
    if wrapping.is_some() {
        return wrapping;
    }

    value
        .attr("placeholder")
        .or_else(|| value.attr("aria-label"))
        .map(collapse_whitespace)
        .filter(|text| !text.is_empty())
}

/// Collects text a visitor would see, skipping scripts and styles
fn extract_visible_text(document: &Html, selectors: &Selectors) -> String {
    let root = document
        .select(&selectors.body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    for node in root.descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        text.push_str(chunk);
        text.push(' ');
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn parse(html: &str) -> ParsedDocument {
        HtmlDocumentParser::new().parse(html, &base_url()).unwrap()
    }

    #[test]
    fn test_extract_title() {
        let parsed = parse("<html><head><title>  Test\n Page  </title></head><body></body></html>");
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse("<html><head></head><body></body></html>");
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_extract_links() {
        let html = r##"<body>
            <a href="/about">About</a>
            <a href="contact">Contact</a>
            <a href="https://other.org/x">Other</a>
            <map><area href="/map-target"></map>
        </body>"##;
        let parsed = parse(html);
        assert_eq!(
            parsed.links,
            vec![
                "https://example.com/about",
                "https://example.com/contact",
                "https://other.org/x",
                "https://example.com/map-target",
            ]
        );
    }

    #[test]
    fn test_excluded_links() {
        let html = r##"<body>
            <a href="javascript:void(0)">JS</a>
            <a href="MAILTO:team@example.com">Mail</a>
            <a href="tel:+1555">Call</a>
            <a href="data:text/plain,hi">Data</a>
            <a href="#top">Top</a>
            <a href="/brochure.pdf" download>Get</a>
            <a href="   ">Blank</a>
            <a href="ftp://example.com/file">FTP</a>
        </body>"##;
        assert!(parse(html).links.is_empty());
    }

    #[test]
    fn test_app_state_fragment_links_kept() {
        let parsed = parse(r##"<a href="#!/cart">Cart</a><a href="#/settings">Settings</a>"##);
        assert_eq!(
            parsed.links,
            vec![
                "https://example.com/page#!/cart",
                "https://example.com/page#/settings",
            ]
        );
    }

    #[test]
    fn test_base_href() {
        let parsed = parse(r#"<head><base href="https://example.com/docs/"></head><a href="intro">x</a>"#);
        assert_eq!(parsed.links, vec!["https://example.com/docs/intro"]);
    }

    #[test]
    fn test_canonical() {
        let parsed = parse(r#"<head><link rel="Canonical" href="/page/"></head>"#);
        assert_eq!(parsed.canonical.as_deref(), Some("https://example.com/page/"));

        let parsed = parse(r#"<head><link rel="stylesheet" href="/style.css"></head>"#);
        assert_eq!(parsed.canonical, None);
    }

    #[test]
    fn test_extract_contact_form() {
        let html = r#"<body>
            <form id="contact" action="/contact/send" method="post">
                <label for="email">Your email</label>
                <input id="email" name="email" type="email" required>
                <label>Message <textarea name="message"></textarea></label>
                <select name="topic"><option value="">Pick</option><option value="sales">Sales</option></select>
                <input type="checkbox" name="subscribe">
                <input type="hidden" name="csrf" value="abc">
                <input type="file" name="attachment">
                <input type="text" name="nickname" placeholder="Nickname" disabled>
                <button type="submit">Send</button>
                <input type="submit" value="Send">
            </form>
        </body>"#;
        let parsed = parse(html);
        assert_eq!(parsed.forms.len(), 1);

        let form = &parsed.forms[0];
        assert_eq!(form.id.as_deref(), Some("contact"));
        assert_eq!(form.action.as_deref(), Some("https://example.com/contact/send"));
        assert_eq!(form.method, FormMethod::Post);

        let names: Vec<&str> = form.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email", "message", "topic", "subscribe", "csrf", "attachment"]);

        let email = &form.fields[0];
        assert!(email.required);
        assert_eq!(email.label.as_deref(), Some("Your email"));
        assert_eq!(
            email.kind,
            FieldKind::Text {
                format: TextFormat::Email
            }
        );

        assert_eq!(form.fields[1].label.as_deref(), Some("Message"));
        assert_eq!(
            form.fields[2].kind,
            FieldKind::Select {
                options: vec!["sales".to_string()]
            }
        );
        assert_eq!(form.fields[3].kind, FieldKind::Checkbox);
        assert_eq!(form.fields[4].kind, FieldKind::Hidden);
        assert_eq!(form.fields[5].kind, FieldKind::File);

        assert_eq!(form.locator.as_deref(), Some("form#contact"));
        assert_eq!(email.locator.as_deref(), Some("#email"));
        assert_eq!(
            form.fields[1].locator.as_deref(),
            Some(r#"form#contact textarea[name="message"]"#)
        );
        assert_eq!(
            form.submit.as_deref(),
            Some(r#"form#contact button[type="submit"]"#)
        );
    }

    #[test]
    fn test_anonymous_form_locators() {
        let html = r#"<body>
            <form action="/search"><input name="q"><button>Go</button></form>
            <form><input id="2fa" name="code"><input type="submit" id="verify"></form>
            <form name="news"><input name="email"><button type="button">Cancel</button></form>
        </body>"#;
        let forms = parse(html).forms;
        assert_eq!(forms.len(), 3);

        assert_eq!(forms[0].locator.as_deref(), Some(r#"form[action="/search"]"#));
        assert_eq!(
            forms[0].fields[0].locator.as_deref(),
            Some(r#"form[action="/search"] input[name="q"]"#)
        );
        assert_eq!(
            forms[0].submit.as_deref(),
            Some(r#"form[action="/search"] button:not([type])"#)
        );

        assert_eq!(forms[1].locator.as_deref(), Some("form:nth-of-type(2)"));
        assert_eq!(forms[1].fields[0].locator.as_deref(), Some(r#"[id="2fa"]"#));
        assert_eq!(forms[1].submit.as_deref(), Some("#verify"));

        assert_eq!(forms[2].locator.as_deref(), Some(r#"form[name="news"]"#));
        assert_eq!(forms[2].submit, None);
    }

    #[test]
    fn test_form_without_action_posts_to_page() {
        let parsed = parse(r#"<form><input name="q" type="search"></form>"#);
        let form = &parsed.forms[0];
        assert_eq!(form.action, None);
        assert_eq!(form.method, FormMethod::Get);
        assert_eq!(form.id, None);
    }

    #[test]
    fn test_radio_group_is_one_field() {
        let html = r#"<form>
            <input type="radio" name="size" value="s">
            <input type="radio" name="size" value="m" required>
            <input type="radio" name="size" value="l">
        </form>"#;
        let form = &parse(html).forms[0];
        assert_eq!(form.fields.len(), 1);
        assert!(form.fields[0].required);
        assert_eq!(form.fields[0].kind, FieldKind::Checkbox);
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = r#"<html><head><title>T</title><style>p{color:red}</style></head>
            <body><h1>Welcome</h1><script>var secret = 1;</script><p>Shop   now</p></body></html>"#;
        let parsed = parse(html);
        assert_eq!(parsed.text, "Welcome Shop now");
    }

    #[test]
    fn test_body_too_large() {
        let parser = HtmlDocumentParser::with_max_body_bytes(10);
        let result = parser.parse("<html><body>far too long</body></html>", &base_url());
        assert!(matches!(result, Err(ParseError::TooLarge { .. })));
    }
}
