//! Form descriptors
//!
//! Fields are a closed set of kinds so the synthesizer can reason about
//! each one (what to type, what to tick, what to leave alone).

use crate::url::UrlKey;
use serde::Serialize;
use std::fmt;

/// HTTP method a form submits with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormMethod {
    Get,
    Post,
}

impl FormMethod {
    /// Parses the `method` attribute; anything but `post` submits as GET
    pub fn from_attr(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "post" => FormMethod::Post,
            _ => FormMethod::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
        }
    }
}

impl fmt::Display for FormMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format hint of a free-text field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    Plain,
    Email,
    Password,
    Number,
    Tel,
    Url,
    Search,
    Date,
    Multiline,
}

impl TextFormat {
    /// Maps an `<input type>` value to a text format
    pub fn from_input_type(input_type: &str) -> Self {
        match input_type {
            "email" => TextFormat::Email,
            "password" => TextFormat::Password,
            "number" | "range" => TextFormat::Number,
            "tel" => TextFormat::Tel,
            "url" => TextFormat::Url,
            "search" => TextFormat::Search,
            "date" | "datetime-local" | "month" | "week" | "time" => TextFormat::Date,
            _ => TextFormat::Plain,
        }
    }
}

/// Input kind of a form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text { format: TextFormat },
    Select { options: Vec<String> },
    /// Checkboxes and radio groups
    Checkbox,
    File,
    Hidden,
}

impl FieldKind {
    /// Short human-readable name
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Text { format } => match format {
                TextFormat::Plain => "text",
                TextFormat::Email => "email",
                TextFormat::Password => "password",
                TextFormat::Number => "number",
                TextFormat::Tel => "phone",
                TextFormat::Url => "url",
                TextFormat::Search => "search",
                TextFormat::Date => "date",
                TextFormat::Multiline => "textarea",
            },
            FieldKind::Select { .. } => "select",
            FieldKind::Checkbox => "checkbox",
            FieldKind::File => "file",
            FieldKind::Hidden => "hidden",
        }
    }
}

/// One named control of a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    /// Visible label, placeholder or aria-label
    pub label: Option<String>,
    /// CSS selector that finds the control on the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

impl FormField {
    /// Label if there is one, else the field name
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Display name followed by the locator, e.g. `Your email (#email)`
    pub fn target(&self) -> String {
        match &self.locator {
            Some(locator) => format!("{} ({})", self.display_name(), locator),
            None => self.display_name().to_string(),
        }
    }

    /// Plausible value a tester would type into this field
    ///
    /// Hidden and file fields have no typed value.
    pub fn sample_value(&self) -> Option<String> {
        let hint = format!("{} {}", self.name, self.label.as_deref().unwrap_or("")).to_lowercase();

        let value = match &self.kind {
            FieldKind::Hidden | FieldKind::File => return None,
            FieldKind::Checkbox => "checked".to_string(),
            FieldKind::Select { options } => options.first().cloned().unwrap_or_default(),
            FieldKind::Text { format } => match format {
                TextFormat::Email => "test@example.com".to_string(),
                TextFormat::Password => "SecurePassword123!".to_string(),
                TextFormat::Number => "42".to_string(),
                TextFormat::Tel => "555-123-4567".to_string(),
                TextFormat::Url => "https://example.com".to_string(),
                TextFormat::Date => "2024-01-01".to_string(),
                TextFormat::Search => "test".to_string(),
                TextFormat::Multiline => "This is a test message.".to_string(),
                TextFormat::Plain => sample_from_hint(&hint),
            },
        };

        Some(value)
    }
}

fn sample_from_hint(hint: &str) -> String {
    let value = if hint.contains("email") {
        "test@example.com"
    } else if hint.contains("phone") || hint.contains("tel") || hint.contains("mobile") {
        "555-123-4567"
    } else if hint.contains("zip") || hint.contains("postal") {
        "12345"
    } else if hint.contains("name") {
        "Test User"
    } else if hint.contains("city") {
        "Springfield"
    } else if hint.contains("address") || hint.contains("street") {
        "123 Main St"
    } else if hint.contains("company") || hint.contains("organization") {
        "Example Corp"
    } else {
        "Test input"
    };
    value.to_string()
}

/// What a form is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPurpose {
    Generic,
    /// Has a password field (login, sign-up)
    Authentication,
    /// GET form with a single search-like field
    Search,
}

/// A form found on a page; a transition trigger distinct from a hyperlink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormDescriptor {
    /// `id` or `name` attribute
    pub id: Option<String>,
    /// Where the form submits to; the page itself when `action` is empty
    pub action: UrlKey,
    pub method: FormMethod,
    pub fields: Vec<FormField>,
    pub purpose: FormPurpose,
    /// CSS selector of the form element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// CSS selector of the control that submits the form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<String>,
}

impl FormDescriptor {
    /// Builds a descriptor and derives its purpose from the fields
    pub fn new(id: Option<String>, action: UrlKey, method: FormMethod, fields: Vec<FormField>) -> Self {
        let purpose = classify_purpose(method, &fields);
        Self {
            id,
            action,
            method,
            fields,
            purpose,
            locator: None,
            submit: None,
        }
    }

    pub fn with_locators(mut self, locator: Option<String>, submit: Option<String>) -> Self {
        self.locator = locator;
        self.submit = submit;
        self
    }

    /// Required fields a visitor can leave empty
    ///
    /// Hidden inputs are filled by the page, so a `required` on one never
    /// yields a missing-field case.
    pub fn required_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields
            .iter()
            .filter(|field| field.required && field.kind != FieldKind::Hidden)
    }

    /// Fields a visitor interacts with (everything but hidden inputs)
    pub fn visible_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|field| field.kind != FieldKind::Hidden)
    }

    /// Short label such as `form#contact` or `form #2`
    pub fn display_name(&self, index: usize) -> String {
        match &self.id {
            Some(id) => format!("form#{}", id),
            None => format!("form #{}", index + 1),
        }
    }
}

fn classify_purpose(method: FormMethod, fields: &[FormField]) -> FormPurpose {
    let has_password = fields.iter().any(|field| {
        field.kind
            == FieldKind::Text {
                format: TextFormat::Password,
            }
    });
    if has_password {
        return FormPurpose::Authentication;
    }

    let visible: Vec<&FormField> = fields.iter().filter(|f| f.kind != FieldKind::Hidden).collect();
    if method == FormMethod::Get && visible.len() == 1 {
        let field = visible[0];
        let name = field.name.to_lowercase();
        let is_search_kind = field.kind
            == FieldKind::Text {
                format: TextFormat::Search,
            };
        if is_search_kind || name == "q" || name == "query" || name.contains("search") {
            return FormPurpose::Search;
        }
    }

    FormPurpose::Generic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, format: TextFormat, required: bool) -> FormField {
        FormField {
            name: name.to_string(),
            kind: FieldKind::Text { format },
            required,
            label: None,
            locator: None,
        }
    }

    fn action() -> UrlKey {
        UrlKey::parse("https://example.com/submit").unwrap()
    }

    #[test]
    fn test_method_from_attr() {
        assert_eq!(FormMethod::from_attr(Some("POST")), FormMethod::Post);
        assert_eq!(FormMethod::from_attr(Some(" post ")), FormMethod::Post);
        assert_eq!(FormMethod::from_attr(Some("dialog")), FormMethod::Get);
        assert_eq!(FormMethod::from_attr(None), FormMethod::Get);
    }

    #[test]
    fn test_login_form_is_authentication() {
        let form = FormDescriptor::new(
            Some("login".into()),
            action(),
            FormMethod::Post,
            vec![
                text("username", TextFormat::Plain, true),
                text("password", TextFormat::Password, true),
            ],
        );
        assert_eq!(form.purpose, FormPurpose::Authentication);
        assert_eq!(form.required_fields().count(), 2);
    }

    #[test]
    fn test_search_form() {
        let form = FormDescriptor::new(
            None,
            action(),
            FormMethod::Get,
            vec![
                text("q", TextFormat::Plain, false),
                FormField {
                    name: "lang".into(),
                    kind: FieldKind::Hidden,
                    required: false,
                    label: None,
                    locator: None,
                },
            ],
        );
        assert_eq!(form.purpose, FormPurpose::Search);
        assert_eq!(form.visible_fields().count(), 1);
        assert_eq!(form.display_name(1), "form #2");
    }

    #[test]
    fn test_hidden_required_field_is_not_required_input() {
        let form = FormDescriptor::new(
            Some("checkout".into()),
            action(),
            FormMethod::Post,
            vec![
                text("email", TextFormat::Email, true),
                FormField {
                    name: "csrf".into(),
                    kind: FieldKind::Hidden,
                    required: true,
                    label: None,
                    locator: None,
                },
            ],
        );
        let required: Vec<&str> = form.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(required, vec!["email"]);
    }

    #[test]
    fn test_target_includes_locator() {
        let mut email = text("email", TextFormat::Email, true);
        assert_eq!(email.target(), "email");
        email.label = Some("Your email".into());
        email.locator = Some("#email".into());
        assert_eq!(email.target(), "Your email (#email)");
    }

    #[test]
    fn test_sample_values() {
        assert_eq!(
            text("contact", TextFormat::Email, true).sample_value().as_deref(),
            Some("test@example.com")
        );
        assert_eq!(
            text("full_name", TextFormat::Plain, true).sample_value().as_deref(),
            Some("Test User")
        );
        assert_eq!(
            text("zip", TextFormat::Plain, false).sample_value().as_deref(),
            Some("12345")
        );

        let mut phone = text("field_7", TextFormat::Plain, false);
        phone.label = Some("Mobile phone".into());
        assert_eq!(phone.sample_value().as_deref(), Some("555-123-4567"));

        let select = FormField {
            name: "country".into(),
            kind: FieldKind::Select {
                options: vec!["fi".into(), "se".into()],
            },
            required: true,
            label: None,
            locator: None,
        };
        assert_eq!(select.sample_value().as_deref(), Some("fi"));

        let hidden = FormField {
            name: "csrf".into(),
            kind: FieldKind::Hidden,
            required: false,
            label: None,
            locator: None,
        };
        assert_eq!(hidden.sample_value(), None);
    }

    #[test]
    fn test_field_serializes_with_kind_tag() {
        let json = serde_json::to_value(text("email", TextFormat::Email, true)).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["format"], "email");
        assert_eq!(json["required"], true);
        assert!(json.get("locator").is_none());
    }
}
