//! Registration field validation and HTML sanitization.
//!
//! Validators are independent: every rule runs and every failure is recorded, so
//! a client sees all violations in one response. Sanitization is a total
//! function over JSON values that strips tag-like substrings, entity-escapes
//! markup characters and trims strings, leaving other scalars untouched.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<.*?>").expect("static regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static regex");
    static ref NAME_RE: Regex = Regex::new(r"^[a-zA-Z\s\-']+$").expect("static regex");
    // Unicode decimal digits, not only ASCII
    static ref DIGIT_RE: Regex = Regex::new(r"\d").expect("static regex");
}

pub const REQUIRED_FIELDS: [&str; 4] = ["email", "password", "first_name", "last_name"];
pub const NAME_FIELDS: [&str; 2] = ["first_name", "last_name"];

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\"{}|<>";
const COMMON_PASSWORDS: [&str; 4] = ["password", "123456", "qwerty", "admin"];
const NAME_MIN_LEN_EXCLUSIVE: usize = 8;

/// Entities produced by [`escape_html`]; an `&` that already starts one is kept.
const ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];

/// Outcome of a validation pass. Messages keep the order the rules ran in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { is_valid: true, errors: BTreeMap::new() }
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
        self.is_valid = false;
    }

    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

/// Validates registration payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every registration rule against `fields`.
    pub fn validate_registration(&self, fields: &Map<String, Value>) -> ValidationResult {
        let mut result = ValidationResult::new();

        for field in REQUIRED_FIELDS {
            if !is_present(fields.get(field)) {
                result.add_error(field, format!("{} is required!", field));
            }
        }

        if let Some(email) = present_text(fields, "email", &mut result) {
            if !is_valid_email(email) {
                result.add_error("email", "Invalid email format!");
            }
        }

        if let Some(password) = present_text(fields, "password", &mut result) {
            for message in password_errors(password) {
                result.add_error("password", message);
            }
        }

        for field in NAME_FIELDS {
            if let Some(name) = present_text(fields, field, &mut result) {
                if !is_valid_name(name) {
                    result.add_error(field, "Name contains invalid characters");
                }
            }
        }

        result
    }
}

/// Returns the field as text if it is present and a string. A present value of
/// another type is recorded as an error.
fn present_text<'a>(
    fields: &'a Map<String, Value>,
    field: &str,
    result: &mut ValidationResult,
) -> Option<&'a str> {
    let value = fields.get(field).filter(|v| is_present(Some(v)))?;
    match value.as_str() {
        Some(s) => Some(s),
        None => {
            result.add_error(field, format!("{} must be a string", field));
            None
        }
    }
}

/// Missing, null, empty and zero-like values count as absent.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Lists every password strength rule `password` violates.
pub fn password_errors(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LEN {
        errors.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter");
    }
    if !DIGIT_RE.is_match(password) {
        errors.push("Password must contain at least one digit");
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        errors.push("Password must contain at least one special character");
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.push("Password is too common");
    }
    errors
}

/// Letters, whitespace, hyphens and apostrophes only, and strictly longer than
/// eight characters once trimmed.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name) && name.trim().chars().count() > NAME_MIN_LEN_EXCLUSIVE
}

/// Recursively sanitizes every string inside `value`, preserving its shape.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_html(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other,
    }
}

pub fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()
}

/// Strips tag-like substrings, escapes markup characters and trims.
///
/// Applying it twice yields the same string.
pub fn sanitize_html(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, "");
    escape_html(&stripped).trim().to_string()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, c) in text.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '&' => {
                let rest = &text[idx..];
                if ENTITIES.iter().any(|e| rest.starts_with(e)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Sanitizes user input for logging purposes.
///
/// Removes control characters, limits the length and escapes quotes.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_empty_payload_reports_every_required_field() {
        let result = InputValidator::new().validate_registration(&Map::new());
        assert!(!result.is_valid);
        assert_eq!(result.error_count(), 4);
        for field in REQUIRED_FIELDS {
            assert_eq!(result.field_errors(field), &[format!("{} is required!", field)]);
        }
    }

    #[test]
    fn test_valid_registration() {
        let result = InputValidator::new().validate_registration(&fields(json!({
            "email": "a@b.com",
            "password": "Str0ng!Pw",
            "first_name": "Janeliese",
            "last_name": "Doesonville",
        })));
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_short_names_are_rejected() {
        let result = InputValidator::new().validate_registration(&fields(json!({
            "email": "a@b.com",
            "password": "Str0ng!Pw",
            "first_name": "Jane",
            "last_name": "Doeson",
        })));
        assert!(!result.is_valid);
        assert_eq!(result.field_errors("first_name"), &["Name contains invalid characters"]);
        assert_eq!(result.field_errors("last_name"), &["Name contains invalid characters"]);
        assert!(result.field_errors("email").is_empty());
    }

    #[test]
    fn test_errors_accumulate_across_fields() {
        let result = InputValidator::new().validate_registration(&fields(json!({
            "email": "not-an-email",
            "password": "abc",
            "first_name": "J4ne-Marie-Anne",
            "last_name": "",
        })));
        assert_eq!(result.field_errors("email"), &["Invalid email format!"]);
        assert_eq!(result.field_errors("first_name"), &["Name contains invalid characters"]);
        assert_eq!(result.field_errors("last_name"), &["last_name is required!"]);
        // too short, no uppercase, no digit, no symbol
        assert_eq!(result.field_errors("password").len(), 4);
    }

    #[test]
    fn test_password_rules() {
        assert!(password_errors("Str0ng!Pw").is_empty());
        assert_eq!(password_errors("short1!A"), Vec::<&str>::new());
        assert_eq!(
            password_errors("alllowercase"),
            vec![
                "Password must contain at least one uppercase letter",
                "Password must contain at least one digit",
                "Password must contain at least one special character",
            ]
        );
        let errors = password_errors("PASSWORD");
        assert!(errors.contains(&"Password is too common"));
        assert!(errors.contains(&"Password must contain at least one lowercase letter"));
        assert!(password_errors("Admin").contains(&"Password is too common"));
    }

    #[test]
    fn test_non_ascii_decimal_digits_count() {
        // U+0663 ARABIC-INDIC DIGIT THREE, U+FF15 FULLWIDTH DIGIT FIVE
        assert!(password_errors("Strong!Pw\u{0663}").is_empty());
        assert!(password_errors("Strong!Pw\u{FF15}").is_empty());
        // numeric but not a decimal digit
        assert!(password_errors("Strong!Pw\u{00BD}").contains(&"Password must contain at least one digit"));
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(is_valid_email("a_b%c@d-e.io"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("a@bcom"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("ä@b.com"));
    }

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("Mary-Jane O'Neil"));
        assert!(!is_valid_name("Mary Jane2x"));
        assert!(!is_valid_name("   Anna   "));
        assert!(!is_valid_name("Abcdefgh"));
        assert!(is_valid_name("Abcdefghi"));
    }

    #[test]
    fn test_non_string_fields_are_reported() {
        let result = InputValidator::new().validate_registration(&fields(json!({
            "email": 42,
            "password": "Str0ng!Pw",
            "first_name": ["Janeliese"],
            "last_name": "Doesonville",
        })));
        assert_eq!(result.field_errors("email"), &["email must be a string"]);
        assert_eq!(result.field_errors("first_name"), &["first_name must be a string"]);
        assert!(result.field_errors("password").is_empty());
    }

    #[test]
    fn test_falsy_values_count_as_missing() {
        let result = InputValidator::new().validate_registration(&fields(json!({
            "email": null,
            "password": false,
            "first_name": 0,
            "last_name": [],
        })));
        assert_eq!(result.error_count(), 4);
    }

    #[test]
    fn test_sanitize_script_tag() {
        let out = sanitize(json!("<script>alert(1)</script>"));
        let s = out.as_str().unwrap();
        assert!(!s.contains('<'));
        assert!(!s.contains('>'));
        assert!(!s.contains("script"));
        assert_eq!(s, "alert(1)");
    }

    #[test]
    fn test_sanitize_preserves_shape() {
        let out = sanitize(json!({"a": "<b>x</b>", "n": 5, "list": [" y ", true, null]}));
        assert_eq!(out, json!({"a": "x", "n": 5, "list": ["y", true, null]}));
    }

    #[test]
    fn test_sanitize_escapes_markup_characters() {
        assert_eq!(sanitize_html("5 > 3 & \"q\" 'e'"), "5 &gt; 3 &amp; &quot;q&quot; &#x27;e&#x27;");
        assert_eq!(sanitize_html("a < b"), "a &lt; b");
        assert_eq!(sanitize_html("  Tom & Jerry  "), "Tom &amp; Jerry");
        assert_eq!(sanitize_html("R&D"), "R&amp;D");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in ["<i>O'Brien</i> & \"co\"", "a < b", "  plain  ", "&amp; &lt;", "x&y"] {
            let once = sanitize_html(input);
            let twice = sanitize_html(&once);
            assert_eq!(once, twice, "input: {}", input);
        }
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("normal text"), "normal text");
        let sanitized = sanitize_for_logging("text\x00with\x01control");
        assert!(!sanitized.contains('\x00'));
        assert!(!sanitized.contains('\x01'));
        assert_eq!(sanitize_for_logging(&"a".repeat(300)).len(), 200);
    }
}
