//! Shape validation for contact submissions.
//!
//! Input arrives as loosely-typed optional strings (JSON or urlencoded form posts) and
//! leaves as a [`ValidContact`] or a field -> messages map suitable for form feedback.
use crate::models::Locale;
use serde::Deserialize;
use std::collections::BTreeMap;
use validator::{Validate, ValidateLength, ValidationErrors};

pub const PHONE_MIN_CHARS: usize = 10;
pub const PHONE_MAX_CHARS: usize = 20;
pub const BOOKING_PHONE_MIN_DIGITS: usize = 7;
pub const BOOKING_PHONE_MAX_DIGITS: usize = 15;
const DRESS_ID_MAX_CHARS: usize = 64;

/// Raw submission. Every field is optional here so that missing values surface as
/// field issues instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "dress_id")]
    pub dress_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Honeypot. Never rendered visibly, so humans leave it empty.
    #[serde(default)]
    pub website: Option<String>,
}

impl ContactInput {
    /// Any value at all, whitespace included, marks the submission as automated.
    pub fn honeypot_filled(&self) -> bool {
        self.website.as_deref().map_or(false, |w| !w.is_empty())
    }

    pub fn locale(&self) -> Option<Locale> {
        non_empty(self.locale.as_deref()).and_then(Locale::parse)
    }
}

/// Which form produced the submission; the fitting dialog checks phones more strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormProfile {
    Contact,
    Booking,
}

impl FormProfile {
    pub fn message_max_chars(&self) -> usize {
        match self {
            FormProfile::Contact => 1000,
            FormProfile::Booking => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub message: Option<String>,
    pub dress_id: Option<String>,
    pub locale: Option<Locale>,
}

pub type FieldIssues = BTreeMap<String, Vec<String>>;

/// Trimmed text fields checked declaratively; phone and dress rules stay hand-written.
#[derive(Debug, Validate)]
struct ContactFields {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    name: String,
    #[validate(email(message = "Invalid email address"))]
    email: Option<String>,
    message: Option<String>,
}

pub fn validate(input: &ContactInput, profile: FormProfile) -> Result<ValidContact, FieldIssues> {
    let mut issues = FieldIssues::new();

    let fields = ContactFields {
        name: non_empty(input.name.as_deref()).unwrap_or_default().to_string(),
        email: non_empty(input.email.as_deref()).map(str::to_string),
        message: non_empty(input.message.as_deref()).map(str::to_string),
    };
    if let Err(errors) = fields.validate() {
        collect_issues(&errors, &mut issues);
    }

    if let Some(message) = &fields.message {
        let max = profile.message_max_chars();
        if !message.validate_length(None, Some(max as u64), None) {
            issues
                .entry("message".to_string())
                .or_default()
                .push(format!("Message must be at most {max} characters"));
        }
    }

    let phone = non_empty(input.phone.as_deref()).unwrap_or_default();
    if let Err(msg) = check_phone(phone, profile) {
        issues.entry("phone".to_string()).or_default().push(msg);
    }

    let dress_id = non_empty(input.dress_id.as_deref());
    if let Some(id) = dress_id {
        if id.len() > DRESS_ID_MAX_CHARS || id.chars().any(char::is_whitespace) {
            issues
                .entry("dressId".to_string())
                .or_default()
                .push("Invalid dress reference".to_string());
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(ValidContact {
        name: fields.name,
        phone: phone.to_string(),
        email: fields.email,
        message: fields.message,
        dress_id: dress_id.map(str::to_string),
        locale: input.locale(),
    })
}

fn collect_issues(errors: &ValidationErrors, issues: &mut FieldIssues) {
    for (field, errs) in errors.field_errors() {
        let messages = issues.entry(field.to_string()).or_default();
        for err in errs.iter() {
            messages.push(
                err.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string()),
            );
        }
    }
}

fn check_phone(phone: &str, profile: FormProfile) -> Result<(), String> {
    if phone.is_empty() {
        return Err("Phone number is required".to_string());
    }
    if !phone.chars().all(is_phone_char) {
        return Err("Phone number contains invalid characters".to_string());
    }
    match profile {
        FormProfile::Contact => {
            let len = phone.chars().count();
            if !(PHONE_MIN_CHARS..=PHONE_MAX_CHARS).contains(&len) {
                return Err(format!(
                    "Phone number must be {PHONE_MIN_CHARS}-{PHONE_MAX_CHARS} characters"
                ));
            }
        }
        FormProfile::Booking => {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            if !(BOOKING_PHONE_MIN_DIGITS..=BOOKING_PHONE_MAX_DIGITS).contains(&digits) {
                return Err(format!(
                    "Phone number must contain {BOOKING_PHONE_MIN_DIGITS}-{BOOKING_PHONE_MAX_DIGITS} digits"
                ));
            }
        }
    }
    Ok(())
}

fn is_phone_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ')
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, phone: &str) -> ContactInput {
        ContactInput {
            name: Some(name.to_string()),
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_minimal_contact() {
        let valid = validate(&input("Jane Doe", "+15551234567"), FormProfile::Contact)
            .expect("valid input");
        assert_eq!(valid.name, "Jane Doe");
        assert_eq!(valid.phone, "+15551234567");
        assert!(valid.email.is_none());
    }

    #[test]
    fn rejects_letters_in_phone() {
        let issues = validate(&input("Jane Doe", "abc"), FormProfile::Contact).unwrap_err();
        assert!(issues.contains_key("phone"));
        assert!(!issues.contains_key("name"));
    }

    #[test]
    fn contact_phone_length_counts_all_characters() {
        assert!(validate(&input("Jane", "+38 (067) 12"), FormProfile::Contact).is_ok());
        assert!(validate(&input("Jane", "123456789"), FormProfile::Contact).is_err());
        assert!(validate(&input("Jane", "+1 (555) 123-4567-8901"), FormProfile::Contact).is_err());
    }

    #[test]
    fn booking_phone_counts_digits_only() {
        assert!(validate(&input("Jane", "123-4567"), FormProfile::Booking).is_ok());
        assert!(validate(&input("Jane", "(12) 34-56"), FormProfile::Booking).is_err());
        assert!(validate(&input("Jane", "1234567890123456"), FormProfile::Booking).is_err());
    }

    #[test]
    fn name_length_is_measured_in_characters() {
        assert!(validate(&input("Яна", "+380671234567"), FormProfile::Contact).is_ok());
        let long = "я".repeat(101);
        let issues = validate(&input(&long, "+380671234567"), FormProfile::Contact).unwrap_err();
        assert!(issues.contains_key("name"));
    }

    #[test]
    fn message_limit_depends_on_profile() {
        let mut data = input("Jane", "+15551234567");
        data.message = Some("x".repeat(700));
        assert!(validate(&data, FormProfile::Contact).is_ok());
        let issues = validate(&data, FormProfile::Booking).unwrap_err();
        assert!(issues.contains_key("message"));
    }

    #[test]
    fn empty_optional_fields_are_absent() {
        let mut data = input("Jane", "+15551234567");
        data.email = Some("".to_string());
        data.dress_id = Some("  ".to_string());
        data.locale = Some("uk".to_string());
        let valid = validate(&data, FormProfile::Contact).expect("valid");
        assert!(valid.email.is_none());
        assert!(valid.dress_id.is_none());
        assert_eq!(valid.locale, Some(Locale::Uk));
    }

    #[test]
    fn collects_issues_for_every_field() {
        let data = ContactInput {
            name: Some("J".to_string()),
            phone: None,
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        let issues = validate(&data, FormProfile::Contact).unwrap_err();
        let fields: Vec<&str> = issues.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["email", "name", "phone"]);
    }

    fn with_email(email: &str) -> ContactInput {
        let mut data = input("Jane Doe", "+15551234567");
        data.email = Some(email.to_string());
        data
    }

    #[test]
    fn accepts_ordinary_addresses() {
        for email in ["jane@x.com", "jane.doe+fitting@mail.example.ua", "  jane@x.com  "] {
            let valid = validate(&with_email(email), FormProfile::Contact)
                .unwrap_or_else(|e| panic!("{email:?} rejected: {e:?}"));
            assert_eq!(valid.email.as_deref(), Some(email.trim()));
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in [
            "jane()@x.com",
            "a<b>@x.com",
            "jane@x_y.com",
            "jane@-x-.com",
            "a,b@x.com",
            "@x.com",
            "jane@@x.com",
            "ja ne@x.com",
        ] {
            let issues = validate(&with_email(email), FormProfile::Contact)
                .expect_err(&format!("{email:?} accepted"));
            assert_eq!(issues["email"], vec!["Invalid email address".to_string()]);
        }
    }

    #[test]
    fn whitespace_honeypot_counts_as_filled() {
        let mut data = input("Jane", "+15551234567");
        data.website = Some("   ".to_string());
        assert!(data.honeypot_filled());
        data.website = Some(String::new());
        assert!(!data.honeypot_filled());
        data.website = None;
        assert!(!data.honeypot_filled());
    }

    #[test]
    fn accepts_both_dress_id_spellings() {
        let camel: ContactInput = serde_json::from_str(r#"{"dressId":"d-1"}"#).unwrap();
        let snake: ContactInput = serde_json::from_str(r#"{"dress_id":"d-1"}"#).unwrap();
        assert_eq!(camel.dress_id.as_deref(), Some("d-1"));
        assert_eq!(snake.dress_id.as_deref(), Some("d-1"));
    }
}
