//! PII redaction for log payloads.
//!
//! Two passes are offered:
//! - structural: [`Sanitizer::sanitize_value`] walks a JSON value and redacts
//!   the values of sensitive keys, recursing into everything else up to
//!   [`MAX_DEPTH`] levels.
//! - textual: [`Sanitizer::sanitize_str`] applies an ordered list of patterns
//!   for secret-bearing constructs in free text.
//!
//! Both passes are idempotent: their output contains nothing any pattern or
//! field rule would rewrite again.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fixed marker for redacted values.
pub const REDACTED: &str = "[REDACTED]";
/// Replaces any value nested deeper than [`MAX_DEPTH`].
pub const DEPTH_SENTINEL: &str = "[MAX_DEPTH_EXCEEDED]";
/// Deepest nesting level that is still inspected.
pub const MAX_DEPTH: usize = 10;

/// Matches longer than this keep a short visible prefix.
const PARTIAL_REVEAL_THRESHOLD: usize = 16;
const PARTIAL_PREFIX_CHARS: usize = 4;
const EMAIL_VISIBLE_CHARS: usize = 3;
const EMAIL_HASH_CHARS: usize = 8;

/// Key fragments (lower-case) that mark a field as sensitive.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "cookie",
    "private_key",
    "credit_card",
    "creditcard",
    "card_number",
    "cardnumber",
    "cvv",
    "ssn",
    "social_security",
    "phone",
    "mobile",
    "email",
];

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer)\s+([A-Za-z0-9\-._~+/]+=*)").expect("bearer pattern")
});

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|access[_-]?key|authorization)(["']?\s*[=:]\s*["']?)([^\s"'&,;\[\]…]+)"#,
    )
    .expect("key/value pattern")
});

static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("card pattern"));

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email pattern")
});

static MASKED_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.{0,3}\*\*\*\[[0-9a-f]{8}\]@.+$").expect("masked email pattern")
});

static MASKED_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*\*-\*\*\*-\d{4}$").expect("masked phone pattern"));

static DEFAULT: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::default);

/// Redact sensitive fields in `value` with the default vocabulary.
pub fn sanitize_value(value: &Value) -> Value {
    DEFAULT.sanitize_value(value)
}

/// Redact secret-bearing patterns in `text`.
pub fn sanitize_str(text: &str) -> String {
    DEFAULT.sanitize_str(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Email,
    Phone,
    Secret,
}

/// Redacts PII from structured values and free text.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    sensitive_fields: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS.iter().copied())
    }
}

impl Sanitizer {
    pub fn new<I, S>(sensitive_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sensitive_fields: sensitive_fields
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn sanitize_value(&self, value: &Value) -> Value {
        self.sanitize_at(value, 0)
    }

    /// Structural pass starting at an explicit depth.
    pub fn sanitize_at(&self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::String(DEPTH_SENTINEL.to_string());
        }
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let sanitized = match self.classify(key) {
                        Some(kind) => redact_field(kind, child),
                        None => self.sanitize_at(child, depth + 1),
                    };
                    out.insert(key.clone(), sanitized);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.sanitize_at(item, depth + 1))
                    .collect(),
            ),
            Value::String(s) => Value::String(self.sanitize_str(s)),
            other => other.clone(),
        }
    }

    pub fn sanitize_str(&self, text: &str) -> String {
        let text = BEARER.replace_all(text, |caps: &Captures| {
            format!("{} {}", &caps[1], partial_redact(&caps[2]))
        });
        let text = KEY_VALUE.replace_all(&text, |caps: &Captures| {
            format!("{}{}{}", &caps[1], &caps[2], partial_redact(&caps[3]))
        });
        let text = CARD.replace_all(&text, |caps: &Captures| {
            let digits: Vec<u32> = caps[0].chars().filter_map(|c| c.to_digit(10)).collect();
            if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
                "[REDACTED:CARD]".to_string()
            } else {
                caps[0].to_string()
            }
        });
        let text = SSN.replace_all(&text, "[REDACTED:SSN]");
        let text = EMAIL.replace_all(&text, |caps: &Captures| {
            mask_email(&caps[0]).unwrap_or_else(|| REDACTED.to_string())
        });
        text.into_owned()
    }

    fn classify(&self, key: &str) -> Option<FieldKind> {
        let key = key.to_ascii_lowercase();
        if !self.sensitive_fields.iter().any(|f| key.contains(f.as_str())) {
            return None;
        }
        Some(if key.contains("email") {
            FieldKind::Email
        } else if key.contains("phone") || key.contains("mobile") {
            FieldKind::Phone
        } else {
            FieldKind::Secret
        })
    }
}

fn redact_field(kind: FieldKind, value: &Value) -> Value {
    let Value::String(s) = value else {
        return Value::String(REDACTED.to_string());
    };
    if is_redacted(kind, s) {
        return value.clone();
    }
    let masked = match kind {
        FieldKind::Email => mask_email(s),
        FieldKind::Phone => mask_phone(s),
        FieldKind::Secret => None,
    };
    Value::String(masked.unwrap_or_else(|| REDACTED.to_string()))
}

/// True only for the exact shapes this module writes into `kind` fields.
fn is_redacted(kind: FieldKind, s: &str) -> bool {
    if s == REDACTED {
        return true;
    }
    match kind {
        FieldKind::Email => MASKED_EMAIL.is_match(s),
        FieldKind::Phone => MASKED_PHONE.is_match(s),
        FieldKind::Secret => false,
    }
}

/// `alice@example.com` → `ali***[3b1c9f0e]@example.com`.
pub fn mask_email(email: &str) -> Option<String> {
    let (local, domain) = email.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    let visible: String = local.chars().take(EMAIL_VISIBLE_CHARS).collect();
    let digest = Sha256::digest(email.to_ascii_lowercase().as_bytes());
    let hash = hex::encode(digest);
    Some(format!(
        "{}***[{}]@{}",
        visible,
        &hash[..EMAIL_HASH_CHARS],
        domain
    ))
}

/// Keeps the last four digits: `+1 (555) 123-4567` → `***-***-4567`.
pub fn mask_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 7 {
        return None;
    }
    Some(format!("***-***-{}", &digits[digits.len() - 4..]))
}

fn partial_redact(secret: &str) -> String {
    if secret.chars().count() > PARTIAL_REVEAL_THRESHOLD {
        let prefix: String = secret.chars().take(PARTIAL_PREFIX_CHARS).collect();
        format!("[REDACTED:{}…]", prefix)
    } else {
        REDACTED.to_string()
    }
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
