//! Route classification.
//!
//! Paths are normalized before matching so that `//api/admin`, `/api/./admin`
//! or `/%61pi/admin` land in the same class as `/api/admin`.

use crate::config::RoutesConfig;

/// Policy class selected by the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    PublicApi,
    AdminApi,
    AdminPage,
    /// No gateway policy applies.
    Unmatched,
}

impl RouteClass {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::PublicApi => "public_api",
            RouteClass::AdminApi => "admin_api",
            RouteClass::AdminPage => "admin_page",
            RouteClass::Unmatched => "unmatched",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    public_api: String,
    admin_api: String,
    admin_page: String,
}

impl RouteTable {
    pub fn new(routes: &RoutesConfig) -> Self {
        Self {
            public_api: trim_prefix(&routes.public_api_prefix),
            admin_api: trim_prefix(&routes.admin_api_prefix),
            admin_page: trim_prefix(&routes.admin_page_prefix),
        }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);
        let path = path.as_str();
        if under(path, &self.admin_api) {
            RouteClass::AdminApi
        } else if under(path, &self.public_api) {
            RouteClass::PublicApi
        } else if under(path, &self.admin_page) {
            RouteClass::AdminPage
        } else {
            RouteClass::Unmatched
        }
    }
}

/// Canonical form of a request path.
///
/// Decodes percent-escaped unreserved characters, collapses repeated `/`
/// and resolves `.` and `..` segments. Other escapes (including `%2F`) are
/// kept, with upper-case hex digits.
pub fn normalize_path(path: &str) -> String {
    let decoded = decode_unreserved(path);
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;
    for segment in decoded.split('/') {
        trailing_slash = matches!(segment, "" | "." | "..");
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if segments.is_empty() || trailing_slash {
        normalized.push('/');
    }
    normalized
}

fn decode_unreserved(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let byte = hi << 4 | lo;
                if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                    out.push(byte);
                } else {
                    out.extend_from_slice(format!("%{:02X}", byte).as_bytes());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // Only ASCII was substituted, so the result is still UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| path.to_string())
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).map(|d| d as u8)
}

fn trim_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `path` equals `prefix` or continues it at a segment boundary.
fn under(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
