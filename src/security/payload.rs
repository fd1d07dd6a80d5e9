//! Pattern-based payload inspection (SQL injection, XSS).
//!
//! Patterns come from configuration and are compiled once at startup into
//! named [`Detector`]s. A request's body, query and params are serialized to
//! JSON, concatenated, and the blob is tested against both detector sets.
//!
//! Matching runs on that literal text only. Nothing is URL- or
//! entity-decoded first, so layered encodings can slip through; the
//! `%27`-style alternatives in the default SQL patterns catch only one level.

use regex::Regex;
use serde::Serialize;

use crate::config::{ConfigError, SqlInjectionConfig, XssConfig};
use crate::security::descriptor::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    SqlInjection,
    Xss,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlInjection => "sql_injection",
            Self::Xss => "xss",
        }
    }
}

/// One compiled pattern.
#[derive(Debug, Clone)]
pub struct Detector {
    pub id: String,
    pub category: ThreatCategory,
    pub pattern: Regex,
}

impl Detector {
    pub fn compile(id: impl Into<String>, category: ThreatCategory, pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            category: category.as_str(),
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            id: id.into(),
            category,
            pattern,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Outcome of inspecting one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionReport {
    pub sql_injection: bool,
    pub xss: bool,
    /// Ids of every detector that matched, for server-side logs only.
    pub matched: Vec<String>,
}

impl InspectionReport {
    pub fn is_malicious(&self) -> bool {
        self.sql_injection || self.xss
    }
}

pub struct PayloadInspector {
    sql_injection: Vec<Detector>,
    xss: Vec<Detector>,
}

impl PayloadInspector {
    /// Compile the configured pattern lists. Disabled sets compile to nothing.
    pub fn from_config(sql: &SqlInjectionConfig, xss: &XssConfig) -> Result<Self, ConfigError> {
        let sql_injection = if sql.enabled {
            compile_all(ThreatCategory::SqlInjection, &sql.patterns)?
        } else {
            Vec::new()
        };
        let xss = if xss.enabled {
            compile_all(ThreatCategory::Xss, &xss.patterns)?
        } else {
            Vec::new()
        };
        Ok(Self::new(sql_injection, xss))
    }

    pub fn new(sql_injection: Vec<Detector>, xss: Vec<Detector>) -> Self {
        Self { sql_injection, xss }
    }

    pub fn detector_count(&self) -> usize {
        self.sql_injection.len() + self.xss.len()
    }

    pub fn inspect(&self, payload: &Payload) -> InspectionReport {
        let text = serialize_for_inspection(payload);

        let mut report = InspectionReport::default();
        for detector in self.sql_injection.iter().filter(|d| d.matches(&text)) {
            report.sql_injection = true;
            report.matched.push(detector.id.clone());
        }
        for detector in self.xss.iter().filter(|d| d.matches(&text)) {
            report.xss = true;
            report.matched.push(detector.id.clone());
        }
        report
    }
}

fn compile_all(category: ThreatCategory, patterns: &[String]) -> Result<Vec<Detector>, ConfigError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| Detector::compile(format!("{}-{}", category.as_str(), i), category, pattern))
        .collect()
}

/// `body`, `query` and `params` as JSON, back to back.
fn serialize_for_inspection(payload: &Payload) -> String {
    let mut text = String::new();
    for part in [&payload.body, &payload.query, &payload.params] {
        text.push_str(&part.to_string());
    }
    text
}
