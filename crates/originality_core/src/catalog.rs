//! crates/originality_core/src/catalog.rs
//!
//! The closed set of services a user can pick and the per-service policy
//! (accepted formats, pricing model, confirmation step).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document formats the extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Zipped-XML word-processing document (`.docx`).
    Docx,
    /// Legacy compound-file word-processing document (`.doc`).
    Doc,
}

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const DOC_MIME: &str = "application/msword";

impl DocumentFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Docx => DOCX_MIME,
            DocumentFormat::Doc => DOC_MIME,
        }
    }

    /// Works out the format of a submitted file.
    ///
    /// The file extension decides whenever it names a known format, even if
    /// the declared content type says otherwise. The content type is only
    /// consulted when the extension is missing or unknown.
    pub fn detect(file_name: &str, mime_type: Option<&str>) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".docx") {
            return Some(DocumentFormat::Docx);
        }
        if lower.ends_with(".doc") {
            return Some(DocumentFormat::Doc);
        }
        if has_extension(&lower) {
            return None;
        }
        match mime_type {
            Some(DOCX_MIME) => Some(DocumentFormat::Docx),
            Some(DOC_MIME) => Some(DocumentFormat::Doc),
            _ => None,
        }
    }
}

fn has_extension(lower_name: &str) -> bool {
    match lower_name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty() && !ext.contains('/'),
        None => false,
    }
}

/// How a service charges for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pricing {
    /// Tiered by extracted word count, see [`crate::pricing::required_credits`].
    PerWordCount,
    Flat(i64),
}

/// Static policy attached to a service kind.
#[derive(Debug, Clone, Copy)]
pub struct ServicePolicy {
    pub accepted_formats: &'static [DocumentFormat],
    pub pricing: Pricing,
    /// Whether the user must confirm the quoted price before the charge.
    pub requires_confirmation: bool,
}

/// Every service the bot offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// AI-content originality scoring through the external scoring API.
    Originality,
    /// Similarity report produced out of band from the uploaded file.
    Turnitin,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Originality, ServiceKind::Turnitin];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Originality => "originality",
            ServiceKind::Turnitin => "turnitin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "originality" => Some(ServiceKind::Originality),
            "turnitin" => Some(ServiceKind::Turnitin),
            _ => None,
        }
    }

    pub fn policy(&self) -> ServicePolicy {
        match self {
            ServiceKind::Originality => ServicePolicy {
                accepted_formats: &[DocumentFormat::Docx, DocumentFormat::Doc],
                pricing: Pricing::PerWordCount,
                requires_confirmation: true,
            },
            ServiceKind::Turnitin => ServicePolicy {
                accepted_formats: &[DocumentFormat::Docx],
                pricing: Pricing::Flat(1),
                requires_confirmation: false,
            },
        }
    }

    pub fn accepts(&self, format: DocumentFormat) -> bool {
        self.policy().accepted_formats.contains(&format)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
