//! Core data models used throughout Finecast.
//!
//! These types represent the case under review, the precedent cases fetched
//! from the store, and the assessments and prediction that flow through the
//! pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Error for an unrecognized classification label or an empty description.
///
/// The message lists the accepted values so the API can return an actionable
/// 400 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLabel {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

impl fmt::Display for InvalidLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?} (expected one of: {})",
            self.field,
            self.value,
            self.expected.join(", ")
        )
    }
}

impl std::error::Error for InvalidLabel {}

fn parse_label<T: Copy>(
    field: &'static str,
    value: &str,
    table: &[(T, &'static str)],
    expected: &'static [&'static str],
) -> Result<T, InvalidLabel> {
    table
        .iter()
        .find(|(_, s)| *s == value)
        .map(|(v, _)| *v)
        .ok_or_else(|| InvalidLabel {
            field,
            value: value.to_string(),
            expected,
        })
}

// ============ Classification enums ============

/// Whether the processing at issue had a lawful basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lawfulness {
    LawfulAndAppropriateBasis,
    LawfulButPrincipleViolation,
    NoValidBasis,
    ExemptOrRestricted,
}

impl Lawfulness {
    pub const FIELD: &'static str = "lawfulness_of_processing";
    pub const VALUES: &'static [&'static str] = &[
        "lawful_and_appropriate_basis",
        "lawful_but_principle_violation",
        "no_valid_basis",
        "exempt_or_restricted",
    ];

    const TABLE: &'static [(Self, &'static str)] = &[
        (Self::LawfulAndAppropriateBasis, "lawful_and_appropriate_basis"),
        (Self::LawfulButPrincipleViolation, "lawful_but_principle_violation"),
        (Self::NoValidBasis, "no_valid_basis"),
        (Self::ExemptOrRestricted, "exempt_or_restricted"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LawfulAndAppropriateBasis => "lawful_and_appropriate_basis",
            Self::LawfulButPrincipleViolation => "lawful_but_principle_violation",
            Self::NoValidBasis => "no_valid_basis",
            Self::ExemptOrRestricted => "exempt_or_restricted",
        }
    }
}

impl FromStr for Lawfulness {
    type Err = InvalidLabel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(Self::FIELD, s, Self::TABLE, Self::VALUES)
    }
}

/// How the organisation handled data subject rights requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsCompliance {
    FullCompliance,
    PartialCompliance,
    NonCompliance,
    NotTriggered,
}

impl RightsCompliance {
    pub const FIELD: &'static str = "data_subject_rights_compliance";
    pub const VALUES: &'static [&'static str] = &[
        "full_compliance",
        "partial_compliance",
        "non_compliance",
        "not_triggered",
    ];

    const TABLE: &'static [(Self, &'static str)] = &[
        (Self::FullCompliance, "full_compliance"),
        (Self::PartialCompliance, "partial_compliance"),
        (Self::NonCompliance, "non_compliance"),
        (Self::NotTriggered, "not_triggered"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullCompliance => "full_compliance",
            Self::PartialCompliance => "partial_compliance",
            Self::NonCompliance => "non_compliance",
            Self::NotTriggered => "not_triggered",
        }
    }
}

impl FromStr for RightsCompliance {
    type Err = InvalidLabel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(Self::FIELD, s, Self::TABLE, Self::VALUES)
    }
}

/// Quality of technical and organisational safeguards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskManagement {
    ProactiveSafeguards,
    ReactiveOnly,
    InsufficientProtection,
    NotApplicable,
}

impl RiskManagement {
    pub const FIELD: &'static str = "risk_management_and_safeguards";
    pub const VALUES: &'static [&'static str] = &[
        "proactive_safeguards",
        "reactive_only",
        "insufficient_protection",
        "not_applicable",
    ];

    const TABLE: &'static [(Self, &'static str)] = &[
        (Self::ProactiveSafeguards, "proactive_safeguards"),
        (Self::ReactiveOnly, "reactive_only"),
        (Self::InsufficientProtection, "insufficient_protection"),
        (Self::NotApplicable, "not_applicable"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProactiveSafeguards => "proactive_safeguards",
            Self::ReactiveOnly => "reactive_only",
            Self::InsufficientProtection => "insufficient_protection",
            Self::NotApplicable => "not_applicable",
        }
    }
}

impl FromStr for RiskManagement {
    type Err = InvalidLabel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(Self::FIELD, s, Self::TABLE, Self::VALUES)
    }
}

/// Accountability and governance posture of the organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accountability {
    FullyAccountable,
    PartiallyAccountable,
    NotAccountable,
    NotRequired,
}

impl Accountability {
    pub const FIELD: &'static str = "accountability_and_governance";
    pub const VALUES: &'static [&'static str] = &[
        "fully_accountable",
        "partially_accountable",
        "not_accountable",
        "not_required",
    ];

    const TABLE: &'static [(Self, &'static str)] = &[
        (Self::FullyAccountable, "fully_accountable"),
        (Self::PartiallyAccountable, "partially_accountable"),
        (Self::NotAccountable, "not_accountable"),
        (Self::NotRequired, "not_required"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyAccountable => "fully_accountable",
            Self::PartiallyAccountable => "partially_accountable",
            Self::NotAccountable => "not_accountable",
            Self::NotRequired => "not_required",
        }
    }
}

impl FromStr for Accountability {
    type Err = InvalidLabel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(Self::FIELD, s, Self::TABLE, Self::VALUES)
    }
}

// ============ Case input ============

/// A validated breach case: free-text description plus the four
/// classification labels supplied by the case-intake collaborator.
#[derive(Debug, Clone)]
pub struct CaseInput {
    pub description: String,
    pub lawfulness: Lawfulness,
    pub rights: RightsCompliance,
    pub risk: RiskManagement,
    pub governance: Accountability,
}

impl CaseInput {
    /// Validate raw string fields into a typed `CaseInput`.
    ///
    /// Rejects unrecognized labels and empty descriptions before any
    /// external call is made.
    pub fn parse(
        description: &str,
        lawfulness: &str,
        rights: &str,
        risk: &str,
        governance: &str,
    ) -> Result<Self, InvalidLabel> {
        let description = description.trim();
        if description.is_empty() {
            return Err(InvalidLabel {
                field: "case_description",
                value: String::new(),
                expected: &["a non-empty description"],
            });
        }
        Ok(Self {
            description: description.to_string(),
            lawfulness: lawfulness.parse()?,
            rights: rights.parse()?,
            risk: risk.parse()?,
            governance: governance.parse()?,
        })
    }

    /// Build the hybrid-search query: the description enriched with the
    /// classification labels so categorical risk context participates in
    /// ranking, not just free text.
    pub fn search_query(&self) -> String {
        format!(
            "Case Description: {}\n\
             Lawfulness of Processing: {}\n\
             Data Subject Rights: {}\n\
             Risk Management: {}\n\
             Accountability: {}",
            self.description,
            self.lawfulness.as_str(),
            self.rights.as_str(),
            self.risk.as_str(),
            self.governance.as_str(),
        )
    }
}

// ============ Retrieval types ============

/// One ranked hit from the precedent store. Hits are chunk-level: several
/// hits may point at the same underlying case.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub case_id: String,
    pub score: f64,
}

/// Immutable precedent enforcement record fetched from the store.
///
/// `chunks` carries supporting detail text for deep comparison; it may be
/// empty, in which case workers fall back to the summary description.
#[derive(Debug, Clone, Deserialize)]
pub struct PrecedentCase {
    pub id: String,
    pub company: String,
    pub description: String,
    /// Fine in minor-unit EUR.
    pub fine: u64,
    pub date: NaiveDate,
    pub authority: String,
    #[serde(default)]
    pub chunks: Vec<String>,
}

// ============ Pipeline outputs ============

/// Bounded similarity verdict for one precedent, produced by exactly one
/// analysis worker (or substituted by the fallback policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityAssessment {
    pub precedent_id: String,
    /// 0–100.
    pub similarity: u8,
    pub explanation: String,
}

/// The aggregated estimate. The numeric part is derived deterministically;
/// the explanation is narrative only and never feeds back into the number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionResult {
    pub predicted_fine: u64,
    pub explanation: String,
}

/// Externally visible composite for one request: precedents paired with
/// their assessments (similarity desc, fine desc, id asc) plus the estimate.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub similar_cases: Vec<(PrecedentCase, SimilarityAssessment)>,
    pub prediction: PredictionResult,
}
