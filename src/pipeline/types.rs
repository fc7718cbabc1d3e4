//! Typed stage results. Each one is parsed from a single model response and
//! never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::{SchemaName, StageOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fitness {
    Fit,
    WeakFit,
    NoFit,
}

impl Fitness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fitness::Fit => "fit",
            Fitness::WeakFit => "weak_fit",
            Fitness::NoFit => "no_fit",
        }
    }

    /// `fit` and `weak_fit` count as a match.
    pub fn is_match(&self) -> bool {
        !matches!(self, Fitness::NoFit)
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitnessVerdict {
    #[serde(rename = "fit")]
    pub fitness: Fitness,
    pub reason: String,
}

impl StageOutput for FitnessVerdict {
    const SCHEMA: SchemaName = SchemaName::FitsResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub language: String,
    pub perspective: String,
    pub tense: String,
    pub tone: String,
    pub sentence_length: String,
    pub uses_references: bool,
}

impl StageOutput for StyleProfile {
    const SCHEMA: SchemaName = SchemaName::StyleResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: String,
    pub description: String,
}

/// Competencies in the order the model emitted them. Ids may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyList {
    pub competencies: Vec<Competency>,
}

impl StageOutput for CompetencyList {
    const SCHEMA: SchemaName = SchemaName::CompetenciesResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Covered,
    Partial,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub id: String,
    pub status: CoverageStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageAssessment {
    pub coverage: Vec<CoverageEntry>,
}

impl StageOutput for CoverageAssessment {
    const SCHEMA: SchemaName = SchemaName::CoverageResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencySummary {
    pub competency_id: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub competencies: Vec<CompetencySummary>,
}

impl StageOutput for EvidenceSummary {
    const SCHEMA: SchemaName = SchemaName::EvidenceResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceDraft {
    pub evidence: String,
}

impl StageOutput for EvidenceDraft {
    const SCHEMA: SchemaName = SchemaName::WriteResult;
}

/// A record that matched a free-text query, by its position in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkillMatch {
    pub skill_index: usize,
    pub fitness: Fitness,
}
