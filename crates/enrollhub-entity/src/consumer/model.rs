//! Consumer entity model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use enrollhub_core::types::ConsumerId;

use super::status::{CourseOutcome, Eligibility, QuotaTier};

/// A consumer record as returned by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    /// Consumer identifier.
    pub id: ConsumerId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Registration eligibility.
    pub eligibility: Eligibility,
    /// Which credit limit applies.
    #[serde(default)]
    pub quota_tier: QuotaTier,
    /// Outcome per previously completed course code.
    #[serde(default)]
    pub completed_courses: HashMap<String, CourseOutcome>,
}

impl Consumer {
    /// Create an eligible, standard-tier consumer with no history.
    pub fn eligible(id: impl Into<ConsumerId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            eligibility: Eligibility::Eligible,
            quota_tier: QuotaTier::Standard,
            completed_courses: HashMap::new(),
        }
    }

    /// Outcome of a previously completed course, if any.
    pub fn outcome_for(&self, course_code: &str) -> Option<CourseOutcome> {
        self.completed_courses.get(course_code).copied()
    }
}
