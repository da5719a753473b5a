//! Planner error types
//!
//! Error codes:
//! - QP_PLAN_INVALID (REJECT)
//! - QP_UNKNOWN_RELATION (REJECT)
//! - QP_UNKNOWN_ATTRIBUTE (REJECT)
//! - QP_PLAN_DISCONNECTED (REJECT)
//! - QP_CONFIG_INSUFFICIENT_BUFFERS (REJECT)
//!
//! Every planner error is raised before any operator runs.

use std::fmt;

/// Planner failures only ever reject the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected before execution
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Malformed query structure
    QpPlanInvalid,
    /// Relation missing from the catalog or from-list
    QpUnknownRelation,
    /// Attribute not in its relation's schema
    QpUnknownAttribute,
    /// Join graph does not connect every relation
    QpPlanDisconnected,
    /// Fewer than 3 frames per join
    QpConfigInsufficientBuffers,
}

impl PlannerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::QpPlanInvalid => "QP_PLAN_INVALID",
            PlannerErrorCode::QpUnknownRelation => "QP_UNKNOWN_RELATION",
            PlannerErrorCode::QpUnknownAttribute => "QP_UNKNOWN_ATTRIBUTE",
            PlannerErrorCode::QpPlanDisconnected => "QP_PLAN_DISCONNECTED",
            PlannerErrorCode::QpConfigInsufficientBuffers => "QP_CONFIG_INSUFFICIENT_BUFFERS",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why a query was rejected during planning
#[derive(Debug, Clone)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    /// Relation name if applicable
    relation: Option<String>,
}

impl PlannerError {
    /// Create a plan invalid error
    pub fn plan_invalid(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::QpPlanInvalid,
            message: reason.into(),
            relation: None,
        }
    }

    /// Create an unknown relation error
    pub fn unknown_relation(relation: impl Into<String>) -> Self {
        let r = relation.into();
        Self {
            code: PlannerErrorCode::QpUnknownRelation,
            message: format!("Relation '{}' is not known", r),
            relation: Some(r),
        }
    }

    /// Create an unknown attribute error
    pub fn unknown_attribute(relation: impl Into<String>, column: &str) -> Self {
        let r = relation.into();
        Self {
            code: PlannerErrorCode::QpUnknownAttribute,
            message: format!("Relation '{}' has no attribute '{}'", r, column),
            relation: Some(r),
        }
    }

    /// Create a disconnected plan error
    pub fn disconnected(relations: &[String]) -> Self {
        Self {
            code: PlannerErrorCode::QpPlanDisconnected,
            message: format!(
                "No join condition connects {}; cartesian products are not supported",
                relations.join(", ")
            ),
            relation: relations.first().cloned(),
        }
    }

    /// Create an insufficient buffers error
    pub fn insufficient_buffers(total: usize, joins: usize) -> Self {
        Self {
            code: PlannerErrorCode::QpConfigInsufficientBuffers,
            message: format!(
                "{} buffers over {} joins leaves fewer than 3 per join",
                total, joins
            ),
            relation: None,
        }
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for PlannerError {}

/// Result of planning
pub type PlannerResult<T> = Result<T, PlannerError>;
