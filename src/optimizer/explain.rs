//! Explain output for physical plans
//!
//! Deterministic: the same plan always renders the same text and JSON.

use std::fmt;

use serde::Serialize;

use super::errors::PlannerError;
use super::plan::PlanNode;

/// One node of an explained plan
#[derive(Debug, Clone, Serialize)]
pub struct ExplainNode {
    pub operator: String,
    pub detail: String,
    pub schema: Vec<String>,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    fn from_plan(plan: &PlanNode) -> Self {
        let schema = plan
            .schema()
            .attributes()
            .iter()
            .map(|a| a.to_string())
            .collect();
        let (operator, detail, children) = match plan {
            PlanNode::Scan { relation, .. } => ("Scan", relation.clone(), vec![]),
            PlanNode::Select { input, condition } => {
                ("Select", condition.to_string(), vec![Self::from_plan(input)])
            }
            PlanNode::Join(join) => (
                "Join",
                format!(
                    "{} [{}, buffers={}]",
                    join.condition, join.strategy, join.num_buffers
                ),
                vec![Self::from_plan(&join.left), Self::from_plan(&join.right)],
            ),
            PlanNode::Sort {
                input,
                keys,
                num_buffers,
            } => (
                "Sort",
                format!(
                    "{} [buffers={}]",
                    keys.iter()
                        .map(|k| k.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    num_buffers
                ),
                vec![Self::from_plan(input)],
            ),
            PlanNode::Project {
                input, attributes, ..
            } => (
                "Project",
                attributes
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                vec![Self::from_plan(input)],
            ),
        };
        Self {
            operator: operator.to_string(),
            detail,
            schema,
            children,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{}{} {}", "  ".repeat(depth), self.operator, self.detail)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Explain plan output
#[derive(Debug, Clone, Serialize)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    /// Plan tree (if accepted)
    pub root: Option<ExplainNode>,
    /// Base relations in join order
    pub join_order: Vec<String>,
    pub joins: usize,
    /// Rejection error code (if rejected)
    pub rejection_code: Option<String>,
    /// Rejection reason (if rejected)
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &PlanNode) -> Self {
        Self {
            accepted: true,
            root: Some(ExplainNode::from_plan(plan)),
            join_order: plan.relations().into_iter().map(String::from).collect(),
            joins: plan.join_count(),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &PlannerError) -> Self {
        Self {
            accepted: false,
            root: None,
            join_order: Vec::new(),
            joins: 0,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.accepted {
            writeln!(f, "REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "reason: {}", reason)?;
            }
            return Ok(());
        }
        writeln!(f, "join order: {}", self.join_order.join(" -> "))?;
        if let Some(root) = &self.root {
            root.write_indented(f, 0)?;
        }
        Ok(())
    }
}
