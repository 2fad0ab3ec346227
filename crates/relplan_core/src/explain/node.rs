use std::fmt::Write as _;

use relplan_error::{Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::explainable::{ExplainConfig, ExplainEntry, ExplainValue, Explainable};
use crate::execution::operators::PlanNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainFormat {
    Text,
    Json,
}

/// Explain entries for a plan, mirroring the shape of the plan tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    pub fn new_from_plan(verbose: bool, root: &PlanNode) -> Self {
        Self::walk(ExplainConfig { verbose }, root)
    }

    fn walk(conf: ExplainConfig, plan: &PlanNode) -> Self {
        let mut entry = plan.explain_entry(conf);
        if conf.verbose && plan.is_prepared() {
            entry.items.insert(
                "cost".to_string(),
                ExplainValue::Value(plan.cost().to_string()),
            );
            entry.items.insert(
                "schema".to_string(),
                ExplainValue::Value(plan.schema().to_string()),
            );
        }

        let children = plan
            .children()
            .into_iter()
            .map(|child| Self::walk(conf, child))
            .collect();

        ExplainNode { entry, children }
    }

    pub fn format(&self, format: ExplainFormat) -> Result<String> {
        match format {
            ExplainFormat::Text => self.format_text(0, String::new()),
            ExplainFormat::Json => {
                serde_json::to_string_pretty(self).context("failed to serialize explain output")
            }
        }
    }

    fn format_text(&self, indent: usize, mut buf: String) -> Result<String> {
        writeln!(buf, "{}{}", " ".repeat(indent), self.entry)
            .context("failed to write to explain buffer")?;

        for child in &self.children {
            buf = child.format_text(indent + 2, buf)?;
        }

        Ok(buf)
    }
}

/// Formats a plan tree into explain output.
pub fn format_plan_for_explain(plan: &PlanNode, format: ExplainFormat, verbose: bool) -> Result<String> {
    ExplainNode::new_from_plan(verbose, plan).format(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinType;
    use crate::execution::operators::testutil::{scan, test_tables};
    use crate::expr::Expression;

    fn join_plan() -> PlanNode {
        let tables = test_tables();
        let mut plan = PlanNode::nested_loop_join(
            scan(&tables, "t1"),
            scan(&tables, "t2"),
            JoinType::Inner,
            Some(Expression::eq(
                Expression::column("t1", "a"),
                Expression::column("t2", "b"),
            )),
        )
        .unwrap();
        plan.prepare().unwrap();
        plan
    }

    #[test]
    fn text_output_is_indented_tree() {
        let out = format_plan_for_explain(&join_plan(), ExplainFormat::Text, false).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(3, lines.len());
        assert!(lines[0].starts_with("NestedLoopJoin"));
        assert!(lines[1].starts_with("  FileScan (table = t1"));
        assert!(lines[2].starts_with("  FileScan (table = t2"));
    }

    #[test]
    fn verbose_output_includes_costs() {
        let node = ExplainNode::new_from_plan(true, &join_plan());
        assert!(node.entry.items.contains_key("cost"));
        assert!(node.children[0].entry.items.contains_key("schema"));
    }

    #[test]
    fn json_output_parses_back() {
        let out = format_plan_for_explain(&join_plan(), ExplainFormat::Json, false).unwrap();
        let node: ExplainNode = serde_json::from_str(&out).unwrap();
        assert_eq!(ExplainNode::new_from_plan(false, &join_plan()), node);
    }
}
