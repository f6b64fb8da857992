//! Query plan ordering and variable substitution.
//!
//! Requests group by their `step` field and run in ascending step order. A
//! request with `dependsOn` set may only run after the referenced step bound
//! its `outputAs` variable. Substitution rewrites `$name` tokens with the
//! bound value: numeric-looking values go in unquoted, everything else is
//! single-quoted with embedded quotes doubled. The values come from prior
//! query results, not vetted user input, so they still get injection-safe
//! handling.

use crate::error::{EngineError, Result};
use crate::request::DataRequest;
use crate::schema::Row;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

lazy_static! {
    static ref VARIABLE_TOKEN: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Requests for one execution step, in their original order.
#[derive(Debug)]
pub struct ExecutionStep {
    pub step: u32,
    pub requests: Vec<DataRequest>,
}

/// Variables bound by earlier steps. Names are stored without the `$`.
#[derive(Debug, Default, Clone)]
pub struct VariableBindings {
    values: HashMap<String, String>,
}

impl VariableBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct QueryPlanner;

impl QueryPlanner {
    /// Group requests into ascending execution steps, rejecting dependency
    /// references that are not strictly backwards.
    pub fn order(requests: Vec<DataRequest>) -> Result<Vec<ExecutionStep>> {
        let mut grouped: BTreeMap<u32, Vec<DataRequest>> = BTreeMap::new();
        for request in requests {
            let step = request.step();
            if let Some(depends_on) = request.chain().depends_on {
                if depends_on >= step {
                    return Err(EngineError::Plan(format!(
                        "step {} cannot depend on step {}; dependencies must reference an earlier step",
                        step, depends_on
                    )));
                }
            }
            grouped.entry(step).or_default().push(request);
        }
        Ok(grouped
            .into_iter()
            .map(|(step, requests)| ExecutionStep { step, requests })
            .collect())
    }

    pub fn has_dependency(request: &DataRequest) -> bool {
        request.has_dependency()
    }

    /// Replace every `$name` token with its bound value. Tokens are matched
    /// whole, so a binding for `id` never touches `$idx`, and unbound tokens
    /// pass through untouched. Identity on text with no bound tokens.
    pub fn substitute(text: &str, variables: &VariableBindings) -> String {
        VARIABLE_TOKEN
            .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
                Some(value) if is_numeric_value(value) => value.to_string(),
                Some(value) => format!("'{}'", value.replace('\'', "''")),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Pull the chained output value from a result set. Field matching is
    /// case-insensitive; a single row yields the scalar as text, multiple
    /// rows yield all values joined with `", "` (ready for an `IN (...)`
    /// list). Empty input yields `None`.
    pub fn extract_output_value(rows: &[Row], field: &str) -> Option<String> {
        if rows.is_empty() {
            return None;
        }
        let values: Vec<String> = rows
            .iter()
            .filter_map(|row| {
                row.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(field))
                    .and_then(|(_, value)| value_as_text(value))
            })
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.join(", "))
    }
}

/// Numeric-looking values substitute unquoted. A comma-separated list of
/// numbers (the multi-row join) also counts, so it can sit directly inside
/// an `IN (...)` list.
fn is_numeric_value(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed
        .split(',')
        .all(|part| !part.trim().is_empty() && part.trim().parse::<f64>().is_ok())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ChainSpec, SqlQueryRequest};
    use serde_json::json;

    fn sql_step(sql: &str, step: u32, depends_on: Option<u32>) -> DataRequest {
        DataRequest::Sql(SqlQueryRequest {
            sql: sql.to_string(),
            chain: ChainSpec {
                step: Some(step),
                depends_on,
                ..ChainSpec::default()
            },
        })
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut r = Row::new();
        for (k, v) in pairs {
            r.insert(k.to_string(), v.clone());
        }
        r
    }

    #[test]
    fn substitute_is_identity_without_tokens() {
        let mut vars = VariableBindings::new();
        vars.bind("id", "7");
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM users", &vars),
            "SELECT * FROM users"
        );
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM t WHERE x = $other", &vars),
            "SELECT * FROM t WHERE x = $other"
        );
        // A longer unbound token sharing a bound prefix stays intact.
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM t WHERE a = $idx", &vars),
            "SELECT * FROM t WHERE a = $idx"
        );
    }

    #[test]
    fn bound_prefix_never_clobbers_a_longer_token() {
        let mut vars = VariableBindings::new();
        vars.bind("order", "9");
        assert_eq!(
            QueryPlanner::substitute("WHERE a = $order AND b = $order_id", &vars),
            "WHERE a = 9 AND b = $order_id"
        );
    }

    #[test]
    fn numeric_values_substitute_unquoted() {
        let mut vars = VariableBindings::new();
        vars.bind("id", "7");
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM orders WHERE id = $id", &vars),
            "SELECT * FROM orders WHERE id = 7"
        );
    }

    #[test]
    fn text_values_are_quoted_and_escaped() {
        let mut vars = VariableBindings::new();
        vars.bind("name", "O'Brien");
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM users WHERE name = $name", &vars),
            "SELECT * FROM users WHERE name = 'O''Brien'"
        );
    }

    #[test]
    fn numeric_list_substitutes_unquoted_for_in_lists() {
        let mut vars = VariableBindings::new();
        vars.bind("ids", "1, 2, 3");
        assert_eq!(
            QueryPlanner::substitute("SELECT * FROM t WHERE id IN ($ids)", &vars),
            "SELECT * FROM t WHERE id IN (1, 2, 3)"
        );
    }

    #[test]
    fn whole_token_matching_distinguishes_prefixed_names() {
        let mut vars = VariableBindings::new();
        vars.bind("id", "1");
        vars.bind("id_list", "2, 3");
        assert_eq!(
            QueryPlanner::substitute("WHERE a = $id AND b IN ($id_list)", &vars),
            "WHERE a = 1 AND b IN (2, 3)"
        );
    }

    #[test]
    fn extract_single_row_scalar() {
        let rows = vec![row(&[("total", json!(42))])];
        assert_eq!(
            QueryPlanner::extract_output_value(&rows, "total"),
            Some("42".to_string())
        );
    }

    #[test]
    fn extract_multi_row_joins_with_comma_space() {
        let rows = vec![
            row(&[("id", json!(1))]),
            row(&[("id", json!(2))]),
            row(&[("id", json!(3))]),
        ];
        assert_eq!(
            QueryPlanner::extract_output_value(&rows, "id"),
            Some("1, 2, 3".to_string())
        );
    }

    #[test]
    fn extract_matches_field_case_insensitively() {
        let rows = vec![row(&[("UserId", json!("u-9"))])];
        assert_eq!(
            QueryPlanner::extract_output_value(&rows, "userid"),
            Some("u-9".to_string())
        );
    }

    #[test]
    fn extract_on_empty_or_missing_yields_none() {
        assert_eq!(QueryPlanner::extract_output_value(&[], "id"), None);
        let rows = vec![row(&[("name", json!("ada"))])];
        assert_eq!(QueryPlanner::extract_output_value(&rows, "id"), None);
        let nulls = vec![row(&[("id", Value::Null)])];
        assert_eq!(QueryPlanner::extract_output_value(&nulls, "id"), None);
    }

    #[test]
    fn orders_steps_ascending() {
        let steps = QueryPlanner::order(vec![
            sql_step("SELECT 2", 2, Some(1)),
            sql_step("SELECT 1", 1, None),
            sql_step("SELECT 2b", 2, None),
        ])
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[1].step, 2);
        assert_eq!(steps[1].requests.len(), 2);
    }

    #[test]
    fn rejects_forward_and_self_dependencies() {
        assert!(QueryPlanner::order(vec![sql_step("SELECT 1", 1, Some(1))]).is_err());
        assert!(QueryPlanner::order(vec![sql_step("SELECT 1", 1, Some(3))]).is_err());
    }

    #[test]
    fn has_dependency_iff_depends_on_set() {
        assert!(QueryPlanner::has_dependency(&sql_step("SELECT 1", 2, Some(1))));
        assert!(!QueryPlanner::has_dependency(&sql_step("SELECT 1", 2, None)));
    }
}
