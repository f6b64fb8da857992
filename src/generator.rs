//! Heuristic SQL synthesis.
//!
//! The rule-based fallback used when no AI provider is configured, and the
//! reference behavior AI output is sanity-checked against. Table matching is
//! substring/singular overlap first, then column-hit scoring with a fuzzy
//! tie-breaker; synthesis is intent-shaped and always row-capped. Every
//! generated query goes through the safety validator before it is marked
//! valid.

use crate::intent::{classify_intent, QueryIntent};
use crate::safety::QueryValidator;
use crate::schema::{SchemaData, SourceSchema, TableSchema};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::debug;

const FUZZY_TABLE_THRESHOLD: f64 = 0.92;

/// One synthesized query. `sql` is `None` when validation failed, in which
/// case `validation_error` explains why.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuery {
    pub connection_id: String,
    pub table: String,
    pub sql: Option<String>,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuerySet {
    pub intent: QueryIntent,
    pub queries: Vec<GeneratedQuery>,
}

pub struct QueryGenerator {
    row_cap: usize,
}

impl QueryGenerator {
    pub fn new(row_cap: usize) -> Self {
        Self { row_cap }
    }

    /// Generate one query per relational connection for the given message.
    pub fn generate(&self, user_message: &str, schemas: &[SourceSchema]) -> GeneratedQuerySet {
        let intent = classify_intent(user_message);
        let message = user_message.to_lowercase();
        let mut queries = Vec::new();

        for schema in schemas {
            let tables = match &schema.schema_data {
                SchemaData::Relational { tables } if !tables.is_empty() => tables,
                _ => continue,
            };
            let table = match self.match_table(&message, tables) {
                Some(t) => t,
                None => continue,
            };
            debug!(source = %schema.source_id, table = %table.name, %intent, "matched table for generation");
            queries.push(self.synthesize(&schema.source_id, intent, table, &message));
        }

        GeneratedQuerySet { intent, queries }
    }

    /// Match a table to the message: direct name/singular substring overlap
    /// first, then a fuzzy pass over message words, then column-hit scoring,
    /// falling back to the first table.
    fn match_table<'a>(&self, message: &str, tables: &'a [TableSchema]) -> Option<&'a TableSchema> {
        if tables.is_empty() {
            return None;
        }

        for table in tables {
            let name = table.name.to_lowercase();
            let singular = name.strip_suffix('s').unwrap_or(&name);
            if message.contains(&name) || message.contains(singular) {
                return Some(table);
            }
        }

        for table in tables {
            let name = table.name.to_lowercase();
            if message
                .split_whitespace()
                .any(|w| jaro_winkler(w, &name) >= FUZZY_TABLE_THRESHOLD)
            {
                return Some(table);
            }
        }

        // Score by how many column names appear in the message.
        let best = tables
            .iter()
            .map(|t| {
                let hits = t
                    .columns
                    .iter()
                    .filter(|c| message.contains(&c.name.to_lowercase()))
                    .count();
                (hits, t)
            })
            .max_by_key(|(hits, _)| *hits);

        match best {
            Some((hits, table)) if hits > 0 => Some(table),
            _ => tables.first(),
        }
    }

    /// Columns whose names appear in the message, always including at least
    /// one primary-key column. Empty overlap means "select everything".
    fn select_columns(&self, table: &TableSchema, message: &str) -> Vec<String> {
        let mut cols: Vec<String> = table
            .columns
            .iter()
            .filter(|c| message.contains(&c.name.to_lowercase()))
            .map(|c| c.name.clone())
            .collect();

        if !cols.is_empty() {
            if let Some(pk) = table.primary_keys.first() {
                if !cols.iter().any(|c| c == pk) {
                    cols.insert(0, pk.clone());
                }
            }
        }
        cols
    }

    /// A non-key, non-numeric column referenced by the message, usable as a
    /// grouping dimension.
    fn grouping_column(&self, table: &TableSchema, message: &str) -> Option<String> {
        table
            .columns
            .iter()
            .filter(|c| !c.primary_key && !crate::schema::is_numeric_type(&c.data_type))
            .find(|c| message.contains(&c.name.to_lowercase()))
            .map(|c| c.name.clone())
    }

    fn synthesize(
        &self,
        connection_id: &str,
        intent: QueryIntent,
        table: &TableSchema,
        message: &str,
    ) -> GeneratedQuery {
        let t = &table.name;
        let cap = self.row_cap;
        let (sql, explanation) = match intent {
            QueryIntent::Count => match self.grouping_column(table, message) {
                Some(g) => (
                    format!(
                        "SELECT {g}, COUNT(*) AS count FROM {t} t GROUP BY {g} ORDER BY count DESC LIMIT {cap}"
                    ),
                    format!("Count of {} rows grouped by {}", t, g),
                ),
                None => (
                    format!("SELECT COUNT(*) AS total_count FROM {t} t"),
                    format!("Total row count of {}", t),
                ),
            },
            QueryIntent::Average | QueryIntent::Sum | QueryIntent::Max | QueryIntent::Min => {
                match table.first_numeric_column() {
                    Some(num) => {
                        let (func, label) = match intent {
                            QueryIntent::Average => ("AVG", "average"),
                            QueryIntent::Sum => ("SUM", "total"),
                            QueryIntent::Max => ("MAX", "max"),
                            _ => ("MIN", "min"),
                        };
                        let col = &num.name;
                        (
                            format!("SELECT {func}(t.{col}) AS {label}_{col} FROM {t} t"),
                            format!("{} of {}.{}", label, t, col),
                        )
                    }
                    // No numeric column to aggregate over; fall back to a count.
                    None => (
                        format!("SELECT COUNT(*) AS total_count FROM {t} t"),
                        format!("{} has no numeric column; falling back to a row count", t),
                    ),
                }
            }
            QueryIntent::Group => {
                let group = self
                    .grouping_column(table, message)
                    .or_else(|| {
                        table
                            .columns
                            .iter()
                            .find(|c| !c.primary_key && !crate::schema::is_numeric_type(&c.data_type))
                            .map(|c| c.name.clone())
                    });
                match group {
                    Some(g) => (
                        format!(
                            "SELECT {g}, COUNT(*) AS count FROM {t} t GROUP BY {g} ORDER BY count DESC LIMIT {cap}"
                        ),
                        format!("Breakdown of {} by {}", t, g),
                    ),
                    None => self.default_select(table, message),
                }
            }
            QueryIntent::Trend => match table.first_temporal_column() {
                Some(d) => {
                    let col = &d.name;
                    (
                        format!(
                            "SELECT {col}, COUNT(*) AS count FROM {t} t GROUP BY {col} ORDER BY {col} ASC LIMIT {cap}"
                        ),
                        format!("Trend of {} over {}", t, col),
                    )
                }
                None => self.default_select(table, message),
            },
            QueryIntent::List | QueryIntent::Compare => self.default_select(table, message),
        };

        let outcome = QueryValidator::validate(&sql);
        if outcome.valid {
            GeneratedQuery {
                connection_id: connection_id.to_string(),
                table: t.clone(),
                sql: Some(sql),
                valid: true,
                validation_error: None,
                explanation,
            }
        } else {
            GeneratedQuery {
                connection_id: connection_id.to_string(),
                table: t.clone(),
                sql: None,
                valid: false,
                validation_error: outcome.reason,
                explanation,
            }
        }
    }

    fn default_select(&self, table: &TableSchema, message: &str) -> (String, String) {
        let t = &table.name;
        let cap = self.row_cap;
        let cols = self.select_columns(table, message);
        let projection = if cols.is_empty() { "*".to_string() } else { cols.join(", ") };
        (
            format!("SELECT {projection} FROM {t} t LIMIT {cap}"),
            format!("Sample of rows from {}", t),
        )
    }
}
