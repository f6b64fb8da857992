//! Read-only query gate.
//!
//! Every query headed for a live connection passes through here, whether it
//! came from the heuristic generator or an AI provider. The scan is
//! intentionally conservative: a forbidden keyword anywhere in the text is a
//! rejection, even inside a string literal. False positives are an accepted
//! trade for never letting a mutation through.

use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

pub const FORBIDDEN_KEYWORDS: [&str; 14] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "CALL", "MERGE", "REPLACE",
];

lazy_static! {
    static ref FORBIDDEN_RE: Regex = Regex::new(&format!(
        r"(?i)\b({})\b",
        FORBIDDEN_KEYWORDS.join("|")
    ))
    .unwrap();
}

/// Outcome of validating one query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self { valid: false, reason: Some(reason.into()) }
    }
}

pub struct QueryValidator;

impl QueryValidator {
    /// Validate that `sql` is a read-only statement.
    ///
    /// Order of checks: blank input, forbidden keyword scan, then a grammar
    /// parse requiring a SELECT/WITH query. When the dialect defeats the
    /// parser, falls back to a textual prefix check.
    pub fn validate(sql: &str) -> ValidationOutcome {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return ValidationOutcome::rejected("query is empty");
        }

        // Strip a single trailing statement terminator.
        let stripped = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

        if let Some(m) = FORBIDDEN_RE.find(stripped) {
            return ValidationOutcome::rejected(format!(
                "forbidden keyword {} is not allowed in read-only queries",
                m.as_str().to_uppercase()
            ));
        }

        match Parser::parse_sql(&GenericDialect {}, stripped) {
            Ok(statements) => {
                if statements.is_empty() {
                    return ValidationOutcome::rejected("query is empty");
                }
                if statements.iter().all(|s| matches!(s, Statement::Query(_))) {
                    ValidationOutcome::ok()
                } else {
                    ValidationOutcome::rejected("only SELECT statements are allowed")
                }
            }
            // Unsupported dialect construct: accept only if it textually
            // starts like a read query.
            Err(_) => {
                let upper = stripped.trim_start().to_uppercase();
                if upper.starts_with("SELECT") || upper.starts_with("WITH") {
                    ValidationOutcome::ok()
                } else {
                    ValidationOutcome::rejected("statement could not be verified as a SELECT")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_blank() {
        assert!(!QueryValidator::validate("").valid);
        assert!(!QueryValidator::validate("   \n\t ").valid);
    }

    #[test]
    fn rejects_every_forbidden_keyword() {
        for kw in FORBIDDEN_KEYWORDS {
            let sql = format!("SELECT * FROM t WHERE note = {} 1", kw);
            let outcome = QueryValidator::validate(&sql);
            assert!(!outcome.valid, "{} should be rejected", kw);
            assert!(
                outcome.reason.as_deref().unwrap_or("").contains(kw),
                "reason should name {}",
                kw
            );
        }
    }

    #[test]
    fn rejects_piggybacked_drop() {
        let outcome = QueryValidator::validate("SELECT * FROM users; DROP TABLE users;");
        assert!(!outcome.valid);
        assert!(outcome.reason.unwrap().contains("DROP"));
    }

    #[test]
    fn rejects_keyword_in_subquery_and_any_case() {
        assert!(!QueryValidator::validate("SELECT 1 WHERE EXISTS (SELECT 1); delete from t").valid);
        assert!(!QueryValidator::validate("select * from t where x = 'ok'; Insert into t values (1)").valid);
    }

    #[test]
    fn conservatively_rejects_keyword_inside_literal() {
        // A false positive by design.
        assert!(!QueryValidator::validate("SELECT * FROM audit WHERE action = 'DELETE'").valid);
    }

    #[test]
    fn keyword_as_substring_of_identifier_is_fine() {
        // "created_at" contains "create" but not as a whole word.
        assert!(QueryValidator::validate("SELECT created_at FROM events").valid);
        assert!(QueryValidator::validate("SELECT updates_count FROM stats").valid);
    }

    #[test]
    fn accepts_plain_select_and_with() {
        assert!(QueryValidator::validate("SELECT id, name FROM users LIMIT 10").valid);
        assert!(QueryValidator::validate("SELECT * FROM a JOIN b ON a.id = b.a_id;").valid);
        assert!(
            QueryValidator::validate("WITH recent AS (SELECT * FROM events) SELECT * FROM recent").valid
        );
    }

    #[test]
    fn rejects_non_select_statement() {
        // SET parses but is not a query.
        assert!(!QueryValidator::validate("SET search_path TO public").valid);
    }

    #[test]
    fn unparseable_select_falls_back_to_prefix_check() {
        // Backtick-ish vendor syntax the generic dialect may refuse.
        assert!(QueryValidator::validate("SELECT x FROM t WHERE y ~* 'pat' :: weird").valid);
        assert!(!QueryValidator::validate("SHUTDOWN now please").valid);
    }
}
