//! Keyword-driven intent classification and visualization hints.
//!
//! Both functions are pure and independently testable; orchestration code
//! never embeds its own keyword matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Heuristically classified purpose of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    Count,
    Average,
    Sum,
    Max,
    Min,
    Group,
    List,
    Compare,
    Trend,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryIntent::Count => "COUNT",
            QueryIntent::Average => "AVERAGE",
            QueryIntent::Sum => "SUM",
            QueryIntent::Max => "MAX",
            QueryIntent::Min => "MIN",
            QueryIntent::Group => "GROUP",
            QueryIntent::List => "LIST",
            QueryIntent::Compare => "COMPARE",
            QueryIntent::Trend => "TREND",
        };
        f.write_str(s)
    }
}

impl FromStr for QueryIntent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COUNT" => Ok(QueryIntent::Count),
            "AVERAGE" | "AVG" => Ok(QueryIntent::Average),
            "SUM" => Ok(QueryIntent::Sum),
            "MAX" => Ok(QueryIntent::Max),
            "MIN" => Ok(QueryIntent::Min),
            "GROUP" => Ok(QueryIntent::Group),
            "LIST" => Ok(QueryIntent::List),
            "COMPARE" => Ok(QueryIntent::Compare),
            "TREND" => Ok(QueryIntent::Trend),
            _ => Err(()),
        }
    }
}

/// Classify a message by keyword, checked in fixed priority order:
/// COUNT, AVERAGE, SUM, MAX, MIN, GROUP, LIST, COMPARE, TREND. Defaults to
/// LIST when nothing matches.
pub fn classify_intent(message: &str) -> QueryIntent {
    let m = message.to_lowercase();
    let any = |keywords: &[&str]| keywords.iter().any(|k| m.contains(k));

    if any(&["count", "how many", "number of"]) {
        QueryIntent::Count
    } else if any(&["average", "avg", "mean "]) {
        QueryIntent::Average
    } else if any(&["sum", "total"]) {
        QueryIntent::Sum
    } else if any(&["max", "highest", "largest", "most expensive", "top "]) {
        QueryIntent::Max
    } else if any(&["min", "lowest", "smallest", "cheapest"]) {
        QueryIntent::Min
    } else if any(&["group", "breakdown", "by category", "per ", "for each"]) {
        QueryIntent::Group
    } else if any(&["list", "show", "display", "give me all"]) {
        QueryIntent::List
    } else if any(&["compare", "versus", " vs"]) {
        QueryIntent::Compare
    } else if any(&["trend", "over time", "monthly", "weekly", "daily", "growth"]) {
        QueryIntent::Trend
    } else {
        QueryIntent::List
    }
}

/// Rendering hint for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationHint {
    KpiCard,
    PieChart,
    BarChart,
    LineChart,
    Table,
}

/// Map {intent, row count} to a visualization hint. Pure, stateless lookup:
/// a single value reads as a KPI card, a few groups as a pie, many rows as a
/// bar/line/table depending on shape.
pub fn suggest_visualization(intent: QueryIntent, row_count: usize) -> VisualizationHint {
    if row_count <= 1 {
        return VisualizationHint::KpiCard;
    }
    match intent {
        QueryIntent::Trend => VisualizationHint::LineChart,
        QueryIntent::Count
        | QueryIntent::Group
        | QueryIntent::Average
        | QueryIntent::Sum
        | QueryIntent::Max
        | QueryIntent::Min => {
            if row_count <= 6 {
                VisualizationHint::PieChart
            } else if row_count <= 25 {
                VisualizationHint::BarChart
            } else {
                VisualizationHint::Table
            }
        }
        QueryIntent::Compare => VisualizationHint::BarChart,
        QueryIntent::List => VisualizationHint::Table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_priority_order() {
        // "count" outranks everything else present in the message.
        assert_eq!(classify_intent("count the total orders per region"), QueryIntent::Count);
        assert_eq!(classify_intent("what is the average order value"), QueryIntent::Average);
        assert_eq!(classify_intent("total revenue last year"), QueryIntent::Sum);
        assert_eq!(classify_intent("highest salary in engineering"), QueryIntent::Max);
        assert_eq!(classify_intent("cheapest product we sell"), QueryIntent::Min);
        assert_eq!(classify_intent("breakdown of orders per region"), QueryIntent::Group);
        assert_eq!(classify_intent("show customers from berlin"), QueryIntent::List);
        assert_eq!(classify_intent("q1 versus q2 revenue"), QueryIntent::Compare);
        assert_eq!(classify_intent("signups over time"), QueryIntent::Trend);
    }

    #[test]
    fn defaults_to_list() {
        assert_eq!(classify_intent("customers in berlin"), QueryIntent::List);
    }

    #[test]
    fn intent_round_trips_through_str() {
        for intent in [
            QueryIntent::Count,
            QueryIntent::Average,
            QueryIntent::Trend,
            QueryIntent::List,
        ] {
            assert_eq!(intent.to_string().parse::<QueryIntent>().unwrap(), intent);
        }
        assert!("SUMMON".parse::<QueryIntent>().is_err());
    }

    #[test]
    fn visualization_lookup() {
        assert_eq!(suggest_visualization(QueryIntent::Count, 1), VisualizationHint::KpiCard);
        assert_eq!(suggest_visualization(QueryIntent::Sum, 0), VisualizationHint::KpiCard);
        assert_eq!(suggest_visualization(QueryIntent::Group, 4), VisualizationHint::PieChart);
        assert_eq!(suggest_visualization(QueryIntent::Count, 15), VisualizationHint::BarChart);
        assert_eq!(suggest_visualization(QueryIntent::Group, 200), VisualizationHint::Table);
        assert_eq!(suggest_visualization(QueryIntent::Trend, 30), VisualizationHint::LineChart);
        assert_eq!(suggest_visualization(QueryIntent::List, 50), VisualizationHint::Table);
    }
}
