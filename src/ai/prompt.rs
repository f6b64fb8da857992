//! Schema-grounded prompt construction shared by all providers.

use crate::ai::types::ChatRequest;
use crate::schema::{SchemaData, SourceSchema};
use std::fmt::Write;

/// System prompt carrying the response JSON contract. Providers send this
/// verbatim; the parser depends on the shapes promised here.
pub const SYSTEM_PROMPT: &str = r#"You are a data analyst assistant working over several connected data sources. You translate a user's question into read-only queries against the schemas provided.

Rules:
1. Only read data. Never produce INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, TRUNCATE, GRANT, REVOKE, EXEC, CALL, MERGE or REPLACE statements.
2. Ground every query in the schemas below. Never invent tables, columns, tools or indices.
3. If the question is ambiguous, ask for clarification instead of guessing.
4. When a later query needs a value produced by an earlier one, chain them with step/dependsOn/outputAs/outputField and reference the value as $name in the later query text.
5. Return ONLY valid JSON, no other text, in exactly this shape:

{
  "type": "CLARIFICATION_NEEDED" | "READY_TO_EXECUTE" | "DIRECT_ANSWER",
  "content": "short natural-language summary",
  "intent": "COUNT|AVERAGE|SUM|MAX|MIN|GROUP|LIST|COMPARE|TREND",
  "clarificationQuestion": "only for CLARIFICATION_NEEDED",
  "suggestedOptions": ["only for CLARIFICATION_NEEDED"],
  "dataRequests": [
    {
      "requestType": "SQL_QUERY" | "TOOL_CALL" | "RESOURCE_READ" | "DOCUMENT_QUERY" | "SEARCH_QUERY",
      "sourceId": "connection id from the schema listing",
      "step": 1,
      "dependsOn": null,
      "outputAs": "variable name for chaining, optional",
      "outputField": "result column feeding the variable, optional",
      "explanation": "what this request answers",
      "sql": "for SQL_QUERY",
      "toolName": "for TOOL_CALL", "arguments": {},
      "uri": "for RESOURCE_READ",
      "collection": "for DOCUMENT_QUERY", "filter": {},
      "query": "for SEARCH_QUERY", "index": "optional"
    }
  ]
}
"#;

/// Render schema snapshots into a prompt section. Sample rows are already
/// bounded by extraction; `sample_cap` bounds them again defensively.
pub fn render_schemas(schemas: &[SourceSchema], sample_cap: usize) -> String {
    let mut out = String::new();
    for schema in schemas {
        let _ = writeln!(
            out,
            "### Source '{}' (id: {}, type: {})",
            schema.source_name, schema.source_id, schema.source_type
        );
        match &schema.schema_data {
            SchemaData::Relational { tables } => {
                for table in tables {
                    let cols = table
                        .columns
                        .iter()
                        .map(|c| {
                            let mut desc = format!("{} {}", c.name, c.data_type);
                            if c.primary_key {
                                desc.push_str(" [pk]");
                            }
                            if !c.nullable {
                                desc.push_str(" [not null]");
                            }
                            desc
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = writeln!(out, "- table {} ({})", table.name, cols);
                    if let Some(rows) = schema.sample_data.get(&table.name) {
                        for row in rows.iter().take(sample_cap) {
                            let _ = writeln!(
                                out,
                                "  sample: {}",
                                serde_json::to_string(row).unwrap_or_default()
                            );
                        }
                    }
                }
            }
            SchemaData::Protocol { tools, resources } => {
                for tool in tools {
                    let _ = writeln!(out, "- tool {}: {}", tool.name, tool.description);
                }
                for resource in resources {
                    let _ = writeln!(out, "- resource {} ({})", resource.uri, resource.name);
                }
            }
            SchemaData::Document { collections } => {
                for collection in collections {
                    let mut fields: Vec<String> = collection
                        .fields
                        .iter()
                        .map(|(name, ty)| format!("{} {}", name, ty))
                        .collect();
                    fields.sort();
                    let _ = writeln!(out, "- collection {} ({})", collection.name, fields.join(", "));
                }
            }
            SchemaData::KeyValue { patterns } => {
                for pattern in patterns {
                    let _ = writeln!(
                        out,
                        "- key pattern {} (e.g. {})",
                        pattern.pattern,
                        pattern.sample_keys.join(", ")
                    );
                }
            }
        }
    }
    out
}

/// Build the user-turn prompt: schemas, preferences, then the question.
pub fn build_user_prompt(request: &ChatRequest, sample_cap: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Available schemas\n{}", render_schemas(&request.schemas, sample_cap));
    if let Some(prefs) = &request.preferences {
        if let Some(viz) = &prefs.preferred_visualization {
            let _ = writeln!(out, "Preferred visualization: {}", viz);
        }
        if let Some(limit) = prefs.row_limit {
            let _ = writeln!(out, "Limit result rows to {}", limit);
        }
    }
    let _ = writeln!(out, "\n## Question\n{}", request.user_message);
    out
}
