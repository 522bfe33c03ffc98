//! System prompts.

use crate::schema::{Schema, format_schema_context};

/// Build the assistant's system prompt for one data source.
///
/// The ontology section appears only when `ontology` has non-blank text.
pub fn system_prompt(schema: &Schema, data_source_type: &str, ontology: Option<&str>) -> String {
    let schema_summary = format_schema_context(schema);

    let ontology_section = match ontology {
        Some(text) if !text.trim().is_empty() => {
            format!("\n## Ontology/Metadata\n{}\n", text)
        }
        _ => String::new(),
    };

    format!(
        "You are an expert SQL assistant for a {data_source_type} database. Help users explore data and write SQL queries through conversation.

## Available Tables
{schema_summary}
{ontology_section}
## Your Capabilities
You have access to tools to help users:
1. **get_schema**: Get detailed schema for specific tables (columns and types)
2. **get_sample_data**: View sample rows from tables (max 5 rows)
3. **execute_query**: Run SQL queries to verify results (max 100 rows)

## Guidelines
- Use tools proactively to understand the data before writing queries
- When suggesting SQL queries, format them in ```sql code blocks
- Explain your reasoning and what the query does
- If a query doesn't work, debug it using the tools
- Keep responses concise but helpful
- Ask clarifying questions if the user's request is ambiguous"
    )
}
