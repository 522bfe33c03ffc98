//! One-shot SQL generation from a plain-language requirement.

use serde::Serialize;

use querypilot_llm::{CompletionRequest, Message, SharedBackend};

use crate::error::{AgentError, Result};
use crate::event::UsageReport;
use crate::schema::{Schema, format_schema_listing};

/// Token budget for a generation request.
pub const GENERATE_MAX_TOKENS: u32 = 2048;

const GENERATE_SYSTEM_PROMPT: &str = "You are an expert SQL query writer. Your task is to generate SQL queries based on the given database schema and user requirements.

Rules:
1. Only use tables and columns that exist in the provided schema.
2. Write efficient and optimized queries.
3. Use appropriate JOINs, subqueries, and window functions when needed.
4. Follow SQL best practices.
5. Return ONLY the SQL query without any explanation or markdown formatting.
6. If the requirement is unclear or cannot be fulfilled with the given schema, explain why briefly.
7. If ontology/metadata information is provided, use it to better understand the data relationships and business context.";

/// What to generate a query for.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub schema: &'a Schema,
    pub requirement: &'a str,
    pub data_source_type: &'a str,
    pub ontology: Option<&'a str>,
}

/// A generated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedQuery {
    pub query: String,
    pub model: String,
    pub usage: UsageReport,
}

/// Build the user prompt for a generation request.
pub fn generation_prompt(request: &GenerateRequest<'_>) -> String {
    let ontology_section = match request.ontology {
        Some(text) if !text.trim().is_empty() => {
            format!("\nOntology/Metadata Information:\n{}\n\n", text)
        }
        _ => String::new(),
    };

    format!(
        "Database Type: {}\n\nDatabase Schema:\n{}\n{}User Requirement:\n{}\n\nPlease generate the SQL query.",
        request.data_source_type,
        format_schema_listing(request.schema),
        ontology_section,
        request.requirement,
    )
}

/// Remove a surrounding Markdown code fence, if the reply has one.
pub fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    // Drop the opening fence line (``` or ```sql).
    let mut lines: Vec<&str> = text.lines().skip(1).collect();
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Ask the model for a single query, without tools or streaming.
pub async fn generate_query(
    backend: &SharedBackend,
    model: &str,
    request: GenerateRequest<'_>,
) -> Result<GeneratedQuery> {
    let completion = CompletionRequest::new(
        model,
        vec![Message::user(generation_prompt(&request))],
        GENERATE_MAX_TOKENS,
    )
    .with_system(GENERATE_SYSTEM_PROMPT);

    let response = backend.complete(completion).await?;
    let text = response.text();
    if text.trim().is_empty() {
        return Err(AgentError::EmptyResponse);
    }

    tracing::info!(
        model = %response.model,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "Generated query"
    );

    Ok(GeneratedQuery {
        query: strip_code_fence(&text),
        model: response.model,
        usage: response.usage.into(),
    })
}
