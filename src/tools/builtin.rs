//! Built-in tools: `get_time` and `search`.
//!
//! ```rust
//! use parley::tools::builtin::get_time_tool;
//! use parley::tools::Tool;
//!
//! let tool = get_time_tool();
//! assert_eq!(tool.name(), "get_time");
//! ```

use std::sync::Arc;

use crate::lookup::{LookupClient, SearchHit};
use crate::tools::tool::{FnTool, Tool, ToolExecutionContext};
use crate::tools::types::{ToolDeclaration, ToolParameters};

/// Number of ranked results requested by the `search` tool.
pub const SEARCH_TOP_K: usize = 5;

const SEARCH_SEPARATOR: &str = "\n-----\n";

/// Create the `get_time` tool, which reports the local wall-clock time.
pub fn get_time_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "get_time",
        "Get the current local date and time",
        None,
        |_args, _ctx: ToolExecutionContext| async move { Ok(format_local_time()) },
    ))
}

fn format_local_time() -> String {
    chrono::Local::now()
        .format("%A, %B %-d, %Y %-I:%M:%S %p")
        .to_string()
}

/// Create the `search` tool.
///
/// With no lookup client every call yields an empty string.
pub fn search_tool(client: Option<Arc<dyn LookupClient>>) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "search",
        "Search the knowledge base for passages relevant to the query",
        Some(
            ToolParameters::object()
                .string("query", "What to look up", true)
                .build(),
        ),
        move |args, _ctx: ToolExecutionContext| {
            let client = client.clone();
            async move {
                let Some(client) = client else {
                    return Ok(String::new());
                };
                let query = args.get_str("query")?;
                let options = client.options(SEARCH_TOP_K);
                let hits = client.search(query, &options).await?;
                Ok(format_hits(&hits))
            }
        },
    ))
}

/// Render hits in ranked order as `[<identifier>]: <content>` blocks.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("[{}]: {}{SEARCH_SEPARATOR}", hit.identifier, hit.content))
        .collect()
}

/// Declaration of the reference `get_weather` tool, which has no executor.
pub fn weather_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "get_weather",
        "Get the current weather for a location",
        Some(
            ToolParameters::object()
                .string("location", "City and region", true)
                .string_enum("unit", "Temperature unit", &["celsius", "fahrenheit"], false)
                .build(),
        ),
    )
}

/// Declaration of the reference `calculate` tool, which has no executor.
pub fn calculator_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "calculate",
        "Evaluate an arithmetic expression",
        Some(
            ToolParameters::object()
                .string("expression", "Expression to evaluate", true)
                .build(),
        ),
    )
}
