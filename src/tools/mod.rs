//! Tool system for function calling.

pub mod arguments;
pub mod builtin;
pub mod dispatcher;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dispatcher::ToolDispatcher;
pub use tool::{FnTool, Tool, ToolExecutionContext};
pub use types::{ToolDeclaration, ToolParameters};
