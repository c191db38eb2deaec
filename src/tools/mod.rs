pub mod builtin;
mod descriptor;
mod registry;
mod stats;
mod tool;

pub use descriptor::{CapabilityKind, ToolDescriptor, ToolDescriptorBuilder};
pub use registry::{StatsSnapshot, ToolRegistry, ToolReport};
pub use stats::PerformanceStats;
pub use tool::{
    CapabilityTool, DynTool, ToolContext, ToolError, ToolErrorKind, ToolRequest,
    ToolRequestBuilder, ToolResult,
};
