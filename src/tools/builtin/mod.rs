//! Builtin capability tools.
//!
//! | tool | kind | depends on |
//! |---|---|---|
//! | `web_search` | search | - |
//! | `query_analyzer` | analyze | - |
//! | `context_synthesizer` | synthesize | search, analyze |
//! | `quality_validator` | validate | synthesize |

pub mod analyze;
pub mod search;
pub mod synthesize;
pub(crate) mod text;
pub mod validate;

use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::search::DynSearchClient;

use super::ToolRegistry;

pub use analyze::{AnalyzeTool, QueryAnalysis, SubIntent};
pub use search::{RankedHit, SearchOutput, SearchTool};
pub use synthesize::{Conflict, ConflictKind, Source, SynthesisOutput, SynthesizeTool};
pub use validate::{assess_draft, QualityReport, ValidateTool};

/// Registers the four builtin tools in dependency order.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    search_client: DynSearchClient,
    search_config: SearchConfig,
) -> Result<()> {
    registry.register(Arc::new(SearchTool::new(search_client, search_config)))?;
    registry.register(Arc::new(AnalyzeTool::new()))?;
    registry.register(Arc::new(SynthesizeTool::new()))?;
    registry.register(Arc::new(ValidateTool::new()))?;
    Ok(())
}

/// Registry with the builtin tools, validated and ready for an orchestrator.
pub fn builtin_registry(
    search_client: DynSearchClient,
    search_config: SearchConfig,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, search_client, search_config)?;
    registry.validate()?;
    Ok(registry)
}
