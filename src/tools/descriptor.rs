use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of capabilities a tool can provide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Search,
    Analyze,
    Synthesize,
    Validate,
    Custom(String),
}

impl CapabilityKind {
    pub fn custom(name: impl Into<String>) -> Self {
        CapabilityKind::Custom(name.into())
    }

    pub fn is_search(&self) -> bool {
        matches!(self, CapabilityKind::Search)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Search => f.write_str("search"),
            CapabilityKind::Analyze => f.write_str("analyze"),
            CapabilityKind::Synthesize => f.write_str("synthesize"),
            CapabilityKind::Validate => f.write_str("validate"),
            CapabilityKind::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<CapabilityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolDescriptor {
    pub fn builder(name: impl Into<String>, kind: CapabilityKind) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder::new(name, kind)
    }

    pub fn depends_on(&self, kind: &CapabilityKind) -> bool {
        self.dependencies.contains(kind)
    }
}

#[derive(Clone, Debug)]
pub struct ToolDescriptorBuilder {
    descriptor: ToolDescriptor,
}

impl ToolDescriptorBuilder {
    pub fn new(name: impl Into<String>, kind: CapabilityKind) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: name.into(),
                kind,
                dependencies: BTreeSet::new(),
                description: None,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = Some(description.into());
        self
    }

    pub fn depends_on(mut self, kind: CapabilityKind) -> Self {
        self.descriptor.dependencies.insert(kind);
        self
    }

    pub fn build(self) -> ToolDescriptor {
        self.descriptor
    }
}
