use std::path::{Path, PathBuf};

use crate::model::component::Component;
use crate::model::target::TargetEnvironment;
use crate::plugin::registry::DiscoveredPlugin;

/// A component with its destination, before conflict resolution.
#[derive(Debug, Clone)]
pub struct PlannedComponent {
    pub component: Component,
    /// Relative to the destination root.
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FilteredPlan {
    pub target: &'static TargetEnvironment,
    pub destination_root: PathBuf,
    pub components: Vec<PlannedComponent>,
    /// Components the target does not consume.
    pub dropped: usize,
}

pub struct CapabilityFilter {
    target: &'static TargetEnvironment,
}

impl CapabilityFilter {
    pub fn new(target: &'static TargetEnvironment) -> Self {
        Self { target }
    }

    pub fn apply(&self, plugins: &[&DiscoveredPlugin], base: &Path) -> FilteredPlan {
        let mut components = Vec::new();
        let mut dropped = 0;

        for component in plugins.iter().flat_map(|plugin| plugin.components.iter()) {
            let Some(destination) = self
                .target
                .place(component.kind, &component.relative_identifier)
            else {
                tracing::debug!(
                    target_id = self.target.id,
                    "dropping {}: kind not supported",
                    component.label()
                );
                dropped += 1;
                continue;
            };

            components.push(PlannedComponent {
                component: component.clone(),
                destination,
            });
        }

        FilteredPlan {
            target: self.target,
            destination_root: self.target.destination_root(base),
            components,
            dropped,
        }
    }
}
