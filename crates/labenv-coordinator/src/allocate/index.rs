//! Index allocation for `<scope-prefix>-<index>` names
//!
//! Picks the smallest positive integer not used by a live resource of the
//! scope, so indices stay low and gaps left by deleted resources are reused.

use super::AllocationError;
use crate::provider::Inventory;
use labenv_common::{AllocatedName, ResourceKind, ResourceNode, ResourceScope};
use std::collections::HashSet;
use tracing::{debug, info};

/// Smallest positive integer not in `used`
pub fn next_index(used: impl IntoIterator<Item = u32>) -> u32 {
    let used: HashSet<u32> = used.into_iter().collect();
    let mut candidate = 1;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// Indices already taken in `scope` by `nodes`.
///
/// Names without a parseable trailing index are skipped: a naming anomaly on
/// one resource must not block provisioning of another.
pub fn used_indices<'a>(
    scope: &ResourceScope,
    nodes: impl IntoIterator<Item = &'a ResourceNode>,
) -> Vec<u32> {
    let prefix = scope.prefix();
    nodes
        .into_iter()
        .filter_map(|node| {
            let name = node.name.as_deref().unwrap_or(node.id.as_str());
            let index = AllocatedName::parse_index(&prefix, name);
            if index.is_none() {
                debug!(name = %name, prefix = %prefix, "Ignoring name without scope index");
            }
            index
        })
        .collect()
}

/// Allocates names against live inventory
pub struct IndexAllocator<'a, I> {
    inventory: &'a I,
}

impl<'a, I: Inventory> IndexAllocator<'a, I> {
    pub fn new(inventory: &'a I) -> Self {
        Self { inventory }
    }

    /// Next free name for a resource of `kind` in `scope`.
    ///
    /// An inventory answering not-found counts as no names in use. Two
    /// concurrent calls for the same scope can return the same name;
    /// callers serialise creation per scope.
    pub async fn next_name(
        &self,
        scope: &ResourceScope,
        kind: ResourceKind,
    ) -> Result<AllocatedName, AllocationError> {
        let existing = match self.inventory.list_by_tag(scope, kind).await {
            Ok(nodes) => nodes,
            Err(e) if e.is_not_found() => {
                debug!(scope = %scope, kind = %kind, error = %e, "Nothing to list, no names in use");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let used = used_indices(scope, &existing);
        let index = next_index(used.iter().copied());
        let name = AllocatedName::new(scope, index);

        info!(
            scope = %scope,
            kind = %kind,
            existing = existing.len(),
            name = %name,
            "Allocated name"
        );
        Ok(name)
    }
}
