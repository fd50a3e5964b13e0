use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::world::CubeGrid;

use super::database::DefinitionRepository;
use super::quantity::Amount;
use super::types::ObjectType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub type_id: ObjectType,
    pub subtype_id: String,
    pub amount: Amount,
}

/// Requirements keyed by subtype name. Entries only ever grow.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementLedger {
    entries: HashMap<String, LedgerEntry>,
}

impl RequirementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to an existing entry or creates it on first reference.
    /// Returns `false` (leaving the entry untouched) if the sum overflows.
    pub fn add(&mut self, type_id: &ObjectType, subtype_id: &str, amount: Amount) -> bool {
        match self.entries.get_mut(subtype_id) {
            Some(entry) => match entry.amount.checked_add(amount) {
                Some(total) => {
                    entry.amount = total;
                    true
                }
                None => false,
            },
            None => {
                self.entries.insert(
                    subtype_id.to_string(),
                    LedgerEntry {
                        type_id: type_id.clone(),
                        subtype_id: subtype_id.to_string(),
                        amount,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, subtype_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(subtype_id)
    }

    pub fn amount(&self, subtype_id: &str) -> Amount {
        self.get(subtype_id)
            .map(|entry| entry.amount)
            .unwrap_or(Amount::ZERO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by subtype name, for stable output.
    pub fn sorted_entries(&self) -> Vec<&LedgerEntry> {
        let mut entries = self.entries.values().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.subtype_id.cmp(&b.subtype_id));
        entries
    }
}

/// Expands one level of the blueprint producing `(subtype_id, type_id)`.
///
/// Each prerequisite contributes `desired / result.amount * prerequisite.amount`.
/// Returns `base_production_time * desired`. Items without a blueprint are
/// skipped and cost no time. Callers wanting deeper flattening recurse on the
/// prerequisites themselves.
pub fn accumulate(
    repo: &DefinitionRepository,
    subtype_id: &str,
    type_id: &ObjectType,
    desired: Amount,
    ledger: &mut RequirementLedger,
) -> Duration {
    let Some(blueprint) = repo.find_blueprint_for_result(subtype_id, type_id) else {
        debug!(%type_id, subtype_id, "blueprint_not_found");
        return Duration::ZERO;
    };
    let Some(runs) = desired.checked_div(blueprint.result.amount) else {
        debug!(
            blueprint = %blueprint.key,
            "blueprint_result_amount_zero"
        );
        return Duration::ZERO;
    };

    for prerequisite in &blueprint.prerequisites {
        let added = runs
            .checked_mul(prerequisite.amount)
            .map(|contribution| {
                ledger.add(
                    &prerequisite.key.type_id,
                    &prerequisite.key.subtype_id,
                    contribution,
                )
            })
            .unwrap_or(false);
        if !added {
            warn!(
                blueprint = %blueprint.key,
                prerequisite = %prerequisite.key,
                "requirement_amount_overflow"
            );
        }
    }

    blueprint
        .base_production_time_seconds
        .checked_mul(desired)
        .and_then(Amount::as_duration_seconds)
        .unwrap_or_else(|| {
            warn!(blueprint = %blueprint.key, "production_time_overflow");
            Duration::ZERO
        })
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RequirementReport {
    pub block_count: usize,
    pub unknown_blocks: usize,
    pub mass: f64,
    pub components: RequirementLedger,
    pub materials: RequirementLedger,
    pub production_time: Duration,
}

/// Totals what it takes to build `grid`: the components of every block,
/// the one-level blueprint expansion of those components, and the grid mass.
pub fn structure_requirements(repo: &DefinitionRepository, grid: &CubeGrid) -> RequirementReport {
    let mut report = RequirementReport {
        block_count: grid.blocks.len(),
        ..RequirementReport::default()
    };

    for block in &grid.blocks {
        let Some(definition) = repo.find_cube_definition(
            &block.type_id,
            grid.grid_size,
            Some(block.subtype_name.as_str()),
        ) else {
            report.unknown_blocks += 1;
            continue;
        };
        for component in &definition.components {
            report.components.add(
                &ObjectType::Component,
                &component.subtype_id,
                Amount::from_integer(component.count as u64),
            );
            report.mass +=
                repo.component_mass(&component.subtype_id) as f64 * component.count as f64;
        }
    }

    for component in report.components.sorted_entries() {
        report.production_time += accumulate(
            repo,
            &component.subtype_id,
            &component.type_id,
            component.amount,
            &mut report.materials,
        );
    }

    debug!(
        blocks = report.block_count,
        unknown_blocks = report.unknown_blocks,
        components = report.components.len(),
        materials = report.materials.len(),
        "structure_requirements_computed"
    );
    report
}
