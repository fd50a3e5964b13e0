use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::definitions::{
    AmmoMagazineDefinition, BlueprintDefinition, ComponentDefinition, CubeBlockDefinition,
    Definitions, PhysicalItemDefinition, VoxelMaterialDefinition,
};
use super::types::{CubeSize, DefinitionKey, ObjectType};

/// Borrowed view of whichever table answered a [`DefinitionRepository::find_definition`] lookup.
#[derive(Debug, Clone, Copy)]
pub enum DefinitionRef<'a> {
    CubeBlock(&'a CubeBlockDefinition),
    PhysicalItem(&'a PhysicalItemDefinition),
    Component(&'a ComponentDefinition),
    AmmoMagazine(&'a AmmoMagazineDefinition),
}

impl<'a> DefinitionRef<'a> {
    pub fn key(&self) -> &'a DefinitionKey {
        match self {
            Self::CubeBlock(def) => &def.key,
            Self::PhysicalItem(def) => &def.key,
            Self::Component(def) => &def.item.key,
            Self::AmmoMagazine(def) => &def.item.key,
        }
    }

    pub fn display_name(&self) -> Option<&'a str> {
        match self {
            Self::CubeBlock(def) => def.display_name.as_deref(),
            Self::PhysicalItem(def) => def.display_name.as_deref(),
            Self::Component(def) => def.item.display_name.as_deref(),
            Self::AmmoMagazine(def) => def.item.display_name.as_deref(),
        }
    }

    /// Physical attributes, if the definition is something that can sit in an inventory.
    pub fn physical(&self) -> Option<&'a PhysicalItemDefinition> {
        match self {
            Self::CubeBlock(_) => None,
            Self::PhysicalItem(def) => Some(def),
            Self::Component(def) => Some(&def.item),
            Self::AmmoMagazine(def) => Some(&def.item),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefinitionCounts {
    pub cube_blocks: usize,
    pub components: usize,
    pub physical_items: usize,
    pub ammo_magazines: usize,
    pub voxel_materials: usize,
    pub blueprints: usize,
}

#[derive(Debug, Default, Clone)]
struct KeyIndex(HashMap<DefinitionKey, usize>);

impl KeyIndex {
    fn build<'a>(keys: impl Iterator<Item = &'a DefinitionKey>) -> Self {
        let mut index = HashMap::new();
        for (position, key) in keys.enumerate() {
            // First occurrence wins so lookups agree with load-order scans.
            index.entry(key.clone()).or_insert(position);
        }
        Self(index)
    }

    fn get(&self, type_id: &ObjectType, subtype_id: &str) -> Option<usize> {
        self.0
            .get(&DefinitionKey::new(type_id.clone(), subtype_id))
            .copied()
    }
}

/// Memo of voxel material indices by name, meant to live for the whole process.
///
/// Clones share one table. Every repository built with the same cache answers
/// `material_index` from it, so a name keeps the index it was first given even
/// when a reload changes the material table order.
#[derive(Debug, Clone, Default)]
pub struct MaterialIndexCache(Arc<Mutex<HashMap<String, u8>>>);

impl MaterialIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Static content loaded once at startup.
///
/// Everything is immutable after construction apart from the shared material
/// index memo, which is behind a mutex so parallel structure loads can share
/// one repository by reference.
#[derive(Debug, Default)]
pub struct DefinitionRepository {
    defs: Definitions,
    cube_index: KeyIndex,
    item_index: KeyIndex,
    component_index: KeyIndex,
    magazine_index: KeyIndex,
    material_cache: MaterialIndexCache,
}

impl DefinitionRepository {
    pub fn new(defs: Definitions, material_cache: MaterialIndexCache) -> Self {
        let cube_index = KeyIndex::build(defs.cube_blocks.iter().map(|def| &def.key));
        let item_index = KeyIndex::build(defs.physical_items.iter().map(|def| &def.key));
        let component_index = KeyIndex::build(defs.components.iter().map(|def| &def.item.key));
        let magazine_index = KeyIndex::build(defs.ammo_magazines.iter().map(|def| &def.item.key));
        Self {
            defs,
            cube_index,
            item_index,
            component_index,
            magazine_index,
            material_cache,
        }
    }

    /// Merges definition files in load order. A later definition with the same
    /// key replaces the earlier one in place, so positions stay stable.
    pub fn from_sources(
        sources: impl IntoIterator<Item = Definitions>,
        material_cache: MaterialIndexCache,
    ) -> Self {
        let mut merged = Definitions::default();
        for source in sources {
            merge_table(&mut merged.cube_blocks, source.cube_blocks, |def| &def.key);
            merge_table(&mut merged.components, source.components, |def| {
                &def.item.key
            });
            merge_table(&mut merged.physical_items, source.physical_items, |def| {
                &def.key
            });
            merge_table(&mut merged.ammo_magazines, source.ammo_magazines, |def| {
                &def.item.key
            });
            merge_table(&mut merged.voxel_materials, source.voxel_materials, |def| {
                &def.key
            });
            merge_table(&mut merged.blueprints, source.blueprints, |def| &def.key);
        }
        Self::new(merged, material_cache)
    }

    pub fn definitions(&self) -> &Definitions {
        &self.defs
    }

    pub fn counts(&self) -> DefinitionCounts {
        DefinitionCounts {
            cube_blocks: self.defs.cube_blocks.len(),
            components: self.defs.components.len(),
            physical_items: self.defs.physical_items.len(),
            ammo_magazines: self.defs.ammo_magazines.len(),
            voxel_materials: self.defs.voxel_materials.len(),
            blueprints: self.defs.blueprints.len(),
        }
    }

    /// Without a subtype the first block of `(type_id, cube_size)` in load order
    /// is returned. With a subtype, the first block whose subtype (or subtype
    /// plus a variant color) matches wins; type and size are not consulted.
    pub fn find_cube_definition(
        &self,
        type_id: &ObjectType,
        cube_size: CubeSize,
        subtype_id: Option<&str>,
    ) -> Option<&CubeBlockDefinition> {
        match subtype_id.filter(|subtype| !subtype.is_empty()) {
            None => self
                .defs
                .cube_blocks
                .iter()
                .find(|def| def.cube_size == cube_size && &def.key.type_id == type_id),
            Some(subtype) => self
                .defs
                .cube_blocks
                .iter()
                .find(|def| def.matches_subtype(subtype)),
        }
    }

    /// Searches cube blocks, physical items, components and ammo magazines, in that order.
    pub fn find_definition(
        &self,
        type_id: &ObjectType,
        subtype_id: &str,
    ) -> Option<DefinitionRef<'_>> {
        if let Some(position) = self.cube_index.get(type_id, subtype_id) {
            return Some(DefinitionRef::CubeBlock(&self.defs.cube_blocks[position]));
        }
        if let Some(position) = self.item_index.get(type_id, subtype_id) {
            return Some(DefinitionRef::PhysicalItem(
                &self.defs.physical_items[position],
            ));
        }
        if let Some(position) = self.component_index.get(type_id, subtype_id) {
            return Some(DefinitionRef::Component(&self.defs.components[position]));
        }
        if let Some(position) = self.magazine_index.get(type_id, subtype_id) {
            return Some(DefinitionRef::AmmoMagazine(
                &self.defs.ammo_magazines[position],
            ));
        }
        None
    }

    pub fn item_mass(&self, type_id: &ObjectType, subtype_id: &str) -> f32 {
        self.find_definition(type_id, subtype_id)
            .and_then(|def| def.physical())
            .map(|item| item.mass)
            .unwrap_or(0.0)
    }

    pub fn item_volume(&self, type_id: &ObjectType, subtype_id: &str) -> f32 {
        self.find_definition(type_id, subtype_id)
            .and_then(|def| def.physical())
            .and_then(|item| item.volume)
            .unwrap_or(0.0)
    }

    /// Sum over every component definition with this subtype; zero when none exist.
    pub fn component_mass(&self, subtype_id: &str) -> f32 {
        self.defs
            .components
            .iter()
            .filter(|def| def.item.key.subtype_id == subtype_id)
            .map(|def| def.item.mass)
            .sum()
    }

    pub fn cube_block_mass(
        &self,
        type_id: &ObjectType,
        cube_size: CubeSize,
        subtype_id: Option<&str>,
    ) -> f32 {
        let Some(block) = self.find_cube_definition(type_id, cube_size, subtype_id) else {
            return 0.0;
        };
        block
            .components
            .iter()
            .map(|component| self.component_mass(&component.subtype_id) * component.count as f32)
            .sum()
    }

    pub fn find_blueprint_for_result(
        &self,
        subtype_id: &str,
        type_id: &ObjectType,
    ) -> Option<&BlueprintDefinition> {
        self.defs.blueprints.iter().find(|bp| {
            bp.result.key.subtype_id == subtype_id && &bp.result.key.type_id == type_id
        })
    }

    pub fn materials(&self) -> &[VoxelMaterialDefinition] {
        &self.defs.voxel_materials
    }

    /// Position of the named material in load order, memoized per name in the
    /// shared [`MaterialIndexCache`]. A cached name is never recomputed.
    ///
    /// The memo lock is held across the scan, so concurrent first lookups of
    /// the same name all observe one index. Unknown names and positions that
    /// do not fit the on-disk byte are `None` and are not cached.
    pub fn material_index(&self, name: &str) -> Option<u8> {
        let mut cache = self.material_cache.0.lock();
        match cache.entry(name.to_string()) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                let position = self
                    .defs
                    .voxel_materials
                    .iter()
                    .position(|material| material.key.subtype_id == name)?;
                let index = u8::try_from(position).ok()?;
                debug!(material = name, index, "material_index_cached");
                Some(*entry.insert(index))
            }
        }
    }

    /// Material at `index`, or at `fallback_index` when `index` is out of range.
    pub fn material_name(&self, index: u8, fallback_index: u8) -> Option<&str> {
        self.defs
            .voxel_materials
            .get(index as usize)
            .or_else(|| self.defs.voxel_materials.get(fallback_index as usize))
            .map(|material| material.key.subtype_id.as_str())
    }
}

fn merge_table<T>(target: &mut Vec<T>, incoming: Vec<T>, key: impl Fn(&T) -> &DefinitionKey) {
    for def in incoming {
        match target.iter().position(|existing| key(existing) == key(&def)) {
            Some(position) => target[position] = def,
            None => target.push(def),
        }
    }
}
