use roxmltree::Node;

use crate::world::Vec3I;

use super::quantity::Amount;
use super::serializer::{root_namespace_attributes, XmlContent};
use super::types::{CubeSize, DefinitionKey, ObjectType};
use super::xml::{
    child, child_text, children_named, expect_known, parse_attribute, parse_bool_child,
    parse_child, read_vec3i, DecodeError, DecodeErrorCode, ReadOptions, XmlWriter,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRequirement {
    pub subtype_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockVariant {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubeBlockDefinition {
    pub key: DefinitionKey,
    pub display_name: Option<String>,
    pub cube_size: CubeSize,
    pub size: Vec3I,
    pub components: Vec<ComponentRequirement>,
    pub variants: Vec<BlockVariant>,
}

impl CubeBlockDefinition {
    /// True for the plain subtype and for `subtype + color` of any declared variant.
    pub fn matches_subtype(&self, subtype_id: &str) -> bool {
        if self.key.subtype_id == subtype_id {
            return true;
        }
        subtype_id
            .strip_prefix(self.key.subtype_id.as_str())
            .is_some_and(|suffix| self.variants.iter().any(|variant| variant.color == suffix))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalItemDefinition {
    pub key: DefinitionKey,
    pub display_name: Option<String>,
    pub mass: f32,
    pub volume: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDefinition {
    pub item: PhysicalItemDefinition,
    pub max_integrity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmmoMagazineDefinition {
    pub item: PhysicalItemDefinition,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoxelMaterialDefinition {
    pub key: DefinitionKey,
    pub asset_name: Option<String>,
    pub min_version: Option<u32>,
    pub can_be_harvested: bool,
    pub is_rare: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintItem {
    pub key: DefinitionKey,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintDefinition {
    pub key: DefinitionKey,
    pub display_name: Option<String>,
    pub prerequisites: Vec<BlueprintItem>,
    pub result: BlueprintItem,
    pub base_production_time_seconds: Amount,
}

/// One definition file: every table is optional and kept in document order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Definitions {
    pub cube_blocks: Vec<CubeBlockDefinition>,
    pub components: Vec<ComponentDefinition>,
    pub physical_items: Vec<PhysicalItemDefinition>,
    pub ammo_magazines: Vec<AmmoMagazineDefinition>,
    pub voxel_materials: Vec<VoxelMaterialDefinition>,
    pub blueprints: Vec<BlueprintDefinition>,
}

const TABLES: &[&str] = &[
    "CubeBlocks",
    "Components",
    "PhysicalItems",
    "AmmoMagazines",
    "VoxelMaterials",
    "Blueprints",
];

impl XmlContent for Definitions {
    const ROOT_ELEMENT: &'static str = "Definitions";

    fn read_xml(node: Node<'_, '_>, options: &ReadOptions) -> Result<Self, DecodeError> {
        expect_known(node, TABLES, &[], options)?;
        let mut defs = Definitions::default();

        for table in children_named(node, "CubeBlocks") {
            expect_known(table, &["Definition"], &[], options)?;
            for entry in children_named(table, "Definition") {
                defs.cube_blocks.push(read_cube_block(entry, options)?);
            }
        }
        for table in children_named(node, "Components") {
            expect_known(table, &["Component"], &[], options)?;
            for entry in children_named(table, "Component") {
                expect_known(entry, &with_item_fields(&["MaxIntegrity"]), &[], options)?;
                defs.components.push(ComponentDefinition {
                    item: read_physical_item(entry, ObjectType::Component)?,
                    max_integrity: parse_child(entry, "MaxIntegrity")?,
                });
            }
        }
        for table in children_named(node, "PhysicalItems") {
            expect_known(table, &["PhysicalItem"], &[], options)?;
            for entry in children_named(table, "PhysicalItem") {
                expect_known(entry, &with_item_fields(&[]), &[], options)?;
                defs.physical_items
                    .push(read_physical_item(entry, ObjectType::PhysicalObject)?);
            }
        }
        for table in children_named(node, "AmmoMagazines") {
            expect_known(table, &["AmmoMagazine"], &[], options)?;
            for entry in children_named(table, "AmmoMagazine") {
                expect_known(entry, &with_item_fields(&["Capacity"]), &[], options)?;
                defs.ammo_magazines.push(AmmoMagazineDefinition {
                    item: read_physical_item(entry, ObjectType::AmmoMagazine)?,
                    capacity: parse_child(entry, "Capacity")?,
                });
            }
        }
        for table in children_named(node, "VoxelMaterials") {
            expect_known(table, &["VoxelMaterial"], &[], options)?;
            for entry in children_named(table, "VoxelMaterial") {
                defs.voxel_materials.push(read_voxel_material(entry, options)?);
            }
        }
        for table in children_named(node, "Blueprints") {
            expect_known(table, &["Blueprint"], &[], options)?;
            for entry in children_named(table, "Blueprint") {
                defs.blueprints.push(read_blueprint(entry, options)?);
            }
        }

        Ok(defs)
    }

    fn write_xml(&self, writer: &mut XmlWriter) {
        writer.start(Self::ROOT_ELEMENT, &root_namespace_attributes());

        if !self.cube_blocks.is_empty() {
            writer.start("CubeBlocks", &[]);
            for block in &self.cube_blocks {
                write_cube_block(writer, block);
            }
            writer.end();
        }
        if !self.components.is_empty() {
            writer.start("Components", &[]);
            for component in &self.components {
                writer.start("Component", &[]);
                write_item_fields(writer, &component.item);
                if let Some(max_integrity) = component.max_integrity {
                    writer.display_element("MaxIntegrity", max_integrity);
                }
                writer.end();
            }
            writer.end();
        }
        if !self.physical_items.is_empty() {
            writer.start("PhysicalItems", &[]);
            for item in &self.physical_items {
                writer.start("PhysicalItem", &[]);
                write_item_fields(writer, item);
                writer.end();
            }
            writer.end();
        }
        if !self.ammo_magazines.is_empty() {
            writer.start("AmmoMagazines", &[]);
            for magazine in &self.ammo_magazines {
                writer.start("AmmoMagazine", &[]);
                write_item_fields(writer, &magazine.item);
                if let Some(capacity) = magazine.capacity {
                    writer.display_element("Capacity", capacity);
                }
                writer.end();
            }
            writer.end();
        }
        if !self.voxel_materials.is_empty() {
            writer.start("VoxelMaterials", &[]);
            for material in &self.voxel_materials {
                write_voxel_material(writer, material);
            }
            writer.end();
        }
        if !self.blueprints.is_empty() {
            writer.start("Blueprints", &[]);
            for blueprint in &self.blueprints {
                write_blueprint(writer, blueprint);
            }
            writer.end();
        }

        writer.end();
    }
}

const ITEM_FIELDS: &[&str] = &["Id", "DisplayName", "Mass", "Volume"];

fn with_item_fields(extra: &[&'static str]) -> Vec<&'static str> {
    ITEM_FIELDS.iter().chain(extra.iter()).copied().collect()
}

/// Accepts both `<Id><TypeId/><SubtypeId/></Id>` and `<Id Type="" Subtype="" />`.
fn read_id(node: Node<'_, '_>, default_type: ObjectType) -> Result<DefinitionKey, DecodeError> {
    let Some(id) = child(node, "Id") else {
        return Err(DecodeError::at_node(
            DecodeErrorCode::MissingField,
            format!("missing required field <Id> in <{}>", node.tag_name().name()),
            node,
        ));
    };
    let type_id = child_text(id, "TypeId")
        .or_else(|| id.attribute("Type").map(str::to_string))
        .filter(|value| !value.is_empty())
        .map(|value| ObjectType::parse(&value))
        .unwrap_or(default_type);
    let subtype_id = child_text(id, "SubtypeId")
        .or_else(|| id.attribute("Subtype").map(str::to_string))
        .unwrap_or_default();
    Ok(DefinitionKey::new(type_id, subtype_id))
}

fn write_id(writer: &mut XmlWriter, key: &DefinitionKey) {
    writer.start("Id", &[]);
    writer.text_element("TypeId", key.type_id.as_str());
    writer.text_element("SubtypeId", &key.subtype_id);
    writer.end();
}

fn read_physical_item(
    node: Node<'_, '_>,
    default_type: ObjectType,
) -> Result<PhysicalItemDefinition, DecodeError> {
    Ok(PhysicalItemDefinition {
        key: read_id(node, default_type)?,
        display_name: child_text(node, "DisplayName"),
        mass: parse_child(node, "Mass")?.unwrap_or_default(),
        volume: parse_child(node, "Volume")?,
    })
}

fn write_item_fields(writer: &mut XmlWriter, item: &PhysicalItemDefinition) {
    write_id(writer, &item.key);
    if let Some(display_name) = &item.display_name {
        writer.text_element("DisplayName", display_name);
    }
    writer.display_element("Mass", item.mass);
    if let Some(volume) = item.volume {
        writer.display_element("Volume", volume);
    }
}

fn read_cube_block(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<CubeBlockDefinition, DecodeError> {
    expect_known(
        node,
        &["Id", "DisplayName", "CubeSize", "Size", "Components", "Variants"],
        &[],
        options,
    )?;
    let cube_size = match child_text(node, "CubeSize") {
        None => CubeSize::default(),
        Some(raw) => CubeSize::parse(&raw).ok_or_else(|| {
            DecodeError::at_node(
                DecodeErrorCode::InvalidValue,
                format!("invalid CubeSize '{raw}'; allowed values: Large, Small"),
                node,
            )
        })?,
    };
    let size = match child(node, "Size") {
        Some(size) => read_vec3i(size)?,
        None => Vec3I::splat(1),
    };

    let mut components = Vec::new();
    if let Some(list) = child(node, "Components") {
        expect_known(list, &["Component"], &[], options)?;
        for component in children_named(list, "Component") {
            expect_known(component, &[], &["Subtype", "Count"], options)?;
            components.push(ComponentRequirement {
                subtype_id: component.attribute("Subtype").unwrap_or_default().to_string(),
                count: parse_attribute(component, "Count")?.unwrap_or_default(),
            });
        }
    }

    let mut variants = Vec::new();
    if let Some(list) = child(node, "Variants") {
        expect_known(list, &["Variant"], &[], options)?;
        for variant in children_named(list, "Variant") {
            if let Some(color) = variant.attribute("Color") {
                variants.push(BlockVariant {
                    color: color.to_string(),
                });
            }
        }
    }

    Ok(CubeBlockDefinition {
        key: read_id(node, ObjectType::CubeBlock)?,
        display_name: child_text(node, "DisplayName"),
        cube_size,
        size,
        components,
        variants,
    })
}

fn write_cube_block(writer: &mut XmlWriter, block: &CubeBlockDefinition) {
    writer.start("Definition", &[]);
    write_id(writer, &block.key);
    if let Some(display_name) = &block.display_name {
        writer.text_element("DisplayName", display_name);
    }
    writer.text_element("CubeSize", block.cube_size.as_str());
    writer.vec3i("Size", block.size);
    if !block.components.is_empty() {
        writer.start("Components", &[]);
        for component in &block.components {
            let count = component.count.to_string();
            writer.empty(
                "Component",
                &[("Subtype", &component.subtype_id), ("Count", &count)],
            );
        }
        writer.end();
    }
    if !block.variants.is_empty() {
        writer.start("Variants", &[]);
        for variant in &block.variants {
            writer.empty("Variant", &[("Color", &variant.color)]);
        }
        writer.end();
    }
    writer.end();
}

fn read_voxel_material(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<VoxelMaterialDefinition, DecodeError> {
    expect_known(
        node,
        &["Id", "AssetName", "MinVersion", "CanBeHarvested", "IsRare"],
        &[],
        options,
    )?;
    Ok(VoxelMaterialDefinition {
        key: read_id(node, ObjectType::VoxelMaterialDefinition)?,
        asset_name: child_text(node, "AssetName"),
        min_version: parse_child(node, "MinVersion")?,
        can_be_harvested: parse_bool_child(node, "CanBeHarvested")?.unwrap_or(false),
        is_rare: parse_bool_child(node, "IsRare")?.unwrap_or(false),
    })
}

fn write_voxel_material(writer: &mut XmlWriter, material: &VoxelMaterialDefinition) {
    writer.start("VoxelMaterial", &[]);
    write_id(writer, &material.key);
    if let Some(asset_name) = &material.asset_name {
        writer.text_element("AssetName", asset_name);
    }
    if let Some(min_version) = material.min_version {
        writer.display_element("MinVersion", min_version);
    }
    writer.display_element("CanBeHarvested", material.can_be_harvested);
    writer.display_element("IsRare", material.is_rare);
    writer.end();
}

fn read_blueprint(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<BlueprintDefinition, DecodeError> {
    expect_known(
        node,
        &[
            "Id",
            "DisplayName",
            "Prerequisites",
            "Result",
            "Results",
            "BaseProductionTimeInSeconds",
        ],
        &[],
        options,
    )?;

    let mut prerequisites = Vec::new();
    if let Some(list) = child(node, "Prerequisites") {
        expect_known(list, &["Item"], &[], options)?;
        for item in children_named(list, "Item") {
            prerequisites.push(read_blueprint_item(item, options)?);
        }
    }

    // Multi-output blueprints list their products under <Results>; the first one is the result.
    let result_node = child(node, "Result")
        .or_else(|| child(node, "Results").and_then(|list| child(list, "Item")));
    let Some(result_node) = result_node else {
        return Err(DecodeError::at_node(
            DecodeErrorCode::MissingField,
            "missing required field <Result> in <Blueprint>",
            node,
        ));
    };

    Ok(BlueprintDefinition {
        key: read_id(node, ObjectType::BlueprintDefinition)?,
        display_name: child_text(node, "DisplayName"),
        prerequisites,
        result: read_blueprint_item(result_node, options)?,
        base_production_time_seconds: parse_child(node, "BaseProductionTimeInSeconds")?
            .unwrap_or(Amount::ONE),
    })
}

fn read_blueprint_item(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<BlueprintItem, DecodeError> {
    expect_known(node, &[], &["Amount", "TypeId", "SubtypeId"], options)?;
    let type_id = node
        .attribute("TypeId")
        .map(ObjectType::parse)
        .ok_or_else(|| {
            DecodeError::at_node(
                DecodeErrorCode::MissingField,
                format!("<{}> requires a TypeId attribute", node.tag_name().name()),
                node,
            )
        })?;
    Ok(BlueprintItem {
        key: DefinitionKey::new(type_id, node.attribute("SubtypeId").unwrap_or_default()),
        amount: parse_attribute(node, "Amount")?.unwrap_or(Amount::ONE),
    })
}

fn write_blueprint_item(writer: &mut XmlWriter, name: &str, item: &BlueprintItem) {
    let amount = item.amount.to_string();
    writer.empty(
        name,
        &[
            ("Amount", &amount),
            ("TypeId", item.key.type_id.as_str()),
            ("SubtypeId", &item.key.subtype_id),
        ],
    );
}

fn write_blueprint(writer: &mut XmlWriter, blueprint: &BlueprintDefinition) {
    writer.start("Blueprint", &[]);
    write_id(writer, &blueprint.key);
    if let Some(display_name) = &blueprint.display_name {
        writer.text_element("DisplayName", display_name);
    }
    writer.start("Prerequisites", &[]);
    for item in &blueprint.prerequisites {
        write_blueprint_item(writer, "Item", item);
    }
    writer.end();
    write_blueprint_item(writer, "Result", &blueprint.result);
    writer.display_element(
        "BaseProductionTimeInSeconds",
        blueprint.base_production_time_seconds,
    );
    writer.end();
}
