use std::fmt;

use serde::Serialize;

const OBJECT_BUILDER_PREFIX: &str = "MyObjectBuilder_";

/// Content category of a definition or persisted object.
///
/// Block categories are open-ended (every functional block has its own type),
/// so anything not listed lands in `Other` with the prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    CubeBlock,
    Component,
    Ingot,
    Ore,
    PhysicalGunObject,
    AmmoMagazine,
    OxygenContainerObject,
    GasContainerObject,
    ConsumableItem,
    PhysicalObject,
    VoxelMaterialDefinition,
    BlueprintDefinition,
    Other(String),
}

impl ObjectType {
    pub fn parse(raw: &str) -> Self {
        let name = raw.trim();
        let name = name.strip_prefix(OBJECT_BUILDER_PREFIX).unwrap_or(name);
        match name {
            "CubeBlock" => Self::CubeBlock,
            "Component" => Self::Component,
            "Ingot" => Self::Ingot,
            "Ore" => Self::Ore,
            "PhysicalGunObject" => Self::PhysicalGunObject,
            "AmmoMagazine" => Self::AmmoMagazine,
            "OxygenContainerObject" => Self::OxygenContainerObject,
            "GasContainerObject" => Self::GasContainerObject,
            "ConsumableItem" => Self::ConsumableItem,
            "PhysicalObject" => Self::PhysicalObject,
            "VoxelMaterialDefinition" => Self::VoxelMaterialDefinition,
            "BlueprintDefinition" => Self::BlueprintDefinition,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CubeBlock => "CubeBlock",
            Self::Component => "Component",
            Self::Ingot => "Ingot",
            Self::Ore => "Ore",
            Self::PhysicalGunObject => "PhysicalGunObject",
            Self::AmmoMagazine => "AmmoMagazine",
            Self::OxygenContainerObject => "OxygenContainerObject",
            Self::GasContainerObject => "GasContainerObject",
            Self::ConsumableItem => "ConsumableItem",
            Self::PhysicalObject => "PhysicalObject",
            Self::VoxelMaterialDefinition => "VoxelMaterialDefinition",
            Self::BlueprintDefinition => "BlueprintDefinition",
            Self::Other(name) => name,
        }
    }

    /// Name as written in `xsi:type` attributes.
    pub fn builder_name(&self) -> String {
        format!("{OBJECT_BUILDER_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObjectType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CubeSize {
    #[default]
    Large,
    Small,
}

impl CubeSize {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Large" => Some(Self::Large),
            "Small" => Some(Self::Small),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Large => "Large",
            Self::Small => "Small",
        }
    }

    /// Edge length of one block cell in world units.
    pub fn length(self) -> f64 {
        match self {
            Self::Large => 2.5,
            Self::Small => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DefinitionKey {
    pub type_id: ObjectType,
    pub subtype_id: String,
}

impl DefinitionKey {
    pub fn new(type_id: ObjectType, subtype_id: impl Into<String>) -> Self {
        Self {
            type_id,
            subtype_id: subtype_id.into(),
        }
    }
}

impl fmt::Display for DefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_id, self.subtype_id)
    }
}
