use roxmltree::Node;

use crate::content::xml::{
    child, child_text, children_named, expect_known, parse_bool_child, parse_child, read_vec3,
    read_vec3i, DecodeError, DecodeErrorCode, ReadOptions, XmlWriter, XSI_NAMESPACE,
};
use crate::content::{root_namespace_attributes, CubeSize, ObjectType, XmlContent};

use super::math::{
    Base6Direction, BlockOrientation, PositionAndOrientation, Quaternion, Vec3, Vec3I,
};

const BLOCK_ELEMENT: &str = "MyObjectBuilder_CubeBlock";

#[derive(Debug, Clone, PartialEq)]
pub struct CubeBlock {
    pub type_id: ObjectType,
    pub subtype_name: String,
    pub entity_id: Option<i64>,
    pub min: Vec3I,
    pub block_orientation: Option<BlockOrientation>,
    pub color_mask_hsv: Option<Vec3>,
}

impl CubeBlock {
    pub fn new(type_id: ObjectType, subtype_name: impl Into<String>, min: Vec3I) -> Self {
        Self {
            type_id,
            subtype_name: subtype_name.into(),
            entity_id: None,
            min,
            block_orientation: None,
            color_mask_hsv: None,
        }
    }
}

/// A persisted ship or station: block placements on an integer grid.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CubeGrid {
    pub entity_id: i64,
    pub display_name: Option<String>,
    pub grid_size: CubeSize,
    pub is_static: bool,
    pub position_and_orientation: Option<PositionAndOrientation>,
    pub blocks: Vec<CubeBlock>,
}

impl CubeGrid {
    pub fn position(&self) -> Vec3 {
        self.position_and_orientation
            .map(|placement| placement.position)
            .unwrap_or(Vec3::ZERO)
    }
}

impl XmlContent for CubeGrid {
    const ROOT_ELEMENT: &'static str = "MyObjectBuilder_CubeGrid";

    fn read_xml(node: Node<'_, '_>, options: &ReadOptions) -> Result<Self, DecodeError> {
        expect_known(
            node,
            &[
                "EntityId",
                "DisplayName",
                "GridSizeEnum",
                "IsStatic",
                "PositionAndOrientation",
                "CubeBlocks",
            ],
            &[],
            options,
        )?;

        let grid_size = match child_text(node, "GridSizeEnum") {
            None => CubeSize::default(),
            Some(raw) => CubeSize::parse(&raw).ok_or_else(|| {
                DecodeError::at_node(
                    DecodeErrorCode::InvalidValue,
                    format!("invalid GridSizeEnum '{raw}'; allowed values: Large, Small"),
                    node,
                )
            })?,
        };

        let position_and_orientation = match child(node, "PositionAndOrientation") {
            Some(placement) => Some(read_placement(placement, options)?),
            None => None,
        };

        let mut blocks = Vec::new();
        if let Some(list) = child(node, "CubeBlocks") {
            expect_known(list, &[BLOCK_ELEMENT], &[], options)?;
            for block in children_named(list, BLOCK_ELEMENT) {
                blocks.push(read_block(block, options)?);
            }
        }

        Ok(CubeGrid {
            entity_id: parse_child(node, "EntityId")?.unwrap_or_default(),
            display_name: child_text(node, "DisplayName"),
            grid_size,
            is_static: parse_bool_child(node, "IsStatic")?.unwrap_or(false),
            position_and_orientation,
            blocks,
        })
    }

    fn write_xml(&self, writer: &mut XmlWriter) {
        writer.start(Self::ROOT_ELEMENT, &root_namespace_attributes());
        writer.display_element("EntityId", self.entity_id);
        if let Some(placement) = &self.position_and_orientation {
            writer.start("PositionAndOrientation", &[]);
            writer.vec3("Position", placement.position);
            writer.vec3("Forward", placement.forward);
            writer.vec3("Up", placement.up);
            if let Some(orientation) = placement.orientation {
                writer.start("Orientation", &[]);
                writer.display_element("X", orientation.x);
                writer.display_element("Y", orientation.y);
                writer.display_element("Z", orientation.z);
                writer.display_element("W", orientation.w);
                writer.end();
            }
            writer.end();
        }
        writer.text_element("GridSizeEnum", self.grid_size.as_str());
        writer.start("CubeBlocks", &[]);
        for block in &self.blocks {
            let builder_name = block.type_id.builder_name();
            writer.start(BLOCK_ELEMENT, &[("xsi:type", &builder_name)]);
            writer.text_element("SubtypeName", &block.subtype_name);
            if let Some(entity_id) = block.entity_id {
                writer.display_element("EntityId", entity_id);
            }
            writer.vec3i("Min", block.min);
            if let Some(orientation) = block.block_orientation {
                writer.empty(
                    "BlockOrientation",
                    &[
                        ("Forward", orientation.forward.as_str()),
                        ("Up", orientation.up.as_str()),
                    ],
                );
            }
            if let Some(color) = block.color_mask_hsv {
                writer.vec3("ColorMaskHSV", color);
            }
            writer.end();
        }
        writer.end();
        writer.display_element("IsStatic", self.is_static);
        if let Some(display_name) = &self.display_name {
            writer.text_element("DisplayName", display_name);
        }
        writer.end();
    }
}

fn read_placement(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<PositionAndOrientation, DecodeError> {
    expect_known(node, &["Position", "Forward", "Up", "Orientation"], &[], options)?;
    let defaults = PositionAndOrientation::default();
    Ok(PositionAndOrientation {
        position: child(node, "Position")
            .map(read_vec3)
            .transpose()?
            .unwrap_or(defaults.position),
        forward: child(node, "Forward")
            .map(read_vec3)
            .transpose()?
            .unwrap_or(defaults.forward),
        up: child(node, "Up")
            .map(read_vec3)
            .transpose()?
            .unwrap_or(defaults.up),
        orientation: child(node, "Orientation")
            .map(|orientation| read_quaternion(orientation, options))
            .transpose()?,
    })
}

/// Reads `<X>`/`<Y>`/`<Z>`/`<W>` children; absent components keep the identity.
fn read_quaternion(node: Node<'_, '_>, options: &ReadOptions) -> Result<Quaternion, DecodeError> {
    expect_known(node, &["X", "Y", "Z", "W"], &[], options)?;
    let identity = Quaternion::default();
    Ok(Quaternion {
        x: parse_child(node, "X")?.unwrap_or(identity.x),
        y: parse_child(node, "Y")?.unwrap_or(identity.y),
        z: parse_child(node, "Z")?.unwrap_or(identity.z),
        w: parse_child(node, "W")?.unwrap_or(identity.w),
    })
}

fn read_block_orientation(
    node: Node<'_, '_>,
    options: &ReadOptions,
) -> Result<BlockOrientation, DecodeError> {
    expect_known(node, &[], &["Forward", "Up"], options)?;
    let defaults = BlockOrientation::default();
    let direction = |name: &str, default: Base6Direction| match node.attribute(name) {
        None => Ok(default),
        Some(raw) => Base6Direction::parse(raw).ok_or_else(|| {
            DecodeError::at_node(
                DecodeErrorCode::InvalidValue,
                format!(
                    "attribute {name}=\"{raw}\" on <BlockOrientation> is not a direction; \
                     allowed values: Forward, Backward, Left, Right, Up, Down"
                ),
                node,
            )
        }),
    };
    Ok(BlockOrientation {
        forward: direction("Forward", defaults.forward)?,
        up: direction("Up", defaults.up)?,
    })
}

fn read_block(node: Node<'_, '_>, options: &ReadOptions) -> Result<CubeBlock, DecodeError> {
    expect_known(
        node,
        &[
            "SubtypeName",
            "EntityId",
            "Min",
            "BlockOrientation",
            "ColorMaskHSV",
        ],
        &[],
        options,
    )?;
    let type_id = node
        .attribute((XSI_NAMESPACE, "type"))
        .map(ObjectType::parse)
        .unwrap_or(ObjectType::CubeBlock);
    Ok(CubeBlock {
        type_id,
        subtype_name: child_text(node, "SubtypeName").unwrap_or_default(),
        entity_id: parse_child(node, "EntityId")?,
        min: child(node, "Min")
            .map(read_vec3i)
            .transpose()?
            .unwrap_or_default(),
        block_orientation: child(node, "BlockOrientation")
            .map(|orientation| read_block_orientation(orientation, options))
            .transpose()?,
        color_mask_hsv: child(node, "ColorMaskHSV").map(read_vec3).transpose()?,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::SMALL_SHIP;
    use super::*;
    use crate::content::SerializerRegistry;

    fn load(text: &str, options: &ReadOptions) -> Result<CubeGrid, DecodeError> {
        SerializerRegistry::with_builtin_types()
            .deserialize_str::<CubeGrid>(text, options)
            .map(|grid| grid.expect("grid"))
    }

    #[test]
    fn fixture_reads_blocks_and_placement() {
        let grid = load(SMALL_SHIP, &ReadOptions::default()).expect("grid");
        assert_eq!(grid.entity_id, 8_132_466_789_132);
        assert_eq!(grid.display_name.as_deref(), Some("Small Ship"));
        assert_eq!(grid.grid_size, CubeSize::Large);
        assert_eq!(grid.position(), Vec3::new(100.0, -20.0, 5.5));
        assert_eq!(grid.blocks.len(), 2);
        assert_eq!(grid.blocks[0].type_id, ObjectType::CubeBlock);
        assert_eq!(grid.blocks[0].min, Vec3I::new(-2, 0, 1));
        assert_eq!(
            grid.blocks[1].type_id,
            ObjectType::Other("Reactor".to_string())
        );
        assert!(grid.blocks[1].color_mask_hsv.is_none());
        assert_eq!(grid.blocks[1].entity_id, Some(991));
        assert_eq!(
            grid.blocks[1].block_orientation,
            Some(BlockOrientation {
                forward: Base6Direction::Left,
                up: Base6Direction::Down,
            })
        );
        assert!(grid.blocks[0].block_orientation.is_none());
    }

    #[test]
    fn grid_roundtrip_preserves_modelled_fields() {
        let registry = SerializerRegistry::with_builtin_types();
        let grid = load(SMALL_SHIP, &ReadOptions::default()).expect("grid");
        let text = registry.serialize(&grid).expect("serialize");
        assert!(text.contains("xsi:type=\"MyObjectBuilder_Reactor\""));
        let reloaded = load(&text, &ReadOptions::strict()).expect("reload");
        assert_eq!(reloaded, grid);
    }

    #[test]
    fn block_identity_and_orientation_survive_a_save() {
        let registry = SerializerRegistry::with_builtin_types();
        let grid = load(SMALL_SHIP, &ReadOptions::default()).expect("grid");
        let text = registry.serialize(&grid).expect("serialize");
        assert!(text.contains("<EntityId>991</EntityId>"));
        assert!(text.contains("<BlockOrientation Forward=\"Left\" Up=\"Down\" />"));
        assert!(text.contains("<W>0.7071</W>"));

        let reloaded = load(&text, &ReadOptions::strict()).expect("reload");
        let reactor = &reloaded.blocks[1];
        assert_eq!(reactor.entity_id, Some(991));
        assert_eq!(
            reactor.block_orientation.map(|o| (o.forward, o.up)),
            Some((Base6Direction::Left, Base6Direction::Down))
        );
        let orientation = reloaded
            .position_and_orientation
            .and_then(|placement| placement.orientation)
            .expect("orientation");
        assert_eq!(orientation.y, 0.7071);
        assert_eq!(orientation.x, 0.0);
    }

    #[test]
    fn invalid_block_direction_is_rejected() {
        let error = load(
            r#"<MyObjectBuilder_CubeGrid>
  <CubeBlocks>
    <MyObjectBuilder_CubeBlock>
      <BlockOrientation Forward="Sideways" Up="Up" />
    </MyObjectBuilder_CubeBlock>
  </CubeBlocks>
</MyObjectBuilder_CubeGrid>"#,
            &ReadOptions::default(),
        )
        .expect_err("invalid direction");
        assert_eq!(error.code, DecodeErrorCode::InvalidValue);
        assert!(error.message.contains("Sideways"));
    }

    #[test]
    fn strict_mode_rejects_unmodelled_grid_fields() {
        let error = load(SMALL_SHIP, &ReadOptions::strict()).expect_err("strict");
        assert_eq!(error.code, DecodeErrorCode::UnknownElement);
        assert!(error.message.contains("PersistentFlags"));
    }

    #[test]
    fn missing_placement_is_none() {
        let grid = load(
            "<MyObjectBuilder_CubeGrid><GridSizeEnum>Small</GridSizeEnum></MyObjectBuilder_CubeGrid>",
            &ReadOptions::default(),
        )
        .expect("grid");
        assert!(grid.position_and_orientation.is_none());
        assert_eq!(grid.position(), Vec3::ZERO);
        assert!(grid.blocks.is_empty());
    }
}
