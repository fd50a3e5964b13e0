use std::io::Write;
use std::path::{Path, PathBuf};

use gridkit_engine::content::{
    load_file, read_content_file, write_content_file, ContentEncoding, DefinitionRef,
    MaterialIndexCache, ReadOptions, RequirementReport, SerializerRegistry,
};
use gridkit_engine::{
    compute_bounding_volume, load_definition_repository, resolve_content_paths, CubeGrid,
    DefinitionRepository, ObjectType,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    pub content_dir: Option<PathBuf>,
    pub strict: bool,
    pub json: bool,
}

impl CommonOptions {
    fn read_options(&self) -> ReadOptions {
        if self.strict {
            ReadOptions::strict()
        } else {
            ReadOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Bounds {
        path: PathBuf,
    },
    Mass {
        path: PathBuf,
    },
    Requirements {
        path: PathBuf,
    },
    Lookup {
        type_id: String,
        subtype_id: String,
    },
    Material {
        name: String,
    },
    MaterialAt {
        index: u8,
        fallback_index: u8,
    },
    Convert {
        input: PathBuf,
        output: PathBuf,
        encoding: Option<ContentEncoding>,
    },
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let registry = SerializerRegistry::with_builtin_types();
    let material_cache = MaterialIndexCache::new();
    let read_options = opts.read_options();

    match kind {
        CommandKind::Bounds { path } => {
            let grid = load_grid(&registry, &path, &read_options)?;
            let volume = compute_bounding_volume(&grid);
            if opts.json {
                return emit_json(stdout, &volume);
            }
            let size = volume.size();
            write_lines(
                stdout,
                &[
                    format!("blocks={}", grid.blocks.len()),
                    format!("min={} {} {}", volume.min.x, volume.min.y, volume.min.z),
                    format!("max={} {} {}", volume.max.x, volume.max.y, volume.max.z),
                    format!("size={} {} {}", size.x, size.y, size.z),
                ],
            )
        }
        CommandKind::Mass { path } => {
            let grid = load_grid(&registry, &path, &read_options)?;
            let repo = load_repository(&opts, &registry, &read_options, &material_cache)?;
            let report = gridkit_engine::structure_requirements(&repo, &grid);
            if opts.json {
                return emit_json(
                    stdout,
                    &MassSummary {
                        blocks: report.block_count,
                        unknown_blocks: report.unknown_blocks,
                        mass: report.mass,
                    },
                );
            }
            write_lines(
                stdout,
                &[
                    format!("blocks={}", report.block_count),
                    format!("unknown_blocks={}", report.unknown_blocks),
                    format!("mass={}", report.mass),
                ],
            )
        }
        CommandKind::Requirements { path } => {
            let grid = load_grid(&registry, &path, &read_options)?;
            let repo = load_repository(&opts, &registry, &read_options, &material_cache)?;
            let report = gridkit_engine::structure_requirements(&repo, &grid);
            if opts.json {
                return emit_json(stdout, &report);
            }
            write_lines(stdout, &requirement_lines(&report))
        }
        CommandKind::Lookup {
            type_id,
            subtype_id,
        } => {
            let repo = load_repository(&opts, &registry, &read_options, &material_cache)?;
            let type_id = ObjectType::parse(&type_id);
            let definition = repo
                .find_definition(&type_id, &subtype_id)
                .ok_or_else(|| format!("no definition for {type_id}/{subtype_id}"))?;
            write_lines(stdout, &definition_lines(&repo, definition))
        }
        CommandKind::Material { name } => {
            let repo = load_repository(&opts, &registry, &read_options, &material_cache)?;
            let index = repo
                .material_index(&name)
                .ok_or_else(|| format!("unknown voxel material '{name}'"))?;
            write_lines(
                stdout,
                &[format!("material={name}"), format!("index={index}")],
            )
        }
        CommandKind::MaterialAt {
            index,
            fallback_index,
        } => {
            let repo = load_repository(&opts, &registry, &read_options, &material_cache)?;
            let name = repo.material_name(index, fallback_index).ok_or_else(|| {
                format!("no voxel material at index {index} or fallback {fallback_index}")
            })?;
            write_lines(
                stdout,
                &[format!("index={index}"), format!("material={name}")],
            )
        }
        CommandKind::Convert {
            input,
            output,
            encoding,
        } => {
            let transcoded = read_content_file(&input)
                .map_err(|error| error.to_string())?
                .ok_or_else(|| format!("input file not found: {}", input.display()))?;
            let target = encoding.unwrap_or(match transcoded.encoding {
                ContentEncoding::Plain => ContentEncoding::Gzip,
                ContentEncoding::Gzip => ContentEncoding::Plain,
            });
            write_content_file(&output, &transcoded.bytes, target)
                .map_err(|error| error.to_string())?;
            info!(
                input = %input.display(),
                output = %output.display(),
                from = encoding_name(transcoded.encoding),
                to = encoding_name(target),
                "content_file_converted"
            );
            write_lines(
                stdout,
                &[
                    format!("input_encoding={}", encoding_name(transcoded.encoding)),
                    format!("output_encoding={}", encoding_name(target)),
                    format!("payload_bytes={}", transcoded.bytes.len()),
                ],
            )
        }
    }
}

pub fn parse_encoding_flag(raw: &str) -> Option<ContentEncoding> {
    match raw {
        "--gzip" => Some(ContentEncoding::Gzip),
        "--plain" => Some(ContentEncoding::Plain),
        _ => None,
    }
}

fn encoding_name(encoding: ContentEncoding) -> &'static str {
    match encoding {
        ContentEncoding::Plain => "plain",
        ContentEncoding::Gzip => "gzip",
    }
}

#[derive(Debug, Serialize)]
struct MassSummary {
    blocks: usize,
    unknown_blocks: usize,
    mass: f64,
}

fn load_grid(
    registry: &SerializerRegistry,
    path: &Path,
    options: &ReadOptions,
) -> Result<CubeGrid, String> {
    let loaded = load_file::<CubeGrid>(registry, path, options)
        .map_err(|error| error.to_string())?
        .ok_or_else(|| format!("grid file not found or empty: {}", path.display()))?;
    Ok(loaded.value)
}

fn load_repository(
    opts: &CommonOptions,
    registry: &SerializerRegistry,
    options: &ReadOptions,
    material_cache: &MaterialIndexCache,
) -> Result<DefinitionRepository, String> {
    let content_dir = match &opts.content_dir {
        Some(dir) => dir.clone(),
        None => {
            resolve_content_paths()
                .map_err(|error| error.to_string())?
                .content_dir
        }
    };
    let load = load_definition_repository(&content_dir, registry, options, material_cache)
        .map_err(|error| error.to_string())?;
    Ok(load.repository)
}

fn requirement_lines(report: &RequirementReport) -> Vec<String> {
    let mut lines = vec![
        format!("blocks={}", report.block_count),
        format!("unknown_blocks={}", report.unknown_blocks),
        format!("mass={}", report.mass),
    ];
    for entry in report.components.sorted_entries() {
        lines.push(format!(
            "component.{}={}",
            entry.subtype_id, entry.amount
        ));
    }
    for entry in report.materials.sorted_entries() {
        lines.push(format!(
            "material.{}/{}={}",
            entry.type_id, entry.subtype_id, entry.amount
        ));
    }
    lines.push(format!(
        "production_time_s={}",
        report.production_time.as_secs_f64()
    ));
    lines
}

fn definition_lines(repo: &DefinitionRepository, definition: DefinitionRef<'_>) -> Vec<String> {
    let key = definition.key();
    let kind = match definition {
        DefinitionRef::CubeBlock(_) => "cube_block",
        DefinitionRef::PhysicalItem(_) => "physical_item",
        DefinitionRef::Component(_) => "component",
        DefinitionRef::AmmoMagazine(_) => "ammo_magazine",
    };
    let mut lines = vec![format!("kind={kind}"), format!("id={key}")];
    if let Some(display_name) = definition.display_name() {
        lines.push(format!("display_name={display_name}"));
    }
    match definition {
        DefinitionRef::CubeBlock(block) => {
            lines.push(format!("cube_size={}", block.cube_size.as_str()));
            lines.push(format!(
                "size={} {} {}",
                block.size.x, block.size.y, block.size.z
            ));
            lines.push(format!(
                "mass={}",
                repo.cube_block_mass(
                    &key.type_id,
                    block.cube_size,
                    Some(key.subtype_id.as_str())
                )
            ));
            for component in &block.components {
                lines.push(format!(
                    "component.{}={}",
                    component.subtype_id, component.count
                ));
            }
        }
        DefinitionRef::Component(component) => {
            if let Some(max_integrity) = component.max_integrity {
                lines.push(format!("max_integrity={max_integrity}"));
            }
        }
        DefinitionRef::AmmoMagazine(magazine) => {
            if let Some(capacity) = magazine.capacity {
                lines.push(format!("capacity={capacity}"));
            }
        }
        DefinitionRef::PhysicalItem(_) => {}
    }
    if definition.physical().is_some() {
        lines.push(format!(
            "mass={}",
            repo.item_mass(&key.type_id, &key.subtype_id)
        ));
        lines.push(format!(
            "volume={}",
            repo.item_volume(&key.type_id, &key.subtype_id)
        ));
    }
    lines
}

fn write_lines<W: Write>(stdout: &mut W, lines: &[String]) -> Result<(), String> {
    for line in lines {
        writeln!(stdout, "{line}").map_err(|error| format!("failed writing output: {error}"))?;
    }
    stdout
        .flush()
        .map_err(|error| format!("failed flushing output: {error}"))
}

fn emit_json<W: Write, T: Serialize>(stdout: &mut W, value: &T) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut *stdout, value)
        .map_err(|error| format!("failed writing json output: {error}"))?;
    writeln!(stdout).map_err(|error| format!("failed writing output: {error}"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use gridkit_engine::content::GZIP_MAGIC;
    use tempfile::TempDir;

    use super::*;

    const DEFINITIONS: &str = r#"<?xml version="1.0"?>
<Definitions xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <CubeBlocks>
    <Definition>
      <Id>
        <TypeId>CubeBlock</TypeId>
        <SubtypeId>LargeBlockArmorBlock</SubtypeId>
      </Id>
      <DisplayName>Light Armor Block</DisplayName>
      <CubeSize>Large</CubeSize>
      <Size x="1" y="1" z="1" />
      <Components>
        <Component Subtype="SteelPlate" Count="25" />
      </Components>
    </Definition>
  </CubeBlocks>
  <Components>
    <Component>
      <Id>
        <TypeId>Component</TypeId>
        <SubtypeId>SteelPlate</SubtypeId>
      </Id>
      <DisplayName>Steel Plate</DisplayName>
      <Mass>20</Mass>
      <Volume>3</Volume>
      <MaxIntegrity>100</MaxIntegrity>
    </Component>
  </Components>
  <VoxelMaterials>
    <VoxelMaterial>
      <Id>
        <TypeId>VoxelMaterialDefinition</TypeId>
        <SubtypeId>Stone_01</SubtypeId>
      </Id>
    </VoxelMaterial>
    <VoxelMaterial>
      <Id>
        <TypeId>VoxelMaterialDefinition</TypeId>
        <SubtypeId>Iron_01</SubtypeId>
      </Id>
    </VoxelMaterial>
  </VoxelMaterials>
  <Blueprints>
    <Blueprint>
      <Id>
        <TypeId>BlueprintDefinition</TypeId>
        <SubtypeId>SteelPlate</SubtypeId>
      </Id>
      <Prerequisites>
        <Item Amount="3" TypeId="Ingot" SubtypeId="Iron" />
      </Prerequisites>
      <Result Amount="2" TypeId="Component" SubtypeId="SteelPlate" />
      <BaseProductionTimeInSeconds>1.5</BaseProductionTimeInSeconds>
    </Blueprint>
  </Blueprints>
</Definitions>
"#;

    const GRID: &str = r#"<?xml version="1.0"?>
<MyObjectBuilder_CubeGrid xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <PositionAndOrientation>
    <Position x="10" y="0" z="0" />
  </PositionAndOrientation>
  <GridSizeEnum>Large</GridSizeEnum>
  <CubeBlocks>
    <MyObjectBuilder_CubeBlock xsi:type="MyObjectBuilder_CubeBlock">
      <SubtypeName>LargeBlockArmorBlock</SubtypeName>
      <Min x="0" y="0" z="0" />
    </MyObjectBuilder_CubeBlock>
    <MyObjectBuilder_CubeBlock xsi:type="MyObjectBuilder_CubeBlock">
      <SubtypeName>LargeBlockArmorBlock</SubtypeName>
      <Min x="2" y="1" z="0" />
    </MyObjectBuilder_CubeBlock>
  </CubeBlocks>
</MyObjectBuilder_CubeGrid>
"#;

    struct Fixture {
        _temp: TempDir,
        grid: PathBuf,
        opts: CommonOptions,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().expect("temp");
        let content = temp.path().join("Content").join("Data");
        fs::create_dir_all(&content).expect("mkdir");
        fs::write(content.join("CubeBlocks.sbc"), DEFINITIONS).expect("write defs");
        let grid = temp.path().join("ship.sbc");
        fs::write(&grid, GRID).expect("write grid");
        Fixture {
            grid,
            opts: CommonOptions {
                content_dir: Some(content),
                ..CommonOptions::default()
            },
            _temp: temp,
        }
    }

    fn run_to_string(kind: CommandKind, opts: CommonOptions) -> String {
        let mut out = Vec::new();
        run(kind, opts, &mut out).expect("run");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn bounds_prints_scaled_span_at_grid_position() {
        let fx = fixture();
        let out = run_to_string(
            CommandKind::Bounds {
                path: fx.grid.clone(),
            },
            fx.opts.clone(),
        );
        assert!(out.contains("blocks=2\n"));
        assert!(out.contains("min=10 0 0\n"));
        assert!(out.contains("size=5 2.5 0\n"));
    }

    #[test]
    fn requirements_lists_components_and_expanded_materials() {
        let fx = fixture();
        let out = run_to_string(
            CommandKind::Requirements {
                path: fx.grid.clone(),
            },
            fx.opts.clone(),
        );
        assert!(out.contains("mass=1000\n"));
        assert!(out.contains("component.SteelPlate=50\n"));
        assert!(out.contains("material.Ingot/Iron=75\n"));
        assert!(out.contains("production_time_s=75\n"));
    }

    #[test]
    fn mass_json_output_is_machine_readable() {
        let fx = fixture();
        let out = run_to_string(
            CommandKind::Mass {
                path: fx.grid.clone(),
            },
            CommonOptions {
                json: true,
                ..fx.opts.clone()
            },
        );
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["blocks"], 2);
        assert_eq!(value["mass"], 1000.0);
    }

    #[test]
    fn lookup_reports_component_mass_and_volume() {
        let fx = fixture();
        let out = run_to_string(
            CommandKind::Lookup {
                type_id: "MyObjectBuilder_Component".to_string(),
                subtype_id: "SteelPlate".to_string(),
            },
            fx.opts.clone(),
        );
        assert!(out.contains("kind=component\n"));
        assert!(out.contains("display_name=Steel Plate\n"));
        assert!(out.contains("max_integrity=100\n"));
        assert!(out.contains("volume=3\n"));
    }

    #[test]
    fn lookup_of_unknown_definition_fails() {
        let fx = fixture();
        let mut out = Vec::new();
        let error = run(
            CommandKind::Lookup {
                type_id: "Component".to_string(),
                subtype_id: "Nope".to_string(),
            },
            fx.opts.clone(),
            &mut out,
        )
        .expect_err("unknown");
        assert!(error.contains("Component/Nope"));
    }

    #[test]
    fn material_index_and_name_agree() {
        let fx = fixture();
        let out = run_to_string(
            CommandKind::Material {
                name: "Iron_01".to_string(),
            },
            fx.opts.clone(),
        );
        assert!(out.contains("index=1\n"));

        let out = run_to_string(
            CommandKind::MaterialAt {
                index: 9,
                fallback_index: 0,
            },
            fx.opts.clone(),
        );
        assert!(out.contains("material=Stone_01\n"));
    }

    #[test]
    fn convert_flips_encoding_by_default() {
        let fx = fixture();
        let packed = fx.grid.with_extension("gz.sbc");
        let out = run_to_string(
            CommandKind::Convert {
                input: fx.grid.clone(),
                output: packed.clone(),
                encoding: None,
            },
            fx.opts.clone(),
        );
        assert!(out.contains("output_encoding=gzip\n"));
        let raw = fs::read(&packed).expect("read");
        assert_eq!(raw[..2], GZIP_MAGIC);

        let plain = fx.grid.with_extension("plain.sbc");
        run_to_string(
            CommandKind::Convert {
                input: packed,
                output: plain.clone(),
                encoding: parse_encoding_flag("--plain"),
            },
            fx.opts.clone(),
        );
        assert_eq!(fs::read_to_string(&plain).expect("read"), GRID);
    }

    #[test]
    fn strict_mode_surfaces_unknown_elements() {
        let fx = fixture();
        fs::write(
            &fx.grid,
            "<MyObjectBuilder_CubeGrid><Mystery /></MyObjectBuilder_CubeGrid>",
        )
        .expect("write");
        let mut out = Vec::new();
        let error = run(
            CommandKind::Bounds {
                path: fx.grid.clone(),
            },
            CommonOptions {
                strict: true,
                ..fx.opts.clone()
            },
            &mut out,
        )
        .expect_err("strict");
        assert!(error.contains("Mystery"));
    }
}
