mod atomic_io;
mod database;
mod definitions;
mod io;
mod pipeline;
mod quantity;
mod requirements;
mod serializer;
mod transcode;
mod types;
pub(crate) mod xml;

pub use database::{DefinitionCounts, DefinitionRef, DefinitionRepository, MaterialIndexCache};
pub use definitions::{
    AmmoMagazineDefinition, BlockVariant, BlueprintDefinition, BlueprintItem,
    ComponentDefinition, ComponentRequirement, CubeBlockDefinition, Definitions,
    PhysicalItemDefinition, VoxelMaterialDefinition,
};
pub use io::{load_file, load_from_reader, save_file, LoadError, Loaded, SaveError};
pub use pipeline::{load_definition_repository, RepositoryLoad, RepositoryLoadError};
pub use quantity::{Amount, InvalidAmount};
pub use requirements::{
    accumulate, structure_requirements, LedgerEntry, RequirementLedger, RequirementReport,
};
pub(crate) use serializer::root_namespace_attributes;
pub use serializer::{
    ContentSerializer, Provenance, SerializeError, SerializerRegistry, XmlContent,
    XmlContentSerializer,
};
pub use transcode::{
    encode, read_content, read_content_file, write_content, write_content_file, ContentEncoding,
    TranscodeError, Transcoded, GZIP_MAGIC,
};
pub use types::{CubeSize, DefinitionKey, ObjectType};
pub use xml::{DecodeError, DecodeErrorCode, ReadOptions, SourceLocation, XmlWriter};
