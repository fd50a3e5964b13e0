use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::{DateTime, Local};
use roxmltree::{Document, Node, ParsingOptions};
use thiserror::Error;
use tracing::debug;

use crate::world::CubeGrid;

use super::definitions::Definitions;
use super::xml::{
    DecodeError, DecodeErrorCode, ReadOptions, SourceLocation, XmlWriter, XSD_NAMESPACE,
    XSI_NAMESPACE,
};

/// A type that has a persisted XML shape.
pub trait XmlContent: Sized + Send + Sync + 'static {
    const ROOT_ELEMENT: &'static str;

    fn read_xml(node: Node<'_, '_>, options: &ReadOptions) -> Result<Self, DecodeError>;

    fn write_xml(&self, writer: &mut XmlWriter);
}

/// Type-erased strategy the registry dispatches to.
pub trait ContentSerializer: Send + Sync {
    fn root_element(&self) -> &'static str;

    fn read(
        &self,
        root: Node<'_, '_>,
        options: &ReadOptions,
    ) -> Result<Box<dyn Any + Send>, DecodeError>;

    /// Returns `false` when `value` is not the type this strategy was built for.
    fn write(&self, value: &dyn Any, writer: &mut XmlWriter) -> bool;
}

pub struct XmlContentSerializer<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> Default for XmlContentSerializer<T> {
    fn default() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T: XmlContent> ContentSerializer for XmlContentSerializer<T> {
    fn root_element(&self) -> &'static str {
        T::ROOT_ELEMENT
    }

    fn read(
        &self,
        root: Node<'_, '_>,
        options: &ReadOptions,
    ) -> Result<Box<dyn Any + Send>, DecodeError> {
        Ok(Box::new(T::read_xml(root, options)?))
    }

    fn write(&self, value: &dyn Any, writer: &mut XmlWriter) -> bool {
        match value.downcast_ref::<T>() {
            Some(value) => {
                value.write_xml(writer);
                true
            }
            None => false,
        }
    }
}

/// Identity recorded in the trailing comment of every written document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub tool: String,
    pub version: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            tool: "gridkit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Provenance {
    fn comment_at(&self, saved_at: DateTime<Local>) -> String {
        format!(
            " Saved '{}' with {} version '{}' ",
            saved_at.to_rfc3339(),
            self.tool,
            self.version
        )
    }
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("no serializer registered for {type_name}")]
    Unregistered { type_name: &'static str },
    #[error("serializer registered for {type_name} rejected the value")]
    TypeMismatch { type_name: &'static str },
}

#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<TypeId, Box<dyn ContentSerializer>>,
    provenance: Provenance,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every document type the engine itself persists.
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register::<Definitions>();
        registry.register::<CubeGrid>();
        registry
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn register<T: XmlContent>(&mut self) {
        self.register_with::<T>(XmlContentSerializer::<T>::default());
    }

    /// Replaces whatever strategy was registered for `T`.
    pub fn register_with<T: 'static>(&mut self, serializer: impl ContentSerializer + 'static) {
        debug!(
            type_name = type_name::<T>(),
            root_element = serializer.root_element(),
            "serializer_registered"
        );
        self.serializers
            .insert(TypeId::of::<T>(), Box::new(serializer));
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.serializers.contains_key(&TypeId::of::<T>())
    }

    /// Empty or whitespace-only input is `Ok(None)`.
    pub fn deserialize<T: 'static>(
        &self,
        bytes: &[u8],
        options: &ReadOptions,
    ) -> Result<Option<T>, DecodeError> {
        let text = std::str::from_utf8(strip_bom(bytes)).map_err(|error| {
            DecodeError::new(
                DecodeErrorCode::NotUtf8,
                format!(
                    "document is not valid UTF-8 at byte {}",
                    error.valid_up_to()
                ),
            )
        })?;
        self.deserialize_str(text, options)
    }

    pub fn deserialize_str<T: 'static>(
        &self,
        text: &str,
        options: &ReadOptions,
    ) -> Result<Option<T>, DecodeError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let serializer = self.serializers.get(&TypeId::of::<T>()).ok_or_else(|| {
            DecodeError::new(
                DecodeErrorCode::Unregistered,
                format!("no serializer registered for {}", type_name::<T>()),
            )
        })?;

        let parsing = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, parsing).map_err(|error| DecodeError {
            code: DecodeErrorCode::XmlMalformed,
            message: format!("malformed XML: {error}"),
            location: Some(SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            }),
        })?;

        let root = doc.root_element();
        if root.tag_name().name() != serializer.root_element() {
            return Err(DecodeError::at_node(
                DecodeErrorCode::InvalidRoot,
                format!(
                    "root element must be <{}>, found <{}>",
                    serializer.root_element(),
                    root.tag_name().name()
                ),
                root,
            ));
        }

        let value = serializer.read(root, options)?;
        value.downcast::<T>().map(|value| Some(*value)).map_err(|_| {
            DecodeError::new(
                DecodeErrorCode::Unregistered,
                format!(
                    "serializer for <{}> produced a value that is not {}",
                    serializer.root_element(),
                    type_name::<T>()
                ),
            )
        })
    }

    pub fn serialize<T: 'static>(&self, value: &T) -> Result<String, SerializeError> {
        self.serialize_at(value, Local::now())
    }

    fn serialize_at<T: 'static>(
        &self,
        value: &T,
        saved_at: DateTime<Local>,
    ) -> Result<String, SerializeError> {
        let serializer =
            self.serializers
                .get(&TypeId::of::<T>())
                .ok_or(SerializeError::Unregistered {
                    type_name: type_name::<T>(),
                })?;

        let mut writer = XmlWriter::new();
        writer.declaration();
        if !serializer.write(value, &mut writer) {
            return Err(SerializeError::TypeMismatch {
                type_name: type_name::<T>(),
            });
        }
        let mut text = writer.finish();
        let mut trailer = XmlWriter::new();
        trailer.comment(&self.provenance.comment_at(saved_at));
        text.push_str(&trailer.finish());
        Ok(text)
    }
}

/// Namespace declarations every root element carries.
pub(crate) fn root_namespace_attributes() -> [(&'static str, &'static str); 2] {
    [("xmlns:xsd", XSD_NAMESPACE), ("xmlns:xsi", XSI_NAMESPACE)]
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}
