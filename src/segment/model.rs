//! Segment data model.
//!
//! A [`CodeSegment`] is the transient unit produced by one parse pass.
//! Its metadata is typed per segment kind ([`SegmentDetails`]) and only
//! flattened into a string-keyed map when it is projected onto a
//! vector store entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Kind of source construct a segment was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentKind {
    File,
    PackageDeclaration,
    Class,
    Interface,
    Enum,
    Annotation,
    Method,
    Constructor,
    Field,
    StaticBlock,
    InstanceBlock,
    ModuleDeclaration,
    ModuleDirectiveRequires,
    ModuleDirectiveExports,
    ModuleDirectiveOpens,
    ModuleDirectiveUses,
    ModuleDirectiveProvides,
    Unknown,
}

impl SegmentKind {
    /// Wire name used in ids and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::PackageDeclaration => "PACKAGE_DECLARATION",
            Self::Class => "CLASS",
            Self::Interface => "INTERFACE",
            Self::Enum => "ENUM",
            Self::Annotation => "ANNOTATION",
            Self::Method => "METHOD",
            Self::Constructor => "CONSTRUCTOR",
            Self::Field => "FIELD",
            Self::StaticBlock => "STATIC_BLOCK",
            Self::InstanceBlock => "INSTANCE_BLOCK",
            Self::ModuleDeclaration => "MODULE_DECLARATION",
            Self::ModuleDirectiveRequires => "MODULE_DIRECTIVE_REQUIRES",
            Self::ModuleDirectiveExports => "MODULE_DIRECTIVE_EXPORTS",
            Self::ModuleDirectiveOpens => "MODULE_DIRECTIVE_OPENS",
            Self::ModuleDirectiveUses => "MODULE_DIRECTIVE_USES",
            Self::ModuleDirectiveProvides => "MODULE_DIRECTIVE_PROVIDES",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Map a module directive keyword (`requires`, `exports`, ...) to its kind.
    #[must_use]
    pub fn from_directive_keyword(keyword: &str) -> Self {
        match keyword {
            "requires" => Self::ModuleDirectiveRequires,
            "exports" => Self::ModuleDirectiveExports,
            "opens" => Self::ModuleDirectiveOpens,
            "uses" => Self::ModuleDirectiveUses,
            "provides" => Self::ModuleDirectiveProvides,
            _ => Self::Unknown,
        }
    }

    /// Whether segments of this kind own child segments.
    #[must_use]
    pub const fn is_type(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Interface | Self::Enum | Self::Annotation
        )
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An annotation attached to a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub name: String,
    /// Argument list source text, absent for marker annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// One `requires`/`exports`/`opens`/`uses`/`provides` line of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDirective {
    pub kind: SegmentKind,
    pub name: String,
    pub fqn: String,
}

/// Kind-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentDetails {
    /// Class, interface, enum, annotation type.
    Type {
        modifiers: String,
        superclass: Option<String>,
        interfaces: Option<String>,
        type_parameters: Option<String>,
    },
    /// Method, constructor, annotation member.
    Callable {
        modifiers: String,
        return_type: Option<String>,
        parameters: String,
        throws: Option<String>,
        type_parameters: Option<String>,
        default_value: Option<String>,
    },
    /// Field, interface constant, enum constant.
    Field {
        modifiers: String,
        field_type: String,
        initializer: Option<String>,
        arguments: Option<String>,
    },
    Initializer {
        is_static: bool,
    },
    Module {
        is_open: bool,
        directives: Vec<ModuleDirective>,
    },
    None,
}

/// Typed metadata plus an open extension map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMetadata {
    pub fqn: String,
    pub annotations: Vec<AnnotationInfo>,
    /// Simple name to qualified name for the file's single-type imports.
    pub imports: Option<Arc<BTreeMap<String, String>>>,
    pub details: SegmentDetails,
    pub extra: BTreeMap<String, Value>,
}

impl SegmentMetadata {
    #[must_use]
    pub fn new(fqn: impl Into<String>, details: SegmentDetails) -> Self {
        Self {
            fqn: fqn.into(),
            annotations: Vec::new(),
            imports: None,
            details,
            extra: BTreeMap::new(),
        }
    }

    /// Modifier keywords, space separated and upper-cased, if the kind has any.
    #[must_use]
    pub fn modifiers(&self) -> Option<&str> {
        match &self.details {
            SegmentDetails::Type { modifiers, .. }
            | SegmentDetails::Callable { modifiers, .. }
            | SegmentDetails::Field { modifiers, .. } => Some(modifiers),
            _ => None,
        }
    }

    /// Flatten into scalar-valued JSON keys.
    ///
    /// Structured values (annotations, imports, module directives) are
    /// encoded as JSON strings so every value stays a scalar.
    #[must_use]
    pub fn to_flat_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("fqn".into(), Value::from(self.fqn.as_str()));

        if !self.annotations.is_empty() {
            insert_json(&mut map, "annotations", &self.annotations);
        }
        if let Some(imports) = &self.imports {
            if !imports.is_empty() {
                insert_json(&mut map, "imports", imports.as_ref());
            }
        }

        match &self.details {
            SegmentDetails::Type {
                modifiers,
                superclass,
                interfaces,
                type_parameters,
            } => {
                map.insert("modifiers".into(), Value::from(modifiers.as_str()));
                insert_opt(&mut map, "superclass", superclass.as_deref());
                insert_opt(&mut map, "interfaces", interfaces.as_deref());
                insert_opt(&mut map, "typeParameters", type_parameters.as_deref());
            }
            SegmentDetails::Callable {
                modifiers,
                return_type,
                parameters,
                throws,
                type_parameters,
                default_value,
            } => {
                map.insert("modifiers".into(), Value::from(modifiers.as_str()));
                insert_opt(&mut map, "returnType", return_type.as_deref());
                map.insert("parameters".into(), Value::from(parameters.as_str()));
                insert_opt(&mut map, "throws", throws.as_deref());
                insert_opt(&mut map, "typeParameters", type_parameters.as_deref());
                insert_opt(&mut map, "defaultValue", default_value.as_deref());
            }
            SegmentDetails::Field {
                modifiers,
                field_type,
                initializer,
                arguments,
            } => {
                map.insert("modifiers".into(), Value::from(modifiers.as_str()));
                map.insert("fieldType".into(), Value::from(field_type.as_str()));
                insert_opt(&mut map, "initializer", initializer.as_deref());
                insert_opt(&mut map, "arguments", arguments.as_deref());
            }
            SegmentDetails::Initializer { is_static } => {
                map.insert("static".into(), Value::Bool(*is_static));
            }
            SegmentDetails::Module {
                is_open,
                directives,
            } => {
                map.insert("isOpen".into(), Value::Bool(*is_open));
                if !directives.is_empty() {
                    insert_json(&mut map, "directives", directives);
                }
            }
            SegmentDetails::None => {}
        }

        for (key, value) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        map
    }
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::from(value));
    }
}

fn insert_json<T: Serialize + ?Sized>(map: &mut Map<String, Value>, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(encoded) => {
            map.insert(key.to_string(), Value::String(encoded));
        }
        Err(e) => tracing::warn!(key, error = %e, "Failed to encode segment metadata"),
    }
}

/// Position of a chunk within an oversized segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Id the segment would have had if it had not been split.
    pub original_segment_id: String,
    /// Zero-based.
    pub chunk_number: usize,
    pub total_chunks: usize,
}

/// A retrievable unit of source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSegment {
    pub id: String,
    pub kind: SegmentKind,
    pub relative_path: String,
    /// 1-based, of the unsplit declaration.
    pub start_line: usize,
    pub end_line: usize,
    pub entity_name: Option<String>,
    pub parent_id: Option<String>,
    pub parent_fqn: Option<String>,
    pub content: String,
    pub metadata: SegmentMetadata,
    pub last_modified: Option<DateTime<Utc>>,
    pub chunk: Option<ChunkInfo>,
}

impl CodeSegment {
    /// Whether this segment is one window of a larger declaration.
    #[must_use]
    pub const fn is_sub_chunk(&self) -> bool {
        self.chunk.is_some()
    }

    /// Fully-qualified name of the declaration.
    #[must_use]
    pub fn fqn(&self) -> &str {
        &self.metadata.fqn
    }
}
