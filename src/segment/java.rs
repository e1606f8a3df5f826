//! Java declaration walker built on tree-sitter.
//!
//! Walks the syntax tree depth-first and emits one segment per
//! declaration: types, members, initializer blocks and modules. Method
//! and field bodies are not descended into. Package and import
//! declarations only feed FQN and metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tree_sitter::{Language, Node, Parser};

use super::chunking::split_windows;
use super::context::TraversalContext;
use super::identity::{base_id, finalize_id};
use super::model::{
    AnnotationInfo, ChunkInfo, CodeSegment, ModuleDirective, SegmentDetails, SegmentKind,
    SegmentMetadata,
};
use crate::error::ParseError;

/// Modifiers reported for enum constants.
const ENUM_CONSTANT_MODIFIERS: &str = "PUBLIC STATIC FINAL";

/// Window limits for oversized segments.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkLimits {
    pub max_len: usize,
    pub overlap: usize,
}

/// Segment one Java compilation unit.
///
/// Syntax errors yield an empty list. The only failure is a grammar that
/// cannot be loaded.
pub(crate) fn segment_java(
    source: &str,
    relative_path: &str,
    last_modified: Option<DateTime<Utc>>,
    limits: ChunkLimits,
) -> Result<Vec<CodeSegment>, ParseError> {
    let mut parser = Parser::new();
    let language: Language = tree_sitter_java::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ParseError::Language(e.to_string()))?;

    let Some(tree) = parser.parse(source, None) else {
        tracing::debug!(path = relative_path, "Parser returned no tree");
        return Ok(Vec::new());
    };
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!(path = relative_path, "Syntax errors found, skipping file");
        return Ok(Vec::new());
    }

    let mut walker = Walker {
        source,
        relative_path,
        last_modified,
        limits,
        package: None,
        imports: Arc::new(BTreeMap::new()),
        segments: Vec::new(),
    };
    walker.read_header(root);

    let ctx = TraversalContext::root();
    for child in named_children(root) {
        walker.visit(child, &ctx);
    }
    Ok(walker.segments)
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    all_children(node)
        .into_iter()
        .find(|child| kinds.contains(&child.kind()))
}

fn is_annotation(node: Node<'_>) -> bool {
    matches!(node.kind(), "marker_annotation" | "annotation")
}

/// Everything that differs between declaration kinds at emission time.
struct Draft<'s> {
    kind: SegmentKind,
    name: Option<&'s str>,
    fqn: String,
    details: SegmentDetails,
    annotations: Vec<AnnotationInfo>,
}

struct Walker<'a> {
    source: &'a str,
    relative_path: &'a str,
    last_modified: Option<DateTime<Utc>>,
    limits: ChunkLimits,
    package: Option<String>,
    imports: Arc<BTreeMap<String, String>>,
    segments: Vec<CodeSegment>,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Package name and single-type imports. Wildcard imports are dropped.
    fn read_header(&mut self, root: Node<'_>) {
        let mut imports = BTreeMap::new();
        for child in named_children(root) {
            match child.kind() {
                "package_declaration" => {
                    self.package = child_of_kind(child, &["scoped_identifier", "identifier"])
                        .map(|n| self.text(n).to_string());
                }
                "import_declaration" => {
                    if child_of_kind(child, &["asterisk"]).is_some() {
                        continue;
                    }
                    if let Some(name) = child_of_kind(child, &["scoped_identifier", "identifier"])
                    {
                        let qualified = self.text(name);
                        let simple = qualified.rsplit('.').next().unwrap_or(qualified);
                        imports.insert(simple.to_string(), qualified.to_string());
                    }
                }
                _ => {}
            }
        }
        self.imports = Arc::new(imports);
    }

    fn visit(&mut self, node: Node<'_>, ctx: &TraversalContext) {
        match node.kind() {
            "class_declaration" | "record_declaration" => {
                self.visit_type(node, SegmentKind::Class, ctx);
            }
            "interface_declaration" => self.visit_type(node, SegmentKind::Interface, ctx),
            "enum_declaration" => self.visit_type(node, SegmentKind::Enum, ctx),
            "annotation_type_declaration" => self.visit_type(node, SegmentKind::Annotation, ctx),
            "method_declaration" => self.visit_callable(node, SegmentKind::Method, ctx),
            "constructor_declaration" | "compact_constructor_declaration" => {
                self.visit_callable(node, SegmentKind::Constructor, ctx);
            }
            "field_declaration" | "constant_declaration" => self.visit_field(node, ctx),
            "annotation_type_element_declaration" => self.visit_annotation_member(node, ctx),
            "static_initializer" => self.visit_initializer(node, true, ctx),
            // a bare block directly inside a class body
            "block" => self.visit_initializer(node, false, ctx),
            "module_declaration" => self.visit_module(node, ctx),
            _ => {}
        }
    }

    fn visit_type(&mut self, node: Node<'_>, kind: SegmentKind, ctx: &TraversalContext) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let fqn = ctx.type_fqn(self.package.as_deref(), name);
        let (modifiers, annotations) = self.modifiers(node);

        let details = SegmentDetails::Type {
            modifiers,
            superclass: child_of_kind(node, &["superclass"])
                .and_then(|n| named_children(n).into_iter().next())
                .map(|n| self.text(n).to_string()),
            interfaces: child_of_kind(node, &["super_interfaces", "extends_interfaces"])
                .map(|n| self.type_list(n)),
            type_parameters: child_of_kind(node, &["type_parameters"])
                .map(|n| self.text(n).to_string()),
        };

        let id = self.emit(
            node,
            Draft {
                kind,
                name: Some(name),
                fqn: fqn.clone(),
                details,
                annotations,
            },
            ctx,
        );
        let inner = ctx.enter(id.as_deref(), &fqn);

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        for member in named_children(body) {
            match member.kind() {
                "enum_constant" => self.visit_enum_constant(member, name, &inner),
                "enum_body_declarations" => {
                    for declaration in named_children(member) {
                        self.visit(declaration, &inner);
                    }
                }
                _ => self.visit(member, &inner),
            }
        }
    }

    fn visit_callable(&mut self, node: Node<'_>, kind: SegmentKind, ctx: &TraversalContext) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let (modifiers, annotations) = self.modifiers(node);
        let return_type = if kind == SegmentKind::Method {
            self.field_text(node, "type").map(str::to_string)
        } else {
            None
        };

        let details = SegmentDetails::Callable {
            modifiers,
            return_type,
            parameters: self
                .field_text(node, "parameters")
                .unwrap_or("()")
                .to_string(),
            throws: child_of_kind(node, &["throws"]).map(|n| self.type_list(n)),
            type_parameters: child_of_kind(node, &["type_parameters"])
                .map(|n| self.text(n).to_string()),
            default_value: None,
        };
        self.emit(
            node,
            Draft {
                kind,
                name: Some(name),
                fqn: ctx.member_fqn(name),
                details,
                annotations,
            },
            ctx,
        );
    }

    /// One segment per declared variable, each carrying the whole declaration.
    fn visit_field(&mut self, node: Node<'_>, ctx: &TraversalContext) {
        let field_type = self.field_text(node, "type").unwrap_or_default();
        let (modifiers, annotations) = self.modifiers(node);

        let declarators: Vec<Node<'_>> = {
            let mut cursor = node.walk();
            node.children_by_field_name("declarator", &mut cursor)
                .collect()
        };
        for declarator in declarators {
            let Some(name) = self.field_text(declarator, "name") else {
                continue;
            };
            let details = SegmentDetails::Field {
                modifiers: modifiers.clone(),
                field_type: field_type.to_string(),
                initializer: self.field_text(declarator, "value").map(str::to_string),
                arguments: None,
            };
            self.emit(
                node,
                Draft {
                    kind: SegmentKind::Field,
                    name: Some(name),
                    fqn: ctx.member_fqn(name),
                    details,
                    annotations: annotations.clone(),
                },
                ctx,
            );
        }
    }

    fn visit_enum_constant(&mut self, node: Node<'_>, enum_name: &str, ctx: &TraversalContext) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let (_, annotations) = self.modifiers(node);
        let details = SegmentDetails::Field {
            modifiers: ENUM_CONSTANT_MODIFIERS.to_string(),
            field_type: enum_name.to_string(),
            initializer: None,
            arguments: self.field_text(node, "arguments").map(str::to_string),
        };
        self.emit(
            node,
            Draft {
                kind: SegmentKind::Field,
                name: Some(name),
                fqn: ctx.member_fqn(name),
                details,
                annotations,
            },
            ctx,
        );
    }

    fn visit_annotation_member(&mut self, node: Node<'_>, ctx: &TraversalContext) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let (modifiers, annotations) = self.modifiers(node);
        let details = SegmentDetails::Callable {
            modifiers: if modifiers.is_empty() {
                "PUBLIC".to_string()
            } else {
                modifiers
            },
            return_type: self.field_text(node, "type").map(str::to_string),
            parameters: "()".to_string(),
            throws: None,
            type_parameters: None,
            default_value: self
                .field_text(node, "value")
                .or_else(|| {
                    let (_, value) = self.text(node).rsplit_once(" default ")?;
                    Some(value.trim().trim_end_matches(';').trim_end())
                })
                .map(str::to_string),
        };
        self.emit(
            node,
            Draft {
                kind: SegmentKind::Method,
                name: Some(name),
                fqn: ctx.member_fqn(name),
                details,
                annotations,
            },
            ctx,
        );
    }

    fn visit_initializer(&mut self, node: Node<'_>, is_static: bool, ctx: &TraversalContext) {
        if ctx.parent_fqn().is_none() {
            return;
        }
        let kind = if is_static {
            SegmentKind::StaticBlock
        } else {
            SegmentKind::InstanceBlock
        };
        self.emit(
            node,
            Draft {
                kind,
                name: None,
                fqn: ctx.initializer_fqn(is_static),
                details: SegmentDetails::Initializer { is_static },
                annotations: Vec::new(),
            },
            ctx,
        );
    }

    /// The module is one segment; its directives live in its metadata.
    fn visit_module(&mut self, node: Node<'_>, ctx: &TraversalContext) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let children = all_children(node);
        let is_open = children.iter().any(|c| c.kind() == "open");
        let annotations = children
            .iter()
            .filter(|c| is_annotation(**c))
            .map(|c| self.annotation(*c))
            .collect();

        let module_ctx = ctx.enter(None, name);
        let directives: Vec<ModuleDirective> = node
            .child_by_field_name("body")
            .map(|body| {
                named_children(body)
                    .into_iter()
                    .filter_map(|d| self.directive(d, &module_ctx))
                    .collect()
            })
            .unwrap_or_default();

        self.emit(
            node,
            Draft {
                kind: SegmentKind::ModuleDeclaration,
                name: Some(name),
                fqn: name.to_string(),
                details: SegmentDetails::Module {
                    is_open,
                    directives,
                },
                annotations,
            },
            ctx,
        );
    }

    fn directive(&self, node: Node<'_>, ctx: &TraversalContext) -> Option<ModuleDirective> {
        if !node.kind().ends_with("module_directive") {
            return None;
        }
        let text = self.text(node).trim().trim_end_matches(';').trim();
        let (keyword, rest) = text.split_once(char::is_whitespace)?;
        let kind = SegmentKind::from_directive_keyword(keyword);

        let name = if kind == SegmentKind::ModuleDirectiveRequires {
            // skip `transitive` / `static`
            rest.split_whitespace().last().unwrap_or_default().to_string()
        } else {
            rest.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        Some(ModuleDirective {
            kind,
            fqn: ctx.directive_fqn(keyword, &name),
            name,
        })
    }

    /// Upper-cased modifier keywords and the annotations mixed in with them.
    fn modifiers(&self, node: Node<'_>) -> (String, Vec<AnnotationInfo>) {
        let Some(modifiers) = child_of_kind(node, &["modifiers"]) else {
            return (String::new(), Vec::new());
        };
        let mut keywords = Vec::new();
        let mut annotations = Vec::new();
        for child in all_children(modifiers) {
            if is_annotation(child) {
                annotations.push(self.annotation(child));
            } else if !child.is_named() {
                keywords.push(self.text(child).to_uppercase());
            }
        }
        (keywords.join(" "), annotations)
    }

    fn annotation(&self, node: Node<'_>) -> AnnotationInfo {
        let name = self
            .field_text(node, "name")
            .unwrap_or_else(|| self.text(node).trim_start_matches('@'));
        AnnotationInfo {
            name: name.to_string(),
            details: self.field_text(node, "arguments").map(str::to_string),
        }
    }

    /// `implements A, B` / `throws X, Y` as `A, B`.
    fn type_list(&self, node: Node<'_>) -> String {
        if let Some(list) = child_of_kind(node, &["type_list"]) {
            return self.text(list).to_string();
        }
        named_children(node)
            .into_iter()
            .map(|n| self.text(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Push the segment, or its chunks, and return the id children should
    /// point at. Oversized declarations hand out their first chunk's id.
    fn emit(&mut self, node: Node<'_>, draft: Draft<'_>, ctx: &TraversalContext) -> Option<String> {
        let content = self.text(node);
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        if content.trim().is_empty() {
            tracing::warn!(
                path = self.relative_path,
                line = start_line,
                kind = %draft.kind,
                "Skipping blank segment"
            );
            return None;
        }
        if end_line < start_line {
            tracing::warn!(
                path = self.relative_path,
                start_line,
                end_line,
                "Skipping segment with invalid line range"
            );
            return None;
        }

        let base = base_id(self.relative_path, start_line, draft.kind, draft.name);
        let original_id = finalize_id(&base, content);
        let metadata = SegmentMetadata {
            fqn: draft.fqn,
            annotations: draft.annotations,
            imports: (draft.kind != SegmentKind::ModuleDeclaration)
                .then(|| Arc::clone(&self.imports)),
            details: draft.details,
            extra: BTreeMap::new(),
        };
        let template = CodeSegment {
            id: original_id.clone(),
            kind: draft.kind,
            relative_path: self.relative_path.to_string(),
            start_line,
            end_line,
            entity_name: draft.name.map(str::to_string),
            parent_id: ctx.parent_id().map(str::to_string),
            parent_fqn: ctx.parent_fqn().map(str::to_string),
            content: String::new(),
            metadata,
            last_modified: self.last_modified,
            chunk: None,
        };

        let windows = split_windows(content, self.limits.max_len, self.limits.overlap);
        if windows.len() == 1 {
            self.segments.push(CodeSegment {
                content: content.to_string(),
                ..template
            });
            return Some(original_id);
        }

        let total_chunks = windows.len();
        tracing::debug!(
            path = self.relative_path,
            fqn = %template.metadata.fqn,
            chunks = total_chunks,
            "Splitting oversized segment"
        );
        let mut first_id = None;
        for (chunk_number, window) in windows.into_iter().enumerate() {
            let id = finalize_id(&format!("{base}_chunk{chunk_number}"), &window.text);
            first_id.get_or_insert_with(|| id.clone());
            self.segments.push(CodeSegment {
                id,
                content: window.text,
                chunk: Some(ChunkInfo {
                    original_segment_id: original_id.clone(),
                    chunk_number,
                    total_chunks,
                }),
                ..template.clone()
            });
        }
        first_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_SERVICE: &str = r#"package com.acme.shop;

import java.util.List;
import java.util.Map;
import java.util.concurrent.*;
import static java.util.Objects.requireNonNull;

/** Orders. */
@Service
public class OrderService extends BaseService implements Auditable, Closeable {
    private static final int LIMIT = 10, OFFSET = 2;

    static {
        System.out.println("init");
    }

    {
        counter = 0;
    }

    public OrderService(Map<String, Order> orders) {
        this.orders = requireNonNull(orders);
    }

    @Override
    public <T> List<T> find(String id, int limit) throws IOException, SQLException {
        return null;
    }

    public static class Builder {
        private String name;

        Builder name(String name) {
            this.name = name;
            return this;
        }
    }

    enum Status {
        OPEN("o"),
        CLOSED("c");

        private final String code;

        Status(String code) {
            this.code = code;
        }
    }
}

interface Auditable {
    int VERSION = 1;

    void audit();
}

@interface Audited {
    String value() default "none";
}
"#;

    const LIMITS: ChunkLimits = ChunkLimits {
        max_len: 2000,
        overlap: 100,
    };

    fn parse(source: &str) -> Vec<CodeSegment> {
        segment_java(source, "src/com/acme/shop/OrderService.java", None, LIMITS).unwrap()
    }

    fn by_fqn<'s>(segments: &'s [CodeSegment], fqn: &str) -> &'s CodeSegment {
        segments
            .iter()
            .find(|s| s.fqn() == fqn)
            .unwrap_or_else(|| panic!("no segment for {fqn}"))
    }

    #[test]
    fn test_declaration_listing() {
        let segments = parse(ORDER_SERVICE);
        let listing = segments
            .iter()
            .map(|s| format!("{} {}", s.kind, s.fqn()))
            .collect::<Vec<_>>()
            .join("\n");

        insta::assert_snapshot!(listing, @r"
        CLASS com.acme.shop.OrderService
        FIELD com.acme.shop.OrderService#LIMIT
        FIELD com.acme.shop.OrderService#OFFSET
        STATIC_BLOCK com.acme.shop.OrderService#static_initializer
        INSTANCE_BLOCK com.acme.shop.OrderService#instance_initializer
        CONSTRUCTOR com.acme.shop.OrderService#OrderService
        METHOD com.acme.shop.OrderService#find
        CLASS com.acme.shop.OrderService.Builder
        FIELD com.acme.shop.OrderService.Builder#name
        METHOD com.acme.shop.OrderService.Builder#name
        ENUM com.acme.shop.OrderService.Status
        FIELD com.acme.shop.OrderService.Status#OPEN
        FIELD com.acme.shop.OrderService.Status#CLOSED
        FIELD com.acme.shop.OrderService.Status#code
        CONSTRUCTOR com.acme.shop.OrderService.Status#Status
        INTERFACE com.acme.shop.Auditable
        FIELD com.acme.shop.Auditable#VERSION
        METHOD com.acme.shop.Auditable#audit
        ANNOTATION com.acme.shop.Audited
        METHOD com.acme.shop.Audited#value
        ");
    }

    #[test]
    fn test_parent_links() {
        let segments = parse(ORDER_SERVICE);
        let service = by_fqn(&segments, "com.acme.shop.OrderService");
        let builder = by_fqn(&segments, "com.acme.shop.OrderService.Builder");
        let setter = segments
            .iter()
            .find(|s| s.kind == SegmentKind::Method && s.fqn() == "com.acme.shop.OrderService.Builder#name")
            .unwrap();

        assert_eq!(service.parent_id, None);
        assert_eq!(service.parent_fqn, None);
        assert_eq!(builder.parent_id.as_deref(), Some(service.id.as_str()));
        assert_eq!(setter.parent_id.as_deref(), Some(builder.id.as_str()));
        assert_eq!(
            setter.parent_fqn.as_deref(),
            Some("com.acme.shop.OrderService.Builder")
        );

        let ids: std::collections::HashSet<_> = segments.iter().map(|s| s.id.as_str()).collect();
        for segment in &segments {
            if let Some(parent) = &segment.parent_id {
                assert!(ids.contains(parent.as_str()), "dangling parent for {}", segment.fqn());
            }
        }
    }

    #[test]
    fn test_type_metadata() {
        let segments = parse(ORDER_SERVICE);
        let service = by_fqn(&segments, "com.acme.shop.OrderService");

        assert_eq!(service.start_line, 9);
        assert_eq!(service.entity_name.as_deref(), Some("OrderService"));
        assert!(service.content.starts_with("@Service\npublic class OrderService"));
        assert_eq!(
            service.metadata.details,
            SegmentDetails::Type {
                modifiers: "PUBLIC".to_string(),
                superclass: Some("BaseService".to_string()),
                interfaces: Some("Auditable, Closeable".to_string()),
                type_parameters: None,
            }
        );
        assert_eq!(
            service.metadata.annotations,
            vec![AnnotationInfo {
                name: "Service".to_string(),
                details: None
            }]
        );

        let imports = service.metadata.imports.as_ref().unwrap();
        assert_eq!(imports.get("List").map(String::as_str), Some("java.util.List"));
        assert_eq!(
            imports.get("requireNonNull").map(String::as_str),
            Some("java.util.Objects.requireNonNull")
        );
        assert_eq!(imports.len(), 3);
    }

    #[test]
    fn test_method_metadata() {
        let segments = parse(ORDER_SERVICE);
        let find = by_fqn(&segments, "com.acme.shop.OrderService#find");

        assert_eq!(find.kind, SegmentKind::Method);
        assert_eq!(
            find.metadata.details,
            SegmentDetails::Callable {
                modifiers: "PUBLIC".to_string(),
                return_type: Some("List<T>".to_string()),
                parameters: "(String id, int limit)".to_string(),
                throws: Some("IOException, SQLException".to_string()),
                type_parameters: Some("<T>".to_string()),
                default_value: None,
            }
        );
        assert_eq!(find.metadata.annotations[0].name, "Override");

        let ctor = by_fqn(&segments, "com.acme.shop.OrderService#OrderService");
        match &ctor.metadata.details {
            SegmentDetails::Callable {
                return_type,
                parameters,
                ..
            } => {
                assert!(return_type.is_none());
                assert_eq!(parameters, "(Map<String, Order> orders)");
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_multi_variable_field() {
        let segments = parse(ORDER_SERVICE);
        let limit = by_fqn(&segments, "com.acme.shop.OrderService#LIMIT");
        let offset = by_fqn(&segments, "com.acme.shop.OrderService#OFFSET");

        assert_eq!(limit.content, "private static final int LIMIT = 10, OFFSET = 2;");
        assert_eq!(limit.content, offset.content);
        assert_eq!(limit.start_line, offset.start_line);
        assert_ne!(limit.id, offset.id);
        assert_eq!(
            limit.metadata.details,
            SegmentDetails::Field {
                modifiers: "PRIVATE STATIC FINAL".to_string(),
                field_type: "int".to_string(),
                initializer: Some("10".to_string()),
                arguments: None,
            }
        );
    }

    #[test]
    fn test_enum_constant_and_annotation_member() {
        let segments = parse(ORDER_SERVICE);
        let open = by_fqn(&segments, "com.acme.shop.OrderService.Status#OPEN");
        assert_eq!(
            open.metadata.details,
            SegmentDetails::Field {
                modifiers: "PUBLIC STATIC FINAL".to_string(),
                field_type: "Status".to_string(),
                initializer: None,
                arguments: Some("(\"o\")".to_string()),
            }
        );

        let value = by_fqn(&segments, "com.acme.shop.Audited#value");
        assert_eq!(value.kind, SegmentKind::Method);
        match &value.metadata.details {
            SegmentDetails::Callable {
                modifiers,
                return_type,
                default_value,
                ..
            } => {
                assert_eq!(modifiers, "PUBLIC");
                assert_eq!(return_type.as_deref(), Some("String"));
                assert_eq!(default_value.as_deref(), Some("\"none\""));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_initializer_blocks() {
        let segments = parse(ORDER_SERVICE);
        let block = by_fqn(&segments, "com.acme.shop.OrderService#static_initializer");
        assert_eq!(block.kind, SegmentKind::StaticBlock);
        assert_eq!(block.entity_name, None);
        assert_eq!(block.metadata.details, SegmentDetails::Initializer { is_static: true });
        assert!(block.id.contains(":STATIC_BLOCK:anonymous:"));
    }

    #[test]
    fn test_no_package() {
        let segments = parse("class Plain { void run() {} }");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].fqn(), "Plain");
        assert_eq!(segments[1].fqn(), "Plain#run");
        assert!(segments[0].metadata.imports.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_module_declaration() {
        let source = r"open module com.acme.app {
    requires transitive java.sql;
    requires static lombok;
    exports com.acme.api;
    exports com.acme.internal to com.acme.tests;
    opens com.acme.model;
    uses com.acme.spi.Plugin;
    provides com.acme.spi.Plugin with com.acme.impl.DefaultPlugin;
}
";
        let segments = segment_java(source, "module-info.java", None, LIMITS).unwrap();
        assert_eq!(segments.len(), 1);

        let module = &segments[0];
        assert_eq!(module.kind, SegmentKind::ModuleDeclaration);
        assert_eq!(module.fqn(), "com.acme.app");
        assert!(module.metadata.imports.is_none());

        let SegmentDetails::Module {
            is_open,
            directives,
        } = &module.metadata.details
        else {
            panic!("module details expected");
        };
        assert!(*is_open);
        let names: Vec<_> = directives
            .iter()
            .map(|d| (d.kind, d.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (SegmentKind::ModuleDirectiveRequires, "java.sql"),
                (SegmentKind::ModuleDirectiveRequires, "lombok"),
                (SegmentKind::ModuleDirectiveExports, "com.acme.api"),
                (
                    SegmentKind::ModuleDirectiveExports,
                    "com.acme.internal to com.acme.tests"
                ),
                (SegmentKind::ModuleDirectiveOpens, "com.acme.model"),
                (SegmentKind::ModuleDirectiveUses, "com.acme.spi.Plugin"),
                (
                    SegmentKind::ModuleDirectiveProvides,
                    "com.acme.spi.Plugin with com.acme.impl.DefaultPlugin"
                ),
            ]
        );
        assert_eq!(directives[0].fqn, "com.acme.app#requires:java.sql");
    }

    fn long_method_class(body_chars: usize) -> String {
        let filler = "x".repeat(body_chars);
        format!("class Big {{\n    String text() {{\n        return \"{filler}\";\n    }}\n\n    int size() {{ return 1; }}\n}}\n")
    }

    #[test]
    fn test_oversized_method_is_chunked() {
        let source = long_method_class(2400);
        let segments = segment_java(&source, "Big.java", None, LIMITS).unwrap();

        let chunks: Vec<_> = segments.iter().filter(|s| s.fqn() == "Big#text").collect();
        assert_eq!(chunks.len(), 2);

        let first = chunks[0].chunk.as_ref().unwrap();
        let second = chunks[1].chunk.as_ref().unwrap();
        assert_eq!((first.chunk_number, first.total_chunks), (0, 2));
        assert_eq!((second.chunk_number, second.total_chunks), (1, 2));
        assert_eq!(first.original_segment_id, second.original_segment_id);
        assert!(chunks[0].id.contains(":METHOD:text_chunk0:"));
        assert!(chunks[1].id.contains(":METHOD:text_chunk1:"));

        assert_eq!(chunks[0].start_line, chunks[1].start_line);
        assert_eq!(chunks[0].end_line, chunks[1].end_line);
        assert_eq!(chunks[0].content.chars().count(), 2000);
        assert!(chunks[1].content.ends_with('}'));
    }

    #[test]
    fn test_children_of_chunked_type_point_at_first_chunk() {
        let source = long_method_class(2400);
        let segments = segment_java(&source, "Big.java", None, LIMITS).unwrap();

        let class_chunks: Vec<_> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Class)
            .collect();
        assert_eq!(class_chunks.len(), 2);
        assert!(class_chunks.iter().all(|s| s.is_sub_chunk()));

        let size = by_fqn(&segments, "Big#size");
        assert_eq!(size.parent_id.as_deref(), Some(class_chunks[0].id.as_str()));
    }
}
