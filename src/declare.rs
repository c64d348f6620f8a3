//! Generates the flag declaration manifest from Java sources.
//!
//! Finds `@FeatureFlag(name = "...", enabledByDefault = ..., inverse = ...)` on
//! types (nested types included) and on `package-info.java` package
//! declarations, and renders one declaration line per annotation.
//!
//! Every annotation must be fully resolvable from the source text: a `name` that
//! is not a string literal, or a default that is not `true`/`false`, fails the
//! scan instead of producing an incomplete manifest.

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tree_sitter::{Node, Parser};

use crate::error::{Error, Result};
use crate::flags::FlagDeclaration;

pub const FEATURE_FLAG_ANNOTATION: &str = "FeatureFlag";

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

pub fn java_sources(root: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            let found = match entry {
                Ok(entry) if entry.path().extension().is_some_and(|e| e == "java") => {
                    Ok(entry.into_path())
                }
                Ok(_) => return ignore::WalkState::Continue,
                Err(e) => Err(e),
            };
            if tx.send(found).is_err() {
                return ignore::WalkState::Quit;
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files = Vec::new();
    for found in rx {
        let path = found.map_err(|e| Error::io(root, std::io::Error::other(e.to_string())))?;
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Every declaration under `root`, sorted and de-duplicated.
pub fn scan_sources(root: &Path) -> Result<Vec<FlagDeclaration>> {
    if !root.is_dir() {
        return Err(Error::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
        ));
    }

    let files = java_sources(root)?;
    tracing::debug!(root = %root.display(), files = files.len(), "scanning java sources");

    let per_file: Vec<Result<Vec<FlagDeclaration>>> = files
        .par_iter()
        .map(|path| {
            let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            declarations_in_source(&source, &path.display().to_string())
        })
        .collect();

    let mut declarations = Vec::new();
    for found in per_file {
        declarations.extend(found?);
    }
    declarations.sort();
    declarations.dedup();
    Ok(declarations)
}

pub fn render_manifest(declarations: &[FlagDeclaration]) -> String {
    let mut out = String::new();
    for declaration in declarations {
        out.push_str(&declaration.to_string());
        out.push('\n');
    }
    out
}

/// Declarations in one compilation unit. `origin` names the source in errors.
pub fn declarations_in_source(source: &str, origin: &str) -> Result<Vec<FlagDeclaration>> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| Error::parse(origin, 1, format!("java grammar unavailable: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| Error::parse(origin, 1, "java source could not be parsed"))?;
    let root = tree.root_node();
    let unit = Unit {
        source: source.as_bytes(),
        origin,
    };

    let mut package = String::new();
    let mut package_annotations = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "package_declaration" {
            let mut inner = child.walk();
            for part in child.children(&mut inner) {
                match part.kind() {
                    "scoped_identifier" | "identifier" => {
                        package = unit.text(&part).to_string();
                    }
                    "annotation" | "marker_annotation" => package_annotations.push(part),
                    _ => {}
                }
            }
        }
    }

    let mut declarations = Vec::new();
    for annotation in package_annotations {
        if let Some(declaration) = unit.flag_from_annotation(&annotation, &package)? {
            declarations.push(declaration);
        }
    }
    unit.collect_types(&root, &package, &mut declarations)?;
    Ok(declarations)
}

struct Unit<'s> {
    source: &'s [u8],
    origin: &'s str,
}

impl<'s> Unit<'s> {
    fn text(&self, node: &Node) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn error(&self, node: &Node, reason: String) -> Error {
        Error::parse(self.origin, node.start_position().row + 1, reason)
    }

    fn collect_types(&self, node: &Node, prefix: &str, out: &mut Vec<FlagDeclaration>) -> Result<()> {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "enum_body_declarations" {
                self.collect_types(&child, prefix, out)?;
                continue;
            }
            if !TYPE_DECLARATIONS.contains(&child.kind()) {
                continue;
            }
            let Some(name) = child.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(&name);
            let qualified = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}.{name}")
            };

            if let Some(modifiers) = find_child(&child, "modifiers") {
                let mut inner = modifiers.walk();
                for annotation in modifiers.children(&mut inner) {
                    if let Some(declaration) = self.flag_from_annotation(&annotation, &qualified)? {
                        out.push(declaration);
                    }
                }
            }

            if let Some(body) = child.child_by_field_name("body") {
                self.collect_types(&body, &qualified, out)?;
            }
        }
        Ok(())
    }

    /// `None` for annotations other than the feature flag one.
    fn flag_from_annotation(&self, annotation: &Node, target: &str) -> Result<Option<FlagDeclaration>> {
        if annotation.kind() != "annotation" && annotation.kind() != "marker_annotation" {
            return Ok(None);
        }
        let Some(name) = annotation.child_by_field_name("name") else {
            return Ok(None);
        };
        let name = self.text(&name);
        if name != FEATURE_FLAG_ANNOTATION && !name.ends_with(&format!(".{FEATURE_FLAG_ANNOTATION}")) {
            return Ok(None);
        }
        if target.is_empty() {
            return Err(self.error(annotation, "feature flag on a declaration without a name".to_string()));
        }

        let mut flag: Option<String> = None;
        let mut enabled_by_default = false;
        let mut inverse = false;

        if let Some(arguments) = annotation.child_by_field_name("arguments") {
            let mut cursor = arguments.walk();
            for argument in arguments.named_children(&mut cursor) {
                match argument.kind() {
                    "element_value_pair" => {}
                    "line_comment" | "block_comment" => continue,
                    _ => {
                        return Err(self.error(
                            &argument,
                            format!("feature flag on {target}: expected name = \"...\", found {}", self.text(&argument)),
                        ));
                    }
                }
                let (Some(key), Some(value)) = (
                    argument.child_by_field_name("key"),
                    argument.child_by_field_name("value"),
                ) else {
                    continue;
                };
                match self.text(&key) {
                    "name" => flag = Some(self.string_literal(&value, target)?),
                    "enabledByDefault" => enabled_by_default = self.boolean_literal(&value, target)?,
                    "inverse" => inverse = self.boolean_literal(&value, target)?,
                    _ => {}
                }
            }
        }

        let Some(flag) = flag.filter(|f| !f.is_empty()) else {
            return Err(self.error(annotation, format!("feature flag on {target} has no name")));
        };
        Ok(Some(FlagDeclaration {
            target: target.to_string(),
            flag,
            enabled_by_default,
            inverse,
        }))
    }

    fn string_literal(&self, value: &Node, target: &str) -> Result<String> {
        if value.kind() != "string_literal" {
            return Err(self.error(
                value,
                format!("feature flag name on {target} must be a string literal, found {}", self.text(value)),
            ));
        }
        Ok(self.text(value).trim_matches('"').to_string())
    }

    fn boolean_literal(&self, value: &Node, target: &str) -> Result<bool> {
        match self.text(value) {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.error(
                value,
                format!("feature flag default on {target} must be true or false, found {other}"),
            )),
        }
    }
}

fn find_child<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}
