//! Structural summaries from syntax trees.
//!
//! One query per language captures imports, function names with their
//! parameter lists, and class/type names with their base clauses. Field
//! captures are correlated with their name capture through the declaration
//! node both hang off (the capture's parent), keyed by its start byte.
//! Failures never reach the caller: they are logged and yield an empty
//! structure.

use crate::chunk::Language;
use crate::types::FileStructure;
use codepilot_core::{AppError, AppResult};
use std::collections::BTreeMap;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Parser, Query, QueryCursor};

const PYTHON_QUERY: &str = r#"
(import_statement name: (dotted_name) @import)
(import_statement name: (aliased_import name: (dotted_name) @import))
(import_from_statement module_name: (dotted_name) @import)
(function_definition name: (identifier) @function.name)
(function_definition parameters: (parameters) @function.params)
(class_definition name: (identifier) @class.name)
(class_definition superclasses: (argument_list) @class.bases)
"#;

const JAVASCRIPT_QUERY: &str = r#"
(import_statement source: (string) @import)
(call_expression
  function: (identifier) @_require
  arguments: (arguments (string) @import)
  (#eq? @_require "require"))
(function_declaration name: (identifier) @function.name)
(function_declaration parameters: (formal_parameters) @function.params)
(method_definition name: (property_identifier) @function.name)
(method_definition parameters: (formal_parameters) @function.params)
(class_declaration name: (identifier) @class.name)
(class_declaration (class_heritage) @class.bases)
"#;

const TYPESCRIPT_QUERY: &str = r#"
(import_statement source: (string) @import)
(function_declaration name: (identifier) @function.name)
(function_declaration parameters: (formal_parameters) @function.params)
(method_definition name: (property_identifier) @function.name)
(method_definition parameters: (formal_parameters) @function.params)
(class_declaration name: (type_identifier) @class.name)
(class_declaration (class_heritage) @class.bases)
(interface_declaration name: (type_identifier) @class.name)
"#;

const GO_QUERY: &str = r#"
(import_spec path: (interpreted_string_literal) @import)
(function_declaration name: (identifier) @function.name)
(function_declaration parameters: (parameter_list) @function.params)
(method_declaration name: (field_identifier) @function.name)
(method_declaration parameters: (parameter_list) @function.params)
(type_spec name: (type_identifier) @class.name)
"#;

const JAVA_QUERY: &str = r#"
(import_declaration (scoped_identifier) @import)
(method_declaration name: (identifier) @function.name)
(method_declaration parameters: (formal_parameters) @function.params)
(class_declaration name: (identifier) @class.name)
(class_declaration superclass: (superclass) @class.bases)
(interface_declaration name: (identifier) @class.name)
"#;

const CPP_QUERY: &str = r#"
(preproc_include path: (_) @import)
(function_definition
  declarator: (function_declarator
    declarator: (_) @function.name
    parameters: (parameter_list) @function.params))
(class_specifier name: (type_identifier) @class.name)
(class_specifier (base_class_clause) @class.bases)
(struct_specifier name: (type_identifier) @class.name)
"#;

const RUST_QUERY: &str = r#"
(use_declaration argument: (_) @import)
(function_item name: (identifier) @function.name)
(function_item parameters: (parameters) @function.params)
(struct_item name: (type_identifier) @class.name)
(enum_item name: (type_identifier) @class.name)
(trait_item name: (type_identifier) @class.name)
(trait_item bounds: (trait_bounds) @class.bases)
"#;

fn query_source(language: Language) -> &'static str {
    match language {
        Language::Python => PYTHON_QUERY,
        Language::JavaScript => JAVASCRIPT_QUERY,
        Language::TypeScript | Language::Tsx => TYPESCRIPT_QUERY,
        Language::Go => GO_QUERY,
        Language::Java => JAVA_QUERY,
        Language::Cpp => CPP_QUERY,
        Language::Rust => RUST_QUERY,
    }
}

/// Name plus the optional detail (parameters or bases) of one declaration.
#[derive(Debug, Default)]
struct Declaration {
    name: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StructureExtractor;

impl StructureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract imports, functions and classes. Unsupported languages and
    /// failures give an empty structure.
    pub fn extract(&self, text: &str, language: Option<Language>) -> FileStructure {
        let Some(language) = language else {
            return FileStructure::default();
        };
        match extract_with_grammar(text, language) {
            Ok(structure) => structure,
            Err(e) => {
                tracing::warn!("Structure extraction failed for {}: {}", language.name(), e);
                FileStructure::default()
            }
        }
    }
}

fn extract_with_grammar(text: &str, language: Language) -> AppResult<FileStructure> {
    let grammar = language.grammar();
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| AppError::Knowledge(format!("Failed to set parser language: {}", e)))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| AppError::Knowledge("Failed to parse code".into()))?;
    let query = Query::new(&grammar, query_source(language))
        .map_err(|e| AppError::Knowledge(format!("Invalid structure query: {}", e)))?;
    let capture_names = query.capture_names();

    let mut structure = FileStructure::default();
    let mut functions: BTreeMap<usize, Declaration> = BTreeMap::new();
    let mut classes: BTreeMap<usize, Declaration> = BTreeMap::new();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), text.as_bytes());
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let Some(capture_name) = capture_names.get(capture.index as usize) else {
                continue;
            };
            let Ok(node_text) = capture.node.utf8_text(text.as_bytes()) else {
                continue;
            };
            let anchor = capture
                .node
                .parent()
                .map(|parent| parent.start_byte())
                .unwrap_or_else(|| capture.node.start_byte());

            match *capture_name {
                "import" => {
                    let import = clean_import(node_text);
                    if !import.is_empty() {
                        structure.imports.insert(import);
                    }
                }
                "function.name" => {
                    functions.entry(anchor).or_default().name = Some(node_text.to_string());
                }
                "function.params" => {
                    functions.entry(anchor).or_default().detail = Some(collapse(node_text));
                }
                "class.name" => {
                    classes.entry(anchor).or_default().name = Some(node_text.to_string());
                }
                "class.bases" => {
                    classes.entry(anchor).or_default().detail = Some(clean_bases(node_text));
                }
                _ => {}
            }
        }
    }

    structure.functions = functions
        .into_values()
        .filter_map(|decl| {
            let name = decl.name?;
            Some(format!("{}{}", name, decl.detail.unwrap_or_else(|| "()".into())))
        })
        .collect();
    for decl in classes.into_values() {
        if let Some(name) = decl.name {
            structure.classes.insert(name, decl.detail.unwrap_or_default());
        }
    }

    tracing::debug!(
        "Extracted {} imports, {} functions, {} classes ({})",
        structure.imports.len(),
        structure.functions.len(),
        structure.classes.len(),
        language.name()
    );
    Ok(structure)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_import(text: &str) -> String {
    text.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '<' | '>'))
        .to_string()
}

/// Normalize an inheritance clause to the parenthesized form: `(A, B)`,
/// `extends A` and `: Clone + Send` become `(A, B)`, `(A)` and
/// `(Clone + Send)`. No bases gives an empty string.
fn clean_bases(text: &str) -> String {
    let mut clause = text.trim();
    clause = clause.strip_prefix(':').unwrap_or(clause).trim_start();
    clause = clause.strip_prefix("extends").unwrap_or(clause).trim_start();
    if clause.starts_with('(') && clause.ends_with(')') && clause.len() >= 2 {
        clause = &clause[1..clause.len() - 1];
    }
    let bases = collapse(clause);
    if bases.is_empty() {
        bases
    } else {
        format!("({})", bases)
    }
}
