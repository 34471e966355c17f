use super::{FileOutline, LanguageType, Symbol, rules::LanguageRules};
use crate::{Error, Result};
use std::ops::{Deref, DerefMut};
use tree_sitter::{Node, Parser};

/// Import statements longer than this are truncated in the outline.
const MAX_IMPORT_CHARS: usize = 200;

/// Nesting levels walked below the top level.
const MAX_DEPTH: usize = 8;

/// A tree-sitter parser bound to one language.
pub struct SourceParser {
    parser: Parser,
    language: LanguageType,
}

impl SourceParser {
    pub fn try_new(language: LanguageType) -> Result<Self> {
        let grammar = match language {
            LanguageType::Rust => tree_sitter_rust::LANGUAGE,
            LanguageType::Python => tree_sitter_python::LANGUAGE,
            LanguageType::TypeScript => tree_sitter_typescript::LANGUAGE_TSX,
            LanguageType::Go => tree_sitter_go::LANGUAGE,
            LanguageType::Cpp => tree_sitter_cpp::LANGUAGE,
            LanguageType::Unknown => {
                return Err(Error::TreeSitter(
                    "no grammar for unknown language".to_string(),
                ));
            }
        };
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.into())
            .map_err(|e| Error::TreeSitter(e.to_string()))?;
        Ok(Self { parser, language })
    }

    /// Parse `source` and fill the outline's symbols and imports.
    pub fn outline(&mut self, source: &str, outline: &mut FileOutline) -> Result<()> {
        let tree = self
            .parse(source, None)
            .ok_or_else(|| Error::TreeSitter("Failed to parse source code".to_string()))?;
        let root = tree.root_node();
        outline.has_syntax_errors = root.has_error();

        let rules = LanguageRules::for_language(self.language);
        collect(root, source, &rules, 0, outline);
        Ok(())
    }
}

fn collect(node: Node, source: &str, rules: &LanguageRules, depth: usize, out: &mut FileOutline) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();

        if rules.is_import(kind) {
            if let Some(text) = get_node_text(child, source) {
                out.imports.push(first_line(&text));
            }
            continue;
        }

        if rules.is_wrapper(kind) {
            collect(child, source, rules, depth, out);
            continue;
        }

        let Some(symbol_kind) = rules.symbol_kind(kind) else {
            continue;
        };
        if let Some(name) = symbol_name(child, source) {
            out.symbols.push(Symbol {
                kind: symbol_kind,
                name,
                line: child.start_position().row + 1,
                depth,
            });
        }

        if rules.is_container(kind) && depth < MAX_DEPTH {
            if let Some(body) = child.child_by_field_name("body") {
                collect(body, source, rules, depth + 1, out);
            }
        }
    }
}

/// Name of a declaration: its `name` field, the innermost declarator for
/// C-like definitions, or the implemented `type` for impl blocks.
fn symbol_name(node: Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return get_node_text(name, source);
    }

    if let Some(mut declarator) = node.child_by_field_name("declarator") {
        while let Some(inner) = declarator.child_by_field_name("declarator") {
            declarator = inner;
        }
        return get_node_text(declarator, source);
    }

    node.child_by_field_name("type")
        .and_then(|ty| get_node_text(ty, source))
}

fn get_node_text(node: Node, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes()).ok().map(String::from)
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() > MAX_IMPORT_CHARS {
        line.chars().take(MAX_IMPORT_CHARS).collect()
    } else {
        line.to_string()
    }
}

impl Deref for SourceParser {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for SourceParser {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SymbolKind;

    fn outline(language: LanguageType, source: &str) -> FileOutline {
        let mut parser = SourceParser::try_new(language).unwrap();
        let mut outline = FileOutline::new(language);
        parser.outline(source, &mut outline).unwrap();
        outline
    }

    fn names(outline: &FileOutline, kind: SymbolKind) -> Vec<&str> {
        outline
            .symbols
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.name.as_str())
            .collect()
    }

    #[test]
    fn test_rust_fixture() {
        let source = include_str!("../../fixtures/outline.rs");
        let outline = outline(LanguageType::Rust, source);

        let functions = names(&outline, SymbolKind::Function);
        assert!(functions.contains(&"total"));
        assert!(functions.contains(&"clamp"));
        assert!(names(&outline, SymbolKind::Struct).contains(&"Ledger"));
        assert!(names(&outline, SymbolKind::Enum).contains(&"Entry"));
        assert!(names(&outline, SymbolKind::Trait).contains(&"Budgeted"));
        assert!(names(&outline, SymbolKind::Constant).contains(&"MAX_PAGE_TOKENS"));
        assert!(names(&outline, SymbolKind::TypeAlias).contains(&"PageId"));

        let modules = names(&outline, SymbolKind::Module);
        assert!(modules.contains(&"export"));
        assert!(modules.contains(&"tests"));

        assert!(
            outline
                .imports
                .iter()
                .any(|i| i.starts_with("use std::collections::HashMap"))
        );

        // Methods of a top-level impl block sit one level down
        assert!(
            outline
                .symbols
                .iter()
                .any(|s| s.name == "new" && s.kind == SymbolKind::Function && s.depth == 1)
        );
        assert!(names(&outline, SymbolKind::Impl).contains(&"Ledger<K>"));
    }

    #[test]
    fn test_python_outline() {
        let source = r#"
import os
from typing import List

class Greeter:
    def greet(self, name):
        return f"hi {name}"

@cached
def helper():
    pass
"#;
        let outline = outline(LanguageType::Python, source);
        assert_eq!(names(&outline, SymbolKind::Class), vec!["Greeter"]);
        assert_eq!(names(&outline, SymbolKind::Function), vec!["greet", "helper"]);
        assert_eq!(outline.imports, vec!["import os", "from typing import List"]);
        let greet = outline.symbols.iter().find(|s| s.name == "greet").unwrap();
        assert_eq!(greet.line, 6);
        assert_eq!(greet.depth, 1);
    }

    #[test]
    fn test_typescript_outline() {
        let source = r#"
import { readFile } from "fs";

export interface Shape { area(): number }

export class Circle {
  constructor(private r: number) {}
  area(): number { return Math.PI * this.r * this.r; }
}

function main() {}
"#;
        let outline = outline(LanguageType::TypeScript, source);
        assert_eq!(names(&outline, SymbolKind::Trait), vec!["Shape"]);
        assert_eq!(names(&outline, SymbolKind::Class), vec!["Circle"]);
        let functions = names(&outline, SymbolKind::Function);
        assert!(functions.contains(&"area"));
        assert!(functions.contains(&"main"));
        assert_eq!(outline.imports.len(), 1);
    }

    #[test]
    fn test_go_outline() {
        let source = r#"package main

import "fmt"

type Person struct { Name string }

func (p *Person) Greet() { fmt.Println(p.Name) }

func main() {}
"#;
        let outline = outline(LanguageType::Go, source);
        assert_eq!(names(&outline, SymbolKind::Struct), vec!["Person"]);
        assert_eq!(names(&outline, SymbolKind::Function), vec!["Greet", "main"]);
        assert_eq!(outline.imports, vec!["import \"fmt\""]);
    }

    #[test]
    fn test_cpp_function_name_from_declarator() {
        let source = "#include <vector>\nint add(int a, int b) { return a + b; }\n";
        let outline = outline(LanguageType::Cpp, source);
        assert_eq!(names(&outline, SymbolKind::Function), vec!["add"]);
        assert_eq!(outline.imports, vec!["#include <vector>"]);
    }

    #[test]
    fn test_unknown_language_has_no_grammar() {
        assert!(matches!(
            SourceParser::try_new(LanguageType::Unknown),
            Err(Error::TreeSitter(_))
        ));
    }
}
