use super::{LanguageType, SymbolKind};

/// Per-language node kinds the outline extractor cares about.
#[derive(Debug, Clone, Copy)]
pub struct LanguageRules {
    /// Node kinds recorded as symbols
    pub symbols: &'static [(&'static str, SymbolKind)],
    /// Symbol kinds whose `body` is walked for nested symbols
    pub containers: &'static [&'static str],
    /// Node kinds that only wrap a declaration (decorators, exports)
    pub wrappers: &'static [&'static str],
    /// Node kinds recorded as imports
    pub imports: &'static [&'static str],
    /// Line prefixes counted as comments
    pub comment_markers: &'static [&'static str],
}

const RUST_RULES: LanguageRules = LanguageRules {
    symbols: &[
        ("function_item", SymbolKind::Function),
        ("function_signature_item", SymbolKind::Function),
        ("struct_item", SymbolKind::Struct),
        ("enum_item", SymbolKind::Enum),
        ("union_item", SymbolKind::Struct),
        ("trait_item", SymbolKind::Trait),
        ("impl_item", SymbolKind::Impl),
        ("mod_item", SymbolKind::Module),
        ("type_item", SymbolKind::TypeAlias),
        ("const_item", SymbolKind::Constant),
        ("static_item", SymbolKind::Constant),
        ("macro_definition", SymbolKind::Macro),
    ],
    containers: &["mod_item", "impl_item", "trait_item"],
    wrappers: &[],
    imports: &["use_declaration", "extern_crate_declaration"],
    comment_markers: &["//", "/*", "*"],
};

const PYTHON_RULES: LanguageRules = LanguageRules {
    symbols: &[
        ("function_definition", SymbolKind::Function),
        ("class_definition", SymbolKind::Class),
    ],
    containers: &["class_definition"],
    wrappers: &["decorated_definition"],
    imports: &["import_statement", "import_from_statement"],
    comment_markers: &["#"],
};

const TS_RULES: LanguageRules = LanguageRules {
    symbols: &[
        ("function_declaration", SymbolKind::Function),
        ("generator_function_declaration", SymbolKind::Function),
        ("method_definition", SymbolKind::Function),
        ("class_declaration", SymbolKind::Class),
        ("abstract_class_declaration", SymbolKind::Class),
        ("interface_declaration", SymbolKind::Trait),
        ("enum_declaration", SymbolKind::Enum),
        ("type_alias_declaration", SymbolKind::TypeAlias),
        ("internal_module", SymbolKind::Module),
    ],
    containers: &["class_declaration", "abstract_class_declaration", "internal_module"],
    wrappers: &["export_statement", "expression_statement"],
    imports: &["import_statement"],
    comment_markers: &["//", "/*", "*"],
};

const GO_RULES: LanguageRules = LanguageRules {
    symbols: &[
        ("function_declaration", SymbolKind::Function),
        ("method_declaration", SymbolKind::Function),
        ("type_spec", SymbolKind::Struct),
        ("type_alias", SymbolKind::TypeAlias),
        ("const_spec", SymbolKind::Constant),
    ],
    containers: &[],
    wrappers: &["type_declaration", "const_declaration"],
    imports: &["import_declaration"],
    comment_markers: &["//", "/*", "*"],
};

const CPP_RULES: LanguageRules = LanguageRules {
    symbols: &[
        ("function_definition", SymbolKind::Function),
        ("class_specifier", SymbolKind::Class),
        ("struct_specifier", SymbolKind::Struct),
        ("enum_specifier", SymbolKind::Enum),
        ("namespace_definition", SymbolKind::Module),
        ("type_definition", SymbolKind::TypeAlias),
    ],
    containers: &["class_specifier", "struct_specifier", "namespace_definition"],
    wrappers: &["template_declaration", "declaration", "linkage_specification"],
    imports: &["preproc_include"],
    comment_markers: &["//", "/*", "*"],
};

const UNKNOWN_RULES: LanguageRules = LanguageRules {
    symbols: &[],
    containers: &[],
    wrappers: &[],
    imports: &[],
    comment_markers: &["//", "#"],
};

impl LanguageRules {
    #[inline(always)]
    pub fn for_language(lang: LanguageType) -> Self {
        match lang {
            LanguageType::Rust => RUST_RULES,
            LanguageType::Python => PYTHON_RULES,
            LanguageType::TypeScript => TS_RULES,
            LanguageType::Go => GO_RULES,
            LanguageType::Cpp => CPP_RULES,
            LanguageType::Unknown => UNKNOWN_RULES,
        }
    }

    pub fn symbol_kind(&self, node_kind: &str) -> Option<SymbolKind> {
        self.symbols
            .iter()
            .find(|(kind, _)| *kind == node_kind)
            .map(|(_, symbol)| *symbol)
    }

    pub fn is_container(&self, node_kind: &str) -> bool {
        self.containers.contains(&node_kind)
    }

    pub fn is_wrapper(&self, node_kind: &str) -> bool {
        self.wrappers.contains(&node_kind)
    }

    pub fn is_import(&self, node_kind: &str) -> bool {
        self.imports.contains(&node_kind)
    }

    pub fn is_comment_line(&self, line: &str) -> bool {
        let line = line.trim_start();
        self.comment_markers
            .iter()
            .any(|marker| line.starts_with(marker))
    }
}
