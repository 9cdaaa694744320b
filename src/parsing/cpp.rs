//! Tree-sitter based C++ symbol extraction.
//!
//! One walk over a parsed file produces symbols, raw call records and type
//! aliases. Qualified names come from the lexical scope stack; anonymous
//! namespaces are rendered as the literal `(anonymous namespace)` token.
//! Calls spelled with explicit template arguments (`foo<int>(...)`) record
//! the generic template name so all instantiations attach to the single
//! indexed template.

use crate::cache::TypeAliasRecord;
use crate::parsing::{
    MAX_AST_DEPTH, MAX_BRIEF_LEN, MAX_DOC_LEN, collapse_whitespace, truncate_with_ellipsis,
};
use crate::symbol::{Symbol, usr};
use crate::types::{
    Access, AliasKind, SymbolKind, TemplateKind, TemplateParam, TemplateParamKind,
};
use std::collections::HashMap;
use tree_sitter::{Node, Parser, Tree};

/// A call observed inside a function body, before USR resolution. The
/// callee is a name path (possibly `::`-qualified); template arguments are
/// already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCall {
    pub caller_usr: String,
    pub callee_name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Everything extracted from one file.
#[derive(Debug, Default)]
pub struct ExtractionOutput {
    pub symbols: Vec<Symbol>,
    pub calls: Vec<RawCall>,
    pub aliases: Vec<TypeAliasRecord>,
}

/// Result of handing a file to the parser.
pub enum ParseOutcome {
    /// Clean tree.
    Full(Tree),
    /// Tree obtained but with syntax errors; usable for extraction.
    Partial(Tree, usize),
    /// No usable tree.
    Failed(String),
}

/// Thin wrapper owning the tree-sitter parser state. One per worker.
pub struct CppParser {
    parser: Parser,
}

impl CppParser {
    pub fn new() -> Result<Self, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_cpp::LANGUAGE.into())
            .map_err(|e| format!("Failed to load C++ grammar: {e}"))?;
        Ok(Self { parser })
    }

    pub fn parse(&mut self, code: &str) -> ParseOutcome {
        let Some(tree) = self.parser.parse(code, None) else {
            return ParseOutcome::Failed("parser produced no tree".to_string());
        };
        let root = tree.root_node();
        if root.kind() == "ERROR" || (root.named_child_count() == 0 && !code.trim().is_empty()) {
            return ParseOutcome::Failed("no declarations recognized".to_string());
        }
        if root.has_error() {
            let errors = count_errors(root);
            return ParseOutcome::Partial(tree, errors);
        }
        ParseOutcome::Full(tree)
    }
}

fn count_errors(root: Node) -> usize {
    let mut count = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            count += 1;
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    count
}

/// Extract symbols, calls and aliases from a parsed file.
pub fn extract(tree: &Tree, code: &str, file: &str, is_project: bool) -> ExtractionOutput {
    let mut walker = Walker {
        code,
        file,
        is_project,
        scopes: Vec::new(),
        local_aliases: HashMap::new(),
        out: ExtractionOutput::default(),
    };
    walker.walk(tree.root_node(), &Ctx::default(), 0);
    walker.resolve_alias_canonicals();
    walker.out
}

#[derive(Debug)]
struct Scope {
    name: String,
}

#[derive(Debug, Clone, Default)]
struct TemplateCtx {
    params: Vec<TemplateParam>,
    /// `template<>`, an explicit full specialization.
    explicit_specialization: bool,
}

/// Walk context threaded through recursion.
#[derive(Debug, Clone, Default)]
struct Ctx {
    /// Current member access; `None` outside class bodies.
    access: Option<Access>,
    /// Simple name of the enclosing class, for methods.
    parent_class: String,
    /// USR of the enclosing function, for call tracking.
    function_usr: String,
    /// Pending `template<...>` wrapper for the next declaration.
    template: Option<TemplateCtx>,
}

struct Walker<'a> {
    code: &'a str,
    file: &'a str,
    is_project: bool,
    scopes: Vec<Scope>,
    /// Alias target spellings seen in this file, for transitive
    /// canonicalization of typedef chains.
    local_aliases: HashMap<String, String>,
    out: ExtractionOutput,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.code[node.byte_range()]
    }

    fn scope_prefix(&self) -> String {
        if self.scopes.is_empty() {
            String::new()
        } else {
            let joined: Vec<&str> = self.scopes.iter().map(|s| s.name.as_str()).collect();
            format!("{}::", joined.join("::"))
        }
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}{}", self.scope_prefix(), name)
    }

    fn walk(&mut self, node: Node, ctx: &Ctx, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::debug!(
                "Maximum AST depth exceeded at {}:{}; skipping subtree",
                self.file,
                node.start_position().row + 1
            );
            return;
        }

        match node.kind() {
            "namespace_definition" => {
                self.handle_namespace(node, depth);
                return;
            }
            "class_specifier" | "struct_specifier" => {
                self.handle_class(node, ctx, depth);
                return;
            }
            "template_declaration" => {
                self.handle_template(node, ctx, depth);
                return;
            }
            "function_definition" => {
                self.handle_function(node, ctx, true, depth);
                return;
            }
            "declaration" => {
                if self.handle_declaration(node, ctx, depth) {
                    return;
                }
            }
            "field_declaration" => {
                if find_function_declarator(node).is_some() {
                    self.handle_function(node, ctx, false, depth);
                    return;
                }
                // Nested type definitions declared through a member.
                if let Some(type_node) = node.child_by_field_name("type")
                    && matches!(type_node.kind(), "class_specifier" | "struct_specifier")
                {
                    self.walk(type_node, ctx, depth + 1);
                }
                return;
            }
            // Friend declarations name symbols that belong elsewhere.
            "friend_declaration" => return,
            "alias_declaration" => {
                self.handle_alias(node, ctx);
                return;
            }
            "type_definition" => {
                self.handle_typedef(node, ctx);
                return;
            }
            "call_expression" => {
                if !ctx.function_usr.is_empty() {
                    self.record_call(node, ctx);
                }
                // Fall through: arguments may contain nested calls.
            }
            "comment" => return,
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, ctx, depth + 1);
        }
    }

    fn handle_namespace(&mut self, node: Node, depth: usize) {
        let pushed = match node.child_by_field_name("name") {
            Some(name) => {
                // `namespace a::b` pushes one scope per segment.
                let mut count = 0;
                for segment in self.text(name).split("::") {
                    let segment = segment.trim();
                    if !segment.is_empty() {
                        self.scopes.push(Scope {
                            name: segment.to_string(),
                        });
                        count += 1;
                    }
                }
                count
            }
            None => {
                self.scopes.push(Scope {
                    name: "(anonymous namespace)".to_string(),
                });
                1
            }
        };

        if let Some(body) = node.child_by_field_name("body") {
            // Namespace bodies reset member context.
            self.walk(body, &Ctx::default(), depth + 1);
        }
        for _ in 0..pushed {
            self.scopes.pop();
        }
    }

    fn handle_template(&mut self, node: Node, ctx: &Ctx, depth: usize) {
        let mut template = TemplateCtx::default();
        if let Some(params) = node.child_by_field_name("parameters") {
            template.params = self.parse_template_params(params);
            template.explicit_specialization = template.params.is_empty();
        }

        let inner_ctx = Ctx {
            template: Some(template),
            ..ctx.clone()
        };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "template_parameter_list" || !child.is_named() {
                continue;
            }
            self.walk(child, &inner_ctx, depth + 1);
        }
    }

    fn parse_template_params(&self, list: Node) -> Vec<TemplateParam> {
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            match child.kind() {
                "type_parameter_declaration"
                | "optional_type_parameter_declaration"
                | "variadic_type_parameter_declaration" => {
                    let name = child
                        .named_children(&mut child.walk())
                        .find(|n| n.kind() == "type_identifier")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    params.push(TemplateParam {
                        name,
                        kind: TemplateParamKind::Type,
                        r#type: None,
                    });
                }
                "parameter_declaration" | "optional_parameter_declaration" => {
                    let ty = child
                        .child_by_field_name("type")
                        .map(|n| collapse_whitespace(self.text(n)));
                    let name = child
                        .child_by_field_name("declarator")
                        .map(|n| collapse_whitespace(self.text(n)))
                        .unwrap_or_default();
                    params.push(TemplateParam {
                        name,
                        kind: TemplateParamKind::NonType,
                        r#type: ty,
                    });
                }
                "template_template_parameter_declaration" => {
                    let name = child
                        .named_children(&mut child.walk())
                        .filter(|n| n.kind() == "type_parameter_declaration")
                        .filter_map(|n| {
                            n.named_children(&mut n.walk())
                                .find(|m| m.kind() == "type_identifier")
                                .map(|m| self.text(m).to_string())
                        })
                        .last()
                        .unwrap_or_default();
                    params.push(TemplateParam {
                        name,
                        kind: TemplateParamKind::Template,
                        r#type: None,
                    });
                }
                _ => {}
            }
        }
        params
    }

    fn handle_class(&mut self, node: Node, ctx: &Ctx, depth: usize) {
        let name_node = node.child_by_field_name("name");
        let body = node.child_by_field_name("body");

        let Some(name_node) = name_node else {
            // Anonymous struct: nothing to index, but members may nest.
            if let Some(body) = body {
                self.walk_class_body(body, node.kind() == "struct_specifier", "", ctx, depth);
            }
            return;
        };

        let (simple_name, spec_args) = match name_node.kind() {
            "template_type" => {
                let base = name_node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_else(|| self.text(name_node).to_string());
                let args = name_node
                    .child_by_field_name("arguments")
                    .map(|n| collapse_whitespace(self.text(n)));
                (base, args)
            }
            _ => (self.text(name_node).to_string(), None),
        };
        if simple_name.is_empty() {
            return;
        }

        let qualified = self.qualify(&simple_name);
        let is_struct = node.kind() == "struct_specifier";

        let (kind, template_kind, is_template, primary_usr, symbol_usr) = match &ctx.template {
            Some(t) if t.explicit_specialization => {
                let base_kind = if is_struct {
                    SymbolKind::Struct
                } else {
                    SymbolKind::Class
                };
                (
                    base_kind,
                    Some(TemplateKind::FullSpecialization),
                    true,
                    Some(usr::build(SymbolKind::ClassTemplate, &qualified, None)),
                    usr::build(base_kind, &qualified, spec_args.as_deref()),
                )
            }
            Some(_) if spec_args.is_some() => (
                SymbolKind::PartialSpecialization,
                Some(TemplateKind::PartialSpecialization),
                true,
                Some(usr::build(SymbolKind::ClassTemplate, &qualified, None)),
                usr::build(
                    SymbolKind::PartialSpecialization,
                    &qualified,
                    spec_args.as_deref(),
                ),
            ),
            Some(_) => (
                SymbolKind::ClassTemplate,
                Some(TemplateKind::ClassTemplate),
                true,
                None,
                usr::build(SymbolKind::ClassTemplate, &qualified, None),
            ),
            None => {
                let base_kind = if is_struct {
                    SymbolKind::Struct
                } else {
                    SymbolKind::Class
                };
                (
                    base_kind,
                    None,
                    false,
                    None,
                    usr::build(base_kind, &qualified, spec_args.as_deref()),
                )
            }
        };

        let mut symbol = Symbol::new(
            simple_name.clone(),
            kind,
            symbol_usr,
            self.file,
            name_node.start_position().row as u32 + 1,
            name_node.start_position().column as u32 + 1,
        );
        symbol.qualified_name = qualified;
        symbol.namespace = self.scope_prefix().trim_end_matches("::").to_string();
        symbol.start_line = node.start_position().row as u32 + 1;
        symbol.end_line = node.end_position().row as u32 + 1;
        symbol.is_definition = body.is_some();
        symbol.is_project = self.is_project;
        symbol.is_template = is_template;
        symbol.template_kind = template_kind;
        symbol.primary_template_usr = primary_usr;
        if let Some(t) = &ctx.template {
            symbol.template_parameters = t.params.clone();
        }
        symbol.base_classes = self.base_classes(node, ctx);
        if let Some(body) = body {
            symbol.members = self.data_members(body);
        }
        self.attach_docs(&mut symbol, node);
        self.out.symbols.push(symbol);

        if let Some(body) = body {
            self.scopes.push(Scope { name: simple_name.clone() });
            self.walk_class_body(body, is_struct, &simple_name, ctx, depth);
            self.scopes.pop();
        }
    }

    fn walk_class_body(
        &mut self,
        body: Node,
        is_struct: bool,
        class_name: &str,
        _outer: &Ctx,
        depth: usize,
    ) {
        let mut access = if is_struct {
            Access::Public
        } else {
            Access::Private
        };
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                "access_specifier" => {
                    let text = self.text(child);
                    access = if text.starts_with("public") {
                        Access::Public
                    } else if text.starts_with("protected") {
                        Access::Protected
                    } else {
                        Access::Private
                    };
                }
                _ => {
                    let ctx = Ctx {
                        access: Some(access),
                        parent_class: class_name.to_string(),
                        function_usr: String::new(),
                        template: None,
                    };
                    self.walk(child, &ctx, depth + 1);
                }
            }
        }
    }

    /// Returns true when the declaration was fully handled.
    fn handle_declaration(&mut self, node: Node, ctx: &Ctx, depth: usize) -> bool {
        // Forward declaration: `class Q;`
        if let Some(type_node) = node.child_by_field_name("type")
            && matches!(type_node.kind(), "class_specifier" | "struct_specifier")
        {
            // Only a pure forward declaration indexes the class node; a
            // variable of anonymous-struct type still walks through.
            self.walk(type_node, ctx, depth + 1);
            return true;
        }
        // Function declaration: has a function_declarator somewhere in the
        // declarator chain.
        if find_function_declarator(node).is_some() {
            self.handle_function(node, ctx, false, depth);
            return true;
        }
        false
    }

    fn handle_function(&mut self, node: Node, ctx: &Ctx, is_definition: bool, depth: usize) {
        let Some(fn_decl) = find_function_declarator(node) else {
            return;
        };
        let Some(name_node) = fn_decl.child_by_field_name("declarator") else {
            return;
        };

        // Resolve the declarator into (scope path, simple name, spec args).
        let (decl_path, simple_name, spec_args) = self.declarator_parts(name_node);
        if simple_name.is_empty() {
            return;
        }

        let qualified = if decl_path.is_empty() {
            self.qualify(&simple_name)
        } else {
            self.qualify(&format!("{decl_path}::{simple_name}"))
        };

        // Out-of-line definitions carry their class in the declarator.
        let parent_class = if !ctx.parent_class.is_empty() {
            ctx.parent_class.clone()
        } else if let Some(last) = decl_path.rsplit("::").next() {
            last.to_string()
        } else {
            String::new()
        };
        let is_method = !parent_class.is_empty();

        let signature = self.build_signature(node, fn_decl);
        let is_const = declarator_has_const(fn_decl, self.code);
        let usr_detail = format!(
            "{}{}",
            usr::normalize_signature(&parameter_list_text(fn_decl, self.code)),
            if is_const { "#const" } else { "" }
        );

        let (kind, template_kind, is_template, is_spec, primary_usr, symbol_usr) =
            match &ctx.template {
                Some(t) if t.explicit_specialization || spec_args.is_some() => {
                    let base_kind = if is_method {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    (
                        base_kind,
                        Some(TemplateKind::FullSpecialization),
                        true,
                        true,
                        Some(usr::build(SymbolKind::FunctionTemplate, &qualified, None)),
                        usr::build(
                            base_kind,
                            &qualified,
                            Some(&format!(
                                "{}{}",
                                spec_args.clone().unwrap_or_default(),
                                usr_detail
                            )),
                        ),
                    )
                }
                Some(_) => (
                    SymbolKind::FunctionTemplate,
                    Some(TemplateKind::FunctionTemplate),
                    true,
                    false,
                    None,
                    usr::build(SymbolKind::FunctionTemplate, &qualified, None),
                ),
                None => {
                    let base_kind = if is_method {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    (
                        base_kind,
                        None,
                        false,
                        false,
                        None,
                        usr::build(base_kind, &qualified, Some(&usr_detail)),
                    )
                }
            };

        let mut symbol = Symbol::new(
            simple_name,
            kind,
            symbol_usr.clone(),
            self.file,
            name_node.start_position().row as u32 + 1,
            name_node.start_position().column as u32 + 1,
        );
        symbol.qualified_name = qualified;
        symbol.namespace = symbol
            .qualified_name
            .rsplit_once("::")
            .map(|(ns, _)| ns.to_string())
            .unwrap_or_default();
        symbol.start_line = node.start_position().row as u32 + 1;
        symbol.end_line = node.end_position().row as u32 + 1;
        symbol.is_definition = is_definition;
        symbol.is_project = self.is_project;
        symbol.signature = Some(signature);
        symbol.parent_class = parent_class;
        symbol.access = ctx.access.unwrap_or_default();
        symbol.is_const = is_const;
        symbol.is_virtual = has_keyword(node, self.code, "virtual");
        symbol.is_pure_virtual = is_pure_virtual(node, self.code);
        symbol.is_static = has_storage_class(node, self.code, "static");
        symbol.is_template = is_template;
        symbol.template_kind = template_kind;
        symbol.is_template_specialization = is_spec;
        symbol.primary_template_usr = primary_usr;
        if let Some(t) = &ctx.template {
            symbol.template_parameters = t.params.clone();
        }
        self.attach_docs(&mut symbol, node);
        self.out.symbols.push(symbol);

        if is_definition {
            let body_ctx = Ctx {
                function_usr: symbol_usr,
                access: ctx.access,
                parent_class: ctx.parent_class.clone(),
                template: None,
            };
            // Constructor initializer lists contain calls too.
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if matches!(child.kind(), "compound_statement" | "field_initializer_list")
                    || child.kind() == "try_statement"
                {
                    self.walk(child, &body_ctx, depth + 1);
                }
            }
        }
    }

    /// Split a function declarator name into scope path, simple name and
    /// explicit template arguments (`f<int>`).
    fn declarator_parts(&self, name_node: Node) -> (String, String, Option<String>) {
        match name_node.kind() {
            "qualified_identifier" => {
                let text = collapse_whitespace(self.text(name_node));
                let (path, last) = text.rsplit_once("::").unwrap_or(("", text.as_str()));
                let (name, args) = split_template_suffix(last);
                (path.to_string(), name, args)
            }
            "template_function" => {
                let name = name_node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                let args = name_node
                    .child_by_field_name("arguments")
                    .map(|n| collapse_whitespace(self.text(n)));
                (String::new(), name, args)
            }
            _ => {
                let (name, args) = split_template_suffix(&collapse_whitespace(self.text(name_node)));
                (String::new(), name, args)
            }
        }
    }

    fn build_signature(&self, decl_root: Node, fn_decl: Node) -> String {
        let mut ret = decl_root
            .child_by_field_name("type")
            .map(|n| collapse_whitespace(self.text(n)))
            .unwrap_or_default();
        // Pointer/reference declarators between the type and the function
        // declarator belong to the return type.
        let mut walk = decl_root.child_by_field_name("declarator");
        while let Some(node) = walk {
            match node.kind() {
                "pointer_declarator" => {
                    ret.push('*');
                    walk = node.child_by_field_name("declarator");
                }
                "reference_declarator" => {
                    ret.push('&');
                    walk = node
                        .named_children(&mut node.walk())
                        .find(|n| n.kind() != "comment");
                }
                _ => break,
            }
        }
        let params = parameter_list_text(fn_decl, self.code);
        if ret.is_empty() {
            params
        } else {
            format!("{ret} {params}")
        }
    }

    fn base_classes(&self, class_node: Node, ctx: &Ctx) -> Vec<String> {
        let mut bases = Vec::new();
        let mut cursor = class_node.walk();
        for child in class_node.children(&mut cursor) {
            if child.kind() != "base_class_clause" {
                continue;
            }
            let mut inner = child.walk();
            for base in child.named_children(&mut inner) {
                if matches!(base.kind(), "access_specifier" | "comment") {
                    continue;
                }
                let mut spelling = collapse_whitespace(self.text(base));
                if let Some(stripped) = spelling.strip_prefix("class ") {
                    spelling = stripped.to_string();
                } else if let Some(stripped) = spelling.strip_prefix("struct ") {
                    spelling = stripped.to_string();
                }
                if spelling.is_empty() {
                    continue;
                }
                // A class template inheriting one of its own parameters is
                // recorded in canonical `type-parameter-0-I` form; the
                // derived-class query keys on it.
                if let Some(t) = &ctx.template
                    && let Some(index) = t.params.iter().position(|p| p.name == spelling)
                {
                    spelling = format!("type-parameter-0-{index}");
                }
                bases.push(spelling);
            }
        }
        bases
    }

    fn data_members(&self, body: Node) -> Vec<String> {
        let mut members = Vec::new();
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() != "field_declaration" {
                continue;
            }
            if find_function_declarator(child).is_some() {
                continue;
            }
            let Some(declarator) = child.child_by_field_name("declarator") else {
                continue;
            };
            let ty = child
                .child_by_field_name("type")
                .map(|n| collapse_whitespace(self.text(n)))
                .unwrap_or_default();
            let name = collapse_whitespace(self.text(declarator));
            // Drop default member initializers from the spelling.
            let name = name.split('=').next().unwrap_or(&name).trim().to_string();
            if !name.is_empty() {
                members.push(if ty.is_empty() {
                    name
                } else {
                    format!("{ty} {name}")
                });
            }
        }
        members
    }

    fn handle_alias(&mut self, node: Node, ctx: &Ctx) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let target = node
            .child_by_field_name("type")
            .map(|n| collapse_whitespace(self.text(n)))
            .unwrap_or_default();
        self.push_alias(name, target, AliasKind::Using, node, name_node, ctx);
    }

    fn handle_typedef(&mut self, node: Node, ctx: &Ctx) {
        let ty = node
            .child_by_field_name("type")
            .map(|n| collapse_whitespace(self.text(n)))
            .unwrap_or_default();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("declarator", &mut cursor) {
            // `typedef int A, *B;` declares several names; pointer
            // declarators fold into the target spelling.
            let mut target = ty.clone();
            let mut name_node = child;
            while name_node.kind() == "pointer_declarator" {
                target.push('*');
                match name_node.child_by_field_name("declarator") {
                    Some(inner) => name_node = inner,
                    None => break,
                }
            }
            if name_node.kind() != "type_identifier" && name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(name_node).to_string();
            self.push_alias(name, target.clone(), AliasKind::Typedef, node, name_node, ctx);
        }
    }

    fn push_alias(
        &mut self,
        name: String,
        target: String,
        kind: AliasKind,
        node: Node,
        name_node: Node,
        ctx: &Ctx,
    ) {
        if name.is_empty() || target.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        self.local_aliases.insert(qualified.clone(), target.clone());
        self.local_aliases.insert(name.clone(), target.clone());

        let (is_template_alias, template_params) = match &ctx.template {
            Some(t) => (true, t.params.clone()),
            None => (false, Vec::new()),
        };

        self.out.aliases.push(TypeAliasRecord {
            alias_name: name,
            namespace: self.scope_prefix().trim_end_matches("::").to_string(),
            qualified_name: qualified,
            canonical_type: target.clone(),
            target_type: target,
            file: self.file.to_string(),
            line: name_node.start_position().row as u32 + 1,
            column: name_node.start_position().column as u32 + 1,
            alias_kind: kind,
            is_template_alias,
            template_params,
        });
        let _ = node;
    }

    /// Resolve typedef chains within this file: `typedef A B; typedef B C;`
    /// gives C the canonical type of A's spelling.
    fn resolve_alias_canonicals(&mut self) {
        for alias in &mut self.out.aliases {
            let mut canonical = alias.target_type.clone();
            for _ in 0..10 {
                match self.local_aliases.get(&canonical) {
                    Some(next) if *next != canonical => canonical = next.clone(),
                    _ => break,
                }
            }
            alias.canonical_type = canonical;
        }
    }

    fn record_call(&mut self, node: Node, ctx: &Ctx) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let callee = match function.kind() {
            "identifier" => Some(self.text(function).to_string()),
            // `foo<int>(...)`: record the generic template name.
            "template_function" => function
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string()),
            "qualified_identifier" => {
                let text = collapse_whitespace(self.text(function));
                let (path, last) = text.rsplit_once("::").unwrap_or(("", text.as_str()));
                let (name, _args) = split_template_suffix(last);
                Some(if path.is_empty() {
                    name
                } else {
                    format!("{path}::{name}")
                })
            }
            // `obj.method(...)` / `ptr->method(...)`: the method name.
            "field_expression" => function
                .child_by_field_name("field")
                .map(|n| self.text(n).to_string()),
            _ => None,
        };
        let Some(callee) = callee else {
            return;
        };
        if callee.is_empty() {
            return;
        }
        self.out.calls.push(RawCall {
            caller_usr: ctx.function_usr.clone(),
            callee_name: callee,
            file: self.file.to_string(),
            line: node.start_position().row as u32 + 1,
            column: node.start_position().column as u32 + 1,
        });
    }

    /// Attach brief/doc extracted from the comment block directly above the
    /// statement-level ancestor of `node`.
    fn attach_docs(&mut self, symbol: &mut Symbol, node: Node) {
        let Some(raw) = self.raw_comment_above(node) else {
            return;
        };
        let doc = raw.trim().to_string();
        if doc.is_empty() {
            return;
        }
        symbol.brief = first_meaningful_line(&doc)
            .map(|line| truncate_with_ellipsis(&line, MAX_BRIEF_LEN));
        symbol.doc_comment = Some(truncate_with_ellipsis(&doc, MAX_DOC_LEN));
    }

    fn raw_comment_above(&self, node: Node) -> Option<String> {
        // Climb to the node whose siblings are statements.
        let mut anchor = node;
        while let Some(parent) = anchor.parent() {
            match parent.kind() {
                "translation_unit" | "declaration_list" | "field_declaration_list" => break,
                "template_declaration" | "declaration" | "field_declaration" => {
                    anchor = parent;
                }
                _ => break,
            }
        }

        let mut comments: Vec<&str> = Vec::new();
        let mut expected_line = anchor.start_position().row;
        let mut prev = anchor.prev_sibling();
        while let Some(sibling) = prev {
            if sibling.kind() != "comment" {
                break;
            }
            let end_line = sibling.end_position().row;
            if end_line + 1 < expected_line {
                break;
            }
            comments.push(self.text(sibling));
            expected_line = sibling.start_position().row;
            prev = sibling.prev_sibling();
        }
        if comments.is_empty() {
            return None;
        }
        comments.reverse();
        Some(comments.join("\n"))
    }
}

/// Strip comment markers and return the first line with actual prose,
/// skipping `@tag` / `\tag` lines.
fn first_meaningful_line(doc: &str) -> Option<String> {
    for line in doc.lines() {
        let cleaned = line
            .trim()
            .trim_start_matches('/')
            .trim_start_matches('*')
            .trim_start_matches('!')
            .trim_end_matches("*/")
            .trim();
        if cleaned.is_empty() || cleaned.starts_with('@') || cleaned.starts_with('\\') {
            continue;
        }
        return Some(cleaned.to_string());
    }
    None
}

/// Find the function_declarator in a declaration/definition node, looking
/// through pointer and reference declarators.
fn find_function_declarator(node: Node) -> Option<Node> {
    let mut walk = node.child_by_field_name("declarator");
    while let Some(current) = walk {
        match current.kind() {
            "function_declarator" => return Some(current),
            "pointer_declarator" | "reference_declarator" => {
                walk = current.child_by_field_name("declarator").or_else(|| {
                    current
                        .named_children(&mut current.walk())
                        .find(|n| n.kind().ends_with("declarator"))
                });
            }
            _ => return None,
        }
    }
    None
}

/// Parameter list spelling with parameter names removed, e.g. `(int, T&)`.
fn parameter_list_text(fn_decl: Node, code: &str) -> String {
    let Some(params) = fn_decl.child_by_field_name("parameters") else {
        return "()".to_string();
    };
    let mut parts = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "parameter_declaration" | "optional_parameter_declaration" => {
                parts.push(parameter_type_text(param, code));
            }
            "variadic_parameter_declaration" => parts.push("...".to_string()),
            _ => {}
        }
    }
    format!("({})", parts.join(", "))
}

/// A parameter's type spelling with the declared name excised.
fn parameter_type_text(param: Node, code: &str) -> String {
    let base = param
        .child_by_field_name("type")
        .map(|n| collapse_whitespace(&code[n.byte_range()]))
        .unwrap_or_default();
    let mut suffix = String::new();
    let mut walk = param.child_by_field_name("declarator");
    while let Some(node) = walk {
        match node.kind() {
            "pointer_declarator" => {
                suffix.push('*');
                walk = node.child_by_field_name("declarator");
            }
            "reference_declarator" => {
                let text = &code[node.byte_range()];
                suffix.push_str(if text.starts_with("&&") { "&&" } else { "&" });
                walk = node
                    .named_children(&mut node.walk())
                    .find(|n| n.is_named() && n.kind() != "comment");
            }
            "identifier" | "abstract_pointer_declarator" | "abstract_reference_declarator" => {
                if node.kind() == "abstract_pointer_declarator" {
                    suffix.push('*');
                } else if node.kind() == "abstract_reference_declarator" {
                    suffix.push('&');
                }
                break;
            }
            _ => break,
        }
    }
    // Qualifiers spelled before the type keep their place in `base`.
    format!("{base}{suffix}")
}

/// Does the function declarator carry a trailing `const` qualifier?
fn declarator_has_const(fn_decl: Node, code: &str) -> bool {
    let mut cursor = fn_decl.walk();
    let mut seen_params = false;
    for child in fn_decl.children(&mut cursor) {
        if child.kind() == "parameter_list" {
            seen_params = true;
            continue;
        }
        if seen_params
            && (child.kind() == "type_qualifier" || child.kind() == "const")
            && &code[child.byte_range()] == "const"
        {
            return true;
        }
    }
    false
}

/// Keyword scan over a declaration's direct children (`virtual`, ...).
fn has_keyword(node: Node, code: &str, keyword: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().ends_with("declarator") || child.kind() == "compound_statement" {
            break;
        }
        if &code[child.byte_range()] == keyword {
            return true;
        }
    }
    false
}

fn has_storage_class(node: Node, code: &str, keyword: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "storage_class_specifier" && &code[child.byte_range()] == keyword {
            return true;
        }
        if child.kind().ends_with("declarator") {
            break;
        }
    }
    false
}

/// `= 0` after the declarator marks a pure virtual method.
fn is_pure_virtual(node: Node, code: &str) -> bool {
    let mut cursor = node.walk();
    let mut saw_eq = false;
    for child in node.children(&mut cursor) {
        let text = &code[child.byte_range()];
        if text == "=" {
            saw_eq = true;
            continue;
        }
        if saw_eq {
            return text == "0";
        }
    }
    false
}

/// Split `name<args>` into (`name`, `Some("<args>")`).
fn split_template_suffix(spelling: &str) -> (String, Option<String>) {
    match spelling.find('<') {
        Some(pos) if spelling.ends_with('>') => (
            spelling[..pos].to_string(),
            Some(spelling[pos..].to_string()),
        ),
        _ => (spelling.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_src(code: &str) -> ExtractionOutput {
        let mut parser = CppParser::new().unwrap();
        match parser.parse(code) {
            ParseOutcome::Full(tree) | ParseOutcome::Partial(tree, _) => {
                extract(&tree, code, "/test/input.cpp", true)
            }
            ParseOutcome::Failed(reason) => panic!("parse failed: {reason}"),
        }
    }

    fn find<'a>(out: &'a ExtractionOutput, name: &str) -> &'a Symbol {
        out.symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("symbol '{name}' not found in {:?}",
                out.symbols.iter().map(|s| &s.name).collect::<Vec<_>>()))
    }

    #[test]
    fn classes_and_namespaces_qualify() {
        let out = extract_src(
            "namespace ns1 { namespace ns2 {\nclass Widget { int x; };\n} }\nstruct Plain {};\n",
        );
        let widget = find(&out, "Widget");
        assert_eq!(widget.qualified_name, "ns1::ns2::Widget");
        assert_eq!(widget.namespace, "ns1::ns2");
        assert_eq!(widget.kind, SymbolKind::Class);
        assert!(widget.is_definition);
        assert_eq!(widget.members, vec!["int x"]);

        let plain = find(&out, "Plain");
        assert_eq!(plain.kind, SymbolKind::Struct);
        assert_eq!(plain.namespace, "");
    }

    #[test]
    fn anonymous_namespace_is_spelled_out() {
        let out = extract_src("namespace { class Hidden {}; }\n");
        let hidden = find(&out, "Hidden");
        assert_eq!(hidden.qualified_name, "(anonymous namespace)::Hidden");
        assert_eq!(hidden.namespace, "(anonymous namespace)");
    }

    #[test]
    fn forward_declaration_is_not_definition() {
        let out = extract_src("class Q;\nclass Q { int x; };\n");
        let records: Vec<_> = out.symbols.iter().filter(|s| s.name == "Q").collect();
        assert_eq!(records.len(), 2);
        let fwd = records.iter().find(|s| !s.is_definition).unwrap();
        let def = records.iter().find(|s| s.is_definition).unwrap();
        assert_eq!(fwd.usr, def.usr);
        assert_eq!(def.start_line, 2);
        assert_eq!(def.end_line, 2);
    }

    #[test]
    fn methods_carry_flags_and_access() {
        let code = r#"
class Shape {
public:
    virtual double area() const = 0;
    static int count();
private:
    void internal(int v);
};
"#;
        let out = extract_src(code);
        let area = find(&out, "area");
        assert_eq!(area.kind, SymbolKind::Method);
        assert_eq!(area.parent_class, "Shape");
        assert_eq!(area.qualified_name, "Shape::area");
        assert!(area.is_virtual);
        assert!(area.is_pure_virtual);
        assert!(area.is_const);
        assert_eq!(area.access, Access::Public);
        assert_eq!(area.signature.as_deref(), Some("double ()"));

        let count = find(&out, "count");
        assert!(count.is_static);
        assert!(!count.is_virtual);

        let internal = find(&out, "internal");
        assert_eq!(internal.access, Access::Private);
        assert_eq!(internal.signature.as_deref(), Some("void (int)"));
    }

    #[test]
    fn out_of_line_definition_shares_usr_with_declaration() {
        let header = "class Widget {\npublic:\n    void draw(int scale) const;\n};\n";
        let source = "#include \"widget.h\"\nvoid Widget::draw(int scale) const {}\n";

        let decl_out = extract_src(header);
        let decl = find(&decl_out, "draw");
        assert!(!decl.is_definition);

        let def_out = extract_src(source);
        let def = find(&def_out, "draw");
        assert!(def.is_definition);
        assert_eq!(def.qualified_name, "Widget::draw");
        assert_eq!(def.parent_class, "Widget");
        assert_eq!(decl.usr, def.usr);
    }

    #[test]
    fn free_function_overloads_get_distinct_usrs() {
        let out = extract_src("void f(int);\nvoid f(double);\n");
        let usrs: Vec<_> = out
            .symbols
            .iter()
            .filter(|s| s.name == "f")
            .map(|s| s.usr.clone())
            .collect();
        assert_eq!(usrs.len(), 2);
        assert_ne!(usrs[0], usrs[1]);
    }

    #[test]
    fn class_template_and_specializations() {
        let code = r#"
template <typename T> class Container { T value; };
template <typename T> class Container<T*> { T* value; };
template <> class Container<int> { int value; };
"#;
        let out = extract_src(code);
        let kinds: Vec<_> = out
            .symbols
            .iter()
            .filter(|s| s.name == "Container")
            .map(|s| s.kind)
            .collect();
        assert!(kinds.contains(&SymbolKind::ClassTemplate));
        assert!(kinds.contains(&SymbolKind::PartialSpecialization));
        assert!(kinds.contains(&SymbolKind::Class)); // full specialization

        let primary = out
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::ClassTemplate)
            .unwrap();
        assert_eq!(primary.template_parameters.len(), 1);
        assert_eq!(primary.template_parameters[0].name, "T");
        assert_eq!(primary.template_kind, Some(TemplateKind::ClassTemplate));

        let full = out
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Class && s.name == "Container")
            .unwrap();
        assert_eq!(full.template_kind, Some(TemplateKind::FullSpecialization));
        assert_eq!(full.primary_template_usr.as_deref(), Some(primary.usr.as_str()));

        let partial = out
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::PartialSpecialization)
            .unwrap();
        assert_eq!(partial.primary_template_usr.as_deref(), Some(primary.usr.as_str()));
        assert_ne!(partial.usr, primary.usr);
    }

    #[test]
    fn crtp_base_is_canonicalized_to_type_parameter() {
        let code = r#"
template <class D> class Base : public D {};
class Child : public Base<Child> {};
"#;
        let out = extract_src(code);
        let base = find(&out, "Base");
        assert_eq!(base.base_classes, vec!["type-parameter-0-0"]);
        let child = find(&out, "Child");
        assert_eq!(child.base_classes, vec!["Base<Child>"]);
    }

    #[test]
    fn template_calls_attach_to_generic_template() {
        let code = r#"
template <typename T> void f(T value) {}
void caller() {
    f<int>(1);
    f<double>(1.0);
}
"#;
        let out = extract_src(code);
        let calls: Vec<_> = out.calls.iter().filter(|c| c.callee_name == "f").collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].callee_name, calls[1].callee_name);
        assert_ne!(
            (calls[0].line, calls[0].column),
            (calls[1].line, calls[1].column)
        );
        let caller = find(&out, "caller");
        assert!(calls.iter().all(|c| c.caller_usr == caller.usr));
    }

    #[test]
    fn method_and_qualified_calls_are_recorded() {
        let code = r#"
void helper();
struct Api { void run(); };
namespace ns { void deep(); }
void caller(Api& api) {
    helper();
    api.run();
    ns::deep();
}
"#;
        let out = extract_src(code);
        let names: Vec<_> = out.calls.iter().map(|c| c.callee_name.as_str()).collect();
        assert!(names.contains(&"helper"));
        assert!(names.contains(&"run"));
        assert!(names.contains(&"ns::deep"));
    }

    #[test]
    fn aliases_and_typedef_chains() {
        let code = r#"
namespace app {
class Widget {};
typedef Widget WidgetT;
using Handle = WidgetT;
template <typename T> using Box = Container<T>;
}
"#;
        let out = extract_src(code);
        let typedef = out
            .aliases
            .iter()
            .find(|a| a.alias_name == "WidgetT")
            .unwrap();
        assert_eq!(typedef.alias_kind, AliasKind::Typedef);
        assert_eq!(typedef.qualified_name, "app::WidgetT");
        assert_eq!(typedef.target_type, "Widget");

        let using = out.aliases.iter().find(|a| a.alias_name == "Handle").unwrap();
        assert_eq!(using.alias_kind, AliasKind::Using);
        assert_eq!(using.target_type, "WidgetT");
        // Chain resolved within the file.
        assert_eq!(using.canonical_type, "Widget");

        let boxed = out.aliases.iter().find(|a| a.alias_name == "Box").unwrap();
        assert!(boxed.is_template_alias);
        assert_eq!(boxed.template_params.len(), 1);
    }

    #[test]
    fn doc_comments_feed_brief_and_doc() {
        let code = r#"
/// Draws widgets on screen.
/// Second line of detail.
class Painter {};

/**
 * @brief ignored tag line
 * Renders a single frame.
 */
void render();
"#;
        let out = extract_src(code);
        let painter = find(&out, "Painter");
        assert_eq!(painter.brief.as_deref(), Some("Draws widgets on screen."));
        assert!(painter.doc_comment.as_deref().unwrap().contains("Second line"));

        let render = find(&out, "render");
        assert_eq!(render.brief.as_deref(), Some("Renders a single frame."));
    }

    #[test]
    fn function_template_has_stable_usr() {
        let out = extract_src("template <typename T> T max_of(T a, T b) { return a > b ? a : b; }");
        let tmpl = find(&out, "max_of");
        assert_eq!(tmpl.kind, SymbolKind::FunctionTemplate);
        assert_eq!(tmpl.usr, usr::build(SymbolKind::FunctionTemplate, "max_of", None));
    }

    #[test]
    fn partial_parse_still_extracts() {
        let mut parser = CppParser::new().unwrap();
        let code = "class Good {};\nclass Broken { this is not C++\nclass Later {};\n";
        match parser.parse(code) {
            ParseOutcome::Partial(tree, errors) => {
                assert!(errors > 0);
                let out = extract(&tree, code, "/test/bad.cpp", true);
                assert!(out.symbols.iter().any(|s| s.name == "Good"));
            }
            ParseOutcome::Full(_) => panic!("expected syntax errors"),
            ParseOutcome::Failed(reason) => panic!("unexpected hard failure: {reason}"),
        }
    }
}
