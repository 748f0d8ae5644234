//! Structural extraction of environment reads from parse trees.
//!
//! Python is parsed with tree-sitter, Nix with rnix. Both walkers recognise a
//! fixed set of accessor shapes whose name argument is a plain string literal,
//! and record the byte span of that literal's content so the rewriter can
//! replace it in place. Enclosing scopes are tracked with an explicit stack
//! pushed and popped around scope-defining nodes.

use rnix::SyntaxKind;
use rowan::{WalkEvent, ast::AstNode};
use serde::Serialize;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Callables whose first argument names an environment variable.
const PYTHON_ACCESSORS: &[&str] = &[
    "os.getenv",
    "os.environ.get",
    "environ.get",
    "getenv",
    "get_env",
    "env_var",
    "get_setting",
    "get_config",
];

/// Mapping objects whose string subscript names an environment variable.
const PYTHON_MAPPINGS: &[&str] = &["os.environ", "environ"];

/// Languages with structural support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    Python,
    Nix,
}

impl SourceLanguage {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "py" | "pyi" => Some(SourceLanguage::Python),
            "nix" => Some(SourceLanguage::Nix),
            _ => None,
        }
    }
}

/// How a variable was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// Accessor call with the name as first argument.
    Call,
    /// Subscript on an environment mapping.
    Subscript,
    /// Matched by the pattern fallback.
    Pattern,
}

/// One accessor site found in a parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSite {
    pub name: String,
    /// Dotted accessor path, e.g. `os.environ.get` or `os.environ[]`.
    pub accessor: String,
    pub kind: AccessKind,
    pub has_default: bool,
    pub default_value: Option<String>,
    /// 1-indexed line of the accessor expression.
    pub line: usize,
    /// 1-indexed column of the accessor expression.
    pub column: usize,
    /// Byte offset where the literal's content starts.
    pub name_start: usize,
    /// Byte offset where the literal's content ends.
    pub name_end: usize,
    pub enclosing_function: Option<String>,
    pub enclosing_type: Option<String>,
}

/// Extracts accessor sites from `source`.
///
/// Returns `None` when the source does not parse cleanly; callers fall back
/// to pattern matching in that case.
pub fn extract(language: SourceLanguage, source: &str) -> Option<Vec<AccessSite>> {
    match language {
        SourceLanguage::Python => extract_python(source),
        SourceLanguage::Nix => extract_nix(source),
    }
}

fn extract_python(source: &str) -> Option<Vec<AccessSite>> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        log::warn!("python grammar unavailable: {e}");
        return None;
    }
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let mut walker = PythonWalker {
        source,
        scopes: Vec::new(),
        sites: Vec::new(),
    };
    walker.walk(root);
    Some(walker.sites)
}

enum Scope {
    Function(String),
    Type(String),
}

struct PythonWalker<'a> {
    source: &'a str,
    scopes: Vec<Scope>,
    sites: Vec<AccessSite>,
}

impl PythonWalker<'_> {
    fn walk(&mut self, node: Node<'_>) {
        let scope = match node.kind() {
            "function_definition" => self.field_text(node, "name").map(Scope::Function),
            "class_definition" => self.field_text(node, "name").map(Scope::Type),
            _ => None,
        };
        let pushed = scope.is_some();
        if let Some(scope) = scope {
            self.scopes.push(scope);
        }

        match node.kind() {
            "call" => self.visit_call(node),
            "subscript" => self.visit_subscript(node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child);
        }

        if pushed {
            self.scopes.pop();
        }
    }

    fn visit_call(&mut self, node: Node<'_>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let Some(accessor) = self.dotted_path(function) else {
            return;
        };
        if !PYTHON_ACCESSORS.contains(&accessor.as_str()) {
            return;
        }
        let Some(arguments) = node.child_by_field_name("arguments") else {
            return;
        };
        if arguments.kind() != "argument_list" {
            return;
        }

        let mut cursor = arguments.walk();
        let named: Vec<Node<'_>> = arguments.named_children(&mut cursor).collect();
        let positional: Vec<Node<'_>> = named
            .iter()
            .copied()
            .filter(|n| {
                !matches!(
                    n.kind(),
                    "comment" | "keyword_argument" | "list_splat" | "dictionary_splat"
                )
            })
            .collect();
        let keyword_default = named.iter().copied().find(|n| {
            n.kind() == "keyword_argument"
                && self.field_text(*n, "name").as_deref() == Some("default")
        });

        let Some((name, start, end)) = positional.first().and_then(|n| self.string_literal(*n))
        else {
            return;
        };
        let default_node = positional
            .get(1)
            .copied()
            .or_else(|| keyword_default.and_then(|kw| kw.child_by_field_name("value")));

        self.push_site(node, name, accessor, AccessKind::Call, start, end, default_node);
    }

    fn visit_subscript(&mut self, node: Node<'_>) {
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        let Some(mapping) = self.dotted_path(value) else {
            return;
        };
        if !PYTHON_MAPPINGS.contains(&mapping.as_str()) {
            return;
        }
        let Some((name, start, end)) = node
            .child_by_field_name("subscript")
            .and_then(|key| self.string_literal(key))
        else {
            return;
        };
        let accessor = format!("{mapping}[]");
        self.push_site(node, name, accessor, AccessKind::Subscript, start, end, None);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_site(
        &mut self,
        node: Node<'_>,
        name: String,
        accessor: String,
        kind: AccessKind,
        name_start: usize,
        name_end: usize,
        default_node: Option<Node<'_>>,
    ) {
        let (line, column) = position(self.source, node.start_byte());
        let enclosing_function = self.scopes.iter().rev().find_map(|s| match s {
            Scope::Function(name) => Some(name.clone()),
            Scope::Type(_) => None,
        });
        let enclosing_type = self.scopes.iter().rev().find_map(|s| match s {
            Scope::Type(name) => Some(name.clone()),
            Scope::Function(_) => None,
        });

        self.sites.push(AccessSite {
            name,
            accessor,
            kind,
            has_default: default_node.is_some(),
            default_value: default_node.and_then(|n| self.literal_text(n)),
            line,
            column,
            name_start,
            name_end,
            enclosing_function,
            enclosing_type,
        });
    }

    /// Renders `os.environ.get` style callee expressions; anything else is `None`.
    fn dotted_path(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node).to_string()),
            "attribute" => {
                let object = self.dotted_path(node.child_by_field_name("object")?)?;
                let attribute = self.text(node.child_by_field_name("attribute")?);
                Some(format!("{object}.{attribute}"))
            }
            _ => None,
        }
    }

    /// Content and content span of a plain (non-f, non-byte) string literal.
    fn string_literal(&self, node: Node<'_>) -> Option<(String, usize, usize)> {
        if node.kind() != "string" || node.child_count() < 2 {
            return None;
        }
        let start = node.child(0)?;
        let end = node.child(node.child_count() - 1)?;
        if start.kind() != "string_start" || end.kind() != "string_end" {
            return None;
        }
        let prefix = self.text(start);
        if prefix.contains(['f', 'F', 'b', 'B']) {
            return None;
        }
        let mut cursor = node.walk();
        if node
            .named_children(&mut cursor)
            .any(|c| c.kind() == "interpolation")
        {
            return None;
        }

        let (from, to) = (start.end_byte(), end.start_byte());
        let content = self.source.get(from..to)?;
        if content.contains('\\') {
            return None;
        }
        Some((content.to_string(), from, to))
    }

    fn literal_text(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "string" => self.string_literal(node).map(|(text, _, _)| text),
            "integer" | "float" | "true" | "false" | "none" => Some(self.text(node).to_string()),
            _ => None,
        }
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
    }

    fn text(&self, node: Node<'_>) -> &str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or_default()
    }
}

fn extract_nix(source: &str) -> Option<Vec<AccessSite>> {
    let parse = rnix::Root::parse(source);
    if !parse.errors().is_empty() {
        return None;
    }

    let root = parse.tree();
    let mut bindings: Vec<String> = Vec::new();
    let mut sites = Vec::new();

    for event in root.syntax().preorder() {
        match event {
            WalkEvent::Enter(node) => match node.kind() {
                SyntaxKind::NODE_ATTRPATH_VALUE => bindings.push(binding_name(&node)),
                SyntaxKind::NODE_APPLY => {
                    if let Some(mut site) = nix_get_env(&node, source) {
                        site.enclosing_function =
                            bindings.iter().rev().find(|b| !b.is_empty()).cloned();
                        sites.push(site);
                    }
                }
                _ => {}
            },
            WalkEvent::Leave(node) => {
                if node.kind() == SyntaxKind::NODE_ATTRPATH_VALUE {
                    bindings.pop();
                }
            }
        }
    }

    Some(sites)
}

fn binding_name(node: &rowan::SyntaxNode<rnix::NixLanguage>) -> String {
    node.children()
        .find(|c| c.kind() == SyntaxKind::NODE_ATTRPATH)
        .map(|c| c.text().to_string())
        .unwrap_or_default()
}

/// Matches `builtins.getEnv "NAME"` and bare `getEnv "NAME"`.
///
/// rnix parses the former as:
/// ```text
/// NODE_APPLY
///   NODE_SELECT
///     NODE_IDENT (builtins)
///     NODE_ATTRPATH
///       NODE_IDENT (getEnv)
///   NODE_STRING
/// ```
fn nix_get_env(node: &rowan::SyntaxNode<rnix::NixLanguage>, source: &str) -> Option<AccessSite> {
    let mut children = node.children();
    let function = children.next()?;
    let argument = children.next()?;

    let accessor = match function.kind() {
        SyntaxKind::NODE_IDENT if function.text() == "getEnv" => "getEnv",
        SyntaxKind::NODE_SELECT => {
            let mut parts = function.children();
            let base = parts.next()?;
            let attrpath = parts.next()?;
            let idents: Vec<String> = attrpath
                .children()
                .filter(|c| c.kind() == SyntaxKind::NODE_IDENT)
                .map(|c| c.text().to_string())
                .collect();
            if base.kind() != SyntaxKind::NODE_IDENT
                || base.text() != "builtins"
                || idents != ["getEnv"]
            {
                return None;
            }
            "builtins.getEnv"
        }
        _ => return None,
    };

    if argument.kind() != SyntaxKind::NODE_STRING {
        return None;
    }
    if argument
        .children()
        .any(|c| c.kind() == SyntaxKind::NODE_INTERPOL)
    {
        return None;
    }
    let contents: Vec<_> = argument
        .children_with_tokens()
        .filter_map(|element| element.into_token())
        .filter(|token| token.kind() == SyntaxKind::TOKEN_STRING_CONTENT)
        .collect();
    let [content] = contents.as_slice() else {
        return None;
    };

    let range = content.text_range();
    let (name_start, name_end): (usize, usize) = (range.start().into(), range.end().into());
    let start: usize = node.text_range().start().into();
    let (line, column) = position(source, start);

    Some(AccessSite {
        name: content.text().to_string(),
        accessor: accessor.to_string(),
        kind: AccessKind::Call,
        has_default: false,
        default_value: None,
        line,
        column,
        name_start,
        name_end,
        enclosing_function: None,
        enclosing_type: None,
    })
}

/// 1-indexed line and character column of byte `offset` in `source`.
pub fn position(source: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let line = before.matches('\n').count() + 1;
    (line, before[line_start..].chars().count() + 1)
}
