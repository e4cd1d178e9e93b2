//! Linter for Python sources.
//!
//! Unlike the template linters this one parses a real AST
//! (`ruff_python_parser`) and walks it looking for HTML built with string
//! formatting or concatenation outside the `HTML()`/`Text()` markup-safe
//! wrappers. A syntax error becomes a `python-parse-error` violation and
//! only disables the AST checks for that fragment; the regex passes still
//! run.

use crate::expression::Expression;
use crate::linters::{extension_is, Linter};
use crate::rules::{FileResults, Rule, RuleSet};
use regex::Regex;
use ruff_python_ast::{self as ast, Expr, Operator, Stmt};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static HTML_TAG_RE: OnceLock<Regex> = OnceLock::new();
static HTML_ENTITY_RE: OnceLock<Regex> = OnceLock::new();
static CUSTOM_ESCAPE_RE: OnceLock<Regex> = OnceLock::new();
static ENCODING_COMMENT_RE: OnceLock<Regex> = OnceLock::new();

fn html_tag_re() -> &'static Regex {
    #[allow(clippy::unwrap_used)]
    HTML_TAG_RE.get_or_init(|| Regex::new(r"<\s*/?[a-zA-Z]").unwrap())
}

fn html_entity_re() -> &'static Regex {
    #[allow(clippy::unwrap_used)]
    HTML_ENTITY_RE.get_or_init(|| Regex::new(r"&(?:#\d+|#x[0-9a-fA-F]+|[a-zA-Z]+);").unwrap())
}

fn custom_escape_re() -> &'static Regex {
    // Ad-hoc entity escaping: a raw `<` and a pre-escaped `&lt;` in the
    // same line of code is a sign someone is escaping by hand.
    #[allow(clippy::unwrap_used)]
    CUSTOM_ESCAPE_RE.get_or_init(|| Regex::new(r"<[^\n]*&lt;|&lt;[^\n]*<").unwrap())
}

fn encoding_comment_re() -> &'static Regex {
    // PEP 263 encoding declaration.
    #[allow(clippy::unwrap_used)]
    ENCODING_COMMENT_RE.get_or_init(|| Regex::new(r"^[ \t\x0c]*#.*?coding[:=]").unwrap())
}

/// Attribute deprecated in favor of `display_name_with_default`.
const DEPRECATED_DISPLAY_NAME: &str = "display_name_with_default_escaped";

/// Linter for `.py` files, also delegated to by the Mako linter for
/// `${...}` expressions and `<% ... %>` blocks.
#[derive(Debug)]
pub struct PythonLinter {
    ruleset: RuleSet,
}

impl Default for PythonLinter {
    fn default() -> Self {
        Self {
            ruleset: RuleSet::new(&[
                Rule::PythonConcatHtml,
                Rule::PythonCustomEscape,
                Rule::PythonDeprecatedDisplayName,
                Rule::PythonInterpolateHtml,
                Rule::PythonParseError,
                Rule::PythonRequiresHtmlOrText,
                Rule::PythonCloseBeforeFormat,
                Rule::PythonWrapHtml,
            ]),
        }
    }
}

impl PythonLinter {
    /// Full pipeline over standalone Python source.
    pub fn check(&self, contents: &str, results: &mut FileResults) {
        let parseable = blank_encoding_comment(contents);
        self.parse_and_visit(&parseable, &VisitorMode::default(), results);
        self.check_custom_escape(contents, results);
    }

    /// Pipeline over a Python fragment embedded at `offset` inside a larger
    /// template. Violations come back shifted into the template's offsets.
    pub fn check_fragment(&self, fragment: &str, offset: usize, results: &mut FileResults) {
        let mut scratch = FileResults::new(PathBuf::new());
        self.parse_and_visit(fragment, &VisitorMode::default(), &mut scratch);
        self.check_custom_escape(fragment, &mut scratch);
        results.shift_and_merge(offset, scratch);
    }

    /// Extra pass for Mako expressions: flags bare HTML string literals
    /// (`python-wrap-html`) and, when the template is safe-by-default,
    /// redundant literal entities (`mako-html-entities`).
    pub fn check_expression_html_strings(
        &self,
        fragment: &str,
        offset: usize,
        flag_html_entities: bool,
        results: &mut FileResults,
    ) {
        let mode = VisitorMode {
            collect_bare_html_strings: true,
            flag_html_entities,
            standard_checks: false,
        };
        let mut scratch = FileResults::new(PathBuf::new());
        self.parse_and_visit(fragment, &mode, &mut scratch);
        results.shift_and_merge(offset, scratch);
    }

    fn parse_and_visit(&self, source: &str, mode: &VisitorMode, results: &mut FileResults) {
        match parse_module(source) {
            Ok(parsed) => {
                let module = parsed.into_syntax();
                let mut visitor = UnsafeStringVisitor::new(mode.clone());
                for stmt in &module.body {
                    visitor.visit_stmt(stmt);
                }
                for (rule, start, end) in visitor.violations {
                    results.add_violation(rule, Expression::new(start, Some(end)));
                }
            }
            Err(err) => {
                if mode.standard_checks {
                    let start = err.location.start().to_usize().min(source.len());
                    results.add_violation(Rule::PythonParseError, Expression::new(start, None));
                }
            }
        }
    }

    fn check_custom_escape(&self, contents: &str, results: &mut FileResults) {
        for found in custom_escape_re().find_iter(contents) {
            results.add_violation(
                Rule::PythonCustomEscape,
                Expression::new(found.start(), Some(found.end())),
            );
        }
    }
}

impl Linter for PythonLinter {
    fn line_comment_delim(&self) -> Option<&'static str> {
        Some("#")
    }

    fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    fn applies_to(&self, path: &Path) -> bool {
        if !extension_is(path, "py") {
            return false;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        // Test modules legitimately build HTML fixtures by hand, and the
        // linter's historical Python implementation lints clean of itself.
        !name.ends_with("tests.py") && name != "xsslint.py"
    }

    fn process_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut results = FileResults::new(path.to_path_buf());
        self.check(contents, &mut results);
        results.prepare_results(contents, self.line_comment_delim());
        results
    }
}

/// Replaces a PEP-263 encoding-declaration comment (line 1 or 2) with a
/// same-length run of `#`. The host already decoded the file to text, and a
/// declared encoding confuses the parser; blanking in place preserves every
/// byte offset.
fn blank_encoding_comment(contents: &str) -> String {
    let mut out = contents.to_owned();
    let mut line_start = 0;
    for _ in 0..2 {
        let line_end = contents[line_start..]
            .find('\n')
            .map_or(contents.len(), |i| i + line_start);
        let line = &contents[line_start..line_end];
        if encoding_comment_re().is_match(line) {
            out.replace_range(line_start..line_end, &"#".repeat(line.len()));
            break;
        }
        if line_end == contents.len() {
            break;
        }
        line_start = line_end + 1;
    }
    out
}

#[derive(Debug, Clone)]
struct VisitorMode {
    /// Run the formatting/concatenation rule family.
    standard_checks: bool,
    /// Flag HTML-bearing string literals outside `HTML()`/`Text()` calls.
    collect_bare_html_strings: bool,
    /// Flag literal HTML entities outside wrappers (Mako safe-by-default
    /// templates only).
    flag_html_entities: bool,
}

impl Default for VisitorMode {
    fn default() -> Self {
        Self {
            standard_checks: true,
            collect_bare_html_strings: false,
            flag_html_entities: false,
        }
    }
}

/// Walks every node, collecting `(rule, start, end)` byte ranges.
struct UnsafeStringVisitor {
    mode: VisitorMode,
    /// Non-zero while visiting the arguments of an `HTML()`/`Text()` call.
    wrapper_depth: usize,
    violations: Vec<(Rule, usize, usize)>,
}

impl UnsafeStringVisitor {
    fn new(mode: VisitorMode) -> Self {
        Self {
            mode,
            wrapper_depth: 0,
            violations: Vec::new(),
        }
    }

    fn add(&mut self, rule: Rule, node: &impl Ranged) {
        self.violations
            .push((rule, node.range().start().to_usize(), node.range().end().to_usize()));
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(node) => {
                for decorator in &node.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
                for param in node.parameters.iter() {
                    if let Some(default) = param.default() {
                        self.visit_expr(default);
                    }
                }
                self.visit_body(&node.body);
            }
            Stmt::ClassDef(node) => {
                for decorator in &node.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
                if let Some(arguments) = &node.arguments {
                    for arg in &arguments.args {
                        self.visit_expr(arg);
                    }
                }
                self.visit_body(&node.body);
            }
            Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::Delete(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
            }
            Stmt::Assign(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
                self.visit_expr(&node.value);
            }
            Stmt::AugAssign(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.value);
            }
            Stmt::AnnAssign(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Stmt::For(node) => {
                self.visit_expr(&node.iter);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::While(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            Stmt::If(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                for clause in &node.elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.visit_expr(test);
                    }
                    self.visit_body(&clause.body);
                }
            }
            Stmt::With(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                }
                self.visit_body(&node.body);
            }
            Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Try(node) => {
                self.visit_body(&node.body);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    self.visit_body(&h.body);
                }
                self.visit_body(&node.orelse);
                self.visit_body(&node.finalbody);
            }
            Stmt::Assert(node) => {
                self.visit_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Expr(node) => self.visit_expr(&node.value),
            Stmt::Match(node) => {
                self.visit_expr(&node.subject);
                for case in &node.cases {
                    self.visit_body(&case.body);
                }
            }
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::BinOp(node) => self.check_bin_op(node),
            Expr::Call(node) => self.check_call(node),
            Expr::Attribute(node) => {
                if self.mode.standard_checks && node.attr.as_str() == DEPRECATED_DISPLAY_NAME {
                    self.add(Rule::PythonDeprecatedDisplayName, node);
                }
            }
            Expr::StringLiteral(node) => self.check_string_literal(node),
            _ => {}
        }
        self.visit_expr_children(expr);
    }

    /// `+` concatenation and `%` interpolation of HTML-bearing literals.
    fn check_bin_op(&mut self, node: &ast::ExprBinOp) {
        if !self.mode.standard_checks {
            return;
        }
        match node.op {
            Operator::Add => {
                // One violation per offending literal operand; nested
                // `+` chains are handled by recursion into children.
                for side in [&node.left, &node.right] {
                    if let Expr::StringLiteral(literal) = &**side {
                        if string_has_html(&literal.value.to_string()) {
                            self.add(Rule::PythonConcatHtml, literal);
                        }
                    }
                }
            }
            Operator::Mod => {
                if let Expr::StringLiteral(literal) = &*node.left {
                    if string_has_html(&literal.value.to_string()) {
                        self.add(Rule::PythonInterpolateHtml, literal);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_call(&mut self, node: &ast::ExprCall) {
        if self.mode.standard_checks {
            if let Expr::Attribute(attr) = &*node.func {
                if attr.attr.as_str() == "format" {
                    if let Expr::StringLiteral(literal) = &*attr.value {
                        if string_has_html(&literal.value.to_string()) {
                            // Formatting an HTML string without wrapping it
                            // in HTML() first.
                            self.add(Rule::PythonWrapHtml, literal);
                        } else if call_arguments_contain_wrapper(node) {
                            // Mixing HTML()-wrapped arguments into a plain,
                            // unwrapped format string.
                            self.add(Rule::PythonRequiresHtmlOrText, node);
                        }
                    }
                }
            }
            if is_wrapper_call(node) && wrapper_argument_contains_format(node) {
                // `HTML('{}'.format(x))` marks the formatted-in values as
                // safe markup; the wrapper must be closed before format().
                self.add(Rule::PythonCloseBeforeFormat, node);
            }
        }
    }

    fn check_string_literal(&mut self, node: &ast::ExprStringLiteral) {
        if self.wrapper_depth > 0 {
            return;
        }
        let value = node.value.to_string();
        if self.mode.collect_bare_html_strings && string_has_html(&value) {
            self.add(Rule::PythonWrapHtml, node);
        }
        if self.mode.flag_html_entities && html_entity_re().is_match(&value) {
            self.add(Rule::MakoHtmlEntities, node);
        }
    }

    fn visit_expr_children(&mut self, expr: &Expr) {
        match expr {
            Expr::BoolOp(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            Expr::BinOp(node) => {
                self.visit_expr(&node.left);
                self.visit_expr(&node.right);
            }
            Expr::UnaryOp(node) => self.visit_expr(&node.operand),
            Expr::Lambda(node) => self.visit_expr(&node.body),
            Expr::If(node) => {
                self.visit_expr(&node.test);
                self.visit_expr(&node.body);
                self.visit_expr(&node.orelse);
            }
            Expr::Dict(node) => {
                for item in &node.items {
                    if let Some(key) = &item.key {
                        self.visit_expr(key);
                    }
                    self.visit_expr(&item.value);
                }
            }
            Expr::Set(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::ListComp(node) => {
                self.visit_comprehension(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::SetComp(node) => {
                self.visit_comprehension(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::DictComp(node) => {
                self.visit_comprehension(&node.generators);
                if let Some(key) = &node.key {
                    self.visit_expr(key);
                }
                self.visit_expr(&node.value);
            }
            Expr::Generator(node) => {
                self.visit_comprehension(&node.generators);
                self.visit_expr(&node.elt);
            }
            Expr::Await(node) => self.visit_expr(&node.value),
            Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            Expr::YieldFrom(node) => self.visit_expr(&node.value),
            Expr::Compare(node) => {
                self.visit_expr(&node.left);
                for comparator in &node.comparators {
                    self.visit_expr(comparator);
                }
            }
            Expr::Call(node) => {
                let entering_wrapper = is_wrapper_call(node);
                self.visit_expr(&node.func);
                if entering_wrapper {
                    self.wrapper_depth += 1;
                }
                for arg in &node.arguments.args {
                    self.visit_expr(arg);
                }
                for keyword in &node.arguments.keywords {
                    self.visit_expr(&keyword.value);
                }
                if entering_wrapper {
                    self.wrapper_depth -= 1;
                }
            }
            Expr::FString(node) => {
                for part in &node.value {
                    match part {
                        ast::FStringPart::Literal(_) => {}
                        ast::FStringPart::FString(f) => {
                            for element in &f.elements {
                                if let ast::InterpolatedStringElement::Interpolation(interp) =
                                    element
                                {
                                    self.visit_expr(&interp.expression);
                                }
                            }
                        }
                    }
                }
            }
            Expr::Attribute(node) => self.visit_expr(&node.value),
            Expr::Subscript(node) => {
                self.visit_expr(&node.value);
                self.visit_expr(&node.slice);
            }
            Expr::Starred(node) => self.visit_expr(&node.value),
            Expr::List(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Tuple(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Slice(node) => {
                if let Some(lower) = &node.lower {
                    self.visit_expr(lower);
                }
                if let Some(upper) = &node.upper {
                    self.visit_expr(upper);
                }
                if let Some(step) = &node.step {
                    self.visit_expr(step);
                }
            }
            _ => {}
        }
    }

    fn visit_comprehension(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.visit_expr(&generator.iter);
            for if_expr in &generator.ifs {
                self.visit_expr(if_expr);
            }
        }
    }
}

/// `HTML(...)` or `Text(...)` by bare name.
fn is_wrapper_call(node: &ast::ExprCall) -> bool {
    matches!(&*node.func, Expr::Name(name) if name.id.as_str() == "HTML" || name.id.as_str() == "Text")
}

fn wrapper_argument_contains_format(node: &ast::ExprCall) -> bool {
    node.arguments
        .args
        .iter()
        .any(|arg| expr_contains(arg, &|e| matches!(e, Expr::Call(call) if matches!(&*call.func, Expr::Attribute(attr) if attr.attr.as_str() == "format"))))
}

fn call_arguments_contain_wrapper(node: &ast::ExprCall) -> bool {
    let pred = |e: &Expr| matches!(e, Expr::Call(call) if is_wrapper_call(call));
    node.arguments.args.iter().any(|arg| expr_contains(arg, &pred))
        || node
            .arguments
            .keywords
            .iter()
            .any(|keyword| expr_contains(&keyword.value, &pred))
}

/// Structural search for any sub-expression matching `pred`.
fn expr_contains(expr: &Expr, pred: &dyn Fn(&Expr) -> bool) -> bool {
    if pred(expr) {
        return true;
    }
    match expr {
        Expr::BinOp(node) => expr_contains(&node.left, pred) || expr_contains(&node.right, pred),
        Expr::UnaryOp(node) => expr_contains(&node.operand, pred),
        Expr::Call(node) => {
            expr_contains(&node.func, pred)
                || node.arguments.args.iter().any(|arg| expr_contains(arg, pred))
                || node
                    .arguments
                    .keywords
                    .iter()
                    .any(|keyword| expr_contains(&keyword.value, pred))
        }
        Expr::Attribute(node) => expr_contains(&node.value, pred),
        Expr::Subscript(node) => {
            expr_contains(&node.value, pred) || expr_contains(&node.slice, pred)
        }
        Expr::If(node) => {
            expr_contains(&node.test, pred)
                || expr_contains(&node.body, pred)
                || expr_contains(&node.orelse, pred)
        }
        Expr::Tuple(node) => node.elts.iter().any(|elt| expr_contains(elt, pred)),
        Expr::List(node) => node.elts.iter().any(|elt| expr_contains(elt, pred)),
        Expr::Starred(node) => expr_contains(&node.value, pred),
        _ => false,
    }
}

fn string_has_html(text: &str) -> bool {
    html_tag_re().is_match(text)
}
