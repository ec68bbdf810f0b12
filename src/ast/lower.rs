//! Lowering from the rustpython AST into the engine's arena tree
//!
//! The parser's tree is walked once; every statement and expression becomes an
//! arena node with its byte range. Forms the engine has no evaluator for are
//! kept as `Unsupported` nodes so positions inside them still resolve.

use crate::ast::tree::{
    BinaryOp, BoolOp, CompareOp, Constant, ExprContext, NodeId, NodeKind, ParamKind, SyntaxTree,
    TextSpan, TreeBuilder, UnaryOp,
};
use num_traits::ToPrimitive;
use rustpython_parser::ast::{self as py, Ranged};
use rustpython_parser::text_size::TextRange;
use std::path::PathBuf;

/// Lower a parsed module into a [`SyntaxTree`]
pub fn lower_module(module: &py::Mod, source: &str, path: Option<PathBuf>, is_stub: bool) -> SyntaxTree {
    let mut lowering = Lowering {
        builder: TreeBuilder::new(),
    };
    let body = match module {
        py::Mod::Module(py::ModModule { body, .. }) | py::Mod::Interactive(py::ModInteractive { body, .. }) => {
            lowering.stmts(body)
        }
        py::Mod::Expression(py::ModExpression { body, .. }) => {
            let value = lowering.expr(body);
            vec![lowering.alloc(NodeKind::ExprStmt { value }, body.range())]
        }
        py::Mod::FunctionType(_) => Vec::new(),
    };
    let root = lowering.builder.alloc(
        NodeKind::Module { body },
        TextSpan::new(0, source.len() as u32),
    );
    lowering.builder.finish(root, source, path, is_stub)
}

struct Lowering {
    builder: TreeBuilder,
}

fn span(range: TextRange) -> TextSpan {
    TextSpan::new(u32::from(range.start()), u32::from(range.end()))
}

fn ctx(ctx: &py::ExprContext) -> ExprContext {
    match ctx {
        py::ExprContext::Load => ExprContext::Load,
        py::ExprContext::Store => ExprContext::Store,
        py::ExprContext::Del => ExprContext::Del,
    }
}

fn binary_op(op: &py::Operator) -> BinaryOp {
    match op {
        py::Operator::Add => BinaryOp::Add,
        py::Operator::Sub => BinaryOp::Sub,
        py::Operator::Mult => BinaryOp::Mult,
        py::Operator::MatMult => BinaryOp::MatMult,
        py::Operator::Div => BinaryOp::Div,
        py::Operator::Mod => BinaryOp::Mod,
        py::Operator::Pow => BinaryOp::Pow,
        py::Operator::LShift => BinaryOp::LShift,
        py::Operator::RShift => BinaryOp::RShift,
        py::Operator::BitOr => BinaryOp::BitOr,
        py::Operator::BitXor => BinaryOp::BitXor,
        py::Operator::BitAnd => BinaryOp::BitAnd,
        py::Operator::FloorDiv => BinaryOp::FloorDiv,
    }
}

fn unary_op(op: &py::UnaryOp) -> UnaryOp {
    match op {
        py::UnaryOp::Invert => UnaryOp::Invert,
        py::UnaryOp::Not => UnaryOp::Not,
        py::UnaryOp::UAdd => UnaryOp::UAdd,
        py::UnaryOp::USub => UnaryOp::USub,
    }
}

fn compare_op(op: &py::CmpOp) -> CompareOp {
    match op {
        py::CmpOp::Eq => CompareOp::Eq,
        py::CmpOp::NotEq => CompareOp::NotEq,
        py::CmpOp::Lt => CompareOp::Lt,
        py::CmpOp::LtE => CompareOp::LtE,
        py::CmpOp::Gt => CompareOp::Gt,
        py::CmpOp::GtE => CompareOp::GtE,
        py::CmpOp::Is => CompareOp::Is,
        py::CmpOp::IsNot => CompareOp::IsNot,
        py::CmpOp::In => CompareOp::In,
        py::CmpOp::NotIn => CompareOp::NotIn,
    }
}

fn constant(value: &py::Constant) -> Constant {
    match value {
        py::Constant::None => Constant::None,
        py::Constant::Bool(b) => Constant::Bool(*b),
        py::Constant::Str(s) => Constant::Str(s.clone()),
        py::Constant::Bytes(b) => Constant::Bytes(b.clone()),
        py::Constant::Int(i) => Constant::Int(i.to_i64()),
        py::Constant::Tuple(items) => Constant::Tuple(items.iter().map(constant).collect()),
        py::Constant::Float(f) => Constant::Float(*f),
        py::Constant::Complex { .. } => Constant::Complex,
        py::Constant::Ellipsis => Constant::Ellipsis,
    }
}

impl Lowering {
    fn alloc(&mut self, kind: NodeKind, range: TextRange) -> NodeId {
        self.builder.alloc(kind, span(range))
    }

    fn stmts(&mut self, body: &[py::Stmt]) -> Vec<NodeId> {
        body.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn exprs(&mut self, exprs: &[py::Expr]) -> Vec<NodeId> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn opt_expr(&mut self, expr: &Option<Box<py::Expr>>) -> Option<NodeId> {
        expr.as_deref().map(|expr| self.expr(expr))
    }

    fn params(&mut self, args: &py::Arguments) -> Vec<NodeId> {
        let mut params = Vec::new();
        for arg in &args.posonlyargs {
            params.push(self.param_with_default(arg, ParamKind::PositionalOnly));
        }
        for arg in &args.args {
            params.push(self.param_with_default(arg, ParamKind::Normal));
        }
        if let Some(arg) = &args.vararg {
            params.push(self.param(arg, ParamKind::VarArgs, None));
        }
        for arg in &args.kwonlyargs {
            params.push(self.param_with_default(arg, ParamKind::KeywordOnly));
        }
        if let Some(arg) = &args.kwarg {
            params.push(self.param(arg, ParamKind::VarKeywords, None));
        }
        params
    }

    fn param_with_default(&mut self, arg: &py::ArgWithDefault, kind: ParamKind) -> NodeId {
        let default = self.opt_expr(&arg.default);
        self.param(&arg.def, kind, default)
    }

    fn param(&mut self, arg: &py::Arg, kind: ParamKind, default: Option<NodeId>) -> NodeId {
        let annotation = self.opt_expr(&arg.annotation);
        self.alloc(
            NodeKind::Param {
                name: arg.arg.to_string(),
                kind,
                annotation,
                default,
            },
            arg.range,
        )
    }

    fn aliases(&mut self, names: &[py::Alias]) -> Vec<NodeId> {
        names
            .iter()
            .map(|alias| {
                self.alloc(
                    NodeKind::Alias {
                        name: alias.name.to_string(),
                        asname: alias.asname.as_ref().map(|n| n.to_string()),
                    },
                    alias.range,
                )
            })
            .collect()
    }

    fn with_items(&mut self, items: &[py::WithItem]) -> Vec<NodeId> {
        items
            .iter()
            .map(|item| {
                let context = self.expr(&item.context_expr);
                let target = self.opt_expr(&item.optional_vars);
                let start = item.context_expr.range().start();
                let end = item
                    .optional_vars
                    .as_ref()
                    .map(|vars| vars.range().end())
                    .unwrap_or_else(|| item.context_expr.range().end());
                self.alloc(NodeKind::WithItem { context, target }, TextRange::new(start, end))
            })
            .collect()
    }

    fn handlers(&mut self, handlers: &[py::ExceptHandler]) -> Vec<NodeId> {
        handlers
            .iter()
            .map(|handler| {
                let py::ExceptHandler::ExceptHandler(h) = handler;
                let type_ = self.opt_expr(&h.type_);
                let body = self.stmts(&h.body);
                self.alloc(
                    NodeKind::ExceptHandler {
                        type_,
                        name: h.name.as_ref().map(|n| n.to_string()),
                        body,
                    },
                    h.range,
                )
            })
            .collect()
    }

    fn keywords(&mut self, keywords: &[py::Keyword]) -> Vec<NodeId> {
        keywords
            .iter()
            .map(|keyword| {
                let value = self.expr(&keyword.value);
                self.alloc(
                    NodeKind::Keyword {
                        arg: keyword.arg.as_ref().map(|a| a.to_string()),
                        value,
                    },
                    keyword.range,
                )
            })
            .collect()
    }

    fn generators(&mut self, generators: &[py::Comprehension]) -> Vec<NodeId> {
        generators
            .iter()
            .map(|generator| {
                let target = self.expr(&generator.target);
                let iter = self.expr(&generator.iter);
                let ifs = self.exprs(&generator.ifs);
                let end = generator
                    .ifs
                    .last()
                    .map(|cond| cond.range().end())
                    .unwrap_or_else(|| generator.iter.range().end());
                self.alloc(
                    NodeKind::Comprehension {
                        target,
                        iter,
                        ifs,
                        is_async: generator.is_async,
                    },
                    TextRange::new(generator.target.range().start(), end),
                )
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn function(
        &mut self,
        name: &py::Identifier,
        args: &py::Arguments,
        body: &[py::Stmt],
        decorators: &[py::Expr],
        returns: &Option<Box<py::Expr>>,
        is_async: bool,
        range: TextRange,
    ) -> NodeId {
        let decorators = self.exprs(decorators);
        let params = self.params(args);
        let returns = self.opt_expr(returns);
        let body = self.stmts(body);
        self.alloc(
            NodeKind::FunctionDef {
                name: name.to_string(),
                is_async,
                decorators,
                params,
                returns,
                body,
            },
            range,
        )
    }

    fn match_case(&mut self, case: &py::MatchCase) -> NodeId {
        let mut captures = Vec::new();
        self.captures(&case.pattern, true, &mut captures);
        let guard = self.opt_expr(&case.guard);
        let body = self.stmts(&case.body);
        let end = case
            .body
            .last()
            .map(|stmt| stmt.range().end())
            .unwrap_or_else(|| case.pattern.range().end());
        self.alloc(
            NodeKind::MatchCase { captures, guard, body },
            TextRange::new(case.pattern.range().start(), end),
        )
    }

    fn capture(&mut self, name: &py::Identifier, class: Option<&py::Expr>, whole: bool, range: TextRange) -> NodeId {
        let class = class.map(|cls| self.expr(cls));
        self.alloc(
            NodeKind::Capture {
                name: name.to_string(),
                class,
                whole,
            },
            range,
        )
    }

    fn captures(&mut self, pattern: &py::Pattern, whole: bool, out: &mut Vec<NodeId>) {
        match pattern {
            py::Pattern::MatchValue(_) | py::Pattern::MatchSingleton(_) => {}
            py::Pattern::MatchAs(p) => {
                if let Some(inner) = &p.pattern {
                    self.captures(inner, false, out);
                }
                if let Some(name) = &p.name {
                    let class = match p.pattern.as_deref() {
                        Some(py::Pattern::MatchClass(cls)) => Some(&*cls.cls),
                        _ => None,
                    };
                    let id = self.capture(name, class, whole, p.range);
                    out.push(id);
                }
            }
            py::Pattern::MatchOr(p) => {
                for inner in &p.patterns {
                    self.captures(inner, whole, out);
                }
            }
            py::Pattern::MatchSequence(p) => {
                for inner in &p.patterns {
                    self.captures(inner, false, out);
                }
            }
            py::Pattern::MatchMapping(p) => {
                for inner in &p.patterns {
                    self.captures(inner, false, out);
                }
                if let Some(rest) = &p.rest {
                    let id = self.capture(rest, None, false, p.range);
                    out.push(id);
                }
            }
            py::Pattern::MatchClass(p) => {
                for inner in p.patterns.iter().chain(&p.kwd_patterns) {
                    self.captures(inner, false, out);
                }
            }
            py::Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    let id = self.capture(name, None, false, p.range);
                    out.push(id);
                }
            }
        }
    }

    fn stmt(&mut self, stmt: &py::Stmt) -> NodeId {
        let range = stmt.range();
        let kind = match stmt {
            py::Stmt::FunctionDef(f) => {
                return self.function(&f.name, &f.args, &f.body, &f.decorator_list, &f.returns, false, range)
            }
            py::Stmt::AsyncFunctionDef(f) => {
                return self.function(&f.name, &f.args, &f.body, &f.decorator_list, &f.returns, true, range)
            }
            py::Stmt::ClassDef(c) => NodeKind::ClassDef {
                name: c.name.to_string(),
                decorators: self.exprs(&c.decorator_list),
                bases: self.exprs(&c.bases),
                keywords: self.keywords(&c.keywords),
                body: self.stmts(&c.body),
            },
            py::Stmt::Return(r) => NodeKind::Return {
                value: self.opt_expr(&r.value),
            },
            py::Stmt::Delete(d) => NodeKind::Delete {
                targets: self.exprs(&d.targets),
            },
            py::Stmt::Assign(a) => NodeKind::Assign {
                targets: self.exprs(&a.targets),
                value: self.expr(&a.value),
            },
            py::Stmt::AugAssign(a) => NodeKind::AugAssign {
                target: self.expr(&a.target),
                op: binary_op(&a.op),
                value: self.expr(&a.value),
            },
            py::Stmt::AnnAssign(a) => NodeKind::AnnAssign {
                target: self.expr(&a.target),
                annotation: self.expr(&a.annotation),
                value: self.opt_expr(&a.value),
            },
            py::Stmt::For(f) => NodeKind::For {
                target: self.expr(&f.target),
                iter: self.expr(&f.iter),
                body: self.stmts(&f.body),
                orelse: self.stmts(&f.orelse),
                is_async: false,
            },
            py::Stmt::AsyncFor(f) => NodeKind::For {
                target: self.expr(&f.target),
                iter: self.expr(&f.iter),
                body: self.stmts(&f.body),
                orelse: self.stmts(&f.orelse),
                is_async: true,
            },
            py::Stmt::While(w) => NodeKind::While {
                test: self.expr(&w.test),
                body: self.stmts(&w.body),
                orelse: self.stmts(&w.orelse),
            },
            py::Stmt::If(i) => NodeKind::If {
                test: self.expr(&i.test),
                body: self.stmts(&i.body),
                orelse: self.stmts(&i.orelse),
            },
            py::Stmt::With(w) => NodeKind::With {
                items: self.with_items(&w.items),
                body: self.stmts(&w.body),
                is_async: false,
            },
            py::Stmt::AsyncWith(w) => NodeKind::With {
                items: self.with_items(&w.items),
                body: self.stmts(&w.body),
                is_async: true,
            },
            py::Stmt::Match(m) => NodeKind::Match {
                subject: self.expr(&m.subject),
                cases: m.cases.iter().map(|case| self.match_case(case)).collect(),
            },
            py::Stmt::Raise(r) => NodeKind::Raise {
                exc: self.opt_expr(&r.exc),
                cause: self.opt_expr(&r.cause),
            },
            py::Stmt::Try(t) => NodeKind::Try {
                body: self.stmts(&t.body),
                handlers: self.handlers(&t.handlers),
                orelse: self.stmts(&t.orelse),
                finalbody: self.stmts(&t.finalbody),
            },
            py::Stmt::TryStar(t) => NodeKind::Try {
                body: self.stmts(&t.body),
                handlers: self.handlers(&t.handlers),
                orelse: self.stmts(&t.orelse),
                finalbody: self.stmts(&t.finalbody),
            },
            py::Stmt::Assert(a) => NodeKind::Assert {
                test: self.expr(&a.test),
                msg: self.opt_expr(&a.msg),
            },
            py::Stmt::Import(i) => NodeKind::Import {
                names: self.aliases(&i.names),
            },
            py::Stmt::ImportFrom(i) => NodeKind::ImportFrom {
                module: i.module.as_ref().map(|m| m.to_string()),
                level: i.level.as_ref().map(|l| l.to_u32()).unwrap_or(0),
                names: self.aliases(&i.names),
            },
            py::Stmt::Global(g) => NodeKind::Global {
                names: g.names.iter().map(|n| n.to_string()).collect(),
            },
            py::Stmt::Nonlocal(n) => NodeKind::Nonlocal {
                names: n.names.iter().map(|n| n.to_string()).collect(),
            },
            py::Stmt::Expr(e) => NodeKind::ExprStmt {
                value: self.expr(&e.value),
            },
            py::Stmt::Pass(_) => NodeKind::Pass,
            py::Stmt::Break(_) => NodeKind::Break,
            py::Stmt::Continue(_) => NodeKind::Continue,
            #[allow(unreachable_patterns)]
            _ => NodeKind::Unsupported {
                what: "statement".to_string(),
            },
        };
        self.alloc(kind, range)
    }

    fn expr(&mut self, expr: &py::Expr) -> NodeId {
        let range = expr.range();
        let kind = match expr {
            py::Expr::BoolOp(b) => NodeKind::BoolOp {
                op: match b.op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                },
                values: self.exprs(&b.values),
            },
            py::Expr::NamedExpr(n) => NodeKind::NamedExpr {
                target: self.expr(&n.target),
                value: self.expr(&n.value),
            },
            py::Expr::BinOp(b) => NodeKind::BinOp {
                left: self.expr(&b.left),
                op: binary_op(&b.op),
                right: self.expr(&b.right),
            },
            py::Expr::UnaryOp(u) => NodeKind::UnaryOp {
                op: unary_op(&u.op),
                operand: self.expr(&u.operand),
            },
            py::Expr::Lambda(l) => NodeKind::Lambda {
                params: self.params(&l.args),
                body: self.expr(&l.body),
            },
            py::Expr::IfExp(i) => {
                let body = self.expr(&i.body);
                let test = self.expr(&i.test);
                let orelse = self.expr(&i.orelse);
                NodeKind::IfExp { test, body, orelse }
            }
            py::Expr::Dict(d) => {
                let mut keys = Vec::with_capacity(d.keys.len());
                let mut values = Vec::with_capacity(d.values.len());
                for (key, value) in d.keys.iter().zip(&d.values) {
                    keys.push(key.as_ref().map(|k| self.expr(k)));
                    values.push(self.expr(value));
                }
                NodeKind::Dict { keys, values }
            }
            py::Expr::Set(s) => NodeKind::Set {
                elts: self.exprs(&s.elts),
            },
            py::Expr::ListComp(c) => {
                let generators = self.generators(&c.generators);
                NodeKind::ListComp {
                    elt: self.expr(&c.elt),
                    generators,
                }
            }
            py::Expr::SetComp(c) => {
                let generators = self.generators(&c.generators);
                NodeKind::SetComp {
                    elt: self.expr(&c.elt),
                    generators,
                }
            }
            py::Expr::GeneratorExp(c) => {
                let generators = self.generators(&c.generators);
                NodeKind::GeneratorExp {
                    elt: self.expr(&c.elt),
                    generators,
                }
            }
            py::Expr::DictComp(c) => {
                let generators = self.generators(&c.generators);
                NodeKind::DictComp {
                    key: self.expr(&c.key),
                    value: self.expr(&c.value),
                    generators,
                }
            }
            py::Expr::Await(a) => NodeKind::Await {
                value: self.expr(&a.value),
            },
            py::Expr::Yield(y) => NodeKind::Yield {
                value: self.opt_expr(&y.value),
            },
            py::Expr::YieldFrom(y) => NodeKind::YieldFrom {
                value: self.expr(&y.value),
            },
            py::Expr::Compare(c) => NodeKind::Compare {
                left: self.expr(&c.left),
                ops: c.ops.iter().map(compare_op).collect(),
                comparators: self.exprs(&c.comparators),
            },
            py::Expr::Call(c) => NodeKind::Call {
                func: self.expr(&c.func),
                args: self.exprs(&c.args),
                keywords: self.keywords(&c.keywords),
            },
            py::Expr::FormattedValue(f) => NodeKind::FormattedValue {
                value: self.expr(&f.value),
            },
            py::Expr::JoinedStr(j) => NodeKind::JoinedStr {
                values: self.exprs(&j.values),
            },
            py::Expr::Constant(c) => NodeKind::Constant(constant(&c.value)),
            py::Expr::Attribute(a) => NodeKind::Attribute {
                value: self.expr(&a.value),
                attr: a.attr.to_string(),
                ctx: ctx(&a.ctx),
            },
            py::Expr::Subscript(s) => NodeKind::Subscript {
                value: self.expr(&s.value),
                slice: self.expr(&s.slice),
                ctx: ctx(&s.ctx),
            },
            py::Expr::Starred(s) => NodeKind::Starred {
                value: self.expr(&s.value),
                ctx: ctx(&s.ctx),
            },
            py::Expr::Name(n) => NodeKind::Name {
                id: n.id.to_string(),
                ctx: ctx(&n.ctx),
            },
            py::Expr::List(l) => NodeKind::List {
                elts: self.exprs(&l.elts),
                ctx: ctx(&l.ctx),
            },
            py::Expr::Tuple(t) => NodeKind::Tuple {
                elts: self.exprs(&t.elts),
                ctx: ctx(&t.ctx),
            },
            py::Expr::Slice(s) => NodeKind::Slice {
                lower: self.opt_expr(&s.lower),
                upper: self.opt_expr(&s.upper),
                step: self.opt_expr(&s.step),
            },
        };
        self.alloc(kind, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpython_parser::{parse, Mode};

    fn lower(source: &str) -> SyntaxTree {
        let module = parse(source, Mode::Module, "<test>").unwrap();
        lower_module(&module, source, None, false)
    }

    #[test]
    fn test_lower_function_params() {
        let tree = lower("def f(a, /, b=1, *args, c, **kw):\n    return a\n");
        let defs = tree.find_definitions("f");
        assert_eq!(defs.len(), 1);
        let NodeKind::FunctionDef { params, body, .. } = tree.kind(defs[0]) else {
            panic!("expected function");
        };
        let kinds: Vec<_> = params
            .iter()
            .map(|&p| match tree.kind(p) {
                NodeKind::Param { name, kind, .. } => (name.clone(), *kind),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a".to_string(), ParamKind::PositionalOnly),
                ("b".to_string(), ParamKind::Normal),
                ("args".to_string(), ParamKind::VarArgs),
                ("c".to_string(), ParamKind::KeywordOnly),
                ("kw".to_string(), ParamKind::VarKeywords),
            ]
        );
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_lower_spans_and_parents() {
        let source = "x = foo(1)\n";
        let tree = lower(source);
        let foo = tree.find_names("foo")[0];
        assert_eq!(tree.text(foo), "foo");
        let call = tree.parent(foo).unwrap();
        assert!(matches!(tree.kind(call), NodeKind::Call { .. }));
        assert_eq!(tree.text(call), "foo(1)");
        assert_eq!(tree.location(call).line, 1);
    }

    #[test]
    fn test_lower_relative_import() {
        let tree = lower("from ..pkg import a as b\n");
        let root = tree.root();
        let NodeKind::Module { body } = tree.kind(root) else { unreachable!() };
        match tree.kind(body[0]) {
            NodeKind::ImportFrom { module, level, names } => {
                assert_eq!(module.as_deref(), Some("pkg"));
                assert_eq!(*level, 2);
                assert_eq!(tree.declared_name(names[0]), Some("b"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lower_match_captures() {
        let tree = lower("match p:\n    case int() as n:\n        pass\n    case [a, *rest]:\n        pass\n");
        let captures: Vec<_> = tree
            .descendants(tree.root())
            .filter_map(|id| match tree.kind(id) {
                NodeKind::Capture { name, class, whole } => Some((name.clone(), class.is_some(), *whole)),
                _ => None,
            })
            .collect();
        assert_eq!(
            captures,
            vec![
                ("n".to_string(), true, true),
                ("a".to_string(), false, false),
                ("rest".to_string(), false, false),
            ]
        );
    }

    #[test]
    fn test_large_int_literal() {
        let tree = lower("x = 123456789012345678901234567890\n");
        let has_overflowed = tree
            .descendants(tree.root())
            .any(|id| matches!(tree.kind(id), NodeKind::Constant(Constant::Int(None))));
        assert!(has_overflowed);
    }
}
