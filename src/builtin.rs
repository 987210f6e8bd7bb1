//! Builtin functors callable from rule bodies and heads.
//!
//! Each engine owns a [`BuiltinRegistry`]; there is no global table. Body
//! calls act as guards (and may bind output arguments); head calls are
//! actions run when the rule fires.

use crate::context::RuleContext;
use crate::error::BuiltinError;
use crate::rule::{ClauseEntry, Functor};
use crate::term::{format_term, Number, TermId};
use crate::trace::info;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub trait Builtin: Send + Sync {
    fn name(&self) -> &str;

    /// Required argument count, or `None` if variadic.
    fn arity(&self) -> Option<usize> {
        None
    }

    /// False for actions that can remove facts. Rules using them go through
    /// the forward engine's conflict set.
    fn is_monotonic(&self) -> bool {
        true
    }

    fn body_call(&self, _args: &[TermId], _ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        Err(BuiltinError::Unsupported {
            name: self.name().to_string(),
            position: "body",
        })
    }

    fn head_action(&self, _args: &[TermId], _ctx: &mut dyn RuleContext) -> Result<(), BuiltinError> {
        Err(BuiltinError::Unsupported {
            name: self.name().to_string(),
            position: "head",
        })
    }
}

#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    builtins: FxHashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every standard builtin.
    pub fn standard() -> Self {
        let mut reg = Self::empty();
        reg.register(Equality { name: "equal", negate: false });
        reg.register(Equality { name: "notEqual", negate: true });
        reg.register(Compare { name: "lessThan", accept: |o| o == Ordering::Less });
        reg.register(Compare { name: "greaterThan", accept: |o| o == Ordering::Greater });
        reg.register(Compare { name: "le", accept: |o| o != Ordering::Greater });
        reg.register(Compare { name: "ge", accept: |o| o != Ordering::Less });
        reg.register(Arithmetic { name: "sum", op: ArithOp::Add });
        reg.register(Arithmetic { name: "difference", op: ArithOp::Sub });
        reg.register(Arithmetic { name: "product", op: ArithOp::Mul });
        reg.register(Arithmetic { name: "quotient", op: ArithOp::Div });
        reg.register(NodeKind { name: "isLiteral", kind: Kind::Literal, negate: false });
        reg.register(NodeKind { name: "notLiteral", kind: Kind::Literal, negate: true });
        reg.register(NodeKind { name: "isBNode", kind: Kind::Blank, negate: false });
        reg.register(NodeKind { name: "notBNode", kind: Kind::Blank, negate: true });
        reg.register(Boundness { name: "bound", want_bound: true });
        reg.register(Boundness { name: "unbound", want_bound: false });
        reg.register(NoValue);
        reg.register(Print);
        reg.register(Remove { name: "remove", silent: false });
        reg.register(Remove { name: "drop", silent: true });
        reg
    }

    pub fn register(&mut self, builtin: impl Builtin + 'static) {
        self.builtins
            .insert(builtin.name().to_string(), Arc::new(builtin));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Builtin>> {
        self.builtins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Evaluate a body guard. An unregistered name fails the guard.
    pub fn call_body(&self, call: &Functor, ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        match self.get(&call.name) {
            Some(builtin) => builtin.body_call(&call.args, ctx),
            None => Ok(false),
        }
    }

    /// Run a head action. An unregistered name does nothing.
    pub fn run_action(&self, call: &Functor, ctx: &mut dyn RuleContext) -> Result<(), BuiltinError> {
        match self.get(&call.name) {
            Some(builtin) => builtin.head_action(&call.args, ctx),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.builtins.keys().collect();
        names.sort();
        f.debug_struct("BuiltinRegistry").field("builtins", &names).finish()
    }
}

fn arg_value(ctx: &dyn RuleContext, arg: TermId) -> TermId {
    ctx.env().resolve(arg, ctx.terms())
}

fn ground_arg(ctx: &dyn RuleContext, name: &str, args: &[TermId], index: usize) -> Result<TermId, BuiltinError> {
    let value = arg_value(ctx, args[index]);
    if ctx.terms().is_ground(value) {
        Ok(value)
    } else {
        Err(BuiltinError::Unbound {
            name: name.to_string(),
            index,
        })
    }
}

fn numeric_arg(ctx: &dyn RuleContext, name: &str, args: &[TermId], index: usize) -> Result<Number, BuiltinError> {
    let value = ground_arg(ctx, name, args, index)?;
    ctx.terms()
        .number_value(value)
        .ok_or_else(|| BuiltinError::NotNumeric {
            name: name.to_string(),
            index,
        })
}

/// Bind `arg` to `value` if it is an unbound variable, otherwise test that it
/// already equals `value`.
fn bind_or_check(ctx: &mut dyn RuleContext, arg: TermId, value: TermId) -> bool {
    let current = arg_value(ctx, arg);
    match ctx.terms().is_var(current) {
        Some(slot) => {
            ctx.env_mut().bind(slot, value);
            true
        }
        None => same_value(ctx, current, value),
    }
}

/// Node identity, widened to numeric equality for number literals.
fn same_value(ctx: &dyn RuleContext, a: TermId, b: TermId) -> bool {
    if a == b {
        return true;
    }
    let terms = ctx.terms();
    match (terms.number_value(a), terms.number_value(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => false,
    }
}

fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

struct Equality {
    name: &'static str,
    negate: bool,
}

impl Builtin for Equality {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let a = ground_arg(ctx, self.name, args, 0)?;
        let b = ground_arg(ctx, self.name, args, 1)?;
        Ok(same_value(ctx, a, b) != self.negate)
    }
}

/// Numeric comparison. Non-numeric arguments make the guard fail rather
/// than error.
struct Compare {
    name: &'static str,
    accept: fn(Ordering) -> bool,
}

impl Builtin for Compare {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let a = ground_arg(ctx, self.name, args, 0)?;
        let b = ground_arg(ctx, self.name, args, 1)?;
        let terms = ctx.terms();
        let ordering = match (terms.number_value(a), terms.number_value(b)) {
            (Some(x), Some(y)) => compare_numbers(x, y),
            _ => None,
        };
        Ok(ordering.map_or(false, self.accept))
    }
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// `op(a, b, c)`: binds or checks `c = a op b`.
struct Arithmetic {
    name: &'static str,
    op: ArithOp,
}

impl Arithmetic {
    fn apply(&self, a: Number, b: Number) -> Result<Number, BuiltinError> {
        use Number::{Float, Int};
        let checked = match (a, b) {
            (Int(x), Int(y)) => match self.op {
                ArithOp::Add => x.checked_add(y).map(Int),
                ArithOp::Sub => x.checked_sub(y).map(Int),
                ArithOp::Mul => x.checked_mul(y).map(Int),
                ArithOp::Div => {
                    if y == 0 {
                        return Err(BuiltinError::DivideByZero);
                    }
                    // i64::MIN / -1 overflows; the f64 path below takes it.
                    match x.checked_rem(y) {
                        Some(0) => x.checked_div(y).map(Int),
                        Some(_) => Some(Float(x as f64 / y as f64)),
                        None => None,
                    }
                }
            },
            _ => None,
        };
        if let Some(n) = checked {
            return Ok(n);
        }
        let (x, y) = (a.as_f64(), b.as_f64());
        Ok(Float(match self.op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => {
                if b.is_zero() {
                    return Err(BuiltinError::DivideByZero);
                }
                x / y
            }
        }))
    }
}

impl Builtin for Arithmetic {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Option<usize> {
        Some(3)
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let a = numeric_arg(ctx, self.name, args, 0)?;
        let b = numeric_arg(ctx, self.name, args, 1)?;
        let result = self.apply(a, b)?;
        let node = ctx.terms().number(result);
        Ok(bind_or_check(ctx, args[2], node))
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Literal,
    Blank,
}

struct NodeKind {
    name: &'static str,
    kind: Kind,
    negate: bool,
}

impl Builtin for NodeKind {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let value = ground_arg(ctx, self.name, args, 0)?;
        let is_kind = match self.kind {
            Kind::Literal => ctx.terms().is_literal(value),
            Kind::Blank => ctx.terms().is_blank(value),
        };
        Ok(is_kind != self.negate)
    }
}

struct Boundness {
    name: &'static str,
    want_bound: bool,
}

impl Builtin for Boundness {
    fn name(&self) -> &str {
        self.name
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let view: &dyn RuleContext = ctx;
        let all_bound = args
            .iter()
            .all(|&a| view.terms().is_ground(arg_value(view, a)));
        let none_bound = args
            .iter()
            .all(|&a| !view.terms().is_ground(arg_value(view, a)));
        Ok(if self.want_bound { all_bound } else { none_bound })
    }
}

/// `noValue(s, p)` / `noValue(s, p, o)`: true if no matching triple is
/// known. Unbound arguments match anything.
struct NoValue;

impl Builtin for NoValue {
    fn name(&self) -> &str {
        "noValue"
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        if !(2..=3).contains(&args.len()) {
            return Err(BuiltinError::Arity {
                name: self.name().to_string(),
                expected: 3,
                found: args.len(),
            });
        }
        let view: &dyn RuleContext = ctx;
        let key = |i: usize| -> Option<TermId> {
            let v = args.get(i).map(|&a| arg_value(view, a))?;
            view.terms().is_ground(v).then_some(v)
        };
        let (s, p, o) = (key(0), key(1), key(2));
        let found = view.find(s, p, o).next().is_some();
        Ok(!found)
    }
}

struct Print;

impl Print {
    fn render(args: &[TermId], ctx: &dyn RuleContext) -> String {
        args.iter()
            .map(|&a| format_term(arg_value(ctx, a), ctx.terms()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Builtin for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn body_call(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let line = Self::render(args, ctx);
        info!(target: "rulesys::print", "{}", line);
        Ok(true)
    }

    fn head_action(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<(), BuiltinError> {
        let line = Self::render(args, ctx);
        info!(target: "rulesys::print", "{}", line);
        Ok(())
    }
}

/// `remove(i, ...)` retracts the triples matched by the listed body clauses
/// and propagates the retraction; `drop` deletes them from storage only.
struct Remove {
    name: &'static str,
    silent: bool,
}

impl Remove {
    fn clause_triple(&self, index_arg: TermId, ctx: &dyn RuleContext) -> Result<crate::triple::Triple, BuiltinError> {
        let terms = ctx.terms();
        let index_node = ctx.env().resolve(index_arg, terms);
        let index = match terms.number_value(index_node) {
            Some(Number::Int(i)) if i >= 0 => i as usize,
            _ => {
                return Err(BuiltinError::NotNumeric {
                    name: self.name.to_string(),
                    index: 0,
                })
            }
        };
        let invalid = || BuiltinError::InvalidClauseIndex {
            name: self.name.to_string(),
            index,
        };
        let rule = ctx.rule().ok_or_else(invalid)?;
        let Some(ClauseEntry::Pattern(pattern)) = rule.body().get(index) else {
            return Err(invalid());
        };
        let pattern = pattern.offset_vars(ctx.var_offset(), terms);
        ctx.env()
            .ground_triple(&pattern, terms)
            .ok_or_else(|| BuiltinError::Unbound {
                name: self.name.to_string(),
                index,
            })
    }
}

impl Builtin for Remove {
    fn name(&self) -> &str {
        self.name
    }

    fn is_monotonic(&self) -> bool {
        false
    }

    fn head_action(&self, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<(), BuiltinError> {
        let mut targets = Vec::with_capacity(args.len());
        for &arg in args {
            targets.push(self.clause_triple(arg, ctx)?);
        }
        for triple in targets {
            if self.silent {
                ctx.silent_remove(triple);
            } else {
                ctx.stage_remove(triple);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferedContext;
    use crate::graph::FactBase;
    use crate::rule::Rule;
    use crate::subst::BindingEnv;
    use crate::term::TermStore;
    use crate::triple::{Triple, TriplePattern};
    use std::sync::Arc;

    fn call(name: &str, args: &[TermId], ctx: &mut dyn RuleContext) -> Result<bool, BuiltinError> {
        let reg = BuiltinRegistry::standard();
        reg.get(name).unwrap().body_call(args, ctx)
    }

    fn with_ctx<R>(num_vars: usize, f: impl FnOnce(&TermStore, &mut BufferedContext<'_>) -> R) -> R {
        let terms = TermStore::new();
        let mut facts = FactBase::default();
        let mut ctx = BufferedContext::new(&mut facts, &terms);
        *ctx.env_mut() = BindingEnv::new(num_vars);
        f(&terms, &mut ctx)
    }

    #[test]
    fn standard_registry_has_every_builtin() {
        let reg = BuiltinRegistry::standard();
        for name in [
            "equal", "notEqual", "lessThan", "greaterThan", "le", "ge", "sum", "difference",
            "product", "quotient", "isLiteral", "notLiteral", "isBNode", "notBNode", "bound",
            "unbound", "noValue", "print", "remove", "drop",
        ] {
            assert!(reg.contains(name), "missing builtin {name}");
        }
        assert_eq!(reg.len(), 20);
    }

    #[test]
    fn sum_binds_output() {
        with_ctx(1, |terms, ctx| {
            let args = [terms.int(2), terms.int(3), terms.var(0)];
            assert_eq!(call("sum", &args, ctx), Ok(true));
            assert_eq!(ctx.env().get(0), Some(terms.int(5)));
        });
    }

    #[test]
    fn sum_checks_bound_output() {
        with_ctx(0, |terms, ctx| {
            assert_eq!(call("sum", &[terms.int(2), terms.int(3), terms.int(5)], ctx), Ok(true));
            assert_eq!(call("sum", &[terms.int(2), terms.int(3), terms.int(6)], ctx), Ok(false));
        });
    }

    #[test]
    fn quotient_by_zero_is_error() {
        with_ctx(1, |terms, ctx| {
            let args = [terms.int(4), terms.int(0), terms.var(0)];
            assert_eq!(call("quotient", &args, ctx), Err(BuiltinError::DivideByZero));
            assert!(!ctx.env().is_bound(0));
        });
    }

    #[test]
    fn quotient_inexact_falls_back_to_float() {
        with_ctx(1, |terms, ctx| {
            let args = [terms.int(3), terms.int(2), terms.var(0)];
            assert_eq!(call("quotient", &args, ctx), Ok(true));
            assert_eq!(ctx.env().get(0), Some(terms.literal("1.5")));
        });
    }

    fn float_result(terms: &TermStore, ctx: &BufferedContext<'_>) -> f64 {
        match ctx.env().get(0).and_then(|v| terms.number_value(v)) {
            Some(Number::Float(f)) => f,
            other => panic!("expected a float result, got {other:?}"),
        }
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        let cases = [
            ("sum", i64::MAX, 1, i64::MAX as f64 + 1.0),
            ("difference", i64::MIN, 1, i64::MIN as f64 - 1.0),
            ("product", i64::MAX, 2, i64::MAX as f64 * 2.0),
            ("quotient", i64::MIN, -1, -(i64::MIN as f64)),
        ];
        for (name, a, b, expected) in cases {
            with_ctx(1, |terms, ctx| {
                let args = [terms.int(a), terms.int(b), terms.var(0)];
                assert_eq!(call(name, &args, ctx), Ok(true), "{name} should not fail on overflow");
                assert_eq!(float_result(terms, ctx), expected, "{name}");
            });
        }
    }

    #[test]
    fn exact_quotient_stays_integer() {
        with_ctx(1, |terms, ctx| {
            let args = [terms.int(i64::MIN), terms.int(1), terms.var(0)];
            assert_eq!(call("quotient", &args, ctx), Ok(true));
            assert_eq!(ctx.env().get(0), Some(terms.int(i64::MIN)));
        });
    }

    #[test]
    fn arithmetic_rejects_non_numbers() {
        with_ctx(1, |terms, ctx| {
            let args = [terms.iri("ex:a"), terms.int(1), terms.var(0)];
            assert!(matches!(
                call("product", &args, ctx),
                Err(BuiltinError::NotNumeric { index: 0, .. })
            ));
        });
    }

    #[test]
    fn unbound_input_is_error() {
        with_ctx(2, |terms, ctx| {
            let args = [terms.var(1), terms.int(1), terms.var(0)];
            assert!(matches!(
                call("difference", &args, ctx),
                Err(BuiltinError::Unbound { index: 0, .. })
            ));
        });
    }

    #[test]
    fn comparisons() {
        with_ctx(0, |terms, ctx| {
            let (one, two) = (terms.int(1), terms.literal("2.0"));
            assert_eq!(call("lessThan", &[one, two], ctx), Ok(true));
            assert_eq!(call("greaterThan", &[one, two], ctx), Ok(false));
            assert_eq!(call("le", &[one, one], ctx), Ok(true));
            assert_eq!(call("ge", &[one, two], ctx), Ok(false));
            assert_eq!(
                call("lessThan", &[terms.iri("ex:a"), two], ctx),
                Ok(false),
                "Non-numeric comparison simply fails"
            );
        });
    }

    #[test]
    fn equality_is_numeric_aware() {
        with_ctx(0, |terms, ctx| {
            assert_eq!(call("equal", &[terms.int(2), terms.literal("2.0")], ctx), Ok(true));
            assert_eq!(call("notEqual", &[terms.iri("ex:a"), terms.iri("ex:b")], ctx), Ok(true));
        });
    }

    #[test]
    fn node_kind_tests() {
        with_ctx(0, |terms, ctx| {
            assert_eq!(call("isLiteral", &[terms.literal("x")], ctx), Ok(true));
            assert_eq!(call("notLiteral", &[terms.iri("ex:x")], ctx), Ok(true));
            assert_eq!(call("isBNode", &[terms.blank("b1")], ctx), Ok(true));
            assert_eq!(call("notBNode", &[terms.blank("b1")], ctx), Ok(false));
        });
    }

    #[test]
    fn bound_and_unbound() {
        with_ctx(2, |terms, ctx| {
            ctx.env_mut().bind(0, terms.iri("ex:a"));
            assert_eq!(call("bound", &[terms.var(0)], ctx), Ok(true));
            assert_eq!(call("bound", &[terms.var(0), terms.var(1)], ctx), Ok(false));
            assert_eq!(call("unbound", &[terms.var(1)], ctx), Ok(true));
        });
    }

    #[test]
    fn no_value_consults_graph() {
        let terms = TermStore::new();
        let (a, p, b) = (terms.iri("ex:a"), terms.iri("ex:p"), terms.iri("ex:b"));
        let mut facts = FactBase::default();
        facts.base.add(Triple::new(a, p, b));
        let mut ctx = BufferedContext::new(&mut facts, &terms);
        *ctx.env_mut() = BindingEnv::new(1);
        assert_eq!(call("noValue", &[a, p], &mut ctx), Ok(false));
        assert_eq!(call("noValue", &[b, p], &mut ctx), Ok(true));
        assert_eq!(call("noValue", &[a, p, terms.var(0)], &mut ctx), Ok(false));
    }

    #[test]
    fn remove_stages_body_clause() {
        let terms = TermStore::new();
        let (a, p, b) = (terms.iri("ex:a"), terms.iri("ex:p"), terms.iri("ex:b"));
        let rule = Arc::new(Rule::forward(
            "r",
            vec![TriplePattern::new(terms.var(0), p, terms.var(1)).into()],
            vec![],
            &terms,
        ));
        let mut facts = FactBase::default();
        facts.base.add(Triple::new(a, p, b));
        let mut ctx = BufferedContext::new(&mut facts, &terms);
        ctx.begin(rule);
        ctx.env_mut().bind(0, a);
        ctx.env_mut().bind(1, b);
        let reg = BuiltinRegistry::standard();
        let remove = reg.get("remove").unwrap();
        assert!(!remove.is_monotonic());
        remove.head_action(&[terms.int(0)], &mut ctx).unwrap();
        ctx.flush();
        assert!(!ctx.contains(&Triple::new(a, p, b)));
    }

    #[test]
    fn remove_rejects_functor_clause_index() {
        let terms = TermStore::new();
        let rule = Arc::new(Rule::forward(
            "r",
            vec![crate::rule::Functor::new("print", []).into()],
            vec![],
            &terms,
        ));
        let mut facts = FactBase::default();
        let mut ctx = BufferedContext::new(&mut facts, &terms);
        ctx.begin(rule);
        let reg = BuiltinRegistry::standard();
        let err = reg
            .get("remove")
            .unwrap()
            .head_action(&[terms.int(0)], &mut ctx)
            .unwrap_err();
        assert!(matches!(err, BuiltinError::InvalidClauseIndex { index: 0, .. }));
    }

    #[test]
    fn guards_are_unsupported_in_head() {
        with_ctx(0, |terms, ctx| {
            let reg = BuiltinRegistry::standard();
            let err = reg
                .get("lessThan")
                .unwrap()
                .head_action(&[terms.int(1), terms.int(2)], ctx)
                .unwrap_err();
            assert!(matches!(err, BuiltinError::Unsupported { position: "head", .. }));
        });
    }
}
