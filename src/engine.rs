use indexmap::IndexMap;
use itertools::Itertools;
use tracing::debug;

use crate::ast::{ArithOp, CmpOp, Expr, Formula, ProjEntry, Query, TableName, VarName};
use crate::errors::{Error, EvalError, Result};
use crate::parser;
use crate::value::{Table, Tuple, Value};

/// Named tables for one query. Built by the caller, immutable during
/// evaluation, discarded after. Insertion order drives the "available
/// tables" listing in errors.
pub type TableStore = IndexMap<String, Table>;

/// Ceiling on the work a single query may do. The cross product of the
/// bound tables grows multiplicatively, so a pathological multi-variable
/// query is rejected up front instead of hanging.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_combinations: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_combinations: 1_000_000,
        }
    }
}

/// The outcome of evaluating a condition for one candidate. A candidate
/// whose condition could not be evaluated is excluded (`matched: false`)
/// with the first failure kept as a diagnostic; it never aborts the query.
#[derive(Clone, Debug)]
pub struct Verdict {
    pub matched: bool,
    pub diagnostic: Option<EvalError>,
}

impl Verdict {
    fn hit() -> Self {
        Verdict {
            matched: true,
            diagnostic: None,
        }
    }

    fn skip(diagnostic: EvalError) -> Self {
        Verdict {
            matched: false,
            diagnostic: Some(diagnostic),
        }
    }

    fn invert(self) -> Self {
        Verdict {
            matched: !self.matched,
            ..self
        }
    }
}

/// Tuple-calculus query engine over a transient table store. A plain value
/// constructed per invocation; holds no state beyond the store and limits.
pub struct Engine {
    tables: TableStore,
    limits: Limits,
}

impl Engine {
    pub fn new(tables: TableStore) -> Self {
        Self::with_limits(tables, Limits::default())
    }

    pub fn with_limits(tables: TableStore, limits: Limits) -> Self {
        Self { tables, limits }
    }

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    /// Parse and evaluate `{ target | condition }` against the store.
    pub fn execute(&self, text: &str) -> Result<Vec<Tuple>> {
        let query = parser::parse_query(text)?;
        self.run(&query)
    }

    pub fn run(&self, query: &Query) -> Result<Vec<Tuple>> {
        let bindings = self.resolve_bindings(&query.condition)?;
        debug!(?bindings, "resolved variable bindings");

        let mut combinations: u128 = 1;
        for table_name in bindings.values() {
            let len = self.tables[table_name].len() as u128;
            combinations = combinations
                .checked_mul(len)
                .unwrap_or(u128::MAX);
        }
        if combinations > u128::from(self.limits.max_combinations) {
            return Err(Error::ResourceLimit {
                combinations,
                limit: self.limits.max_combinations,
            });
        }

        let evaluator = Evaluator {
            store: Some(&self.tables),
        };
        let spec = query.projection.as_deref();

        if bindings.len() == 1 {
            let (var, table_name) = bindings
                .get_index(0)
                .expect("resolve_bindings returns at least one binding");
            let table = &self.tables[table_name];
            let mut out = Vec::new();
            for tuple in table {
                let ctx = EvalContext::new().bind(var, tuple);
                let verdict = evaluator.eval_formula(&query.condition, &ctx);
                if !verdict.matched {
                    if let Some(diag) = &verdict.diagnostic {
                        debug!(%diag, "tuple excluded");
                    }
                    continue;
                }
                out.push(project_single(tuple, spec));
            }
            debug!(rows = out.len(), "single-variable query finished");
            return Ok(out);
        }

        let vars: Vec<&str> = bindings.keys().map(String::as_str).collect();
        let tables: Vec<&[Tuple]> = bindings
            .values()
            .map(|name| self.tables[name].as_slice())
            .collect();

        let combos = combine(&tables);
        debug!(combinations = combos.len(), "enumerating combinations");

        let mut out = Vec::new();
        for combo in &combos {
            let mut ctx = EvalContext::new();
            for (var, tuple) in vars.iter().zip(combo) {
                ctx = ctx.bind(var, tuple);
            }
            let verdict = evaluator.eval_formula(&query.condition, &ctx);
            if !verdict.matched {
                if let Some(diag) = &verdict.diagnostic {
                    debug!(%diag, "combination excluded");
                }
                continue;
            }
            out.push(project_multi(&vars, combo, spec));
        }
        debug!(rows = out.len(), "multi-variable query finished");
        Ok(out)
    }

    /// Collect the free membership atoms into a variable-to-table map, in
    /// order of appearance. Memberships under a quantifier binding the same
    /// variable belong to that quantifier and are not free. Every referenced
    /// table, quantified ones included, must exist in the store.
    fn resolve_bindings(&self, condition: &Formula) -> Result<IndexMap<VarName, TableName>> {
        let mut free = IndexMap::new();
        self.walk_bindings(condition, &mut Vec::new(), &mut free)?;
        if free.is_empty() {
            return Err(Error::NoBinding);
        }
        Ok(free)
    }

    fn walk_bindings(
        &self,
        formula: &Formula,
        bound: &mut Vec<VarName>,
        free: &mut IndexMap<VarName, TableName>,
    ) -> Result<()> {
        match formula {
            Formula::Membership { var, table } => {
                self.check_table(table)?;
                if !bound.iter().any(|b| b == var) {
                    free.insert(var.clone(), table.clone());
                }
                Ok(())
            }

            Formula::Not(inner) => self.walk_bindings(inner, bound, free),

            Formula::And(parts) | Formula::Or(parts) => {
                for part in parts {
                    self.walk_bindings(part, bound, free)?;
                }
                Ok(())
            }

            Formula::Exists(var, body) | Formula::ForAll(var, body) => {
                if find_quantified_table(var, body).is_none() {
                    return Err(Error::QuantifierFormat(format!(
                        "no table binding found for quantified variable {:?}",
                        var
                    )));
                }
                bound.push(var.clone());
                let result = self.walk_bindings(body, bound, free);
                bound.pop();
                result
            }

            Formula::Compare { .. } | Formula::Atom(_) => Ok(()),
        }
    }

    fn check_table(&self, name: &str) -> Result<()> {
        if self.tables.contains_key(name) {
            Ok(())
        } else {
            Err(Error::UnknownTable {
                name: name.to_string(),
                available: self.tables.keys().join(", "),
            })
        }
    }
}

/// Full cartesian cross product of the given tuple sequences, first-table
/// major. Zero sequences yield one empty combination; any empty sequence
/// yields no combinations at all.
pub fn combine<'a>(tables: &[&'a [Tuple]]) -> Vec<Vec<&'a Tuple>> {
    match tables.split_first() {
        None => vec![Vec::new()],
        Some((first, rest)) => {
            let tails = combine(rest);
            let mut combos = Vec::with_capacity(first.len() * tails.len());
            for tuple in *first {
                for tail in &tails {
                    let mut combo = Vec::with_capacity(1 + tail.len());
                    combo.push(tuple);
                    combo.extend_from_slice(tail);
                    combos.push(combo);
                }
            }
            combos
        }
    }
}

fn project_single(tuple: &Tuple, spec: Option<&[ProjEntry]>) -> Tuple {
    match spec {
        None => tuple.clone(),
        Some(entries) => {
            let mut out = Tuple::new();
            for entry in entries {
                if let Some(value) = tuple.get(&entry.attr) {
                    out.insert(entry.attr.clone(), value.clone());
                }
            }
            out
        }
    }
}

/// Output keys are qualified `variable.attribute` so attributes from
/// different tables never collide. Without an explicit projection the whole
/// combination is flattened; with one, only the named entries appear, in
/// spec order. Entries lacking a variable are unresolvable here and are
/// skipped.
fn project_multi(vars: &[&str], combo: &[&Tuple], spec: Option<&[ProjEntry]>) -> Tuple {
    let mut out = Tuple::new();
    match spec {
        None => {
            for (var, tuple) in vars.iter().zip(combo) {
                for (attr, value) in tuple.iter() {
                    out.insert(format!("{}.{}", var, attr), value.clone());
                }
            }
        }
        Some(entries) => {
            for entry in entries {
                let var = match &entry.var {
                    Some(var) => var,
                    None => continue,
                };
                if let Some(index) = vars.iter().position(|v| v == var) {
                    if let Some(value) = combo[index].get(&entry.attr) {
                        out.insert(format!("{}.{}", var, entry.attr), value.clone());
                    }
                }
            }
        }
    }
    out
}

/// Variable assignment for one candidate: each bound variable maps to the
/// tuple it currently denotes. `row` is the bare-identifier scope used by
/// selection predicates.
#[derive(Clone, Debug, Default)]
pub(crate) struct EvalContext<'e> {
    vars: Vec<(&'e str, &'e Tuple)>,
    row: Option<&'e Tuple>,
}

impl<'e> EvalContext<'e> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn for_row(row: &'e Tuple) -> Self {
        EvalContext {
            vars: Vec::new(),
            row: Some(row),
        }
    }

    pub(crate) fn bind(&self, var: &'e str, tuple: &'e Tuple) -> Self {
        let mut next = self.clone();
        next.vars.push((var, tuple));
        next
    }

    fn lookup(&self, var: &str) -> Option<&'e Tuple> {
        // Innermost binding wins so a quantifier can shadow an outer variable.
        self.vars
            .iter()
            .rev()
            .find(|(name, _)| *name == var)
            .map(|(_, tuple)| *tuple)
    }
}

/// Tree-walking formula evaluator. Atom-level failures become `matched:
/// false` verdicts carrying a diagnostic; they never propagate as errors.
pub(crate) struct Evaluator<'e> {
    pub(crate) store: Option<&'e TableStore>,
}

impl<'e> Evaluator<'e> {
    pub(crate) fn eval_formula(&self, formula: &'e Formula, ctx: &EvalContext<'e>) -> Verdict {
        match formula {
            Formula::Not(inner) => self.eval_formula(inner, ctx).invert(),

            Formula::And(parts) => {
                let mut diagnostic = None;
                for part in parts {
                    let verdict = self.eval_formula(part, ctx);
                    if diagnostic.is_none() {
                        diagnostic = verdict.diagnostic;
                    }
                    if !verdict.matched {
                        return Verdict {
                            matched: false,
                            diagnostic,
                        };
                    }
                }
                Verdict {
                    matched: true,
                    diagnostic,
                }
            }

            Formula::Or(parts) => {
                let mut diagnostic = None;
                for part in parts {
                    let verdict = self.eval_formula(part, ctx);
                    if diagnostic.is_none() {
                        diagnostic = verdict.diagnostic;
                    }
                    if verdict.matched {
                        return Verdict {
                            matched: true,
                            diagnostic,
                        };
                    }
                }
                Verdict {
                    matched: false,
                    diagnostic,
                }
            }

            // A membership whose variable is in context holds by
            // construction: the binding itself realizes the constraint.
            Formula::Membership { var, .. } => {
                if ctx.lookup(var).is_some() {
                    Verdict::hit()
                } else {
                    Verdict::skip(EvalError::UnboundVariable(var.clone()))
                }
            }

            Formula::Exists(var, body) => self.eval_quantifier(var, body, ctx, true),
            Formula::ForAll(var, body) => self.eval_quantifier(var, body, ctx, false),

            Formula::Compare { lhs, op, rhs } => match self.eval_compare(lhs, *op, rhs, ctx) {
                Ok(matched) => Verdict {
                    matched,
                    diagnostic: None,
                },
                Err(diag) => Verdict::skip(diag),
            },

            Formula::Atom(expr) => match self.eval_expr(expr, ctx) {
                Ok(Value::Bool(b)) => Verdict {
                    matched: b,
                    diagnostic: None,
                },
                Ok(_) => Verdict::skip(EvalError::NotBoolean),
                Err(diag) => Verdict::skip(diag),
            },
        }
    }

    /// `∃ v ( φ )` is true iff some tuple of v's table satisfies φ; `∀` iff
    /// every tuple does. An empty table therefore makes `∃` false and `∀`
    /// true.
    fn eval_quantifier(
        &self,
        var: &'e VarName,
        body: &'e Formula,
        ctx: &EvalContext<'e>,
        existential: bool,
    ) -> Verdict {
        let store = match self.store {
            Some(store) => store,
            None => return Verdict::skip(EvalError::NoStore),
        };
        let table = match find_quantified_table(var, body).and_then(|name| store.get(name)) {
            Some(table) => table,
            None => return Verdict::skip(EvalError::UnboundVariable(var.clone())),
        };

        let mut diagnostic = None;
        for tuple in table {
            let verdict = self.eval_formula(body, &ctx.bind(var, tuple));
            if diagnostic.is_none() {
                diagnostic = verdict.diagnostic;
            }
            if verdict.matched == existential {
                return Verdict {
                    matched: existential,
                    diagnostic,
                };
            }
        }
        Verdict {
            matched: !existential,
            diagnostic,
        }
    }

    fn eval_compare(
        &self,
        lhs: &'e Expr,
        op: CmpOp,
        rhs: &'e Expr,
        ctx: &EvalContext<'e>,
    ) -> Result<bool, EvalError> {
        let lhs = self.eval_expr(lhs, ctx)?;
        let rhs = self.eval_expr(rhs, ctx)?;

        // Strict equality: type and value must both match, so a text value
        // never equals a number.
        match op {
            CmpOp::Eq => return Ok(lhs == rhs),
            CmpOp::Ne => return Ok(lhs != rhs),
            _ => {}
        }

        let ordering = match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => {
                a.partial_cmp(b).ok_or(EvalError::Incomparable {
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                })?
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => {
                return Err(EvalError::Incomparable {
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                })
            }
        };

        Ok(match op {
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::Le => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            CmpOp::Ge => ordering.is_ge(),
            CmpOp::Eq | CmpOp::Ne => unreachable!(),
        })
    }

    fn eval_expr(&self, expr: &'e Expr, ctx: &EvalContext<'e>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Attr { var, attr } => {
                let tuple = ctx
                    .lookup(var)
                    .ok_or_else(|| EvalError::UnboundVariable(var.clone()))?;
                tuple
                    .get(attr)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingAttribute {
                        var: var.clone(),
                        attr: attr.clone(),
                    })
            }

            Expr::Ident(name) => match ctx.row {
                Some(row) => row
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
                None => Err(EvalError::UnknownIdentifier(name.clone())),
            },

            Expr::Binary { lhs, op, rhs } => {
                let lhs = self.eval_expr(lhs, ctx)?;
                let rhs = self.eval_expr(rhs, ctx)?;
                let (a, b) = match (lhs.as_number(), rhs.as_number()) {
                    (Some(a), Some(b)) => (a, b),
                    (None, _) => return Err(EvalError::NonNumeric(lhs.type_name())),
                    (_, None) => return Err(EvalError::NonNumeric(rhs.type_name())),
                };
                let result = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div | ArithOp::Rem if b == 0.0 => {
                        return Err(EvalError::DivisionByZero)
                    }
                    ArithOp::Div => a / b,
                    ArithOp::Rem => a % b,
                };
                Ok(Value::Number(result))
            }
        }
    }
}

/// The table a quantified variable ranges over: the first `var ∈ TABLE`
/// membership inside the body, not crossing a nested quantifier that
/// rebinds the same variable.
fn find_quantified_table<'f>(var: &str, formula: &'f Formula) -> Option<&'f str> {
    match formula {
        Formula::Membership { var: v, table } if v == var => Some(table),
        Formula::Membership { .. } => None,

        Formula::Not(inner) => find_quantified_table(var, inner),

        Formula::And(parts) | Formula::Or(parts) => parts
            .iter()
            .find_map(|part| find_quantified_table(var, part)),

        Formula::Exists(v, body) | Formula::ForAll(v, body) => {
            if v == var {
                None
            } else {
                find_quantified_table(var, body)
            }
        }

        Formula::Compare { .. } | Formula::Atom(_) => None,
    }
}
