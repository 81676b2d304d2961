use std::borrow::BorrowMut;

use pest::Parser as _;
use pest_derive::Parser;

use crate::ast::{ArithOp, CmpOp, Expr, Formula, Identifier, ProjEntry, Query};
use crate::errors::{Error, Result};
use crate::value::Value;

#[derive(Parser)]
#[grammar = "relcalc.pest"]
struct Parser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

/// Parse a full tuple-calculus query `{ target | condition }`.
///
/// The braces and the first `|` are checked up front so the two malformations
/// get their own messages; everything after the first `|` (further `|`
/// included) is the condition.
pub fn parse_query(text: &str) -> Result<Query> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return Err(Error::QueryFormat(
            "query must be enclosed in braces { }".to_string(),
        ));
    }

    let content = trimmed[1..trimmed.len() - 1].trim();
    let (target, condition) = content.split_once('|').ok_or_else(|| {
        Error::QueryFormat(
            "query must have the form { target | condition }".to_string(),
        )
    })?;

    Ok(Query {
        projection: parse_target(target),
        condition: parse_condition(condition)?,
    })
}

/// A target containing `,` or `.` is an explicit projection list of
/// `var.attr` / `attr` entries; anything else (a bare variable) means the
/// whole bound tuple or combination is returned.
fn parse_target(target: &str) -> Option<Vec<ProjEntry>> {
    let target = target.trim();
    if !target.contains(',') && !target.contains('.') {
        return None;
    }

    let entries = target
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            match entry.split_once('.') {
                Some((var, attr)) => ProjEntry {
                    var: Some(var.trim().to_string()),
                    attr: attr.trim().to_string(),
                },
                None => ProjEntry {
                    var: None,
                    attr: entry.to_string(),
                },
            }
        })
        .collect();

    Some(entries)
}

/// Parse a condition formula on its own.
pub fn parse_condition(text: &str) -> Result<Formula> {
    let formula = Parser::parse(Rule::formula, text)
        .map_err(|e| Error::QueryFormat(format!("condition syntax error: {}", e)))?
        .next()
        .unwrap();

    let or_expr = expect_next_rule(formula.into_inner(), Rule::or_expr);
    Ok(convert_or(or_expr))
}

/// Selection predicates share the condition grammar; their free identifiers
/// are attribute names of the row under test.
pub fn parse_predicate(text: &str) -> Result<Formula> {
    parse_condition(text)
}

fn expect_next_rule<'a, P: BorrowMut<Pairs<'a>>>(mut pairs: P, rule: Rule) -> Pair<'a> {
    let pair = pairs.borrow_mut().next().expect("missing pair");
    assert_eq!(pair.as_rule(), rule);
    pair
}

fn convert_identifier(pair: Pair) -> Identifier {
    assert_eq!(pair.as_rule(), Rule::identifier);
    pair.as_str().to_string()
}

fn expect_identifier<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> Identifier {
    convert_identifier(expect_next_rule(pairs, Rule::identifier))
}

fn convert_or(pair: Pair) -> Formula {
    let mut parts: Vec<Formula> = pair
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::or_op)
        .map(convert_and)
        .collect();

    if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Formula::Or(parts)
    }
}

fn convert_and(pair: Pair) -> Formula {
    let mut parts: Vec<Formula> = pair
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::and_op)
        .map(convert_unary)
        .collect();

    if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Formula::And(parts)
    }
}

fn convert_unary(pair: Pair) -> Formula {
    let mut pairs = pair.into_inner();
    let first = pairs.next().expect("missing pair");

    match first.as_rule() {
        Rule::not_op => Formula::Not(Box::new(convert_unary(pairs.next().expect("missing pair")))),
        Rule::quantified => convert_quantified(first),
        Rule::primary => convert_primary(first),
        _ => unreachable!(),
    }
}

fn convert_quantified(pair: Pair) -> Formula {
    let mut pairs = pair.into_inner();
    let op = expect_next_rule(&mut pairs, Rule::quant_op);
    let var = expect_identifier(&mut pairs);
    let body = convert_or(expect_next_rule(&mut pairs, Rule::or_expr));

    match op.as_str() {
        "∃" => Formula::Exists(var, Box::new(body)),
        "∀" => Formula::ForAll(var, Box::new(body)),
        _ => unreachable!(),
    }
}

fn convert_primary(pair: Pair) -> Formula {
    let inner = pair.into_inner().next().expect("missing pair");

    match inner.as_rule() {
        Rule::member_of => {
            let mut pairs = inner.into_inner();
            let var = expect_identifier(&mut pairs);
            let table = expect_identifier(&mut pairs);
            Formula::Membership { var, table }
        }

        Rule::table_ref => {
            let mut pairs = inner.into_inner();
            let table = expect_identifier(&mut pairs);
            let var = expect_identifier(&mut pairs);
            Formula::Membership { var, table }
        }

        Rule::comparison => {
            let mut pairs = inner.into_inner();
            let lhs = convert_expr(expect_next_rule(&mut pairs, Rule::expr));
            let op = convert_cmp_op(expect_next_rule(&mut pairs, Rule::cmp_op));
            let rhs = convert_expr(expect_next_rule(&mut pairs, Rule::expr));
            Formula::Compare { lhs, op, rhs }
        }

        Rule::or_expr => convert_or(inner),

        Rule::expr => Formula::Atom(convert_expr(inner)),

        _ => unreachable!(),
    }
}

fn convert_cmp_op(pair: Pair) -> CmpOp {
    match pair.as_str() {
        "=" | "==" => CmpOp::Eq,
        "≠" | "!=" => CmpOp::Ne,
        "<" => CmpOp::Lt,
        "≤" | "<=" => CmpOp::Le,
        ">" => CmpOp::Gt,
        "≥" | ">=" => CmpOp::Ge,
        _ => unreachable!(),
    }
}

fn convert_arith_op(pair: Pair) -> ArithOp {
    match pair.as_str() {
        "+" => ArithOp::Add,
        "-" => ArithOp::Sub,
        "*" => ArithOp::Mul,
        "/" => ArithOp::Div,
        "%" => ArithOp::Rem,
        _ => unreachable!(),
    }
}

fn convert_expr(pair: Pair) -> Expr {
    let mut pairs = pair.into_inner();
    let mut acc = convert_term(pairs.next().expect("missing pair"));

    while let Some(op) = pairs.next() {
        let rhs = convert_term(pairs.next().expect("missing pair"));
        acc = Expr::Binary {
            lhs: Box::new(acc),
            op: convert_arith_op(op),
            rhs: Box::new(rhs),
        };
    }

    acc
}

fn convert_term(pair: Pair) -> Expr {
    let mut pairs = pair.into_inner();
    let mut acc = convert_factor(pairs.next().expect("missing pair"));

    while let Some(op) = pairs.next() {
        let rhs = convert_factor(pairs.next().expect("missing pair"));
        acc = Expr::Binary {
            lhs: Box::new(acc),
            op: convert_arith_op(op),
            rhs: Box::new(rhs),
        };
    }

    acc
}

fn convert_factor(pair: Pair) -> Expr {
    let inner = pair.into_inner().next().expect("missing pair");

    match inner.as_rule() {
        Rule::number => {
            let n = inner.as_str().parse().expect("number literal");
            Expr::Literal(Value::Number(n))
        }

        Rule::string => {
            let interior = inner.into_inner().next().expect("missing pair");
            Expr::Literal(Value::Text(interior.as_str().to_string()))
        }

        Rule::boolean => Expr::Literal(Value::Bool(inner.as_str() == "true")),

        Rule::null => Expr::Literal(Value::Null),

        Rule::attr_ref => {
            let mut pairs = inner.into_inner();
            let var = expect_identifier(&mut pairs);
            let attr = expect_identifier(&mut pairs);
            Expr::Attr { var, attr }
        }

        Rule::identifier => Expr::Ident(convert_identifier(inner)),

        Rule::expr => convert_expr(inner),

        _ => unreachable!(),
    }
}
