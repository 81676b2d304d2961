use crate::value::Value;

pub type Identifier = String;
pub type TableName = Identifier;
pub type VarName = Identifier;
pub type AttrName = Identifier;

/// A parsed tuple-calculus query: `{ target | condition }`.
#[derive(Clone, Debug)]
pub struct Query {
    /// `None` when the target is a bare variable: the whole bound tuple (or
    /// combination) is returned.
    pub projection: Option<Vec<ProjEntry>>,
    pub condition: Formula,
}

/// One entry of a projection target, either `var.attr` or a bare `attr`.
/// Order determines output column order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjEntry {
    pub var: Option<VarName>,
    pub attr: AttrName,
}

/// A logical formula over table-bound variables. Built once per query by the
/// parser and tree-walked per candidate; connectives use standard precedence
/// (`¬` > `∧` > `∨`, left-associative).
#[derive(Clone, Debug)]
pub enum Formula {
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Exists(VarName, Box<Formula>),
    ForAll(VarName, Box<Formula>),
    /// `var ∈ TABLE` or `TABLE(var)`; the two syntaxes are interchangeable.
    Membership { var: VarName, table: TableName },
    Compare { lhs: Expr, op: CmpOp, rhs: Expr },
    /// A bare expression in atom position; it must evaluate to a boolean.
    Atom(Expr),
}

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Value),
    /// `variable.attribute`, resolved against the candidate's context.
    Attr { var: VarName, attr: AttrName },
    /// A bare identifier; meaningful only where a row is in scope directly,
    /// i.e. in selection predicates.
    Ident(AttrName),
    Binary {
        lhs: Box<Expr>,
        op: ArithOp,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}
