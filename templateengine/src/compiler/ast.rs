use std::fmt;

use crate::value::Value;

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Var(Var),
    Const(Const),
    List(List),
    Map(Map),
    UnaryOp(Box<UnaryOp>),
    BinOp(Box<BinOp>),
    IfExpr(Box<IfExpr>),
    GetAttr(Box<GetAttr>),
    GetItem(Box<GetItem>),
    Slice(Box<Slice>),
    Call(Box<Call>),
}

impl Expr {
    /// Short description of the node kind for error messages.
    pub fn description(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Const(_) => "constant",
            Expr::List(_) => "list literal",
            Expr::Map(_) => "dict literal",
            Expr::UnaryOp(_) | Expr::BinOp(_) => "operator",
            Expr::IfExpr(_) => "conditional expression",
            Expr::GetAttr(_) => "attribute",
            Expr::GetItem(_) => "subscript",
            Expr::Slice(_) => "slice",
            Expr::Call(_) => "call",
        }
    }

    /// Can this expression be assigned to?
    pub fn is_place(&self) -> bool {
        match self {
            Expr::Var(_) => true,
            Expr::GetAttr(attr) => attr.expr.is_place(),
            Expr::GetItem(item) => item.expr.is_place(),
            _ => false,
        }
    }
}

/// Looks up a variable.
#[derive(Debug, Clone)]
pub struct Var {
    pub id: String,
}

/// Loads a constant
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
}

/// Creates a list of values.
#[derive(Debug, Clone)]
pub struct List {
    pub items: Vec<Expr>,
}

/// Creates a dict of values.
#[derive(Debug, Clone)]
pub struct Map {
    pub keys: Vec<Expr>,
    pub values: Vec<Expr>,
}

/// A kind of unary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Pos,
}

/// An unary operator expression.
#[derive(Debug, Clone)]
pub struct UnaryOp {
    pub op: UnaryOpKind,
    pub expr: Expr,
}

/// A kind of binary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOpKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    In,
    NotIn,
}

impl BinOpKind {
    /// The operator as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOpKind::Eq => "==",
            BinOpKind::Ne => "!=",
            BinOpKind::Lt => "<",
            BinOpKind::Lte => "<=",
            BinOpKind::Gt => ">",
            BinOpKind::Gte => ">=",
            BinOpKind::ScAnd => "and",
            BinOpKind::ScOr => "or",
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::FloorDiv => "//",
            BinOpKind::Rem => "%",
            BinOpKind::Pow => "**",
            BinOpKind::In => "in",
            BinOpKind::NotIn => "not in",
        }
    }
}

/// A binary operator expression.
#[derive(Debug, Clone)]
pub struct BinOp {
    pub op: BinOpKind,
    pub left: Expr,
    pub right: Expr,
}

/// An if expression.
#[derive(Debug, Clone)]
pub struct IfExpr {
    pub test_expr: Expr,
    pub true_expr: Expr,
    pub false_expr: Expr,
}

/// An attribute lookup expression.
#[derive(Debug, Clone)]
pub struct GetAttr {
    pub expr: Expr,
    pub name: String,
}

/// An item lookup expression.
#[derive(Debug, Clone)]
pub struct GetItem {
    pub expr: Expr,
    pub subscript_expr: Expr,
}

/// A slice expression.
#[derive(Debug, Clone)]
pub struct Slice {
    pub expr: Expr,
    pub start: Option<Expr>,
    pub stop: Option<Expr>,
    pub step: Option<Expr>,
}

/// Calls something.
///
/// If `expr` is a [`GetAttr`] this is a method call on the receiver,
/// otherwise `expr` must be a variable naming a builtin function.
#[derive(Debug, Clone)]
pub struct Call {
    pub expr: Expr,
    pub args: Vec<CallArg>,
}

/// A call argument.
#[derive(Debug, Clone)]
pub enum CallArg {
    Pos(Expr),
    Kwarg(String, Expr),
}

/// The target of an assignment or a for loop.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// A name, attribute or subscript.
    Place(Expr),
    /// Comma separated unpacking.
    Unpack(Vec<AssignTarget>),
}

/// A statement inside `{% exec %}`.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `target = expr`
    Assign(AssignTarget, Expr),
    /// `target += expr` and friends.
    AugAssign(Expr, BinOpKind, Expr),
    /// An expression evaluated for side effects.
    Expr(Expr),
}

/// The header of a `{% for %}` loop.
#[derive(Debug, Clone)]
pub struct ForLoop {
    pub target: AssignTarget,
    pub iter: Expr,
}

fn write_sequence<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            ok!(f.write_str(", "));
        }
        ok!(write!(f, "{item}"));
    }
    Ok(())
}

/// Renders an expression back into source form.
///
/// Binary operators are parenthesized so the output is unambiguous.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(var) => f.write_str(&var.id),
            Expr::Const(c) => write!(f, "{}", c.value.repr()),
            Expr::List(list) => {
                ok!(f.write_str("["));
                ok!(write_sequence(f, &list.items));
                f.write_str("]")
            }
            Expr::Map(map) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in map.keys.iter().zip(map.values.iter()).enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{key}: {value}"));
                }
                f.write_str("}")
            }
            Expr::UnaryOp(op) => match op.op {
                UnaryOpKind::Not => write!(f, "not {}", op.expr),
                UnaryOpKind::Neg => write!(f, "-{}", op.expr),
                UnaryOpKind::Pos => write!(f, "+{}", op.expr),
            },
            Expr::BinOp(op) => write!(f, "({} {} {})", op.left, op.op.as_str(), op.right),
            Expr::IfExpr(expr) => write!(
                f,
                "({} if {} else {})",
                expr.true_expr, expr.test_expr, expr.false_expr
            ),
            Expr::GetAttr(attr) => write!(f, "{}.{}", attr.expr, attr.name),
            Expr::GetItem(item) => write!(f, "{}[{}]", item.expr, item.subscript_expr),
            Expr::Slice(slice) => {
                ok!(write!(f, "{}[", slice.expr));
                if let Some(ref start) = slice.start {
                    ok!(write!(f, "{start}"));
                }
                ok!(f.write_str(":"));
                if let Some(ref stop) = slice.stop {
                    ok!(write!(f, "{stop}"));
                }
                if let Some(ref step) = slice.step {
                    ok!(write!(f, ":{step}"));
                }
                f.write_str("]")
            }
            Expr::Call(call) => {
                ok!(write!(f, "{}(", call.expr));
                write_sequence(f, &call.args).and_then(|_| f.write_str(")"))
            }
        }
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Pos(expr) => write!(f, "{expr}"),
            CallArg::Kwarg(name, expr) => write!(f, "{name}={expr}"),
        }
    }
}

impl fmt::Display for AssignTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignTarget::Place(expr) => write!(f, "{expr}"),
            AssignTarget::Unpack(targets) => {
                ok!(f.write_str("("));
                ok!(write_sequence(f, targets));
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign(target, expr) => write!(f, "{target} = {expr}"),
            Stmt::AugAssign(target, op, expr) => write!(f, "{target} {}= {expr}", op.as_str()),
            Stmt::Expr(expr) => write!(f, "{expr}"),
        }
    }
}
