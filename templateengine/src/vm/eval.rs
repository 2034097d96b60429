use std::cmp::Ordering;

use crate::compiler::ast::{self, AssignTarget, BinOpKind, Expr, Stmt, UnaryOpKind};
use crate::error::{Error, ErrorKind};
use crate::functions::{call_function, is_builtin, iterate, Args};
use crate::methods::call_method;
use crate::value::{ops, Value, ValueMap};
use crate::vm::state::State;

/// The name that refers to the whole render scope unless shadowed.
const CONTEXT_NAME: &str = "context";

fn undefined(name: &str) -> Error {
    Error::new(
        ErrorKind::UndefinedError,
        format!("name '{name}' is not defined"),
    )
}

fn no_attribute(value: &Value, name: &str) -> Error {
    Error::new(
        ErrorKind::UndefinedError,
        format!("'{}' object has no attribute '{}'", value.kind(), name),
    )
}

fn not_assignable(expr: &Expr) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot assign to {}", expr.description()),
    )
}

/// Applies a binary operator to two evaluated operands.
pub(crate) fn binop(op: BinOpKind, left: &Value, right: &Value) -> Result<Value, Error> {
    let compare = |wanted: fn(Ordering) -> bool| {
        ops::cmp(left, right, op.as_str()).map(|ordering| Value::from(wanted(ordering)))
    };
    match op {
        BinOpKind::Eq => Ok(Value::from(ops::eq(left, right))),
        BinOpKind::Ne => Ok(Value::from(!ops::eq(left, right))),
        BinOpKind::Lt => compare(Ordering::is_lt),
        BinOpKind::Lte => compare(Ordering::is_le),
        BinOpKind::Gt => compare(Ordering::is_gt),
        BinOpKind::Gte => compare(Ordering::is_ge),
        BinOpKind::ScAnd => Ok((if left.is_true() { right } else { left }).clone()),
        BinOpKind::ScOr => Ok((if left.is_true() { left } else { right }).clone()),
        BinOpKind::Add => ops::add(left, right),
        BinOpKind::Sub => ops::sub(left, right),
        BinOpKind::Mul => ops::mul(left, right),
        BinOpKind::Div => ops::div(left, right),
        BinOpKind::FloorDiv => ops::int_div(left, right),
        BinOpKind::Rem => ops::rem(left, right),
        BinOpKind::Pow => ops::pow(left, right),
        BinOpKind::In => ops::contains(right, left).map(Value::from),
        BinOpKind::NotIn => ops::contains(right, left).map(|rv| Value::from(!rv)),
    }
}

impl State {
    /// Evaluates an expression against the render scope.
    ///
    /// Evaluation takes the state mutably as method calls can mutate the
    /// values stored in the scope.
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Var(var) => self.lookup_var(&var.id),
            Expr::Const(c) => Ok(c.value.clone()),
            Expr::List(list) => {
                let mut rv = Vec::with_capacity(list.items.len());
                for item in &list.items {
                    rv.push(ok!(self.eval(item)));
                }
                Ok(Value::from(rv))
            }
            Expr::Map(map) => {
                let mut rv = Value::from(ValueMap::new());
                for (key, value) in map.keys.iter().zip(map.values.iter()) {
                    let key = ok!(self.eval(key));
                    let value = ok!(self.eval(value));
                    ok!(rv.set_item(&key, value));
                }
                Ok(rv)
            }
            Expr::UnaryOp(op) => {
                let value = ok!(self.eval(&op.expr));
                match op.op {
                    UnaryOpKind::Not => Ok(Value::from(!value.is_true())),
                    UnaryOpKind::Neg => ops::neg(&value),
                    UnaryOpKind::Pos => ops::pos(&value),
                }
            }
            Expr::BinOp(op) => {
                let left = ok!(self.eval(&op.left));
                match op.op {
                    BinOpKind::ScAnd if !left.is_true() => Ok(left),
                    BinOpKind::ScOr if left.is_true() => Ok(left),
                    BinOpKind::ScAnd | BinOpKind::ScOr => self.eval(&op.right),
                    _ => {
                        let right = ok!(self.eval(&op.right));
                        binop(op.op, &left, &right)
                    }
                }
            }
            Expr::IfExpr(expr) => {
                if ok!(self.eval(&expr.test_expr)).is_true() {
                    self.eval(&expr.true_expr)
                } else {
                    self.eval(&expr.false_expr)
                }
            }
            Expr::GetAttr(attr) => {
                let value = ok!(self.eval(&attr.expr));
                match value.get_attr(&attr.name) {
                    Some(rv) => Ok(rv.clone()),
                    None => Err(no_attribute(&value, &attr.name)),
                }
            }
            Expr::GetItem(item) => {
                let value = ok!(self.eval(&item.expr));
                let key = ok!(self.eval(&item.subscript_expr));
                value.get_item(&key)
            }
            Expr::Slice(slice) => {
                let value = ok!(self.eval(&slice.expr));
                let start = ok!(self.eval_slice_index(slice.start.as_ref()));
                let stop = ok!(self.eval_slice_index(slice.stop.as_ref()));
                let step = ok!(self.eval_slice_index(slice.step.as_ref()));
                value.slice(start, stop, step)
            }
            Expr::Call(call) => self.eval_call(call),
        }
    }

    fn lookup_var(&self, name: &str) -> Result<Value, Error> {
        match self.lookup(name) {
            Some(value) => Ok(value.clone()),
            None if name == CONTEXT_NAME => Ok(self.scope.clone()),
            None => Err(undefined(name)),
        }
    }

    fn eval_slice_index(&mut self, expr: Option<&Expr>) -> Result<Option<i64>, Error> {
        let value = match expr {
            Some(expr) => ok!(self.eval(expr)),
            None => return Ok(None),
        };
        if value.is_none() {
            Ok(None)
        } else {
            match value.as_i64() {
                Some(idx) => Ok(Some(idx)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "slice indices must be integers or None",
                )),
            }
        }
    }

    fn eval_call(&mut self, call: &ast::Call) -> Result<Value, Error> {
        let mut pos = Vec::new();
        let mut kwargs = Vec::new();
        for arg in &call.args {
            match arg {
                ast::CallArg::Pos(expr) => pos.push(ok!(self.eval(expr))),
                ast::CallArg::Kwarg(name, expr) => {
                    kwargs.push((name.clone(), ok!(self.eval(expr))));
                }
            }
        }

        match call.expr {
            Expr::Var(ref var) => {
                if let Some(value) = self.lookup(&var.id) {
                    Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!("'{}' object is not callable", value.kind()),
                    ))
                } else if is_builtin(&var.id) {
                    call_function(&var.id, Args::new(&var.id, pos, kwargs))
                } else {
                    Err(Error::new(
                        ErrorKind::UnknownFunction,
                        format!("name '{}' is not defined", var.id),
                    ))
                }
            }
            Expr::GetAttr(ref attr) => {
                let args = Args::new(&attr.name, pos, kwargs);
                if attr.expr.is_place() {
                    let receiver = ok!(self.place_mut(&attr.expr));
                    call_method(receiver, &attr.name, args)
                } else {
                    let mut receiver = ok!(self.eval(&attr.expr));
                    call_method(&mut receiver, &attr.name, args)
                }
            }
            ref other => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("{} is not callable", other.description()),
            )),
        }
    }

    /// Returns the value stored under a place expression.
    fn place_mut(&mut self, expr: &Expr) -> Result<&mut Value, Error> {
        match expr {
            Expr::Var(var) => {
                if self.lookup(&var.id).is_some() {
                    self.scope.get_item_mut(&Value::from(var.id.as_str()))
                } else if var.id == CONTEXT_NAME {
                    Ok(&mut self.scope)
                } else {
                    Err(undefined(&var.id))
                }
            }
            Expr::GetAttr(attr) => {
                let parent = ok!(self.place_mut(&attr.expr));
                if parent.get_attr(&attr.name).is_none() {
                    return Err(no_attribute(parent, &attr.name));
                }
                parent.get_item_mut(&Value::from(attr.name.as_str()))
            }
            Expr::GetItem(item) => {
                let key = ok!(self.eval(&item.subscript_expr));
                let parent = ok!(self.place_mut(&item.expr));
                parent.get_item_mut(&key)
            }
            other => Err(not_assignable(other)),
        }
    }

    fn assign_place(&mut self, expr: &Expr, value: Value) -> Result<(), Error> {
        match expr {
            Expr::Var(var) => self.scope.set_item(&Value::from(var.id.as_str()), value),
            Expr::GetAttr(attr) => {
                let parent = ok!(self.place_mut(&attr.expr));
                if parent.as_map().is_none() {
                    return Err(no_attribute(parent, &attr.name));
                }
                parent.set_item(&Value::from(attr.name.as_str()), value)
            }
            Expr::GetItem(item) => {
                let key = ok!(self.eval(&item.subscript_expr));
                let parent = ok!(self.place_mut(&item.expr));
                parent.set_item(&key, value)
            }
            other => Err(not_assignable(other)),
        }
    }

    /// Binds a value to an assignment target, unpacking as needed.
    pub(crate) fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), Error> {
        match target {
            AssignTarget::Place(expr) => self.assign_place(expr, value),
            AssignTarget::Unpack(targets) => {
                let items = ok!(iterate(&value).map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        format!("cannot unpack non-iterable {} object", value.kind()),
                    )
                }));
                match items.len().cmp(&targets.len()) {
                    Ordering::Less => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!(
                                "not enough values to unpack (expected {}, got {})",
                                targets.len(),
                                items.len()
                            ),
                        ))
                    }
                    Ordering::Greater => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            format!("too many values to unpack (expected {})", targets.len()),
                        ))
                    }
                    Ordering::Equal => {}
                }
                for (target, item) in targets.iter().zip(items) {
                    ok!(self.assign(target, item));
                }
                Ok(())
            }
        }
    }

    /// Executes a statement of an exec tag.
    pub(crate) fn exec(&mut self, stmt: &Stmt) -> Result<(), Error> {
        match stmt {
            Stmt::Assign(target, expr) => {
                let value = ok!(self.eval(expr));
                self.assign(target, value)
            }
            Stmt::AugAssign(target, op, expr) => {
                let current = ok!(self.eval(target));
                let operand = ok!(self.eval(expr));
                let value = ok!(binop(*op, &current, &operand));
                self.assign_place(target, value)
            }
            Stmt::Expr(expr) => self.eval(expr).map(|_| ()),
        }
    }
}
