use std::borrow::Cow;
use std::fmt;

use crate::compiler::ast;
use crate::compiler::lexer::Tokenizer;
use crate::compiler::tokens::ExprToken;
use crate::error::{Error, ErrorKind};
use crate::value::Value;

const MAX_RECURSION: usize = 150;

fn unexpected<D: fmt::Display>(unexpected: D, expected: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("unexpected {unexpected}, expected {expected}"),
    )
}

fn unexpected_eof(expected: &str) -> Error {
    unexpected("end of input", expected)
}

fn make_const(value: Value) -> ast::Expr {
    ast::Expr::Const(ast::Const { value })
}

fn syntax_error(msg: Cow<'static, str>) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(syntax_error(Cow::Borrowed($msg)));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(syntax_error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(rv) => rv,
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(token @ $match) => token,
            Some(token) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some($match) => $target,
            Some(token) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
}

macro_rules! matches_token {
    ($p:expr, $match:pat) => {
        match $p.stream.current() {
            Err(err) => return Err(err),
            Ok(Some($match)) => true,
            _ => false,
        }
    };
}

macro_rules! skip_token {
    ($p:expr, $match:pat) => {
        match $p.stream.current() {
            Err(err) => return Err(err),
            Ok(Some($match)) => {
                let _ = $p.stream.next();
                true
            }
            _ => false,
        }
    };
}

struct TokenStream<'a> {
    tokenizer: Tokenizer<'a>,
    current: Option<Result<ExprToken<'a>, Error>>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> TokenStream<'a> {
        let mut tokenizer = Tokenizer::new(source);
        let current = tokenizer.next_token().map(|x| x.map(|x| x.0)).transpose();
        TokenStream { tokenizer, current }
    }

    /// Advance the stream.
    pub fn next(&mut self) -> Result<Option<ExprToken<'a>>, Error> {
        let rv = self.current.take();
        self.current = self
            .tokenizer
            .next_token()
            .map(|x| x.map(|x| x.0))
            .transpose();
        rv.transpose()
    }

    /// Look at the current token
    pub fn current(&mut self) -> Result<Option<&ExprToken<'a>>, Error> {
        match self.current {
            Some(Ok(ref tok)) => Ok(Some(tok)),
            Some(Err(_)) => match self.current.take() {
                Some(Err(err)) => Err(err),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }
}

struct Parser<'a> {
    stream: TokenStream<'a>,
    depth: usize,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<ast::Expr, Error> {
            let depth = self.depth;
            let mut left = ok!(self.$next());
            loop {
                let op = match ok!(self.stream.current()) {
                    $($tok)*
                    _ => break,
                };
                ok!(self.stream.next());
                ok!(self.nest());
                let right = ok!(self.$next());
                left = ast::Expr::BinOp(Box::new(ast::BinOp { op, left, right }));
            }
            self.depth = depth;
            Ok(left)
        }
    };
}

macro_rules! with_recursion_guard {
    ($parser:expr, $expr:expr) => {{
        $parser.depth += 1;
        if $parser.depth > MAX_RECURSION {
            return Err(syntax_error(Cow::Borrowed(
                "expression exceeds maximum recursion limits",
            )));
        }
        let rv = $expr;
        $parser.depth -= 1;
        rv
    }};
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Parser<'a> {
        Parser {
            stream: TokenStream::new(source),
            depth: 0,
        }
    }

    /// Accounts for one more level of a left-deep chain (`a + b + c`,
    /// `a.b.c`) which is built in a loop rather than by recursion.
    fn nest(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > MAX_RECURSION {
            syntax_error!("expression exceeds maximum recursion limits");
        }
        Ok(())
    }

    fn expect_end(&mut self, what: &str) -> Result<(), Error> {
        match ok!(self.stream.next()) {
            None => Ok(()),
            Some(token) => Err(syntax_error(Cow::Owned(format!(
                "unexpected {token} after {what}"
            )))),
        }
    }

    fn parse_expr(&mut self) -> Result<ast::Expr, Error> {
        with_recursion_guard!(self, self.parse_ifexpr())
    }

    fn parse_ifexpr(&mut self) -> Result<ast::Expr, Error> {
        let expr = ok!(self.parse_or());
        if skip_token!(self, ExprToken::Ident("if")) {
            let test_expr = ok!(self.parse_or());
            expect_token!(self, ExprToken::Ident("else"), "`else`");
            let false_expr = ok!(self.parse_expr());
            return Ok(ast::Expr::IfExpr(Box::new(ast::IfExpr {
                test_expr,
                true_expr: expr,
                false_expr,
            })));
        }
        Ok(expr)
    }

    binop!(parse_or, parse_and, {
        Some(ExprToken::Ident("or")) => ast::BinOpKind::ScOr,
    });
    binop!(parse_and, parse_not, {
        Some(ExprToken::Ident("and")) => ast::BinOpKind::ScAnd,
    });

    fn parse_not(&mut self) -> Result<ast::Expr, Error> {
        if skip_token!(self, ExprToken::Ident("not")) {
            let expr = ok!(with_recursion_guard!(self, self.parse_not()));
            return Ok(ast::Expr::UnaryOp(Box::new(ast::UnaryOp {
                op: ast::UnaryOpKind::Not,
                expr,
            })));
        }
        self.parse_compare()
    }

    fn compare_op(&mut self) -> Result<Option<ast::BinOpKind>, Error> {
        let op = match ok!(self.stream.current()) {
            Some(ExprToken::Eq) => ast::BinOpKind::Eq,
            Some(ExprToken::Ne) => ast::BinOpKind::Ne,
            Some(ExprToken::Lt) => ast::BinOpKind::Lt,
            Some(ExprToken::Lte) => ast::BinOpKind::Lte,
            Some(ExprToken::Gt) => ast::BinOpKind::Gt,
            Some(ExprToken::Gte) => ast::BinOpKind::Gte,
            Some(ExprToken::Ident("in")) => ast::BinOpKind::In,
            Some(ExprToken::Ident("not")) => {
                ok!(self.stream.next());
                expect_token!(self, ExprToken::Ident("in"), "`in`");
                return Ok(Some(ast::BinOpKind::NotIn));
            }
            _ => return Ok(None),
        };
        ok!(self.stream.next());
        Ok(Some(op))
    }

    fn parse_compare(&mut self) -> Result<ast::Expr, Error> {
        let left = ok!(self.parse_math1());
        let op = match ok!(self.compare_op()) {
            Some(op) => op,
            None => return Ok(left),
        };
        let right = ok!(self.parse_math1());
        if ok!(self.compare_op()).is_some() {
            syntax_error!("chained comparisons are not supported");
        }
        Ok(ast::Expr::BinOp(Box::new(ast::BinOp { op, left, right })))
    }

    binop!(parse_math1, parse_math2, {
        Some(ExprToken::Plus) => ast::BinOpKind::Add,
        Some(ExprToken::Minus) => ast::BinOpKind::Sub,
    });
    binop!(parse_math2, parse_unary, {
        Some(ExprToken::Mul) => ast::BinOpKind::Mul,
        Some(ExprToken::Div) => ast::BinOpKind::Div,
        Some(ExprToken::FloorDiv) => ast::BinOpKind::FloorDiv,
        Some(ExprToken::Mod) => ast::BinOpKind::Rem,
    });

    fn parse_unary(&mut self) -> Result<ast::Expr, Error> {
        let op = match ok!(self.stream.current()) {
            Some(ExprToken::Minus) => ast::UnaryOpKind::Neg,
            Some(ExprToken::Plus) => ast::UnaryOpKind::Pos,
            _ => return self.parse_pow(),
        };
        ok!(self.stream.next());
        let expr = ok!(with_recursion_guard!(self, self.parse_unary()));
        Ok(ast::Expr::UnaryOp(Box::new(ast::UnaryOp { op, expr })))
    }

    fn parse_pow(&mut self) -> Result<ast::Expr, Error> {
        let left = ok!(self.parse_primary());
        let left = ok!(self.parse_postfix(left));
        if skip_token!(self, ExprToken::Pow) {
            // right associative and binds less tightly than a unary
            // operator on its right: 2 ** -1
            let right = ok!(with_recursion_guard!(self, self.parse_unary()));
            return Ok(ast::Expr::BinOp(Box::new(ast::BinOp {
                op: ast::BinOpKind::Pow,
                left,
                right,
            })));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self, expr: ast::Expr) -> Result<ast::Expr, Error> {
        let depth = self.depth;
        let mut expr = expr;
        loop {
            if matches_token!(
                self,
                ExprToken::Dot | ExprToken::BracketOpen | ExprToken::ParenOpen
            ) {
                ok!(self.nest());
            }
            match ok!(self.stream.current()) {
                Some(ExprToken::Dot) => {
                    ok!(self.stream.next());
                    let name =
                        expect_token!(self, ExprToken::Ident(name) => name, "identifier");
                    expr = ast::Expr::GetAttr(Box::new(ast::GetAttr {
                        expr,
                        name: name.to_string(),
                    }));
                }
                Some(ExprToken::BracketOpen) => {
                    ok!(self.stream.next());

                    let mut start = None;
                    let mut stop = None;
                    let mut step = None;
                    let mut is_slice = false;

                    if !matches_token!(self, ExprToken::Colon) {
                        start = Some(ok!(self.parse_expr()));
                    }
                    if skip_token!(self, ExprToken::Colon) {
                        is_slice = true;
                        if !matches_token!(self, ExprToken::BracketClose | ExprToken::Colon) {
                            stop = Some(ok!(self.parse_expr()));
                        }
                        if skip_token!(self, ExprToken::Colon)
                            && !matches_token!(self, ExprToken::BracketClose)
                        {
                            step = Some(ok!(self.parse_expr()));
                        }
                    }
                    expect_token!(self, ExprToken::BracketClose, "`]`");

                    if !is_slice {
                        expr = ast::Expr::GetItem(Box::new(ast::GetItem {
                            expr,
                            subscript_expr: ok!(start.ok_or_else(|| {
                                syntax_error(Cow::Borrowed("empty subscript"))
                            })),
                        }));
                    } else {
                        expr = ast::Expr::Slice(Box::new(ast::Slice {
                            expr,
                            start,
                            stop,
                            step,
                        }));
                    }
                }
                Some(ExprToken::ParenOpen) => {
                    if !matches!(expr, ast::Expr::Var(_) | ast::Expr::GetAttr(_)) {
                        syntax_error!("{} is not callable", expr.description());
                    }
                    let args = ok!(self.parse_args());
                    expr = ast::Expr::Call(Box::new(ast::Call { expr, args }));
                }
                _ => break,
            }
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<ast::CallArg>, Error> {
        let mut args = Vec::new();
        let mut has_kwargs = false;

        expect_token!(self, ExprToken::ParenOpen, "`(`");
        loop {
            if skip_token!(self, ExprToken::ParenClose) {
                break;
            }
            if !args.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::ParenClose) {
                    break;
                }
            }

            let expr = ok!(self.parse_expr());

            // keyword argument
            match expr {
                ast::Expr::Var(var) if skip_token!(self, ExprToken::Assign) => {
                    has_kwargs = true;
                    args.push(ast::CallArg::Kwarg(var.id, ok!(self.parse_expr())));
                }
                _ if has_kwargs => {
                    syntax_error!("positional argument follows keyword argument");
                }
                expr => {
                    args.push(ast::CallArg::Pos(expr));
                }
            }

            if args.len() > 2000 {
                syntax_error!("Too many arguments in function call")
            }
        }

        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<ast::Expr, Error> {
        with_recursion_guard!(self, self.parse_primary_impl())
    }

    fn parse_primary_impl(&mut self) -> Result<ast::Expr, Error> {
        let token = expect_token!(self, "expression");
        match token {
            ExprToken::Ident("true" | "True") => Ok(make_const(Value::from(true))),
            ExprToken::Ident("false" | "False") => Ok(make_const(Value::from(false))),
            ExprToken::Ident("none" | "None") => Ok(make_const(Value::from(()))),
            ExprToken::Ident(name) => Ok(ast::Expr::Var(ast::Var {
                id: name.to_string(),
            })),
            ExprToken::Str(val) => {
                // adjacent string literals are concatenated
                let mut buf = val;
                while let Some(ExprToken::Str(s)) = ok!(self.stream.current()) {
                    buf.push_str(s);
                    ok!(self.stream.next());
                }
                Ok(make_const(Value::from(buf)))
            }
            ExprToken::Int(val) => Ok(make_const(Value::from(val))),
            ExprToken::Float(val) => Ok(make_const(Value::from(val))),
            ExprToken::ParenOpen => self.parse_tuple_or_expression(),
            ExprToken::BracketOpen => self.parse_list_expr(),
            ExprToken::BraceOpen => self.parse_map_expr(),
            token => syntax_error!("unexpected {}", token),
        }
    }

    fn parse_list_expr(&mut self) -> Result<ast::Expr, Error> {
        let mut items = Vec::new();
        loop {
            if skip_token!(self, ExprToken::BracketClose) {
                break;
            }
            if !items.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::BracketClose) {
                    break;
                }
            }
            items.push(ok!(self.parse_expr()));
        }
        Ok(ast::Expr::List(ast::List { items }))
    }

    fn parse_map_expr(&mut self) -> Result<ast::Expr, Error> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        loop {
            if skip_token!(self, ExprToken::BraceClose) {
                break;
            }
            if !keys.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::BraceClose) {
                    break;
                }
            }
            keys.push(ok!(self.parse_expr()));
            expect_token!(self, ExprToken::Colon, "`:`");
            values.push(ok!(self.parse_expr()));
        }
        Ok(ast::Expr::Map(ast::Map { keys, values }))
    }

    fn parse_tuple_or_expression(&mut self) -> Result<ast::Expr, Error> {
        // tuples are plain lists
        if skip_token!(self, ExprToken::ParenClose) {
            return Ok(ast::Expr::List(ast::List { items: vec![] }));
        }
        let expr = ok!(self.parse_expr());
        if matches_token!(self, ExprToken::Comma) {
            let mut items = vec![expr];
            loop {
                if skip_token!(self, ExprToken::ParenClose) {
                    break;
                }
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::ParenClose) {
                    break;
                }
                items.push(ok!(self.parse_expr()));
            }
            Ok(ast::Expr::List(ast::List { items }))
        } else {
            expect_token!(self, ExprToken::ParenClose, "`)`");
            Ok(expr)
        }
    }

    /// Parses `a, b, c` without parentheses.  A single expression without
    /// a trailing comma is returned as is.
    fn parse_expr_list(&mut self) -> Result<ast::Expr, Error> {
        let expr = ok!(self.parse_expr());
        if !matches_token!(self, ExprToken::Comma) {
            return Ok(expr);
        }
        let mut items = vec![expr];
        while skip_token!(self, ExprToken::Comma) {
            if matches_token!(
                self,
                ExprToken::Semicolon | ExprToken::Assign | ExprToken::Ident("in")
            ) || ok!(self.stream.current()).is_none()
            {
                break;
            }
            items.push(ok!(self.parse_expr()));
        }
        Ok(ast::Expr::List(ast::List { items }))
    }

    fn parse_for_target(&mut self) -> Result<ast::AssignTarget, Error> {
        let mut targets = Vec::new();
        let mut is_tuple = false;
        loop {
            let target = if skip_token!(self, ExprToken::ParenOpen) {
                let inner = ok!(with_recursion_guard!(self, self.parse_for_target()));
                expect_token!(self, ExprToken::ParenClose, "`)`");
                inner
            } else {
                let name = expect_token!(self, ExprToken::Ident(name) => name, "identifier");
                if matches!(name, "in" | "True" | "False" | "None") {
                    syntax_error!("cannot assign to {}", name);
                }
                ast::AssignTarget::Place(ast::Expr::Var(ast::Var {
                    id: name.to_string(),
                }))
            };
            targets.push(target);
            if !skip_token!(self, ExprToken::Comma) {
                break;
            }
            is_tuple = true;
            if matches_token!(self, ExprToken::Ident("in") | ExprToken::ParenClose) {
                break;
            }
        }
        if is_tuple {
            Ok(ast::AssignTarget::Unpack(targets))
        } else {
            Ok(targets.remove(0))
        }
    }

    fn parse_stmt(&mut self) -> Result<ast::Stmt, Error> {
        let expr = ok!(self.parse_expr_list());
        match ok!(self.stream.current()) {
            Some(ExprToken::Assign) => {
                ok!(self.stream.next());
                let target = ok!(make_assign_target(expr));
                let value = ok!(self.parse_expr_list());
                if matches_token!(self, ExprToken::Assign) {
                    syntax_error!("chained assignments are not supported");
                }
                Ok(ast::Stmt::Assign(target, value))
            }
            Some(ExprToken::AugAssign(op)) => {
                let op = match *op {
                    "+" => ast::BinOpKind::Add,
                    "-" => ast::BinOpKind::Sub,
                    "*" => ast::BinOpKind::Mul,
                    "/" => ast::BinOpKind::Div,
                    "//" => ast::BinOpKind::FloorDiv,
                    _ => ast::BinOpKind::Rem,
                };
                ok!(self.stream.next());
                if !expr.is_place() {
                    syntax_error!(
                        "'{}' is an illegal expression for augmented assignment",
                        expr.description()
                    );
                }
                let value = ok!(self.parse_expr_list());
                Ok(ast::Stmt::AugAssign(expr, op, value))
            }
            _ => Ok(ast::Stmt::Expr(expr)),
        }
    }
}

fn make_assign_target(expr: ast::Expr) -> Result<ast::AssignTarget, Error> {
    match expr {
        ast::Expr::List(list) => list
            .items
            .into_iter()
            .map(make_assign_target)
            .collect::<Result<Vec<_>, _>>()
            .map(ast::AssignTarget::Unpack),
        expr if expr.is_place() => Ok(ast::AssignTarget::Place(expr)),
        expr => Err(syntax_error(Cow::Owned(format!(
            "cannot assign to {}",
            expr.description()
        )))),
    }
}

/// Parses a standalone expression such as the body of `{{ ... }}`.
pub fn parse_expr(source: &str) -> Result<ast::Expr, Error> {
    let mut parser = Parser::new(source);
    let expr = ok!(parser.parse_expr());
    ok!(parser.expect_end("expression"));
    Ok(expr)
}

/// Parses the header of a for loop (`x in items`).
pub fn parse_for_loop(source: &str) -> Result<ast::ForLoop, Error> {
    let mut parser = Parser::new(source);
    let target = ok!(parser.parse_for_target());
    expect_token!(parser, ExprToken::Ident("in"), "`in`");
    let iter = ok!(parser.parse_expr_list());
    ok!(parser.expect_end("for loop"));
    Ok(ast::ForLoop { target, iter })
}

/// Parses the `;` separated statements of an exec tag.
pub fn parse_exec(source: &str) -> Result<Vec<ast::Stmt>, Error> {
    let mut parser = Parser::new(source);
    let mut rv = Vec::new();
    loop {
        while skip_token!(parser, ExprToken::Semicolon) {}
        if ok!(parser.stream.current()).is_none() {
            break;
        }
        rv.push(ok!(parser.parse_stmt()));
        match ok!(parser.stream.next()) {
            None => break,
            Some(ExprToken::Semicolon) => {}
            Some(token) => return Err(unexpected(token, "`;` or end of statement")),
        }
    }
    if rv.is_empty() {
        syntax_error!("expected at least one statement");
    }
    Ok(rv)
}
