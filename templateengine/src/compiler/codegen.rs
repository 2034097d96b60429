use crate::compiler::ast;
use crate::compiler::instructions::{Instruction, Instructions};
use crate::compiler::parser::{parse_exec, parse_expr, parse_for_loop};
use crate::compiler::scanner::{find_token, is_on_own_line, WhitespaceConfig};
use crate::compiler::tokens::Token;
use crate::error::Error;
use crate::utils::AutoEscape;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BlockKind {
    If,
    For,
    While,
}

impl BlockKind {
    fn open_tag(self) -> &'static str {
        match self {
            BlockKind::If => "{% if ... %}",
            BlockKind::For => "{% for ... %}",
            BlockKind::While => "{% while ... %}",
        }
    }

    fn end_tag(self) -> &'static str {
        match self {
            BlockKind::If => "{% endif %}",
            BlockKind::For => "{% endfor %}",
            BlockKind::While => "{% endwhile %}",
        }
    }
}

/// Represents an open block of code that does not yet have updated
/// jump targets.
enum PendingBlock<'s> {
    Branch {
        token: Token<'s>,
        jump_instr: Option<usize>,
        end_jumps: Vec<usize>,
        has_else: bool,
    },
    Loop {
        token: Token<'s>,
        iter: ast::Expr,
        iter_instr: usize,
        empty_instr: Option<usize>,
    },
    While {
        token: Token<'s>,
        cond_instr: usize,
    },
}

impl<'s> PendingBlock<'s> {
    fn kind(&self) -> BlockKind {
        match self {
            PendingBlock::Branch { .. } => BlockKind::If,
            PendingBlock::Loop { .. } => BlockKind::For,
            PendingBlock::While { .. } => BlockKind::While,
        }
    }

    fn token(&self) -> &Token<'s> {
        match self {
            PendingBlock::Branch { token, .. }
            | PendingBlock::Loop { token, .. }
            | PendingBlock::While { token, .. } => token,
        }
    }
}

/// Provides a convenient interface to creating instructions for the VM.
pub struct CodeGenerator<'s> {
    template: &'s str,
    whitespace: WhitespaceConfig,
    instructions: Instructions,
    pending_block: Vec<PendingBlock<'s>>,
    autoescape: Vec<AutoEscape>,
    last_was_statement: bool,
    line: usize,
    line_offset: usize,
}

impl<'s> CodeGenerator<'s> {
    /// Creates a new code generator for a flattened template.
    pub fn new(template: &'s str, whitespace: WhitespaceConfig) -> CodeGenerator<'s> {
        CodeGenerator {
            template,
            whitespace,
            instructions: Instructions::new(),
            pending_block: Vec::new(),
            autoescape: Vec::new(),
            last_was_statement: false,
            line: 1,
            line_offset: 0,
        }
    }

    /// Compiles the whole template and returns the instructions.
    pub fn compile(mut self) -> Result<Instructions, Error> {
        let mut offset = 0;
        while let Some(token) = find_token(self.template, offset) {
            let text = &self.template[offset..token.start()];
            self.compile_text(offset, text, Some(&token));
            if token.is_expression() {
                self.last_was_statement = false;
                ok!(self.compile_expression(&token));
            } else {
                self.last_was_statement = true;
                ok!(self.compile_statement(&token));
            }
            offset = token.end();
        }

        for kind in [BlockKind::If, BlockKind::For, BlockKind::While] {
            if let Some(block) = self.pending_block.iter().rev().find(|x| x.kind() == kind) {
                return Err(Error::syntax(
                    block.token(),
                    format!("No matching {}", kind.end_tag()),
                ));
            }
        }

        let text = &self.template[offset..];
        self.compile_text(offset, text, None);

        if !self
            .instructions
            .instructions
            .iter()
            .any(|x| matches!(x, Instruction::EmitRaw(_) | Instruction::EmitExpr(..)))
        {
            self.instructions.add(Instruction::EmitRaw(String::new()));
        }

        log::debug!(
            "compiled template into {} instructions",
            self.instructions.len()
        );
        Ok(self.instructions)
    }

    /// Returns the line for a byte offset.  Offsets must not move backwards.
    fn line_at(&mut self, offset: usize) -> usize {
        if offset > self.line_offset {
            self.line += self.template[self.line_offset..offset].matches('\n').count();
            self.line_offset = offset;
        }
        self.line
    }

    fn add(&mut self, instr: Instruction, offset: usize) -> usize {
        let line = self.line_at(offset);
        self.instructions.add_with_line(instr, line)
    }

    fn compile_text(&mut self, offset: usize, text: &str, next: Option<&Token<'s>>) {
        let mut text = text;
        let mut offset = offset;
        if self.whitespace.lstrip_blocks
            && next.map_or(false, |x| x.is_statement())
            && is_on_own_line(text)
        {
            text = text.trim_end_matches(' ');
        }
        if self.whitespace.trim_blocks && self.last_was_statement {
            if let Some(rest) = text.strip_prefix('\n') {
                text = rest;
                offset += 1;
            }
        }
        if !text.is_empty() {
            self.add(Instruction::EmitRaw(text.to_string()), offset);
        }
    }

    fn compile_expression(&mut self, token: &Token<'s>) -> Result<(), Error> {
        let expr = ok!(parse_expr(token.inner()).map_err(|err| err.with_token(token)));
        let escape = self.autoescape.last().copied().unwrap_or_default();
        self.add(Instruction::EmitExpr(expr, escape), token.start());
        Ok(())
    }

    fn compile_statement(&mut self, token: &Token<'s>) -> Result<(), Error> {
        let inner = token.inner();
        let (keyword, rest) = inner.split_once(' ').unwrap_or((inner, ""));
        let bare = rest.is_empty();
        match keyword {
            "if" => self.start_if(token, rest),
            "elif" => self.start_elif(token, rest),
            "else" if bare => self.start_else(token),
            "endif" if bare => self.end_if(token),
            "for" => self.start_for_loop(token, rest),
            "empty" if bare => self.start_empty(token),
            "endfor" if bare => self.end_for_loop(token),
            "while" => self.start_while(token, rest),
            "endwhile" if bare => self.end_while(token),
            "exec" => {
                let stmts = ok!(parse_exec(rest).map_err(|err| err.with_token(token)));
                self.add(Instruction::Exec(stmts), token.start());
                Ok(())
            }
            "autoescape" => {
                let mode = match rest {
                    "on" => AutoEscape::Html,
                    "off" => AutoEscape::None,
                    _ => {
                        return Err(Error::syntax(
                            token,
                            format!("Unknown autoescape mode: {rest}"),
                        ))
                    }
                };
                self.autoescape.push(mode);
                Ok(())
            }
            "endautoescape" if bare => match self.autoescape.pop() {
                Some(_) => Ok(()),
                None => Err(Error::syntax(token, "No matching {% autoescape ... %}")),
            },
            "endblock" => Err(Error::syntax(token, "No matching {% block ... %}")),
            "extends" => Err(Error::syntax(token, "Incorrect use of {% extends ... %}")),
            _ => Err(Error::syntax(
                token,
                format!("Unknown token: {}", token.content()),
            )),
        }
    }

    fn parse_condition(&self, token: &Token<'s>, source: &str) -> Result<ast::Expr, Error> {
        parse_expr(source).map_err(|err| err.with_token(token))
    }

    /// Makes sure the innermost open block is of the given kind.
    ///
    /// Closing a block that is not open at all reports the closing tag,
    /// closing across another open block reports that inner block.
    fn check_innermost(&self, kind: BlockKind, token: &Token<'s>) -> Result<(), Error> {
        match self.pending_block.last() {
            Some(block) if block.kind() == kind => Ok(()),
            Some(block) if self.pending_block.iter().any(|x| x.kind() == kind) => Err(
                Error::syntax(block.token(), format!("No matching {}", block.kind().end_tag())),
            ),
            _ => Err(Error::syntax(
                token,
                format!("No matching {}", kind.open_tag()),
            )),
        }
    }

    fn start_if(&mut self, token: &Token<'s>, source: &str) -> Result<(), Error> {
        let expr = ok!(self.parse_condition(token, source));
        let jump_instr = self.add(Instruction::JumpIfFalse(expr, !0), token.start());
        self.pending_block.push(PendingBlock::Branch {
            token: *token,
            jump_instr: Some(jump_instr),
            end_jumps: Vec::new(),
            has_else: false,
        });
        Ok(())
    }

    /// Closes the current branch: jumps over the rest of the chain and
    /// points the previous condition at the next instruction.
    fn close_branch(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::If, token));
        let end_jump = self.add(Instruction::Jump(!0), token.start());
        let next = self.instructions.len();
        if let Some(PendingBlock::Branch {
            jump_instr,
            end_jumps,
            ..
        }) = self.pending_block.last_mut()
        {
            end_jumps.push(end_jump);
            if let Some(instr) = jump_instr.take() {
                if let Some(Instruction::JumpIfFalse(_, target)) = self.instructions.get_mut(instr)
                {
                    *target = next;
                }
            }
        }
        Ok(())
    }

    fn has_else(&self) -> bool {
        matches!(
            self.pending_block.last(),
            Some(PendingBlock::Branch { has_else: true, .. })
        )
    }

    fn start_elif(&mut self, token: &Token<'s>, source: &str) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::If, token));
        if self.has_else() {
            return Err(Error::syntax(token, "Unexpected {% elif ... %} after {% else %}"));
        }
        let expr = ok!(self.parse_condition(token, source));
        ok!(self.close_branch(token));
        let instr = self.add(Instruction::JumpIfFalse(expr, !0), token.start());
        if let Some(PendingBlock::Branch { jump_instr, .. }) = self.pending_block.last_mut() {
            *jump_instr = Some(instr);
        }
        Ok(())
    }

    fn start_else(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::If, token));
        if self.has_else() {
            return Err(Error::syntax(token, "Duplicate {% else %}"));
        }
        ok!(self.close_branch(token));
        if let Some(PendingBlock::Branch { has_else, .. }) = self.pending_block.last_mut() {
            *has_else = true;
        }
        Ok(())
    }

    fn end_if(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::If, token));
        let next = self.instructions.len();
        if let Some(PendingBlock::Branch {
            jump_instr,
            end_jumps,
            ..
        }) = self.pending_block.pop()
        {
            if let Some(instr) = jump_instr {
                if let Some(Instruction::JumpIfFalse(_, target)) = self.instructions.get_mut(instr)
                {
                    *target = next;
                }
            }
            for instr in end_jumps {
                if let Some(Instruction::Jump(target)) = self.instructions.get_mut(instr) {
                    *target = next;
                }
            }
        }
        Ok(())
    }

    fn start_for_loop(&mut self, token: &Token<'s>, source: &str) -> Result<(), Error> {
        let for_loop = ok!(parse_for_loop(source).map_err(|err| err.with_token(token)));
        self.add(Instruction::PushLoop(for_loop.iter.clone()), token.start());
        let iter_instr = self.add(
            Instruction::Iterate(for_loop.target, !0),
            token.start(),
        );
        self.pending_block.push(PendingBlock::Loop {
            token: *token,
            iter: for_loop.iter,
            iter_instr,
            empty_instr: None,
        });
        Ok(())
    }

    /// Terminates the loop body and points the iterator at the instruction
    /// after it.
    fn close_loop_body(&mut self, iter_instr: usize, offset: usize) {
        self.add(Instruction::Jump(iter_instr), offset);
        let loop_end = self.instructions.len();
        if let Some(Instruction::Iterate(_, target)) = self.instructions.get_mut(iter_instr) {
            *target = loop_end;
        }
    }

    fn start_empty(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::For, token));
        let (iter, iter_instr) = match self.pending_block.last() {
            Some(PendingBlock::Loop {
                empty_instr: Some(_),
                ..
            }) => return Err(Error::syntax(token, "Duplicate {% empty %}")),
            Some(PendingBlock::Loop {
                iter, iter_instr, ..
            }) => (iter.clone(), *iter_instr),
            _ => return Err(Error::syntax(token, "No matching {% for ... %}")),
        };
        self.close_loop_body(iter_instr, token.start());
        let not_iter = ast::Expr::UnaryOp(Box::new(ast::UnaryOp {
            op: ast::UnaryOpKind::Not,
            expr: iter,
        }));
        let instr = self.add(Instruction::JumpIfFalse(not_iter, !0), token.start());
        if let Some(PendingBlock::Loop { empty_instr, .. }) = self.pending_block.last_mut() {
            *empty_instr = Some(instr);
        }
        Ok(())
    }

    fn end_for_loop(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::For, token));
        if let Some(PendingBlock::Loop {
            iter_instr,
            empty_instr,
            ..
        }) = self.pending_block.pop()
        {
            match empty_instr {
                None => self.close_loop_body(iter_instr, token.start()),
                Some(instr) => {
                    let next = self.instructions.len();
                    if let Some(Instruction::JumpIfFalse(_, target)) =
                        self.instructions.get_mut(instr)
                    {
                        *target = next;
                    }
                }
            }
        }
        Ok(())
    }

    fn start_while(&mut self, token: &Token<'s>, source: &str) -> Result<(), Error> {
        let expr = ok!(self.parse_condition(token, source));
        let cond_instr = self.add(Instruction::JumpIfFalse(expr, !0), token.start());
        self.pending_block.push(PendingBlock::While {
            token: *token,
            cond_instr,
        });
        Ok(())
    }

    fn end_while(&mut self, token: &Token<'s>) -> Result<(), Error> {
        ok!(self.check_innermost(BlockKind::While, token));
        if let Some(PendingBlock::While { cond_instr, .. }) = self.pending_block.pop() {
            self.add(Instruction::Jump(cond_instr), token.start());
            let next = self.instructions.len();
            if let Some(Instruction::JumpIfFalse(_, target)) = self.instructions.get_mut(cond_instr)
            {
                *target = next;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::error::ErrorKind;

    fn compile(source: &str) -> Result<Instructions, Error> {
        CodeGenerator::new(source, WhitespaceConfig::default()).compile()
    }

    fn listing(source: &str) -> Vec<String> {
        let instructions = compile(source).unwrap();
        (0..instructions.len())
            .map(|idx| format!("{:?}", instructions.get(idx).unwrap()))
            .collect()
    }

    #[test]
    fn test_if_chain() {
        assert_eq!(
            listing("{% if a %}A{% elif b %}B{% else %}C{% endif %}"),
            vec![
                "JUMP_IF_FALSE (if not a to 00003)",
                "EMIT_RAW (string \"A\")",
                "JUMP (to 00007)",
                "JUMP_IF_FALSE (if not b to 00006)",
                "EMIT_RAW (string \"B\")",
                "JUMP (to 00007)",
                "EMIT_RAW (string \"C\")",
            ]
        );
    }

    #[test]
    fn test_for_empty() {
        assert_eq!(
            listing("{% for x in items %}{{ x }}{% empty %}none{% endfor %}"),
            vec![
                "PUSH_LOOP (items)",
                "ITERATE (into x, exhausted to 00004)",
                "EMIT_EXPR (html x)",
                "JUMP (to 00001)",
                "JUMP_IF_FALSE (if not not items to 00006)",
                "EMIT_RAW (string \"none\")",
            ]
        );
    }

    #[test]
    fn test_while() {
        assert_eq!(
            listing("{% while n %}{% exec n -= 1 %}{% endwhile %}"),
            vec![
                "JUMP_IF_FALSE (if not n to 00003)",
                "EXEC (n -= 1)",
                "JUMP (to 00000)",
                "EMIT_RAW (string \"\")",
            ]
        );
    }

    #[test]
    fn test_autoescape() {
        assert_eq!(
            listing("{{ a }}{% autoescape off %}{{ b }}{% endautoescape %}{{ c }}"),
            vec![
                "EMIT_EXPR (html a)",
                "EMIT_EXPR (b)",
                "EMIT_EXPR (html c)",
            ]
        );
        // unclosed autoescape is fine
        assert_eq!(
            listing("{% autoescape off %}{{ b }}"),
            vec!["EMIT_EXPR (b)"]
        );
        let err = compile("{% autoescape maybe %}").unwrap_err();
        assert_eq!(err.detail(), Some("Unknown autoescape mode: maybe"));
    }

    #[test]
    fn test_whitespace_control() {
        assert_eq!(
            listing("<ul>\n  {% for x in y %}\n  <li>\n  {% endfor %}\n</ul>"),
            vec![
                "EMIT_RAW (string \"<ul>\\n\")",
                "PUSH_LOOP (y)",
                "ITERATE (into x, exhausted to 00005)",
                "EMIT_RAW (string \"  <li>\\n\")",
                "JUMP (to 00002)",
                "EMIT_RAW (string \"</ul>\")",
            ]
        );
        // expressions do not eat the following newline
        assert_eq!(
            listing("{{ a }}\nb"),
            vec!["EMIT_EXPR (html a)", "EMIT_RAW (string \"\\nb\")"]
        );

        let instructions = CodeGenerator::new(
            "  {% if a %}\nx{% endif %}",
            WhitespaceConfig {
                trim_blocks: false,
                lstrip_blocks: false,
            },
        )
        .compile()
        .unwrap();
        assert_eq!(
            format!("{:?}", instructions.get(0).unwrap()),
            "EMIT_RAW (string \"  \")"
        );
        assert_eq!(
            format!("{:?}", instructions.get(2).unwrap()),
            "EMIT_RAW (string \"\\nx\")"
        );
    }

    #[test]
    fn test_line_numbers() {
        let instructions = compile("a\n{{ b }}\n\n{% if c %}\n{{ d }}{% endif %}").unwrap();
        assert_eq!(instructions.get_line(0), Some(1));
        assert_eq!(instructions.get_line(1), Some(2));
        assert_eq!(instructions.get_line(3), Some(4));
        assert_eq!(instructions.get_line(4), Some(5));
    }

    #[test]
    fn test_structural_errors() {
        let cases = [
            ("{% if a %}", "No matching {% endif %}", "{% if a %}"),
            ("{% for x in y %}", "No matching {% endfor %}", "{% for x in y %}"),
            ("{% while x %}", "No matching {% endwhile %}", "{% while x %}"),
            ("{% endif %}", "No matching {% if ... %}", "{% endif %}"),
            ("{% else %}", "No matching {% if ... %}", "{% else %}"),
            ("{% elif a %}", "No matching {% if ... %}", "{% elif a %}"),
            ("{% empty %}", "No matching {% for ... %}", "{% empty %}"),
            ("{% endfor %}", "No matching {% for ... %}", "{% endfor %}"),
            ("{% endwhile %}", "No matching {% while ... %}", "{% endwhile %}"),
            (
                "{% endautoescape %}",
                "No matching {% autoescape ... %}",
                "{% endautoescape %}",
            ),
            (
                "{% if a %}{% for x in y %}{% endif %}",
                "No matching {% endfor %}",
                "{% for x in y %}",
            ),
            (
                "{% if a %}{% else %}{% else %}{% endif %}",
                "Duplicate {% else %}",
                "{% else %}",
            ),
            ("{% endblock x %}", "No matching {% block ... %}", "{% endblock x %}"),
            (
                "{% extends 'x' %}",
                "Incorrect use of {% extends ... %}",
                "{% extends 'x' %}",
            ),
            ("{% frobnicate %}", "Unknown token: {% frobnicate %}", "{% frobnicate %}"),
            ("{% else now %}", "Unknown token: {% else now %}", "{% else now %}"),
        ];
        for (source, detail, token) in cases {
            let err = compile(source).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SyntaxError, "{source}");
            assert_eq!(err.detail(), Some(detail), "{source}");
            let range = err.range().unwrap();
            assert_eq!(&err.template_source().unwrap()[range], token, "{source}");
        }
    }

    #[test]
    fn test_open_blocks_checked_in_order() {
        let err = compile("{% while a %}{% for x in y %}{% if b %}{% if c %}").unwrap_err();
        assert_eq!(err.detail(), Some("No matching {% endif %}"));
        assert_eq!(err.range(), Some(39..49));
        let err = compile("{% while a %}{% for x in y %}").unwrap_err();
        assert_eq!(err.detail(), Some("No matching {% endfor %}"));
    }

    #[test]
    fn test_expression_errors_point_at_tag() {
        let err = compile("a\n{{ 1 + }}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.range(), Some(2..11));
    }

    #[test]
    fn test_empty_template() {
        assert_eq!(listing(""), vec!["EMIT_RAW (string \"\")"]);
        assert_eq!(listing("{% exec x = 1 %}"), vec!["EXEC (x = 1)", "EMIT_RAW (string \"\")"]);
    }
}
