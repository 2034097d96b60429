use std::fmt;

use crate::compiler::ast;
use crate::utils::AutoEscape;

/// Represents an instruction for the VM.
#[derive(Clone)]
pub enum Instruction {
    /// Emits raw source
    EmitRaw(String),

    /// Evaluates an expression and emits it, escaped as requested.
    EmitExpr(ast::Expr, AutoEscape),

    /// Jumps to the target if the expression is falsy.
    JumpIfFalse(ast::Expr, usize),

    /// Jump to a specific instruction
    Jump(usize),

    /// Evaluates the iterable and starts a new loop over it.
    PushLoop(ast::Expr),

    /// Binds the next item of the innermost loop to the target.  When the
    /// loop is exhausted it is popped and execution continues at the jump
    /// target.
    Iterate(ast::AssignTarget, usize),

    /// Executes statements for their side effects.
    Exec(Vec<ast::Stmt>),
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::EmitRaw(s) => write!(f, "EMIT_RAW (string {s:?})"),
            Instruction::EmitExpr(expr, AutoEscape::Html) => {
                write!(f, "EMIT_EXPR (html {expr})")
            }
            Instruction::EmitExpr(expr, AutoEscape::None) => write!(f, "EMIT_EXPR ({expr})"),
            Instruction::JumpIfFalse(expr, target) => {
                write!(f, "JUMP_IF_FALSE (if not {expr} to {target:>05x})")
            }
            Instruction::Jump(target) => write!(f, "JUMP (to {target:>05x})"),
            Instruction::PushLoop(expr) => write!(f, "PUSH_LOOP ({expr})"),
            Instruction::Iterate(target, end) => {
                write!(f, "ITERATE (into {target}, exhausted to {end:>05x})")
            }
            Instruction::Exec(stmts) => {
                ok!(f.write_str("EXEC ("));
                for (idx, stmt) in stmts.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str("; "));
                    }
                    ok!(write!(f, "{stmt}"));
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct LineInfo {
    first_instruction: u32,
    line: u32,
}

/// Wrapper around instructions to help with location management.
#[derive(Clone, Default)]
pub struct Instructions {
    pub(crate) instructions: Vec<Instruction>,
    line_infos: Vec<LineInfo>,
}

impl Instructions {
    /// Creates a new instructions object.
    pub fn new() -> Instructions {
        Instructions {
            instructions: Vec::new(),
            line_infos: Vec::new(),
        }
    }

    /// Returns an instruction by index
    #[inline(always)]
    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.instructions.get(idx)
    }

    /// Returns an instruction by index mutably
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(idx)
    }

    /// Adds a new instruction
    pub fn add(&mut self, instr: Instruction) -> usize {
        let rv = self.instructions.len();
        self.instructions.push(instr);
        rv
    }

    /// Adds a new instruction with line number.
    pub fn add_with_line(&mut self, instr: Instruction, line: usize) -> usize {
        let rv = self.add(instr);
        let same_loc = self
            .line_infos
            .last()
            .map_or(false, |last_loc| last_loc.line as usize == line);
        if !same_loc {
            self.line_infos.push(LineInfo {
                first_instruction: rv as u32,
                line: line as u32,
            });
        }
        rv
    }

    /// Looks up the line for an instruction
    pub fn get_line(&self, idx: usize) -> Option<usize> {
        let loc = match self
            .line_infos
            .binary_search_by_key(&idx, |x| x.first_instruction as usize)
        {
            Ok(idx) => &self.line_infos[idx],
            Err(0) => return None,
            Err(idx) => &self.line_infos[idx - 1],
        };
        Some(loc.line as usize)
    }

    /// Returns the number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Do we have any instructions?
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct InstructionWrapper<'a>(usize, &'a Instruction, Option<usize>);

        impl<'a> fmt::Debug for InstructionWrapper<'a> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                ok!(write!(f, "{:>05x} | {:?}", self.0, self.1));
                if let Some(line) = self.2 {
                    ok!(write!(f, "  [line {line}]"));
                }
                Ok(())
            }
        }

        let mut list = f.debug_list();
        let mut last_line = None;
        for (idx, instr) in self.instructions.iter().enumerate() {
            let line = self.get_line(idx);
            list.entry(&InstructionWrapper(
                idx,
                instr,
                if line != last_line { line } else { None },
            ));
            last_line = line;
        }
        list.finish()
    }
}

#[test]
fn test_line_lookup() {
    use similar_asserts::assert_eq;

    let mut instructions = Instructions::new();
    instructions.add_with_line(Instruction::EmitRaw("a".into()), 1);
    instructions.add_with_line(Instruction::EmitRaw("b".into()), 1);
    instructions.add_with_line(Instruction::Jump(0), 3);
    assert_eq!(instructions.get_line(0), Some(1));
    assert_eq!(instructions.get_line(1), Some(1));
    assert_eq!(instructions.get_line(2), Some(3));
    assert_eq!(instructions.get_line(7), Some(3));
    assert_eq!(
        format!("{:?}", instructions.get(2).unwrap()),
        "JUMP (to 00000)"
    );
}
