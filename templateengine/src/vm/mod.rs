use crate::compiler::instructions::{Instruction, Instructions};
use crate::error::{Error, ErrorKind};
use crate::utils::{safe_html, AutoEscape};
use crate::value::Value;

pub use crate::vm::state::State;

mod eval;
mod state;

/// Steps through compiled instructions.
///
/// The VM itself is stateless; everything that changes while rendering
/// lives in a [`State`].  This allows a render to be suspended after every
/// fragment and resumed later, which is how lazy rendering works.
#[derive(Debug)]
pub struct Vm<'a> {
    instructions: &'a Instructions,
}

impl<'a> Vm<'a> {
    /// Creates a new VM.
    pub fn new(instructions: &'a Instructions) -> Vm<'a> {
        Vm { instructions }
    }

    /// Creates the initial state for rendering with a context.
    pub fn new_state(&self, ctx: Value) -> Result<State, Error> {
        State::new(ctx)
    }

    /// Runs until the next piece of output is produced.
    ///
    /// Returns `None` once the program has finished.  Errors carry the
    /// line of the instruction that failed.
    pub fn next_fragment(&self, state: &mut State) -> Result<Option<String>, Error> {
        while let Some(instr) = self.instructions.get(state.pc) {
            let pc = state.pc;
            match self.step(instr, state) {
                Ok(Some(fragment)) => return Ok(Some(fragment)),
                Ok(None) => {}
                Err(mut err) => {
                    if let Some(line) = self.instructions.get_line(pc) {
                        err.set_line(line);
                    }
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    /// Renders everything that is left into a string.
    pub fn render_to_string(&self, state: &mut State) -> Result<String, Error> {
        let mut rv = String::new();
        while let Some(fragment) = ok!(self.next_fragment(state)) {
            rv.push_str(&fragment);
        }
        Ok(rv)
    }

    fn step(&self, instr: &Instruction, state: &mut State) -> Result<Option<String>, Error> {
        let mut next_pc = state.pc + 1;
        let rv = match instr {
            Instruction::EmitRaw(text) => Some(text.clone()),
            Instruction::EmitExpr(expr, auto_escape) => {
                let value = ok!(state.eval(expr));
                Some(match auto_escape {
                    AutoEscape::Html => safe_html(&value),
                    AutoEscape::None => value.to_string(),
                })
            }
            Instruction::JumpIfFalse(expr, target) => {
                if !ok!(state.eval(expr)).is_true() {
                    next_pc = *target;
                }
                None
            }
            Instruction::Jump(target) => {
                next_pc = *target;
                None
            }
            Instruction::PushLoop(expr) => {
                let iterable = ok!(state.eval(expr));
                let iter = ok!(iterable.try_iter());
                log::trace!("entering loop over {} item(s)", iter.len());
                state.loops.push(iter);
                None
            }
            Instruction::Iterate(target, end) => {
                let item = match state.loops.last_mut() {
                    Some(iter) => iter.next(),
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidOperation,
                            "iterate outside of a loop",
                        ))
                    }
                };
                match item {
                    Some(item) => ok!(state.assign(target, item)),
                    None => {
                        state.loops.pop();
                        next_pc = *end;
                    }
                }
                None
            }
            Instruction::Exec(stmts) => {
                for stmt in stmts {
                    ok!(state.exec(stmt));
                }
                None
            }
        };
        state.pc = next_pc;
        Ok(rv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::compiler::codegen::CodeGenerator;
    use crate::compiler::scanner::WhitespaceConfig;

    fn compile(source: &str) -> Instructions {
        CodeGenerator::new(source, WhitespaceConfig::default())
            .compile()
            .unwrap()
    }

    fn render(source: &str, ctx: serde_json::Value) -> Result<String, Error> {
        let instructions = compile(source);
        let vm = Vm::new(&instructions);
        let mut state = ok!(vm.new_state(Value::from_serialize(&ctx)));
        vm.render_to_string(&mut state)
    }

    #[test]
    fn test_render_basics() {
        let rv = render(
            "Hello {{ name }}!{% if admin %} (admin){% endif %}",
            serde_json::json!({"name": "<b>", "admin": true}),
        )
        .unwrap();
        assert_eq!(rv, "Hello &lt;b&gt;! (admin)");
    }

    #[test]
    fn test_loops() {
        let rv = render(
            "{% for k, v in pairs %}{{ k }}={{ v }};{% empty %}none{% endfor %}",
            serde_json::json!({"pairs": [["a", 1], ["b", 2]]}),
        )
        .unwrap();
        assert_eq!(rv, "a=1;b=2;");
        let rv = render(
            "{% for x in [] %}{{ x }}{% empty %}none{% endfor %}",
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(rv, "none");
        let rv = render(
            "{% exec n = 3 %}{% while n %}{{ n }}{% exec n -= 1 %}{% endwhile %}",
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(rv, "321");
    }

    #[test]
    fn test_loop_variable_survives() {
        let rv = render(
            "{% for x in [1, 2] %}{% endfor %}{{ x }}",
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(rv, "2");
    }

    #[test]
    fn test_fragments_are_lazy() {
        let instructions = compile("a{{ 1 }}{{ missing }}");
        let vm = Vm::new(&instructions);
        let mut state = vm.new_state(Value::NONE).unwrap();
        assert_eq!(vm.next_fragment(&mut state).unwrap().as_deref(), Some("a"));
        assert_eq!(vm.next_fragment(&mut state).unwrap().as_deref(), Some("1"));
        let err = vm.next_fragment(&mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedError);
    }

    #[test]
    fn test_error_line() {
        let err = render("line 1\nline 2\n{{ 1 // 0 }}", serde_json::json!({})).unwrap_err();
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_bad_context() {
        let instructions = compile("x");
        let vm = Vm::new(&instructions);
        let err = vm.new_state(Value::from(vec![1, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }
}
