use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueIter, ValueKind, ValueMap};

/// Provides access to the current execution state of a render.
///
/// Every render owns one state.  It holds the render scope, the stack of
/// active loops and the program counter.  The scope starts out as a copy of
/// the context passed to the render; loop variables and `{% exec %}`
/// assignments write into it and stay visible until the render ends.
pub struct State {
    pub(crate) pc: usize,
    pub(crate) scope: Value,
    pub(crate) loops: Vec<ValueIter>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("pc", &self.pc)
            .field("scope", &self.scope)
            .field("loops", &self.loops.len())
            .finish()
    }
}

impl State {
    /// Creates a new state from a context value.
    ///
    /// The context must be a map; `None` stands for an empty context.
    pub(crate) fn new(ctx: Value) -> Result<State, Error> {
        let scope = match ctx.kind() {
            ValueKind::Map => ctx,
            ValueKind::None => Value::from(ValueMap::new()),
            kind => {
                return Err(Error::new(
                    ErrorKind::InvalidArguments,
                    format!("render context must be a map, not {kind}"),
                ))
            }
        };
        Ok(State {
            pc: 0,
            scope,
            loops: Vec::new(),
        })
    }

    /// Looks up a variable in the render scope.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scope.get_attr(name)
    }

    /// Returns the render scope.
    pub fn scope(&self) -> &Value {
        &self.scope
    }
}
