use std::fmt;
use std::iter::FusedIterator;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::codegen::CodeGenerator;
use crate::compiler::instructions::Instructions;
use crate::compiler::resolver::{LoadFn, Resolver};
use crate::compiler::scanner::WhitespaceConfig;
use crate::error::{Error, ErrorKind};
use crate::value::Value;
use crate::vm::{State, Vm};

/// Represents a compiled template in memory.
pub struct CompiledTemplate {
    /// The template source after includes, extends and comments were resolved.
    pub source: String,
    /// The instructions compiled from the flattened source.
    pub instructions: Instructions,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("CompiledTemplate");
        ds.field("source", &self.source);
        #[cfg(feature = "unstable_machinery")]
        {
            ds.field("instructions", &self.instructions);
        }
        ds.finish()
    }
}

impl CompiledTemplate {
    /// Flattens and compiles a template source.
    pub fn new(
        source: &str,
        load: &LoadFn<'_>,
        whitespace: WhitespaceConfig,
    ) -> Result<CompiledTemplate, Error> {
        let flattened = ok!(Resolver::new(load, whitespace).resolve(source));
        let instructions = ok!(CodeGenerator::new(&flattened, whitespace).compile());
        log::debug!(
            "compiled template ({} bytes flattened, {} instructions)",
            flattened.len(),
            instructions.len()
        );
        Ok(CompiledTemplate {
            source: flattened,
            instructions,
        })
    }
}

/// Represents a handle to a compiled template.
///
/// Templates are created through an [`Environment`](crate::Environment).
/// The handle is cheap to clone and can be shared between threads; every
/// render works on its own copy of the context so rendering the same
/// template repeatedly with different contexts is free of side effects.
#[derive(Clone)]
pub struct Template {
    compiled: Arc<CompiledTemplate>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("compiled", &self.compiled)
            .finish()
    }
}

impl Template {
    pub(crate) fn new(compiled: CompiledTemplate) -> Template {
        Template {
            compiled: Arc::new(compiled),
        }
    }

    /// Returns the flattened source the template was compiled from.
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    /// Returns the compiled template.
    #[cfg(feature = "unstable_machinery")]
    pub fn compiled(&self) -> &CompiledTemplate {
        &self.compiled
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.
    /// It can be any object that implements [`Serialize`] and serializes
    /// into a map, or `()` for an empty context.
    ///
    /// ```
    /// # use templateengine::{Environment, context};
    /// let env = Environment::new();
    /// let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
    /// assert_eq!(tmpl.render(context!(name => "World")).unwrap(), "Hello World!");
    /// ```
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        self._render(Value::try_from_serialize(&ctx))
    }

    fn _render(&self, ctx: Result<Value, Error>) -> Result<String, Error> {
        let vm = Vm::new(&self.compiled.instructions);
        let mut state = ok!(ctx.and_then(|ctx| vm.new_state(ctx)));
        vm.render_to_string(&mut state)
    }

    /// Renders the template lazily.
    ///
    /// Nothing is evaluated until the returned iterator is advanced.  Every
    /// item is a fragment of output; an error ends the iteration.
    ///
    /// ```
    /// # use templateengine::{Environment, context};
    /// let env = Environment::new();
    /// let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
    /// let chunks = tmpl
    ///     .render_iter(context!(name => "World"))
    ///     .chunked(3)
    ///     .collect::<Result<Vec<_>, _>>()
    ///     .unwrap();
    /// assert_eq!(chunks, ["Hel", "lo ", "Wor", "ld!"]);
    /// ```
    pub fn render_iter<S: Serialize>(&self, ctx: S) -> RenderIter {
        RenderIter::new(
            self.compiled.clone(),
            Value::try_from_serialize(&ctx).and_then(State::new),
        )
    }
}

/// A template loaded from a file.
///
/// Dereferences to [`Template`] for rendering.
#[derive(Clone)]
pub struct FileTemplate {
    path: Arc<str>,
    template: Template,
}

impl fmt::Debug for FileTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTemplate")
            .field("path", &self.path)
            .field("template", &self.template)
            .finish()
    }
}

impl FileTemplate {
    pub(crate) fn new(path: &str, template: Template) -> FileTemplate {
        FileTemplate {
            path: Arc::from(path),
            template,
        }
    }

    /// Returns the path the template was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the underlying template.
    pub fn template(&self) -> &Template {
        &self.template
    }
}

impl Deref for FileTemplate {
    type Target = Template;

    fn deref(&self) -> &Template {
        &self.template
    }
}

/// A lazy render of a template.
///
/// Yields output fragments as the template is evaluated.  After the first
/// error, or once the template finished, the iterator only returns `None`.
/// Use [`chunked`](Self::chunked) to receive pieces of a fixed size.
pub struct RenderIter {
    compiled: Arc<CompiledTemplate>,
    state: Option<State>,
    error: Option<Error>,
    chunk_size: Option<usize>,
    buf: String,
    buf_chars: usize,
    yielded: bool,
}

impl fmt::Debug for RenderIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderIter")
            .field("finished", &(self.state.is_none() && self.error.is_none()))
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl RenderIter {
    fn new(compiled: Arc<CompiledTemplate>, state: Result<State, Error>) -> RenderIter {
        let (state, error) = match state {
            Ok(state) => (Some(state), None),
            Err(err) => (None, Some(err)),
        };
        RenderIter {
            compiled,
            state,
            error,
            chunk_size: None,
            buf: String::new(),
            buf_chars: 0,
            yielded: false,
        }
    }

    /// Re-buffers the output into pieces of `size` characters.
    ///
    /// Only the last piece may be shorter.  If the template produces no
    /// output at all a single empty piece is yielded.  A size of zero is
    /// reported as an error.
    pub fn chunked(mut self, size: usize) -> RenderIter {
        if size == 0 {
            self.state = None;
            self.error = Some(Error::new(
                ErrorKind::InvalidArguments,
                "chunk size must be greater than zero",
            ));
        }
        self.chunk_size = Some(size);
        self
    }

    fn next_fragment(&mut self) -> Option<Result<String, Error>> {
        if let Some(err) = self.error.take() {
            return Some(Err(err));
        }
        let state = self.state.as_mut()?;
        match Vm::new(&self.compiled.instructions).next_fragment(state) {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.state = None;
                None
            }
            Err(err) => {
                self.state = None;
                Some(Err(err))
            }
        }
    }

    fn next_chunk(&mut self, size: usize) -> Option<Result<String, Error>> {
        loop {
            if self.buf_chars >= size {
                let idx = self
                    .buf
                    .char_indices()
                    .nth(size)
                    .map_or(self.buf.len(), |(idx, _)| idx);
                let rest = self.buf.split_off(idx);
                self.buf_chars -= size;
                self.yielded = true;
                return Some(Ok(mem::replace(&mut self.buf, rest)));
            }
            match self.next_fragment() {
                Some(Ok(fragment)) => {
                    self.buf_chars += fragment.chars().count();
                    self.buf.push_str(&fragment);
                }
                Some(Err(err)) => {
                    self.buf.clear();
                    self.buf_chars = 0;
                    self.yielded = true;
                    return Some(Err(err));
                }
                None if !self.buf.is_empty() || !self.yielded => {
                    self.buf_chars = 0;
                    self.yielded = true;
                    return Some(Ok(mem::take(&mut self.buf)));
                }
                None => return None,
            }
        }
    }
}

impl Iterator for RenderIter {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.chunk_size {
            Some(size) if size > 0 => self.next_chunk(size),
            _ => self.next_fragment(),
        }
    }
}

impl FusedIterator for RenderIter {}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn compile(source: &str) -> Template {
        let load = |_: &str| Ok::<_, Error>(None);
        Template::new(CompiledTemplate::new(source, &load, WhitespaceConfig::default()).unwrap())
    }

    fn collect(iter: RenderIter) -> Vec<String> {
        iter.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn test_chunked() {
        let tmpl = compile("Hello {{ name }}!");
        let ctx = crate::context!(name => "CircuitPython");
        assert_eq!(
            collect(tmpl.render_iter(&ctx).chunked(3)),
            ["Hel", "lo ", "Cir", "cui", "tPy", "tho", "n!"]
        );
        assert_eq!(
            collect(tmpl.render_iter(&ctx).chunked(1000)),
            ["Hello CircuitPython!"]
        );
        assert_eq!(collect(tmpl.render_iter(&ctx)), ["Hello ", "CircuitPython", "!"]);
    }

    #[test]
    fn test_chunked_counts_characters() {
        let tmpl = compile("{% autoescape off %}{{ word }}{% endautoescape %}");
        let ctx = crate::context!(word => "grüße");
        assert_eq!(collect(tmpl.render_iter(&ctx).chunked(2)), ["gr", "üß", "e"]);
    }

    #[test]
    fn test_empty_output() {
        let tmpl = compile("{% if False %}x{% endif %}");
        assert_eq!(collect(tmpl.render_iter(()).chunked(4)), [""]);
        assert_eq!(collect(tmpl.render_iter(())), Vec::<String>::new());
        assert_eq!(tmpl.render(()).unwrap(), "");

        // without any output statement the program still emits one
        // empty fragment
        let tmpl = compile("{% exec x = 1 %}");
        assert_eq!(collect(tmpl.render_iter(())), [""]);
        assert_eq!(collect(tmpl.render_iter(()).chunked(4)), [""]);
        assert_eq!(tmpl.render(()).unwrap(), "");
    }

    #[test]
    fn test_chunked_many_fragments() {
        let tmpl = compile(
            "{% autoescape off %}{% for i in range(2000) %}{{ 'ä' }}b{% endfor %}{% endautoescape %}",
        );
        let chunks = collect(tmpl.render_iter(()).chunked(1500));
        assert_eq!(
            chunks.iter().map(|x| x.chars().count()).collect::<Vec<_>>(),
            [1500, 1500, 1000]
        );
        assert_eq!(chunks.concat(), "äb".repeat(2000));
    }

    #[test]
    fn test_fused_after_error() {
        let tmpl = compile("a{{ missing }}b");
        let mut iter = tmpl.render_iter(());
        assert_eq!(iter.next().unwrap().unwrap(), "a");
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedError);
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());

        let mut iter = tmpl.render_iter(()).chunked(10);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_zero_chunk_size() {
        let tmpl = compile("abc");
        let mut iter = tmpl.render_iter(()).chunked(0);
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_render_does_not_touch_context() {
        let tmpl = compile("{% exec items.append(3) %}{% autoescape off %}{{ items }}{% endautoescape %}");
        let ctx = crate::context!(items => vec![1, 2]);
        assert_eq!(tmpl.render(&ctx).unwrap(), "[1, 2, 3]");
        assert_eq!(tmpl.render(&ctx).unwrap(), "[1, 2, 3]");
    }

    #[test]
    fn test_bad_context() {
        let tmpl = compile("abc");
        let err = tmpl.render(vec![1, 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        let mut iter = tmpl.render_iter(42);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
