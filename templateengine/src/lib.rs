//! A small template engine with template inheritance, includes and lazy,
//! chunked rendering.
//!
//! Templates mix literal text with directives.  Expressions are written as
//! `{{ expr }}` and are HTML-entity-escaped unless autoescaping is turned
//! off.  Statements are written as `{% ... %}`:
//!
//! ```text
//! {% extends "base.html" %}
//! {% block content %}
//!   {% for user in users %}
//!     <li>{{ user.name }}</li>
//!   {% empty %}
//!     <li>nobody here</li>
//!   {% endfor %}
//! {% endblock %}
//! ```
//!
//! Includes, inheritance and comments are resolved into a single flattened
//! template first, which is then compiled into instructions for a small
//! virtual machine.  Rendering is pull based: nothing is evaluated until the
//! consumer asks for the next piece of output.
//!
//! # Template Usage
//!
//! To pass data one can pass any serde serializable value that serializes
//! into a map.  The [`context!`] macro can be used to quickly construct a
//! template context:
//!
//! ```
//! use templateengine::{Environment, context};
//!
//! let env = Environment::new();
//! let tmpl = env.template_from_str("Hello {{ name }}!").unwrap();
//! assert_eq!(tmpl.render(context!(name => "John")).unwrap(), "Hello John!");
//! ```
//!
//! For one-off renders the crate level functions use a process wide default
//! environment which caches compiled templates:
//!
//! ```
//! # use templateengine::context;
//! let rv = templateengine::render_string("{{ a + b }}", context!(a => 1, b => 2), true);
//! assert_eq!(rv.unwrap(), "3");
//! ```
//!
//! # Expressions
//!
//! Expressions use a safe subset of Python's expression syntax: arithmetic,
//! comparisons, `and`/`or`/`not`, conditional expressions, subscripts,
//! slices, list and dict literals, a set of builtin functions (`len`,
//! `range`, `sorted`, ...) and methods on strings, lists and dicts.
//! `{% exec %}` runs assignments and method calls that modify the render
//! scope:
//!
//! ```
//! # use templateengine::{Environment, context};
//! let env = Environment::new();
//! let rv = env.render_str(
//!     "{% exec items.append(3); total = sum(items) %}{{ len(items) }} items, {{ total }} total",
//!     context!(items => vec![1, 2]),
//!     false,
//! );
//! assert_eq!(rv.unwrap(), "3 items, 6 total");
//! ```
//!
//! # Optional Features
//!
//! - `preserve_order`: maps keep insertion order instead of sorting keys.
//! - `unicode`: identifiers follow the unicode identifier rules.
//! - `unstable_machinery`: exposes the scanner, resolver and compiler.
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::needless_borrowed_reference)]
#![deny(missing_docs)]

use std::sync::OnceLock;

use serde::Serialize;

#[macro_use]
mod macros;

mod compiler;
mod environment;
mod error;
mod functions;
mod loader;
mod methods;
mod template;
mod utils;
mod vm;

pub mod value;

pub use self::compiler::scanner::WhitespaceConfig;
pub use self::environment::{CacheKey, Environment, TemplateCache};
pub use self::error::{Error, ErrorKind};
pub use self::loader::{fs_loader, path_loader, safe_join};
pub use self::template::{FileTemplate, RenderIter, Template};
pub use self::utils::{safe_html, AutoEscape};

/// Re-export for convenience.
pub use self::value::Value;

pub use self::macros::__context;
pub use self::vm::State;

fn default_env() -> &'static Environment {
    static ENV: OnceLock<Environment> = OnceLock::new();
    ENV.get_or_init(Environment::new)
}

/// Renders a template from a string with the default environment.
///
/// ```
/// # use templateengine::context;
/// let rv = templateengine::render_string("Hello {{ name }}!", context!(name => "World"), true);
/// assert_eq!(rv.unwrap(), "Hello World!");
/// ```
pub fn render_string<S: Serialize>(source: &str, ctx: S, cache: bool) -> Result<String, Error> {
    default_env().render_str(source, ctx, cache)
}

/// Renders a template from a string lazily with the default environment.
///
/// ```
/// # use templateengine::context;
/// let chunks = templateengine::render_string_iter(
///     "Hello {{ name }}!",
///     context!(name => "World"),
///     Some(3),
///     true,
/// )
/// .unwrap()
/// .collect::<Result<Vec<_>, _>>()
/// .unwrap();
/// assert_eq!(chunks, ["Hel", "lo ", "Wor", "ld!"]);
/// ```
pub fn render_string_iter<S: Serialize>(
    source: &str,
    ctx: S,
    chunk_size: Option<usize>,
    cache: bool,
) -> Result<RenderIter, Error> {
    default_env().render_str_iter(source, ctx, chunk_size, cache)
}

/// Renders a template file with the default environment.
///
/// Paths are resolved relative to the current working directory.
pub fn render_template<S: Serialize>(path: &str, ctx: S, cache: bool) -> Result<String, Error> {
    default_env().render_template(path, ctx, cache)
}

/// Renders a template file lazily with the default environment.
pub fn render_template_iter<S: Serialize>(
    path: &str,
    ctx: S,
    chunk_size: Option<usize>,
    cache: bool,
) -> Result<RenderIter, Error> {
    default_env().render_template_iter(path, ctx, chunk_size, cache)
}

/// This module gives access to the low level machinery.
///
/// This module is only provided by the `unstable_machinery` feature and does not
/// have a stable interface.  It mostly exists for internal testing purposes and
/// for debugging.
#[cfg(feature = "unstable_machinery")]
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::codegen::CodeGenerator;
    pub use crate::compiler::instructions::{Instruction, Instructions};
    pub use crate::compiler::parser::{parse_exec, parse_expr, parse_for_loop};
    pub use crate::compiler::resolver::{LoadFn, Resolver};
    pub use crate::compiler::scanner::{find_token, tokens};
    pub use crate::compiler::tokens::Token;
    pub use crate::template::CompiledTemplate;
    pub use crate::vm::Vm;

    /// Returns the [`CompiledTemplate`] behind a [`Template`](crate::Template).
    pub fn get_compiled_template(tmpl: &crate::Template) -> &CompiledTemplate {
        tmpl.compiled()
    }
}
