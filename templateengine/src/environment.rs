use std::fmt;
use std::sync::Arc;

use memo_map::MemoMap;
use serde::Serialize;

use crate::compiler::scanner::WhitespaceConfig;
use crate::error::Error;
use crate::loader::{fs_loader, LoaderFn};
use crate::template::{CompiledTemplate, FileTemplate, RenderIter, Template};

/// The key under which a template is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// A template compiled from a source string, keyed by the full source.
    Source(String),
    /// A template loaded from a path.
    Path(String),
}

/// Caches compiled templates.
///
/// The cache can be shared between threads.  When two threads compile the
/// same key at once only one of the results is stored and both callers get
/// a complete template.  Entries are never evicted.
#[derive(Default)]
pub struct TemplateCache {
    templates: MemoMap<CacheKey, Template>,
}

impl fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut l = f.debug_list();
        for key in self.templates.keys() {
            l.entry(key);
        }
        l.finish()
    }
}

impl TemplateCache {
    /// Creates an empty cache.
    pub fn new() -> TemplateCache {
        TemplateCache::default()
    }

    /// Returns the number of cached templates.
    pub fn len(&self) -> usize {
        self.templates.keys().count()
    }

    /// Returns `true` if nothing was cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if a key is cached.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.templates.contains_key(key)
    }

    /// Removes all templates.
    pub fn clear(&mut self) {
        self.templates.clear();
    }

    /// Looks up a template or compiles and stores it.
    pub fn get_or_try_insert<F>(&self, key: &CacheKey, f: F) -> Result<Template, Error>
    where
        F: FnOnce() -> Result<Template, Error>,
    {
        if self.templates.contains_key(key) {
            log::trace!("template cache hit for {key:?}");
        } else {
            log::trace!("template cache miss for {key:?}");
        }
        self.templates.get_or_try_insert(key, f).cloned()
    }
}

/// An abstraction that holds the engine configuration.
///
/// The environment holds the whitespace settings, the loader used for
/// file templates, includes and extends, and the template cache.  All
/// render entry points take a `cache` flag: when set, templates are looked
/// up in the cache and stored there after compilation, otherwise they are
/// compiled fresh and discarded after use.
///
/// ```
/// # use templateengine::{Environment, context};
/// let env = Environment::new();
/// let rv = env.render_str("Hello {{ name }}!", context!(name => "World"), true);
/// assert_eq!(rv.unwrap(), "Hello World!");
/// ```
pub struct Environment {
    whitespace: WhitespaceConfig,
    loader: Arc<LoaderFn>,
    cache: TemplateCache,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("whitespace", &self.whitespace)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment with default settings.
    ///
    /// Templates are loaded from the file system with
    /// [`fs_loader`](crate::fs_loader) and both `trim_blocks` and
    /// `lstrip_blocks` are enabled.
    pub fn new() -> Environment {
        Environment {
            whitespace: WhitespaceConfig::default(),
            loader: Arc::new(fs_loader()),
            cache: TemplateCache::new(),
        }
    }

    /// Removes the first newline after a statement tag.
    ///
    /// Changing the setting clears the cache.
    pub fn set_trim_blocks(&mut self, yes: bool) {
        self.whitespace.trim_blocks = yes;
        self.cache.clear();
    }

    /// Returns the value of the trim blocks flag.
    pub fn trim_blocks(&self) -> bool {
        self.whitespace.trim_blocks
    }

    /// Strips spaces and tabs in front of a statement tag on its own line.
    ///
    /// Changing the setting clears the cache.
    pub fn set_lstrip_blocks(&mut self, yes: bool) {
        self.whitespace.lstrip_blocks = yes;
        self.cache.clear();
    }

    /// Returns the value of the lstrip blocks flag.
    pub fn lstrip_blocks(&self) -> bool {
        self.whitespace.lstrip_blocks
    }

    /// Returns the whitespace configuration.
    pub fn whitespace_config(&self) -> WhitespaceConfig {
        self.whitespace
    }

    /// Registers a template loader.
    ///
    /// The loader is invoked with paths of file templates as well as the
    /// targets of `{% include %}` and `{% extends %}`.  `Ok(None)` means the
    /// template does not exist.  Setting a loader clears the cache.
    ///
    /// ```
    /// # use templateengine::Environment;
    /// let mut env = Environment::new();
    /// env.set_loader(|path| match path {
    ///     "base.html" => Ok(Some("<h1>{% block title %}{% endblock %}</h1>".into())),
    ///     _ => Ok(None),
    /// });
    /// let tmpl = env
    ///     .template_from_str("{% extends 'base.html' %}{% block title %}Hi{% endblock %}")
    ///     .unwrap();
    /// assert_eq!(tmpl.render(()).unwrap(), "<h1>Hi</h1>");
    /// ```
    pub fn set_loader<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.loader = Arc::new(f);
        self.cache.clear();
    }

    /// Returns the template cache.
    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Returns the template cache mutably.
    pub fn cache_mut(&mut self) -> &mut TemplateCache {
        &mut self.cache
    }

    fn load(&self, path: &str) -> Result<Option<String>, Error> {
        log::debug!("loading template {path:?}");
        (self.loader)(path)
    }

    fn compile(&self, source: &str) -> Result<Template, Error> {
        let load = |path: &str| self.load(path);
        CompiledTemplate::new(source, &load, self.whitespace).map(Template::new)
    }

    /// Compiles a template from a string without caching it.
    ///
    /// Fails with a syntax error if the template is malformed and with
    /// `TemplateNotFound` if an include or extends target is missing.
    pub fn template_from_str(&self, source: &str) -> Result<Template, Error> {
        self.compile(source)
    }

    /// Loads and compiles a template file without caching it.
    pub fn file_template(&self, path: &str) -> Result<FileTemplate, Error> {
        let source = match ok!(self.load(path)) {
            Some(source) => source,
            None => return Err(Error::new_not_found(path)),
        };
        self.compile(&source)
            .map(|template| FileTemplate::new(path, template))
    }

    /// Returns the template for a source string, consulting the cache if
    /// `cache` is set.
    pub fn get_str_template(&self, source: &str, cache: bool) -> Result<Template, Error> {
        if cache {
            self.cache
                .get_or_try_insert(&CacheKey::Source(source.to_string()), || {
                    self.compile(source)
                })
        } else {
            self.compile(source)
        }
    }

    /// Returns the template for a file, consulting the cache if `cache` is
    /// set.
    pub fn get_file_template(&self, path: &str, cache: bool) -> Result<FileTemplate, Error> {
        if cache {
            self.cache
                .get_or_try_insert(&CacheKey::Path(path.to_string()), || {
                    self.file_template(path).map(|x| x.template().clone())
                })
                .map(|template| FileTemplate::new(path, template))
        } else {
            self.file_template(path)
        }
    }

    /// Renders a template from a string into a string.
    pub fn render_str<S: Serialize>(
        &self,
        source: &str,
        ctx: S,
        cache: bool,
    ) -> Result<String, Error> {
        ok!(self.get_str_template(source, cache)).render(ctx)
    }

    /// Renders a template from a string lazily.
    ///
    /// Compile errors are returned immediately; render errors are yielded by
    /// the iterator.  With a `chunk_size` the output is re-buffered into
    /// pieces of that many characters.
    pub fn render_str_iter<S: Serialize>(
        &self,
        source: &str,
        ctx: S,
        chunk_size: Option<usize>,
        cache: bool,
    ) -> Result<RenderIter, Error> {
        let template = ok!(self.get_str_template(source, cache));
        Ok(chunk(template.render_iter(ctx), chunk_size))
    }

    /// Renders a template file into a string.
    pub fn render_template<S: Serialize>(
        &self,
        path: &str,
        ctx: S,
        cache: bool,
    ) -> Result<String, Error> {
        ok!(self.get_file_template(path, cache)).render(ctx)
    }

    /// Renders a template file lazily.
    pub fn render_template_iter<S: Serialize>(
        &self,
        path: &str,
        ctx: S,
        chunk_size: Option<usize>,
        cache: bool,
    ) -> Result<RenderIter, Error> {
        let template = ok!(self.get_file_template(path, cache));
        Ok(chunk(template.render_iter(ctx), chunk_size))
    }
}

fn chunk(iter: RenderIter, chunk_size: Option<usize>) -> RenderIter {
    match chunk_size {
        Some(size) => iter.chunked(size),
        None => iter,
    }
}
