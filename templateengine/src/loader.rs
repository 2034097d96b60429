use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// The type of loader functions accepted by an
/// [`Environment`](crate::Environment).
pub type LoaderFn = dyn Fn(&str) -> Result<Option<String>, Error> + Send + Sync;

/// Safely joins two paths.
///
/// Segments starting with a dot (which covers `..`) and segments containing
/// backslashes are rejected.
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

fn read_regular_file(path: &Path) -> Result<Option<String>, Error> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path, err)),
    }
    match fs::read_to_string(path) {
        Ok(source) => Ok(Some(source)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(path, err)),
    }
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("could not read template {}", path.display()),
    )
    .with_source(err)
}

/// Loads templates from the file system.
///
/// Paths are used as given, so relative paths resolve against the current
/// working directory.  This is the loader of a new
/// [`Environment`](crate::Environment).  Only regular files are loaded;
/// directories and missing paths report "not found".
pub fn fs_loader() -> impl Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    |path| read_regular_file(Path::new(path))
}

/// Helper to load templates from a given directory.
///
/// This creates a dynamic loader which looks up templates in the
/// given directory.  Templates that start with a dot (`.`) or are contained in
/// a folder starting with a dot cannot be loaded.
///
/// # Example
///
/// ```rust
/// # use templateengine::{path_loader, Environment};
/// fn create_env() -> Environment {
///     let mut env = Environment::new();
///     env.set_loader(path_loader("path/to/templates"));
///     env
/// }
/// ```
pub fn path_loader<P: AsRef<Path>>(
    dir: P,
) -> impl Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| match safe_join(&dir, name) {
        Some(path) => read_regular_file(&path),
        None => Ok(None),
    }
}
