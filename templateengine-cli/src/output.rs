use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use tempfile::NamedTempFile;

/// The path that stands for stdin (template, data) or stdout (output).
pub const STDIN_STDOUT: &str = "-";

enum Target {
    Stdout(io::Stdout),
    File {
        dest: PathBuf,
        temp: NamedTempFile,
    },
}

/// Where rendered output goes.
///
/// File output is staged in a temporary file in the destination directory
/// and only moved over the destination by [`commit`](Output::commit), so a
/// failed render never leaves a half written file behind.
pub struct Output {
    target: Target,
}

impl Output {
    pub fn new(filename: &Path) -> Result<Output, Error> {
        if filename == Path::new(STDIN_STDOUT) {
            return Ok(Output {
                target: Target::Stdout(io::stdout()),
            });
        }
        let dest = std::env::current_dir()?.join(filename);
        let dir = dest
            .parent()
            .ok_or_else(|| anyhow!("cannot write to root"))?;
        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("unable to create output file in '{}'", dir.display()))?;
        Ok(Output {
            target: Target::File { dest, temp },
        })
    }

    pub fn commit(self) -> Result<(), Error> {
        match self.target {
            Target::Stdout(mut stdout) => stdout.flush()?,
            Target::File { dest, temp } => {
                log::debug!("writing output to {}", dest.display());
                temp.persist(&dest)
                    .with_context(|| format!("unable to write output file '{}'", dest.display()))?;
            }
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.target {
            Target::Stdout(ref mut out) => out.write(buf),
            Target::File { ref mut temp, .. } => temp.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.target {
            Target::Stdout(ref mut out) => out.flush(),
            Target::File { ref mut temp, .. } => temp.flush(),
        }
    }
}
