use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::compiler::tokens::Token;

/// Number of lines shown before and after the offending token.
const EXCERPT_LINES_AROUND: usize = 4;

/// Represents template errors.
///
/// Errors raised while resolving or compiling a template point at the
/// offending token.  Formatting such an error with the alternative
/// formatting (``format!("{:#}", err)``) renders an excerpt of the
/// template source with the token underlined.
///
/// # Example
///
/// ```rust
/// # use templateengine::Environment;
/// let env = Environment::new();
/// match env.template_from_str("{% if x %}never closed") {
///     Ok(_) => unreachable!(),
///     Err(err) => {
///         eprintln!("Could not compile template:");
///         eprintln!("{:#}", err);
///     }
/// }
/// ```
pub struct Error {
    repr: Box<ErrorRepr>,
}

struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    line: Option<usize>,
    span: Option<ErrorSpan>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

struct ErrorSpan {
    template: Arc<str>,
    start: usize,
    end: usize,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind())
            .field("detail", &self.repr.detail)
            .field("line", &self.repr.line)
            .field("source", &self.repr.source)
            .finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A template or one of its includes or parents does not exist.
    TemplateNotFound,
    /// The template has a structural or expression syntax error.
    SyntaxError,
    /// An operation was attempted on values that do not support it.
    InvalidOperation,
    /// A name was referenced that is not defined.
    UndefinedError,
    /// A function or method was called with the wrong arguments.
    InvalidArguments,
    /// An unknown function was called.
    UnknownFunction,
    /// An unknown method was called.
    UnknownMethod,
    /// A string literal contains an invalid escape sequence.
    BadEscape,
    /// A value could not be converted into the engine's value type.
    BadSerialization,
    /// Reading a template failed.
    Io,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::InvalidArguments => "invalid arguments",
            ErrorKind::UnknownFunction => "unknown function",
            ErrorKind::UnknownMethod => "unknown method",
            ErrorKind::BadEscape => "bad string escape",
            ErrorKind::BadSerialization => "could not serialize to value",
            ErrorKind::Io => "i/o error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            if let Some(excerpt) = self.display_excerpt() {
                write!(f, "{excerpt}\n\n")?;
            }
        }
        if let Some(ref detail) = self.repr.detail {
            write!(f, "{}: {}", self.kind(), detail)?;
        } else {
            write!(f, "{}", self.kind())?;
        }
        if let Some(line) = self.repr.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: Some(detail.into()),
                line: None,
                span: None,
                source: None,
            }),
        }
    }

    pub(crate) fn new_not_found(path: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("Template file not found: {path}"),
        )
    }

    /// Creates a syntax error pointing at a token.
    pub(crate) fn syntax<D: Into<Cow<'static, str>>>(token: &Token<'_>, detail: D) -> Error {
        Error::new(ErrorKind::SyntaxError, detail).with_token(token)
    }

    /// Attaches the position of a token to the error.
    pub(crate) fn with_token(mut self, token: &Token<'_>) -> Error {
        self.repr.line = Some(token.line());
        self.repr.span = Some(ErrorSpan {
            template: Arc::from(token.template()),
            start: token.start(),
            end: token.end(),
        });
        self
    }

    /// Records the template line on errors that do not carry one yet.
    pub(crate) fn set_line(&mut self, line: usize) {
        if self.repr.line.is_none() {
            self.repr.line = Some(line);
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the error detail
    ///
    /// The detail is an error message that provides further details about
    /// the error kind.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the line (1-based) of the template this error refers to.
    pub fn line(&self) -> Option<usize> {
        self.repr.line
    }

    /// Returns the byte range of the offending token if available.
    pub fn range(&self) -> Option<std::ops::Range<usize>> {
        self.repr.span.as_ref().map(|x| x.start..x.end)
    }

    /// Returns the template source the offending token was found in.
    ///
    /// For errors raised during structural resolution this is the template
    /// as it looked at the time of the error, which can already contain
    /// spliced in includes.
    pub fn template_source(&self) -> Option<&str> {
        self.repr.span.as_ref().map(|x| &x.template[..])
    }

    /// Returns an object that renders the underlined source excerpt.
    ///
    /// This is what the alternate display of the error uses.  It returns
    /// `None` if the error does not point at a token.
    pub fn display_excerpt(&self) -> Option<impl fmt::Display + '_> {
        self.repr.span.as_ref().map(|span| Excerpt { span })
    }
}

fn skipped_lines_message(count: usize) -> String {
    format!("[{} line{} skipped]", count, if count > 1 { "s" } else { "" })
}

struct Excerpt<'a> {
    span: &'a ErrorSpan,
}

impl<'a> fmt::Display for Excerpt<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let template = &self.span.template[..];
        let before = &template[..self.span.start];
        let line_start = before.rfind('\n').map_or(0, |x| x + 1);
        let line_end = template[self.span.start..]
            .find('\n')
            .map_or(template.len(), |x| x + self.span.start);
        let token_end = self.span.end.min(line_end).max(self.span.start);

        let lines_before = before[..line_start].split_terminator('\n').collect::<Vec<_>>();
        let lines_after = if line_end < template.len() {
            template[line_end + 1..].split('\n').collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        let mut out = Vec::new();
        let skip = lines_before.len().saturating_sub(EXCERPT_LINES_AROUND);
        if skip > 0 {
            out.push(skipped_lines_message(skip));
        }
        out.extend(lines_before[skip..].iter().map(|x| x.to_string()));
        out.push(template[line_start..line_end].to_string());
        out.push(format!(
            "{}{}",
            " ".repeat(template[line_start..self.span.start].chars().count()),
            "^".repeat(template[self.span.start..token_end].chars().count().max(1))
        ));
        let shown = lines_after.len().min(EXCERPT_LINES_AROUND);
        out.extend(lines_after[..shown].iter().map(|x| x.to_string()));
        if lines_after.len() > shown {
            out.push(skipped_lines_message(lines_after.len() - shown));
        }

        write!(f, "{}", out.join("\n"))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                line: None,
                span: None,
                source: None,
            }),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string()).with_source(err)
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
