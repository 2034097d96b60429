use std::fmt;
use std::str::Chars;

use crate::error::{Error, ErrorKind};

/// Controls the autoescaping behavior of `{{ ... }}` output.
///
/// The mode is switched with `{% autoescape on %}` and
/// `{% autoescape off %}` and is decided when a template is compiled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AutoEscape {
    /// Do not apply auto escaping.
    None,
    /// Escape output with [`safe_html`].
    #[default]
    Html,
}

/// Escapes a value for HTML with named character entities.
///
/// The value is first converted into a string through its [`Display`](fmt::Display)
/// implementation.  Afterwards `&` and `;` as well as a wide range of
/// punctuation characters are replaced by their named HTML entities, so that
/// `1e-10` becomes `1e&minus;10` and `<b>` becomes `&lt;b&gt;`.
///
/// ```
/// # use templateengine::safe_html;
/// assert_eq!(safe_html(&"<a href=\"x\">"), "&lt;a href&equals;&quot;x&quot;&gt;");
/// ```
pub fn safe_html<D: fmt::Display + ?Sized>(value: &D) -> String {
    HtmlEntities(&value.to_string()).to_string()
}

fn named_entity(c: char) -> Option<&'static str> {
    Some(match c {
        '&' => "&amp;",
        ';' => "&semi;",
        '"' => "&quot;",
        '_' => "&lowbar;",
        '-' => "&minus;",
        ',' => "&comma;",
        ':' => "&colon;",
        '!' => "&excl;",
        '?' => "&quest;",
        '.' => "&period;",
        '\'' => "&apos;",
        '(' => "&lpar;",
        ')' => "&rpar;",
        '[' => "&lsqb;",
        ']' => "&rsqb;",
        '{' => "&lcub;",
        '}' => "&rcub;",
        '@' => "&commat;",
        '*' => "&ast;",
        '/' => "&sol;",
        '\\' => "&bsol;",
        '#' => "&num;",
        '%' => "&percnt;",
        '`' => "&grave;",
        '^' => "&Hat;",
        '+' => "&plus;",
        '<' => "&lt;",
        '=' => "&equals;",
        '>' => "&gt;",
        '|' => "&vert;",
        '~' => "&tilde;",
        '$' => "&dollar;",
        _ => return None,
    })
}

/// Helper to HTML escape a string with named entities.
///
/// Every replacement is a single character and none of the entities
/// contain a character other than `&`, `;` and letters, so a single pass
/// is equivalent to replacing `&` and `;` first and the rest afterwards.
pub struct HtmlEntities<'a>(pub &'a str);

impl<'a> fmt::Display for HtmlEntities<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        let mut start = 0;
        for (idx, c) in s.char_indices() {
            if let Some(entity) = named_entity(c) {
                if start < idx {
                    ok!(f.write_str(&s[start..idx]));
                }
                ok!(f.write_str(entity));
                start = idx + c.len_utf8();
            }
        }
        if start < s.len() {
            f.write_str(&s[start..])
        } else {
            Ok(())
        }
    }
}

struct Unescaper {
    out: String,
}

impl Unescaper {
    fn unescape(mut self, s: &str) -> Result<String, Error> {
        let mut char_iter = s.chars();

        while let Some(c) = char_iter.next() {
            if c == '\\' {
                match char_iter.next() {
                    None => return Err(ErrorKind::BadEscape.into()),
                    Some(d) => match d {
                        '"' | '\\' | '/' | '\'' => self.out.push(d),
                        'a' => self.out.push('\x07'),
                        'b' => self.out.push('\x08'),
                        'f' => self.out.push('\x0C'),
                        'n' => self.out.push('\n'),
                        'r' => self.out.push('\r'),
                        't' => self.out.push('\t'),
                        'v' => self.out.push('\x0B'),
                        '0' => self.out.push('\0'),
                        'x' => ok!(self.push_hex(&mut char_iter, 2)),
                        'u' => ok!(self.push_hex(&mut char_iter, 4)),
                        'U' => ok!(self.push_hex(&mut char_iter, 8)),
                        _ => return Err(ErrorKind::BadEscape.into()),
                    },
                }
            } else {
                self.out.push(c);
            }
        }

        Ok(self.out)
    }

    fn push_hex(&mut self, chars: &mut Chars, digits: usize) -> Result<(), Error> {
        let hexnum = chars.take(digits).collect::<String>();
        if hexnum.len() != digits {
            return Err(ErrorKind::BadEscape.into());
        }
        let c = u32::from_str_radix(&hexnum, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::from(ErrorKind::BadEscape))?;
        self.out.push(c);
        Ok(())
    }
}

/// Un-escape a string literal body.
pub fn unescape(s: &str) -> Result<String, Error> {
    Unescaper { out: String::new() }.unescape(s)
}
