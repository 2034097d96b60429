//! Locates directives and structural markers in template source.
//!
//! All finders take the template and a byte offset to start searching at
//! and return the first match at or after that offset as a [`Token`].
//! Directive bodies never span lines; block comments do.
use crate::compiler::tokens::Token;

/// Whitespace control applied around statement tags and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitespaceConfig {
    /// Remove the first newline after a statement tag.
    pub trim_blocks: bool,
    /// Strip spaces before a statement tag that starts its own line.
    pub lstrip_blocks: bool,
}

impl Default for WhitespaceConfig {
    fn default() -> WhitespaceConfig {
        WhitespaceConfig {
            trim_blocks: true,
            lstrip_blocks: true,
        }
    }
}

/// Finds the first `closer` on the line starting at `body_start`, leaving
/// at least one character of body.  Returns the end of the closer.
fn find_closing(template: &str, body_start: usize, closer: &str) -> Option<usize> {
    let rest = &template[body_start..];
    let line = &rest[..rest.find('\n').unwrap_or(rest.len())];
    let skip = some!(line.chars().next()).len_utf8();
    line[skip..]
        .find(closer)
        .map(|idx| body_start + skip + idx + closer.len())
}

/// Iterates over the candidate start positions of `prefix`.
fn candidates<'s>(
    template: &'s str,
    from: usize,
    prefix: &'s str,
) -> impl Iterator<Item = usize> + 's {
    template[from..]
        .match_indices(prefix)
        .map(move |(idx, _)| from + idx)
}

fn is_word_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Finds the next `{{ ... }}` or `{% ... %}` directive.
pub fn find_token(template: &str, from: usize) -> Option<Token<'_>> {
    let mut pos = from;
    while let Some(idx) = template[pos..].find('{') {
        let start = pos + idx;
        let rest = &template[start..];
        let closer = if rest.starts_with("{{ ") {
            Some(" }}")
        } else if rest.starts_with("{% ") {
            Some(" %}")
        } else {
            None
        };
        if let Some(closer) = closer {
            if let Some(end) = find_closing(template, start + 3, closer) {
                return Some(Token::new(template, start, end));
            }
        }
        pos = start + 1;
    }
    None
}

fn find_quoted_tag<'s>(template: &'s str, from: usize, tag: &str) -> Option<Token<'s>> {
    let prefix = format!("{{% {tag} ");
    for start in candidates(template, from, &prefix) {
        let body_start = start + prefix.len();
        let closer = match template[body_start..].as_bytes().first() {
            Some(b'\'') => "' %}",
            Some(b'"') => "\" %}",
            _ => continue,
        };
        if let Some(end) = find_closing(template, body_start + 1, closer) {
            return Some(Token::new(template, start, end));
        }
    }
    None
}

/// Finds the next `{% extends "..." %}`.
pub fn find_extends(template: &str, from: usize) -> Option<Token<'_>> {
    find_quoted_tag(template, from, "extends")
}

/// Finds the next `{% include "..." %}`.
pub fn find_include(template: &str, from: usize) -> Option<Token<'_>> {
    find_quoted_tag(template, from, "include")
}

/// Returns the path of an extends or include token.
pub fn quoted_path<'s>(token: &Token<'s>) -> &'s str {
    let content = token.content();
    let start = content.find(['\'', '"']).map_or(0, |x| x + 1);
    &content[start..content.len() - 4]
}

/// Finds the next `{% block NAME %}`.
pub fn find_block(template: &str, from: usize) -> Option<Token<'_>> {
    for start in candidates(template, from, "{% block ") {
        let name_start = start + 9;
        let name_len: usize = template[name_start..]
            .chars()
            .take_while(|&c| is_word_char(c))
            .map(char::len_utf8)
            .sum();
        if name_len > 0 && template[name_start + name_len..].starts_with(" %}") {
            return Some(Token::new(template, start, name_start + name_len + 3));
        }
    }
    None
}

/// Returns the name of a block token.
pub fn block_name<'s>(token: &Token<'s>) -> &'s str {
    let content = token.content();
    &content[9..content.len() - 3]
}

/// Finds the `{% endblock %}` that closes the block `name`.
///
/// `{% endblock name %}` always matches.  An unnamed `{% endblock %}` only
/// matches when no other block opens before it.
pub fn find_endblock<'s>(template: &'s str, from: usize, name: &str) -> Option<Token<'s>> {
    let named = format!("{{% endblock {name} %}}");
    let named_match = template[from..]
        .find(&named)
        .map(|idx| Token::new(template, from + idx, from + idx + named.len()));
    let unnamed = "{% endblock %}";
    let unnamed_match = template[from..]
        .find(unnamed)
        .map(|idx| Token::new(template, from + idx, from + idx + unnamed.len()))
        .filter(|tok| {
            find_block(template, from).map_or(true, |block| block.start() > tok.start())
        });
    match (named_match, unnamed_match) {
        (Some(a), Some(b)) => Some(if a.start() < b.start() { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Finds the next `{# ... #}` comment.
pub fn find_hash_comment(template: &str, from: usize) -> Option<Token<'_>> {
    for start in candidates(template, from, "{# ") {
        if let Some(end) = find_closing(template, start + 3, " #}") {
            return Some(Token::new(template, start, end));
        }
    }
    None
}

/// Finds the next `{% comment %}...{% endcomment %}` block.
///
/// The opening tag may carry a quoted label: `{% comment "why" %}`.
pub fn find_block_comment(template: &str, from: usize) -> Option<Token<'_>> {
    const END: &str = "{% endcomment %}";
    for start in candidates(template, from, "{% comment ") {
        let after = start + 11;
        let rest = &template[after..];
        let open_end = if rest.starts_with("%}") {
            Some(after + 2)
        } else {
            match rest.as_bytes().first() {
                Some(&q @ (b'\'' | b'"')) => {
                    let closer = if q == b'\'' { "' %}" } else { "\" %}" };
                    let line = &rest[1..];
                    let line = &line[..line.find('\n').unwrap_or(line.len())];
                    line.find(closer).map(|idx| after + 1 + idx + closer.len())
                }
                _ => None,
            }
        };
        if let Some(open_end) = open_end {
            if let Some(idx) = template[open_end..].find(END) {
                return Some(Token::new(template, start, open_end + idx + END.len()));
            }
        }
    }
    None
}

/// Finds the first run of non-whitespace characters in `template[from..to]`.
pub fn find_non_whitespace(template: &str, from: usize, to: usize) -> Option<Token<'_>> {
    let rest = &template[from..to];
    let start = from + some!(rest.find(|c: char| !c.is_whitespace()));
    let len = template[start..to]
        .find(char::is_whitespace)
        .unwrap_or(to - start);
    Some(Token::new(template, start, start + len))
}

/// Is a tag preceded by this text alone on its line?
///
/// That is the case when the text ends in a newline followed by one or
/// more spaces.
pub fn is_on_own_line(text_before: &str) -> bool {
    let trimmed = text_before.trim_end_matches(' ');
    trimmed.len() < text_before.len() && trimmed.ends_with('\n')
}

/// Iterates over all directives of a flattened template.
pub fn tokens(template: &str) -> impl Iterator<Item = Token<'_>> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let token = some!(find_token(template, offset));
        offset = token.end();
        Some(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn contents(template: &str) -> Vec<&str> {
        tokens(template).map(|x| x.content()).collect()
    }

    #[test]
    fn test_find_token() {
        assert_eq!(
            contents("Hello {{ name }}!{% if x %}{{ a }} }}{% endif %}"),
            vec!["{{ name }}", "{% if x %}", "{{ a }}", "{% endif %}"]
        );
        assert_eq!(contents("{{name}} {{  }} {%%}"), Vec::<&str>::new());
        assert_eq!(contents("{{ a\n }} {{ b }}"), vec!["{{ b }}"]);
        // shortest match
        assert_eq!(contents("{{ a }} }}"), vec!["{{ a }}"]);
        assert_eq!(contents("{{ {'a': 1} }}"), vec!["{{ {'a': 1} }}"]);
    }

    #[test]
    fn test_find_extends_and_include() {
        let template = "x {% extends 'base.html' %} {% include \"part.html\" %}";
        let extends = find_extends(template, 0).unwrap();
        assert_eq!(extends.content(), "{% extends 'base.html' %}");
        assert_eq!(quoted_path(&extends), "base.html");
        let include = find_include(template, 0).unwrap();
        assert_eq!(quoted_path(&include), "part.html");
        assert!(find_extends(template, extends.end()).is_none());
        assert!(find_extends("{% extends base.html %}", 0).is_none());
        assert!(find_include("{% include '' %}", 0).is_none());
    }

    #[test]
    fn test_find_block() {
        let template = "{% block %}{% block a-b %}{% block content %}x{% endblock content %}";
        let block = find_block(template, 0).unwrap();
        assert_eq!(block_name(&block), "content");
        let end = find_endblock(template, block.end(), "content").unwrap();
        assert_eq!(end.content(), "{% endblock content %}");
        assert_eq!(&template[block.end()..end.start()], "x");
    }

    #[test]
    fn test_find_unnamed_endblock() {
        let template = "{% block a %}A{% endblock %}";
        let block = find_block(template, 0).unwrap();
        let end = find_endblock(template, block.end(), "a").unwrap();
        assert_eq!(end.content(), "{% endblock %}");

        // a self-closing block does not steal the endblock of the next one
        let template = "{% block a %}{% block b %}B{% endblock %}";
        let block = find_block(template, 0).unwrap();
        assert!(find_endblock(template, block.end(), "a").is_none());
    }

    #[test]
    fn test_find_comments() {
        let template = "a {# one #} b {# \n #}";
        assert_eq!(find_hash_comment(template, 0).unwrap().content(), "{# one #}");
        assert!(find_hash_comment(template, 4).is_none());

        let template = "a {% comment %}\nx\n{% endcomment %} b";
        assert_eq!(
            find_block_comment(template, 0).unwrap().content(),
            "{% comment %}\nx\n{% endcomment %}"
        );
        let template = "{% comment 'why' %}x{% endcomment %}";
        assert_eq!(
            find_block_comment(template, 0).unwrap().content(),
            template
        );
        let template = "{% comment \"\" %}{% endcomment %}";
        assert_eq!(
            find_block_comment(template, 0).unwrap().content(),
            template
        );
        assert!(find_block_comment("{% comment %}x", 0).is_none());
    }

    #[test]
    fn test_find_non_whitespace() {
        let template = "  \n foo bar";
        let token = find_non_whitespace(template, 0, template.len()).unwrap();
        assert_eq!(token.content(), "foo");
        let token = find_non_whitespace(template, 0, 6).unwrap();
        assert_eq!(token.content(), "fo");
        assert!(find_non_whitespace(" \n\t ", 0, 4).is_none());
    }

    #[test]
    fn test_is_on_own_line() {
        assert!(is_on_own_line("text\n    "));
        assert!(!is_on_own_line("text\n"));
        assert!(!is_on_own_line("    "));
        assert!(!is_on_own_line("text\n  x "));
    }
}
