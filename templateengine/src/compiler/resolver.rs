//! Flattens includes, inheritance and comments into one template string.
use std::collections::{BTreeMap, BTreeSet};

use crate::compiler::scanner::{
    block_name, find_block, find_block_comment, find_endblock, find_extends,
    find_hash_comment, find_include, find_non_whitespace, is_on_own_line, quoted_path,
    WhitespaceConfig,
};
use crate::compiler::tokens::Token;
use crate::error::Error;

const BLOCK_SUPER: &str = "{{ block.super }}";

/// Upper bound for how deeply includes may nest.
const MAX_INCLUDE_DEPTH: usize = 128;

/// Loads template source by path.  `Ok(None)` means "not found".
pub type LoadFn<'a> = dyn Fn(&str) -> Result<Option<String>, Error> + 'a;

/// Resolves includes, extends chains, blocks and comments.
pub struct Resolver<'a> {
    load: &'a LoadFn<'a>,
    whitespace: WhitespaceConfig,
}

fn splice(template: &str, token: &Token<'_>, replacement: &str) -> String {
    let mut rv = String::with_capacity(template.len() + replacement.len());
    rv.push_str(&template[..token.start()]);
    rv.push_str(replacement);
    rv.push_str(&template[token.end()..]);
    rv
}

impl<'a> Resolver<'a> {
    /// Creates a resolver loading templates through `load`.
    pub fn new(load: &'a LoadFn<'a>, whitespace: WhitespaceConfig) -> Resolver<'a> {
        Resolver { load, whitespace }
    }

    fn load(&self, token: &Token<'_>) -> Result<String, Error> {
        let path = quoted_path(token);
        match (self.load)(path) {
            Ok(Some(source)) => Ok(source),
            Ok(None) => Err(Error::new_not_found(path).with_token(token)),
            Err(err) => Err(err),
        }
    }

    /// Flattens a template into a string free of includes, extends, blocks
    /// and comments.
    pub fn resolve(&self, source: &str) -> Result<String, Error> {
        let template = ok!(self.resolve_inheritance(source.to_string()));
        Ok(self.remove_comments(template))
    }

    /// Splices every `{% include %}` at or after `from`.
    pub fn resolve_includes(&self, template: String, from: usize) -> Result<String, Error> {
        self.splice_includes(template, from, &mut Vec::new())
    }

    /// Splices includes, resolving the includes of each loaded file first.
    /// `active` holds the paths of the files currently being included.
    fn splice_includes(
        &self,
        mut template: String,
        from: usize,
        active: &mut Vec<String>,
    ) -> Result<String, Error> {
        let mut offset = from;
        while let Some(token) = find_include(&template, offset) {
            let path = quoted_path(&token).to_string();
            if active.contains(&path) {
                return Err(Error::syntax(&token, format!("Recursive include of {path:?}")));
            }
            if active.len() >= MAX_INCLUDE_DEPTH {
                return Err(Error::syntax(&token, "Includes are nested too deeply"));
            }
            log::trace!("resolving include {path:?}");
            let included = ok!(self.load(&token));
            active.push(path);
            let included = ok!(self.splice_includes(included, 0, active));
            active.pop();
            offset = token.start() + included.len();
            template = splice(&template, &token, &included);
        }
        Ok(template)
    }

    fn resolve_inheritance(&self, mut template: String) -> Result<String, Error> {
        let mut extended = BTreeSet::new();
        let mut replacements = BTreeMap::<String, String>::new();

        while let Some(extends) = find_extends(&template, 0) {
            let path = quoted_path(&extends).to_string();
            let parent = ok!(self.load(&extends));
            if !extended.insert(path.clone()) {
                return Err(Error::syntax(&extends, "Circular extends"));
            }
            log::trace!("extending {path:?}");

            let offset = extends.end();
            template = ok!(self.resolve_includes(template, offset));
            ok!(self.collect_blocks(&template, offset, &mut replacements));
            template = parent;
        }

        template = ok!(self.resolve_includes(template, 0));
        replace_blocks(&template, &replacements)
    }

    /// Records the blocks of a child template that starts extending at
    /// `offset`.
    fn collect_blocks(
        &self,
        template: &str,
        mut offset: usize,
        replacements: &mut BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if let Some(stacked) = find_extends(template, offset) {
            return Err(Error::syntax(&stacked, "Incorrect use of {% extends ... %}"));
        }

        while let Some(block) = find_block(template, offset) {
            if let Some(content) = find_non_whitespace(template, offset, block.start()) {
                return Err(Error::syntax(&content, "Content outside block"));
            }
            let name = block_name(&block);
            let endblock = match find_endblock(template, block.end(), name) {
                Some(endblock) => endblock,
                None => return Err(Error::syntax(&block, "No matching {% endblock %}")),
            };
            if let Some(nested) = find_block(template, block.end()) {
                if nested.start() < endblock.start() {
                    return Err(Error::syntax(&nested, "Nested blocks are not supported"));
                }
            }
            let content = &template[block.end()..endblock.start()];
            match replacements.get_mut(name) {
                Some(derived) => *derived = derived.replace(BLOCK_SUPER, content),
                None => {
                    replacements.insert(name.to_string(), content.to_string());
                }
            }
            offset = endblock.end();
        }

        if let Some(content) = find_non_whitespace(template, offset, template.len()) {
            return Err(Error::syntax(&content, "Content outside block"));
        }
        Ok(())
    }

    /// Strips hash comments and then block comments.
    pub fn remove_comments(&self, mut template: String) -> String {
        while let Some(comment) = find_hash_comment(&template, 0) {
            template = self.remove_comment(&template, &comment);
        }
        while let Some(comment) = find_block_comment(&template, 0) {
            template = self.remove_comment(&template, &comment);
        }
        template
    }

    fn remove_comment(&self, template: &str, comment: &Token<'_>) -> String {
        let mut before = &template[..comment.start()];
        let mut after = &template[comment.end()..];
        if self.whitespace.lstrip_blocks && is_on_own_line(before) {
            before = before.trim_end_matches(' ');
        }
        if self.whitespace.trim_blocks {
            if let Some(rest) = after.strip_prefix('\n') {
                after = rest;
            }
        }
        let mut rv = String::with_capacity(before.len() + after.len());
        rv.push_str(before);
        rv.push_str(after);
        rv
    }
}

/// Substitutes the blocks of the root template.
fn replace_blocks(template: &str, replacements: &BTreeMap<String, String>) -> Result<String, Error> {
    let mut rv = String::with_capacity(template.len());
    let mut offset = 0;
    while let Some(block) = find_block(template, offset) {
        rv.push_str(&template[offset..block.start()]);
        let name = block_name(&block);
        match find_endblock(template, block.end(), name) {
            // self-closing block without default content
            None => {
                if let Some(replacement) = replacements.get(name) {
                    rv.push_str(&replacement.replace(BLOCK_SUPER, ""));
                }
                offset = block.end();
            }
            Some(endblock) => {
                if let Some(nested) = find_block(template, block.end()) {
                    if nested.start() < endblock.start() {
                        return Err(Error::syntax(&nested, "Nested blocks are not supported"));
                    }
                }
                let default = &template[block.end()..endblock.start()];
                match replacements.get(name) {
                    Some(replacement) => rv.push_str(&replacement.replace(BLOCK_SUPER, default)),
                    None => rv.push_str(default),
                }
                offset = endblock.end();
            }
        }
    }
    rv.push_str(&template[offset..]);
    Ok(rv)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use crate::error::ErrorKind;

    use similar_asserts::assert_eq;

    fn resolve(templates: &[(&str, &str)], source: &str) -> Result<String, Error> {
        let templates: HashMap<String, String> = templates
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let load = move |path: &str| Ok::<_, Error>(templates.get(path).cloned());
        Resolver::new(&load, WhitespaceConfig::default()).resolve(source)
    }

    #[test]
    fn test_includes() {
        let rv = resolve(
            &[("a.html", "A{% include 'b.html' %}"), ("b.html", "B")],
            "<{% include \"a.html\" %}>",
        )
        .unwrap();
        assert_eq!(rv, "<AB>");

        let err = resolve(&[], "{% include 'missing.html' %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
        assert_eq!(err.detail(), Some("Template file not found: missing.html"));
    }

    #[test]
    fn test_recursive_include() {
        let err = resolve(&[("a", "{% include 'a' %}")], "{% include 'a' %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert_eq!(err.detail(), Some("Recursive include of \"a\""));

        let templates = [("a", "{% include 'b' %}"), ("b", "x\n{% include 'a' %}")];
        let err = resolve(&templates, "{% include 'a' %}").unwrap_err();
        assert_eq!(err.detail(), Some("Recursive include of \"a\""));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_many_flat_includes() {
        let source = "{% include 'item' %}".repeat(3000);
        let rv = resolve(&[("item", "{% include 'leaf' %},"), ("leaf", "x")], &source).unwrap();
        assert_eq!(rv, "x,".repeat(3000));
    }

    #[test]
    fn test_include_depth_limit() {
        let templates = (0..200)
            .map(|idx| (idx.to_string(), format!("{{% include '{}' %}}", idx + 1)))
            .collect::<Vec<_>>();
        let templates = templates
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<Vec<_>>();
        let err = resolve(&templates, "{% include '0' %}").unwrap_err();
        assert_eq!(err.detail(), Some("Includes are nested too deeply"));
    }

    #[test]
    fn test_extends() {
        let templates = [
            (
                "base.html",
                "<title>{% block title %}Base{% endblock title %}</title>{% block body %}",
            ),
            (
                "child.html",
                "{% extends 'base.html' %}\n{% block title %}{{ block.super }} / Child{% endblock title %}",
            ),
        ];
        let rv = resolve(
            &templates,
            "{% extends 'child.html' %}{% block body %}!{% endblock %}",
        )
        .unwrap();
        assert_eq!(rv, "<title>Base / Child</title>!");
    }

    #[test]
    fn test_super_chain() {
        let templates = [
            ("a", "[{% block x %}a{% endblock x %}]"),
            ("b", "{% extends 'a' %}{% block x %}b{{ block.super }}{% endblock x %}"),
        ];
        let rv = resolve(
            &templates,
            "{% extends 'b' %}{% block x %}c{{ block.super }}{% endblock x %}",
        )
        .unwrap();
        assert_eq!(rv, "[cba]");
    }

    #[test]
    fn test_self_closing_super_is_empty() {
        let templates = [("base", "<{% block x %}>")];
        let rv = resolve(
            &templates,
            "{% extends 'base' %}{% block x %}({{ block.super }}){% endblock x %}",
        )
        .unwrap();
        assert_eq!(rv, "<()>");
        assert_eq!(resolve(&templates, "{% extends 'base' %}").unwrap(), "<>");
    }

    #[test]
    fn test_inheritance_errors() {
        let templates = [
            ("a", "{% extends 'b' %}"),
            ("b", "{% extends 'a' %}"),
            ("base", "{% block x %}{% endblock x %}"),
        ];
        let err = resolve(&templates, "{% extends 'a' %}").unwrap_err();
        assert_eq!(err.detail(), Some("Circular extends"));

        let err = resolve(&templates, "{% extends 'missing' %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);

        let err = resolve(
            &templates,
            "{% extends 'base' %}{% extends 'base' %}",
        )
        .unwrap_err();
        assert_eq!(err.detail(), Some("Incorrect use of {% extends ... %}"));

        let err = resolve(&templates, "{% extends 'base' %}\nstray").unwrap_err();
        assert_eq!(err.detail(), Some("Content outside block"));
        assert_eq!(err.line(), Some(2));

        let err = resolve(
            &templates,
            "{% extends 'base' %}{% block x %}{% endblock x %}tail",
        )
        .unwrap_err();
        assert_eq!(err.detail(), Some("Content outside block"));

        let err = resolve(&templates, "{% extends 'base' %}{% block x %}").unwrap_err();
        assert_eq!(err.detail(), Some("No matching {% endblock %}"));

        let err = resolve(
            &templates,
            "{% extends 'base' %}{% block x %}{% block y %}{% endblock y %}{% endblock x %}",
        )
        .unwrap_err();
        assert_eq!(err.detail(), Some("Nested blocks are not supported"));

        let err = resolve(
            &[],
            "{% block x %}{% block y %}{% endblock y %}{% endblock x %}",
        )
        .unwrap_err();
        assert_eq!(err.detail(), Some("Nested blocks are not supported"));
    }

    #[test]
    fn test_remove_comments() {
        assert_eq!(resolve(&[], "a{# note #}b").unwrap(), "ab");
        assert_eq!(resolve(&[], "a\n    {# note #}\nb").unwrap(), "a\nb");
        assert_eq!(
            resolve(&[], "a\n{% comment 'todo' %}\n{{ x }}\n{% endcomment %}\nb").unwrap(),
            "a\nb"
        );

        let load = |_: &str| Ok::<_, Error>(None);
        let resolver = Resolver::new(
            &load,
            WhitespaceConfig {
                trim_blocks: false,
                lstrip_blocks: false,
            },
        );
        assert_eq!(
            resolver.remove_comments("a\n    {# note #}\nb".into()),
            "a\n    \nb"
        );
    }
}
