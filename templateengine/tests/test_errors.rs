use std::io;

use serde::ser::Error as _;
use templateengine::{context, Environment, Error, ErrorKind};

use similar_asserts::assert_eq;

fn render_err(source: &str) -> Error {
    Environment::new().render_str(source, (), false).unwrap_err()
}

#[test]
fn test_unclosed_for_excerpt() {
    let err = render_err("<ul>\n{% for x in items %}\n<li>{{ x }}</li>\n</ul>");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.line(), Some(2));
    insta::assert_snapshot!(format!("{err:#}"), @r###"
    <ul>
    {% for x in items %}
    ^^^^^^^^^^^^^^^^^^^^
    <li>{{ x }}</li>
    </ul>

    syntax error: No matching {% endfor %} (line 2)
    "###);
}

#[test]
fn test_excerpt_skips_lines() {
    let mut source = String::new();
    for idx in 1..=6 {
        source.push_str(&format!("line {idx}\n"));
    }
    source.push_str("before {% bogus %} after");
    for idx in 8..=13 {
        source.push_str(&format!("\nline {idx}"));
    }
    let err = render_err(&source);
    insta::assert_snapshot!(format!("{err:#}"), @r###"
    [2 lines skipped]
    line 3
    line 4
    line 5
    line 6
    before {% bogus %} after
           ^^^^^^^^^^^
    line 8
    line 9
    line 10
    line 11
    [2 lines skipped]

    syntax error: Unknown token: {% bogus %} (line 7)
    "###);
}

#[test]
fn test_plain_display() {
    let err = render_err("{% if a %}{% else %}{% else %}{% endif %}");
    assert_eq!(
        err.to_string(),
        "syntax error: Duplicate {% else %} (line 1)"
    );
    assert_eq!(err.range(), Some(20..30));
    assert_eq!(
        err.template_source(),
        Some("{% if a %}{% else %}{% else %}{% endif %}")
    );
}

#[test]
fn test_expression_syntax_error_points_at_tag() {
    let err = render_err("ok\n{{ 1 + }}");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.line(), Some(2));
    assert_eq!(err.range(), Some(3..12));
}

#[test]
fn test_render_errors() {
    let env = Environment::new();
    let cases = [
        ("{{ x }}", ErrorKind::UndefinedError, "name 'x' is not defined"),
        ("{{ nope() }}", ErrorKind::UnknownFunction, "name 'nope' is not defined"),
        (
            "{{ 'a'.shout() }}",
            ErrorKind::UnknownMethod,
            "'str' object has no method 'shout'",
        ),
        (
            "{{ len(1, 2) }}",
            ErrorKind::InvalidArguments,
            "len() takes at most 1 argument (2 given)",
        ),
        (
            "{{ 'a' + 1 }}",
            ErrorKind::InvalidOperation,
            "unsupported operand type(s) for +: 'str' and 'int'",
        ),
        ("{{ [1][5] }}", ErrorKind::InvalidOperation, "list index out of range"),
        ("{{ {'a': 1}['b'] }}", ErrorKind::UndefinedError, "key 'b' does not exist"),
    ];
    for (source, kind, detail) in cases {
        let err = env.render_str(source, context!(), false).unwrap_err();
        assert_eq!(err.kind(), kind, "{source}");
        assert_eq!(err.detail(), Some(detail), "{source}");
        assert_eq!(err.line(), Some(1), "{source}");
    }
}

#[test]
fn test_loader_errors_are_chained() {
    let mut env = Environment::new();
    env.set_loader(|_| {
        Err(Error::new(ErrorKind::Io, "could not read template")
            .with_source(io::Error::new(io::ErrorKind::PermissionDenied, "denied")))
    });
    let err = env.render_str("{% include 'x.html' %}", (), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "denied");
}

#[test]
fn test_bad_serialization() {
    struct Broken;

    impl serde::Serialize for Broken {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize this"))
        }
    }

    let env = Environment::new();
    let err = env
        .render_str("{{ x }}", context! { ..Broken }, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);

    let err = env.render_str("{{ x }}", Broken, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadSerialization);
    assert_eq!(err.detail(), Some("cannot serialize this"));
}

#[test]
fn test_long_expression_chain() {
    let env = Environment::new();
    let source = format!("{{{{ {} }}}}", vec!["1"; 100].join(" + "));
    assert_eq!(env.render_str(&source, (), false).unwrap(), "100");

    let source = format!("{{{{ {} }}}}", vec!["1"; 2000].join(" + "));
    let err = env.render_str(&source, (), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(
        err.detail(),
        Some("expression exceeds maximum recursion limits")
    );
}

#[test]
fn test_huge_repetition() {
    let err = render_err("{{ 'ab' * 9223372036854775807 }}");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    let err = render_err("{{ [1] * 9223372036854775807 }}");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}
