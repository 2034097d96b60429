use std::collections::BTreeMap;
use std::fs;

use templateengine::{context, path_loader, Environment, Error, ErrorKind};

use similar_asserts::assert_eq;

fn env_with(templates: &[(&'static str, &'static str)]) -> Environment {
    let templates = templates
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    let mut env = Environment::new();
    env.set_loader(move |path| Ok::<_, Error>(templates.get(path).cloned()));
    env
}

#[test]
fn test_children_share_base() {
    let env = env_with(&[(
        "base.html",
        "<h1>{% block title %}{% endblock %}</h1>|{% block body %}default{% endblock %}",
    )]);
    let a = env
        .render_str(
            "{% extends 'base.html' %}{% block title %}A{% endblock %}",
            (),
            true,
        )
        .unwrap();
    let b = env
        .render_str(
            "{% extends 'base.html' %}\n{% block title %}B{% endblock %}\n{% block body %}{{ block.super }}+b{% endblock %}\n",
            (),
            true,
        )
        .unwrap();
    assert_eq!(a, "<h1>A</h1>|default");
    assert_eq!(b, "<h1>B</h1>|default+b");
}

#[test]
fn test_multi_level_extends() {
    let env = env_with(&[
        ("root.html", "[{% block x %}root{% endblock %}]"),
        (
            "middle.html",
            "{% extends 'root.html' %}{% block x %}{{ block.super }}>middle{% endblock %}",
        ),
    ]);
    let rv = env
        .render_str(
            "{% extends 'middle.html' %}{% block x %}{{ block.super }}>leaf{% endblock %}",
            (),
            false,
        )
        .unwrap();
    assert_eq!(rv, "[root>middle>leaf]");
}

#[test]
fn test_self_closing_block() {
    let env = env_with(&[("base.html", "a{% block slot %}b")]);
    let rv = env
        .render_str(
            "{% extends 'base.html' %}{% block slot %}[{{ block.super }}]{% endblock %}",
            (),
            false,
        )
        .unwrap();
    assert_eq!(rv, "a[]b");
    let rv = env
        .render_str("{% extends 'base.html' %}", (), false)
        .unwrap();
    assert_eq!(rv, "ab");
}

#[test]
fn test_includes_in_blocks_and_nested() {
    let env = env_with(&[
        ("base.html", "<body>{% block body %}{% endblock %}</body>"),
        ("nav.html", "<nav>{% include 'item.html' %}</nav>"),
        ("item.html", "<a>{{ label }}</a>"),
    ]);
    let rv = env
        .render_str(
            "{% extends 'base.html' %}{% block body %}{% include 'nav.html' %}{% endblock %}",
            context!(label => "home"),
            false,
        )
        .unwrap();
    assert_eq!(rv, "<body><nav><a>home</a></nav></body>");
}

#[test]
fn test_circular_extends() {
    let env = env_with(&[
        ("a.html", "{% extends 'b.html' %}{% block x %}a{% endblock %}"),
        ("b.html", "{% extends 'a.html' %}{% block x %}b{% endblock %}"),
    ]);
    let err = env
        .render_str("{% extends 'a.html' %}", (), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.detail(), Some("Circular extends"));
}

#[test]
fn test_recursive_include() {
    let env = env_with(&[("loop.html", "x{% include 'loop.html' %}")]);
    let err = env
        .render_str("{% include 'loop.html' %}", (), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}

#[test]
fn test_missing_targets() {
    let env = env_with(&[]);
    let err = env
        .render_str("{% include 'nope.html' %}", (), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    assert_eq!(err.detail(), Some("Template file not found: nope.html"));

    let err = env
        .render_str("{% extends 'nope.html' %}", (), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_content_outside_block() {
    let env = env_with(&[("base.html", "{% block a %}{% endblock %}")]);
    let err = env
        .render_str(
            "{% extends 'base.html' %}\nstray\n{% block a %}x{% endblock %}",
            (),
            false,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.detail(), Some("Content outside block"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_path_loader_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("layouts")).unwrap();
    fs::write(
        dir.path().join("layouts/base.html"),
        "<main>{% block content %}{% endblock %}</main>",
    )
    .unwrap();
    fs::write(
        dir.path().join("page.html"),
        "{% extends 'layouts/base.html' %}\n{% block content %}{{ text }}{% endblock %}\n",
    )
    .unwrap();

    let mut env = Environment::new();
    env.set_loader(path_loader(dir.path()));
    assert_eq!(
        env.render_template("page.html", context!(text => "hello"), true)
            .unwrap(),
        "<main>hello</main>"
    );

    let err = env
        .render_str("{% include '../page.html' %}", (), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}
