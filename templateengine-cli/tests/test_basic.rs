use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use insta_cmd::{assert_cmd_snapshot, get_cargo_bin};
use tempfile::NamedTempFile;

fn cli() -> Command {
    let mut cmd = Command::new(get_cargo_bin("templateengine-cli"));
    for (key, _) in std::env::vars() {
        if key.starts_with("TEMPLATEENGINE_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn file_with_contents(contents: &str) -> NamedTempFile {
    file_with_contents_and_ext(contents, "")
}

fn file_with_contents_and_ext<X: AsRef<[u8]>>(contents: X, ext: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new()
        .prefix("templateengine-testfile--")
        .suffix(ext)
        .tempfile()
        .unwrap();
    f.write_all(contents.as_ref()).unwrap();
    f
}

#[test]
fn test_explicit_format() {
    let input = file_with_contents(r#"{"foo": "bar"}"#);
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg("--format=json")
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!

    ----- stderr -----
    "###);
}

#[test]
fn test_no_newline() {
    let input = file_with_contents(r#"{"foo": "bar"}"#);
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg("--format=json")
            .arg("--no-newline")
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!
    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("--format=json")
            .arg(tmpl.path())
            .arg(input.path())
            .env("TEMPLATEENGINE_NEWLINE", "false"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!
    ----- stderr -----
    "###);
}

#[test]
fn test_json() {
    let input = file_with_contents_and_ext(r#"{"foo": "bar"}"#, ".json");
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!

    ----- stderr -----
    "###);
}

#[test]
#[cfg(feature = "yaml")]
fn test_yaml() {
    let input = file_with_contents_and_ext("foo: bar\nitems:\n  - 1\n  - 2\n", ".yaml");
    let tmpl = file_with_contents(r#"Hello {{ foo }}! {{ sum(items) }}"#);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar! 3

    ----- stderr -----
    "###);
}

#[test]
#[cfg(feature = "toml")]
fn test_toml() {
    let input = file_with_contents_and_ext("foo = \"bar\"\n[user]\nname = \"Peter\"\n", ".toml");
    let tmpl = file_with_contents(r#"Hello {{ foo }} and {{ user.name }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar and Peter!

    ----- stderr -----
    "###);
}

#[test]
fn test_bad_data() {
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);
    let input = file_with_contents_and_ext(r#"[1, 2]"#, ".json");

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: failed to interpret input data as object (got list)
    "###);

    let input = file_with_contents_and_ext(r#"{}"#, ".txt");
    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: cannot auto detect format from extension
    "###);
}

#[test]
fn test_context_stdin() {
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg("-")
            .arg("--format=json")
            .pass_stdin(r#"{"foo": "bar"}"#),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg("-")
            .pass_stdin(r#""#),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: auto detection does not work with data from stdin
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("-")
            .arg("-")
            .pass_stdin(r#""#),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: cannot read template and data from stdin at the same time
    "###);
}

#[test]
fn test_stdin_template() {
    let input = file_with_contents_and_ext(r#"{"foo": "bar"}"#, ".json");

    assert_cmd_snapshot!(
        cli()
            .arg("-")
            .arg(input.path())
            .pass_stdin("Hello {{ foo }}!"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello bar!

    ----- stderr -----
    "###);
}

#[test]
fn test_defines() {
    let input = file_with_contents_and_ext(r#"{"name": "data", "count": 1}"#, ".json");

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("name=World")
            .arg("-D")
            .arg("count:=3")
            .arg("-D")
            .arg("flag")
            .arg("-")
            .arg(input.path())
            .pass_stdin("{{ name }} {{ count + 1 }}{% if flag %}!{% endif %}"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    World 4!

    ----- stderr -----
    "###);

    let output = cli()
        .arg("-D")
        .arg("count:=[1,")
        .arg("--dump=tokens")
        .arg("-")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.starts_with("error: invalid raw value '[1,' (not valid JSON)\n\ncaused by: "));
}

#[test]
fn test_whitespace_flags() {
    let tmpl = file_with_contents("{% if flag %}\nyes\n{% endif %}\ndone");

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("flag")
            .arg(tmpl.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    yes
    done

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("flag")
            .arg(tmpl.path())
            .env("TEMPLATEENGINE_TRIM_BLOCKS", "off"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----

    yes

    done

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("flag")
            .arg("--no-trim-blocks")
            .arg(tmpl.path())
            .env("TEMPLATEENGINE_TRIM_BLOCKS", "on"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----

    yes

    done

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .env("TEMPLATEENGINE_LSTRIP_BLOCKS", "perhaps"),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: Invalid boolean value for TEMPLATEENGINE_LSTRIP_BLOCKS: perhaps
    "###);
}

#[test]
fn test_chunk_size() {
    let tmpl = file_with_contents("{% for x in items %}{{ x }},{% endfor %}");

    assert_cmd_snapshot!(
        cli()
            .arg("--chunk-size=2")
            .arg("-D")
            .arg("items:=[1, 2, 3]")
            .arg(tmpl.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    1,2,3,

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("items:=[1, 2, 3]")
            .arg(tmpl.path())
            .env("TEMPLATEENGINE_CHUNK_SIZE", "many"),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: Invalid chunk size for TEMPLATEENGINE_CHUNK_SIZE: many

    caused by: invalid digit found in string
    "###);
}

#[test]
fn test_include() {
    let other_tmpl = file_with_contents(r#"Hello {{ name }}!"#);
    let tmpl = file_with_contents(&format!(
        "{{% include '{}' %}}",
        other_tmpl.path().display()
    ));

    assert_cmd_snapshot!(
        cli()
            .arg("-D")
            .arg("name=World")
            .arg(tmpl.path()),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello World!

    ----- stderr -----
    "###);
}

#[test]
fn test_missing_include() {
    assert_cmd_snapshot!(
        cli()
            .arg("-")
            .pass_stdin("{% include 'does-not-exist.html' %}"),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: template not found: Template file not found: does-not-exist.html (line 1)

    {% include 'does-not-exist.html' %}
    ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
    "###);
}

#[test]
fn test_syntax_error() {
    let tmpl = file_with_contents("{{ all_good }}\n{% for item in seq %}");
    let input = file_with_contents_and_ext(r#"{}"#, ".json");

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg(input.path()),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    error: syntax error: No matching {% endfor %} (line 2)

    {{ all_good }}
    {% for item in seq %}
    ^^^^^^^^^^^^^^^^^^^^^
    "###);
}

#[test]
fn test_render_error() {
    assert_cmd_snapshot!(
        cli()
            .arg("--chunk-size=4")
            .arg("-")
            .pass_stdin("first line\n{{ missing }}"),
        @r###"
    success: false
    exit_code: 1
    ----- stdout -----
    first li
    ----- stderr -----
    error: undefined value: name 'missing' is not defined (line 2)
    "###);
}

#[test]
fn test_dump() {
    let tmpl = file_with_contents(r#"Hello {{ foo }}!"#);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg("--dump=tokens"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Token("{{ foo }}" @ 1:6)

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg(tmpl.path())
            .arg("--dump=instructions"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
       0: EMIT_RAW (string "Hello ")
       1: EMIT_EXPR (html foo)
       2: EMIT_RAW (string "!")

    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("--dump=flattened")
            .arg("-")
            .pass_stdin("a{# note #}b{% if x %}c{% endif %}"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    ab{% if x %}c{% endif %}

    ----- stderr -----
    "###);
}

#[test]
fn test_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    fs::write(&out, "old contents").unwrap();

    assert_cmd_snapshot!(
        cli()
            .arg("-o")
            .arg(&out)
            .arg("-D")
            .arg("name=World")
            .arg("-")
            .pass_stdin("Hello {{ name }}!"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    "###);
    assert_eq!(fs::read_to_string(&out).unwrap(), "Hello World!\n");

    // a failed render leaves the previous output alone
    let broken = file_with_contents("{{ missing }}");
    let status = cli()
        .arg("-o")
        .arg(&out)
        .arg(broken.path())
        .stdin(Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
    assert_eq!(fs::read_to_string(&out).unwrap(), "Hello World!\n");
}

#[test]
#[cfg(feature = "toml")]
fn test_load_config() {
    let config = file_with_contents_and_ext(
        r#"
    newline = false

    [defines]
    greeting = "Hello"
    punctuation = "!"
    "#,
        ".toml",
    );

    let input = file_with_contents_and_ext(r#"{"name": "World"}"#, ".json");

    assert_cmd_snapshot!(
        cli()
            .arg("--config-file")
            .arg(config.path())
            .arg("-")
            .arg(input.path())
            .pass_stdin("{{ greeting }} {{ name }}{{ punctuation }}"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello World&excl;
    ----- stderr -----
    "###);

    assert_cmd_snapshot!(
        cli()
            .arg("-")
            .arg(input.path())
            .env("TEMPLATEENGINE_CONFIG_FILE", config.path())
            .env("TEMPLATEENGINE_NEWLINE", "1")
            .pass_stdin("{{ greeting }} {{ name }}{{ punctuation }}"),
        @r###"
    success: true
    exit_code: 0
    ----- stdout -----
    Hello World&excl;

    ----- stderr -----
    "###);
}

#[test]
fn test_help() {
    let output = cli().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("templateengine-cli renders templates from the command line."));
    assert!(stdout.contains("--chunk-size <SIZE>"));
}
