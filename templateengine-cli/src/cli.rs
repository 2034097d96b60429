use std::path::PathBuf;

use clap::{arg, command, value_parser, ArgAction, Command};

pub(super) fn make_command() -> Command {
    command!()
        .max_term_width(120)
        .args([
            #[cfg(feature = "toml")]
            arg!(--"config-file" <PATH> "Path to a TOML config file")
                .value_parser(value_parser!(PathBuf))
                .long_help("\
                    Loads settings from a TOML config file.  Keys mirror the long command \
                    line options (format, trim-blocks, lstrip-blocks, newline, chunk-size).  \
                    Environment variables override the file and command line arguments \
                    override both.\n\n\
                    [env var: TEMPLATEENGINE_CONFIG_FILE]"),
            arg!(-f --format <FORMAT> "The format of the input data")
                .value_parser([
                    "auto",
                    "json",
                    #[cfg(feature = "yaml")]
                    "yaml",
                    #[cfg(feature = "toml")]
                    "toml",
                ])
                .long_help("\
                    Sets the format of the input data.  With 'auto' the format is detected \
                    from the file extension (*.json, *.yaml, *.yml, *.toml) which does not \
                    work when the data is read from stdin.\n\n\
                    [default: auto] [env var: TEMPLATEENGINE_FORMAT]"),
            arg!(-D --define <EXPR> "Defines an input variable (key=value / key:=json_value)")
                .action(ArgAction::Append)
                .long_help("\
                    Defines an input variable.  'key=value' defines a string, 'key:=value' \
                    parses the value as JSON and a bare 'key' defines it as true.  Defines \
                    take precedence over values from the data file."),
            arg!(--"no-trim-blocks" "Keep the newline after statement tags")
                .long_help("\
                    Disables the trim-blocks flag.  By default the first newline after a \
                    statement tag is removed.\n\n\
                    [env var: TEMPLATEENGINE_TRIM_BLOCKS]"),
            arg!(--"no-lstrip-blocks" "Keep the indentation before statement tags")
                .long_help("\
                    Disables the lstrip-blocks flag.  By default whitespace from the start \
                    of a line up to a statement tag is removed.\n\n\
                    [env var: TEMPLATEENGINE_LSTRIP_BLOCKS]"),
            arg!(-n --"no-newline" "Do not output a trailing newline")
                .long_help("\
                    Do not output a trailing newline after the rendered template.\n\n\
                    [env var: TEMPLATEENGINE_NEWLINE]"),
            arg!(--"chunk-size" <SIZE> "Stream the output in chunks of SIZE characters")
                .value_parser(value_parser!(usize))
                .long_help("\
                    Renders the template lazily and writes the output in chunks of the given \
                    number of characters.  A size of 0 renders everything at once.\n\n\
                    [env var: TEMPLATEENGINE_CHUNK_SIZE]"),
            arg!(--dump <KIND> "Dump internals of a template")
                .value_parser(["tokens", "flattened", "instructions"]),
            arg!(-o --output <FILENAME> "Path to the output file")
                .default_value("-")
                .value_parser(value_parser!(PathBuf)),
            arg!(template: [TEMPLATE] "Path to the input template").default_value("-"),
            arg!(data: [DATA] "Path to the data file").value_parser(value_parser!(PathBuf)),
        ])
        .about("templateengine-cli renders templates from the command line.")
        .after_help("Use - as TEMPLATE or DATA to read from stdin.  RUST_LOG controls log output.")
}

#[test]
fn test_command() {
    make_command().debug_assert();
}
