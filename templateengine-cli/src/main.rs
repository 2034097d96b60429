use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use env_logger::Env;
use templateengine::machinery::{get_compiled_template, tokens, Instructions};
use templateengine::value::merge_maps;
use templateengine::{Environment, Error as TError, Value};

use crate::config::Config;
use crate::output::{Output, STDIN_STDOUT};

mod cli;
mod config;
mod output;

fn read_input(path: &Path, what: &str) -> Result<String, Error> {
    if path == Path::new(STDIN_STDOUT) {
        io::read_to_string(io::stdin()).with_context(|| format!("unable to read {what} from stdin"))
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("unable to read {what} file '{}'", path.display()))
    }
}

fn load_data(format: &str, path: &Path) -> Result<Value, Error> {
    let stdin_used = path == Path::new(STDIN_STDOUT);
    let contents = read_input(path, "data")?;
    let format = if format == "auto" {
        if stdin_used {
            bail!("auto detection does not work with data from stdin");
        }
        match path.extension().and_then(|x| x.to_str()) {
            Some("json") => "json",
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => "yaml",
            #[cfg(feature = "toml")]
            Some("toml") => "toml",
            _ => bail!("cannot auto detect format from extension"),
        }
    } else {
        format
    };
    log::debug!("loading data from {} as {}", path.display(), format);

    let data = match format {
        "json" => {
            let value: serde_json::Value = serde_json::from_str(&contents)?;
            Value::try_from_serialize(&value)?
        }
        #[cfg(feature = "yaml")]
        "yaml" => {
            let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
            Value::try_from_serialize(&value)?
        }
        #[cfg(feature = "toml")]
        "toml" => {
            let value: toml::Value = toml::from_str(&contents)?;
            Value::try_from_serialize(&value)?
        }
        _ => bail!("unsupported format '{}'", format),
    };

    if data.as_map().is_none() {
        bail!("failed to interpret input data as object (got {})", data.kind());
    }
    Ok(data)
}

fn load_config(matches: &clap::ArgMatches) -> Result<Config, Error> {
    #[cfg(feature = "toml")]
    let mut config = {
        let config_file = matches
            .get_one::<PathBuf>("config-file")
            .cloned()
            .or_else(|| std::env::var_os("TEMPLATEENGINE_CONFIG_FILE").map(PathBuf::from));
        match config_file {
            Some(path) => Config::load_from_toml(&path)?,
            None => Config::default(),
        }
    };
    #[cfg(not(feature = "toml"))]
    let mut config = Config::default();

    config.update_from_env()?;
    config.update_from_matches(matches)?;
    Ok(config)
}

fn execute() -> Result<i32, Error> {
    let matches = cli::make_command().get_matches();
    let config = load_config(&matches)?;

    let template_path = Path::new(
        matches
            .get_one::<String>("template")
            .map_or(STDIN_STDOUT, |x| x.as_str()),
    );
    let data_path = matches.get_one::<PathBuf>("data");
    if template_path == Path::new(STDIN_STDOUT)
        && data_path.map_or(false, |x| x == Path::new(STDIN_STDOUT))
    {
        bail!("cannot read template and data from stdin at the same time");
    }

    let data = match data_path {
        Some(path) => load_data(config.format(), path)?,
        None => Value::from(BTreeMap::<String, Value>::new()),
    };
    let ctx = merge_maps([config.defines(), data]);

    let mut env = Environment::new();
    config.apply_to_env(&mut env);

    let source = read_input(template_path, "template")?;
    let mut output = Output::new(matches.get_one::<PathBuf>("output").map_or(
        Path::new(STDIN_STDOUT),
        |x| x.as_path(),
    ))?;

    if let Some(dump) = matches.get_one::<String>("dump") {
        match dump.as_str() {
            "tokens" => {
                for token in tokens(&source) {
                    writeln!(&mut output, "{:?}", token)?;
                }
            }
            "flattened" => {
                let tmpl = env.template_from_str(&source)?;
                writeln!(&mut output, "{}", tmpl.source())?;
            }
            "instructions" => {
                let tmpl = env.template_from_str(&source)?;
                print_instructions(&mut output, &get_compiled_template(&tmpl).instructions)?;
            }
            _ => unreachable!(),
        }
    } else {
        let tmpl = env.template_from_str(&source)?;
        if let Some(chunk_size) = config.chunk_size() {
            for chunk in tmpl.render_iter(&ctx).chunked(chunk_size) {
                output.write_all(chunk?.as_bytes())?;
                output.flush()?;
            }
        } else {
            write!(&mut output, "{}", tmpl.render(&ctx)?)?;
        }
        if config.newline() {
            writeln!(&mut output)?;
        }
    }

    output.commit()?;
    Ok(0)
}

fn print_instructions(output: &mut Output, instructions: &Instructions) -> Result<(), Error> {
    for idx in 0..instructions.len() {
        if let Some(instruction) = instructions.get(idx) {
            writeln!(output, "{idx:4}: {instruction:?}")?;
        }
    }
    Ok(())
}

fn print_template_excerpt(err: &(dyn std::error::Error + 'static)) {
    if let Some(err) = err.downcast_ref::<TError>() {
        if let Some(excerpt) = err.display_excerpt() {
            eprintln!();
            eprintln!("{excerpt}");
        }
    }
}

pub fn print_error(err: &Error) {
    for (idx, cause) in err.chain().enumerate() {
        if idx == 0 {
            eprintln!("error: {cause}");
        } else {
            eprintln!();
            eprintln!("caused by: {cause}");
        }
        print_template_excerpt(cause);
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    match execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}
