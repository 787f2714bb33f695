/// Command-line parsing into a validated pipeline configuration
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const USAGE: &str = "\
Usage: mesh-pre-processing <input.obj> [options]

Options:
  --output_path <path>      Height map to write (.png or .dds). Default: height_map.png
  --max_resolution <n>      Pixels along the longest horizontal edge. Default: 256
  --use_gpu                 Sample on the GPU when a compatible device exists
  --num_samples <n>         Points sampled from the surface. Default: 10000
  --num_threads <n>         CPU worker threads. Default: 4
  --bit_depth <8|16>        PNG bit depth. Default: 16
  --large_model             Stream bounds and sampling in chunks
  --chunk_size <n>          Faces or vertices per chunk. Default: 1000000
  --split <n>               Number of output tiles, must form a grid. Default: 1
  --seed <n>                Seed for reproducible sampling
  --up_axis <y|z>           Vertical axis of the mesh. Default: z
  --config <file.json>      Load options from JSON; flags given here override it
  --no_progress             Hide progress bars
  --verbose                 Debug logging
  --help                    Show this message";

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub input: PathBuf,
    pub config: PipelineConfig,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(CliArgs),
    Help,
}

/// Parse arguments, excluding the program name. `--config` is applied first
/// wherever it appears, then every other flag in order.
pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut tokens = Vec::new();
    for arg in args {
        // Accept --flag=value as well as --flag value.
        match arg.split_once('=') {
            Some((flag, value)) if arg.starts_with("--") => {
                tokens.push(flag.to_string());
                tokens.push(value.to_string());
            }
            _ => tokens.push(arg),
        }
    }

    if tokens.iter().any(|token| token == "--help" || token == "-h") {
        return Ok(Command::Help);
    }

    let mut config = match tokens.iter().position(|token| token == "--config") {
        Some(index) => {
            let path = tokens
                .get(index + 1)
                .ok_or_else(|| missing_value("--config"))?;
            PipelineConfig::from_json_file(path)?
        }
        None => PipelineConfig::default(),
    };

    let mut input = None;
    let mut verbose = false;
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        let mut value = || iter.next().ok_or_else(|| missing_value(&token));
        match token.as_str() {
            "--config" => {
                value()?;
            }
            "--output_path" => config.output_path = PathBuf::from(value()?),
            "--max_resolution" => config.max_resolution = positive(&token, &value()?)?,
            "--use_gpu" => config.use_gpu = true,
            "--num_samples" => config.num_samples = positive(&token, &value()?)?,
            "--num_threads" => config.num_threads = positive(&token, &value()?)?,
            "--bit_depth" => config.bit_depth = positive(&token, &value()?)?,
            "--large_model" => config.large_model = true,
            "--chunk_size" => config.chunk_size = positive(&token, &value()?)?,
            "--split" => config.split = positive(&token, &value()?)?,
            "--seed" => config.seed = Some(number(&token, &value()?)?),
            "--up_axis" => config.up_axis = value()?.parse()?,
            "--no_progress" => config.show_progress = false,
            "--verbose" => verbose = true,
            flag if flag.starts_with("--") => {
                return Err(Error::invalid_configuration(format!(
                    "unknown option '{flag}'"
                )));
            }
            _ if input.is_none() => input = Some(PathBuf::from(&token)),
            _ => {
                return Err(Error::invalid_configuration(format!(
                    "unexpected argument '{token}'"
                )));
            }
        }
    }

    let input = input.ok_or_else(|| Error::invalid_configuration("missing input mesh path"))?;
    config.validate()?;
    Ok(Command::Run(CliArgs {
        input,
        config,
        verbose,
    }))
}

fn missing_value(flag: &str) -> Error {
    Error::invalid_configuration(format!("{flag} needs a value"))
}

fn number<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::invalid_configuration(format!("{flag}: '{value}' is not a valid number")))
}

/// Rejects zero and negative values with a readable message.
fn positive<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    match value.parse::<i64>() {
        Ok(n) if n <= 0 => Err(Error::invalid_configuration(format!(
            "{flag} must be a positive integer, got {n}"
        ))),
        _ => number(flag, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::UpAxis;

    fn parse(args: &[&str]) -> Result<Command> {
        parse_args(args.iter().map(|arg| arg.to_string()))
    }

    fn run(args: &[&str]) -> CliArgs {
        match parse(args).unwrap() {
            Command::Run(args) => args,
            Command::Help => panic!("expected a run command"),
        }
    }

    #[test]
    fn defaults_apply_without_flags() {
        let args = run(&["model.obj"]);
        assert_eq!(args.input, PathBuf::from("model.obj"));
        assert_eq!(args.config, PipelineConfig::default());
        assert!(!args.verbose);
    }

    #[test]
    fn flags_map_onto_config() {
        let args = run(&[
            "model.obj",
            "--use_gpu",
            "--num_samples",
            "5000",
            "--num_threads=8",
            "--chunk_size",
            "64",
            "--large_model",
            "--bit_depth",
            "8",
            "--split",
            "4",
            "--seed",
            "42",
            "--up_axis",
            "y",
            "--output_path",
            "out/terrain.dds",
            "--verbose",
        ]);
        let config = &args.config;
        assert!(config.use_gpu && config.large_model && args.verbose);
        assert_eq!(config.num_samples, 5000);
        assert_eq!(config.num_threads, 8);
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.bit_depth, 8);
        assert_eq!(config.split, 4);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.up_axis, UpAxis::Y);
        assert_eq!(config.output_path, PathBuf::from("out/terrain.dds"));
    }

    #[test]
    fn negative_and_zero_values_are_rejected() {
        for args in [
            &["model.obj", "--num_samples", "-5"][..],
            &["model.obj", "--chunk_size", "0"],
            &["model.obj", "--num_threads", "-1"],
            &["model.obj", "--max_resolution", "abc"],
            &["model.obj", "--split", "7"],
            &["model.obj", "--bit_depth", "12"],
        ] {
            assert!(
                matches!(parse(args), Err(Error::InvalidConfiguration(_))),
                "{args:?} should be rejected"
            );
        }
    }

    #[test]
    fn usage_errors() {
        assert!(matches!(parse(&[]), Err(Error::InvalidConfiguration(_))));
        assert!(matches!(
            parse(&["a.obj", "b.obj"]),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            parse(&["a.obj", "--bogus"]),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            parse(&["a.obj", "--num_samples"]),
            Err(Error::InvalidConfiguration(_))
        ));
        assert_eq!(parse(&["--help"]).unwrap(), Command::Help);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"num_samples": 123, "max_resolution": 64}"#).unwrap();

        let config_arg = path.to_string_lossy().into_owned();
        let args = run(&["--num_samples", "999", "model.obj", "--config", &config_arg]);
        assert_eq!(args.config.num_samples, 999);
        assert_eq!(args.config.max_resolution, 64);
    }
}
