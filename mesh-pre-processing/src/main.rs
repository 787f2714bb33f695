/// Mesh to height map converter main entry point
use log::LevelFilter;
use mesh_pre_processing::cli::{self, Command};
use mesh_pre_processing::converter::MeshConverter;
use mesh_pre_processing::logging;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let command = match cli::parse_args(env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}\n\n{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    let args = match command {
        Command::Help => {
            println!("{}", cli::USAGE);
            return ExitCode::SUCCESS;
        }
        Command::Run(args) => args,
    };

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = logging::init(level) {
        eprintln!("Failed to initialise logging: {err}");
    }

    let result = MeshConverter::new(args.config).and_then(|converter| converter.convert(&args.input));
    match result {
        Ok(report) => {
            for path in &report.output_files {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
