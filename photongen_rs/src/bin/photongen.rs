use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use photongen::args::parse_args;
use photongen::config::Config;
use photongen::diag::Diagnostics;
use photongen::generator;
use photongen::project::Project;

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let mut cfg = Config::new();
    cfg.set_debug_level(args.debug_level);
    cfg.set_compression_level(args.compression_level);

    let colorize = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let start = Instant::now();
    let mut diag = Diagnostics::new();

    let project = match Project::from_file(cfg, &mut diag, &args.project) {
        Ok(project) => project,
        Err(err) => {
            diag.print_reports(colorize);
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = generator::generate(&project, Path::new(&args.out_dir)) {
        diag.print_reports(colorize);
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    diag.print_reports(colorize);
    if args.verbose {
        eprintln!(
            "generated {} device(s) in {:?}",
            project.devices().len(),
            start.elapsed()
        );
    }
    if diag.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
