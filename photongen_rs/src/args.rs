//! Command-line argument parsing.
//!
//! The surface is small enough that flags are matched by hand:
//! `-p <project.toml> -o <outDir> [-d 0..5] [-c 0..5] [-v]`.

use std::path::PathBuf;

pub const USAGE: &str = "\
photongen - decode source generator

USAGE:
    photongen -p <project.toml> -o <dir> [OPTIONS]

OPTIONS:
    -p, --in <path>                  Project file
    -o, --out <path>                 Output directory
    -d, --debug-level <0-5>          Generated code debug level (default 0)
    -c, --compression-level <0-5>    Package compression level (default 4)
    -v, --verbose                    Print progress notes
    -h, --help                       Print this message
";

#[derive(Debug, Clone)]
pub struct ParsedArgs {
    pub project: PathBuf,
    pub out_dir: PathBuf,
    pub debug_level: u8,
    pub compression_level: u8,
    pub verbose: bool,
}

/// Parse CLI arguments (without the program name). Levels are clamped to 5
/// by the [`Config`](crate::config::Config) they are fed into.
pub fn parse_args<I, S>(args: I) -> Result<ParsedArgs, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut project = None;
    let mut out_dir = None;
    let mut debug_level = 0u8;
    let mut compression_level = 4u8;
    let mut verbose = false;

    let mut iter = args.into_iter().map(Into::into);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-p" | "--in" => {
                let value = iter.next().ok_or("missing value for -p")?;
                project = Some(PathBuf::from(value));
            }
            "-o" | "--out" => {
                let value = iter.next().ok_or("missing value for -o")?;
                out_dir = Some(PathBuf::from(value));
            }
            "-d" | "--debug-level" => {
                let value = iter.next().ok_or("missing value for -d")?;
                debug_level = value
                    .parse()
                    .map_err(|_| format!("invalid debug level: {value}"))?;
            }
            "-c" | "--compression-level" => {
                let value = iter.next().ok_or("missing value for -c")?;
                compression_level = value
                    .parse()
                    .map_err(|_| format!("invalid compression level: {value}"))?;
            }
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument: {other}\n\n{USAGE}")),
        }
    }

    Ok(ParsedArgs {
        project: project.ok_or("missing required argument -p <project.toml>")?,
        out_dir: out_dir.ok_or("missing required argument -o <dir>")?,
        debug_level,
        compression_level,
        verbose,
    })
}
