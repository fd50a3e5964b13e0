use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use gridkit_cli::{parse_encoding_flag, run, CommandKind, CommonOptions};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = CommonOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--content" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --content".to_string())?;
                options.content_dir = Some(PathBuf::from(value));
                index += 2;
            }
            "--strict" => {
                options.strict = true;
                index += 1;
            }
            "--json" => {
                options.json = true;
                index += 1;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "bounds" => CommandKind::Bounds {
            path: single_path(command, command_args)?,
        },
        "mass" => CommandKind::Mass {
            path: single_path(command, command_args)?,
        },
        "requirements" => CommandKind::Requirements {
            path: single_path(command, command_args)?,
        },
        "lookup" => {
            let [type_id, subtype_id] = command_args else {
                return Err("lookup requires <TypeId> <SubtypeId>".to_string());
            };
            CommandKind::Lookup {
                type_id: type_id.clone(),
                subtype_id: subtype_id.clone(),
            }
        }
        "material" => {
            let [name] = command_args else {
                return Err("material requires a material name".to_string());
            };
            CommandKind::Material { name: name.clone() }
        }
        "material-at" => {
            let (index, fallback_index) = match command_args {
                [index] => (parse_index(index)?, 0),
                [index, fallback] => (parse_index(index)?, parse_index(fallback)?),
                _ => return Err("material-at requires <index> [fallback-index]".to_string()),
            };
            CommandKind::MaterialAt {
                index,
                fallback_index,
            }
        }
        "convert" => {
            if command_args.len() < 2 {
                return Err("convert requires <input> <output>".to_string());
            }
            let mut encoding = None;
            for arg in &command_args[2..] {
                encoding = Some(parse_encoding_flag(arg).ok_or_else(|| {
                    format!("unknown convert argument '{arg}' (expected --gzip or --plain)")
                })?);
            }
            CommandKind::Convert {
                input: PathBuf::from(&command_args[0]),
                output: PathBuf::from(&command_args[1]),
                encoding,
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout())
}

fn single_path(command: &str, args: &[String]) -> Result<PathBuf, String> {
    match args {
        [path] => Ok(PathBuf::from(path)),
        _ => Err(format!("{command} requires exactly one grid file path")),
    }
}

fn parse_index(raw: &str) -> Result<u8, String> {
    raw.parse::<u8>()
        .map_err(|_| format!("invalid material index '{raw}' (expected 0-255)"))
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "gridkit - inspect grids and definition content",
        "",
        "Usage:",
        "  gridkit [--content <dir>] [--strict] [--json] bounds <grid-file>",
        "  gridkit [--content <dir>] [--strict] [--json] mass <grid-file>",
        "  gridkit [--content <dir>] [--strict] [--json] requirements <grid-file>",
        "  gridkit [--content <dir>] [--strict] lookup <TypeId> <SubtypeId>",
        "  gridkit [--content <dir>] [--strict] material <name>",
        "  gridkit [--content <dir>] [--strict] material-at <index> [fallback-index]",
        "  gridkit convert <input> <output> [--gzip|--plain]",
        "",
        "Content directory:",
        "  --content, else GRIDKIT_CONTENT_DIR, else Content/Data or content above the executable",
    ]
    .join("\n")
}
