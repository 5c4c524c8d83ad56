use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use engine::DeferOptions;

/// Rewrite HTML documents to defer non-critical script and style execution.
#[derive(Parser)]
#[command(name = "deferhtml", version)]
struct Cli {
    /// TOML options file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Input HTML file, `-` for stdin.
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Output HTML file, `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Drop the offline copy of the engine script.
    PurgeCache,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("deferhtml: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let options = load_options(cli.config.as_deref())?;

    if let Some(Command::PurgeCache) = cli.command {
        engine::purge_offline(&options);
        return Ok(());
    }

    let html = read_input(&cli.input)?;
    let out = engine::rewrite_document(&html, &options).map_err(|e| e.to_string())?;
    write_output(&cli.output, &out)
}

fn load_options(path: Option<&std::path::Path>) -> Result<DeferOptions, String> {
    let Some(path) = path else {
        return Ok(DeferOptions::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut html = String::new();
        io::stdin()
            .read_to_string(&mut html)
            .map_err(|e| format!("cannot read stdin: {e}"))?;
        Ok(html)
    } else {
        fs::read_to_string(input).map_err(|e| format!("cannot read {input}: {e}"))
    }
}

fn write_output(output: &str, html: &str) -> Result<(), String> {
    if output == "-" {
        io::stdout()
            .write_all(html.as_bytes())
            .map_err(|e| format!("cannot write stdout: {e}"))
    } else {
        fs::write(output, html).map_err(|e| format!("cannot write {output}: {e}"))
    }
}
