use clap::Parser;
use gitlab_transfer::cli::{Cli, run};
use gitlab_transfer::logging::init_logging;
use gitlab_transfer::{StructuredError, TransferError};
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = run::execute(&cli) {
        handle_error(&e, cli.json, cli.no_color);
    }
}

/// Print `err` and exit with its category's code.
///
/// JSON goes to stderr under `--json` or when stdout is not a terminal.
fn handle_error(err: &TransferError, json_mode: bool, no_color: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    if json_mode || !io::stdout().is_terminal() {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color =
            !no_color && std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}
