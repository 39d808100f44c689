use std::io;

use clap::{Command, CommandFactory, Parser};
use clap_complete::{generate, Generator};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use coursemap::cli::args::{Cli, Commands};
use coursemap::cli::commands::execute_command;
use coursemap::cli::output;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Completion { shell }) = &cli.command {
        let mut cmd = Cli::command();
        eprintln!("Generating completion file for {shell:?}...");
        print_completions(*shell, &mut cmd);
        return;
    }

    setup_logging(cli.debug);

    if let Err(e) = execute_command(&cli) {
        if cli.json {
            eprintln!(
                "{}",
                serde_json::json!({ "error": e.code(), "message": e.to_string() })
            );
        } else {
            output::error(&e);
        }
        std::process::exit(e.exit_code());
    }
}

/// Stderr logging; `-d` raises the level, `RUST_LOG` wins when set.
fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // walkdir logs every directory entry at debug
    let quiet = filter_fn(|metadata| !metadata.target().starts_with("walkdir"));

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(verbosity > 1)
        .with_span_events(if verbosity > 2 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_filter(quiet)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(layer).init();
    tracing::debug!("log level {level}");
}
