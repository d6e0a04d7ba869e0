use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use lrauv_processor::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            process::exit(code);
        }
    };

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(1);
    }

    match run(args) {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

fn run(args: Args) -> anyhow::Result<bool> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    let succeeded = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        // First Ctrl-C stops the current step and reports; a second one exits
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, stopping the current step...");
                token.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C again, exiting");
                process::exit(130);
            }
        });

        commands::run(args, cancellation_token).await
    })?;
    Ok(succeeded)
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("LRAUV Processor - mission log discovery and resampling");
    println!("======================================================");
    println!();
    println!("USAGE:");
    println!("    lrauv_processor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    resample    Discover, validate and resample mission logs");
    println!("    monthly     Load monthly campaign databases");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Resample September 2012 tethys logs at 2 seconds:");
    println!("    lrauv_processor resample --platform tethys --start 20120901 --end 20121001");
    println!();
    println!("    # Resample last month's science variables for every platform:");
    println!("    lrauv_processor resample --previous-month -a sci");
    println!();
    println!("    # Reload the June 2019 campaign database:");
    println!("    lrauv_processor monthly --yyyymm 201906");
    println!();
    println!("For detailed help on any command, use:");
    println!("    lrauv_processor <COMMAND> --help");
}
