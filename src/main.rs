mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use ocr_scanner_lib::commands::{self, AppState, ExtractRequest};
use ocr_scanner_lib::Config;
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ExtractArgs, HistoryCommand};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    match cli.command {
        Commands::Templates => print_json(&commands::list_templates()),
        Commands::Config => print_json(&commands::config_report(&config)),
        command => {
            let state = AppState::new(config).context("initializing app state")?;
            match command {
                Commands::Extract(args) => {
                    let response = commands::extract(&state, extract_request(args))
                        .await
                        .context("extraction failed")?;
                    print_json(&response)
                }
                Commands::Verify(args) => {
                    let report = commands::verify(&state, args.file, &args.data, &args.fields)
                        .await
                        .context("verification failed")?;
                    print_json(&report)
                }
                Commands::Health => print_json(&commands::health(&state).await?),
                Commands::History(HistoryCommand::List { search }) => {
                    print_json(&commands::get_history(&state, search.as_deref())?)
                }
                Commands::History(HistoryCommand::Show { id }) => {
                    print_json(&commands::get_history_by_id(&state, id)?)
                }
                Commands::History(HistoryCommand::Set { id, edits }) => {
                    print_json(&commands::update_history_fields(&state.db, id, &edits)?)
                }
                Commands::History(HistoryCommand::Delete { id }) => {
                    commands::delete_history_record(&state, id)?;
                    print_json(&serde_json::json!({ "deleted": id }))
                }
                Commands::Templates | Commands::Config => Ok(()),
            }
        }
    }
}

fn extract_request(args: ExtractArgs) -> ExtractRequest {
    ExtractRequest {
        files: args.files,
        pdf: args.pdf.then_some(true),
        language: args.language,
        fields: args.fields,
        custom_fields: args.custom_fields,
        edits: args.edits,
        show_page: args.show_page,
        json_out: args.json_out,
        xlsx_out: args.xlsx_out,
        save_history: !args.no_history,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
