use clap::Parser;
use credvault::cli::commands::update::UpdateArgs;
use credvault::cli::{commands, output, Cli, Commands};

/// Initializes the tracing subscriber. Logs go to stderr so they never
/// mix with values printed on stdout.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("CREDVAULT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("credvault=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match &cli.command {
        Commands::Keygen => commands::keygen::execute(),
        Commands::Create {
            name,
            credential_type,
            payload,
            metadata,
            expires_in,
        } => {
            commands::create::execute(
                &cli,
                name,
                credential_type,
                payload,
                metadata.as_deref(),
                expires_in.as_deref(),
            )
            .await
        }
        Commands::Get { name, field } => {
            commands::get::execute(&cli, name, field.as_deref()).await
        }
        Commands::List {
            credential_type,
            status,
            prefix,
            json,
        } => {
            commands::list::execute(
                &cli,
                credential_type.as_deref(),
                status.as_deref(),
                prefix.as_deref(),
                *json,
            )
            .await
        }
        Commands::Update {
            name,
            rename,
            status,
            metadata,
            expires_in,
            clear_expiry,
            payload,
        } => {
            let args = UpdateArgs {
                rename: rename.as_deref(),
                status: status.as_deref(),
                metadata: metadata.as_deref(),
                expires_in: expires_in.as_deref(),
                clear_expiry: *clear_expiry,
                payload,
            };
            commands::update::execute(&cli, name, args).await
        }
        Commands::Rotate {
            name,
            payload,
            reason,
        } => commands::rotate::execute(&cli, name, payload, reason.as_deref()).await,
        Commands::History { name } => commands::history::execute(&cli, name).await,
        Commands::Delete { name, force } => commands::delete::execute(&cli, name, *force).await,
        Commands::Audit { name, last } => {
            commands::audit::execute(&cli, name.as_deref(), *last).await
        }
        Commands::Types {
            credential_type,
            json,
        } => commands::types::execute(credential_type.as_deref(), *json),
        Commands::Mask { names, json } => commands::mask::execute(&cli, names, *json).await,
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
