//! Keeper CLI
//!
//! Interactive client for the Keeper secret manager: user registration and
//! authentication, per-type secret CRUD, and chunked binary upload/download
//! with client-side integrity verification.

mod cli;
mod commands;
mod token;
mod transport;

use clap::Parser;

use crate::cli::{BinaryCommand, Cli, Command, SecretCommand, UserCommand};
use crate::token::TokenFile;
use crate::transport::Client;
use keeper_core::model::SecretKind;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let token_file = TokenFile::new(cli.token_file.unwrap_or_else(TokenFile::default_path));
    let client = Client::new(&cli.server, token_file.clone());

    match cli.command {
        Command::User { command } => match command {
            UserCommand::Register { login } => commands::user::register(&client, &login).await,
            UserCommand::Auth { login } => commands::user::auth(&client, &login).await,
            UserCommand::Logout => commands::user::logout(&token_file),
        },

        Command::Login { command } => dispatch_secret(&client, SecretKind::Login, command).await,
        Command::Card { command } => dispatch_secret(&client, SecretKind::Card, command).await,
        Command::Note { command } => dispatch_secret(&client, SecretKind::Note, command).await,

        Command::Binary { command } => match command {
            BinaryCommand::List => commands::secrets::list(&client, SecretKind::Binary).await,
            BinaryCommand::Create { file } => commands::binary::create(&client, &file).await,
            BinaryCommand::Get { path, output } => {
                commands::binary::get(&client, &path, &output).await
            }
            BinaryCommand::Delete { path } => {
                commands::secrets::delete(&client, SecretKind::Binary, &path).await
            }
        },

        Command::Build => {
            commands::build::print();
            Ok(())
        }
    }
}

async fn dispatch_secret(
    client: &Client,
    kind: SecretKind,
    command: SecretCommand,
) -> anyhow::Result<()> {
    match command {
        SecretCommand::List => commands::secrets::list(client, kind).await,
        SecretCommand::Get { path } => commands::secrets::get(client, kind, &path).await,
        SecretCommand::Create { path } => commands::secrets::create(client, kind, &path).await,
        SecretCommand::Delete { path } => commands::secrets::delete(client, kind, &path).await,
    }
}
