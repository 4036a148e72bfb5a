//! Command tree.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "keeper", version, about = "Keeper secret manager client")]
pub struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8081", env = "KEEPER_SERVER")]
    pub server: String,

    /// Token file location (defaults to a user-only file in the temp dir)
    #[arg(long, env = "KEEPER_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Login secret commands
    Login {
        #[command(subcommand)]
        command: SecretCommand,
    },

    /// Card secret commands
    Card {
        #[command(subcommand)]
        command: SecretCommand,
    },

    /// Note secret commands
    Note {
        #[command(subcommand)]
        command: SecretCommand,
    },

    /// Binary management commands
    Binary {
        #[command(subcommand)]
        command: BinaryCommand,
    },

    /// Print version, build date, and commit
    Build,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a new user (prompts for the password twice)
    Register {
        #[arg(short = 'l', long)]
        login: String,
    },

    /// Authenticate an existing user
    Auth {
        #[arg(short = 'l', long)]
        login: String,
    },

    /// Delete the stored token pair
    Logout,
}

#[derive(Subcommand, Debug)]
pub enum SecretCommand {
    /// List stored paths
    List,

    /// Retrieve one secret
    Get {
        #[arg(short, long)]
        path: String,
    },

    /// Store a new secret (prompts for the fields)
    Create {
        #[arg(short, long)]
        path: String,
    },

    /// Delete one secret
    Delete {
        #[arg(short, long)]
        path: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BinaryCommand {
    /// List uploaded binaries
    List,

    /// Upload a new binary
    Create {
        /// Binary filepath
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Download a binary
    Get {
        /// Binary path on the server
        #[arg(short, long)]
        path: String,

        /// Output filepath
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Delete a binary and all of its chunks
    Delete {
        #[arg(short, long)]
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_register_flags() {
        let cli = Cli::parse_from(["keeper", "user", "register", "-l", "mark"]);
        match cli.command {
            Command::User {
                command: UserCommand::Register { login },
            } => assert_eq!(login, "mark"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_binary_get_flags() {
        let cli = Cli::parse_from([
            "keeper", "binary", "get", "-p", "file.bin", "-o", "/tmp/out.bin",
        ]);
        match cli.command {
            Command::Binary {
                command: BinaryCommand::Get { path, output },
            } => {
                assert_eq!(path, "file.bin");
                assert_eq!(output, PathBuf::from("/tmp/out.bin"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_secret_subcommands() {
        let cli = Cli::parse_from(["keeper", "note", "create", "-p", "note0"]);
        assert!(matches!(
            cli.command,
            Command::Note {
                command: SecretCommand::Create { .. }
            }
        ));

        let cli = Cli::parse_from(["keeper", "card", "list"]);
        assert!(matches!(
            cli.command,
            Command::Card {
                command: SecretCommand::List
            }
        ));
    }
}
