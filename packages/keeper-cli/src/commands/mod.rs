//! Command implementations.

pub mod binary;
pub mod build;
pub mod secrets;
pub mod user;

use std::io::Write;

use anyhow::Context;

/// Read one line of input after printing `label`.
pub(crate) fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line.trim().to_string())
}

/// Read a secret value without echoing it.
pub(crate) fn prompt_secret(label: &str) -> anyhow::Result<String> {
    rpassword::prompt_password(label).context("failed to read password")
}
