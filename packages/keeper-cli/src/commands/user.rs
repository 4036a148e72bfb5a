//! `keeper user`: registration, authentication, logout.

use anyhow::bail;

use super::prompt_secret;
use crate::token::TokenFile;
use crate::transport::Client;

pub async fn register(client: &Client, login: &str) -> anyhow::Result<()> {
    let password = prompt_secret("Enter password: ")?;
    let confirm = prompt_secret("Confirm password: ")?;
    if password != confirm {
        bail!("passwords don't match");
    }

    let response = client.register(login, &password).await?;
    client.save_tokens(&response)?;
    println!("Successfully registered as {}", response.user_id);
    Ok(())
}

pub async fn auth(client: &Client, login: &str) -> anyhow::Result<()> {
    let password = prompt_secret("Enter password: ")?;

    let response = client.authenticate(login, &password).await?;
    client.save_tokens(&response)?;
    println!("Successfully authenticated as {}", response.user_id);
    Ok(())
}

pub fn logout(tokens: &TokenFile) -> anyhow::Result<()> {
    tokens.delete()?;
    println!("Logged out");
    Ok(())
}
