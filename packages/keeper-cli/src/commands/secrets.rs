//! `keeper login|card|note`: per-type CRUD. `create` prompts for the typed
//! fields; sensitive values are read without echo.

use anyhow::bail;

use keeper_core::model::SecretKind;
use keeper_core::wire::{CardData, LoginData, Metadata, NoteData, TypedData, TypedPayload};

use super::{prompt, prompt_secret};
use crate::transport::Client;

pub async fn list(client: &Client, kind: SecretKind) -> anyhow::Result<()> {
    let response = client.list(kind).await?;
    if response.secrets.is_empty() {
        println!("No {kind} secrets stored");
        return Ok(());
    }
    for path in response.secrets {
        println!("{path}");
    }
    Ok(())
}

pub async fn get(client: &Client, kind: SecretKind, path: &str) -> anyhow::Result<()> {
    let response = client.get(kind, path).await?;
    let data = response.data;

    println!("path: {}", data.base.path);
    if !data.base.created_by.is_empty() {
        println!("created by: {} at {}", data.base.created_by, data.base.created_at);
    }
    if !data.base.metadata.is_empty() {
        println!("metadata: {:?}", data.base.metadata);
    }

    match data.payload {
        TypedPayload::Login { login } => {
            println!("login: {}", login.login);
            println!("password: {}", login.password);
        }
        TypedPayload::Card { card } => {
            println!("cardholder: {}", card.card_holder);
            println!("number: {}", card.number);
            println!("expires: {:02}/{}", card.expiry_month, card.expiry_year);
            println!("cvv: {}", card.cvv);
        }
        TypedPayload::Note { note } => {
            println!("text: {}", note.text);
        }
    }
    Ok(())
}

pub async fn create(client: &Client, kind: SecretKind, path: &str) -> anyhow::Result<()> {
    let payload = match kind {
        SecretKind::Login => {
            let login = prompt("Login: ")?;
            let password = prompt_secret("Password: ")?;
            TypedPayload::Login {
                login: LoginData { login, password },
            }
        }
        SecretKind::Card => {
            let card_holder = prompt("Cardholder name: ")?;
            let number = prompt("Card number: ")?;
            let expiry_month: u8 = prompt("Expiry month: ")?.parse()?;
            let expiry_year: u16 = prompt("Expiry year: ")?.parse()?;
            let cvv = prompt_secret("CVC: ")?;
            TypedPayload::Card {
                card: CardData {
                    card_holder,
                    number,
                    expiry_month,
                    expiry_year,
                    cvv,
                },
            }
        }
        SecretKind::Note => {
            let text = prompt("Text: ")?;
            TypedPayload::Note {
                note: NoteData { text },
            }
        }
        SecretKind::Binary => bail!("use `keeper binary create` for binaries"),
    };

    let data = TypedData {
        base: Metadata {
            path: path.to_string(),
            ..Default::default()
        },
        payload,
    };

    let response = client.create(data).await?;
    println!("{}", response.message);
    Ok(())
}

pub async fn delete(client: &Client, kind: SecretKind, path: &str) -> anyhow::Result<()> {
    let response = client.delete(kind, path).await?;
    println!("{}", response.message);
    Ok(())
}
