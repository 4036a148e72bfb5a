//! `keeper binary`: chunked upload and verified download.

use std::path::Path;

use crate::transport::Client;

pub async fn create(client: &Client, file: &Path) -> anyhow::Result<()> {
    let message = client.upload(file).await?;
    println!("{message}");
    Ok(())
}

pub async fn get(client: &Client, path: &str, output: &Path) -> anyhow::Result<()> {
    client.download(path, output).await?;
    println!("Binary {} has been successfully retrieved", output.display());
    Ok(())
}
