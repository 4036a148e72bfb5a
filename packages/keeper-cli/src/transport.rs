//! Server transport: JSON-over-HTTP for the unary calls, JSON frames over
//! WebSocket for the chunked binary transfers. Every authenticated call
//! carries the stored access token as a `Bearer` header.

use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;

use keeper_core::chunk::{FileDigest, CHUNK_SIZE};
use keeper_core::model::SecretKind;
use keeper_core::wire::{
    AuthRequest, AuthResponse, CreateRequest, CreateResponse, DeleteResponse, ErrorResponse,
    GetResponse, ListResponse, RefreshRequest, TransferFrame, TypedData,
};

use crate::token::{TokenData, TokenFile};

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenFile,
}

impl Client {
    pub fn new(server: &str, tokens: TokenFile) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: server.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn access_token(&self) -> anyhow::Result<String> {
        Ok(self.tokens.load()?.access_token)
    }

    fn ws_url(&self, path_and_query: &str) -> anyhow::Result<String> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            bail!("server URL must start with http:// or https://");
        };
        Ok(format!("{ws_base}{path_and_query}"))
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    pub async fn register(&self, login: &str, password: &str) -> anyhow::Result<AuthResponse> {
        self.post_json(
            "/api/auth/register",
            &AuthRequest {
                login: login.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    pub async fn authenticate(&self, login: &str, password: &str) -> anyhow::Result<AuthResponse> {
        self.post_json(
            "/api/auth/login",
            &AuthRequest {
                login: login.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthResponse> {
        self.post_json(
            "/api/auth/refresh",
            &RefreshRequest {
                refresh_token: refresh_token.to_string(),
            },
        )
        .await
    }

    /// Persist a freshly minted pair.
    pub fn save_tokens(&self, response: &AuthResponse) -> anyhow::Result<()> {
        self.tokens.save(&TokenData {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
        })
    }

    // ── Secrets ───────────────────────────────────────────────────────────

    pub async fn create(&self, data: TypedData) -> anyhow::Result<CreateResponse> {
        let url = format!("{}/api/secrets", self.base_url);
        let request = CreateRequest { data };
        self.send_authed(move |http, token| http.post(&url).json(&request).bearer_auth(token))
            .await
    }

    pub async fn get(&self, kind: SecretKind, path: &str) -> anyhow::Result<GetResponse> {
        let url = format!(
            "{}/api/secrets/{}/item?path={}",
            self.base_url,
            kind,
            urlencoding::encode(path)
        );
        self.send_authed(move |http, token| http.get(&url).bearer_auth(token))
            .await
    }

    pub async fn list(&self, kind: SecretKind) -> anyhow::Result<ListResponse> {
        let url = format!("{}/api/secrets/{}", self.base_url, kind);
        self.send_authed(move |http, token| http.get(&url).bearer_auth(token))
            .await
    }

    pub async fn delete(&self, kind: SecretKind, path: &str) -> anyhow::Result<DeleteResponse> {
        let url = format!(
            "{}/api/secrets/{}/item?path={}",
            self.base_url,
            kind,
            urlencoding::encode(path)
        );
        self.send_authed(move |http, token| http.delete(&url).bearer_auth(token))
            .await
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        decode_response(request.send().await?).await
    }

    /// Send an authenticated request; on a 401, try one refresh-and-retry
    /// with the stored refresh token before giving up.
    async fn send_authed<R, F>(&self, build: F) -> anyhow::Result<R>
    where
        R: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token()?;
        let response = build(&self.http, &token).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let stored = self.tokens.load()?;
            if let Ok(refreshed) = self.refresh(&stored.refresh_token).await {
                self.save_tokens(&refreshed)?;
                let retry = build(&self.http, &refreshed.access_token).send().await?;
                return decode_response(retry).await;
            }
        }

        decode_response(response).await
    }

    // ── Binary Transfer ───────────────────────────────────────────────────

    async fn connect_ws(
        &self,
        path_and_query: &str,
    ) -> anyhow::Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    > {
        let token = self.access_token()?;
        let mut request = self
            .ws_url(path_and_query)?
            .into_client_request()
            .context("invalid server URL")?;
        request.headers_mut().insert(
            AUTHORIZATION,
            format!("Bearer {token}")
                .parse()
                .context("invalid token for header")?,
        );

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to connect to the server")?;
        Ok(stream)
    }

    /// Upload `file` in 512 KiB chunks, closing with the whole-file digest.
    /// Returns the server's completion message.
    pub async fn upload(&self, file: &Path) -> anyhow::Result<String> {
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .context("invalid file name")?
            .to_string();

        let mut source = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("failed to read a file: {}", file.display()))?;

        let mut ws = self.connect_ws("/ws/upload").await?;
        let mut digest = FileDigest::new();
        let mut chunk_id = 0i64;

        loop {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut filled = 0;
            while filled < CHUNK_SIZE {
                let n = source.read(&mut buffer[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            buffer.truncate(filled);

            let hash = digest.add_chunk(&buffer);
            let frame = TransferFrame::chunk(&filename, buffer, chunk_id, hash);
            ws.send(Message::Text(serde_json::to_string(&frame)?))
                .await
                .context("failed to send chunk")?;
            print!(".");
            std::io::stdout().flush().ok();

            chunk_id += 1;
            if filled < CHUNK_SIZE {
                break;
            }
        }
        println!();

        let terminator = TransferFrame::terminator(&filename, chunk_id, digest.finish());
        ws.send(Message::Text(serde_json::to_string(&terminator)?))
            .await
            .context("failed to send chunk")?;

        while let Some(message) = ws.next().await {
            let Message::Text(text) = message.context("failed to receive upload status")? else {
                continue;
            };
            match serde_json::from_str::<TransferFrame>(&text)? {
                TransferFrame::Complete { message } => {
                    ws.close(None).await.ok();
                    return Ok(message);
                }
                TransferFrame::Error { message } => bail!(message),
                TransferFrame::Chunk { .. } => continue,
            }
        }

        bail!("connection closed before upload completed")
    }

    /// Download the binary at `path` into `output`, verifying every chunk
    /// and the whole-file digest. A partially written file is removed on any
    /// failure.
    pub async fn download(&self, path: &str, output: &Path) -> anyhow::Result<()> {
        let query = format!("/ws/download?filename={}", urlencoding::encode(path));
        let mut ws = self.connect_ws(&query).await?;

        let result = receive_file(&mut ws, output).await;
        ws.close(None).await.ok();

        if result.is_err() {
            let _ = tokio::fs::remove_file(output).await;
        }
        result
    }
}

async fn receive_file<S>(ws: &mut S, output: &Path) -> anyhow::Result<()>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("failed to create a new file: {}", output.display()))?;
    let mut digest = FileDigest::new();

    while let Some(message) = ws.next().await {
        let Message::Text(text) = message.context("failed to receive chunk")? else {
            continue;
        };

        match serde_json::from_str::<TransferFrame>(&text)? {
            TransferFrame::Chunk { data, hash, .. } if !data.is_empty() => {
                let computed = digest.add_chunk(&data);
                if computed != hash {
                    bail!("aborted download due to chunk hash mismatch");
                }
                file.write_all(&data).await?;
                print!(".");
                std::io::stdout().flush().ok();
            }
            TransferFrame::Chunk { hash, .. } => {
                // Terminator: compare the rolling digest with the stored
                // whole-file hash.
                if digest.finish() != hash {
                    bail!("aborted download due to file hash mismatch");
                }
                file.flush().await?;
                println!();
                return Ok(());
            }
            TransferFrame::Error { message } => bail!(message),
            TransferFrame::Complete { .. } => continue,
        }
    }

    bail!("connection closed before download completed")
}

async fn decode_response<R: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<R> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<R>()
            .await
            .context("failed to parse server response");
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => format!("server returned {status}"),
    };
    bail!(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(
            "http://localhost:8081/",
            TokenFile::new(std::env::temp_dir().join("keeper-test-token")),
        )
    }

    #[test]
    fn test_ws_url_scheme_rewrite() {
        let client = client();
        assert_eq!(
            client.ws_url("/ws/upload").unwrap(),
            "ws://localhost:8081/ws/upload"
        );

        let tls = Client::new(
            "https://keeper.example.com",
            TokenFile::new(std::env::temp_dir().join("keeper-test-token")),
        );
        assert_eq!(
            tls.ws_url("/ws/download?filename=a").unwrap(),
            "wss://keeper.example.com/ws/download?filename=a"
        );
    }

    #[test]
    fn test_ws_url_rejects_unknown_scheme() {
        let client = Client::new(
            "ftp://nope",
            TokenFile::new(std::env::temp_dir().join("keeper-test-token")),
        );
        assert!(client.ws_url("/ws/upload").is_err());
    }

    #[test]
    fn test_chunk_math_matches_protocol() {
        // The upload loop emits ceil(size / CHUNK_SIZE) chunks; spot-check
        // the boundary the protocol cares about.
        assert_eq!((2 * CHUNK_SIZE + 100).div_ceil(CHUNK_SIZE), 3);
        let empty_digest = FileDigest::new();
        assert_eq!(empty_digest.finish(), keeper_core::chunk::chunk_digest(b""));
    }
}
