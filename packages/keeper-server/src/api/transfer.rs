//! Chunked binary transfer over WebSocket.
//!
//! Upload is client-streaming: `Chunk` frames arrive in order, each one is
//! hash-verified, encrypted (the key minted for chunk 0 is reused for every
//! later chunk), and written to the object store under `<path>/<chunk_id>`.
//! The terminator frame (empty data, whole-file hash, total count) commits
//! the metadata row, and the server answers with `Complete`.
//!
//! Download mirrors it: the terminal record is loaded first, then chunks
//! stream back in index order, each with a fresh plaintext digest, closing
//! with the terminator carrying the stored whole-file hash.
//!
//! A hash mismatch aborts the stream with an `Error` frame; chunks already
//! written stay behind as orphans until the reaper collects them.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use keeper_core::chunk;
use keeper_core::error::{Error, Result};
use keeper_core::model::{Binary, Secret, SecretKind, SecretMetadata};
use keeper_core::wire::TransferFrame;

use crate::auth::AuthUser;
use crate::pipeline::{Processor, ProcessorBuilder};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub filename: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn upload(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_upload(socket, state, username))
}

pub async fn download(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Query(query): Query<DownloadQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_download(socket, state, username, query.filename))
}

async fn handle_upload(mut socket: WebSocket, state: AppState, username: String) {
    let mut session = UploadSession::new(state, username);

    while let Some(received) = socket.recv().await {
        let message = match received {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                tracing::warn!("upload stream closed before terminator");
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "upload stream error");
                return;
            }
        };

        let frame = match serde_json::from_str::<TransferFrame>(&message) {
            Ok(TransferFrame::Chunk {
                filename,
                data,
                chunk_id,
                hash,
            }) => session.ingest(&filename, data, chunk_id, &hash).await,
            Ok(_) => Err(Error::Protocol("expected a chunk frame".into())),
            Err(err) => Err(Error::Protocol(format!("invalid message format: {err}"))),
        };

        match frame {
            Ok(None) => {}
            Ok(Some(message)) => {
                send_frame(&mut socket, TransferFrame::Complete { message }).await;
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "upload aborted");
                send_frame(
                    &mut socket,
                    TransferFrame::Error {
                        message: err.to_string(),
                    },
                )
                .await;
                break;
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn handle_download(mut socket: WebSocket, state: AppState, username: String, filename: String) {
    let mut stream = match DownloadStream::open(state, username, filename).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(error = %err, "download rejected");
            send_frame(
                &mut socket,
                TransferFrame::Error {
                    message: err.to_string(),
                },
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        match stream.next_frame().await {
            Ok(Some(frame)) => {
                if !send_frame(&mut socket, frame).await {
                    tracing::warn!("download stream closed by peer");
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "download failed");
                send_frame(
                    &mut socket,
                    TransferFrame::Error {
                        message: err.to_string(),
                    },
                )
                .await;
                break;
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

async fn send_frame(socket: &mut WebSocket, frame: TransferFrame) -> bool {
    match serde_json::to_string(&frame) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "cannot serialize transfer frame");
            false
        }
    }
}

// ── Upload State Machine ─────────────────────────────────────────────────────

/// Per-connection upload state.
///
/// The wrapped data key established by the first chunk is carried across the
/// stream so every chunk of one upload shares a single DEK, and lands on the
/// terminal metadata row at the end.
pub(crate) struct UploadSession {
    state: AppState,
    username: String,
    data_key: Option<Vec<u8>>,
}

impl UploadSession {
    pub(crate) fn new(state: AppState, username: String) -> Self {
        Self {
            state,
            username,
            data_key: None,
        }
    }

    fn write_chain(&self) -> Processor {
        ProcessorBuilder::new()
            .with_encryption(self.state.cipher.clone())
            .with_storage_creator(self.state.metadata.clone(), self.state.objects.clone())
            .build()
    }

    /// Feed one `Chunk` frame through the pipeline.
    ///
    /// Returns `Ok(None)` for a data chunk and `Ok(Some(message))` once the
    /// terminator has committed the metadata row.
    pub(crate) async fn ingest(
        &mut self,
        filename: &str,
        data: Vec<u8>,
        chunk_id: i64,
        hash: &str,
    ) -> Result<Option<String>> {
        if data.is_empty() {
            let meta = SecretMetadata::new(filename)
                .with_owner(&self.username)
                .with_data_key(self.data_key.clone().unwrap_or_default());
            let mut secret =
                Secret::Binary(Binary::new(meta).with_summary(chunk_id, hash.to_string()));
            self.write_chain().process(&mut secret).await?;

            tracing::info!(filename, chunks = chunk_id, "upload completed");
            return Ok(Some(format!(
                "Upload of {filename} with {chunk_id} chunks has been completed"
            )));
        }

        if !chunk::verify_chunk(&data, hash) {
            return Err(Error::ChunkHashMismatch { chunk_id });
        }

        let meta =
            SecretMetadata::new(filename).with_data_key(self.data_key.clone().unwrap_or_default());
        let mut secret = Secret::Binary(Binary::new(meta).with_chunk(chunk_id, data));
        self.write_chain().process(&mut secret).await?;

        if self.data_key.is_none() {
            // Chunk 0 minted the DEK; it is authoritative for the rest of
            // this upload.
            self.data_key = Some(secret.metadata().encrypted_data_key.clone());
        }

        Ok(None)
    }
}

// ── Download Streamer ────────────────────────────────────────────────────────

/// Server-streaming download: terminal record first, then chunks in order,
/// then the terminator frame.
pub(crate) struct DownloadStream {
    state: AppState,
    username: String,
    path: String,
    chunks: i64,
    file_hash: String,
    data_key: Vec<u8>,
    next_chunk: i64,
    sent_terminator: bool,
}

impl DownloadStream {
    pub(crate) async fn open(
        state: AppState,
        username: String,
        filename: String,
    ) -> Result<Self> {
        let mut secret = Secret::empty(SecretKind::Binary, &filename);
        ProcessorBuilder::new()
            .with_storage_retriever(state.metadata.clone(), state.objects.clone(), &username)
            .build()
            .process(&mut secret)
            .await?;

        let Secret::Binary(binary) = secret else {
            return Err(Error::Internal("binary retrieval changed variant".into()));
        };

        Ok(Self {
            state,
            username,
            path: filename,
            chunks: binary.chunks,
            file_hash: binary.hash,
            data_key: binary.meta.encrypted_data_key,
            next_chunk: 0,
            sent_terminator: false,
        })
    }

    pub(crate) async fn next_frame(&mut self) -> Result<Option<TransferFrame>> {
        if self.next_chunk < self.chunks {
            let meta = SecretMetadata::new(&self.path).with_data_key(self.data_key.clone());
            let mut secret =
                Secret::Binary(Binary::new(meta).with_chunk_id(self.next_chunk));
            ProcessorBuilder::new()
                .with_storage_retriever(
                    self.state.metadata.clone(),
                    self.state.objects.clone(),
                    &self.username,
                )
                .with_decryption(self.state.cipher.clone())
                .build()
                .process(&mut secret)
                .await?;

            let Secret::Binary(binary) = secret else {
                return Err(Error::Internal("chunk retrieval changed variant".into()));
            };
            let data = binary.data.unwrap_or_default();
            let hash = chunk::chunk_digest(&data);

            let frame = TransferFrame::chunk(&self.path, data, self.next_chunk, hash);
            self.next_chunk += 1;
            return Ok(Some(frame));
        }

        if !self.sent_terminator {
            self.sent_terminator = true;
            return Ok(Some(TransferFrame::terminator(
                &self.path,
                self.chunks,
                self.file_hash.clone(),
            )));
        }

        Ok(None)
    }
}
