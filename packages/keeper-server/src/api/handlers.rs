//! Unary request handlers: auth endpoints and per-type secret CRUD.
//!
//! Handlers translate wire bodies into pipeline runs. The write chain is
//! validate → encrypt → persist; the read chain is retrieve → decrypt. The
//! authenticated username stamps `created_by`/`modified_by` on create and
//! scopes every other operation to the caller's own secrets.

use axum::extract::{Extension, Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use keeper_core::error::Error;
use keeper_core::model::{Card, Login, Note, Secret, SecretKind, SecretMetadata};
use keeper_core::wire::{
    AuthRequest, AuthResponse, CardData, CreateRequest, CreateResponse, DeleteResponse,
    GetResponse, ListResponse, LoginData, Metadata, NoteData, RefreshRequest, TypedData,
    TypedPayload,
};

use super::ApiError;
use crate::auth::{AuthUser, TokenPair};
use crate::pipeline::ProcessorBuilder;
use crate::state::AppState;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Timestamp rendering used in responses.
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Auth ──────────────────────────────────────────────────────────────────────

fn auth_response(pair: TokenPair, user_id: &str) -> Json<AuthResponse> {
    Json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user_id: user_id.to_string(),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let pair = state.auth.register(&req.login, &req.password)?;
    Ok(auth_response(pair, &req.login))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let pair = state.auth.authenticate(&req.login, &req.password)?;
    Ok(auth_response(pair, &req.login))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let pair = state.auth.refresh_tokens(&req.refresh_token)?;
    let username = state.auth.validate_access_token(&pair.access_token)?;
    Ok(auth_response(pair, &username))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "keeperd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Secrets ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Json(req): Json<CreateRequest>,
) -> ApiResult<Json<CreateResponse>> {
    let path = req.data.base.path.clone();
    let mut secret = secret_from_request(req.data, &username);

    ProcessorBuilder::new()
        .with_validation()
        .with_encryption(state.cipher.clone())
        .with_storage_creator(state.metadata.clone(), state.objects.clone())
        .build()
        .process(&mut secret)
        .await?;

    Ok(Json(CreateResponse {
        message: format!("secret with path={path} has been successfully created"),
    }))
}

pub async fn get_secret(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(kind): Path<SecretKind>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<GetResponse>> {
    if kind == SecretKind::Binary {
        // Binaries move through the chunked transfer endpoints.
        return Err(Error::UnsupportedKind(kind.to_string()).into());
    }

    let mut secret = Secret::empty(kind, &query.path);
    ProcessorBuilder::new()
        .with_storage_retriever(state.metadata.clone(), state.objects.clone(), &username)
        .with_decryption(state.cipher.clone())
        .build()
        .process(&mut secret)
        .await?;

    Ok(Json(GetResponse {
        data: typed_data_from_secret(secret)?,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(kind): Path<SecretKind>,
) -> ApiResult<Json<ListResponse>> {
    let mut secret = Secret::empty(kind, "");
    let mut processor = ProcessorBuilder::new()
        .with_storage_lister(state.metadata.clone(), &username)
        .build();
    processor.process(&mut secret).await?;

    Ok(Json(ListResponse {
        secrets: processor.take_listing().unwrap_or_default(),
    }))
}

pub async fn delete_secret(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(kind): Path<SecretKind>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    let mut secret = Secret::empty(kind, &query.path);
    ProcessorBuilder::new()
        .with_storage_deleter(state.metadata.clone(), state.objects.clone(), &username)
        .build()
        .process(&mut secret)
        .await?;

    Ok(Json(DeleteResponse {
        message: format!(
            "secret with path={} has been successfully deleted",
            query.path
        ),
    }))
}

// ── Wire ↔ Model ──────────────────────────────────────────────────────────────

fn secret_from_request(data: TypedData, username: &str) -> Secret {
    let meta = SecretMetadata::new(&data.base.path)
        .with_owner(username)
        .with_custom_meta(data.base.metadata);

    match data.payload {
        TypedPayload::Login { login } => Secret::Login(
            Login::new(meta).with_credentials(login.login, login.password.into_bytes()),
        ),
        TypedPayload::Card { card } => Secret::Card(
            Card::new(meta)
                .with_holder(card.card_holder)
                .with_number(card.number.into_bytes())
                .with_expiry(card.expiry_month, card.expiry_year)
                .with_cvc(card.cvv.into_bytes()),
        ),
        TypedPayload::Note { note } => {
            Secret::Note(Note::new(meta).with_text(note.text.into_bytes()))
        }
    }
}

fn typed_data_from_secret(secret: Secret) -> Result<TypedData, Error> {
    let base = {
        let meta = secret.metadata();
        Metadata {
            path: meta.path.clone(),
            created_at: meta.created_at.format(DISPLAY_TIME_FORMAT).to_string(),
            created_by: meta.created_by.clone(),
            metadata: meta.custom_meta.clone(),
        }
    };

    let payload = match secret {
        Secret::Login(login) => TypedPayload::Login {
            login: LoginData {
                login: login.login,
                password: String::from_utf8_lossy(&login.password).into_owned(),
            },
        },
        Secret::Card(card) => TypedPayload::Card {
            card: CardData {
                card_holder: card.cardholder_name,
                number: String::from_utf8_lossy(&card.number).into_owned(),
                expiry_month: card.expiry_month,
                expiry_year: card.expiry_year,
                cvv: String::from_utf8_lossy(&card.cvc).into_owned(),
            },
        },
        Secret::Note(note) => TypedPayload::Note {
            note: NoteData {
                text: String::from_utf8_lossy(&note.text).into_owned(),
            },
        },
        Secret::Binary(_) => return Err(Error::UnsupportedKind("binary".into())),
    };

    Ok(TypedData { base, payload })
}
