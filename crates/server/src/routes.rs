//! HTTP routes.

use crate::error::ApiError;
use crate::ws;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use keyto_chain::{BlockTemplate, ErrorKind, MinedBlock, Node, NodeStats, WalletView};
use keyto_consensus::CancelToken;
use keyto_core::{Address, Block, Hash, PublicKey, Signature, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub type SharedNode = Arc<Node>;

pub fn router(node: SharedNode) -> Router {
    Router::new()
        .route("/wallet/:address", get(wallet))
        .route("/mine", post(mine))
        .route("/mine/template", post(block_template))
        .route("/mine/submit", post(submit_block))
        .route("/send", post(send))
        .route("/chain", get(chain))
        .route("/mempool", get(mempool))
        .route("/health", get(health))
        .route("/ws", get(ws::handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(node)
}

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MineRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub block: Block,
}

/// Transfer as sent by wallets: every byte field hex-encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub nonce: u64,
    pub signature: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MineResponse {
    pub message: String,
    pub block_index: u64,
    pub reward: u64,
    pub supply: u64,
    pub difficulty: u32,
    pub hash: Hash,
    pub tx_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tries: Option<u64>,
}

impl From<MinedBlock> for MineResponse {
    fn from(mined: MinedBlock) -> Self {
        let header = &mined.block.header;
        Self {
            message: format!("Block {} mined +{} KTC", header.index, header.reward),
            block_index: header.index,
            reward: header.reward,
            supply: mined.supply,
            difficulty: header.difficulty,
            hash: mined.block.hash,
            tx_count: mined.block.tx_count(),
            tries: mined.tries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message: String,
    pub hash: Hash,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: NodeStats,
}

// =============================================================================
// Parsing
// =============================================================================

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::new(ErrorKind::InvalidRequest, e.body_text()))
}

fn parse_address(s: &str) -> Result<Address, ApiError> {
    Address::from_hex(s).map_err(|_| {
        ApiError::new(
            ErrorKind::UnknownOrMismatchedAddress,
            format!("malformed address: {}", s),
        )
    })
}

impl SendRequest {
    /// Decode into a transaction. Malformed keys and signatures are
    /// reported as `InvalidSignature`.
    fn into_transaction(self) -> Result<Transaction, ApiError> {
        let invalid =
            |what: &str| ApiError::new(ErrorKind::InvalidSignature, format!("malformed {}", what));
        Ok(Transaction {
            from: parse_address(&self.from)?,
            to: parse_address(&self.to)?,
            amount: self.amount,
            nonce: self.nonce,
            signature: Signature::from_hex(&self.signature).map_err(|_| invalid("signature"))?,
            public_key: PublicKey::from_hex(&self.public_key).map_err(|_| invalid("public key"))?,
        })
    }
}

/// Cancels the search if the request is dropped before it finishes.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn wallet(
    State(node): State<SharedNode>,
    Path(address): Path<String>,
) -> Result<Json<WalletView>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(node.wallet(&address)))
}

async fn mine(
    State(node): State<SharedNode>,
    payload: Result<Json<MineRequest>, JsonRejection>,
) -> Result<Json<MineResponse>, ApiError> {
    let miner = parse_address(&body(payload)?.address)?;
    let guard = CancelOnDrop(CancelToken::new());
    let cancel = guard.0.clone();

    let mined = tokio::task::spawn_blocking(move || node.mine(miner, &cancel))
        .await
        .map_err(|e| ApiError::new(ErrorKind::MiningAborted, e.to_string()))??;
    Ok(Json(mined.into()))
}

async fn block_template(
    State(node): State<SharedNode>,
    payload: Result<Json<MineRequest>, JsonRejection>,
) -> Result<Json<BlockTemplate>, ApiError> {
    let miner = parse_address(&body(payload)?.address)?;
    Ok(Json(node.block_template(miner)?))
}

async fn submit_block(
    State(node): State<SharedNode>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<MineResponse>, ApiError> {
    let block = body(payload)?.block;
    let mined = tokio::task::spawn_blocking(move || node.submit_block(block))
        .await
        .map_err(|e| ApiError::new(ErrorKind::InvalidBlock, e.to_string()))??;
    Ok(Json(mined.into()))
}

async fn send(
    State(node): State<SharedNode>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let tx = body(payload)?.into_transaction()?;
    let hash = node.submit_transaction(tx)?;
    Ok(Json(SendResponse {
        message: "Transaction accepted".into(),
        hash,
    }))
}

async fn chain(State(node): State<SharedNode>) -> Json<Vec<Block>> {
    Json(node.chain())
}

async fn mempool(State(node): State<SharedNode>) -> Json<Vec<Transaction>> {
    Json(node.pending())
}

async fn health(State(node): State<SharedNode>) -> Json<HealthResponse> {
    let stats = node.stats();
    Json(HealthResponse {
        status: if stats.halted { "halted" } else { "ok" },
        stats,
    })
}
