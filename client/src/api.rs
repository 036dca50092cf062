//! Typed wrappers over the daemon's logical endpoints.
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ClientError;
use crate::rpc::{Gateway, Method};
use crate::types::{
    AddressResponse, Balance, BannedList, BlockInfo, ChainStatus, HistoryResponse, MempoolStats,
    MiningStatus, Output, PeerList, SeedResponse, SendResult,
};

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Transport(format!("Unexpected response from {path}: {e}")))
}

async fn get<T: DeserializeOwned>(gw: &dyn Gateway, path: &str) -> Result<T, ClientError> {
    let value = gw.call(Method::Get, path, None).await?;
    decode(path, value)
}

async fn post<T: DeserializeOwned>(
    gw: &dyn Gateway,
    path: &str,
    body: Option<Value>,
) -> Result<T, ClientError> {
    let value = gw.call(Method::Post, path, body).await?;
    decode(path, value)
}

async fn post_unit(gw: &dyn Gateway, path: &str, body: Option<Value>) -> Result<(), ClientError> {
    gw.call(Method::Post, path, body).await.map(|_| ())
}

pub async fn chain_status(gw: &dyn Gateway) -> Result<ChainStatus, ClientError> {
    get(gw, "/api/status").await
}

pub async fn balance(gw: &dyn Gateway) -> Result<Balance, ClientError> {
    get(gw, "/api/wallet/balance").await
}

/// Wallet history. A response without an `outputs` list is an empty history.
pub async fn history(gw: &dyn Gateway) -> Result<Vec<Output>, ClientError> {
    let res: HistoryResponse = get(gw, "/api/wallet/history").await?;
    Ok(res.outputs.unwrap_or_default())
}

pub async fn block(gw: &dyn Gateway, height: u64) -> Result<BlockInfo, ClientError> {
    get(gw, &format!("/api/block/{height}")).await
}

pub async fn mempool(gw: &dyn Gateway) -> Result<MempoolStats, ClientError> {
    get(gw, "/api/mempool").await
}

pub async fn mining(gw: &dyn Gateway) -> Result<MiningStatus, ClientError> {
    get(gw, "/api/mining").await
}

pub async fn peers(gw: &dyn Gateway) -> Result<PeerList, ClientError> {
    get(gw, "/api/peers").await
}

pub async fn banned_peers(gw: &dyn Gateway) -> Result<BannedList, ClientError> {
    get(gw, "/api/peers/banned").await
}

pub async fn set_mining(gw: &dyn Gateway, running: bool) -> Result<(), ClientError> {
    let path = if running { "/api/mining/start" } else { "/api/mining/stop" };
    post_unit(gw, path, None).await
}

pub async fn set_mining_threads(gw: &dyn Gateway, threads: u32) -> Result<(), ClientError> {
    post_unit(gw, "/api/mining/threads", Some(json!({ "threads": threads }))).await
}

pub async fn receive_address(gw: &dyn Gateway) -> Result<String, ClientError> {
    let res: AddressResponse = get(gw, "/api/wallet/address").await?;
    Ok(res.address)
}

pub async fn lock_wallet(gw: &dyn Gateway) -> Result<(), ClientError> {
    post_unit(gw, "/api/wallet/lock", None).await
}

pub async fn send(gw: &dyn Gateway, address: &str, amount: u64) -> Result<SendResult, ClientError> {
    post(
        gw,
        "/api/wallet/send",
        Some(json!({ "address": address, "amount": amount })),
    )
    .await
}

pub async fn seed(gw: &dyn Gateway, password: &str) -> Result<String, ClientError> {
    let res: SeedResponse =
        post(gw, "/api/wallet/seed", Some(json!({ "password": password }))).await?;
    Ok(res.mnemonic)
}

/// Loads the wallet, falling back to unlock when the daemon already has it
/// loaded (e.g. it was locked rather than closed).
pub async fn load_or_unlock(gw: &dyn Gateway, password: &str) -> Result<(), ClientError> {
    let body = json!({ "password": password });
    match post_unit(gw, "/api/wallet/load", Some(body.clone())).await {
        Ok(()) => Ok(()),
        Err(ClientError::ActionFailed(msg))
            if msg.to_lowercase().contains("wallet already loaded") =>
        {
            post_unit(gw, "/api/wallet/unlock", Some(body)).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockGateway;

    #[tokio::test]
    async fn history_defaults_to_empty() {
        let gw = MockGateway::new();
        gw.respond("/api/wallet/history", json!({}));
        assert!(history(&gw).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_transport() {
        let gw = MockGateway::new();
        gw.respond("/api/status", json!({ "chain_height": "tall" }));
        assert!(matches!(chain_status(&gw).await, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn load_falls_back_to_unlock() {
        let gw = MockGateway::new();
        gw.fail(
            "/api/wallet/load",
            ClientError::ActionFailed("Wallet already loaded".into()),
        );
        gw.respond("/api/wallet/unlock", json!({ "ok": true }));
        load_or_unlock(&gw, "pw").await.unwrap();
        assert_eq!(gw.calls_to("/api/wallet/unlock"), 1);
    }

    #[tokio::test]
    async fn load_propagates_other_errors() {
        let gw = MockGateway::new();
        gw.fail("/api/wallet/load", ClientError::ActionFailed("incorrect password".into()));
        let err = load_or_unlock(&gw, "pw").await.unwrap_err();
        assert_eq!(err, ClientError::ActionFailed("incorrect password".into()));
        assert_eq!(gw.calls_to("/api/wallet/unlock"), 0);
    }

    #[tokio::test]
    async fn send_posts_amount_in_atomic_units() {
        let gw = MockGateway::new();
        gw.respond("/api/wallet/send", json!({ "txid": "f00d", "fee": 1000 }));
        let res = send(&gw, "addr", 150_000_000).await.unwrap();
        assert_eq!(res.txid, "f00d");
        let body = gw.last_body("/api/wallet/send").unwrap();
        assert_eq!(body["amount"], 150_000_000);
        assert_eq!(body["address"], "addr");
    }
}
