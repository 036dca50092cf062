//! Wire types exchanged with the daemon's HTTP API.
use serde::{Deserialize, Serialize};

/// Node/chain status from `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChainStatus {
    #[serde(default)]
    pub chain_height: u64,
    #[serde(default)]
    pub peers: u32,
    #[serde(default)]
    pub mempool_size: u64,
    #[serde(default)]
    pub syncing: bool,
}

/// Wallet balance in atomic units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub spendable: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub total: u64,
}

/// A wallet-visible output. Immutable once observed: a given `id` + `index`
/// is never spent and then unspent again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "txid")]
    pub id: String,
    #[serde(rename = "output_index", default)]
    pub index: u32,
    /// Atomic units.
    pub amount: u64,
    pub block_height: u64,
    #[serde(default)]
    pub spent: bool,
    #[serde(default)]
    pub spent_height: Option<u64>,
    #[serde(default)]
    pub is_coinbase: bool,
}

impl Output {
    pub fn kind_label(&self) -> &'static str {
        if self.is_coinbase {
            "mining reward"
        } else if self.spent {
            "sent"
        } else {
            "received"
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub outputs: Option<Vec<Output>>,
}

/// Block metadata from `GET /api/block/{height}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub difficulty: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MempoolStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub min_fee: u64,
    #[serde(default)]
    pub avg_fee: f64,
    #[serde(default)]
    pub max_fee: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MiningStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub hashrate: f64,
    #[serde(default)]
    pub blocks_found: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendResult {
    pub txid: String,
    #[serde(default)]
    pub fee: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedResponse {
    pub mnemonic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

/// Connected peers as reported by `/api/peers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PeerList {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BannedPeer {
    pub peer_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BannedList {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub banned: Vec<BannedPeer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_decodes_wire_field_names() {
        let o: Output = serde_json::from_str(
            r#"{"txid":"ab","output_index":2,"amount":500,"block_height":10,
                "spent":true,"spent_height":12,"is_coinbase":false}"#,
        )
        .unwrap();
        assert_eq!(o.id, "ab");
        assert_eq!(o.index, 2);
        assert_eq!(o.spent_height, Some(12));
        assert_eq!(o.kind_label(), "sent");
    }

    #[test]
    fn peer_lists_tolerate_missing_fields() {
        let peers: PeerList = serde_json::from_str(r#"{"count":0}"#).unwrap();
        assert!(peers.peers.is_empty());
        let banned: BannedList =
            serde_json::from_str(r#"{"count":1,"banned":[{"peer_id":"12D3KooW"}]}"#).unwrap();
        assert_eq!(banned.banned[0].peer_id, "12D3KooW");
        assert_eq!(banned.banned[0].reason, "");
    }

    #[test]
    fn output_optional_fields_default() {
        let o: Output =
            serde_json::from_str(r#"{"txid":"cd","amount":1,"block_height":3}"#).unwrap();
        assert!(!o.spent);
        assert!(o.spent_height.is_none());
        assert_eq!(o.kind_label(), "received");
    }

    #[test]
    fn history_without_outputs_is_none() {
        let h: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(h.outputs.is_none());
        let h: HistoryResponse = serde_json::from_str(r#"{"outputs":null}"#).unwrap();
        assert!(h.outputs.is_none());
    }

    #[test]
    fn block_difficulty_accepts_integers() {
        let b: BlockInfo = serde_json::from_str(r#"{"height":7,"difficulty":1200}"#).unwrap();
        assert_eq!(b.difficulty, 1200.0);
    }

    #[test]
    fn coinbase_label_wins() {
        let o = Output {
            id: "x".into(),
            index: 0,
            amount: 1,
            block_height: 1,
            spent: true,
            spent_height: None,
            is_coinbase: true,
        };
        assert_eq!(o.kind_label(), "mining reward");
    }
}
