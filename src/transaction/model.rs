use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wallet::{digest, sign_digest_hex, verify_signature_hex};

/// Sender sentinel carried by reward transactions.
pub const COINBASE_SENDER: &str = "COINBASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Regular,
    Coinbase,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Regular => "REGULAR",
            TxKind::Coinbase => "COINBASE",
        }
    }
}

/// A signed value transfer from `sender` to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Unix timestamp in milliseconds (UTC)
    pub timestamp: i64,
    /// Hex compressed public key of the payer, or `COINBASE`
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub fee: u64,
    pub kind: TxKind,
    /// Hex-encoded DER ECDSA signature over `sighash()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Transaction {
    /// Build an unsigned regular transaction with a fresh id and timestamp.
    pub fn new(sender: String, recipient: String, amount: u64, fee: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            sender,
            recipient,
            amount,
            fee,
            kind: TxKind::Regular,
            signature: None,
        }
    }

    /// Reward transaction minted by the coordinator; never signed.
    pub fn coinbase(recipient: String, amount: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            sender: COINBASE_SENDER.to_string(),
            recipient,
            amount,
            fee: 0,
            kind: TxKind::Coinbase,
            signature: None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    /// Amount plus fee, i.e. what the sender is debited.
    pub fn total_debit(&self) -> u128 {
        self.amount as u128 + self.fee as u128
    }

    /// Canonical signing payload: every field except the signature, each
    /// length-prefixed so no two field sets share an encoding.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        for field in [
            self.id.as_str(),
            &self.timestamp.to_string(),
            self.sender.as_str(),
            self.recipient.as_str(),
            &self.amount.to_string(),
            &self.fee.to_string(),
            self.kind.as_str(),
        ] {
            push_field(&mut out, field);
        }
        out
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> [u8; 32] {
        digest(&self.signing_payload())
    }

    /// Full content including the signature; this is what a block commits to.
    pub fn content_bytes(&self) -> Vec<u8> {
        let mut out = self.signing_payload();
        push_field(&mut out, self.signature.as_deref().unwrap_or(""));
        out
    }

    /// Sign with the sender's hex private key. Coinbase transactions are left untouched.
    pub fn sign(&mut self, secret_hex: &str) -> Result<(), &'static str> {
        if self.is_coinbase() {
            return Ok(());
        }
        self.signature = Some(sign_digest_hex(secret_hex, self.sighash())?);
        Ok(())
    }

    /// Signature check. Coinbase is always valid; anything malformed is
    /// simply invalid.
    pub fn is_valid(&self) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.sender.is_empty() || self.sender == COINBASE_SENDER {
            return false;
        }
        match self.signature.as_deref() {
            Some(sig) if !sig.is_empty() => {
                verify_signature_hex(&self.sender, sig, self.sighash()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

fn push_field(out: &mut Vec<u8>, field: &str) {
    out.extend_from_slice(&(field.len() as u64).to_be_bytes());
    out.extend_from_slice(field.as_bytes());
}
