//! # Transfer Hand-off
//!
//! The keystore does not build or submit extrinsics. It hands a validated
//! sender keypair to a [`TransferExecutor`] (the chain client) and records
//! the balances the executor observed after confirmation.
//!
//! Checks that happen before the executor is called, cheapest first:
//!
//! 1. amount is non-zero;
//! 2. destination decodes as SS58 under the configured network prefix;
//! 3. sender key material passes reconstruction;
//! 4. sender and destination differ.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::BorgKeypair;
use crate::storage::balance::Currency;

/// Failures reported by (or before) a transfer executor.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The amount is zero.
    #[error("amount must be > 0")]
    ZeroAmount,

    /// Sender and destination are the same address.
    #[error("sender and destination must differ: both are {address}")]
    SelfTransfer { address: String },

    /// The destination is not a valid address on this network.
    #[error("invalid destination {address}: {reason}")]
    InvalidDestination { address: String, reason: String },

    /// The chain reported insufficient funds.
    #[error("insufficient {currency}: available {available}, requested {requested}")]
    InsufficientFunds {
        currency: Currency,
        available: u64,
        requested: u64,
    },

    /// Submitted but not confirmed (dropped, timed out, or failed in block).
    #[error("transfer not confirmed: {0}")]
    Unconfirmed(String),

    /// The chain client could not reach its node.
    #[error("chain client error: {0}")]
    Client(String),
}

/// What to transfer.
#[derive(Debug)]
pub struct TransferRequest<'a> {
    pub sender: &'a BorgKeypair,
    pub destination: &'a str,
    pub amount: u64,
    pub currency: Currency,
}

/// Confirmation from the chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    /// Sender balance observed after confirmation, in smallest units.
    pub sender_balance: u64,
    /// Destination balance observed after confirmation, in smallest units.
    pub destination_balance: u64,
}

/// Executes and confirms transfers on chain.
///
/// Implementations block until the transfer is confirmed or has definitely
/// failed. Timeouts are the implementation's business.
pub trait TransferExecutor: Send + Sync {
    fn execute(&self, request: &TransferRequest<'_>) -> Result<TransferReceipt, TransferError>;
}

impl<T: TransferExecutor + ?Sized> TransferExecutor for std::sync::Arc<T> {
    fn execute(&self, request: &TransferRequest<'_>) -> Result<TransferReceipt, TransferError> {
        (**self).execute(request)
    }
}

impl<T: TransferExecutor + ?Sized> TransferExecutor for &T {
    fn execute(&self, request: &TransferRequest<'_>) -> Result<TransferReceipt, TransferError> {
        (**self).execute(request)
    }
}

/// Summary returned by `BorgManager::transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub from_address: String,
    pub to_address: String,
    pub currency: Currency,
    pub amount: u64,
    pub receipt: TransferReceipt,
}
