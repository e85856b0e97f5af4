// 7.0: position ledger. the engine owns prices and reserves, the ledger owns positions
// and collateral. anything implementing PositionLedger can sit behind the engine.
// 7.1 is the in-memory ledger backed by the margin vault.

use crate::math;
use crate::types::{AccountId, MarketId, PositionId, Price, QuoteAmount, SignedSize, Timestamp};
use crate::vault::{MarginVault, VaultError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: PositionId,
    pub owner: AccountId,
    pub market_id: MarketId,
    pub size: SignedSize,
    pub entry_price: Price,
    pub margin: QuoteAmount,
    pub opened_at: Timestamp,
}

/// What the ledger hands back when a position is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub record: PositionRecord,
    pub exit_price: Price,
    /// Quote raw units, signed.
    pub realized_pnl: i128,
    /// Collateral returned to the owner's free balance.
    pub released: QuoteAmount,
}

pub trait PositionLedger {
    /// Record a new position and lock `margin` from the owner's free balance.
    fn open_position_for(
        &mut self,
        owner: AccountId,
        market_id: MarketId,
        size: SignedSize,
        entry_price: Price,
        margin: QuoteAmount,
        timestamp: Timestamp,
    ) -> Result<PositionId, LedgerError>;

    fn get_position(&self, position_id: PositionId) -> Result<PositionRecord, LedgerError>;

    fn close_position(&mut self, position_id: PositionId, exit_price: Price) -> Result<ClosedPosition, LedgerError>;

    /// Returns the position's new margin.
    fn add_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError>;

    fn remove_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError>;

    /// Take an opening fee from the trader's free balance.
    fn collect_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), LedgerError>;

    fn refund_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Position {0:?} has zero size")]
    EmptyPosition(PositionId),

    #[error("Position {position_id:?} holds {margin} margin, cannot remove {requested}")]
    InsufficientPositionMargin {
        position_id: PositionId,
        margin: QuoteAmount,
        requested: QuoteAmount,
    },

    #[error("Ledger arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Vault(#[from] VaultError),
}

// 7.1: reference ledger. positions in a map, collateral in the vault
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    positions: HashMap<PositionId, PositionRecord>,
    vault: MarginVault,
    next_position_id: u64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self {
            positions: HashMap::new(),
            vault: MarginVault::new(),
            next_position_id: 1,
        }
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, owner: AccountId, amount: QuoteAmount, timestamp: Timestamp) -> Result<(), LedgerError> {
        self.vault.deposit(owner, amount, timestamp)?;
        Ok(())
    }

    pub fn vault(&self) -> &MarginVault {
        &self.vault
    }

    pub fn positions_of(&self, owner: AccountId) -> Vec<&PositionRecord> {
        let mut positions: Vec<&PositionRecord> = self
            .positions
            .values()
            .filter(|p| p.owner == owner)
            .collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }
}

impl PositionLedger for InMemoryLedger {
    fn open_position_for(
        &mut self,
        owner: AccountId,
        market_id: MarketId,
        size: SignedSize,
        entry_price: Price,
        margin: QuoteAmount,
        timestamp: Timestamp,
    ) -> Result<PositionId, LedgerError> {
        let id = PositionId(self.next_position_id);
        if size.is_zero() {
            return Err(LedgerError::EmptyPosition(id));
        }
        self.vault.lock(owner, margin)?;
        self.next_position_id += 1;
        self.positions.insert(
            id,
            PositionRecord {
                id,
                owner,
                market_id,
                size,
                entry_price,
                margin,
                opened_at: timestamp,
            },
        );
        Ok(id)
    }

    fn get_position(&self, position_id: PositionId) -> Result<PositionRecord, LedgerError> {
        self.positions
            .get(&position_id)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(position_id))
    }

    fn close_position(&mut self, position_id: PositionId, exit_price: Price) -> Result<ClosedPosition, LedgerError> {
        let record = self.get_position(position_id)?;
        let realized_pnl = math::pnl(record.size, record.entry_price, exit_price);
        let released = self.vault.settle(record.owner, record.margin, realized_pnl)?;
        self.positions.remove(&position_id);
        Ok(ClosedPosition {
            record,
            exit_price,
            realized_pnl,
            released,
        })
    }

    fn add_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError> {
        let record = self.get_position(position_id)?;
        let margin = record.margin.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.vault.lock(record.owner, amount)?;
        if let Some(position) = self.positions.get_mut(&position_id) {
            position.margin = margin;
        }
        Ok(margin)
    }

    fn remove_margin(&mut self, position_id: PositionId, amount: QuoteAmount) -> Result<QuoteAmount, LedgerError> {
        let record = self.get_position(position_id)?;
        let margin = record
            .margin
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientPositionMargin {
                position_id,
                margin: record.margin,
                requested: amount,
            })?;
        self.vault.unlock(record.owner, amount)?;
        if let Some(position) = self.positions.get_mut(&position_id) {
            position.margin = margin;
        }
        Ok(margin)
    }

    fn collect_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), LedgerError> {
        self.vault.charge_fee(owner, fee)?;
        Ok(())
    }

    fn refund_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), LedgerError> {
        self.vault.refund_fee(owner, fee)?;
        Ok(())
    }
}
