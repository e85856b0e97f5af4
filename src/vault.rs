//! Margin vault: per-trader free and locked collateral.
//!
//! Collateral is deposited into the free balance. Opening a position locks part of
//! it, closing unlocks the position's margin and credits the realized PnL. The core
//! engine never calls the vault directly; it goes through the position ledger.

use crate::types::{AccountId, QuoteAmount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAccount {
    pub id: AccountId,
    pub free: QuoteAmount,
    pub locked: QuoteAmount,
    pub total_deposited: QuoteAmount,
    pub total_withdrawn: QuoteAmount,
    /// Signed, quote raw units.
    pub realized_pnl: i128,
    pub fees_paid: QuoteAmount,
    pub created_at: Timestamp,
}

impl VaultAccount {
    pub fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            free: QuoteAmount::zero(),
            locked: QuoteAmount::zero(),
            total_deposited: QuoteAmount::zero(),
            total_withdrawn: QuoteAmount::zero(),
            realized_pnl: 0,
            fees_paid: QuoteAmount::zero(),
            created_at: timestamp,
        }
    }

    pub fn equity(&self) -> QuoteAmount {
        self.free.checked_add(self.locked).unwrap_or(self.free)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarginVault {
    accounts: HashMap<AccountId, VaultAccount>,
    fee_pool: QuoteAmount,
}

impl MarginVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, owner: AccountId) -> Option<&VaultAccount> {
        self.accounts.get(&owner)
    }

    pub fn fee_pool(&self) -> QuoteAmount {
        self.fee_pool
    }

    pub fn deposit(&mut self, owner: AccountId, amount: QuoteAmount, timestamp: Timestamp) -> Result<(), VaultError> {
        let account = self
            .accounts
            .entry(owner)
            .or_insert_with(|| VaultAccount::new(owner, timestamp));
        account.free = account.free.checked_add(amount).ok_or(VaultError::Overflow)?;
        account.total_deposited = account
            .total_deposited
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    pub fn withdraw(&mut self, owner: AccountId, amount: QuoteAmount) -> Result<(), VaultError> {
        let account = self.account_mut(owner)?;
        account.free = debit(account.free, amount)?;
        account.total_withdrawn = account
            .total_withdrawn
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    // free -> locked
    pub fn lock(&mut self, owner: AccountId, amount: QuoteAmount) -> Result<(), VaultError> {
        let account = self.account_mut(owner)?;
        let free = debit(account.free, amount)?;
        let locked = account.locked.checked_add(amount).ok_or(VaultError::Overflow)?;
        account.free = free;
        account.locked = locked;
        Ok(())
    }

    // locked -> free
    pub fn unlock(&mut self, owner: AccountId, amount: QuoteAmount) -> Result<(), VaultError> {
        let account = self.account_mut(owner)?;
        let locked = account
            .locked
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientLocked {
                requested: amount,
                locked: account.locked,
            })?;
        let free = account.free.checked_add(amount).ok_or(VaultError::Overflow)?;
        account.free = free;
        account.locked = locked;
        Ok(())
    }

    /// Release a closed position's margin with its PnL applied. Losses beyond the
    /// margin are absorbed; the trader never ends up owing the vault.
    pub fn settle(&mut self, owner: AccountId, margin: QuoteAmount, pnl: i128) -> Result<QuoteAmount, VaultError> {
        let account = self.account_mut(owner)?;
        let locked = account
            .locked
            .checked_sub(margin)
            .ok_or(VaultError::InsufficientLocked {
                requested: margin,
                locked: account.locked,
            })?;

        let magnitude = QuoteAmount::new(pnl.unsigned_abs().into());
        let payout = if pnl >= 0 {
            margin.checked_add(magnitude).ok_or(VaultError::Overflow)?
        } else {
            margin.saturating_sub(magnitude)
        };

        account.locked = locked;
        account.free = account.free.checked_add(payout).ok_or(VaultError::Overflow)?;
        account.realized_pnl = account.realized_pnl.saturating_add(pnl);
        Ok(payout)
    }

    pub fn charge_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), VaultError> {
        let account = self.account_mut(owner)?;
        let free = debit(account.free, fee)?;
        let fees_paid = account.fees_paid.checked_add(fee).ok_or(VaultError::Overflow)?;
        let pool = self.fee_pool.checked_add(fee).ok_or(VaultError::Overflow)?;
        let account = self.account_mut(owner)?;
        account.free = free;
        account.fees_paid = fees_paid;
        self.fee_pool = pool;
        Ok(())
    }

    pub fn refund_fee(&mut self, owner: AccountId, fee: QuoteAmount) -> Result<(), VaultError> {
        let pool = self.fee_pool.checked_sub(fee).ok_or(VaultError::Overflow)?;
        let account = self.account_mut(owner)?;
        account.free = account.free.checked_add(fee).ok_or(VaultError::Overflow)?;
        account.fees_paid = account.fees_paid.saturating_sub(fee);
        self.fee_pool = pool;
        Ok(())
    }

    fn account_mut(&mut self, owner: AccountId) -> Result<&mut VaultAccount, VaultError> {
        self.accounts
            .get_mut(&owner)
            .ok_or(VaultError::UnknownAccount(owner))
    }
}

fn debit(balance: QuoteAmount, amount: QuoteAmount) -> Result<QuoteAmount, VaultError> {
    balance
        .checked_sub(amount)
        .ok_or(VaultError::InsufficientBalance {
            requested: amount,
            available: balance,
        })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Unknown vault account {0:?}")]
    UnknownAccount(AccountId),

    #[error("Insufficient free balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: QuoteAmount,
        available: QuoteAmount,
    },

    #[error("Insufficient locked margin: requested {requested}, locked {locked}")]
    InsufficientLocked {
        requested: QuoteAmount,
        locked: QuoteAmount,
    },

    #[error("Vault balance overflow")]
    Overflow,
}
