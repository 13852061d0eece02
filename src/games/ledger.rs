//! Ledger collaborator
//!
//! Balances live outside the round engine. Bets and the bank's cover move
//! into a per-round escrow account as they are committed, and settlement
//! drains that escrow in one batch. Every batch is applied all-or-nothing.

use crate::errors::LedgerError;
use crate::games::types::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Move `amount` from one account to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: PlayerId,
    pub to: PlayerId,
    pub amount: u64,
}

impl Transfer {
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            amount: self.amount,
        }
    }
}

pub trait LedgerAccount: Send + Sync {
    fn balance_of(&self, account: &PlayerId) -> u64;

    /// Apply every transfer or none of them
    fn apply_transfers(&self, transfers: &[Transfer]) -> Result<(), LedgerError>;
}

/// Process-local ledger for simulations and tests
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<PlayerId, u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds to an account, opening it if needed
    pub fn credit(&self, account: &PlayerId, amount: u64) -> Result<(), LedgerError> {
        let mut balances = self.lock();
        let balance = balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                account: account.clone(),
            })?;
        Ok(())
    }

    pub fn total_supply(&self) -> u64 {
        self.lock().values().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, u64>> {
        self.balances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerAccount for InMemoryLedger {
    fn balance_of(&self, account: &PlayerId) -> u64 {
        self.lock().get(account).copied().unwrap_or(0)
    }

    fn apply_transfers(&self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        let mut balances = self.lock();

        // Net debits and credits per account so batch order never matters
        let mut moves: BTreeMap<&PlayerId, (u128, u128)> = BTreeMap::new();
        for transfer in transfers {
            moves.entry(&transfer.from).or_default().0 += u128::from(transfer.amount);
            moves.entry(&transfer.to).or_default().1 += u128::from(transfer.amount);
        }

        let mut updated = Vec::with_capacity(moves.len());
        for (account, (debit, credit)) in moves {
            let balance = balances.get(account).copied().unwrap_or(0);
            let available = u128::from(balance) + credit;
            if available < debit {
                return Err(LedgerError::InsufficientFunds {
                    account: account.clone(),
                    balance,
                    required: u64::try_from(debit - credit).unwrap_or(u64::MAX),
                });
            }
            let next = u64::try_from(available - debit).map_err(|_| LedgerError::BalanceOverflow {
                account: account.clone(),
            })?;
            updated.push((account.clone(), next));
        }

        balances.extend(updated);
        Ok(())
    }
}
