//! JSON snapshot of the ledger
//!
//! The create and resolve runs are separate processes; they share ledger
//! state through this file. Writes go to a temp file and are renamed into
//! place so a crashed run never leaves a half-written snapshot.
//!
//! Writers go through `MarketLedger::update_file`, which holds an exclusive
//! lock on `<ledger>.lock` from load to save. A writer therefore always
//! mutates the latest file and never overwrites another run's markets.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::settlement;
use super::store::{MarketLedger, MarketSlot};
use super::transfer::TokenTransfer;
use crate::types::{Amount, Bet, Market};

/// Current snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable ledger contents
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub resolver: String,
    pub markets: Vec<Market>,
    #[serde(default)]
    pub bets: Vec<Bet>,
}

impl MarketLedger {
    /// Copy of the full ledger
    pub fn snapshot(&self) -> LedgerSnapshot {
        let slots = self.export_slots();
        let mut markets = Vec::with_capacity(slots.len());
        let mut bets = Vec::new();
        for slot in slots {
            markets.push(slot.market);
            bets.extend(slot.bets);
        }
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            resolver: self.resolver().to_string(),
            markets,
            bets,
        }
    }

    /// Rebuild a ledger, re-checking every invariant
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        transfer: Arc<dyn TokenTransfer>,
    ) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!("Unsupported snapshot version {}", snapshot.version);
        }

        let mut slots: Vec<MarketSlot> = Vec::with_capacity(snapshot.markets.len());
        for (index, market) in snapshot.markets.into_iter().enumerate() {
            if market.id != index as u64 {
                anyhow::bail!(
                    "Market ids are not dense: found #{} at position {}",
                    market.id,
                    index
                );
            }
            if market.option_pools.len() != market.options.len() || market.options.len() < 2 {
                anyhow::bail!("Market #{}: option pools do not match options", market.id);
            }
            if !market.pools_consistent() {
                anyhow::bail!("Market #{}: total pool does not match option pools", market.id);
            }
            check_settlement(&market)?;
            slots.push(MarketSlot { market, bets: Vec::new() });
        }

        for bet in snapshot.bets {
            let slot = usize::try_from(bet.market_id)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .with_context(|| format!("Bet references unknown market #{}", bet.market_id))?;
            if bet.option_index >= slot.market.options.len() || bet.amount == 0 {
                anyhow::bail!("Market #{}: invalid bet by {}", bet.market_id, bet.user);
            }
            slot.bets.push(bet);
        }

        for slot in &slots {
            let mut staked: Vec<Amount> = vec![0; slot.market.options.len()];
            for bet in &slot.bets {
                staked[bet.option_index] = staked[bet.option_index]
                    .checked_add(bet.amount)
                    .context("Bet amounts overflow")?;
            }
            if staked != slot.market.option_pools {
                anyhow::bail!("Market #{}: bets do not add up to option pools", slot.market.id);
            }
        }

        debug!("Snapshot verified: {} markets", slots.len());
        Ok(MarketLedger::from_slots(snapshot.resolver, transfer, slots))
    }

    /// Load an existing ledger file, whoever its resolver is
    pub async fn load(path: &Path, transfer: Arc<dyn TokenTransfer>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read ledger {}", path.display()))?;
        let snapshot: LedgerSnapshot =
            serde_json::from_str(&raw).context("Failed to parse ledger snapshot")?;
        let ledger = MarketLedger::from_snapshot(snapshot, transfer)?;
        info!("Loaded ledger from {} ({} markets)", path.display(), ledger.next_market_id());
        Ok(ledger)
    }

    /// Load the ledger at `path`, or start an empty one if the file does not
    /// exist yet. Fails if the stored resolver is not `resolver`.
    pub async fn load_or_new(
        path: &Path,
        resolver: &str,
        transfer: Arc<dyn TokenTransfer>,
    ) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No ledger at {}, starting empty", path.display());
            return Ok(MarketLedger::new(resolver, transfer));
        }

        let ledger = MarketLedger::load(path, transfer).await?;
        if ledger.resolver() != resolver {
            anyhow::bail!(
                "Ledger {} belongs to resolver '{}', configured resolver is '{}'",
                path.display(),
                ledger.resolver(),
                resolver
            );
        }
        Ok(ledger)
    }

    /// Load, mutate and save the ledger at `path` under its file lock.
    /// Nothing is written if `apply` fails.
    pub async fn update_file<T, F>(
        path: &Path,
        resolver: &str,
        transfer: Arc<dyn TokenTransfer>,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&MarketLedger) -> Result<T> + Send,
        T: Send,
    {
        let _lock = LedgerFileLock::acquire(path).await?;
        let ledger = MarketLedger::load_or_new(path, resolver, transfer).await?;
        let out = apply(&ledger)?;
        ledger.save(path).await?;
        Ok(out)
    }

    /// Write the ledger to `path` atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&self.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        debug!("Ledger saved to {}", path.display());
        Ok(())
    }
}

/// Exclusive advisory lock on `<ledger>.lock`, released on drop
pub struct LedgerFileLock {
    _file: File,
    path: PathBuf,
}

impl LedgerFileLock {
    /// Block until the lock for `ledger_path` is held
    pub async fn acquire(ledger_path: &Path) -> Result<Self> {
        let path = lock_path(ledger_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let target = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&target)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .context("Lock task failed")?
        .with_context(|| format!("Failed to lock {}", path.display()))?;

        debug!("Acquired {}", path.display());
        Ok(Self { _file: file, path })
    }
}

impl Drop for LedgerFileLock {
    fn drop(&mut self) {
        debug!("Released {}", self.path.display());
    }
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = OsString::from(ledger_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn check_settlement(market: &Market) -> Result<()> {
    match (market.resolved, market.voided, market.winning_option_index, &market.settlement) {
        (false, false, None, None) => Ok(()),
        (true, true, None, None) => {
            // some outcome must have had an empty winning or losing side
            let voidable = market.option_pools.iter().any(|p| *p == 0 || *p == market.total_pool);
            if !voidable {
                anyhow::bail!("Market #{}: voided but every outcome was settleable", market.id);
            }
            Ok(())
        }
        (true, false, Some(index), Some(s))
            if s.winning_option_index == index && index < market.option_pools.len() =>
        {
            match settlement::settle(&market.option_pools, index)? {
                crate::types::Resolution::Settled(expected) if expected == *s => Ok(()),
                _ => anyhow::bail!("Market #{}: stored settlement does not match pools", market.id),
            }
        }
        _ => anyhow::bail!("Market #{}: inconsistent resolution fields", market.id),
    }
}
