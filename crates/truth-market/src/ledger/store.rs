//! Market/Bet ledger
//!
//! # Concurrency
//! - The market table is append-only; its lock is held only to assign ids or
//!   clone a slot handle.
//! - Every mutation on a market (bet, resolve, claim) runs under that
//!   market's own lock, so different markets never wait on each other.
//! - Transfers run inside the market lock and before any state change: a
//!   failed debit/credit aborts the call with the market untouched.
//!
//! # Idempotency
//! `resolved` and `claimed` are the guards: a second resolve fails with
//! `AlreadyResolved`, a second claim with `DoubleClaim`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::settlement;
use super::transfer::TokenTransfer;
use crate::error::LedgerError;
use crate::types::{
    Amount, Bet, ClaimReceipt, Market, MarketDraft, MarketId, MarketState, Resolution,
};

/// One market and the bets placed on it
#[derive(Clone, Debug)]
pub(crate) struct MarketSlot {
    pub(crate) market: Market,
    pub(crate) bets: Vec<Bet>,
}

/// Authoritative store of markets, pools and stakes
pub struct MarketLedger {
    resolver: String,
    transfer: Arc<dyn TokenTransfer>,
    slots: RwLock<Vec<Arc<Mutex<MarketSlot>>>>,
}

/// What a claim would pay, computed without side effects
struct ClaimQuote {
    payout: Amount,
    refund: bool,
    unclaimed: usize,
}

impl MarketLedger {
    /// Create an empty ledger. Only `resolver` may call `resolve_market`.
    pub fn new(resolver: impl Into<String>, transfer: Arc<dyn TokenTransfer>) -> Self {
        Self { resolver: resolver.into(), transfer, slots: RwLock::new(Vec::new()) }
    }

    pub(crate) fn from_slots(
        resolver: String,
        transfer: Arc<dyn TokenTransfer>,
        slots: Vec<MarketSlot>,
    ) -> Self {
        Self {
            resolver,
            transfer,
            slots: RwLock::new(slots.into_iter().map(|s| Arc::new(Mutex::new(s))).collect()),
        }
    }

    /// Identity allowed to resolve markets
    pub fn resolver(&self) -> &str {
        &self.resolver
    }

    /// Next id to be assigned; also the number of markets
    pub fn next_market_id(&self) -> MarketId {
        self.slots.read().len() as MarketId
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a single market
    pub fn create_market(
        &self,
        question: &str,
        options: &[String],
        duration_secs: i64,
        asof: DateTime<Utc>,
    ) -> Result<MarketId, LedgerError> {
        let draft = MarketDraft {
            question: question.to_string(),
            options: options.to_vec(),
            duration_secs,
            fixture: None,
        };
        let ids = self.create_drafts(vec![draft], asof)?;
        Ok(ids[0])
    }

    /// Create one market per index across three parallel sequences.
    /// Mismatched lengths create nothing.
    pub fn create_market_batch(
        &self,
        questions: &[String],
        options: &[Vec<String>],
        durations: &[i64],
        asof: DateTime<Utc>,
    ) -> Result<Vec<MarketId>, LedgerError> {
        if questions.len() != options.len() || questions.len() != durations.len() {
            return Err(LedgerError::MismatchedArrays {
                questions: questions.len(),
                options: options.len(),
                durations: durations.len(),
            });
        }

        let drafts = questions
            .iter()
            .zip(options)
            .zip(durations)
            .map(|((question, options), duration_secs)| MarketDraft {
                question: question.clone(),
                options: options.clone(),
                duration_secs: *duration_secs,
                fixture: None,
            })
            .collect();

        self.create_drafts(drafts, asof)
    }

    /// Validate every draft, then append them all under one table lock.
    /// Either all markets are created with consecutive ids, or none are.
    pub fn create_drafts(
        &self,
        drafts: Vec<MarketDraft>,
        asof: DateTime<Utc>,
    ) -> Result<Vec<MarketId>, LedgerError> {
        let mut prepared = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            let betting_ends_at = validate_draft(index, &draft, asof)?;
            prepared.push((draft, betting_ends_at));
        }

        let mut slots = self.slots.write();
        let first_id = slots.len() as MarketId;
        let mut ids = Vec::with_capacity(prepared.len());

        for (offset, (draft, betting_ends_at)) in prepared.into_iter().enumerate() {
            let id = first_id + offset as MarketId;
            let market = Market {
                id,
                option_pools: vec![0; draft.options.len()],
                question: draft.question,
                options: draft.options,
                created_at: asof,
                betting_ends_at,
                resolved: false,
                voided: false,
                winning_option_index: None,
                total_pool: 0,
                settlement: None,
                fixture: draft.fixture,
            };
            info!("Market #{} created: \"{}\" (ends {})", id, market.question, betting_ends_at);
            slots.push(Arc::new(Mutex::new(MarketSlot { market, bets: Vec::new() })));
            ids.push(id);
        }

        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Betting
    // ------------------------------------------------------------------

    /// Stake `amount` on `option_index`. The user is debited first; the
    /// pools only change if the debit succeeds.
    pub fn place_bet(
        &self,
        market_id: MarketId,
        user: &str,
        option_index: usize,
        amount: Amount,
        asof: DateTime<Utc>,
    ) -> Result<Bet, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let slot = self.slot(market_id)?;
        let mut slot = slot.lock();
        let market = &slot.market;

        if market.resolved {
            return Err(LedgerError::BettingClosed { market_id, reason: "market resolved" });
        }
        if asof >= market.betting_ends_at {
            return Err(LedgerError::BettingClosed { market_id, reason: "betting window ended" });
        }
        if option_index >= market.options.len() {
            return Err(LedgerError::InvalidOptionIndex {
                market_id,
                index: option_index,
                options: market.options.len(),
            });
        }

        let option_pool = market.option_pools[option_index]
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total_pool =
            market.total_pool.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;

        self.transfer.debit(user, amount)?;

        slot.market.option_pools[option_index] = option_pool;
        slot.market.total_pool = total_pool;

        let bet = Bet {
            market_id,
            user: user.to_string(),
            option_index,
            amount,
            placed_at: asof,
            claimed: false,
        };
        slot.bets.push(bet.clone());

        info!(
            "Bet on market #{}: {} staked {} on option {} (pool {})",
            market_id, user, amount, option_index, total_pool
        );
        Ok(bet)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Single terminal write: settle on `winning_option_index` or void.
    /// No funds move here.
    pub fn resolve_market(
        &self,
        caller: &str,
        market_id: MarketId,
        winning_option_index: usize,
    ) -> Result<Resolution, LedgerError> {
        if caller != self.resolver {
            return Err(LedgerError::Unauthorized { caller: caller.to_string() });
        }

        let slot = self.slot(market_id)?;
        let mut slot = slot.lock();
        let market = &mut slot.market;

        if market.resolved {
            return Err(LedgerError::AlreadyResolved(market_id));
        }
        if winning_option_index >= market.options.len() {
            return Err(LedgerError::InvalidOptionIndex {
                market_id,
                index: winning_option_index,
                options: market.options.len(),
            });
        }

        let resolution = settlement::settle(&market.option_pools, winning_option_index)?;
        match resolution {
            Resolution::Voided => {
                market.voided = true;
                market.resolved = true;
                info!(
                    "Market #{} voided (winning pool {}, total {})",
                    market_id, market.option_pools[winning_option_index], market.total_pool
                );
            }
            Resolution::Settled(s) => {
                market.winning_option_index = Some(winning_option_index);
                market.settlement = Some(s);
                market.voided = false;
                market.resolved = true;
                info!(
                    "Market #{} resolved: option {} wins, fee {}{}, net pot {}",
                    market_id,
                    winning_option_index,
                    s.fee,
                    if s.fee_waived { " (waived)" } else { "" },
                    s.net_pot
                );
            }
        }

        Ok(resolution)
    }

    /// Pay out everything `user` is owed on a resolved market and mark all
    /// of their bets claimed. A losing position claims successfully with
    /// payout 0 and no transfer.
    pub fn claim(&self, market_id: MarketId, user: &str) -> Result<ClaimReceipt, LedgerError> {
        let slot = self.slot(market_id)?;
        let mut slot = slot.lock();

        let quote = quote(&slot, user)?;

        if quote.payout > 0 {
            self.transfer.credit(user, quote.payout)?;
        }

        for bet in slot.bets.iter_mut().filter(|b| b.user == user && !b.claimed) {
            bet.claimed = true;
        }

        info!(
            "Claim on market #{}: {} received {}{}",
            market_id,
            user,
            quote.payout,
            if quote.refund { " (refund)" } else { "" }
        );

        Ok(ClaimReceipt {
            market_id,
            user: user.to_string(),
            payout: quote.payout,
            refund: quote.refund,
            bets_claimed: quote.unclaimed,
        })
    }

    /// What `claim` would pay right now, without changing anything
    pub fn quote_claim(&self, market_id: MarketId, user: &str) -> Result<Amount, LedgerError> {
        let slot = self.slot(market_id)?;
        let slot = slot.lock();
        Ok(quote(&slot, user)?.payout)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Copy of a market record
    pub fn market(&self, market_id: MarketId) -> Option<Market> {
        self.slot(market_id).ok().map(|slot| slot.lock().market.clone())
    }

    /// Copies of all markets in id order
    pub fn markets(&self) -> Vec<Market> {
        self.handles().iter().map(|slot| slot.lock().market.clone()).collect()
    }

    pub fn market_state(&self, market_id: MarketId, asof: DateTime<Utc>) -> Option<MarketState> {
        self.market(market_id).map(|m| m.state(asof))
    }

    /// All of a user's bets on a market, claimed or not
    pub fn user_bets(&self, market_id: MarketId, user: &str) -> Vec<Bet> {
        match self.slot(market_id) {
            Ok(slot) => slot.lock().bets.iter().filter(|b| b.user == user).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Consistent copy of every slot, in id order
    pub(crate) fn export_slots(&self) -> Vec<MarketSlot> {
        self.handles().iter().map(|slot| slot.lock().clone()).collect()
    }

    fn handles(&self) -> Vec<Arc<Mutex<MarketSlot>>> {
        self.slots.read().clone()
    }

    fn slot(&self, market_id: MarketId) -> Result<Arc<Mutex<MarketSlot>>, LedgerError> {
        let slots = self.slots.read();
        usize::try_from(market_id)
            .ok()
            .and_then(|i| slots.get(i))
            .cloned()
            .ok_or(LedgerError::MarketNotFound(market_id))
    }
}

fn validate_draft(
    index: usize,
    draft: &MarketDraft,
    asof: DateTime<Utc>,
) -> Result<DateTime<Utc>, LedgerError> {
    if draft.question.trim().is_empty() {
        return Err(LedgerError::EmptyQuestion { index });
    }
    if draft.options.len() < 2 {
        return Err(LedgerError::TooFewOptions { index, got: draft.options.len() });
    }
    for (i, label) in draft.options.iter().enumerate() {
        if label.trim().is_empty() || draft.options[..i].contains(label) {
            return Err(LedgerError::InvalidOptionLabel { index, label: label.clone() });
        }
    }
    if draft.duration_secs <= 0 {
        return Err(LedgerError::InvalidDuration { index, secs: draft.duration_secs });
    }

    Duration::try_seconds(draft.duration_secs)
        .and_then(|d| asof.checked_add_signed(d))
        .ok_or(LedgerError::InvalidDuration { index, secs: draft.duration_secs })
}

fn quote(slot: &MarketSlot, user: &str) -> Result<ClaimQuote, LedgerError> {
    let market = &slot.market;
    if !market.resolved {
        return Err(LedgerError::NotResolved(market.id));
    }

    let mut has_bets = false;
    let mut unclaimed = 0usize;
    let mut principal: Amount = 0;
    let mut winning_stake: Amount = 0;

    for bet in slot.bets.iter().filter(|b| b.user == user) {
        has_bets = true;
        if bet.claimed {
            continue;
        }
        unclaimed += 1;
        principal = principal.checked_add(bet.amount).ok_or(LedgerError::ArithmeticOverflow)?;
        if Some(bet.option_index) == market.winning_option_index {
            winning_stake =
                winning_stake.checked_add(bet.amount).ok_or(LedgerError::ArithmeticOverflow)?;
        }
    }

    if !has_bets {
        return Err(LedgerError::NothingToClaim { market_id: market.id, user: user.to_string() });
    }
    if unclaimed == 0 {
        return Err(LedgerError::DoubleClaim { market_id: market.id, user: user.to_string() });
    }

    if market.voided {
        return Ok(ClaimQuote { payout: principal, refund: true, unclaimed });
    }

    let settlement = market.settlement.as_ref().ok_or(LedgerError::NotResolved(market.id))?;
    let payout = settlement::winner_payout(winning_stake, settlement)?;
    debug!(
        "Quote market #{} for {}: stake {} of {} -> {}",
        market.id, user, winning_stake, settlement.winning_pool, payout
    );

    Ok(ClaimQuote { payout, refund: false, unclaimed })
}
