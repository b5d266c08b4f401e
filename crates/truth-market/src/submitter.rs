//! Batch Submitter
//!
//! One creation batch per run, submitted with an explicit gas limit:
//! `limit = base + per_market * n`, capped per submission. The batch's
//! estimated cost must fit under the limit; otherwise nothing is written.
//! Success is only reported once every returned id reads back as the
//! submitted market.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::SubmissionError;
use crate::ledger::MarketLedger;
use crate::types::{MarketDraft, MarketId};

/// Gas pricing and limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Fixed part of every limit
    pub base_limit: u64,
    /// Limit added per market in the batch
    pub per_market_limit: u64,
    /// No single submission may request more than this
    pub max_limit: u64,
    /// Cost of the call itself
    pub tx_cost: u64,
    /// Storage cost of one market record
    pub market_cost: u64,
    /// Extra cost per option label
    pub option_cost: u64,
    /// Extra cost per byte of question and labels
    pub byte_cost: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base_limit: 150_000,
            per_market_limit: 300_000,
            max_limit: 5_000_000,
            tx_cost: 21_000,
            market_cost: 180_000,
            option_cost: 20_000,
            byte_cost: 50,
        }
    }
}

impl GasSchedule {
    /// Limit requested for a batch of `markets`
    pub fn limit_for(&self, markets: usize) -> u64 {
        self.base_limit.saturating_add(self.per_market_limit.saturating_mul(markets as u64))
    }

    /// Estimated cost of writing `drafts`
    pub fn estimate(&self, drafts: &[MarketDraft]) -> u64 {
        drafts.iter().fold(self.tx_cost, |acc, draft| {
            let bytes = draft.question.len() + draft.options.iter().map(String::len).sum::<usize>();
            acc.saturating_add(self.market_cost)
                .saturating_add(self.option_cost.saturating_mul(draft.options.len() as u64))
                .saturating_add(self.byte_cost.saturating_mul(bytes as u64))
        })
    }
}

/// Confirmation of a submitted batch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReceipt {
    pub market_ids: Vec<MarketId>,
    pub gas_limit: u64,
    pub gas_used: u64,
}

/// Submits creation batches to the ledger
#[derive(Clone, Debug, Default)]
pub struct BatchSubmitter {
    schedule: GasSchedule,
}

impl BatchSubmitter {
    pub fn new(schedule: GasSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Submit all drafts as one all-or-nothing batch
    pub fn submit(
        &self,
        ledger: &MarketLedger,
        drafts: Vec<MarketDraft>,
        asof: DateTime<Utc>,
    ) -> Result<BatchReceipt, SubmissionError> {
        if drafts.is_empty() {
            info!("Nothing to submit");
            return Ok(BatchReceipt { market_ids: Vec::new(), gas_limit: 0, gas_used: 0 });
        }

        let gas_limit = self.schedule.limit_for(drafts.len());
        if gas_limit > self.schedule.max_limit {
            error!("Gas limit {} above cap {}", gas_limit, self.schedule.max_limit);
            return Err(SubmissionError::LimitAboveCap {
                limit: gas_limit,
                cap: self.schedule.max_limit,
            });
        }

        let gas_used = self.schedule.estimate(&drafts);
        if gas_used > gas_limit {
            error!("Batch of {} markets needs {} gas, limit {}", drafts.len(), gas_used, gas_limit);
            return Err(SubmissionError::OutOfGas { required: gas_used, limit: gas_limit });
        }

        info!(
            "Submitting {} markets (gas limit {}, estimated {})",
            drafts.len(),
            gas_limit,
            gas_used
        );

        let questions: Vec<String> = drafts.iter().map(|d| d.question.clone()).collect();
        let market_ids = ledger.create_drafts(drafts, asof).map_err(|e| {
            error!("Batch rejected: {}", e);
            SubmissionError::Rejected(e)
        })?;

        debug!("Waiting for confirmation of {:?}", market_ids);
        confirm(ledger, &market_ids, &questions)?;

        info!("Batch confirmed: markets {:?}", market_ids);
        Ok(BatchReceipt { market_ids, gas_limit, gas_used })
    }
}

fn confirm(
    ledger: &MarketLedger,
    ids: &[MarketId],
    questions: &[String],
) -> Result<(), SubmissionError> {
    if ids.len() != questions.len() {
        return Err(SubmissionError::Unconfirmed(format!(
            "{} ids returned for {} markets",
            ids.len(),
            questions.len()
        )));
    }
    for (id, question) in ids.iter().zip(questions) {
        match ledger.market(*id) {
            Some(m) if &m.question == question => {}
            _ => return Err(SubmissionError::Unconfirmed(format!("market #{} not readable", id))),
        }
    }
    Ok(())
}
