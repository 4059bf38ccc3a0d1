//! Expense classification
//!
//! One completion call per candidate, no retries. Whatever comes back goes
//! through [`crate::ai::repair`]; a failed call becomes the service-error
//! sentinel so that callers always get a record and can move on.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::ai::{repair, AIBackend, AIClient, ReplyDefaults};
use crate::error::Result;
use crate::models::{ExpenseCandidate, ExpenseRecord, SourceHint};
use crate::prompts::{PromptId, PromptLibrary};

/// Default number of consecutive service failures treated as an outage
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub struct Classifier {
    ai: AIClient,
    prompts: PromptLibrary,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl Classifier {
    pub fn new(ai: AIClient, prompts: PromptLibrary) -> Self {
        Self {
            ai,
            prompts,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            consecutive_failures: 0,
        }
    }

    /// Outage threshold; 0 disables outage detection
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn ai(&self) -> &AIClient {
        &self.ai
    }

    /// Build the classification prompt for a candidate
    pub fn build_prompt(&mut self, candidate: &ExpenseCandidate) -> Result<String> {
        let prompt = self.prompts.get(PromptId::ClassifyExpense)?;

        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("description", &candidate.raw_description);
        if let Some(ref date) = candidate.raw_date {
            vars.insert("date", date);
        }
        if let Some(ref amount) = candidate.raw_amount {
            vars.insert("amount", amount);
        }
        if let Some(ref detail) = candidate.raw_detail {
            vars.insert("detail", detail);
        }
        if let Some(ref path) = candidate.source_path {
            vars.insert("source", path);
        }
        if candidate.source_hint == SourceHint::Ocr {
            vars.insert("raw_text", &candidate.raw_text);
        }

        Ok(prompt.render(&vars))
    }

    /// Classify one candidate
    ///
    /// Never fails: service errors and unrecoverable replies both come back
    /// as sentinel records with `is_valid == false`.
    pub async fn classify(&mut self, candidate: &ExpenseCandidate) -> ExpenseRecord {
        self.classify_on(candidate, Local::now().date_naive()).await
    }

    /// Classify with an explicit fallback date
    pub async fn classify_on(
        &mut self,
        candidate: &ExpenseCandidate,
        today: NaiveDate,
    ) -> ExpenseRecord {
        let defaults = ReplyDefaults {
            date: candidate.date_value().unwrap_or(today),
            amount: candidate.amount_value(),
            description: Some(candidate.raw_description.clone()),
        };

        let prompt = match self.build_prompt(candidate) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Classification prompt unavailable");
                let record = ExpenseRecord::service_error(defaults.date, &e.to_string());
                return with_source(record, candidate);
            }
        };

        let record = match self.ai.complete(&prompt).await {
            Ok(raw) => {
                self.consecutive_failures = 0;
                debug!(model = %self.ai.model(), "Classification reply received");
                repair(&raw).into_record(&defaults)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    error = %e,
                    host = %self.ai.host(),
                    consecutive = self.consecutive_failures,
                    "Classification call failed"
                );
                ExpenseRecord::service_error(defaults.date, &e.to_string())
            }
        };

        with_source(record, candidate)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True once the configured number of calls in a row have failed
    pub fn outage_detected(&self) -> bool {
        self.max_consecutive_failures > 0
            && self.consecutive_failures >= self.max_consecutive_failures
    }
}

fn with_source(mut record: ExpenseRecord, candidate: &ExpenseCandidate) -> ExpenseRecord {
    record.source_image = candidate.source_path.clone();
    record
}
