use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::contact::ContactId;
use crate::domain::quote::QuoteId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Funnel stages in typical progression order. Transitions are not
/// restricted to forward-only; reps move deals backwards when a
/// negotiation reopens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Lead,
    InspectionScheduled,
    InspectionCompleted,
    QuoteSent,
    Negotiation,
    VerbalCommitment,
    ContractSent,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    /// Default win probability assigned when a deal enters this stage and
    /// the caller has not overridden it. Exhaustive on purpose: adding a
    /// stage without a probability is a compile error.
    pub fn default_win_probability(self) -> u8 {
        match self {
            DealStage::Lead => 10,
            DealStage::InspectionScheduled => 20,
            DealStage::InspectionCompleted => 40,
            DealStage::QuoteSent => 50,
            DealStage::Negotiation => 70,
            DealStage::VerbalCommitment => 80,
            DealStage::ContractSent => 90,
            DealStage::ClosedWon => 100,
            DealStage::ClosedLost => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DealStage::Lead => "lead",
            DealStage::InspectionScheduled => "inspection_scheduled",
            DealStage::InspectionCompleted => "inspection_completed",
            DealStage::QuoteSent => "quote_sent",
            DealStage::Negotiation => "negotiation",
            DealStage::VerbalCommitment => "verbal_commitment",
            DealStage::ContractSent => "contract_sent",
            DealStage::ClosedWon => "closed_won",
            DealStage::ClosedLost => "closed_lost",
        }
    }

    /// All stages, in funnel order. Used by the pipeline summary so empty
    /// stages still render.
    pub fn all() -> [DealStage; 9] {
        [
            DealStage::Lead,
            DealStage::InspectionScheduled,
            DealStage::InspectionCompleted,
            DealStage::QuoteSent,
            DealStage::Negotiation,
            DealStage::VerbalCommitment,
            DealStage::ContractSent,
            DealStage::ClosedWon,
            DealStage::ClosedLost,
        ]
    }
}

impl std::fmt::Display for DealStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Open,
    Won,
    Lost,
    Cancelled,
}

impl DealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DealStatus::Open => "open",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
            DealStatus::Cancelled => "cancelled",
        }
    }
}

/// One row of the append-only stage log. Exactly the last entry is open
/// (no `exited_at`) while the deal status is `Open`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub stage: DealStage,
    pub entered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,
}

/// Input for deal creation. Monetary amounts are integer minor currency
/// units (cents).
#[derive(Clone, Debug, Default)]
pub struct NewDeal {
    pub org_id: Option<OrgId>,
    pub contact_id: Option<ContactId>,
    pub lead_id: Option<LeadId>,
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub deal_value_cents: i64,
    pub recurring_value_cents: Option<i64>,
    pub contract_length_months: Option<u32>,
    pub stage: Option<DealStage>,
    pub win_probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
}

/// Explicit per-operation patch. Fields left as `None` are untouched, so
/// the derived-value recompute in `apply_patch` can never be skipped by a
/// caller merging raw structs.
#[derive(Clone, Debug, Default)]
pub struct DealPatch {
    pub title: Option<String>,
    pub contact_id: Option<ContactId>,
    pub owner_id: Option<Uuid>,
    pub deal_value_cents: Option<i64>,
    pub recurring_value_cents: Option<i64>,
    pub contract_length_months: Option<u32>,
    pub stage: Option<DealStage>,
    pub win_probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub quote_id: Option<QuoteId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub lead_id: Option<LeadId>,
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub deal_value_cents: i64,
    pub recurring_value_cents: Option<i64>,
    pub contract_length_months: Option<u32>,
    pub lifetime_value_cents: Option<i64>,
    pub win_probability: u8,
    pub weighted_value_cents: i64,
    pub stage: DealStage,
    pub status: DealStatus,
    pub stage_history: Vec<StageHistoryEntry>,
    pub quote_id: Option<QuoteId>,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<DateTime<Utc>>,
    pub days_in_pipeline: i64,
    pub stage_duration_days: i64,
    pub win_loss_reason: Option<String>,
    pub competitor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// dealValue scaled by win probability, rounded half up.
fn weighted_value(deal_value_cents: i64, win_probability: u8) -> i64 {
    (deal_value_cents * i64::from(win_probability) + 50) / 100
}

impl Deal {
    pub fn create(input: NewDeal, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let org_id = input
            .org_id
            .ok_or_else(|| DomainError::validation("organization id is required"))?;
        let contact_id = input
            .contact_id
            .ok_or_else(|| DomainError::validation("contact id is required"))?;
        if input.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if input.deal_value_cents < 0 {
            return Err(DomainError::validation("deal value must not be negative"));
        }
        if input.recurring_value_cents.is_some_and(|v| v < 0) {
            return Err(DomainError::validation("recurring value must not be negative"));
        }
        if input.win_probability.is_some_and(|p| p > 100) {
            return Err(DomainError::validation("win probability must be between 0 and 100"));
        }

        let stage = input.stage.unwrap_or(DealStage::Lead);
        let win_probability =
            input.win_probability.unwrap_or_else(|| stage.default_win_probability());

        let mut deal = Deal {
            id: DealId(Uuid::new_v4()),
            org_id,
            contact_id,
            lead_id: input.lead_id,
            owner_id: input.owner_id,
            title: input.title,
            deal_value_cents: input.deal_value_cents,
            recurring_value_cents: input.recurring_value_cents,
            contract_length_months: input.contract_length_months,
            lifetime_value_cents: None,
            win_probability,
            weighted_value_cents: 0,
            stage,
            status: DealStatus::Open,
            stage_history: vec![StageHistoryEntry {
                stage,
                entered_at: now,
                exited_at: None,
                duration_days: None,
            }],
            quote_id: None,
            expected_close_date: input.expected_close_date,
            actual_close_date: None,
            days_in_pipeline: 0,
            stage_duration_days: 0,
            win_loss_reason: None,
            competitor: None,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            deleted_at: None,
        };
        deal.recompute_derived();
        Ok(deal)
    }

    /// Recompute weighted and lifetime values from current fields. Called
    /// after every mutation so the invariants in the module tests hold at
    /// all observable points.
    pub fn recompute_derived(&mut self) {
        self.weighted_value_cents = weighted_value(self.deal_value_cents, self.win_probability);
        self.lifetime_value_cents = match (self.recurring_value_cents, self.contract_length_months)
        {
            (Some(recurring), Some(months)) => {
                Some(recurring * i64::from(months) + self.deal_value_cents)
            }
            _ => None,
        };
    }

    /// Move the deal to a different stage, closing the open history entry
    /// and appending a new one. Fails when the deal is already in the
    /// requested stage.
    pub fn move_to_stage(
        &mut self,
        new_stage: DealStage,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if new_stage == self.stage {
            return Err(DomainError::invalid_operation(format!(
                "deal is already in stage {new_stage}"
            )));
        }
        self.transition_stage(new_stage, now);
        self.win_probability = new_stage.default_win_probability();
        self.recompute_derived();
        self.updated_at = now;
        self.last_activity_at = now;
        Ok(())
    }

    fn transition_stage(&mut self, new_stage: DealStage, now: DateTime<Utc>) {
        if let Some(open) = self.stage_history.iter_mut().rev().find(|e| e.exited_at.is_none()) {
            open.exited_at = Some(now);
            open.duration_days = Some((now - open.entered_at).num_days());
        }
        self.stage_history.push(StageHistoryEntry {
            stage: new_stage,
            entered_at: now,
            exited_at: None,
            duration_days: None,
        });
        self.stage = new_stage;
        self.days_in_pipeline = (now - self.created_at).num_days();
        self.stage_duration_days = 0;
    }

    /// Apply a field patch. A stage change runs the transition routine
    /// first; the stage default probability wins unless the same patch
    /// carries an explicit override. Derived values are recomputed
    /// unconditionally.
    pub fn apply_patch(&mut self, patch: DealPatch, now: DateTime<Utc>) -> Result<(), DomainError> {
        if patch.deal_value_cents.is_some_and(|v| v < 0) {
            return Err(DomainError::validation("deal value must not be negative"));
        }
        if patch.recurring_value_cents.is_some_and(|v| v < 0) {
            return Err(DomainError::validation("recurring value must not be negative"));
        }
        if patch.win_probability.is_some_and(|p| p > 100) {
            return Err(DomainError::validation("win probability must be between 0 and 100"));
        }

        let stage_changed = match patch.stage {
            Some(new_stage) if new_stage != self.stage => {
                self.transition_stage(new_stage, now);
                true
            }
            _ => false,
        };

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(contact_id) = patch.contact_id {
            self.contact_id = contact_id;
        }
        if let Some(owner_id) = patch.owner_id {
            self.owner_id = Some(owner_id);
        }
        if let Some(value) = patch.deal_value_cents {
            self.deal_value_cents = value;
        }
        if let Some(recurring) = patch.recurring_value_cents {
            self.recurring_value_cents = Some(recurring);
        }
        if let Some(months) = patch.contract_length_months {
            self.contract_length_months = Some(months);
        }
        if let Some(date) = patch.expected_close_date {
            self.expected_close_date = Some(date);
        }
        if let Some(quote_id) = patch.quote_id {
            self.quote_id = Some(quote_id);
        }

        match patch.win_probability {
            Some(probability) => self.win_probability = probability,
            None if stage_changed => {
                self.win_probability = self.stage.default_win_probability();
            }
            None => {}
        }

        self.recompute_derived();
        self.updated_at = now;
        self.last_activity_at = now;
        Ok(())
    }

    /// Close the deal as won. Re-closing an already closed deal is allowed
    /// and treated as a correction; the stage log records the move.
    pub fn mark_won(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        if self.stage != DealStage::ClosedWon {
            self.transition_stage(DealStage::ClosedWon, now);
        }
        self.status = DealStatus::Won;
        self.win_probability = 100;
        self.actual_close_date = Some(now);
        self.win_loss_reason = reason;
        self.competitor = None;
        self.recompute_derived();
        self.updated_at = now;
        self.last_activity_at = now;
    }

    /// Close the deal as lost, recording the reason and the competitor
    /// that took it, if known.
    pub fn mark_lost(&mut self, reason: String, competitor: Option<String>, now: DateTime<Utc>) {
        if self.stage != DealStage::ClosedLost {
            self.transition_stage(DealStage::ClosedLost, now);
        }
        self.status = DealStatus::Lost;
        self.win_probability = 0;
        self.actual_close_date = Some(now);
        self.win_loss_reason = Some(reason);
        self.competitor = competitor;
        self.recompute_derived();
        self.updated_at = now;
        self.last_activity_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
