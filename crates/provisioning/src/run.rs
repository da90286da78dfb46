//! The persisted record of one provisioning attempt.

use chrono::{DateTime, Utc};
use common::{MaterialId, QuotationId, WorkOrderId};
use doc_store::Document;
use inventory::{LotAllocation, LotRelease};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisioningError, Result};

/// Where a provisioning run stands. A failed run keeps why it failed and
/// which releases could not be made.
///
/// ```text
/// Allocating ──┬──► Completed
///              └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProvisioningState {
    #[default]
    Allocating,
    Compensating {
        reason: String,
    },
    Completed,
    Failed {
        reason: String,
        #[serde(default)]
        compensation_failures: Vec<String>,
    },
}

/// What happened to a run since its last transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// Every requirement is reserved and the work order is pending.
    Allocated,
    /// A requirement could not be reserved.
    AllocationFailed(String),
    /// Compensation finished; lists releases that did not go through.
    Compensated(Vec<String>),
}

impl RunEvent {
    fn name(&self) -> &'static str {
        match self {
            RunEvent::Allocated => "allocated",
            RunEvent::AllocationFailed(_) => "allocation failure",
            RunEvent::Compensated(_) => "compensation",
        }
    }
}

impl ProvisioningState {
    pub fn name(&self) -> &'static str {
        match self {
            ProvisioningState::Allocating => "allocating",
            ProvisioningState::Compensating { .. } => "compensating",
            ProvisioningState::Completed => "completed",
            ProvisioningState::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Completed | ProvisioningState::Failed { .. }
        )
    }

    /// The state `event` leads to, or a conflict if it cannot happen now.
    pub fn next(&self, event: RunEvent) -> Result<ProvisioningState> {
        match (self, event) {
            (ProvisioningState::Allocating, RunEvent::Allocated) => Ok(ProvisioningState::Completed),
            (ProvisioningState::Allocating, RunEvent::AllocationFailed(reason)) => {
                Ok(ProvisioningState::Compensating { reason })
            }
            (ProvisioningState::Compensating { reason }, RunEvent::Compensated(failures)) => {
                Ok(ProvisioningState::Failed {
                    reason: reason.clone(),
                    compensation_failures: failures,
                })
            }
            (state, event) => Err(ProvisioningError::StateConflict(format!(
                "provisioning run is {} and cannot take {}",
                state.name(),
                event.name()
            ))),
        }
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Allocations made for one material requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStep {
    pub material_id: MaterialId,
    pub required_weight: Decimal,
    pub allocations: Vec<LotAllocation>,
    /// False when the step ran short; its allocations are then partial.
    pub succeeded: bool,
}

/// Saga instance for provisioning one work order.
///
/// Keyed by the work order it provisions. The record outlives a failed work
/// order so the compensation that was performed stays inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRun {
    pub work_order_id: WorkOrderId,
    pub quotation_id: QuotationId,
    pub state: ProvisioningState,
    pub steps: Vec<ProvisioningStep>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Document for ProvisioningRun {
    type Id = WorkOrderId;
    const COLLECTION: &'static str = "provisioning_runs";

    fn id(&self) -> WorkOrderId {
        self.work_order_id
    }
}

impl ProvisioningRun {
    /// A run that is allocating from the start.
    pub fn new(work_order_id: WorkOrderId, quotation_id: QuotationId) -> Self {
        Self {
            work_order_id,
            quotation_id,
            state: ProvisioningState::Allocating,
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Records the allocations of a requirement, including partial ones
    /// from a failed attempt so they are released during compensation.
    pub fn record_step(
        &mut self,
        material_id: MaterialId,
        required_weight: Decimal,
        allocations: Vec<LotAllocation>,
        succeeded: bool,
    ) {
        self.steps.push(ProvisioningStep {
            material_id,
            required_weight,
            allocations,
            succeeded,
        });
    }

    pub fn advance(&mut self, event: RunEvent) -> Result<()> {
        self.state = self.state.next(event)?;
        if self.state.is_finished() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            ProvisioningState::Compensating { reason } | ProvisioningState::Failed { reason, .. } => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }

    pub fn compensation_failures(&self) -> &[String] {
        match &self.state {
            ProvisioningState::Failed {
                compensation_failures,
                ..
            } => compensation_failures.as_slice(),
            _ => &[],
        }
    }

    /// Every reservation the run made, newest first.
    pub fn releases(&self) -> Vec<LotRelease> {
        self.steps
            .iter()
            .rev()
            .flat_map(|step| step.allocations.iter().rev())
            .map(LotRelease::from)
            .collect()
    }

    pub fn allocations(&self) -> impl Iterator<Item = &LotAllocation> {
        self.steps.iter().flat_map(|step| step.allocations.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::LotId;

    fn allocation(material_id: MaterialId, weight: i64) -> LotAllocation {
        LotAllocation {
            lot_id: LotId::new(),
            lot_number: format!("LOT-{weight}"),
            material_id,
            weight: Decimal::from(weight),
        }
    }

    #[test]
    fn allocated_run_completes() {
        let mut run = ProvisioningRun::new(WorkOrderId::new(), QuotationId::new());
        assert_eq!(run.state, ProvisioningState::Allocating);

        let copper = MaterialId::new();
        run.record_step(copper, Decimal::from(5), vec![allocation(copper, 5)], true);
        run.advance(RunEvent::Allocated).unwrap();

        assert_eq!(run.state, ProvisioningState::Completed);
        assert!(run.finished_at.is_some());
        assert!(run.failure_reason().is_none());
        assert_eq!(run.allocations().count(), 1);
    }

    #[test]
    fn failure_carries_reason_through_compensation() {
        let mut run = ProvisioningRun::new(WorkOrderId::new(), QuotationId::new());

        let copper = MaterialId::new();
        let pvc = MaterialId::new();
        let c1 = allocation(copper, 3);
        let c2 = allocation(copper, 2);
        let p1 = allocation(pvc, 4);
        run.record_step(copper, Decimal::from(5), vec![c1.clone(), c2.clone()], true);
        run.record_step(pvc, Decimal::from(9), vec![p1.clone()], false);

        run.advance(RunEvent::AllocationFailed("insufficient stock".into()))
            .unwrap();
        assert_eq!(run.failure_reason(), Some("insufficient stock"));
        assert!(run.finished_at.is_none());

        let order: Vec<_> = run.releases().iter().map(|r| r.lot_id).collect();
        assert_eq!(order, vec![p1.lot_id, c2.lot_id, c1.lot_id]);

        run.advance(RunEvent::Compensated(vec!["lot x: gone".into()]))
            .unwrap();
        assert_eq!(
            run.state,
            ProvisioningState::Failed {
                reason: "insufficient stock".into(),
                compensation_failures: vec!["lot x: gone".into()],
            }
        );
        assert_eq!(run.compensation_failures(), ["lot x: gone".to_string()]);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn out_of_order_events_conflict() {
        let mut run = ProvisioningRun::new(WorkOrderId::new(), QuotationId::new());
        let early = run.advance(RunEvent::Compensated(vec![]));
        assert!(matches!(early, Err(ProvisioningError::StateConflict(_))));
        assert_eq!(run.state, ProvisioningState::Allocating);

        run.advance(RunEvent::Allocated).unwrap();
        assert!(run.advance(RunEvent::Allocated).is_err());
        assert!(run
            .advance(RunEvent::AllocationFailed("late".into()))
            .is_err());
        assert_eq!(run.state, ProvisioningState::Completed);
    }

    #[test]
    fn state_is_stored_with_its_phase() {
        let state = ProvisioningState::Compensating {
            reason: "short".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "compensating");
        assert_eq!(json["reason"], "short");
        let back: ProvisioningState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
