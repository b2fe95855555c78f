// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign lifecycle guard.
//!
//! ```text
//! DRAFT ──> ACTIVE <──> PAUSED
//!             │           │
//!             └─> COMPLETED <┘
//! ARCHIVED: terminal, no outgoing edges
//! ```
//!
//! Only `ACTIVE` campaigns may be acted on by the rule engine.

use crate::error::RepricerError;
use crate::types::{Campaign, CampaignStatus};

impl CampaignStatus {
    /// Statuses reachable from `self` in one step.
    pub fn allowed_transitions(self) -> &'static [CampaignStatus] {
        match self {
            CampaignStatus::Draft => &[CampaignStatus::Active],
            CampaignStatus::Active => &[CampaignStatus::Paused, CampaignStatus::Completed],
            CampaignStatus::Paused => &[CampaignStatus::Active, CampaignStatus::Completed],
            CampaignStatus::Completed | CampaignStatus::Archived => &[],
        }
    }

    pub fn can_transition_to(self, to: CampaignStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Validates campaign status changes and gates rule evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CampaignStatusGuard;

impl CampaignStatusGuard {
    /// Validate a transition, returning the new status on success.
    pub fn transition(
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<CampaignStatus, RepricerError> {
        if from.can_transition_to(to) {
            Ok(to)
        } else {
            Err(RepricerError::InvalidTransition { from, to })
        }
    }

    /// Whether the engine may evaluate rules for this campaign.
    pub fn may_evaluate(campaign: &Campaign) -> bool {
        campaign.status == CampaignStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CampaignStatus; 5] = [
        CampaignStatus::Draft,
        CampaignStatus::Active,
        CampaignStatus::Paused,
        CampaignStatus::Completed,
        CampaignStatus::Archived,
    ];

    #[test]
    fn allowed_edges() {
        use CampaignStatus::*;
        assert_eq!(CampaignStatusGuard::transition(Draft, Active).unwrap(), Active);
        assert_eq!(CampaignStatusGuard::transition(Active, Paused).unwrap(), Paused);
        assert_eq!(
            CampaignStatusGuard::transition(Active, Completed).unwrap(),
            Completed
        );
        assert_eq!(CampaignStatusGuard::transition(Paused, Active).unwrap(), Active);
        assert_eq!(
            CampaignStatusGuard::transition(Paused, Completed).unwrap(),
            Completed
        );
    }

    #[test]
    fn every_other_edge_is_rejected() {
        let mut allowed = 0;
        for from in ALL {
            for to in ALL {
                match CampaignStatusGuard::transition(from, to) {
                    Ok(_) => allowed += 1,
                    Err(RepricerError::InvalidTransition { from: f, to: t }) => {
                        assert_eq!((f, t), (from, to));
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn terminal_statuses() {
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(CampaignStatus::Archived.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
        assert!(!CampaignStatus::Draft.can_transition_to(CampaignStatus::Draft));
    }
}
