// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(rule, variant) execution automaton.
//!
//! ```text
//! INACTIVE ──met & crossed──> TRIGGERED ──reset met──> RESET_PENDING
//!                                 ^                          │
//!                                 └──────met & crossed───────┘
//! ```
//!
//! An open cooldown window freezes the automaton: no state change and no
//! execution, whatever the crossing says.
//!
//! A TRIGGERED state remembers the message that fired it. Seeing that
//! message again means its earlier delivery never finished, so the price
//! change is re-driven without touching the state.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use repricer_core::types::{ExecutionState, ExecutionStatePatch, ExecutionStatus};

use crate::evaluator::CrossingResult;

/// Why the automaton did or did not move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    CampaignNotActive,
    InCooldown,
    ConditionNotMet,
    NoCrossing,
    Triggered,
    Retriggered,
    Redelivered,
    AwaitingReset,
    ResetArmed,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::CampaignNotActive => "campaign_not_active",
            Reason::InCooldown => "in_cooldown",
            Reason::ConditionNotMet => "condition_not_met",
            Reason::NoCrossing => "no_crossing",
            Reason::Triggered => "triggered",
            Reason::Retriggered => "retriggered",
            Reason::Redelivered => "redelivered",
            Reason::AwaitingReset => "awaiting_reset",
            Reason::ResetArmed => "reset_armed",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decided step of the automaton.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    /// The price executor should run.
    pub execute: bool,
    /// Fields to persist. Empty for a no-op.
    pub patch: ExecutionStatePatch,
    pub reason: Reason,
}

impl Transition {
    fn stay(state: &ExecutionState, reason: Reason) -> Self {
        Self {
            from: state.state,
            to: state.state,
            execute: false,
            patch: ExecutionStatePatch::default(),
            reason,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.patch.is_empty()
    }
}

/// Inputs of one step beyond the stored state.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub crossing: &'a CrossingResult,
    pub reset_met: bool,
    pub inventory: i64,
    pub now: DateTime<Utc>,
    pub cooldown: Option<Duration>,
    /// Webhook message being evaluated, if any.
    pub message_id: Option<&'a str>,
}

/// Decide the next state. Pure; the caller persists `patch`.
pub fn transition(state: &ExecutionState, step: Step<'_>) -> Transition {
    if step.message_id.is_some_and(|id| state.triggered_by(id)) {
        return Transition {
            execute: true,
            ..Transition::stay(state, Reason::Redelivered)
        };
    }
    if state.in_cooldown(step.now) {
        return Transition::stay(state, Reason::InCooldown);
    }

    match state.state {
        ExecutionStatus::Inactive => {
            if !step.crossing.condition_met {
                Transition::stay(state, Reason::ConditionNotMet)
            } else if !step.crossing.crossed {
                Transition::stay(state, Reason::NoCrossing)
            } else {
                fire(state, step, Reason::Triggered)
            }
        }
        ExecutionStatus::Triggered => {
            if step.reset_met {
                Transition {
                    from: state.state,
                    to: ExecutionStatus::ResetPending,
                    execute: false,
                    patch: ExecutionStatePatch {
                        state: Some(ExecutionStatus::ResetPending),
                        reset_condition_met: Some(true),
                        last_inventory_value: Some(step.inventory),
                        ..Default::default()
                    },
                    reason: Reason::ResetArmed,
                }
            } else {
                Transition::stay(state, Reason::AwaitingReset)
            }
        }
        ExecutionStatus::ResetPending => {
            if step.crossing.should_trigger() {
                fire(state, step, Reason::Retriggered)
            } else if step.crossing.condition_met {
                Transition::stay(state, Reason::NoCrossing)
            } else {
                Transition::stay(state, Reason::ConditionNotMet)
            }
        }
    }
}

fn fire(state: &ExecutionState, step: Step<'_>, reason: Reason) -> Transition {
    let crossing = step.crossing;
    Transition {
        from: state.state,
        to: ExecutionStatus::Triggered,
        execute: true,
        patch: ExecutionStatePatch {
            state: Some(ExecutionStatus::Triggered),
            last_trigger_value: Some(crossing.value.unwrap_or(Decimal::from(step.inventory))),
            last_inventory_value: Some(step.inventory),
            threshold_direction: crossing.direction,
            trigger_count: Some(state.trigger_count + 1),
            reset_condition_met: Some(false),
            cooldown_until: step.cooldown.map(|cd| Some(step.now + cd)),
            triggered_at: Some(step.now),
            trigger_message_id: Some(step.message_id.map(str::to_string)),
        },
        reason,
    }
}
