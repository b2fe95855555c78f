// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold evaluation.
//!
//! Everything here is pure. Comparisons are exact on [`Decimal`].
//!
//! | operator | `ABOVE` when | matched side |
//! |---|---|---|
//! | less_than | `value >= T` | `BELOW` |
//! | greater_than | `value > T` | `ABOVE` |
//! | equals | `value == T` | `ABOVE` |
//! | between | `low <= value <= high` | `ABOVE` |
//! | decreases_by_* | `drop >= X` | `ABOVE` |
//!
//! A crossing is a change of direction between two consecutive
//! observations. Without a previous observation the first one counts as a
//! crossing when the condition is met. For the `decreases_by_*` operators
//! the observed value is the drop itself, so a qualifying drop is a crossing.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use repricer_core::RepricerError;
use repricer_core::types::{Rule, ThresholdDirection, VariantStateSnapshot, WhenCondition};

/// Comparison a rule applies to the observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    LessThan,
    GreaterThan,
    Equals,
    Between,
    DecreasesByPercent,
    DecreasesByAbs,
}

impl Operator {
    pub fn from_condition(condition: WhenCondition) -> Self {
        match condition {
            WhenCondition::LessThanAbs => Operator::LessThan,
            WhenCondition::MoreThanAbs | WhenCondition::GreaterThanAbs => Operator::GreaterThan,
            WhenCondition::Equals => Operator::Equals,
            WhenCondition::Between => Operator::Between,
            WhenCondition::DecreasesByPercent => Operator::DecreasesByPercent,
            WhenCondition::DecreasesByAbs => Operator::DecreasesByAbs,
        }
    }

    /// Parse a display operator as written by the authoring UI.
    pub fn parse(name: &str) -> Result<Self, RepricerError> {
        let op = match name.trim().to_ascii_lowercase().as_str() {
            "<" | "lt" | "less_than" | "less_than_abs" => Operator::LessThan,
            ">" | "gt" | "greater_than" | "more_than" | "greater_than_abs" | "more_than_abs" => {
                Operator::GreaterThan
            }
            "=" | "==" | "eq" | "equals" => Operator::Equals,
            "between" | "range" => Operator::Between,
            "decreases_by_percent" | "%" => Operator::DecreasesByPercent,
            "decreases_by_abs" | "decreases_by" => Operator::DecreasesByAbs,
            _ => return Err(RepricerError::UnknownOperator(name.to_string())),
        };
        Ok(op)
    }

    /// The direction in which the condition holds.
    pub fn matched_side(self) -> ThresholdDirection {
        match self {
            Operator::LessThan => ThresholdDirection::Below,
            _ => ThresholdDirection::Above,
        }
    }

    pub fn is_delta(self) -> bool {
        matches!(self, Operator::DecreasesByPercent | Operator::DecreasesByAbs)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::LessThan => "less_than",
            Operator::GreaterThan => "greater_than",
            Operator::Equals => "equals",
            Operator::Between => "between",
            Operator::DecreasesByPercent => "decreases_by_percent",
            Operator::DecreasesByAbs => "decreases_by_abs",
        })
    }
}

/// Parsed `when_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Single(Decimal),
    /// Inclusive on both ends.
    Range { low: Decimal, high: Decimal },
}

impl Threshold {
    fn parse(operator: Operator, raw: &str) -> Result<Self, String> {
        let number = |s: &str| {
            Decimal::from_str(s.trim()).map_err(|e| format!("`{}` is not a number: {e}", s.trim()))
        };
        match operator {
            Operator::Between => {
                let (low, high) = raw
                    .split_once(',')
                    .ok_or_else(|| format!("between expects \"low,high\", got `{raw}`"))?;
                let (low, high) = (number(low)?, number(high)?);
                if low > high {
                    return Err(format!("range low {low} is above high {high}"));
                }
                Ok(Threshold::Range { low, high })
            }
            op => {
                let value = number(raw)?;
                if op.is_delta() && value <= Decimal::ZERO {
                    return Err(format!("{op} needs a positive amount, got {value}"));
                }
                Ok(Threshold::Single(value))
            }
        }
    }
}

/// What the evaluator saw for one observation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingResult {
    pub crossed: bool,
    pub condition_met: bool,
    pub direction: Option<ThresholdDirection>,
    pub previous_direction: Option<ThresholdDirection>,
    /// Observed value: inventory for level operators, the drop for delta operators.
    pub value: Option<Decimal>,
    pub previous_value: Option<Decimal>,
}

impl CrossingResult {
    /// Condition met on a fresh edge.
    pub fn should_trigger(&self) -> bool {
        self.condition_met && self.crossed
    }
}

/// A rule's condition, validated and ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCondition {
    pub operator: Operator,
    pub threshold: Threshold,
    pub reset_margin: Decimal,
}

impl RuleCondition {
    /// Validate a rule's operator, threshold and margin.
    ///
    /// A `when_operator` that names an unknown operator is `UnknownOperator`;
    /// one that disagrees with `when_condition`, or an unparseable threshold,
    /// is `InvalidRule`.
    pub fn from_rule(rule: &Rule, default_margin: Decimal) -> Result<Self, RepricerError> {
        let invalid = |reason: String| RepricerError::InvalidRule {
            rule_id: rule.id.clone(),
            reason,
        };

        let operator = Operator::from_condition(rule.when_condition);
        if let Some(display) = rule.when_operator.as_deref().filter(|s| !s.trim().is_empty()) {
            let named = Operator::parse(display)?;
            if named != operator {
                return Err(invalid(format!(
                    "operator `{display}` disagrees with condition {}",
                    rule.when_condition
                )));
            }
        }

        let threshold = Threshold::parse(operator, &rule.when_value).map_err(invalid)?;
        let reset_margin = rule.reset_margin.unwrap_or(default_margin);
        if reset_margin < Decimal::ZERO {
            return Err(invalid(format!("negative reset margin {reset_margin}")));
        }

        Ok(Self {
            operator,
            threshold,
            reset_margin,
        })
    }

    /// Classify a value against the threshold.
    pub fn direction(&self, value: Decimal) -> ThresholdDirection {
        let above = match (self.operator, self.threshold) {
            (_, Threshold::Range { low, high }) => low <= value && value <= high,
            (Operator::LessThan, Threshold::Single(t)) => value >= t,
            (Operator::Equals, Threshold::Single(t)) => value == t,
            (_, Threshold::Single(t)) if self.operator.is_delta() => value >= t,
            (_, Threshold::Single(t)) => value > t,
        };
        if above {
            ThresholdDirection::Above
        } else {
            ThresholdDirection::Below
        }
    }

    pub fn condition_met(&self, value: Decimal) -> bool {
        self.direction(value) == self.operator.matched_side()
    }

    /// The value the operator compares for `current`, given the snapshot before it.
    ///
    /// Delta operators yield `None` without a previous snapshot, and the
    /// percentage operator yields `None` when the previous quantity was zero.
    pub fn observed_value(
        &self,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
    ) -> Option<Decimal> {
        let now = Decimal::from(current.inventory_quantity);
        match self.operator {
            Operator::DecreasesByAbs => {
                previous.map(|prev| Decimal::from(prev.inventory_quantity) - now)
            }
            Operator::DecreasesByPercent => {
                let before = Decimal::from(previous?.inventory_quantity);
                if before.is_zero() {
                    return None;
                }
                Some((before - now) / before * Decimal::ONE_HUNDRED)
            }
            _ => Some(now),
        }
    }

    /// Compare two consecutive observations.
    pub fn crossing(
        &self,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
    ) -> CrossingResult {
        let Some(value) = self.observed_value(current, previous) else {
            return CrossingResult {
                crossed: false,
                condition_met: false,
                direction: None,
                previous_direction: None,
                value: None,
                previous_value: previous.map(|p| Decimal::from(p.inventory_quantity)),
            };
        };

        let direction = self.direction(value);
        let condition_met = direction == self.operator.matched_side();

        if self.operator.is_delta() {
            return CrossingResult {
                crossed: condition_met,
                condition_met,
                direction: Some(direction),
                previous_direction: None,
                value: Some(value),
                previous_value: previous.map(|p| Decimal::from(p.inventory_quantity)),
            };
        }

        let previous_value = previous.map(|p| Decimal::from(p.inventory_quantity));
        let previous_direction = previous_value.map(|v| self.direction(v));
        let crossed = match previous_direction {
            Some(before) => before != direction,
            None => condition_met,
        };

        CrossingResult {
            crossed,
            condition_met,
            direction: Some(direction),
            previous_direction,
            value: Some(value),
            previous_value,
        }
    }

    /// Whether `value` has moved far enough past the threshold to re-arm.
    ///
    /// The condition must not hold and the value must clear the threshold by
    /// at least the reset margin on the unmatched side.
    pub fn reset_met(&self, value: Decimal) -> bool {
        if self.condition_met(value) {
            return false;
        }
        let m = self.reset_margin;
        match (self.operator, self.threshold) {
            (_, Threshold::Range { low, high }) => value <= low - m || value >= high + m,
            (Operator::LessThan, Threshold::Single(t)) => value >= t + m,
            (Operator::GreaterThan, Threshold::Single(t)) => value <= t - m,
            (Operator::Equals, Threshold::Single(t)) => (value - t).abs() >= m,
            (_, Threshold::Single(x)) => value <= x - m,
        }
    }

    /// Reset check against an observation pair. `false` when the value is unknown.
    pub fn reset_condition_met(
        &self,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
    ) -> bool {
        self.observed_value(current, previous)
            .is_some_and(|value| self.reset_met(value))
    }
}
