// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Price arithmetic for rule actions.

use rust_decimal::{Decimal, RoundingStrategy};

use repricer_core::types::{PriceChange, PriceChangeRequest, Rule, ThenAction, ThenMode};

/// Apply a rule's action to one amount.
///
/// Results are clamped at zero and rounded half away from zero to cents.
pub fn apply_action(rule: &Rule, amount: Decimal) -> Decimal {
    let v = rule.then_value;
    let raw = match (rule.then_mode, rule.then_action) {
        (ThenMode::Set, _) => v,
        (ThenMode::Percentage, ThenAction::ReducePrice) => {
            amount * (Decimal::ONE - v / Decimal::ONE_HUNDRED)
        }
        (ThenMode::Percentage, ThenAction::IncreasePrice) => {
            amount * (Decimal::ONE + v / Decimal::ONE_HUNDRED)
        }
        (ThenMode::Absolute, ThenAction::ReducePrice) => amount - v,
        (ThenMode::Absolute, ThenAction::IncreasePrice) => amount + v,
    };
    raw.max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The full change a rule makes, compare-at included when the rule asks for it.
pub fn compute_price_change(request: &PriceChangeRequest) -> PriceChange {
    let rule = &request.rule;
    let new_compare_at = match request.current_compare_at {
        Some(compare_at) if rule.change_compare_at => Some(apply_action(rule, compare_at)),
        other => other,
    };
    PriceChange {
        old_price: request.current_price,
        new_price: apply_action(rule, request.current_price),
        old_compare_at: request.current_compare_at,
        new_compare_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repricer_core::types::WhenCondition;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rule(action: ThenAction, mode: ThenMode, value: &str, compare_at: bool) -> Rule {
        Rule {
            id: "r1".into(),
            description: String::new(),
            when_condition: WhenCondition::LessThanAbs,
            when_operator: None,
            when_value: "20".into(),
            then_action: action,
            then_mode: mode,
            then_value: dec(value),
            change_compare_at: compare_at,
            reset_margin: None,
        }
    }

    fn request(rule: Rule, price: &str, compare_at: Option<&str>) -> PriceChangeRequest {
        PriceChangeRequest {
            shop_domain: "shop.example".into(),
            variant_id: "v1".into(),
            product_id: "p1".into(),
            rule,
            current_price: dec(price),
            current_compare_at: compare_at.map(dec),
        }
    }

    #[test]
    fn ten_percent_reduction_with_compare_at() {
        let change = compute_price_change(&request(
            rule(ThenAction::ReducePrice, ThenMode::Percentage, "10", true),
            "50.00",
            Some("60.00"),
        ));
        assert_eq!(change.old_price, dec("50.00"));
        assert_eq!(change.new_price, dec("45.00"));
        assert_eq!(change.old_compare_at, Some(dec("60.00")));
        assert_eq!(change.new_compare_at, Some(dec("54.00")));
    }

    #[test]
    fn compare_at_untouched_unless_requested() {
        let change = compute_price_change(&request(
            rule(ThenAction::ReducePrice, ThenMode::Percentage, "10", false),
            "50.00",
            Some("60.00"),
        ));
        assert_eq!(change.new_compare_at, Some(dec("60.00")));
    }

    #[test]
    fn absolute_and_set_modes() {
        let up = rule(ThenAction::IncreasePrice, ThenMode::Absolute, "2.50", false);
        assert_eq!(apply_action(&up, dec("10")), dec("12.50"));

        let down = rule(ThenAction::ReducePrice, ThenMode::Absolute, "15", false);
        assert_eq!(apply_action(&down, dec("10")), Decimal::ZERO);

        let set = rule(ThenAction::ReducePrice, ThenMode::Set, "7.99", false);
        assert_eq!(apply_action(&set, dec("100")), dec("7.99"));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let r = rule(ThenAction::IncreasePrice, ThenMode::Percentage, "5", false);
        // 10.10 * 1.05 = 10.605
        assert_eq!(apply_action(&r, dec("10.10")), dec("10.61"));
    }
}
