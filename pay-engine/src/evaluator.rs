//! Rule evaluation
//!
//! Turns one rate rule and the facts of a leg into a quantity and an amount.
//! Evaluation is pure: everything a rule may look at is gathered into a
//! [`RuleContext`] up front.

use freight_core::{round_money, DispatchLeg, Load, RateRule, Stop, TriggerEvent};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Facts a rule is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Leg being paid
    pub leg: &'a DispatchLeg,
    /// Load the leg belongs to
    pub load: &'a Load,
    /// Stops covered by the leg, ordered by sequence
    pub stops: &'a [Stop],
    /// Invoice total of the load, if it has a priced invoice
    pub invoice_total: Option<Decimal>,
}

/// Result of evaluating one rule
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Units the rule paid for
    pub quantity: Decimal,
    /// Amount (always non-negative; deductions are negated by the caller)
    pub amount: Decimal,
    /// Why the rule contributed less than expected
    pub warning: Option<String>,
}

impl RuleOutcome {
    fn new(quantity: Decimal, amount: Decimal) -> Self {
        Self {
            quantity,
            amount,
            warning: None,
        }
    }

    fn zero_with_warning(warning: impl Into<String>) -> Self {
        Self {
            warning: Some(warning.into()),
            ..Default::default()
        }
    }
}

fn round_hours(hours: Decimal) -> Decimal {
    hours.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn per_unit(quantity: Decimal, rate: Decimal) -> RuleOutcome {
    RuleOutcome::new(quantity, round_money(quantity * rate))
}

fn flat(rate: Decimal) -> RuleOutcome {
    RuleOutcome::new(Decimal::ONE, round_money(rate))
}

fn leg_duration(rule: &RateRule, stops: &[Stop]) -> RuleOutcome {
    let start = stops
        .first()
        .and_then(|stop| stop.check_in_at.or(stop.window_start));
    let end = stops
        .last()
        .and_then(|stop| stop.check_out_at.or(stop.window_end));

    let (Some(start), Some(end)) = (start, end) else {
        return RuleOutcome::zero_with_warning(format!(
            "{}: leg is missing start or end time",
            rule.name
        ));
    };

    let seconds = (end - start).num_seconds();
    if seconds <= 0 {
        return RuleOutcome::zero_with_warning(format!(
            "{}: leg end is not after its start",
            rule.name
        ));
    }

    let hours = round_hours(Decimal::from(seconds) / Decimal::from(3600));
    per_unit(hours, rule.rate_amount)
}

fn waiting_time(rule: &RateRule, stops: &[Stop]) -> RuleOutcome {
    let minutes: Decimal = stops.iter().map(|stop| stop.dwell_minutes).sum();
    let hours = round_hours(minutes / Decimal::from(60));
    let mut outcome = per_unit(hours, rule.rate_amount);
    if hours.is_zero() {
        outcome.warning = Some(format!("{}: no dwell time recorded", rule.name));
    }
    outcome
}

/// Evaluate `rule` against `ctx`.
///
/// A set `min_threshold` zeroes the outcome when the quantity falls short of
/// it; otherwise a set `max_cap` clamps the amount. Warnings survive both.
pub fn evaluate_rule(rule: &RateRule, ctx: &RuleContext<'_>) -> RuleOutcome {
    let rate = rule.rate_amount;
    let mut outcome = match rule.trigger {
        TriggerEvent::MileLoaded => per_unit(ctx.leg.leg_loaded_miles, rate),
        TriggerEvent::MileEmpty => per_unit(ctx.leg.leg_empty_miles, rate),
        TriggerEvent::TimeDuration => leg_duration(rule, ctx.stops),
        TriggerEvent::TimeWaiting => waiting_time(rule, ctx.stops),
        TriggerEvent::CountStops => per_unit(Decimal::from(ctx.stops.len()), rate),
        TriggerEvent::FlatLoad | TriggerEvent::FlatLeg => flat(rate),
        TriggerEvent::AttrHazmat if ctx.load.is_hazmat => flat(rate),
        TriggerEvent::AttrTarp if ctx.load.requires_tarp => flat(rate),
        TriggerEvent::AttrHazmat | TriggerEvent::AttrTarp => RuleOutcome::default(),
        TriggerEvent::PctOfLoad => match ctx.invoice_total {
            Some(total) => RuleOutcome::new(total, round_money(total * rate / Decimal::ONE_HUNDRED)),
            None => RuleOutcome::zero_with_warning(format!(
                "{}: load has no invoice total yet",
                rule.name
            )),
        },
    };

    if let Some(threshold) = rule.min_threshold {
        if outcome.quantity < threshold {
            outcome.quantity = Decimal::ZERO;
            outcome.amount = Decimal::ZERO;
            return outcome;
        }
    }

    if let Some(cap) = rule.max_cap {
        if outcome.amount > cap {
            outcome.amount = cap;
        }
    }

    outcome
}
