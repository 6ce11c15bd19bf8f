//! Invoice amount calculation
//!
//! Unbilled invoices (MISSING_DATA, DRAFT) are priced on every read from the
//! current load and lane. Finalized invoices (BILLED, PENDING_PAYMENT, PAID)
//! return their stored snapshot and are never recomputed; VOID returns
//! whatever was last stored.

use crate::Result;
use freight_core::{
    round_money, ContractLane, FuelSurchargeType, Invoice, InvoiceStatus, Load, RateType, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Customer-facing totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    /// Freight base
    pub subtotal: Decimal,
    /// Fuel surcharge
    pub fuel_surcharge: Decimal,
    /// Stop-off charges
    pub accessorials_total: Decimal,
    /// Pass-through tax, reported but not part of the total
    pub tax_amount: Decimal,
    /// Freight base + fuel surcharge + stop-off charges
    pub total_amount: Decimal,
}

impl InvoiceAmounts {
    /// Snapshot stored on an invoice
    pub fn stored(invoice: &Invoice) -> Self {
        Self {
            subtotal: invoice.subtotal,
            fuel_surcharge: invoice.fuel_surcharge,
            accessorials_total: invoice.accessorials_total,
            tax_amount: invoice.tax_amount,
            total_amount: invoice.total_amount,
        }
    }

    /// Copy the computed amounts onto an invoice. The tax is an input set
    /// through the lifecycle and stays as stored.
    pub fn apply_to(&self, invoice: &mut Invoice) {
        invoice.subtotal = self.subtotal;
        invoice.fuel_surcharge = self.fuel_surcharge;
        invoice.accessorials_total = self.accessorials_total;
        invoice.total_amount = self.total_amount;
    }
}

/// Pricing of a load against a lane, with the inputs behind each amount
#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    /// Totals
    pub amounts: InvoiceAmounts,
    /// Rate type of the lane, none without a lane
    pub rate_type: Option<RateType>,
    /// Miles, 1, or stops depending on the rate type
    pub base_quantity: Decimal,
    /// Lane rate
    pub base_rate: Decimal,
    /// Stops beyond the included count
    pub extra_stops: u32,
    /// Charge per extra stop
    pub stop_off_rate: Decimal,
    /// Fuel mode of the lane
    pub fuel_type: Option<FuelSurchargeType>,
    /// Fuel percentage or flat amount
    pub fuel_value: Decimal,
}

impl Pricing {
    /// Pricing without a lane: every amount is zero
    pub fn unpriced() -> Self {
        Self {
            amounts: InvoiceAmounts::default(),
            rate_type: None,
            base_quantity: Decimal::ZERO,
            base_rate: Decimal::ZERO,
            extra_stops: 0,
            stop_off_rate: Decimal::ZERO,
            fuel_type: None,
            fuel_value: Decimal::ZERO,
        }
    }
}

/// Miles billed for a load: measured, else contracted on the load, else on the lane
pub fn billable_miles(load: &Load, lane: &ContractLane) -> Decimal {
    load.effective_miles
        .or(load.contract_miles)
        .or(lane.contract_miles)
        .unwrap_or(Decimal::ZERO)
}

/// Price a load against a lane
///
/// - base: rate × miles (per mile), rate (flat), rate × stops (per stop)
/// - accessorials: max(0, stops − included) × stop-off rate
/// - fuel: base × value / 100 (percentage) or value (flat)
/// - total: base + fuel + accessorials
///
/// `tax_amount` is carried through for reporting and never added to the total.
/// Without a lane every amount, tax included, is zero.
pub fn price_load(
    load: &Load,
    lane: Option<&ContractLane>,
    stop_count: u32,
    tax_amount: Decimal,
) -> Pricing {
    let Some(lane) = lane else {
        return Pricing::unpriced();
    };

    let base_quantity = match lane.rate_type {
        RateType::PerMile => billable_miles(load, lane),
        RateType::FlatRate => Decimal::ONE,
        RateType::PerStop => Decimal::from(stop_count),
    };
    let subtotal = round_money(lane.rate * base_quantity);

    let extra_stops = stop_count.saturating_sub(lane.included_stops);
    let accessorials_total = round_money(Decimal::from(extra_stops) * lane.stop_off_rate);

    let fuel_surcharge = match lane.fuel_surcharge_type {
        Some(FuelSurchargeType::Percentage) => {
            round_money(subtotal * lane.fuel_surcharge_value / Decimal::ONE_HUNDRED)
        }
        Some(FuelSurchargeType::Flat) => round_money(lane.fuel_surcharge_value),
        None => Decimal::ZERO,
    };

    let total_amount = subtotal + fuel_surcharge + accessorials_total;

    Pricing {
        amounts: InvoiceAmounts {
            subtotal,
            fuel_surcharge,
            accessorials_total,
            tax_amount,
            total_amount,
        },
        rate_type: Some(lane.rate_type),
        base_quantity,
        base_rate: lane.rate,
        extra_stops,
        stop_off_rate: lane.stop_off_rate,
        fuel_type: lane.fuel_surcharge_type,
        fuel_value: lane.fuel_surcharge_value,
    }
}

/// Reads invoices and prices them per their status
#[derive(Debug, Clone)]
pub struct InvoiceCalculator {
    storage: Arc<Storage>,
}

impl InvoiceCalculator {
    /// Create calculator
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Amounts for an invoice: frozen snapshot or fresh computation
    pub fn get_invoice_amounts(&self, invoice_id: Uuid) -> Result<InvoiceAmounts> {
        let invoice: Invoice = self.storage.fetch(invoice_id)?;
        self.amounts_for(&invoice)
    }

    /// Amounts for an already-loaded invoice
    pub fn amounts_for(&self, invoice: &Invoice) -> Result<InvoiceAmounts> {
        match invoice.status {
            InvoiceStatus::Billed | InvoiceStatus::PendingPayment | InvoiceStatus::Paid => {
                Ok(InvoiceAmounts::stored(invoice))
            }
            InvoiceStatus::Void => Ok(InvoiceAmounts::stored(invoice)),
            InvoiceStatus::MissingData | InvoiceStatus::Draft => {
                Ok(self.price_invoice(invoice)?.amounts)
            }
        }
    }

    /// Fresh pricing from the current load and lane, regardless of status
    pub fn price_invoice(&self, invoice: &Invoice) -> Result<Pricing> {
        let load: Load = self.storage.fetch(invoice.load_id)?;

        let lane_id = invoice.contract_lane_id.or(load.contract_lane_id);
        let lane = match lane_id {
            Some(id) => {
                let lane = self.storage.get::<ContractLane>(id)?;
                if lane.is_none() {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        lane_id = %id,
                        "Linked lane no longer exists; pricing at zero"
                    );
                }
                lane
            }
            None => None,
        };

        let stop_count = self.storage.stops_for_load(load.id)?.len() as u32;
        Ok(price_load(&load, lane.as_ref(), stop_count, invoice.tax_amount))
    }

    /// Invoice total of a load, for percentage pay rules.
    ///
    /// `None` when the load has no invoice, the invoice is void, or its total
    /// is zero (nothing to take a percentage of).
    pub fn load_invoice_total(&self, load_id: Uuid) -> Result<Option<Decimal>> {
        let Some(invoice) = self.storage.invoice_for_load(load_id)? else {
            return Ok(None);
        };
        if invoice.status == InvoiceStatus::Void {
            return Ok(None);
        }
        let total = self.amounts_for(&invoice)?.total_amount;
        Ok((total > Decimal::ZERO).then_some(total))
    }
}
