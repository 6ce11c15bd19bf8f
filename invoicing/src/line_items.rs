//! Invoice line items built from a pricing breakdown

use crate::calculator::Pricing;
use freight_core::{Invoice, InvoiceLineItem, LineItemType, RateType};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Line items for `invoice` priced as `pricing`.
///
/// FREIGHT is always present; FUEL, ACCESSORIAL and TAX only when non-zero.
/// The TAX item is pass-through and is not part of the invoice total.
pub fn build_line_items(invoice: &Invoice, pricing: &Pricing) -> Vec<InvoiceLineItem> {
    let amounts = &pricing.amounts;
    let item = |item_type, description: String, quantity, rate, amount| InvoiceLineItem {
        id: Uuid::now_v7(),
        org_id: invoice.org_id,
        invoice_id: invoice.id,
        item_type,
        description,
        quantity,
        rate,
        amount,
    };

    let freight_description = match pricing.rate_type {
        Some(RateType::PerMile) => format!("Linehaul {} mi", pricing.base_quantity),
        Some(RateType::FlatRate) => "Linehaul flat rate".to_string(),
        Some(RateType::PerStop) => format!("Linehaul {} stops", pricing.base_quantity),
        None => "Linehaul (no contract lane)".to_string(),
    };

    let mut items = vec![item(
        LineItemType::Freight,
        freight_description,
        pricing.base_quantity,
        pricing.base_rate,
        amounts.subtotal,
    )];

    if amounts.fuel_surcharge > Decimal::ZERO {
        items.push(item(
            LineItemType::Fuel,
            "Fuel surcharge".to_string(),
            Decimal::ONE,
            pricing.fuel_value,
            amounts.fuel_surcharge,
        ));
    }

    if amounts.accessorials_total > Decimal::ZERO {
        items.push(item(
            LineItemType::Accessorial,
            format!("Stop-off charge ({} extra)", pricing.extra_stops),
            Decimal::from(pricing.extra_stops),
            pricing.stop_off_rate,
            amounts.accessorials_total,
        ));
    }

    if amounts.tax_amount > Decimal::ZERO {
        items.push(item(
            LineItemType::Tax,
            "Tax".to_string(),
            Decimal::ONE,
            amounts.tax_amount,
            amounts.tax_amount,
        ));
    }

    items
}
