//! Document totals: subtotal, VAT, discount, custom taxes and grand total.
//!
//! Totals are always derived from line and tax rows, never stored. Every
//! component is rounded to cents and the grand total is computed from the
//! rounded components, so `total == subtotal + vat - discount + custom_taxes`
//! holds exactly.

use std::fmt::Display;

use prettytable::{row, Table};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::models::{write::LineItemCommand, Discount, DiscountType, LineItem, RecordId, Tax, TaxKind};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("document amounts are too large to total")]
pub struct TotalsOverflow;

/// Anything that can sit on a document line.
pub trait Priced {
    fn quantity(&self) -> Decimal;
    fn unit_price(&self) -> Decimal;
    fn vat_rate(&self) -> Decimal;
}

impl Priced for LineItem {
    fn quantity(&self) -> Decimal {
        self.quantity
    }
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }
    fn vat_rate(&self) -> Decimal {
        self.vat_rate
    }
}

impl Priced for LineItemCommand {
    fn quantity(&self) -> Decimal {
        self.quantity
    }
    fn unit_price(&self) -> Decimal {
        self.unit_price.unwrap_or_default()
    }
    fn vat_rate(&self) -> Decimal {
        self.vat_rate.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineTotals {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxLine {
    pub tax_id: RecordId,
    pub name: String,
    pub rate: Decimal,
    pub kind: TaxKind,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub discount: Decimal,
    pub custom_taxes: Decimal,
    pub total: Decimal,
    pub lines: Vec<LineTotals>,
    pub taxes: Vec<TaxLine>,
}

impl DocumentTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            vat: Decimal::ZERO,
            discount: Decimal::ZERO,
            custom_taxes: Decimal::ZERO,
            total: Decimal::ZERO,
            lines: Vec::new(),
            taxes: Vec::new(),
        }
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal, TotalsOverflow> {
    a.checked_add(b).ok_or(TotalsOverflow)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, TotalsOverflow> {
    a.checked_mul(b).ok_or(TotalsOverflow)
}

/// `rate` percent of `amount`, unrounded.
fn percent_of(amount: Decimal, rate: Decimal) -> Result<Decimal, TotalsOverflow> {
    Ok(mul(amount, rate)? / HUNDRED)
}

pub fn line_totals<T: Priced>(item: &T) -> Result<LineTotals, TotalsOverflow> {
    let subtotal = mul(item.quantity(), item.unit_price())?;
    let vat = percent_of(subtotal, item.vat_rate())?;
    Ok(LineTotals {
        subtotal: round_money(subtotal),
        vat: round_money(vat),
        total: round_money(add(subtotal, vat)?),
    })
}

/// Discount amount for the given subtotal. Percentages are clamped to
/// `[0, 100]` and fixed amounts to `[0, subtotal]`.
pub fn discount_amount(subtotal: Decimal, discount: Option<&Discount>) -> Result<Decimal, TotalsOverflow> {
    let Some(discount) = discount else {
        return Ok(Decimal::ZERO);
    };
    let amount = match discount.kind {
        DiscountType::Percentage => percent_of(subtotal, discount.value.clamp(Decimal::ZERO, HUNDRED))?,
        DiscountType::Fixed => discount.value.max(Decimal::ZERO),
    };
    Ok(round_money(amount.min(subtotal.max(Decimal::ZERO))))
}

pub fn tax_amount(subtotal: Decimal, tax: &Tax) -> Result<Decimal, TotalsOverflow> {
    match tax.kind {
        TaxKind::Percentage => Ok(round_money(percent_of(subtotal, tax.rate)?)),
        TaxKind::Fixed => Ok(round_money(tax.rate)),
    }
}

/// Totals of a document. Fails instead of panicking when the amounts do not
/// fit in a `Decimal`.
pub fn compute<T: Priced>(items: &[T], discount: Option<&Discount>, taxes: &[Tax]) -> Result<DocumentTotals, TotalsOverflow> {
    let mut raw_subtotal = Decimal::ZERO;
    let mut raw_vat = Decimal::ZERO;
    let mut lines = Vec::with_capacity(items.len());

    for item in items {
        let line_subtotal = mul(item.quantity(), item.unit_price())?;
        raw_subtotal = add(raw_subtotal, line_subtotal)?;
        raw_vat = add(raw_vat, percent_of(line_subtotal, item.vat_rate())?)?;
        lines.push(line_totals(item)?);
    }

    let subtotal = round_money(raw_subtotal);
    let vat = round_money(raw_vat);
    let discount = discount_amount(subtotal, discount)?;

    let mut custom_taxes = Decimal::ZERO;
    let mut tax_lines = Vec::with_capacity(taxes.len());
    for tax in taxes {
        let amount = tax_amount(subtotal, tax)?;
        custom_taxes = add(custom_taxes, amount)?;
        tax_lines.push(TaxLine {
            tax_id: tax.id,
            name: tax.name.clone(),
            rate: tax.rate,
            kind: tax.kind,
            amount,
        });
    }

    // discount <= subtotal, so the subtraction cannot overflow
    let total = add(add(subtotal, vat)? - discount, custom_taxes)?;
    Ok(DocumentTotals {
        subtotal,
        vat,
        discount,
        custom_taxes,
        total,
        lines,
        taxes: tax_lines,
    })
}

impl Display for DocumentTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["Subtotal", r->self.subtotal]);
        table.add_row(row!["VAT", r->self.vat]);
        if !self.discount.is_zero() {
            table.add_row(row!["Discount", r->format!("-{}", self.discount)]);
        }
        for tax in &self.taxes {
            table.add_row(row![tax.name, r->tax.amount]);
        }
        table.add_empty_row();
        table.add_row(row![b->"Total", rb->self.total]);

        write!(f, "\n{}\n", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: Decimal, unit_price: Decimal, vat_rate: Decimal) -> LineItemCommand {
        LineItemCommand {
            product_id: None,
            description: "Widget".to_string(),
            quantity,
            unit_price: Some(unit_price),
            vat_rate: Some(vat_rate),
        }
    }

    fn tax(id: RecordId, rate: Decimal, kind: TaxKind) -> Tax {
        Tax {
            id,
            name: format!("tax-{}", id),
            rate,
            kind,
            created_at: 0,
        }
    }

    #[test]
    fn test_basic_totals() {
        let items = vec![
            item(dec!(2), dec!(50), dec!(20)),
            item(dec!(1), dec!(100), dec!(10)),
        ];
        let totals = compute(&items, None, &[]).unwrap();
        assert_eq!(totals.subtotal, dec!(200));
        assert_eq!(totals.vat, dec!(30));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.total, dec!(230));
        assert_eq!(totals.lines[0].total, dec!(120));
        assert_eq!(totals.lines[1].vat, dec!(10));
    }

    #[test]
    fn test_percentage_discount_and_custom_taxes() {
        let items = vec![item(dec!(4), dec!(25), dec!(20))];
        let taxes = vec![tax(1, dec!(5), TaxKind::Percentage), tax(2, dec!(2.50), TaxKind::Fixed)];
        let totals = compute(&items, Some(&Discount::percentage(dec!(10))), &taxes).unwrap();

        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.vat, dec!(20));
        assert_eq!(totals.discount, dec!(10));
        assert_eq!(totals.taxes[0].amount, dec!(5));
        assert_eq!(totals.taxes[1].amount, dec!(2.50));
        assert_eq!(totals.custom_taxes, dec!(7.50));
        assert_eq!(totals.total, dec!(117.50));
    }

    #[test]
    fn test_fixed_discount_clamped_to_subtotal() {
        let items = vec![item(dec!(1), dec!(40), dec!(0))];
        let totals = compute(&items, Some(&Discount::fixed(dec!(55))), &[]).unwrap();
        assert_eq!(totals.discount, dec!(40));
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_rounding_to_cents() {
        let items = vec![item(dec!(3), dec!(0.333), dec!(19))];
        let totals = compute(&items, Some(&Discount::percentage(dec!(33.333))), &[]).unwrap();
        assert_eq!(totals.subtotal, dec!(1.00));
        assert_eq!(totals.vat, dec!(0.19));
        assert_eq!(totals.discount, dec!(0.33));
        assert_eq!(totals.total, dec!(0.86));
    }

    #[test]
    fn test_empty_document() {
        let totals = DocumentTotals::zero();
        assert_eq!(totals.total, Decimal::ZERO);
        assert!(totals.lines.is_empty());
    }

    #[test]
    fn test_total_identity_holds() {
        let quantities = [dec!(0), dec!(1), dec!(2.5), dec!(7), dec!(13.125)];
        let prices = [dec!(0), dec!(0.99), dec!(10), dec!(1234.567)];
        let vat_rates = [dec!(0), dec!(5.5), dec!(20), dec!(100)];
        let discount_rates = [dec!(0), dec!(12.5), dec!(50), dec!(100)];
        let taxes = vec![tax(1, dec!(3.7), TaxKind::Percentage), tax(2, dec!(1.25), TaxKind::Fixed)];

        for q in quantities {
            for p in prices {
                for v in vat_rates {
                    for d in discount_rates {
                        let items = vec![item(q, p, v), item(p, q, v)];
                        let discount = Discount::percentage(d);
                        let t = compute(&items, Some(&discount), &taxes).unwrap();
                        assert_eq!(t.total, t.subtotal + t.vat - t.discount + t.custom_taxes);
                        assert!(t.discount <= t.subtotal);
                        assert!(t.discount >= Decimal::ZERO);
                    }
                }
            }
        }
    }

    #[test]
    fn test_overflow_is_an_error() {
        let items = vec![item(Decimal::MAX, dec!(2), dec!(0))];
        assert_eq!(compute(&items, None, &[]), Err(TotalsOverflow));

        let items = vec![item(dec!(1), Decimal::MAX, dec!(0)); 2];
        assert_eq!(compute(&items, None, &[]), Err(TotalsOverflow));

        let items = vec![item(dec!(1), Decimal::MAX / dec!(10), dec!(20))];
        assert_eq!(compute(&items, None, &[]), Err(TotalsOverflow));

        let items = vec![item(dec!(1000000000000), dec!(1000000000000), dec!(20))];
        assert!(compute(&items, None, &[]).is_ok());
    }

    #[test]
    fn test_display_lists_taxes() {
        let items = vec![item(dec!(1), dec!(10), dec!(0))];
        let taxes = vec![tax(7, dec!(10), TaxKind::Percentage)];
        let rendered = compute(&items, None, &taxes).unwrap().to_string();
        assert!(rendered.contains("tax-7"));
        assert!(rendered.contains("Total"));
    }
}
