use invoicedb_core::{
    models::write::{DocumentCommand, LineItemCommand},
    Discount, DiscountType,
};
use rust_decimal::Decimal;

use crate::{error::ServiceError, settings::AppSettings};

const MAX_AMOUNT_UNITS: u64 = 1_000_000_000_000;

/// Largest quantity, price or fixed amount accepted on input (10^12).
pub const MAX_AMOUNT: Decimal =
    Decimal::from_parts(MAX_AMOUNT_UNITS as u32, (MAX_AMOUNT_UNITS >> 32) as u32, 0, false, 0);

/// Longest payment term or quote validity, in days.
pub const MAX_DAYS: i64 = 3650;

pub(super) fn require_text(value: &str, field: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub(super) fn non_negative(value: Decimal, field: &str) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::validation(format!("{} cannot be negative", field)));
    }
    Ok(())
}

/// A quantity or money amount in `[0, MAX_AMOUNT]`.
pub(super) fn amount(value: Decimal, field: &str) -> Result<(), ServiceError> {
    non_negative(value, field)?;
    if value > MAX_AMOUNT {
        return Err(ServiceError::validation(format!("{} cannot exceed {}", field, MAX_AMOUNT)));
    }
    Ok(())
}

/// A percentage in `[0, 100]`.
pub(super) fn rate(value: Decimal, field: &str) -> Result<(), ServiceError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::validation(format!("{} must be between 0 and 100", field)));
    }
    Ok(())
}

pub(super) fn days(value: i64, field: &str) -> Result<(), ServiceError> {
    if !(0..=MAX_DAYS).contains(&value) {
        return Err(ServiceError::validation(format!("{} must be between 0 and {} days", field, MAX_DAYS)));
    }
    Ok(())
}

pub(super) fn discount(discount: Option<&Discount>) -> Result<(), ServiceError> {
    match discount {
        Some(d) if d.kind == DiscountType::Percentage => rate(d.value, "discount"),
        Some(d) => amount(d.value, "discount"),
        None => Ok(()),
    }
}

/// Checks a line after product defaults have been applied.
pub(super) fn line_item(item: &LineItemCommand, index: usize) -> Result<(), ServiceError> {
    let line = index + 1;
    require_text(&item.description, &format!("description of line {}", line))?;
    amount(item.quantity, &format!("quantity of line {}", line))?;
    let unit_price = item
        .unit_price
        .ok_or_else(|| ServiceError::validation(format!("unit price of line {} is required", line)))?;
    amount(unit_price, &format!("unit price of line {}", line))?;
    rate(item.vat_rate.unwrap_or_default(), &format!("VAT rate of line {}", line))
}

/// Shape checks that do not need the store.
pub(super) fn document(command: &DocumentCommand) -> Result<(), ServiceError> {
    if command.client_id <= 0 {
        return Err(ServiceError::validation("a client must be selected"));
    }
    if command.due_date.map_or(false, |due| due < command.issue_date) {
        return Err(ServiceError::validation("due date cannot be before the issue date"));
    }
    discount(command.discount.as_ref())?;
    for (index, item) in command.items.iter().enumerate() {
        line_item(item, index)?;
    }
    Ok(())
}

pub(super) fn settings(settings: &AppSettings) -> Result<(), ServiceError> {
    require_text(&settings.company_name, "company name")?;
    require_text(&settings.invoice_prefix, "invoice prefix")?;
    require_text(&settings.quote_prefix, "quote prefix")?;
    rate(settings.default_vat_rate, "default VAT rate")?;
    days(settings.default_due_days, "default payment term")?;
    days(settings.quote_validity_days, "quote validity")?;
    // Without the year in the number a reset would reissue last year's numbers.
    if settings.reset_yearly && !settings.include_year {
        return Err(ServiceError::validation(
            "yearly numbering reset requires the year in document numbers",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn command() -> DocumentCommand {
        DocumentCommand {
            client_id: 1,
            issue_date: 1_000,
            due_date: Some(2_000),
            items: vec![LineItemCommand {
                product_id: None,
                description: "Logo".to_string(),
                quantity: dec!(1),
                unit_price: Some(dec!(300)),
                vat_rate: Some(dec!(20)),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_document() {
        assert!(document(&command()).is_ok());
    }

    #[test]
    fn test_client_required() {
        let mut cmd = command();
        cmd.client_id = 0;
        let err = document(&cmd).unwrap_err();
        assert_eq!(err.to_string(), "a client must be selected");
    }

    #[test]
    fn test_rejects_bad_lines_and_discounts() {
        let mut cmd = command();
        cmd.items[0].quantity = dec!(-1);
        assert!(document(&cmd).is_err());

        let mut cmd = command();
        cmd.items[0].vat_rate = Some(dec!(120));
        assert!(document(&cmd).is_err());

        let mut cmd = command();
        cmd.discount = Some(Discount::percentage(dec!(101)));
        assert!(document(&cmd).is_err());

        let mut cmd = command();
        cmd.discount = Some(Discount::fixed(dec!(1000)));
        assert!(document(&cmd).is_ok());
    }

    #[test]
    fn test_amounts_are_bounded() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000));

        let mut cmd = command();
        cmd.items[0].quantity = MAX_AMOUNT;
        assert!(document(&cmd).is_ok());

        let mut cmd = command();
        cmd.items[0].quantity = Decimal::MAX;
        let err = document(&cmd).unwrap_err();
        assert_eq!(err.to_string(), "quantity of line 1 cannot exceed 1000000000000");

        let mut cmd = command();
        cmd.items[0].unit_price = Some(MAX_AMOUNT + dec!(0.01));
        assert!(document(&cmd).is_err());

        let mut cmd = command();
        cmd.items[0].unit_price = None;
        assert_eq!(document(&cmd).unwrap_err().to_string(), "unit price of line 1 is required");

        let mut cmd = command();
        cmd.discount = Some(Discount::fixed(Decimal::MAX));
        assert!(document(&cmd).is_err());
    }

    #[test]
    fn test_settings_bounds() {
        assert!(settings(&AppSettings::default()).is_ok());

        let long_term = AppSettings { default_due_days: 1_000_000_000_000, ..Default::default() };
        assert!(settings(&long_term).is_err());

        let negative = AppSettings { quote_validity_days: -1, ..Default::default() };
        assert!(settings(&negative).is_err());

        let edge = AppSettings { default_due_days: MAX_DAYS, quote_validity_days: 0, ..Default::default() };
        assert!(settings(&edge).is_ok());

        let reset_without_year = AppSettings { include_year: false, reset_yearly: true, ..Default::default() };
        let err = settings(&reset_without_year).unwrap_err();
        assert_eq!(err.to_string(), "yearly numbering reset requires the year in document numbers");

        let running = AppSettings { include_year: false, reset_yearly: false, ..Default::default() };
        assert!(settings(&running).is_ok());
    }

    #[test]
    fn test_due_before_issue() {
        let mut cmd = command();
        cmd.due_date = Some(500);
        assert!(document(&cmd).is_err());
    }

    #[test]
    fn test_blank_name() {
        assert!(require_text("   ", "name").is_err());
        assert!(require_text("Acme", "name").is_ok());
    }
}
