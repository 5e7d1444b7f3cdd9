//! Typed view over the key-value preference store.

use std::{collections::BTreeMap, str::FromStr};

use invoicedb_core::{DocumentKind, NumberingScheme, StorageBackend, StorageError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const COMPANY_NAME: &str = "company.name";
const COMPANY_ADDRESS: &str = "company.address";
const COMPANY_EMAIL: &str = "company.email";
const COMPANY_PHONE: &str = "company.phone";
const COMPANY_TAX_NUMBER: &str = "company.tax_number";
const CURRENCY_SYMBOL: &str = "currency.symbol";
const INVOICE_PREFIX: &str = "numbering.invoice_prefix";
const QUOTE_PREFIX: &str = "numbering.quote_prefix";
const INCLUDE_YEAR: &str = "numbering.include_year";
const RESET_YEARLY: &str = "numbering.reset_yearly";
const DEFAULT_DUE_DAYS: &str = "documents.default_due_days";
const QUOTE_VALIDITY_DAYS: &str = "documents.quote_validity_days";
const DEFAULT_VAT_RATE: &str = "documents.default_vat_rate";
const FOOTER: &str = "documents.footer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub company_name: String,
    pub company_address: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub company_tax_number: Option<String>,
    pub currency_symbol: String,
    pub invoice_prefix: String,
    pub quote_prefix: String,
    pub include_year: bool,
    pub reset_yearly: bool,
    pub default_due_days: i64,
    pub quote_validity_days: i64,
    pub default_vat_rate: Decimal,
    /// Printed at the bottom of exported documents.
    pub footer: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            company_name: "My Company".to_string(),
            company_address: None,
            company_email: None,
            company_phone: None,
            company_tax_number: None,
            currency_symbol: "€".to_string(),
            invoice_prefix: "INV".to_string(),
            quote_prefix: "QUO".to_string(),
            include_year: true,
            reset_yearly: true,
            default_due_days: 30,
            quote_validity_days: 30,
            default_vat_rate: Decimal::from(20),
            footer: None,
        }
    }
}

fn parsed<T: FromStr>(values: &BTreeMap<String, String>, key: &str, default: T) -> T {
    match values.get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring invalid stored setting");
            default
        }),
        None => default,
    }
}

fn text(values: &BTreeMap<String, String>, key: &str) -> Option<String> {
    values.get(key).filter(|v| !v.is_empty()).cloned()
}

impl AppSettings {
    pub fn load(storage: &dyn StorageBackend) -> Result<Self, StorageError> {
        let values = storage.list_settings()?;
        let defaults = AppSettings::default();

        Ok(Self {
            company_name: text(&values, COMPANY_NAME).unwrap_or(defaults.company_name),
            company_address: text(&values, COMPANY_ADDRESS),
            company_email: text(&values, COMPANY_EMAIL),
            company_phone: text(&values, COMPANY_PHONE),
            company_tax_number: text(&values, COMPANY_TAX_NUMBER),
            currency_symbol: values.get(CURRENCY_SYMBOL).cloned().unwrap_or(defaults.currency_symbol),
            invoice_prefix: text(&values, INVOICE_PREFIX).unwrap_or(defaults.invoice_prefix),
            quote_prefix: text(&values, QUOTE_PREFIX).unwrap_or(defaults.quote_prefix),
            include_year: parsed(&values, INCLUDE_YEAR, defaults.include_year),
            reset_yearly: parsed(&values, RESET_YEARLY, defaults.reset_yearly),
            default_due_days: parsed(&values, DEFAULT_DUE_DAYS, defaults.default_due_days),
            quote_validity_days: parsed(&values, QUOTE_VALIDITY_DAYS, defaults.quote_validity_days),
            default_vat_rate: parsed(&values, DEFAULT_VAT_RATE, defaults.default_vat_rate),
            footer: text(&values, FOOTER),
        })
    }

    pub fn save(&self, storage: &dyn StorageBackend) -> Result<(), StorageError> {
        let optional = |v: &Option<String>| v.clone().unwrap_or_default();
        let entries: [(&str, String); 14] = [
            (COMPANY_NAME, self.company_name.clone()),
            (COMPANY_ADDRESS, optional(&self.company_address)),
            (COMPANY_EMAIL, optional(&self.company_email)),
            (COMPANY_PHONE, optional(&self.company_phone)),
            (COMPANY_TAX_NUMBER, optional(&self.company_tax_number)),
            (CURRENCY_SYMBOL, self.currency_symbol.clone()),
            (INVOICE_PREFIX, self.invoice_prefix.clone()),
            (QUOTE_PREFIX, self.quote_prefix.clone()),
            (INCLUDE_YEAR, self.include_year.to_string()),
            (RESET_YEARLY, self.reset_yearly.to_string()),
            (DEFAULT_DUE_DAYS, self.default_due_days.to_string()),
            (QUOTE_VALIDITY_DAYS, self.quote_validity_days.to_string()),
            (DEFAULT_VAT_RATE, self.default_vat_rate.to_string()),
            (FOOTER, optional(&self.footer)),
        ];
        for (key, value) in entries {
            storage.set_setting(key, &value)?;
        }
        Ok(())
    }

    /// Yearly reset only applies when numbers carry the year; otherwise the
    /// counter keeps running so numbers stay unique.
    pub fn numbering_scheme(&self, kind: DocumentKind) -> NumberingScheme {
        let prefix = match kind {
            DocumentKind::Invoice => &self.invoice_prefix,
            DocumentKind::Quote => &self.quote_prefix,
        };
        NumberingScheme::new(prefix.clone(), self.include_year, self.reset_yearly && self.include_year)
    }
}
