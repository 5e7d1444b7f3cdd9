//! Dashboard figures derived from invoices and quotes.

use std::{collections::BTreeMap, fmt::Display};

use invoicedb_core::{
    clock, models::read::DocumentStatus, totals::round_money, Document, InvoiceStatus, QuoteStatus, RecordId,
};
use prettytable::{row, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    error::ServiceError,
    service::{InvoiceFilter, QuoteFilter, Service},
};

const TOP_CLIENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: u8,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRevenue {
    pub client_id: RecordId,
    pub name: String,
    pub revenue: Decimal,
    pub paid_invoices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub year: i32,
    /// Sum of paid invoice totals.
    pub total_revenue: Decimal,
    /// Sum of sent and overdue invoice totals.
    pub outstanding: Decimal,
    pub overdue: Decimal,
    pub invoice_counts: BTreeMap<String, usize>,
    pub quote_counts: BTreeMap<String, usize>,
    /// Accepted share of decided (accepted or rejected) quotes, in percent.
    /// `None` until a quote has been decided.
    pub quote_acceptance_rate: Option<Decimal>,
    pub client_count: usize,
    pub product_count: usize,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub top_clients: Vec<ClientRevenue>,
}

fn invoice_status(document: &Document) -> Option<InvoiceStatus> {
    match document.status {
        DocumentStatus::Invoice(status) => Some(status),
        DocumentStatus::Quote(_) => None,
    }
}

fn quote_status(document: &Document) -> Option<QuoteStatus> {
    match document.status {
        DocumentStatus::Quote(status) => Some(status),
        DocumentStatus::Invoice(_) => None,
    }
}

/// Summarises the documents as of `now`. Sent invoices already past their due
/// date count as overdue even if their stored status has not been refreshed.
pub fn summarize(
    invoices: &[Document],
    quotes: &[Document],
    client_count: usize,
    product_count: usize,
    year: i32,
    now: i64,
) -> DashboardSummary {
    let mut total_revenue = Decimal::ZERO;
    let mut outstanding = Decimal::ZERO;
    let mut overdue = Decimal::ZERO;
    let mut monthly = [Decimal::ZERO; 12];
    let mut by_client: BTreeMap<RecordId, ClientRevenue> = BTreeMap::new();

    let mut invoice_counts: BTreeMap<String, usize> =
        InvoiceStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    for invoice in invoices {
        let status = match invoice_status(invoice) {
            Some(InvoiceStatus::Sent) if invoice.due_date < now => InvoiceStatus::Overdue,
            Some(status) => status,
            None => continue,
        };
        *invoice_counts.entry(status.as_str().to_string()).or_default() += 1;
        let amount = invoice.totals.total;

        match status {
            InvoiceStatus::Paid => {
                total_revenue = total_revenue.saturating_add(amount);
                if clock::year_of(invoice.issue_date) == year {
                    let month = &mut monthly[usize::from(clock::month_of(invoice.issue_date)) - 1];
                    *month = month.saturating_add(amount);
                }
                let entry = by_client.entry(invoice.client.id).or_insert_with(|| ClientRevenue {
                    client_id: invoice.client.id,
                    name: invoice.client.name.clone(),
                    revenue: Decimal::ZERO,
                    paid_invoices: 0,
                });
                entry.revenue = entry.revenue.saturating_add(amount);
                entry.paid_invoices += 1;
            }
            InvoiceStatus::Overdue => {
                outstanding = outstanding.saturating_add(amount);
                overdue = overdue.saturating_add(amount);
            }
            InvoiceStatus::Sent => outstanding = outstanding.saturating_add(amount),
            InvoiceStatus::Draft => {}
        }
    }

    let mut quote_counts: BTreeMap<String, usize> =
        QuoteStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut accepted = 0usize;
    let mut decided = 0usize;
    for status in quotes.iter().filter_map(quote_status) {
        *quote_counts.entry(status.as_str().to_string()).or_default() += 1;
        match status {
            QuoteStatus::Accepted => {
                accepted += 1;
                decided += 1;
            }
            QuoteStatus::Rejected => decided += 1,
            _ => {}
        }
    }
    let quote_acceptance_rate = (decided > 0)
        .then(|| round_money(Decimal::from(accepted) * Decimal::ONE_HUNDRED / Decimal::from(decided)));

    let mut top_clients: Vec<ClientRevenue> = by_client.into_values().collect();
    top_clients.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.name.cmp(&b.name)));
    top_clients.truncate(TOP_CLIENTS);

    DashboardSummary {
        year,
        total_revenue,
        outstanding,
        overdue,
        invoice_counts,
        quote_counts,
        quote_acceptance_rate,
        client_count,
        product_count,
        monthly_revenue: monthly
            .iter()
            .enumerate()
            .map(|(i, revenue)| MonthlyRevenue { month: i as u8 + 1, revenue: *revenue })
            .collect(),
        top_clients,
    }
}

impl Service {
    /// Summarises the store without writing to it. `year` selects the monthly
    /// breakdown and defaults to the current year.
    pub fn dashboard(&self, year: Option<i32>) -> Result<DashboardSummary, ServiceError> {
        let now = self.now();
        let invoices = self.invoices(&InvoiceFilter::default())?;
        let quotes = self.quotes(&QuoteFilter::default())?;
        let client_count = self.storage().list_clients()?.len();
        let product_count = self.storage().list_products()?.len();
        Ok(summarize(
            &invoices,
            &quotes,
            client_count,
            product_count,
            year.unwrap_or_else(|| clock::year_of(now)),
            now,
        ))
    }
}

impl Display for DashboardSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut overview = Table::new();
        overview.add_row(row!["Revenue", r->self.total_revenue]);
        overview.add_row(row!["Outstanding", r->self.outstanding]);
        overview.add_row(row!["Overdue", r->self.overdue]);
        overview.add_row(row!["Clients", r->self.client_count]);
        overview.add_row(row!["Products", r->self.product_count]);
        let rate = self
            .quote_acceptance_rate
            .map(|r| format!("{}%", r))
            .unwrap_or_else(|| "-".to_string());
        overview.add_row(row!["Quote acceptance", r->rate]);

        let mut statuses = Table::new();
        statuses.add_row(row![b->"Invoices", "", b->"Quotes", ""]);
        let invoice_rows: Vec<_> = self.invoice_counts.iter().collect();
        let quote_rows: Vec<_> = self.quote_counts.iter().collect();
        for i in 0..invoice_rows.len().max(quote_rows.len()) {
            let (is, ic) = invoice_rows.get(i).map(|(s, c)| (s.as_str(), c.to_string())).unwrap_or_default();
            let (qs, qc) = quote_rows.get(i).map(|(s, c)| (s.as_str(), c.to_string())).unwrap_or_default();
            statuses.add_row(row![is, r->ic, qs, r->qc]);
        }

        let mut months = Table::new();
        months.add_row(row![b->format!("Revenue {}", self.year), ""]);
        for m in &self.monthly_revenue {
            months.add_row(row![format!("{:02}", m.month), r->m.revenue]);
        }

        let mut clients = Table::new();
        clients.add_row(row![b->"Top clients", b->"Invoices", b->"Revenue"]);
        for c in &self.top_clients {
            clients.add_row(row![c.name, r->c.paid_invoices, r->c.revenue]);
        }

        write!(f, "\n{}\n{}\n{}\n{}", overview, statuses, months, clients)
    }
}
