use std::collections::HashMap;

use invoicedb_core::{
    clock,
    models::write::{DocumentCommand, LineItemCommand},
    totals, Client, Document, DocumentKind, Invoice, InvoiceStatus, LineItem, Quote, QuoteStatus, RecordId, Tax,
};
use metrics::counter;
use serde::Deserialize;

use super::{referenced, validation, Service};
use crate::{error::ServiceError, settings::AppSettings};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub client_id: Option<RecordId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteFilter {
    #[serde(default)]
    pub status: Option<QuoteStatus>,
    #[serde(default)]
    pub client_id: Option<RecordId>,
}

fn line_commands(items: &[LineItem]) -> Vec<LineItemCommand> {
    items
        .iter()
        .map(|item| LineItemCommand {
            product_id: item.product_id,
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: Some(item.unit_price),
            vat_rate: Some(item.vat_rate),
        })
        .collect()
}

fn due_after(issue_date: i64, days: i64) -> Result<i64, ServiceError> {
    clock::add_days(issue_date, days).ok_or_else(|| ServiceError::validation("due date is out of range"))
}

/// Payment term for invoices, validity for quotes.
fn default_term(kind: DocumentKind, settings: &AppSettings) -> i64 {
    match kind {
        DocumentKind::Invoice => settings.default_due_days,
        DocumentKind::Quote => settings.quote_validity_days,
    }
}

impl Service {
    /// Completes `command` from the referenced products and the settings, then
    /// checks it against the store. Returns the command to persist.
    fn prepare_document(
        &self,
        kind: DocumentKind,
        command: &DocumentCommand,
        settings: &AppSettings,
    ) -> Result<DocumentCommand, ServiceError> {
        let mut prepared = command.clone();
        for item in &mut prepared.items {
            if let Some(product_id) = item.product_id {
                let product = self.storage.get_product(product_id).map_err(referenced)?;
                if item.description.trim().is_empty() {
                    item.description = product.name;
                }
                item.unit_price = item.unit_price.or(Some(product.unit_price));
                item.vat_rate = item.vat_rate.or(Some(product.vat_rate));
            }
            item.vat_rate = item.vat_rate.or(Some(settings.default_vat_rate));
        }
        if prepared.due_date.is_none() {
            prepared.due_date = Some(due_after(prepared.issue_date, default_term(kind, settings))?);
        }

        validation::document(&prepared)?;
        self.storage.get_client(prepared.client_id).map_err(referenced)?;
        let taxes = prepared
            .tax_ids
            .iter()
            .map(|tax_id| self.storage.get_tax(*tax_id).map_err(referenced))
            .collect::<Result<Vec<Tax>, _>>()?;
        totals::compute(&prepared.items, prepared.discount.as_ref(), &taxes)
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        Ok(prepared)
    }

    fn clients_by_id(&self) -> Result<HashMap<RecordId, Client>, ServiceError> {
        Ok(self.storage.list_clients()?.into_iter().map(|c| (c.id, c)).collect())
    }

    fn load_invoice(&self, invoice: Invoice, client: Client) -> Result<Document, ServiceError> {
        let items = self.storage.invoice_items(invoice.id)?;
        let taxes = self.storage.invoice_taxes(invoice.id)?;
        Ok(Document::from_invoice(invoice, client, items, taxes)?)
    }

    fn load_quote(&self, quote: Quote, client: Client) -> Result<Document, ServiceError> {
        let items = self.storage.quote_items(quote.id)?;
        let taxes = self.storage.quote_taxes(quote.id)?;
        Ok(Document::from_quote(quote, client, items, taxes)?)
    }

    // Invoices

    pub fn create_invoice(&self, command: &DocumentCommand) -> Result<Document, ServiceError> {
        let id = self.in_transaction(|| {
            let settings = self.settings()?;
            let prepared = self.prepare_document(DocumentKind::Invoice, command, &settings)?;
            self.insert_invoice(&prepared, None, &settings)
        })?;
        self.invoice(id)
    }

    /// Numbers and stores a new draft invoice. Callers hold the transaction.
    fn insert_invoice(
        &self,
        command: &DocumentCommand,
        quote_id: Option<RecordId>,
        settings: &AppSettings,
    ) -> Result<RecordId, ServiceError> {
        let number = self.next_number(DocumentKind::Invoice, settings)?;
        let id = self.storage.create_invoice(&number, command, quote_id, self.now())?;
        counter!("invoicedb_documents_created_total", 1, "kind" => "invoice");
        tracing::info!(invoice_id = id, %number, client_id = command.client_id, "Invoice created");
        Ok(id)
    }

    pub fn update_invoice(&self, id: RecordId, command: &DocumentCommand) -> Result<Document, ServiceError> {
        self.in_transaction(|| {
            self.storage.get_invoice(id)?;
            let settings = self.settings()?;
            let prepared = self.prepare_document(DocumentKind::Invoice, command, &settings)?;
            Ok(self.storage.update_invoice(id, &prepared, self.now())?)
        })?;
        tracing::info!(invoice_id = id, "Invoice updated");
        self.invoice(id)
    }

    pub fn delete_invoice(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_invoice(id)?))?;
        tracing::info!(invoice_id = id, "Invoice deleted");
        Ok(())
    }

    pub fn invoice(&self, id: RecordId) -> Result<Document, ServiceError> {
        let invoice = self.storage.get_invoice(id)?;
        let client = self.storage.get_client(invoice.client_id)?;
        self.load_invoice(invoice, client)
    }

    /// Invoices newest first, optionally narrowed by status or client.
    pub fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Document>, ServiceError> {
        let mut clients = self.clients_by_id()?;
        let mut documents = Vec::new();
        for invoice in self.storage.list_invoices()? {
            if filter.status.map_or(false, |s| s != invoice.status)
                || filter.client_id.map_or(false, |c| c != invoice.client_id)
            {
                continue;
            }
            let client = match clients.get(&invoice.client_id) {
                Some(client) => client.clone(),
                None => {
                    let client = self.storage.get_client(invoice.client_id)?;
                    clients.insert(client.id, client.clone());
                    client
                }
            };
            documents.push(self.load_invoice(invoice, client)?);
        }
        Ok(documents)
    }

    pub fn set_invoice_status(&self, id: RecordId, status: InvoiceStatus) -> Result<Document, ServiceError> {
        self.write(|| {
            let invoice = self.storage.get_invoice(id)?;
            if invoice.status == status {
                return Ok(());
            }
            if !invoice.status.can_transition_to(status) {
                return Err(ServiceError::InvalidTransition {
                    entity: "invoice",
                    from: invoice.status.as_str(),
                    to: status.as_str(),
                });
            }
            self.storage.set_invoice_status(id, status, self.now())?;
            tracing::info!(invoice_id = id, from = %invoice.status, to = %status, "Invoice status changed");
            Ok(())
        })?;
        self.invoice(id)
    }

    /// Copies an invoice into a new draft dated today with a fresh number.
    pub fn duplicate_invoice(&self, id: RecordId) -> Result<Document, ServiceError> {
        let new_id = self.in_transaction(|| {
            let source = self.storage.get_invoice(id)?;
            let items = self.storage.invoice_items(id)?;
            let taxes = self.storage.invoice_taxes(id)?;
            let settings = self.settings()?;
            let now = self.now();

            let command = DocumentCommand {
                client_id: source.client_id,
                issue_date: now,
                due_date: Some(due_after(now, settings.default_due_days)?),
                discount: source.discount,
                notes: source.notes,
                items: line_commands(&items),
                tax_ids: taxes.iter().map(|t| t.id).collect(),
            };
            self.insert_invoice(&command, None, &settings)
        })?;
        tracing::info!(source_id = id, invoice_id = new_id, "Invoice duplicated");
        self.invoice(new_id)
    }

    /// Moves sent invoices whose due date is before `now` to overdue and
    /// returns their ids.
    pub fn refresh_overdue(&self, now: i64) -> Result<Vec<RecordId>, ServiceError> {
        let late = self.in_transaction(|| {
            let late: Vec<RecordId> = self
                .storage
                .list_invoices()?
                .into_iter()
                .filter(|invoice| invoice.status == InvoiceStatus::Sent && invoice.due_date < now)
                .map(|invoice| invoice.id)
                .collect();
            for id in &late {
                self.storage.set_invoice_status(*id, InvoiceStatus::Overdue, now)?;
            }
            Ok(late)
        })?;
        if !late.is_empty() {
            tracing::info!(count = late.len(), "Marked invoices overdue");
        }
        Ok(late)
    }

    // Quotes

    pub fn create_quote(&self, command: &DocumentCommand) -> Result<Document, ServiceError> {
        let id = self.in_transaction(|| {
            let settings = self.settings()?;
            let prepared = self.prepare_document(DocumentKind::Quote, command, &settings)?;
            let number = self.next_number(DocumentKind::Quote, &settings)?;
            let id = self.storage.create_quote(&number, &prepared, self.now())?;
            counter!("invoicedb_documents_created_total", 1, "kind" => "quote");
            tracing::info!(quote_id = id, %number, client_id = prepared.client_id, "Quote created");
            Ok(id)
        })?;
        self.quote(id)
    }

    pub fn update_quote(&self, id: RecordId, command: &DocumentCommand) -> Result<Document, ServiceError> {
        self.in_transaction(|| {
            self.storage.get_quote(id)?;
            let settings = self.settings()?;
            let prepared = self.prepare_document(DocumentKind::Quote, command, &settings)?;
            Ok(self.storage.update_quote(id, &prepared, self.now())?)
        })?;
        tracing::info!(quote_id = id, "Quote updated");
        self.quote(id)
    }

    /// Invoices converted from this quote keep existing and lose the link.
    pub fn delete_quote(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_quote(id)?))?;
        tracing::info!(quote_id = id, "Quote deleted");
        Ok(())
    }

    pub fn quote(&self, id: RecordId) -> Result<Document, ServiceError> {
        let quote = self.storage.get_quote(id)?;
        let client = self.storage.get_client(quote.client_id)?;
        self.load_quote(quote, client)
    }

    pub fn quotes(&self, filter: &QuoteFilter) -> Result<Vec<Document>, ServiceError> {
        let clients = self.clients_by_id()?;
        let mut documents = Vec::new();
        for quote in self.storage.list_quotes()? {
            if filter.status.map_or(false, |s| s != quote.status)
                || filter.client_id.map_or(false, |c| c != quote.client_id)
            {
                continue;
            }
            let client = match clients.get(&quote.client_id) {
                Some(client) => client.clone(),
                None => self.storage.get_client(quote.client_id)?,
            };
            documents.push(self.load_quote(quote, client)?);
        }
        Ok(documents)
    }

    pub fn set_quote_status(&self, id: RecordId, status: QuoteStatus) -> Result<Document, ServiceError> {
        self.write(|| {
            let quote = self.storage.get_quote(id)?;
            if quote.status == status {
                return Ok(());
            }
            if !quote.status.can_transition_to(status) {
                return Err(ServiceError::InvalidTransition {
                    entity: "quote",
                    from: quote.status.as_str(),
                    to: status.as_str(),
                });
            }
            self.storage.set_quote_status(id, status, self.now())?;
            tracing::info!(quote_id = id, from = %quote.status, to = %status, "Quote status changed");
            Ok(())
        })?;
        self.quote(id)
    }

    /// Issues an invoice from a quote and marks the quote accepted. Returns
    /// the new invoice.
    pub fn convert_quote(&self, id: RecordId) -> Result<Document, ServiceError> {
        let invoice_id = self.in_transaction(|| {
            let quote = self.storage.get_quote(id)?;
            if quote.status == QuoteStatus::Rejected {
                return Err(ServiceError::validation(format!(
                    "quote {} was rejected and cannot be converted",
                    quote.number
                )));
            }
            if let Some(existing) = self.storage.list_invoices()?.iter().find(|i| i.quote_id == Some(id)) {
                return Err(ServiceError::validation(format!(
                    "quote {} was already converted to invoice {}",
                    quote.number, existing.number
                )));
            }

            let items = self.storage.quote_items(id)?;
            let taxes = self.storage.quote_taxes(id)?;
            let settings = self.settings()?;
            let now = self.now();
            let command = DocumentCommand {
                client_id: quote.client_id,
                issue_date: now,
                due_date: Some(due_after(now, settings.default_due_days)?),
                discount: quote.discount,
                notes: quote.notes.clone(),
                items: line_commands(&items),
                tax_ids: taxes.iter().map(|t| t.id).collect(),
            };

            let invoice_id = self.insert_invoice(&command, Some(id), &settings)?;
            self.storage.set_quote_status(id, QuoteStatus::Accepted, now)?;
            Ok(invoice_id)
        })?;
        tracing::info!(quote_id = id, invoice_id, "Quote converted to invoice");
        self.invoice(invoice_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use invoicedb_core::{
        models::write::{ClientCommand, ProductCommand},
        Discount, StorageError,
    };
    use invoicedb_memory::InMemoryStorage;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::service::MAX_AMOUNT;

    const DAY: i64 = clock::MILLIS_PER_DAY;

    fn setup() -> (Service, RecordId) {
        let now = clock::millis_from_ymd(2024, 5, 10).unwrap();
        let service = Service::with_clock(Arc::new(InMemoryStorage::new()), Arc::new(move || now));
        let client = service
            .create_client(&ClientCommand { name: "Acme".to_string(), ..Default::default() })
            .unwrap();
        (service, client.id)
    }

    fn command(client_id: RecordId, issue: i64) -> DocumentCommand {
        DocumentCommand {
            client_id,
            issue_date: issue,
            due_date: Some(issue + 30 * DAY),
            discount: Some(Discount::percentage(dec!(10))),
            items: vec![LineItemCommand {
                product_id: None,
                description: "Consulting".to_string(),
                quantity: dec!(2),
                unit_price: Some(dec!(100)),
                vat_rate: Some(dec!(20)),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_invoice_numbers_and_totals() {
        let (service, client_id) = setup();
        let now = service.now();
        let first = service.create_invoice(&command(client_id, now)).unwrap();
        let second = service.create_invoice(&command(client_id, now)).unwrap();

        assert_eq!(first.number, "INV-2024-0001");
        assert_eq!(second.number, "INV-2024-0002");
        assert_eq!(first.status.as_str(), "draft");
        assert_eq!(first.client.name, "Acme");
        assert_eq!(first.totals.subtotal, dec!(200));
        assert_eq!(first.totals.vat, dec!(40));
        assert_eq!(first.totals.discount, dec!(20));
        assert_eq!(first.totals.total, dec!(220));
    }

    #[test]
    fn test_unknown_client_is_validation_error() {
        let (service, _) = setup();
        let err = service.create_invoice(&command(999, service.now())).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "client 999 does not exist"));
        assert_eq!(service.preview_number(DocumentKind::Invoice).unwrap(), "INV-2024-0001");
    }

    #[test]
    fn test_invoice_transitions() {
        let (service, client_id) = setup();
        let invoice = service.create_invoice(&command(client_id, service.now())).unwrap();

        service.set_invoice_status(invoice.id, InvoiceStatus::Sent).unwrap();
        service.set_invoice_status(invoice.id, InvoiceStatus::Sent).unwrap();
        let paid = service.set_invoice_status(invoice.id, InvoiceStatus::Paid).unwrap();
        assert_eq!(paid.status.as_str(), "paid");

        let err = service.set_invoice_status(invoice.id, InvoiceStatus::Overdue).unwrap_err();
        assert_eq!(err.to_string(), "cannot change invoice status from paid to overdue");
    }

    #[test]
    fn test_refresh_overdue() {
        let (service, client_id) = setup();
        let now = service.now();
        let late = service.create_invoice(&command(client_id, now - 60 * DAY)).unwrap();
        let current = service.create_invoice(&command(client_id, now)).unwrap();
        let draft = service.create_invoice(&command(client_id, now - 60 * DAY)).unwrap();
        service.set_invoice_status(late.id, InvoiceStatus::Sent).unwrap();
        service.set_invoice_status(current.id, InvoiceStatus::Sent).unwrap();

        assert_eq!(service.refresh_overdue(now).unwrap(), vec![late.id]);
        assert_eq!(service.invoice(late.id).unwrap().status.as_str(), "overdue");
        assert_eq!(service.invoice(draft.id).unwrap().status.as_str(), "draft");
        assert!(service.refresh_overdue(now).unwrap().is_empty());
    }

    #[test]
    fn test_filters() {
        let (service, client_id) = setup();
        let other = service
            .create_client(&ClientCommand { name: "Globex".to_string(), ..Default::default() })
            .unwrap();
        let now = service.now();
        let a = service.create_invoice(&command(client_id, now)).unwrap();
        service.create_invoice(&command(other.id, now)).unwrap();
        service.set_invoice_status(a.id, InvoiceStatus::Sent).unwrap();

        let sent = service
            .invoices(&InvoiceFilter { status: Some(InvoiceStatus::Sent), client_id: None })
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, a.id);

        let globex = service.invoices(&InvoiceFilter { status: None, client_id: Some(other.id) }).unwrap();
        assert_eq!(globex.len(), 1);
        assert_eq!(globex[0].client.name, "Globex");
        assert_eq!(service.invoices(&InvoiceFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_convert_quote() {
        let (service, client_id) = setup();
        let quote = service.create_quote(&command(client_id, service.now())).unwrap();
        assert_eq!(quote.number, "QUO-2024-0001");

        let invoice = service.convert_quote(quote.id).unwrap();
        assert_eq!(invoice.kind, DocumentKind::Invoice);
        assert_eq!(invoice.number, "INV-2024-0001");
        assert_eq!(invoice.totals, quote.totals);
        assert_eq!(invoice.issue_date, service.now());
        assert_eq!(invoice.due_date, service.now() + 30 * DAY);
        assert_eq!(service.storage().get_invoice(invoice.id).unwrap().quote_id, Some(quote.id));
        assert_eq!(service.quote(quote.id).unwrap().status.as_str(), "accepted");

        let err = service.convert_quote(quote.id).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_rejected_quote_cannot_convert() {
        let (service, client_id) = setup();
        let quote = service.create_quote(&command(client_id, service.now())).unwrap();
        service.set_quote_status(quote.id, QuoteStatus::Rejected).unwrap();

        assert!(matches!(service.convert_quote(quote.id), Err(ServiceError::Validation(_))));
        assert!(service.invoices(&InvoiceFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_accepted_quote_is_terminal() {
        let (service, client_id) = setup();
        let quote = service.create_quote(&command(client_id, service.now())).unwrap();
        service.set_quote_status(quote.id, QuoteStatus::Accepted).unwrap();
        let err = service.set_quote_status(quote.id, QuoteStatus::Draft).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { entity: "quote", .. }));
    }

    #[test]
    fn test_duplicate_invoice() {
        let (service, client_id) = setup();
        let source = service.create_invoice(&command(client_id, service.now() - 90 * DAY)).unwrap();
        service.set_invoice_status(source.id, InvoiceStatus::Paid).unwrap();

        let copy = service.duplicate_invoice(source.id).unwrap();
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.number, "INV-2024-0002");
        assert_eq!(copy.status.as_str(), "draft");
        assert_eq!(copy.issue_date, service.now());
        assert_eq!(copy.totals, source.totals);
    }

    #[test]
    fn test_update_keeps_number() {
        let (service, client_id) = setup();
        let invoice = service.create_invoice(&command(client_id, service.now())).unwrap();
        let mut changed = command(client_id, service.now());
        changed.discount = None;
        changed.items[0].quantity = dec!(3);

        let updated = service.update_invoice(invoice.id, &changed).unwrap();
        assert_eq!(updated.number, invoice.number);
        assert_eq!(updated.totals.total, dec!(360));
    }

    #[test]
    fn test_line_defaults_from_product() {
        let (service, client_id) = setup();
        let product = service
            .create_product(&ProductCommand {
                name: "Hosting".to_string(),
                unit_price: dec!(15),
                vat_rate: dec!(10),
                ..Default::default()
            })
            .unwrap();
        let mut with_product = command(client_id, service.now());
        with_product.discount = None;
        with_product.items = vec![
            LineItemCommand {
                product_id: Some(product.id),
                quantity: dec!(4),
                ..Default::default()
            },
            LineItemCommand {
                product_id: Some(product.id),
                description: "Hosting, discounted".to_string(),
                quantity: dec!(1),
                unit_price: Some(dec!(5)),
                vat_rate: None,
            },
        ];

        let invoice = service.create_invoice(&with_product).unwrap();
        assert_eq!(invoice.items[0].description, "Hosting");
        assert_eq!(invoice.items[0].unit_price, dec!(15));
        assert_eq!(invoice.items[0].vat_rate, dec!(10));
        assert_eq!(invoice.items[1].description, "Hosting, discounted");
        assert_eq!(invoice.items[1].unit_price, dec!(5));
        assert_eq!(invoice.items[1].vat_rate, dec!(10));
        assert_eq!(invoice.totals.total, dec!(71.50));
    }

    #[test]
    fn test_free_line_uses_default_vat_and_needs_price() {
        let (service, client_id) = setup();
        let mut free = command(client_id, service.now());
        free.discount = None;
        free.items[0].vat_rate = None;
        let invoice = service.create_invoice(&free).unwrap();
        assert_eq!(invoice.items[0].vat_rate, dec!(20));
        assert_eq!(invoice.totals.total, dec!(240));

        free.items[0].unit_price = None;
        let err = service.create_invoice(&free).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "unit price of line 1 is required"));
    }

    #[test]
    fn test_due_date_defaults_from_settings() {
        let (service, client_id) = setup();
        let mut settings = service.settings().unwrap();
        settings.default_due_days = 45;
        settings.quote_validity_days = 14;
        service.save_settings(&settings).unwrap();

        let now = service.now();
        let mut undated = command(client_id, now);
        undated.due_date = None;
        let invoice = service.create_invoice(&undated).unwrap();
        let quote = service.create_quote(&undated).unwrap();

        assert_eq!(invoice.due_date, now + 45 * DAY);
        assert_eq!(quote.due_date, now + 14 * DAY);
        assert_eq!(service.convert_quote(quote.id).unwrap().due_date, now + 45 * DAY);
    }

    #[test]
    fn test_out_of_range_amounts_are_rejected() {
        let (service, client_id) = setup();
        let mut huge = command(client_id, service.now());
        huge.items[0].unit_price = Some(Decimal::MAX);
        let err = service.create_invoice(&huge).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.starts_with("unit price of line 1 cannot exceed")));

        // Each line is in range but the sum is not representable.
        let mut many = command(client_id, service.now());
        many.discount = None;
        many.items = vec![
            LineItemCommand {
                product_id: None,
                description: "Bulk".to_string(),
                quantity: MAX_AMOUNT,
                unit_price: Some(MAX_AMOUNT),
                vat_rate: Some(dec!(100)),
            };
            40_000
        ];
        let err = service.create_invoice(&many).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "document amounts are too large to total"));

        assert_eq!(service.preview_number(DocumentKind::Invoice).unwrap(), "INV-2024-0001");
        assert!(service.create_invoice(&command(client_id, service.now())).is_ok());
    }

    #[test]
    fn test_status_change_checks() {
        let (service, client_id) = setup();
        let invoice = service.create_invoice(&command(client_id, service.now())).unwrap();
        let err = service.set_invoice_status(invoice.id, InvoiceStatus::Overdue).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { entity: "invoice", .. }));
        assert!(matches!(
            service.set_invoice_status(404, InvoiceStatus::Sent),
            Err(ServiceError::Storage(StorageError::NotFound { .. }))
        ));
    }
}
