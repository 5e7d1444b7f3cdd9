//! Volatile storage backend. State lives in ordered maps behind a single
//! `RwLock`; transactions snapshot the whole state and restore it on rollback.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use invoicedb_core::{
    models::{
        write::{CategoryCommand, ClientCommand, DocumentCommand, LineItemCommand, ProductCommand, TaxCommand},
        Category, Client, Invoice, InvoiceStatus, LineItem, Product, Quote, QuoteStatus, RecordId, Tax,
    },
    numbering::SequenceState,
    storage::{SequenceUpdate, StorageBackend, StorageError, TransactionId},
};

#[derive(Clone, Default)]
struct Tables {
    next_id: RecordId,
    clients: BTreeMap<RecordId, Client>,
    categories: BTreeMap<RecordId, Category>,
    products: BTreeMap<RecordId, Product>,
    taxes: BTreeMap<RecordId, Tax>,
    invoices: BTreeMap<RecordId, Invoice>,
    invoice_items: BTreeMap<RecordId, Vec<LineItem>>,
    invoice_taxes: BTreeMap<RecordId, Vec<RecordId>>,
    quotes: BTreeMap<RecordId, Quote>,
    quote_items: BTreeMap<RecordId, Vec<LineItem>>,
    quote_taxes: BTreeMap<RecordId, Vec<RecordId>>,
    settings: BTreeMap<String, String>,
    sequences: BTreeMap<String, SequenceState>,
}

impl Tables {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn check_client(&self, id: RecordId) -> Result<(), StorageError> {
        if self.clients.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::Constraint(format!("client {} does not exist", id)))
        }
    }

    fn check_category(&self, id: Option<RecordId>) -> Result<(), StorageError> {
        match id {
            Some(id) if !self.categories.contains_key(&id) => {
                Err(StorageError::Constraint(format!("category {} does not exist", id)))
            }
            _ => Ok(()),
        }
    }

    fn check_document(&self, command: &DocumentCommand) -> Result<(), StorageError> {
        self.check_client(command.client_id)?;
        for item in &command.items {
            if let Some(pid) = item.product_id {
                if !self.products.contains_key(&pid) {
                    return Err(StorageError::Constraint(format!("product {} does not exist", pid)));
                }
            }
        }
        for tid in &command.tax_ids {
            if !self.taxes.contains_key(tid) {
                return Err(StorageError::Constraint(format!("tax {} does not exist", tid)));
            }
        }
        Ok(())
    }

    fn invoice_number_taken(&self, number: &str) -> bool {
        self.invoices.values().any(|i| i.number == number)
    }

    fn quote_number_taken(&self, number: &str) -> bool {
        self.quotes.values().any(|q| q.number == number)
    }

    fn build_items(&mut self, document_id: RecordId, items: &[LineItemCommand]) -> Vec<LineItem> {
        items
            .iter()
            .enumerate()
            .map(|(position, item)| LineItem {
                id: self.next_id(),
                document_id,
                product_id: item.product_id,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.unwrap_or_default(),
                vat_rate: item.vat_rate.unwrap_or_default(),
                position: position as u32,
            })
            .collect()
    }

    fn dedup_taxes(tax_ids: &[RecordId]) -> Vec<RecordId> {
        let mut ids = Vec::with_capacity(tax_ids.len());
        for id in tax_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    fn resolve_taxes(&self, ids: Option<&Vec<RecordId>>) -> Vec<Tax> {
        ids.map(|ids| ids.iter().filter_map(|id| self.taxes.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn remove_invoice(&mut self, id: RecordId) {
        self.invoices.remove(&id);
        self.invoice_items.remove(&id);
        self.invoice_taxes.remove(&id);
    }

    fn remove_quote(&mut self, id: RecordId) {
        self.quotes.remove(&id);
        self.quote_items.remove(&id);
        self.quote_taxes.remove(&id);
        for invoice in self.invoices.values_mut() {
            if invoice.quote_id == Some(id) {
                invoice.quote_id = None;
            }
        }
    }
}

fn by_name<T>(mut rows: Vec<T>, name: impl Fn(&T) -> (String, RecordId)) -> Vec<T> {
    rows.sort_by_key(|r| name(r));
    rows
}

pub struct InMemoryStorage {
    tables: RwLock<Tables>,
    tx_counter: AtomicU64,
    snapshots: RwLock<HashMap<TransactionId, Tables>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            tx_counter: AtomicU64::new(1),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|e| StorageError::Other(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|e| StorageError::Other(e.to_string()))
    }
}

impl StorageBackend for InMemoryStorage {
    fn create_client(&self, command: &ClientCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.clients.insert(id, Client {
            id,
            name: command.name.clone(),
            email: command.email.clone(),
            phone: command.phone.clone(),
            address: command.address.clone(),
            tax_number: command.tax_number.clone(),
            notes: command.notes.clone(),
            created_at,
        });
        Ok(id)
    }

    fn update_client(&self, id: RecordId, command: &ClientCommand) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let client = tables.clients.get_mut(&id).ok_or(StorageError::not_found("client", id))?;
        client.name = command.name.clone();
        client.email = command.email.clone();
        client.phone = command.phone.clone();
        client.address = command.address.clone();
        client.tax_number = command.tax_number.clone();
        client.notes = command.notes.clone();
        Ok(())
    }

    fn delete_client(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables.clients.remove(&id).ok_or(StorageError::not_found("client", id))?;

        let invoices: Vec<RecordId> = tables.invoices.values().filter(|i| i.client_id == id).map(|i| i.id).collect();
        for invoice_id in invoices {
            tables.remove_invoice(invoice_id);
        }
        let quotes: Vec<RecordId> = tables.quotes.values().filter(|q| q.client_id == id).map(|q| q.id).collect();
        for quote_id in quotes {
            tables.remove_quote(quote_id);
        }
        Ok(())
    }

    fn get_client(&self, id: RecordId) -> Result<Client, StorageError> {
        self.read()?.clients.get(&id).cloned().ok_or(StorageError::not_found("client", id))
    }

    fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let rows: Vec<Client> = self.read()?.clients.values().cloned().collect();
        Ok(by_name(rows, |c: &Client| (c.name.to_lowercase(), c.id)))
    }

    fn create_category(&self, command: &CategoryCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.categories.insert(id, Category {
            id,
            name: command.name.clone(),
            description: command.description.clone(),
            created_at,
        });
        Ok(id)
    }

    fn update_category(&self, id: RecordId, command: &CategoryCommand) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let category = tables.categories.get_mut(&id).ok_or(StorageError::not_found("category", id))?;
        category.name = command.name.clone();
        category.description = command.description.clone();
        Ok(())
    }

    fn delete_category(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables.categories.remove(&id).ok_or(StorageError::not_found("category", id))?;
        for product in tables.products.values_mut() {
            if product.category_id == Some(id) {
                product.category_id = None;
            }
        }
        Ok(())
    }

    fn get_category(&self, id: RecordId) -> Result<Category, StorageError> {
        self.read()?.categories.get(&id).cloned().ok_or(StorageError::not_found("category", id))
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let rows: Vec<Category> = self.read()?.categories.values().cloned().collect();
        Ok(by_name(rows, |c: &Category| (c.name.to_lowercase(), c.id)))
    }

    fn create_product(&self, command: &ProductCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        tables.check_category(command.category_id)?;
        let id = tables.next_id();
        tables.products.insert(id, Product {
            id,
            name: command.name.clone(),
            description: command.description.clone(),
            unit_price: command.unit_price,
            vat_rate: command.vat_rate,
            unit: command.unit.clone(),
            category_id: command.category_id,
            created_at,
        });
        Ok(id)
    }

    fn update_product(&self, id: RecordId, command: &ProductCommand) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables.check_category(command.category_id)?;
        let product = tables.products.get_mut(&id).ok_or(StorageError::not_found("product", id))?;
        product.name = command.name.clone();
        product.description = command.description.clone();
        product.unit_price = command.unit_price;
        product.vat_rate = command.vat_rate;
        product.unit = command.unit.clone();
        product.category_id = command.category_id;
        Ok(())
    }

    fn delete_product(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables.products.remove(&id).ok_or(StorageError::not_found("product", id))?;
        let tables = &mut *tables;
        for item in tables.invoice_items.values_mut().chain(tables.quote_items.values_mut()).flatten() {
            if item.product_id == Some(id) {
                item.product_id = None;
            }
        }
        Ok(())
    }

    fn get_product(&self, id: RecordId) -> Result<Product, StorageError> {
        self.read()?.products.get(&id).cloned().ok_or(StorageError::not_found("product", id))
    }

    fn list_products(&self) -> Result<Vec<Product>, StorageError> {
        let rows: Vec<Product> = self.read()?.products.values().cloned().collect();
        Ok(by_name(rows, |p: &Product| (p.name.to_lowercase(), p.id)))
    }

    fn create_tax(&self, command: &TaxCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.taxes.insert(id, Tax {
            id,
            name: command.name.clone(),
            rate: command.rate,
            kind: command.kind,
            created_at,
        });
        Ok(id)
    }

    fn update_tax(&self, id: RecordId, command: &TaxCommand) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let tax = tables.taxes.get_mut(&id).ok_or(StorageError::not_found("tax", id))?;
        tax.name = command.name.clone();
        tax.rate = command.rate;
        tax.kind = command.kind;
        Ok(())
    }

    fn delete_tax(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables.taxes.remove(&id).ok_or(StorageError::not_found("tax", id))?;
        let tables = &mut *tables;
        for ids in tables.invoice_taxes.values_mut().chain(tables.quote_taxes.values_mut()) {
            ids.retain(|t| *t != id);
        }
        Ok(())
    }

    fn get_tax(&self, id: RecordId) -> Result<Tax, StorageError> {
        self.read()?.taxes.get(&id).cloned().ok_or(StorageError::not_found("tax", id))
    }

    fn list_taxes(&self) -> Result<Vec<Tax>, StorageError> {
        let rows: Vec<Tax> = self.read()?.taxes.values().cloned().collect();
        Ok(by_name(rows, |t: &Tax| (t.name.to_lowercase(), t.id)))
    }

    fn create_invoice(&self, number: &str, command: &DocumentCommand, quote_id: Option<RecordId>, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        tables.check_document(command)?;
        if tables.invoice_number_taken(number) {
            return Err(StorageError::Constraint(format!("invoice number {} already exists", number)));
        }
        if let Some(qid) = quote_id {
            if !tables.quotes.contains_key(&qid) {
                return Err(StorageError::Constraint(format!("quote {} does not exist", qid)));
            }
        }

        let id = tables.next_id();
        let items = tables.build_items(id, &command.items);
        tables.invoices.insert(id, Invoice {
            id,
            number: number.to_string(),
            client_id: command.client_id,
            status: InvoiceStatus::Draft,
            issue_date: command.issue_date,
            due_date: command.due_date.unwrap_or(command.issue_date),
            discount: command.discount,
            notes: command.notes.clone(),
            quote_id,
            created_at,
            updated_at: created_at,
        });
        tables.invoice_items.insert(id, items);
        tables.invoice_taxes.insert(id, Tables::dedup_taxes(&command.tax_ids));
        tracing::debug!(invoice_id = id, number, "Invoice stored");
        Ok(id)
    }

    fn update_invoice(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.invoices.contains_key(&id) {
            return Err(StorageError::not_found("invoice", id));
        }
        tables.check_document(command)?;
        let items = tables.build_items(id, &command.items);
        if let Some(invoice) = tables.invoices.get_mut(&id) {
            invoice.client_id = command.client_id;
            invoice.issue_date = command.issue_date;
            invoice.due_date = command.due_date.unwrap_or(command.issue_date);
            invoice.discount = command.discount;
            invoice.notes = command.notes.clone();
            invoice.updated_at = updated_at;
        }
        tables.invoice_items.insert(id, items);
        tables.invoice_taxes.insert(id, Tables::dedup_taxes(&command.tax_ids));
        Ok(())
    }

    fn set_invoice_status(&self, id: RecordId, status: InvoiceStatus, updated_at: i64) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let invoice = tables.invoices.get_mut(&id).ok_or(StorageError::not_found("invoice", id))?;
        invoice.status = status;
        invoice.updated_at = updated_at;
        Ok(())
    }

    fn delete_invoice(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.invoices.contains_key(&id) {
            return Err(StorageError::not_found("invoice", id));
        }
        tables.remove_invoice(id);
        Ok(())
    }

    fn get_invoice(&self, id: RecordId) -> Result<Invoice, StorageError> {
        self.read()?.invoices.get(&id).cloned().ok_or(StorageError::not_found("invoice", id))
    }

    fn list_invoices(&self) -> Result<Vec<Invoice>, StorageError> {
        let mut rows: Vec<Invoice> = self.read()?.invoices.values().cloned().collect();
        rows.sort_by(|a, b| b.issue_date.cmp(&a.issue_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn invoice_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError> {
        let tables = self.read()?;
        if !tables.invoices.contains_key(&id) {
            return Err(StorageError::not_found("invoice", id));
        }
        Ok(tables.invoice_items.get(&id).cloned().unwrap_or_default())
    }

    fn invoice_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError> {
        let tables = self.read()?;
        if !tables.invoices.contains_key(&id) {
            return Err(StorageError::not_found("invoice", id));
        }
        Ok(tables.resolve_taxes(tables.invoice_taxes.get(&id)))
    }

    fn create_quote(&self, number: &str, command: &DocumentCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        tables.check_document(command)?;
        if tables.quote_number_taken(number) {
            return Err(StorageError::Constraint(format!("quote number {} already exists", number)));
        }

        let id = tables.next_id();
        let items = tables.build_items(id, &command.items);
        tables.quotes.insert(id, Quote {
            id,
            number: number.to_string(),
            client_id: command.client_id,
            status: QuoteStatus::Draft,
            issue_date: command.issue_date,
            valid_until: command.due_date.unwrap_or(command.issue_date),
            discount: command.discount,
            notes: command.notes.clone(),
            created_at,
            updated_at: created_at,
        });
        tables.quote_items.insert(id, items);
        tables.quote_taxes.insert(id, Tables::dedup_taxes(&command.tax_ids));
        tracing::debug!(quote_id = id, number, "Quote stored");
        Ok(id)
    }

    fn update_quote(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.quotes.contains_key(&id) {
            return Err(StorageError::not_found("quote", id));
        }
        tables.check_document(command)?;
        let items = tables.build_items(id, &command.items);
        if let Some(quote) = tables.quotes.get_mut(&id) {
            quote.client_id = command.client_id;
            quote.issue_date = command.issue_date;
            quote.valid_until = command.due_date.unwrap_or(command.issue_date);
            quote.discount = command.discount;
            quote.notes = command.notes.clone();
            quote.updated_at = updated_at;
        }
        tables.quote_items.insert(id, items);
        tables.quote_taxes.insert(id, Tables::dedup_taxes(&command.tax_ids));
        Ok(())
    }

    fn set_quote_status(&self, id: RecordId, status: QuoteStatus, updated_at: i64) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let quote = tables.quotes.get_mut(&id).ok_or(StorageError::not_found("quote", id))?;
        quote.status = status;
        quote.updated_at = updated_at;
        Ok(())
    }

    fn delete_quote(&self, id: RecordId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.quotes.contains_key(&id) {
            return Err(StorageError::not_found("quote", id));
        }
        tables.remove_quote(id);
        Ok(())
    }

    fn get_quote(&self, id: RecordId) -> Result<Quote, StorageError> {
        self.read()?.quotes.get(&id).cloned().ok_or(StorageError::not_found("quote", id))
    }

    fn list_quotes(&self) -> Result<Vec<Quote>, StorageError> {
        let mut rows: Vec<Quote> = self.read()?.quotes.values().cloned().collect();
        rows.sort_by(|a, b| b.issue_date.cmp(&a.issue_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn quote_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError> {
        let tables = self.read()?;
        if !tables.quotes.contains_key(&id) {
            return Err(StorageError::not_found("quote", id));
        }
        Ok(tables.quote_items.get(&id).cloned().unwrap_or_default())
    }

    fn quote_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError> {
        let tables = self.read()?;
        if !tables.quotes.contains_key(&id) {
            return Err(StorageError::not_found("quote", id));
        }
        Ok(tables.resolve_taxes(tables.quote_taxes.get(&id)))
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read()?.settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write()?.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn list_settings(&self) -> Result<BTreeMap<String, String>, StorageError> {
        Ok(self.read()?.settings.clone())
    }

    fn get_sequence(&self, name: &str) -> Result<SequenceState, StorageError> {
        Ok(self.read()?.sequences.get(name).copied().unwrap_or_default())
    }

    fn update_sequence(&self, name: &str, update: SequenceUpdate<'_>) -> Result<SequenceState, StorageError> {
        let mut tables = self.write()?;
        let current = tables.sequences.get(name).copied().unwrap_or_default();
        let next = update(current);
        tables.sequences.insert(name.to_string(), next);
        tracing::debug!(sequence = name, counter = next.counter, year = next.last_year, "Sequence advanced");
        Ok(next)
    }

    fn begin_transaction(&self) -> Result<TransactionId, StorageError> {
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.read()?.clone();
        self.snapshots
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?
            .insert(tx_id, snapshot);
        tracing::debug!(tx_id, "Transaction started");
        Ok(tx_id)
    }

    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        self.snapshots
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?
            .remove(&tx_id)
            .ok_or(StorageError::NoActiveTransaction)?;
        tracing::debug!(tx_id, "Transaction committed");
        Ok(())
    }

    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let snapshot = self
            .snapshots
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?
            .remove(&tx_id)
            .ok_or(StorageError::NoActiveTransaction)?;
        *self.write()? = snapshot;
        tracing::debug!(tx_id, "Transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicedb_core::models::TaxKind;
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000_000;

    fn client(storage: &InMemoryStorage, name: &str) -> RecordId {
        let command = ClientCommand {
            name: name.to_string(),
            ..Default::default()
        };
        storage.create_client(&command, NOW).unwrap()
    }

    fn document(client_id: RecordId, tax_ids: Vec<RecordId>) -> DocumentCommand {
        DocumentCommand {
            client_id,
            issue_date: 1_700_000_000_000,
            due_date: Some(1_702_592_000_000),
            items: vec![LineItemCommand {
                product_id: None,
                description: "Consulting".to_string(),
                quantity: dec!(3),
                unit_price: Some(dec!(120)),
                vat_rate: Some(dec!(20)),
            }],
            tax_ids,
            ..Default::default()
        }
    }

    #[test]
    fn test_invoice_roundtrip_with_items_and_taxes() {
        let storage = InMemoryStorage::new();
        let client_id = client(&storage, "Acme");
        let tax_id = storage
            .create_tax(&TaxCommand { name: "Eco".to_string(), rate: dec!(2), kind: TaxKind::Percentage }, NOW)
            .unwrap();

        let id = storage.create_invoice("INV-0001", &document(client_id, vec![tax_id, tax_id]), None, NOW).unwrap();
        let invoice = storage.get_invoice(id).unwrap();
        assert_eq!(invoice.number, "INV-0001");
        assert_eq!(invoice.status, InvoiceStatus::Draft);

        let items = storage.invoice_items(id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].document_id, id);
        assert_eq!(storage.invoice_taxes(id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_client_is_rejected() {
        let storage = InMemoryStorage::new();
        let err = storage.create_invoice("INV-0001", &document(42, vec![]), None, NOW).unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn test_duplicate_number_is_rejected() {
        let storage = InMemoryStorage::new();
        let client_id = client(&storage, "Acme");
        storage.create_quote("Q-0001", &document(client_id, vec![]), NOW).unwrap();
        let err = storage.create_quote("Q-0001", &document(client_id, vec![]), NOW).unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn test_delete_client_cascades() {
        let storage = InMemoryStorage::new();
        let acme = client(&storage, "Acme");
        let other = client(&storage, "Other");
        let quote_id = storage.create_quote("Q-0001", &document(acme, vec![]), NOW).unwrap();
        storage.create_invoice("INV-0001", &document(acme, vec![]), Some(quote_id), NOW).unwrap();
        let kept = storage.create_invoice("INV-0002", &document(other, vec![]), None, NOW).unwrap();

        storage.delete_client(acme).unwrap();

        assert!(storage.list_quotes().unwrap().is_empty());
        let invoices = storage.list_invoices().unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].id, kept);
    }

    #[test]
    fn test_delete_tax_detaches_from_documents() {
        let storage = InMemoryStorage::new();
        let client_id = client(&storage, "Acme");
        let tax_id = storage
            .create_tax(&TaxCommand { name: "Stamp".to_string(), rate: dec!(1.5), kind: TaxKind::Fixed }, NOW)
            .unwrap();
        let id = storage.create_invoice("INV-0001", &document(client_id, vec![tax_id]), None, NOW).unwrap();

        storage.delete_tax(tax_id).unwrap();
        assert!(storage.invoice_taxes(id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_category_uncategorises_products() {
        let storage = InMemoryStorage::new();
        let category_id = storage
            .create_category(&CategoryCommand { name: "Services".to_string(), description: None }, NOW)
            .unwrap();
        let product = ProductCommand {
            name: "Audit".to_string(),
            unit_price: dec!(900),
            vat_rate: dec!(20),
            category_id: Some(category_id),
            ..Default::default()
        };
        let product_id = storage.create_product(&product, NOW).unwrap();

        storage.delete_category(category_id).unwrap();
        assert_eq!(storage.get_product(product_id).unwrap().category_id, None);
    }

    #[test]
    fn test_timestamps_come_from_caller() {
        let storage = InMemoryStorage::new();
        let client_id = client(&storage, "Acme");
        assert_eq!(storage.get_client(client_id).unwrap().created_at, NOW);

        let id = storage.create_invoice("INV-0001", &document(client_id, vec![]), None, NOW).unwrap();
        storage.set_invoice_status(id, InvoiceStatus::Sent, NOW + 500).unwrap();
        let invoice = storage.get_invoice(id).unwrap();
        assert_eq!(invoice.created_at, NOW);
        assert_eq!(invoice.updated_at, NOW + 500);
    }

    #[test]
    fn test_clients_sorted_by_name() {
        let storage = InMemoryStorage::new();
        client(&storage, "zeta");
        client(&storage, "Alpha");
        client(&storage, "beta");
        let names: Vec<String> = storage.list_clients().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_sequence_update() {
        let storage = InMemoryStorage::new();
        let state = storage
            .update_sequence("invoice", &mut |s: SequenceState| SequenceState { last_year: 2024, counter: s.counter + 1 })
            .unwrap();
        assert_eq!(state.counter, 1);
        assert_eq!(storage.get_sequence("invoice").unwrap(), state);
        assert_eq!(storage.get_sequence("quote").unwrap(), SequenceState::default());
    }

    #[test]
    fn test_transaction_rollback() {
        let storage = InMemoryStorage::new();
        client(&storage, "Kept");

        let tx_id = storage.begin_transaction().unwrap();
        client(&storage, "Dropped");
        storage.set_setting("company.name", "Acme").unwrap();
        storage.rollback_transaction(tx_id).unwrap();

        assert_eq!(storage.list_clients().unwrap().len(), 1);
        assert_eq!(storage.get_setting("company.name").unwrap(), None);
        assert!(matches!(storage.commit_transaction(tx_id), Err(StorageError::NoActiveTransaction)));
    }
}
