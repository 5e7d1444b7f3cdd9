use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use invoicedb_core::{
    models::{
        write::{CategoryCommand, ClientCommand, DocumentCommand, ProductCommand, TaxCommand},
        Category, Client, Discount, DiscountType, Invoice, InvoiceStatus, LineItem, Product, Quote, QuoteStatus,
        RecordId, Tax, TaxKind,
    },
    numbering::SequenceState,
    storage::{SequenceUpdate, StorageBackend, StorageError, TransactionId},
};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Params, Row};
use rust_decimal::Decimal;

mod schema;

/// Table names of one document kind. Invoices and quotes share the same
/// line and tax layout.
struct DocumentTables {
    entity: &'static str,
    header: &'static str,
    items: &'static str,
    taxes: &'static str,
    fk: &'static str,
}

const INVOICE_TABLES: DocumentTables = DocumentTables {
    entity: "invoice",
    header: "invoices",
    items: "invoice_items",
    taxes: "invoice_taxes",
    fk: "invoice_id",
};

const QUOTE_TABLES: DocumentTables = DocumentTables {
    entity: "quote",
    header: "quotes",
    items: "quote_items",
    taxes: "quote_taxes",
    fk: "quote_id",
};

const CLIENT_COLUMNS: &str = "id, name, email, phone, address, tax_number, notes, created_at";
const CATEGORY_COLUMNS: &str = "id, name, description, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, unit_price, vat_rate, unit, category_id, created_at";
const TAX_COLUMNS: &str = "id, name, rate, kind, created_at";
const INVOICE_COLUMNS: &str =
    "id, number, client_id, status, issue_date, due_date, discount_type, discount_value, notes, quote_id, created_at, updated_at";
const QUOTE_COLUMNS: &str =
    "id, number, client_id, status, issue_date, valid_until, discount_type, discount_value, notes, created_at, updated_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    tx_counter: AtomicU64,
    active_tx: Mutex<Option<TransactionId>>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(db_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
            tx_counter: AtomicU64::new(1),
            active_tx: Mutex::new(None),
        };
        storage.init_schema()?;
        tracing::info!(path, "SQLite storage opened");
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA).map_err(db_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|e| StorageError::Other(e.to_string()))
    }

    fn active_tx(&self) -> Result<MutexGuard<'_, Option<TransactionId>>, StorageError> {
        self.active_tx.lock().map_err(|e| StorageError::Other(e.to_string()))
    }
}

fn db_err(e: rusqlite::Error) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            StorageError::Constraint(msg.unwrap_or_else(|| err.to_string()))
        }
        other => StorageError::Other(other.to_string()),
    }
}

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_at<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Reads the `(discount_type, discount_value)` column pair starting at `idx`.
fn discount_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Discount>> {
    let kind: Option<String> = row.get(idx)?;
    if kind.is_none() {
        return Ok(None);
    }
    Ok(Some(Discount {
        kind: parsed_at::<DiscountType>(row, idx)?,
        value: decimal_at(row, idx + 1)?,
    }))
}

fn discount_columns(discount: Option<&Discount>) -> (Option<&'static str>, Option<String>) {
    match discount {
        Some(d) => (Some(d.kind.as_str()), Some(d.value.to_string())),
        None => (None, None),
    }
}

fn client_from_row(row: &Row) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        address: row.get(4)?,
        tax_number: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn product_from_row(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        unit_price: decimal_at(row, 3)?,
        vat_rate: decimal_at(row, 4)?,
        unit: row.get(5)?,
        category_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn tax_from_row(row: &Row) -> rusqlite::Result<Tax> {
    Ok(Tax {
        id: row.get(0)?,
        name: row.get(1)?,
        rate: decimal_at(row, 2)?,
        kind: parsed_at::<TaxKind>(row, 3)?,
        created_at: row.get(4)?,
    })
}

fn invoice_from_row(row: &Row) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        number: row.get(1)?,
        client_id: row.get(2)?,
        status: parsed_at::<InvoiceStatus>(row, 3)?,
        issue_date: row.get(4)?,
        due_date: row.get(5)?,
        discount: discount_at(row, 6)?,
        notes: row.get(8)?,
        quote_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn quote_from_row(row: &Row) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get(0)?,
        number: row.get(1)?,
        client_id: row.get(2)?,
        status: parsed_at::<QuoteStatus>(row, 3)?,
        issue_date: row.get(4)?,
        valid_until: row.get(5)?,
        discount: discount_at(row, 6)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<LineItem> {
    Ok(LineItem {
        id: row.get(0)?,
        document_id: row.get(1)?,
        product_id: row.get(2)?,
        description: row.get(3)?,
        quantity: decimal_at(row, 4)?,
        unit_price: decimal_at(row, 5)?,
        vat_rate: decimal_at(row, 6)?,
        position: row.get(7)?,
    })
}

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Vec<T>, StorageError>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt.query_map(params, f).map_err(db_err)?;
    let result = rows.collect::<Result<Vec<_>, _>>().map_err(db_err);
    result
}

fn query_one<T, P, F>(conn: &Connection, sql: &str, params: P, f: F, entity: &'static str, id: RecordId) -> Result<T, StorageError>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, f)
        .optional()
        .map_err(db_err)?
        .ok_or(StorageError::not_found(entity, id))
}

fn exists(conn: &Connection, table: &str, id: RecordId) -> Result<bool, StorageError> {
    conn.query_row(
        &format!("SELECT COUNT(*) > 0 FROM {} WHERE id = ?1", table),
        params![id],
        |row| row.get(0),
    )
    .map_err(db_err)
}

fn changed(rows: usize, entity: &'static str, id: RecordId) -> Result<(), StorageError> {
    if rows == 0 {
        Err(StorageError::not_found(entity, id))
    } else {
        Ok(())
    }
}

/// Rewrites the lines and the attached taxes of a document.
fn replace_lines(conn: &Connection, tables: &DocumentTables, id: RecordId, command: &DocumentCommand) -> Result<(), StorageError> {
    conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", tables.items, tables.fk), params![id])
        .map_err(db_err)?;
    conn.execute(&format!("DELETE FROM {} WHERE {} = ?1", tables.taxes, tables.fk), params![id])
        .map_err(db_err)?;

    let mut insert_item = conn
        .prepare(&format!(
            "INSERT INTO {} ({}, product_id, description, quantity, unit_price, vat_rate, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            tables.items, tables.fk
        ))
        .map_err(db_err)?;
    for (position, item) in command.items.iter().enumerate() {
        insert_item
            .execute(params![
                id,
                item.product_id,
                item.description,
                item.quantity.to_string(),
                item.unit_price.unwrap_or_default().to_string(),
                item.vat_rate.unwrap_or_default().to_string(),
                position as u32,
            ])
            .map_err(db_err)?;
    }

    let mut insert_tax = conn
        .prepare(&format!("INSERT OR IGNORE INTO {} ({}, tax_id) VALUES (?1, ?2)", tables.taxes, tables.fk))
        .map_err(db_err)?;
    for tax_id in &command.tax_ids {
        insert_tax.execute(params![id, tax_id]).map_err(db_err)?;
    }
    Ok(())
}

fn document_items(conn: &Connection, tables: &DocumentTables, id: RecordId) -> Result<Vec<LineItem>, StorageError> {
    if !exists(conn, tables.header, id)? {
        return Err(StorageError::not_found(tables.entity, id));
    }
    query_all(
        conn,
        &format!(
            "SELECT id, {fk}, product_id, description, quantity, unit_price, vat_rate, position
             FROM {items} WHERE {fk} = ?1 ORDER BY position, id",
            fk = tables.fk,
            items = tables.items
        ),
        params![id],
        item_from_row,
    )
}

fn document_taxes(conn: &Connection, tables: &DocumentTables, id: RecordId) -> Result<Vec<Tax>, StorageError> {
    if !exists(conn, tables.header, id)? {
        return Err(StorageError::not_found(tables.entity, id));
    }
    query_all(
        conn,
        &format!(
            "SELECT t.id, t.name, t.rate, t.kind, t.created_at
             FROM {join} dt JOIN taxes t ON t.id = dt.tax_id
             WHERE dt.{fk} = ?1 ORDER BY t.name COLLATE NOCASE, t.id",
            join = tables.taxes,
            fk = tables.fk
        ),
        params![id],
        tax_from_row,
    )
}

impl StorageBackend for SqliteStorage {
    fn create_client(&self, command: &ClientCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (name, email, phone, address, tax_number, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                command.name,
                command.email,
                command.phone,
                command.address,
                command.tax_number,
                command.notes,
                created_at
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_client(&self, id: RecordId, command: &ClientCommand) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE clients SET name = ?2, email = ?3, phone = ?4, address = ?5, tax_number = ?6, notes = ?7
                 WHERE id = ?1",
                params![
                    id,
                    command.name,
                    command.email,
                    command.phone,
                    command.address,
                    command.tax_number,
                    command.notes
                ],
            )
            .map_err(db_err)?;
        changed(rows, "client", id)
    }

    fn delete_client(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM clients WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "client", id)
    }

    fn get_client(&self, id: RecordId) -> Result<Client, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS),
            params![id],
            client_from_row,
            "client",
            id,
        )
    }

    fn list_clients(&self) -> Result<Vec<Client>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM clients ORDER BY name COLLATE NOCASE, id", CLIENT_COLUMNS),
            [],
            client_from_row,
        )
    }

    fn create_category(&self, command: &CategoryCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![command.name, command.description, created_at],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_category(&self, id: RecordId, command: &CategoryCommand) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE categories SET name = ?2, description = ?3 WHERE id = ?1",
                params![id, command.name, command.description],
            )
            .map_err(db_err)?;
        changed(rows, "category", id)
    }

    fn delete_category(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM categories WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "category", id)
    }

    fn get_category(&self, id: RecordId) -> Result<Category, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
            params![id],
            category_from_row,
            "category",
            id,
        )
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM categories ORDER BY name COLLATE NOCASE, id", CATEGORY_COLUMNS),
            [],
            category_from_row,
        )
    }

    fn create_product(&self, command: &ProductCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO products (name, description, unit_price, vat_rate, unit, category_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                command.name,
                command.description,
                command.unit_price.to_string(),
                command.vat_rate.to_string(),
                command.unit,
                command.category_id,
                created_at
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_product(&self, id: RecordId, command: &ProductCommand) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE products SET name = ?2, description = ?3, unit_price = ?4, vat_rate = ?5, unit = ?6, category_id = ?7
                 WHERE id = ?1",
                params![
                    id,
                    command.name,
                    command.description,
                    command.unit_price.to_string(),
                    command.vat_rate.to_string(),
                    command.unit,
                    command.category_id
                ],
            )
            .map_err(db_err)?;
        changed(rows, "product", id)
    }

    fn delete_product(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM products WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "product", id)
    }

    fn get_product(&self, id: RecordId) -> Result<Product, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
            params![id],
            product_from_row,
            "product",
            id,
        )
    }

    fn list_products(&self) -> Result<Vec<Product>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM products ORDER BY name COLLATE NOCASE, id", PRODUCT_COLUMNS),
            [],
            product_from_row,
        )
    }

    fn create_tax(&self, command: &TaxCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO taxes (name, rate, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![command.name, command.rate.to_string(), command.kind.as_str(), created_at],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_tax(&self, id: RecordId, command: &TaxCommand) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE taxes SET name = ?2, rate = ?3, kind = ?4 WHERE id = ?1",
                params![id, command.name, command.rate.to_string(), command.kind.as_str()],
            )
            .map_err(db_err)?;
        changed(rows, "tax", id)
    }

    fn delete_tax(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM taxes WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "tax", id)
    }

    fn get_tax(&self, id: RecordId) -> Result<Tax, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM taxes WHERE id = ?1", TAX_COLUMNS),
            params![id],
            tax_from_row,
            "tax",
            id,
        )
    }

    fn list_taxes(&self) -> Result<Vec<Tax>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM taxes ORDER BY name COLLATE NOCASE, id", TAX_COLUMNS),
            [],
            tax_from_row,
        )
    }

    fn create_invoice(&self, number: &str, command: &DocumentCommand, quote_id: Option<RecordId>, created_at: i64) -> Result<RecordId, StorageError> {
        let mut conn = self.conn()?;
        let sp = conn.savepoint().map_err(db_err)?;
        let (discount_type, discount_value) = discount_columns(command.discount.as_ref());

        sp.execute(
            "INSERT INTO invoices (number, client_id, status, issue_date, due_date, discount_type, discount_value,
                                   notes, quote_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                number,
                command.client_id,
                InvoiceStatus::Draft.as_str(),
                command.issue_date,
                command.due_date.unwrap_or(command.issue_date),
                discount_type,
                discount_value,
                command.notes,
                quote_id,
                created_at
            ],
        )
        .map_err(db_err)?;
        let id = sp.last_insert_rowid();
        replace_lines(&sp, &INVOICE_TABLES, id, command)?;
        sp.commit().map_err(db_err)?;

        tracing::debug!(invoice_id = id, number, "Invoice stored");
        Ok(id)
    }

    fn update_invoice(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let sp = conn.savepoint().map_err(db_err)?;
        let (discount_type, discount_value) = discount_columns(command.discount.as_ref());

        let rows = sp
            .execute(
                "UPDATE invoices SET client_id = ?2, issue_date = ?3, due_date = ?4, discount_type = ?5,
                                     discount_value = ?6, notes = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    command.client_id,
                    command.issue_date,
                    command.due_date.unwrap_or(command.issue_date),
                    discount_type,
                    discount_value,
                    command.notes,
                    updated_at
                ],
            )
            .map_err(db_err)?;
        changed(rows, "invoice", id)?;
        replace_lines(&sp, &INVOICE_TABLES, id, command)?;
        sp.commit().map_err(db_err)?;
        Ok(())
    }

    fn set_invoice_status(&self, id: RecordId, status: InvoiceStatus, updated_at: i64) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), updated_at],
            )
            .map_err(db_err)?;
        changed(rows, "invoice", id)
    }

    fn delete_invoice(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM invoices WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "invoice", id)
    }

    fn get_invoice(&self, id: RecordId) -> Result<Invoice, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS),
            params![id],
            invoice_from_row,
            "invoice",
            id,
        )
    }

    fn list_invoices(&self) -> Result<Vec<Invoice>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM invoices ORDER BY issue_date DESC, id DESC", INVOICE_COLUMNS),
            [],
            invoice_from_row,
        )
    }

    fn invoice_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError> {
        let conn = self.conn()?;
        document_items(&conn, &INVOICE_TABLES, id)
    }

    fn invoice_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError> {
        let conn = self.conn()?;
        document_taxes(&conn, &INVOICE_TABLES, id)
    }

    fn create_quote(&self, number: &str, command: &DocumentCommand, created_at: i64) -> Result<RecordId, StorageError> {
        let mut conn = self.conn()?;
        let sp = conn.savepoint().map_err(db_err)?;
        let (discount_type, discount_value) = discount_columns(command.discount.as_ref());

        sp.execute(
            "INSERT INTO quotes (number, client_id, status, issue_date, valid_until, discount_type, discount_value,
                                 notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                number,
                command.client_id,
                QuoteStatus::Draft.as_str(),
                command.issue_date,
                command.due_date.unwrap_or(command.issue_date),
                discount_type,
                discount_value,
                command.notes,
                created_at
            ],
        )
        .map_err(db_err)?;
        let id = sp.last_insert_rowid();
        replace_lines(&sp, &QUOTE_TABLES, id, command)?;
        sp.commit().map_err(db_err)?;

        tracing::debug!(quote_id = id, number, "Quote stored");
        Ok(id)
    }

    fn update_quote(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let sp = conn.savepoint().map_err(db_err)?;
        let (discount_type, discount_value) = discount_columns(command.discount.as_ref());

        let rows = sp
            .execute(
                "UPDATE quotes SET client_id = ?2, issue_date = ?3, valid_until = ?4, discount_type = ?5,
                                   discount_value = ?6, notes = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    command.client_id,
                    command.issue_date,
                    command.due_date.unwrap_or(command.issue_date),
                    discount_type,
                    discount_value,
                    command.notes,
                    updated_at
                ],
            )
            .map_err(db_err)?;
        changed(rows, "quote", id)?;
        replace_lines(&sp, &QUOTE_TABLES, id, command)?;
        sp.commit().map_err(db_err)?;
        Ok(())
    }

    fn set_quote_status(&self, id: RecordId, status: QuoteStatus, updated_at: i64) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE quotes SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), updated_at],
            )
            .map_err(db_err)?;
        changed(rows, "quote", id)
    }

    fn delete_quote(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM quotes WHERE id = ?1", params![id]).map_err(db_err)?;
        changed(rows, "quote", id)
    }

    fn get_quote(&self, id: RecordId) -> Result<Quote, StorageError> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM quotes WHERE id = ?1", QUOTE_COLUMNS),
            params![id],
            quote_from_row,
            "quote",
            id,
        )
    }

    fn list_quotes(&self) -> Result<Vec<Quote>, StorageError> {
        let conn = self.conn()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM quotes ORDER BY issue_date DESC, id DESC", QUOTE_COLUMNS),
            [],
            quote_from_row,
        )
    }

    fn quote_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError> {
        let conn = self.conn()?;
        document_items(&conn, &QUOTE_TABLES, id)
    }

    fn quote_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError> {
        let conn = self.conn()?;
        document_taxes(&conn, &QUOTE_TABLES, id)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(db_err)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn list_settings(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let conn = self.conn()?;
        let rows = query_all(&conn, "SELECT key, value FROM settings", [], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.into_iter().collect())
    }

    fn get_sequence(&self, name: &str) -> Result<SequenceState, StorageError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT last_year, counter FROM sequences WHERE name = ?1",
                params![name],
                |row| Ok(SequenceState { last_year: row.get(0)?, counter: row.get(1)? }),
            )
            .optional()
            .map_err(db_err)?;
        Ok(state.unwrap_or_default())
    }

    fn update_sequence(&self, name: &str, update: SequenceUpdate<'_>) -> Result<SequenceState, StorageError> {
        let mut conn = self.conn()?;
        let sp = conn.savepoint().map_err(db_err)?;
        let current = sp
            .query_row(
                "SELECT last_year, counter FROM sequences WHERE name = ?1",
                params![name],
                |row| Ok(SequenceState { last_year: row.get(0)?, counter: row.get(1)? }),
            )
            .optional()
            .map_err(db_err)?
            .unwrap_or_default();

        let next = update(current);
        sp.execute(
            "INSERT INTO sequences (name, last_year, counter) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET last_year = excluded.last_year, counter = excluded.counter",
            params![name, next.last_year, next.counter],
        )
        .map_err(db_err)?;
        sp.commit().map_err(db_err)?;

        tracing::debug!(sequence = name, counter = next.counter, year = next.last_year, "Sequence advanced");
        Ok(next)
    }

    fn begin_transaction(&self) -> Result<TransactionId, StorageError> {
        let mut active = self.active_tx()?;
        if active.is_some() {
            return Err(StorageError::Other("a transaction is already active".to_string()));
        }
        let conn = self.conn()?;
        conn.execute_batch("SAVEPOINT invoicedb_tx").map_err(db_err)?;
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        *active = Some(tx_id);
        tracing::debug!(tx_id, "SQLite transaction started");
        Ok(tx_id)
    }

    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let mut active = self.active_tx()?;
        if *active != Some(tx_id) {
            return Err(StorageError::NoActiveTransaction);
        }
        let conn = self.conn()?;
        conn.execute_batch("RELEASE SAVEPOINT invoicedb_tx").map_err(db_err)?;
        *active = None;
        tracing::debug!(tx_id, "SQLite transaction committed");
        Ok(())
    }

    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError> {
        let mut active = self.active_tx()?;
        if *active != Some(tx_id) {
            return Err(StorageError::NoActiveTransaction);
        }
        let conn = self.conn()?;
        conn.execute_batch("ROLLBACK TO SAVEPOINT invoicedb_tx; RELEASE SAVEPOINT invoicedb_tx")
            .map_err(db_err)?;
        *active = None;
        tracing::debug!(tx_id, "SQLite transaction rolled back");
        Ok(())
    }
}
