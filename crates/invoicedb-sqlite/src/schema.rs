pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        address TEXT,
        tax_number TEXT,
        notes TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        unit_price TEXT NOT NULL,
        vat_rate TEXT NOT NULL,
        unit TEXT,
        category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS taxes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        rate TEXT NOT NULL,
        kind TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS quotes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL UNIQUE,
        client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        issue_date INTEGER NOT NULL,
        valid_until INTEGER NOT NULL,
        discount_type TEXT,
        discount_value TEXT,
        notes TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL UNIQUE,
        client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        issue_date INTEGER NOT NULL,
        due_date INTEGER NOT NULL,
        discount_type TEXT,
        discount_value TEXT,
        notes TEXT,
        quote_id INTEGER REFERENCES quotes(id) ON DELETE SET NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS invoice_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        product_id INTEGER REFERENCES products(id) ON DELETE SET NULL,
        description TEXT NOT NULL,
        quantity TEXT NOT NULL,
        unit_price TEXT NOT NULL,
        vat_rate TEXT NOT NULL,
        position INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS quote_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quote_id INTEGER NOT NULL REFERENCES quotes(id) ON DELETE CASCADE,
        product_id INTEGER REFERENCES products(id) ON DELETE SET NULL,
        description TEXT NOT NULL,
        quantity TEXT NOT NULL,
        unit_price TEXT NOT NULL,
        vat_rate TEXT NOT NULL,
        position INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS invoice_taxes (
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        tax_id INTEGER NOT NULL REFERENCES taxes(id) ON DELETE CASCADE,
        PRIMARY KEY (invoice_id, tax_id)
    );

    CREATE TABLE IF NOT EXISTS quote_taxes (
        quote_id INTEGER NOT NULL REFERENCES quotes(id) ON DELETE CASCADE,
        tax_id INTEGER NOT NULL REFERENCES taxes(id) ON DELETE CASCADE,
        PRIMARY KEY (quote_id, tax_id)
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sequences (
        name TEXT PRIMARY KEY,
        last_year INTEGER NOT NULL,
        counter INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_invoices_client ON invoices(client_id);
    CREATE INDEX IF NOT EXISTS idx_invoices_issue ON invoices(issue_date);
    CREATE INDEX IF NOT EXISTS idx_quotes_client ON quotes(client_id);
    CREATE INDEX IF NOT EXISTS idx_invoice_items_doc ON invoice_items(invoice_id, position);
    CREATE INDEX IF NOT EXISTS idx_quote_items_doc ON quote_items(quote_id, position);
    CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
";
