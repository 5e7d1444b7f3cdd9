use invoicedb_core::{
    models::write::{CategoryCommand, ClientCommand, ProductCommand, TaxCommand},
    Category, Client, Product, RecordId, Tax, TaxKind,
};

use super::{referenced, validation, Service};
use crate::error::ServiceError;

fn matches(query: &str, fields: &[Option<&str>]) -> bool {
    let query = query.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&query))
}

fn validate_tax(command: &TaxCommand) -> Result<(), ServiceError> {
    validation::require_text(&command.name, "tax name")?;
    match command.kind {
        TaxKind::Percentage => validation::rate(command.rate, "tax rate"),
        TaxKind::Fixed => validation::amount(command.rate, "tax amount"),
    }
}

fn validate_product(command: &ProductCommand) -> Result<(), ServiceError> {
    validation::require_text(&command.name, "product name")?;
    validation::amount(command.unit_price, "unit price")?;
    validation::rate(command.vat_rate, "VAT rate")
}

impl Service {
    fn check_category(&self, command: &ProductCommand) -> Result<(), ServiceError> {
        if let Some(category_id) = command.category_id {
            self.storage.get_category(category_id).map_err(referenced)?;
        }
        Ok(())
    }

    pub fn create_client(&self, command: &ClientCommand) -> Result<Client, ServiceError> {
        validation::require_text(&command.name, "client name")?;
        let id = self.write(|| Ok(self.storage.create_client(command, self.now())?))?;
        tracing::info!(client_id = id, name = %command.name, "Client created");
        Ok(self.storage.get_client(id)?)
    }

    pub fn update_client(&self, id: RecordId, command: &ClientCommand) -> Result<Client, ServiceError> {
        validation::require_text(&command.name, "client name")?;
        self.write(|| Ok(self.storage.update_client(id, command)?))?;
        Ok(self.storage.get_client(id)?)
    }

    /// Deletes the client together with all of its invoices and quotes.
    pub fn delete_client(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_client(id)?))?;
        tracing::info!(client_id = id, "Client deleted");
        Ok(())
    }

    pub fn client(&self, id: RecordId) -> Result<Client, ServiceError> {
        Ok(self.storage.get_client(id)?)
    }

    /// Clients whose name, email or phone contains `query`, case-insensitively.
    pub fn clients(&self, query: Option<&str>) -> Result<Vec<Client>, ServiceError> {
        let clients = self.storage.list_clients()?;
        Ok(match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => clients
                .into_iter()
                .filter(|c| matches(q, &[Some(&c.name), c.email.as_deref(), c.phone.as_deref()]))
                .collect(),
            None => clients,
        })
    }

    pub fn create_category(&self, command: &CategoryCommand) -> Result<Category, ServiceError> {
        validation::require_text(&command.name, "category name")?;
        let id = self.write(|| Ok(self.storage.create_category(command, self.now())?))?;
        Ok(self.storage.get_category(id)?)
    }

    pub fn update_category(&self, id: RecordId, command: &CategoryCommand) -> Result<Category, ServiceError> {
        validation::require_text(&command.name, "category name")?;
        self.write(|| Ok(self.storage.update_category(id, command)?))?;
        Ok(self.storage.get_category(id)?)
    }

    pub fn delete_category(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_category(id)?))
    }

    pub fn category(&self, id: RecordId) -> Result<Category, ServiceError> {
        Ok(self.storage.get_category(id)?)
    }

    pub fn categories(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.storage.list_categories()?)
    }

    pub fn create_product(&self, command: &ProductCommand) -> Result<Product, ServiceError> {
        validate_product(command)?;
        let id = self.write(|| {
            self.check_category(command)?;
            Ok(self.storage.create_product(command, self.now())?)
        })?;
        Ok(self.storage.get_product(id)?)
    }

    pub fn update_product(&self, id: RecordId, command: &ProductCommand) -> Result<Product, ServiceError> {
        validate_product(command)?;
        self.write(|| {
            self.check_category(command)?;
            Ok(self.storage.update_product(id, command)?)
        })?;
        Ok(self.storage.get_product(id)?)
    }

    pub fn delete_product(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_product(id)?))
    }

    pub fn product(&self, id: RecordId) -> Result<Product, ServiceError> {
        Ok(self.storage.get_product(id)?)
    }

    pub fn products(&self, query: Option<&str>, category_id: Option<RecordId>) -> Result<Vec<Product>, ServiceError> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        Ok(self
            .storage
            .list_products()?
            .into_iter()
            .filter(|p| category_id.is_none() || p.category_id == category_id)
            .filter(|p| query.map_or(true, |q| matches(q, &[Some(&p.name), p.description.as_deref()])))
            .collect())
    }

    pub fn create_tax(&self, command: &TaxCommand) -> Result<Tax, ServiceError> {
        validate_tax(command)?;
        let id = self.write(|| Ok(self.storage.create_tax(command, self.now())?))?;
        Ok(self.storage.get_tax(id)?)
    }

    pub fn update_tax(&self, id: RecordId, command: &TaxCommand) -> Result<Tax, ServiceError> {
        validate_tax(command)?;
        self.write(|| Ok(self.storage.update_tax(id, command)?))?;
        Ok(self.storage.get_tax(id)?)
    }

    pub fn delete_tax(&self, id: RecordId) -> Result<(), ServiceError> {
        self.write(|| Ok(self.storage.delete_tax(id)?))
    }

    pub fn tax(&self, id: RecordId) -> Result<Tax, ServiceError> {
        Ok(self.storage.get_tax(id)?)
    }

    pub fn taxes(&self) -> Result<Vec<Tax>, ServiceError> {
        Ok(self.storage.list_taxes()?)
    }
}
