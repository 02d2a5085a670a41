use tracing::{info, instrument};
use validator::Validate;

use crate::auth::{Action, Module, Permission, Session};
use crate::errors::Result;
use crate::models::Customer;
use crate::repositories::Repository;
use crate::store::ListQuery;

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    customers: Repository<Customer>,
}

impl CustomerService {
    pub fn new(customers: Repository<Customer>) -> Self {
        Self { customers }
    }

    pub async fn list_customers(&self, session: &Session) -> Result<Vec<Customer>> {
        session.require(Permission::new(Module::Customers, Action::View))?;
        let mut customers = self.customers.list(&ListQuery::all()).await?;
        customers.sort_by_key(|c| c.name.to_lowercase());
        Ok(customers)
    }

    /// Case-insensitive match on name, email or phone.
    pub async fn search(&self, term: &str, session: &Session) -> Result<Vec<Customer>> {
        let term = term.trim().to_lowercase();
        let customers = self.list_customers(session).await?;
        if term.is_empty() {
            return Ok(customers);
        }
        Ok(customers
            .into_iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&term)
                    || c.email.as_deref().unwrap_or("").to_lowercase().contains(&term)
                    || c.phone.as_deref().unwrap_or("").contains(&term)
            })
            .collect())
    }

    pub async fn get_customer(&self, id: &str) -> Result<Customer> {
        self.customers.get(id).await
    }

    #[instrument(skip(self, customer, session))]
    pub async fn create_customer(&self, customer: Customer, session: &Session) -> Result<Customer> {
        session.require(Permission::new(Module::Customers, Action::Create))?;
        customer.validate()?;
        let created = self.customers.create(&customer).await?;
        info!(customer_id = %created.id, "customer created");
        Ok(created)
    }

    /// Writes an edited customer back. Orders keep the customer fields they
    /// copied at creation time.
    #[instrument(skip(self, customer, session), fields(customer_id = %customer.id))]
    pub async fn update_customer(&self, customer: Customer, session: &Session) -> Result<Customer> {
        session.require(Permission::new(Module::Customers, Action::Edit))?;
        customer.validate()?;
        self.customers.save(&customer).await
    }

    /// Orders referencing the customer are left as they are.
    pub async fn delete_customer(&self, id: &str, session: &Session) -> Result<bool> {
        session.require(Permission::new(Module::Customers, Action::Delete))?;
        Ok(self.customers.delete(id).await)
    }
}
