use tracing::{info, instrument};
use validator::Validate;

use crate::auth::{Action, Module, Permission, Session};
use crate::errors::{Result, ServiceError};
use crate::models::Product;
use crate::repositories::Repository;
use crate::store::ListQuery;

#[derive(Clone)]
pub struct ProductService {
    products: Repository<Product>,
}

impl ProductService {
    pub fn new(products: Repository<Product>) -> Self {
        Self { products }
    }

    pub async fn list_products(&self, session: &Session) -> Result<Vec<Product>> {
        session.require(Permission::new(Module::Products, Action::View))?;
        let mut products = self.products.list(&ListQuery::all()).await?;
        products.sort_by_key(|p| p.name.to_lowercase());
        Ok(products)
    }

    /// Products that can be put on a new order.
    pub async fn list_active(&self, session: &Session) -> Result<Vec<Product>> {
        Ok(self
            .list_products(session)
            .await?
            .into_iter()
            .filter(Product::is_active)
            .collect())
    }

    pub async fn get_product(&self, id: &str) -> Result<Product> {
        self.products.get(id).await
    }

    #[instrument(skip(self, product, session), fields(sku = %product.sku))]
    pub async fn create_product(&self, mut product: Product, session: &Session) -> Result<Product> {
        session.require(Permission::new(Module::Products, Action::Create))?;
        product.validate()?;
        self.ensure_unique_sku(&product).await?;
        product.recompute_margin();

        let created = self.products.create(&product).await?;
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self, product, session), fields(product_id = %product.id))]
    pub async fn update_product(&self, mut product: Product, session: &Session) -> Result<Product> {
        session.require(Permission::new(Module::Products, Action::Edit))?;
        product.validate()?;
        self.ensure_unique_sku(&product).await?;
        product.recompute_margin();
        self.products.save(&product).await
    }

    pub async fn delete_product(&self, id: &str, session: &Session) -> Result<bool> {
        session.require(Permission::new(Module::Products, Action::Delete))?;
        Ok(self.products.delete(id).await)
    }

    async fn ensure_unique_sku(&self, product: &Product) -> Result<()> {
        let sku = product.sku.trim();
        if sku.is_empty() {
            return Ok(());
        }
        let clash = self
            .products
            .list(&ListQuery::all().where_eq("sku", sku))
            .await?
            .into_iter()
            .any(|p| p.id != product.id);
        if clash {
            return Err(ServiceError::ValidationError(format!(
                "SKU {} is already in use",
                sku
            )));
        }
        Ok(())
    }
}
