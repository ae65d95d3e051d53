use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, Entity as Product, Model as ProductModel},
        product_variant::{self, Entity as ProductVariant, Model as ProductVariantModel},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub sku: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantInput {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
}

/// Read-mostly product catalog.
///
/// Checkout only needs one thing from the catalog: the effective unit
/// price of a cart line at the moment of purchase. Catalog management
/// proper lives outside this service; the create methods exist for
/// provisioning and tests.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    pub async fn get_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<ProductVariantModel, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {variant_id} not found")))
    }

    /// Resolves the unit price for a cart line: the variant's price when a
    /// variant is referenced, else the product's price. Also returns the
    /// sku and display name used for the order-item snapshot.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn effective_unit_price(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<(Decimal, String, String), ServiceError> {
        if let Some(variant_id) = variant_id {
            let variant = self.get_variant(variant_id).await?;
            if variant.product_id != product_id {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {variant_id} does not belong to product {product_id}"
                )));
            }
            return Ok((variant.price, variant.sku, variant.name));
        }

        let product = self.get_product(product_id).await?;
        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {product_id} is not available for purchase"
            )));
        }
        Ok((product.price, product.sku, product.name))
    }

    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            sku: Set(input.sku),
            price: Set(input.price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }

    pub async fn create_variant(
        &self,
        input: CreateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        // The parent must exist; surfaces a clear error instead of an FK failure.
        self.get_product(input.product_id).await?;

        let now = Utc::now();
        let model = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price: Set(input.price),
            position: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }
}
