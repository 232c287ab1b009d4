use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{NewProduct, Product, ProductDetails, DEFAULT_IMAGE};
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::validation::{
    sanitize_string, validate_max_len, validate_price, validate_product_name, validate_required,
    validate_stock, validate_validity_window, ValidationError, IMAGE_URL_MAX_LEN,
};
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    /// Only read on create; updates never change stock.
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl ProductRequest {
    fn into_details(self) -> Result<ProductDetails, ValidationError> {
        let name = sanitize_string(&self.name);
        let description = self.description.trim().to_string();
        let image_url = self
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        validate_product_name(&name)?;
        validate_required("description", &description)?;
        validate_price(&self.price)?;
        validate_max_len("image_url", &image_url, IMAGE_URL_MAX_LEN)?;
        validate_validity_window(self.start_date, self.end_date)?;

        Ok(ProductDetails {
            name,
            description,
            price: self.price,
            image_url,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub product_id: i64,
    pub stock: i64,
}

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<Product>>, AppError> {
    let products = state.products.list().await?;
    Ok(ApiResponse::ok("Success retrieve all data from Product", products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = state.products.get(id).await?;
    Ok(ApiResponse::ok(
        format!("Success get Product with id {id}"),
        product,
    ))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    validate_stock("stock", request.stock)?;
    let initial_stock = request.stock;
    let details = request.into_details()?;

    let product = state
        .products
        .create(&NewProduct {
            details,
            initial_stock,
        })
        .await?;
    tracing::info!(product_id = product.id, stock = product.stock, "product created");

    Ok(ApiResponse::with_status(
        StatusCode::CREATED,
        "Success create new Product",
        Some(product),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    let details = request.into_details()?;
    let product = state.products.update(id, &details).await?;
    tracing::info!(product_id = id, "product updated");

    Ok(ApiResponse::ok(
        format!("Success update Product with id {id}"),
        product,
    ))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    state.products.delete(id).await?;
    tracing::info!(product_id = id, "product deleted");

    Ok(ApiResponse::with_status(
        StatusCode::OK,
        format!("Success delete Product with id {id}"),
        None,
    ))
}

/// Restocks (positive delta) or withdraws units through the same guarded
/// update checkout uses.
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(adjustment): Json<StockAdjustment>,
) -> Result<ApiResponse<StockLevel>, AppError> {
    if adjustment.delta == 0 {
        return Err(AppError::BadRequest("delta must not be zero".to_string()));
    }

    let stock = state.inventory.adjust_stock(id, adjustment.delta).await?;
    tracing::info!(product_id = id, delta = adjustment.delta, stock, "stock adjusted");

    Ok(ApiResponse::ok(
        format!("Success update stock of Product with id {id}"),
        StockLevel {
            product_id: id,
            stock,
        },
    ))
}
