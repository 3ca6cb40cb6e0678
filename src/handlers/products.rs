use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{perms, AuthRouterExt};
use crate::entities::{ProductCategory, ProductModel};
use crate::errors::ServiceError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::{CreateProductInput, ProductListFilter, UpdateProductInput};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[schema(value_type = String, example = "electronics")]
    pub category: ProductCategory,
    pub price: Decimal,
    pub currency: Option<String>,
    #[serde(default)]
    pub stock_quantity: i32,
}

/// Distinguishes a field set to null from one left out entirely.
fn some_if_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Pass null to clear the description, omit to keep it.
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[schema(value_type = Option<String>)]
    pub category: Option<ProductCategory>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductFilterQuery {
    #[param(value_type = Option<String>, example = "electronics")]
    pub category: Option<ProductCategory>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// List catalog products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    params(ProductFilterQuery, PaginationParams),
    responses(
        (status = 200, description = "Products retrieved successfully"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilterQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ProductModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let filter = ProductListFilter {
        category: filter.category,
        search: filter.search,
        include_inactive: filter.include_inactive,
    };
    let (products, total) = state
        .services
        .products
        .list_products(filter, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(products, page, per_page, total)))
}

/// Get a product by id
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product retrieved successfully"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductModel>, ServiceError> {
    let product = state.services.products.get_product(id).await?;
    Ok(Json(product))
}

/// Get an active product by slug
#[utoipa::path(
    get,
    path = "/api/v1/products/slug/{slug}",
    tag = "products",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product retrieved successfully"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductModel>, ServiceError> {
    let product = state.services.products.get_product_by_slug(&slug).await?;
    Ok(Json(product))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created successfully"),
        (status = 409, description = "SKU or slug already in use", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductModel>), ServiceError> {
    validate_input(&request)?;
    let product = state
        .services
        .products
        .create_product(CreateProductInput {
            name: request.name,
            slug: request.slug,
            description: request.description,
            sku: request.sku,
            category: request.category,
            price: request.price,
            currency: request.currency,
            stock_quantity: request.stock_quantity,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated successfully"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<ProductModel>, ServiceError> {
    validate_input(&request)?;
    let product = state
        .services
        .products
        .update_product(
            id,
            UpdateProductInput {
                name: request.name,
                description: request.description,
                category: request.category,
                price: request.price,
                stock_quantity: request.stock_quantity,
                is_active: request.is_active,
            },
        )
        .await?;
    Ok(Json(product))
}

/// Archive a product
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product archived successfully"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn archive_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductModel>, ServiceError> {
    let product = state.services.products.archive_product(id).await?;
    Ok(Json(product))
}

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/slug/:slug", get(get_product_by_slug));

    let manage = Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product).delete(archive_product))
        .with_permission(perms::PRODUCTS_MANAGE);

    public.merge(manage)
}
