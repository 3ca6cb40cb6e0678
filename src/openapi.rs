use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Backend for a small storefront: product catalog, customer reviews with
time-decayed ratings, carts with coupon discounts, checkout, wishlists,
support tickets and a per-user notification feed.

## Authentication

Obtain a token from `POST /auth/login` and send it on every protected
endpoint:

```
Authorization: Bearer <your-jwt-token>
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20,
capped by server configuration).
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "products", description = "Product catalog"),
        (name = "reviews", description = "Customer reviews and moderation"),
        (name = "cart", description = "Shopping cart"),
        (name = "coupons", description = "Discount coupons"),
        (name = "orders", description = "Checkout and order lifecycle"),
        (name = "wishlist", description = "Saved products"),
        (name = "support", description = "Support tickets"),
        (name = "notifications", description = "Per-user notification feed"),
        (name = "users", description = "Profiles and account administration")
    ),
    paths(
        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::get_product_by_slug,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::archive_product,

        // Reviews
        crate::handlers::reviews::list_product_reviews,
        crate::handlers::reviews::submit_review,
        crate::handlers::reviews::get_review,
        crate::handlers::reviews::vote_review,
        crate::handlers::reviews::report_review,
        crate::handlers::reviews::delete_review,
        crate::handlers::reviews::moderation_queue,
        crate::handlers::reviews::moderate_review,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item_quantity,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::apply_coupon,
        crate::handlers::carts::remove_coupon,

        // Coupons
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::deactivate_coupon,
        crate::handlers::coupons::validate_coupon,

        // Orders
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,

        // Wishlist
        crate::handlers::wishlists::get_wishlist,
        crate::handlers::wishlists::add_item,
        crate::handlers::wishlists::remove_item,
        crate::handlers::wishlists::move_to_cart,

        // Support
        crate::handlers::support::open_ticket,
        crate::handlers::support::list_my_tickets,
        crate::handlers::support::list_all_tickets,
        crate::handlers::support::get_ticket,
        crate::handlers::support::post_message,
        crate::handlers::support::assign_ticket,
        crate::handlers::support::change_ticket_status,
        crate::handlers::support::escalate_ticket,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::unread_count,
        crate::handlers::notifications::mark_as_read,
        crate::handlers::notifications::clear_notifications,

        // Users
        crate::handlers::users::get_profile,
        crate::handlers::users::update_profile,
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::set_role,
        crate::handlers::users::deactivate_user,
        crate::handlers::users::activate_user,
    ),
    components(
        schemas(
            crate::handlers::products::CreateProductRequest,
            crate::handlers::products::UpdateProductRequest,
            crate::handlers::reviews::SubmitReviewRequest,
            crate::handlers::reviews::VoteRequest,
            crate::handlers::reviews::ModerateRequest,
            crate::handlers::carts::AddItemRequest,
            crate::handlers::carts::UpdateQuantityRequest,
            crate::handlers::carts::ApplyCouponRequest,
            crate::handlers::coupons::CreateCouponRequest,
            crate::handlers::coupons::UpdateCouponRequest,
            crate::handlers::coupons::DiscountPreview,
            crate::handlers::orders::CheckoutRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::wishlists::AddWishlistItemRequest,
            crate::handlers::support::OpenTicketRequest,
            crate::handlers::support::PostMessageRequest,
            crate::handlers::support::AssignTicketRequest,
            crate::handlers::support::ChangeTicketStatusRequest,
            crate::handlers::notifications::UnreadCount,
            crate::handlers::users::UpdateProfileRequest,
            crate::handlers::users::SetRoleRequest,
            crate::errors::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/products"));
        assert!(json.contains("/api/v1/orders/checkout"));
        assert!(json.contains("Bearer"));
    }
}
