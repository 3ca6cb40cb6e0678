// Catalog and discovery
pub mod products;
pub mod reviews;
pub mod wishlists;

// Purchasing
pub mod carts;
pub mod coupons;
pub mod orders;

// Accounts and support
pub mod support;
pub mod users;

pub use carts::{CartDetail, CartService};
pub use coupons::{calculate_discount, CouponService, CreateCouponInput, UpdateCouponInput};
pub use orders::{CheckoutInput, OrderDetail, OrderService};
pub use products::{CreateProductInput, ProductListFilter, ProductService, UpdateProductInput};
pub use reviews::{
    sort_by_helpfulness, weighted_rating, ReviewService, ReviewSort, SubmitReviewInput,
};
pub use support::{OpenTicketInput, SupportService, TicketDetail};
pub use users::{UpdateProfileInput, UserService};
pub use wishlists::{WishlistDetail, WishlistEntry, WishlistService};
