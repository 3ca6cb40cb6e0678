//! SeaORM entities for the storefront schema.
//!
//! Each entity re-exports under an aliased name so call sites read
//! `entities::Coupon::find()` instead of `entities::coupon::Entity::find()`.

pub mod cart;
pub mod cart_coupon;
pub mod cart_item;
pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod order_item;
pub mod product;
pub mod review;
pub mod review_vote;
pub mod support_ticket;
pub mod ticket_message;
pub mod user;
pub mod wishlist;
pub mod wishlist_item;

pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_coupon::{Entity as CartCoupon, Model as CartCouponModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel, ProductCategory};
pub use review::{Entity as Review, Model as ReviewModel, ModerationStatus};
pub use review_vote::{Entity as ReviewVote, Model as ReviewVoteModel, VoteKind};
pub use support_ticket::{
    Entity as SupportTicket, Model as SupportTicketModel, TicketCategory, TicketPriority,
    TicketStatus,
};
pub use ticket_message::{Entity as TicketMessage, Model as TicketMessageModel, SenderRole};
pub use user::{Entity as User, Model as UserModel, UserRole};
pub use wishlist::{Entity as Wishlist, Model as WishlistModel};
pub use wishlist_item::{Entity as WishlistItem, Model as WishlistItemModel};
