//! Persistent entities for the storefront core.
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod wallet;

// Re-export entities
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{CouponStatus, DiscountType, Entity as Coupon, Model as CouponModel};
pub use customer_address::{Entity as CustomerAddress, Model as CustomerAddressModel};
pub use order::{
    Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use wallet::{Entity as Wallet, Model as WalletModel};
