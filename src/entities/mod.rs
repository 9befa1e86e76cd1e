pub mod cart_item;
pub mod order;
pub mod product;
pub mod vendor_order;
pub mod vendor_order_item;

pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use product::Entity as Product;
pub use vendor_order::Entity as VendorOrder;
pub use vendor_order_item::Entity as VendorOrderItem;
