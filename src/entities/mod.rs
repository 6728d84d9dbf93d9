pub mod client_inventory;
pub mod order;
pub mod order_item;
pub mod product;
pub mod purchase_request;
