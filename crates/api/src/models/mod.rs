//! Domain models for the API.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`]. Request payloads that create or change a model live next
//! to it and carry their own `validate` methods.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{CartItemView, CartLine, CartOwnerKey, CartView};
pub use order::{NewOrder, Order, OrderLine};
pub use product::{NewProduct, Product, ProductFilter, ProductSort, ProductUpdate};
pub use user::{Address, CurrentUser, User};
