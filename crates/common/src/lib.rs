//! Shared identifiers and value types used across the checkout workspace.

pub mod ids;
pub mod money;
pub mod version;

pub use ids::{OrderId, OrderNumber, ProductId, UserId};
pub use money::{Money, ParseMoneyError};
pub use version::Version;
