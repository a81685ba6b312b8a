//! Domain types shared across the API client, repositories, and orchestrator.

pub mod ids;
pub mod item;
pub mod logistic;
pub mod order;
pub mod shop;

pub use ids::{PackageNumber, TrackingNumber};
pub use item::OrderItem;
pub use logistic::{Logistic, LogisticHistory};
pub use order::{ActionStatus, FulfillmentFlag, Order, OrderStatus};
pub use shop::{Company, Shop};
