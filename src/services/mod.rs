// Order lifecycle
pub mod fragments;
pub mod order_status;
pub mod orders;

// Catalog and people
pub mod customers;
pub mod products;
pub mod users;

pub mod settings;

pub use fragments::{FragmentService, FragmentSpec, FragmentUpdate};
pub use order_status::{OrderStatusService, TransitionOptions};
pub use orders::{NewOrder, NewOrderItem, OrderPatch, OrderService};
pub use settings::{SettingsScope, SettingsService};
