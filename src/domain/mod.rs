pub mod notification;
pub mod principal;
pub mod product;
pub mod transaction;

pub use notification::GatewayNotification;
pub use principal::{Principal, Role};
pub use product::{NewProduct, Product, ProductDetails, DEFAULT_IMAGE};
pub use transaction::{NewTransaction, Transaction, TransactionStatus};
