pub mod portfolio;
pub mod quote;
pub mod transaction;
pub mod user;

pub use portfolio::{Holding, HoldingValuation, PortfolioReport};
pub use quote::Quote;
pub use transaction::{NewTransaction, Side, Transaction};
pub use user::User;
