//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod currency;
pub mod history;
pub mod interchange;
pub mod journal;
pub mod ledger;
pub mod locks;
pub mod log;
pub mod model;
pub mod positions;
pub mod price;
pub mod repository;
pub mod sectors;
pub mod trading;
pub mod valuation;

// Re-export main types for cleaner imports
pub use currency::{ExchangeRateProvider, ExchangeRateService, RateQuote};
pub use price::{PriceProvider, PriceResult, QuoteService};
pub use repository::{Repository, UnitOfWork};
