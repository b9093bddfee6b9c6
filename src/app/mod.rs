pub mod clients;
pub mod context;
pub mod error;

pub use clients::{ClientCache, ClientKey, HttpClients};
pub use context::{AppContext, HarvestOptions};
pub use error::{Result, WeirError};
