pub mod registry;

pub use registry::{CurrencyPairRow, RegistryRow};
