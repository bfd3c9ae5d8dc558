pub mod activation;
pub mod config;
pub mod errors;
pub mod genome;
pub mod network;
pub mod population;
pub mod species;

pub use activation::Activation;
pub use config::Config;
pub use errors::{NeatError, NeatResult};
pub use genome::Genome;
pub use network::Network;
pub use population::Population;
pub use species::Species;
