use thiserror::Error;

/// Error taxonomy for the rt-NEAT engine.
///
/// Every fallible, externally-reachable entry point returns one of these;
/// internal invariants that a caller cannot violate through the public API
/// remain `debug_assert!`-guarded instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NeatError {
    #[error("invalid network shape: {0} must be greater than 0")]
    InvalidShape(&'static str),

    #[error("invalid population config: {0} must be greater than 0")]
    InvalidPopulationConfig(&'static str),

    #[error("genome id {id} out of range (population size is {population_size})")]
    GenomeIdOutOfRange { id: usize, population_size: usize },

    #[error("species id {id} out of range ({num_species} species exist)")]
    SpeciesIdOutOfRange { id: usize, num_species: usize },

    #[error("input arity mismatch: network expects {expected} inputs, got {found}")]
    InputArityMismatch { expected: usize, found: usize },
}

pub type NeatResult<T> = Result<T, NeatError>;
