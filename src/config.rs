//! Engine-wide tunables.
//!
//! A plain data struct, validated once at [`crate::population::Population::create`]
//! rather than inside the struct itself: validation happens at the call site
//! that owns the resource being constructed.

use crate::activation::Activation;

/// Every tunable named in the option table, collected into one struct.
///
/// Shape fields and per-mutation probabilities have no universally sensible
/// default and should be set explicitly by the caller; [`Config::default`]
/// leaves them at the values the original source used in its own demos.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub network_inputs: usize,
    pub network_outputs: usize,
    pub network_hidden_nodes: usize,

    pub population_size: usize,
    pub minimum_time_before_replacement: u32,

    pub species_stagnation_threshold: u32,
    pub species_stagnations_allowed: u32,
    pub species_ticks_before_reassignment: u32,

    pub species_crossover_probability: f32,
    pub interspecies_crossover_probability: f32,

    pub genome_add_neuron_mutation_probability: f32,
    pub genome_add_link_mutation_probability: f32,
    pub genome_change_activation_probability: f32,
    pub genome_weight_mutation_probability: f32,
    pub genome_all_weights_mutation_probability: f32,

    pub genome_minimum_ticks_alive: usize,
    pub genome_compatibility_threshold: f32,

    pub genome_default_hidden_activation: Activation,
    pub genome_default_output_activation: Activation,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network_inputs: 0,
            network_outputs: 0,
            network_hidden_nodes: 0,

            population_size: 0,
            minimum_time_before_replacement: 10,

            species_stagnation_threshold: 100,
            species_stagnations_allowed: 2,
            species_ticks_before_reassignment: 10,

            species_crossover_probability: 0.6,
            interspecies_crossover_probability: 0.2,

            genome_add_neuron_mutation_probability: 0.1,
            genome_add_link_mutation_probability: 0.3,
            genome_change_activation_probability: 0.1,
            genome_weight_mutation_probability: 0.5,
            genome_all_weights_mutation_probability: 0.02,

            genome_minimum_ticks_alive: 100,
            genome_compatibility_threshold: 0.2,

            genome_default_hidden_activation: Activation::ReLU,
            genome_default_output_activation: Activation::Sigmoid,
        }
    }
}
