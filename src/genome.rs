//! A single candidate solution: a [`Network`] plus historical-marking
//! ("innovation") metadata used for crossover and compatibility distance.

use rand::Rng;

use crate::activation::Activation;
use crate::config::Config;
use crate::errors::NeatResult;
use crate::network::Network;

/// One individual in a [`crate::population::Population`].
///
/// `innov_weight`/`innov_activ` carry, per weight/activation slot, the
/// innovation number stamped when that slot last became live; a `0` marks
/// the slot as never-live, matching `weight == 0.0` / `activation ==
/// Passthrough` one-for-one.
#[derive(Clone, Debug)]
pub struct Genome {
    network: Network,
    innov_weight: Vec<u32>,
    innov_activ: Vec<u32>,
    used_weights: usize,
    used_activs: usize,
    fitness: f32,
    time_alive: usize,
}

impl Genome {
    /// Builds a fresh genome: zero hidden layers, randomized weights in
    /// `[-0.5, 0.5]`, default activations from `config`, every live slot
    /// stamped with `innovation`.
    pub fn create(config: &Config, innovation: u32, rng: &mut impl Rng) -> NeatResult<Genome> {
        let mut network = Network::create(
            config.network_inputs,
            config.network_hidden_nodes,
            config.network_outputs,
            0,
        )?;
        network.randomize(rng);
        network.set_activations(config.genome_default_hidden_activation, config.genome_default_output_activation);

        let innov_weight = vec![innovation; network.n_weights()];
        let innov_activ = vec![innovation; network.n_activations()];

        let mut genome = Genome {
            network,
            innov_weight,
            innov_activ,
            used_weights: 0,
            used_activs: 0,
            fitness: 0.0,
            time_alive: 0,
        };
        genome.zeroify_innovations();
        Ok(genome)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn fitness(&self) -> f32 {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f32) {
        self.fitness = fitness;
    }

    pub fn time_alive(&self) -> usize {
        self.time_alive
    }

    pub fn increase_time_alive(&mut self) {
        self.time_alive += 1;
    }

    pub fn reset_time_alive(&mut self) {
        self.time_alive = 0;
    }

    pub fn used_weights(&self) -> usize {
        self.used_weights
    }

    pub fn used_activs(&self) -> usize {
        self.used_activs
    }

    /// Re-derives `innov_weight`/`innov_activ` and `used_weights`/`used_activs`
    /// from the current network contents: any slot whose value is the
    /// "empty" marker (`0.0` weight, `Passthrough` activation) has its
    /// innovation zeroed and is not counted as used.
    pub fn zeroify_innovations(&mut self) {
        self.used_weights = 0;
        for (tag, &w) in self.innov_weight.iter_mut().zip(self.network.weights()) {
            if w == 0.0 {
                *tag = 0;
            } else {
                self.used_weights += 1;
            }
        }

        self.used_activs = 0;
        for (tag, &a) in self.innov_activ.iter_mut().zip(self.network.activations()) {
            if a == Activation::Passthrough {
                *tag = 0;
            } else {
                self.used_activs += 1;
            }
        }
    }

    pub fn run(&mut self, inputs: &[f32]) -> NeatResult<&[f32]> {
        self.network.run(inputs)
    }

    /// Applies every gated mutation in turn. Add-neuron is forced
    /// (regardless of its configured probability) whenever the network has
    /// no hidden layers yet, since a network with zero hidden layers has
    /// nowhere else to grow topology.
    pub fn mutate(&mut self, config: &Config, innovation: u32, rng: &mut impl Rng) {
        let forced_add_neuron = self.network.n_hidden_layers() == 0;
        if forced_add_neuron || rng.gen::<f32>() < config.genome_add_neuron_mutation_probability {
            self.mutate_add_neuron(config, innovation, rng);
        }
        if rng.gen::<f32>() < config.genome_add_link_mutation_probability {
            self.mutate_add_link(innovation, rng);
        }
        if rng.gen::<f32>() < config.genome_change_activation_probability {
            self.mutate_change_activation(innovation, rng);
        }
        if rng.gen::<f32>() < config.genome_weight_mutation_probability {
            self.mutate_weight(innovation, rng);
        }
        if rng.gen::<f32>() < config.genome_all_weights_mutation_probability {
            self.mutate_all_weights(innovation, rng);
        }
    }

    fn mutate_add_neuron(&mut self, config: &Config, innovation: u32, rng: &mut impl Rng) {
        let n_hidden_layers = self.network.n_hidden_layers();
        // The selection range includes n_hidden_layers itself: landing on it
        // means "grow a new layer", which also covers the n_hidden_layers==0
        // case where the only possible draw is that value.
        let chosen = rng.gen_range(0..=n_hidden_layers);
        let layer = if chosen == n_hidden_layers {
            self.network
                .add_hidden_layer_with_tags(1.0, &mut self.innov_weight, &mut self.innov_activ, innovation);
            self.zeroify_innovations();
            self.network.n_hidden_layers()
        } else {
            chosen + 1
        };

        let range = self.network.hidden_layer_neuron_range(layer);
        let n_in = self.network.n_in();
        let offset = rng.gen_range(0..range.len());
        let is_last_hidden_layer = layer == self.network.n_hidden_layers();

        for step in 0..range.len() {
            let neuron_id = range.start + (offset + step) % range.len();
            let activ_idx = neuron_id - n_in;
            if self.network.activations()[activ_idx] == Activation::Passthrough {
                let activation = if is_last_hidden_layer {
                    config.genome_default_output_activation
                } else {
                    config.genome_default_hidden_activation
                };
                *self.network.activation_mut(activ_idx) = activation;
                self.innov_activ[activ_idx] = innovation;
                self.used_activs += 1;
                return;
            }
        }
    }

    fn mutate_add_link(&mut self, innovation: u32, rng: &mut impl Rng) {
        let candidates: Vec<usize> = self
            .network
            .weights()
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w == 0.0)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let idx = candidates[rng.gen_range(0..candidates.len())];
        *self.network.weight_mut(idx) = rng.gen_range(-2.0..2.0);
        self.innov_weight[idx] = innovation;
        self.used_weights += 1;
    }

    fn mutate_change_activation(&mut self, innovation: u32, rng: &mut impl Rng) {
        if self.innov_activ.is_empty() {
            return;
        }
        let idx = rng.gen_range(0..self.innov_activ.len());
        let current = self.network.activations()[idx];
        let next = current.random_except(rng);
        *self.network.activation_mut(idx) = next;

        let was_passthrough = current == Activation::Passthrough;
        let now_passthrough = next == Activation::Passthrough;
        self.innov_activ[idx] = if now_passthrough { 0 } else { innovation };
        if was_passthrough && !now_passthrough {
            self.used_activs += 1;
        } else if !was_passthrough && now_passthrough {
            self.used_activs -= 1;
        }
    }

    fn mutate_weight(&mut self, innovation: u32, rng: &mut impl Rng) {
        let live: Vec<usize> = self
            .network
            .weights()
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != 0.0)
            .map(|(i, _)| i)
            .collect();
        if live.is_empty() {
            return;
        }
        let idx = live[rng.gen_range(0..live.len())];
        *self.network.weight_mut(idx) = rng.gen_range(-2.0..2.0);
        self.innov_weight[idx] = innovation;
    }

    fn mutate_all_weights(&mut self, innovation: u32, rng: &mut impl Rng) {
        let live: Vec<usize> = self
            .network
            .weights()
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != 0.0)
            .map(|(i, _)| i)
            .collect();
        for idx in live {
            *self.network.weight_mut(idx) = rng.gen_range(-2.0..2.0);
            self.innov_weight[idx] = innovation;
        }
    }

    /// Blended crossover: the child starts as a copy of the higher-fitness
    /// parent; for every matching gene (same innovation id in both parents,
    /// within the shorter innovation array) the child's weight becomes the
    /// average of the two parents' weights. Disjoint and excess genes are
    /// inherited from the base parent automatically, since the child starts
    /// life as its copy.
    pub fn reproduce(p1: &Genome, p2: &Genome, _rng: &mut impl Rng) -> Genome {
        let base = if p2.fitness > p1.fitness { p2 } else { p1 };
        let mut child = base.clone();

        let min_n = p1.innov_weight.len().min(p2.innov_weight.len());
        for i in 0..min_n {
            if p1.innov_weight[i] == p2.innov_weight[i] {
                let blended = (p1.network.weights()[i] + p2.network.weights()[i]) / 2.0;
                *child.network.weight_mut(i) = blended;
            }
        }

        child.reset_time_alive();
        child.zeroify_innovations();
        child
    }

    /// Compatibility distance test used for speciation. `threshold` is
    /// scaled by the current species count before the comparison, so the
    /// bar tightens as more species exist.
    pub fn is_compatible(&self, other: &Genome, threshold: f32, total_species: usize) -> bool {
        let a = &self.innov_weight;
        let b = &other.innov_weight;
        let min_n = a.len().min(b.len());
        let max_n = a.len().max(b.len());
        if max_n == 0 {
            return true;
        }

        let mut matching = 0u32;
        let mut disjoint = 0u32;
        let mut weight_sum = 0.0f32;
        for i in 0..min_n {
            if a[i] == b[i] {
                matching += 1;
                weight_sum += (self.network.weights()[i] - other.network.weights()[i]).abs();
            } else {
                disjoint += 1;
            }
        }
        let excess = (max_n - min_n) as f32;

        let distance = 1.0 * excess / max_n as f32
            + 1.5 * disjoint as f32 / max_n as f32
            + 0.4 * weight_sum / (matching as f32 + 1.0);

        let adjusted_threshold = threshold * (0.1 + total_species as f32 / 5.0);
        distance < adjusted_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config() -> Config {
        Config {
            network_inputs: 2,
            network_outputs: 1,
            network_hidden_nodes: 3,
            ..Config::default()
        }
    }

    #[test]
    fn innovation_invariant_holds_after_create() {
        let mut rng = StdRng::seed_from_u64(1);
        let g = Genome::create(&config(), 1, &mut rng).unwrap();
        for (i, &w) in g.network.weights().iter().enumerate() {
            assert_eq!(w == 0.0, g.innov_weight[i] == 0);
        }
        for (i, &a) in g.network.activations().iter().enumerate() {
            assert_eq!(a == Activation::Passthrough, g.innov_activ[i] == 0);
        }
    }

    #[test]
    fn used_weights_matches_nonzero_count() {
        let mut rng = StdRng::seed_from_u64(2);
        let g = Genome::create(&config(), 1, &mut rng).unwrap();
        let nonzero = g.network.weights().iter().filter(|&&w| w != 0.0).count();
        assert_eq!(g.used_weights(), nonzero);
    }

    #[test]
    fn zeroify_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut g = Genome::create(&config(), 1, &mut rng).unwrap();
        g.zeroify_innovations();
        let snapshot = g.innov_weight.clone();
        g.zeroify_innovations();
        assert_eq!(g.innov_weight, snapshot);
    }

    #[test]
    fn copy_runs_identically() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut g = Genome::create(&config(), 1, &mut rng).unwrap();
        let mut copy = g.clone();
        let input = [0.2, -0.7];
        assert_eq!(g.run(&input).unwrap(), copy.run(&input).unwrap());
    }

    #[test]
    fn mutate_add_neuron_is_forced_with_zero_hidden_layers() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut cfg = config();
        cfg.genome_add_neuron_mutation_probability = 0.0;
        cfg.genome_add_link_mutation_probability = 0.0;
        cfg.genome_change_activation_probability = 0.0;
        cfg.genome_weight_mutation_probability = 0.0;
        cfg.genome_all_weights_mutation_probability = 0.0;

        let mut g = Genome::create(&cfg, 1, &mut rng).unwrap();
        assert_eq!(g.network.n_hidden_layers(), 0);
        g.mutate(&cfg, 2, &mut rng);
        assert_eq!(g.network.n_hidden_layers(), 1);
    }

    #[test]
    fn mutate_add_neuron_preserves_invariant() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut g = Genome::create(&config(), 1, &mut rng).unwrap();
        for tick in 0..10 {
            g.mutate_add_neuron(&config(), 2 + tick, &mut rng);
            for (i, &w) in g.network.weights().iter().enumerate() {
                assert_eq!(w == 0.0, g.innov_weight[i] == 0, "weight/innov mismatch at {i}");
            }
            for (i, &a) in g.network.activations().iter().enumerate() {
                assert_eq!(a == Activation::Passthrough, g.innov_activ[i] == 0, "activ/innov mismatch at {i}");
            }
        }
    }

    #[test]
    fn mutate_change_activation_preserves_invariant_on_disable() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut g = Genome::create(&config(), 1, &mut rng).unwrap();
        for i in 0..g.innov_activ.len() {
            *g.network.activation_mut(i) = Activation::ReLU;
            g.innov_activ[i] = 1;
        }

        // random_except draws from the full alphabet including Passthrough,
        // so repeated calls will eventually disable some neuron.
        let mut saw_disable = false;
        for tick in 0..200 {
            g.mutate_change_activation(2 + tick, &mut rng);
            for (i, &a) in g.network.activations().iter().enumerate() {
                assert_eq!(a == Activation::Passthrough, g.innov_activ[i] == 0, "activ/innov mismatch at {i}");
                if a == Activation::Passthrough {
                    saw_disable = true;
                }
            }
        }
        assert!(saw_disable, "expected change-activation to disable some neuron at least once in 200 tries");
    }

    #[test]
    fn reproduce_blends_matching_genes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p1 = Genome::create(&config(), 1, &mut rng).unwrap();
        let mut p2 = p1.clone();
        p1.set_fitness(1.0);
        p2.set_fitness(2.0);

        // Force one matching live slot with known, different values.
        *p1.network.weight_mut(0) = 1.0;
        p1.innov_weight[0] = 5;
        *p2.network.weight_mut(0) = 3.0;
        p2.innov_weight[0] = 5;

        let child = Genome::reproduce(&p1, &p2, &mut rng);
        assert_eq!(child.network.weights()[0], 2.0);
        assert_eq!(child.time_alive(), 0);
    }

    #[test]
    fn reproduce_same_genome_is_a_noop_blend() {
        let mut rng = StdRng::seed_from_u64(8);
        let g = Genome::create(&config(), 1, &mut rng).unwrap();
        let child = Genome::reproduce(&g, &g, &mut rng);
        assert_eq!(child.network.weights(), g.network.weights());
    }

    #[test]
    fn is_compatible_identical_genomes() {
        let mut rng = StdRng::seed_from_u64(9);
        let g = Genome::create(&config(), 1, &mut rng).unwrap();
        assert!(g.is_compatible(&g, 0.2, 1));
    }

    #[test]
    fn is_compatible_grows_stricter_with_more_species() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut g1 = Genome::create(&config(), 1, &mut rng).unwrap();
        let g2 = Genome::create(&config(), 2, &mut rng).unwrap();
        // Different innovation stamps at every slot => fully disjoint.
        for i in 0..g1.innov_weight.len() {
            g1.innov_weight[i] = 999;
        }
        assert!(!g1.is_compatible(&g2, 0.2, 1));
    }
}
