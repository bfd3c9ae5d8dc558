//! The rt-NEAT driver: owns every genome and species, runs per-tick
//! evaluation, and periodically replaces the single worst genome with a
//! freshly bred and mutated child.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::errors::{NeatError, NeatResult};
use crate::genome::Genome;
use crate::network::Network;
use crate::species::Species;

/// An exclusively-owned, single-threaded population of genomes partitioned
/// into species. Every mutating method takes `&mut self`; there is no
/// interior mutability and no locking anywhere in the core.
pub struct Population {
    genomes: Vec<Genome>,
    species: Vec<Species>,
    innovation: u32,
    ticks: u64,
    reassignment_ticks: u32,
    config: Config,
}

impl Population {
    /// Validates `config`, builds `population_size` fresh random genomes
    /// sharing the initial innovation id, and places them all in one
    /// starting species.
    pub fn create(config: Config) -> NeatResult<Population> {
        Self::create_with_rng(config, &mut rand::thread_rng())
    }

    /// As [`Population::create`], but draws randomness from the supplied
    /// generator instead of the thread-local default — used by tests that
    /// need a deterministic population.
    pub fn create_with_rng(config: Config, rng: &mut impl Rng) -> NeatResult<Population> {
        if config.network_inputs == 0 {
            return Err(NeatError::InvalidPopulationConfig("network_inputs"));
        }
        if config.network_outputs == 0 {
            return Err(NeatError::InvalidPopulationConfig("network_outputs"));
        }
        if config.network_hidden_nodes == 0 {
            return Err(NeatError::InvalidPopulationConfig("network_hidden_nodes"));
        }
        if config.population_size == 0 {
            return Err(NeatError::InvalidPopulationConfig("population_size"));
        }
        if config.minimum_time_before_replacement == 0 {
            return Err(NeatError::InvalidPopulationConfig("minimum_time_before_replacement"));
        }

        let innovation = 1;
        let mut genomes = Vec::with_capacity(config.population_size);
        for _ in 0..config.population_size {
            genomes.push(Genome::create(&config, innovation, rng)?);
        }

        let mut starting_species = Species::create(config.population_size);
        for id in 0..config.population_size {
            starting_species.add_genome(id);
        }

        info!(population_size = config.population_size, "population created");

        Ok(Population {
            genomes,
            species: vec![starting_species],
            innovation,
            ticks: 0,
            reassignment_ticks: 0,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn population_size(&self) -> usize {
        self.genomes.len()
    }

    fn check_genome_id(&self, id: usize) -> NeatResult<()> {
        if id >= self.genomes.len() {
            return Err(NeatError::GenomeIdOutOfRange { id, population_size: self.genomes.len() });
        }
        Ok(())
    }

    fn check_species_id(&self, id: usize) -> NeatResult<()> {
        if id >= self.species.len() {
            return Err(NeatError::SpeciesIdOutOfRange { id, num_species: self.species.len() });
        }
        Ok(())
    }

    pub fn run(&mut self, id: usize, inputs: &[f32]) -> NeatResult<&[f32]> {
        self.check_genome_id(id)?;
        self.genomes[id].run(inputs)
    }

    pub fn set_fitness(&mut self, id: usize, fitness: f32) -> NeatResult<()> {
        self.check_genome_id(id)?;
        self.genomes[id].set_fitness(fitness);
        Ok(())
    }

    pub fn increase_time_alive(&mut self, id: usize) -> NeatResult<()> {
        self.check_genome_id(id)?;
        self.genomes[id].increase_time_alive();
        Ok(())
    }

    pub fn get_network(&self, id: usize) -> NeatResult<&Network> {
        self.check_genome_id(id)?;
        Ok(self.genomes[id].network())
    }

    pub fn get_species_id(&self, id: usize) -> NeatResult<usize> {
        self.check_genome_id(id)?;
        let pos = self.species.iter().position(|s| s.contains_genome(id));
        debug_assert!(pos.is_some(), "genome {id} is not assigned to any species");
        Ok(pos.unwrap_or(0))
    }

    pub fn get_num_species(&self) -> usize {
        self.species.len()
    }

    pub fn get_num_genomes_in_species(&self, species_id: usize) -> NeatResult<usize> {
        self.check_species_id(species_id)?;
        Ok(self.species[species_id].len())
    }

    pub fn get_average_fitness_of_species(&self, species_id: usize) -> NeatResult<f32> {
        self.check_species_id(species_id)?;
        Ok(self.species[species_id].avg_fitness())
    }

    pub fn get_species_is_alive(&self, species_id: usize) -> NeatResult<bool> {
        self.check_species_id(species_id)?;
        Ok(self.species[species_id].is_active())
    }

    /// The heart of rt-NEAT: advances the tick counter and, every
    /// `minimum_time_before_replacement` ticks, replaces at most one genome.
    /// Returns the id of the replaced genome, or `None` if this tick did not
    /// replace (either off-cadence, or no eligible genome was found).
    #[instrument(skip(self))]
    pub fn epoch(&mut self) -> Option<usize> {
        self.ticks += 1;
        if self.ticks % self.config.minimum_time_before_replacement as u64 != 0 {
            return None;
        }

        let mut rng = rand::thread_rng();

        let n_species_before = self.species.len();
        self.innovation += 1;

        for s in &mut self.species {
            s.increase_generation();
        }
        for s in &mut self.species {
            s.update_average_fitness(&self.genomes);
        }

        self.remove_duplicate_species();
        self.reassignment_ticks += 1;
        self.maybe_respeciate(self.species.len() != n_species_before, &mut rng);

        let worst_id = self.find_worst_genome()?;

        if let Some(idx) = self.species.iter().position(|s| s.contains_genome(worst_id)) {
            self.species[idx].remove_genome_if_exists(worst_id);
            if self.species[idx].is_empty() {
                self.species.remove(idx);
            }
        }

        self.reproduce(worst_id, &mut rng);

        self.maybe_respeciate(self.species.len() != n_species_before, &mut rng);

        debug!(replaced = worst_id, num_species = self.species.len(), "epoch advanced");
        Some(worst_id)
    }

    /// For every pair of active species whose representants are mutually
    /// compatible, deactivates the one with the lower average fitness.
    fn remove_duplicate_species(&mut self) {
        let threshold = self.config.genome_compatibility_threshold;
        let n = self.species.len();
        for i in 0..n {
            if !self.species[i].is_active() {
                continue;
            }
            for j in 0..n {
                if i == j || !self.species[j].is_active() {
                    continue;
                }
                let total_species = self.species.len();
                let rep_i = self.species[i].representant();
                let rep_j = self.species[j].representant();
                let compatible = self.genomes[rep_i].is_compatible(&self.genomes[rep_j], threshold, total_species);
                if !compatible {
                    continue;
                }
                if self.species[i].avg_fitness() < self.species[j].avg_fitness() {
                    self.deactivate(i);
                    break;
                } else {
                    self.deactivate(j);
                }
            }
        }
    }

    fn deactivate(&mut self, idx: usize) {
        self.species[idx].deactivate();
    }

    fn maybe_respeciate(&mut self, species_count_changed: bool, rng: &mut impl Rng) {
        if species_count_changed && self.reassignment_ticks > self.config.species_ticks_before_reassignment {
            self.respeciate(rng);
        }
    }

    fn respeciate(&mut self, rng: &mut impl Rng) {
        info!("respeciating population");
        for id in 0..self.genomes.len() {
            if let Some(idx) = self.species.iter().position(|s| s.contains_genome(id)) {
                self.species[idx].remove_genome_if_exists(id);
                if self.species[idx].is_empty() {
                    self.species.remove(idx);
                }
            }
            self.assign_to_species(id, rng);
        }
        self.reassignment_ticks = 0;
    }

    /// First pass: drain one member from the first inactive species found.
    /// Otherwise: the genome with the lowest adjusted fitness among those
    /// past their grace period, walked from the highest index down.
    fn find_worst_genome(&self) -> Option<usize> {
        if let Some(s) = self.species.iter().find(|s| !s.is_active()) {
            return Some(s.representant());
        }

        let mut worst: Option<(usize, f32)> = None;
        for id in (0..self.genomes.len()).rev() {
            let genome = &self.genomes[id];
            if genome.time_alive() <= self.config.genome_minimum_ticks_alive {
                continue;
            }
            let species_idx = self.species.iter().position(|s| s.contains_genome(id))?;
            let adjusted = self.species[species_idx].adjusted_fitness(genome.fitness());
            if worst.map_or(true, |(_, best)| adjusted < best) {
                worst = Some((id, adjusted));
            }
        }
        worst.map(|(id, _)| id)
    }

    fn reproduce(&mut self, worst_id: usize, rng: &mut impl Rng) {
        for s in &mut self.species {
            s.update_average_fitness(&self.genomes);
        }
        for idx in (0..self.species.len()).rev() {
            self.species[idx].cull(
                &mut self.genomes,
                self.config.species_stagnation_threshold,
                self.config.species_stagnations_allowed,
            );
        }

        self.species
            .sort_by(|a, b| b.avg_fitness().partial_cmp(&a.avg_fitness()).unwrap());

        let total_avg: f32 = self.species.iter().map(Species::avg_fitness).sum::<f32>() / self.species.len() as f32;

        let mut parent_species_idx = self.species.len() - 1;
        let mut r: f32 = rng.gen();
        for (idx, s) in self.species.iter().enumerate() {
            let selection_prob = if total_avg != 0.0 { s.avg_fitness() / total_avg } else { 0.0 };
            if r > selection_prob {
                r -= selection_prob;
                continue;
            }
            parent_species_idx = idx;
            break;
        }

        let parent1_id = self.species[parent_species_idx].select_best(&self.genomes);
        let parent2_id = self.crossover_get_parent2(parent_species_idx, rng);

        let mut child = if parent1_id == parent2_id {
            self.genomes[parent1_id].clone()
        } else if rng.gen::<f32>() < self.config.species_crossover_probability {
            Genome::reproduce(&self.genomes[parent1_id], &self.genomes[parent2_id], rng)
        } else {
            self.genomes[parent1_id].clone()
        };

        child.mutate(&self.config, self.innovation, rng);
        child.reset_time_alive();

        self.genomes[worst_id] = child;
        self.assign_to_species(worst_id, rng);
    }

    fn crossover_get_parent2(&self, parent_species_idx: usize, rng: &mut impl Rng) -> usize {
        if rng.gen::<f32>() < self.config.interspecies_crossover_probability {
            let eligible: Vec<usize> = (0..self.species.len())
                .filter(|&i| i != parent_species_idx && self.species[i].is_active() && !self.species[i].is_empty())
                .collect();
            if let Some(&other) = eligible.choose(rng) {
                return self.species[other].select_best(&self.genomes);
            }
        }
        self.species[parent_species_idx].select_second_best(&self.genomes)
    }

    fn assign_to_species(&mut self, genome_id: usize, rng: &mut impl Rng) {
        let mut order: Vec<usize> = (0..self.species.len()).collect();
        order.shuffle(rng);

        let threshold = self.config.genome_compatibility_threshold;
        let total_species = self.species.len();
        for idx in order {
            if self.species[idx].is_empty() || !self.species[idx].is_active() {
                continue;
            }
            let representant = self.species[idx].representant();
            if representant == genome_id {
                continue;
            }
            if self.genomes[genome_id].is_compatible(&self.genomes[representant], threshold, total_species) {
                self.species[idx].add_genome(genome_id);
                return;
            }
        }

        let mut fresh = Species::create(self.config.population_size);
        fresh.add_genome(genome_id);
        self.species.push(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(population_size: usize, minimum_time_before_replacement: u32) -> Config {
        Config {
            network_inputs: 2,
            network_outputs: 1,
            network_hidden_nodes: 4,
            population_size,
            minimum_time_before_replacement,
            genome_minimum_ticks_alive: 0,
            ..Config::default()
        }
    }

    #[test]
    fn create_rejects_zero_fields() {
        let mut bad = config(5, 3);
        bad.population_size = 0;
        assert!(Population::create(bad).is_err());

        let mut bad = config(5, 3);
        bad.network_inputs = 0;
        assert!(Population::create(bad).is_err());
    }

    #[test]
    fn create_partitions_all_genomes_into_one_species() {
        let mut rng = StdRng::seed_from_u64(1);
        let pop = Population::create_with_rng(config(6, 3), &mut rng).unwrap();
        assert_eq!(pop.get_num_species(), 1);
        assert_eq!(pop.get_num_genomes_in_species(0).unwrap(), 6);
    }

    #[test]
    fn out_of_range_ids_return_errors() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pop = Population::create_with_rng(config(3, 3), &mut rng).unwrap();
        assert!(pop.run(10, &[0.0, 0.0]).is_err());
        assert!(pop.set_fitness(10, 1.0).is_err());
        assert!(pop.get_network(10).is_err());
        assert!(pop.get_num_genomes_in_species(10).is_err());
    }

    #[test]
    fn epoch_cadence_gates_replacement() {
        // Scenario 5: population_size=5, minimum_time_before_replacement=3.
        let mut rng = StdRng::seed_from_u64(3);
        let mut pop = Population::create_with_rng(config(5, 3), &mut rng).unwrap();
        for id in 0..5 {
            pop.set_fitness(id, id as f32).unwrap();
            for _ in 0..5 {
                pop.increase_time_alive(id).unwrap();
            }
        }

        assert_eq!(pop.epoch(), None);
        assert_eq!(pop.epoch(), None);
        // The third call is on-cadence; it may or may not find a genome
        // eligible for replacement depending on time_alive bookkeeping, but
        // it must not panic and must respect the invariant that population
        // size never changes.
        let _ = pop.epoch();
        assert_eq!(pop.population_size(), 5);
    }

    #[test]
    fn species_membership_is_a_partition() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut pop = Population::create_with_rng(config(8, 1), &mut rng).unwrap();
        for id in 0..8 {
            pop.set_fitness(id, (id as f32) * 0.3).unwrap();
            for _ in 0..3 {
                pop.increase_time_alive(id).unwrap();
            }
        }
        for _ in 0..20 {
            pop.epoch();
        }
        let total: usize = (0..pop.get_num_species()).map(|s| pop.get_num_genomes_in_species(s).unwrap()).sum();
        assert_eq!(total, 8);
    }

    #[test]
    #[ignore]
    fn xor_via_rt_neat_smoke_test() {
        // Scenario 6: stochastic, multi-thousand-epoch smoke test.
        let mut rng = StdRng::seed_from_u64(42);
        let cfg = Config {
            network_inputs: 2,
            network_outputs: 1,
            network_hidden_nodes: 16,
            population_size: 20,
            minimum_time_before_replacement: 1,
            genome_minimum_ticks_alive: 0,
            ..Config::default()
        };
        let mut pop = Population::create_with_rng(cfg, &mut rng).unwrap();
        const CASES: [([f32; 2], f32); 4] = [
            ([0.0, 0.0], 0.0),
            ([0.0, 1.0], 1.0),
            ([1.0, 0.0], 1.0),
            ([1.0, 1.0], 0.0),
        ];

        let mut best_error = f32::MAX;
        for _ in 0..10_000 {
            for id in 0..pop.population_size() {
                let mut error = 0.0f32;
                for (input, want) in CASES {
                    let got = pop.run(id, &input).unwrap()[0];
                    error += (got - want).abs();
                }
                pop.set_fitness(id, (4.0 - error).powi(2)).unwrap();
                pop.increase_time_alive(id).unwrap();
                best_error = best_error.min(error);
            }
            pop.epoch();
            if best_error < 0.1 {
                break;
            }
        }
        assert!(best_error < 0.1, "best summed XOR error was {best_error}");
    }
}
