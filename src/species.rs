//! A bag of genome indices competing against each other via fitness sharing.
//!
//! `Species` never borrows from [`crate::population::Population`] directly —
//! it only stores `usize` indices into the population's genome array, so a
//! species can outlive any number of genome replacements without chasing
//! pointers. The handful of operations that need genome data take `&[Genome]`
//! as a parameter instead of holding a back-reference.

use tracing::warn;

use crate::genome::Genome;

/// One species: an ordered, non-owning list of genome ids plus fitness and
/// stagnation bookkeeping.
#[derive(Clone, Debug)]
pub struct Species {
    genome_ids: Vec<usize>,
    avg_fitness: f32,
    max_avg_fitness: f32,
    generation: u32,
    generation_with_max_fitness: u32,
    times_stagnated: u32,
    active: bool,
}

impl Species {
    pub fn create(population_size: usize) -> Species {
        Species {
            genome_ids: Vec::with_capacity(population_size),
            avg_fitness: 0.0,
            max_avg_fitness: 0.0,
            generation: 0,
            generation_with_max_fitness: 0,
            times_stagnated: 0,
            active: true,
        }
    }

    pub fn genome_ids(&self) -> &[usize] {
        &self.genome_ids
    }

    pub fn len(&self) -> usize {
        self.genome_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genome_ids.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn avg_fitness(&self) -> f32 {
        self.avg_fitness
    }

    /// Appends `id`. The caller must ensure it is not already a member.
    /// Resets stagnation bookkeeping, since fresh blood gives the species
    /// another chance to improve before it's judged stagnant again.
    pub fn add_genome(&mut self, id: usize) {
        debug_assert!(!self.genome_ids.contains(&id));
        self.genome_ids.push(id);
        self.times_stagnated = 0;
        self.max_avg_fitness = 0.0;
        self.generation_with_max_fitness = self.generation;
    }

    /// Swap-removes `id` if present; returns whether it was found. The
    /// caller is responsible for discarding the species once it is empty.
    pub fn remove_genome_if_exists(&mut self, id: usize) -> bool {
        if let Some(pos) = self.genome_ids.iter().position(|&g| g == id) {
            self.genome_ids.swap_remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains_genome(&self, id: usize) -> bool {
        self.genome_ids.contains(&id)
    }

    /// The species representant: the first genome ever added, fixed until
    /// the species is rebuilt.
    pub fn representant(&self) -> usize {
        debug_assert!(!self.genome_ids.is_empty());
        self.genome_ids[0]
    }

    /// Per-genome fitness used when hunting for the population's worst
    /// member: raw fitness divided by species size (fitness sharing).
    pub fn adjusted_fitness(&self, raw_fitness: f32) -> f32 {
        raw_fitness / self.genome_ids.len() as f32
    }

    pub fn update_average_fitness(&mut self, genomes: &[Genome]) {
        let sum: f32 = self.genome_ids.iter().map(|&id| genomes[id].fitness()).sum();
        self.avg_fitness = sum / self.genome_ids.len() as f32;
        if self.avg_fitness > self.max_avg_fitness {
            self.max_avg_fitness = self.avg_fitness;
            self.generation_with_max_fitness = self.generation;
        }
    }

    /// Genome id with the highest raw fitness; ties keep the first
    /// occurrence encountered.
    pub fn select_best(&self, genomes: &[Genome]) -> usize {
        debug_assert!(!self.genome_ids.is_empty());
        *self
            .genome_ids
            .iter()
            .max_by(|&&a, &&b| genomes[a].fitness().partial_cmp(&genomes[b].fitness()).unwrap())
            .unwrap()
    }

    /// Genome id with the second-highest raw fitness. If only one genome
    /// exists, returns it.
    ///
    /// Known design weakness (documented, not fixed): this is a single pass
    /// tracking a running best/second-best pair, so it returns "one of the
    /// top two", not necessarily the true runner-up under ties or certain
    /// orderings. Treat it as "a strong parent distinct from the champion,"
    /// not as a guaranteed-exact second place.
    pub fn select_second_best(&self, genomes: &[Genome]) -> usize {
        debug_assert!(!self.genome_ids.is_empty());
        if self.genome_ids.len() == 1 {
            return self.genome_ids[0];
        }

        let mut best = self.genome_ids[0];
        let mut second = self.genome_ids[1];
        if genomes[second].fitness() > genomes[best].fitness() {
            std::mem::swap(&mut best, &mut second);
        }
        for &id in &self.genome_ids[2..] {
            let f = genomes[id].fitness();
            if f > genomes[best].fitness() {
                second = best;
                best = id;
            } else if f > genomes[second].fitness() {
                second = id;
            }
        }
        second
    }

    pub fn increase_generation(&mut self) {
        self.generation += 1;
    }

    /// Forces this species inactive outside the stagnation counter, e.g.
    /// when it is found to duplicate another, fitter species.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Stagnation check: if this species hasn't improved its max average
    /// fitness in `stagnation_threshold` generations, count a stagnation. If
    /// stagnations exceed `stagnations_allowed`, permanently deactivate the
    /// species; otherwise reset its fitness extrema and rebuild the species
    /// by overwriting every member's genome with a copy of the representant
    /// — a fresh start for the survivors, seeded from the best-known point.
    pub fn cull(&mut self, genomes: &mut [Genome], stagnation_threshold: u32, stagnations_allowed: u32) {
        if !self.active {
            return;
        }
        if self.generation - self.generation_with_max_fitness <= stagnation_threshold {
            return;
        }

        self.times_stagnated += 1;
        if self.times_stagnated > stagnations_allowed {
            self.active = false;
            warn!(
                species_size = self.genome_ids.len(),
                times_stagnated = self.times_stagnated,
                "species stagnated past its allowance; deactivating"
            );
        } else {
            self.max_avg_fitness = 0.0;
            self.generation_with_max_fitness = self.generation;
            if let [first, rest @ ..] = self.genome_ids.as_slice() {
                let representant = genomes[*first].clone();
                for &id in rest {
                    genomes[id] = representant.clone();
                }
            }
        }
    }
}
