//! Dense feed-forward network representation.
//!
//! Weights, per-neuron outputs and per-neuron activations are held in flat
//! `Vec`s rather than a graph of heap-allocated nodes — the whole point of
//! the rt-NEAT encoding is that topology growth is representable as pure
//! layout arithmetic over those `Vec`s, so `add_hidden_layer` rebuilds a
//! fresh network and copies slices across rather than shuffling memory in
//! place the way a hand-rolled `realloc` would.

use std::ops::Range;

use rand::Rng;

use crate::activation::Activation;
use crate::errors::{NeatError, NeatResult};

/// A fixed-input/output-width, fixed-hidden-width feed-forward network whose
/// hidden-layer *count* can grow over its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct Network {
    n_in: usize,
    n_hidden_width: usize,
    n_out: usize,
    n_hidden_layers: usize,
    bias: f32,
    weights: Vec<f32>,
    outputs: Vec<f32>,
    activations: Vec<Activation>,
}

impl Network {
    /// Builds a network with all weights/outputs zeroed, all activations
    /// `Passthrough`, and bias `-1.0`.
    ///
    /// Fails if any of `n_in`, `n_hidden_width`, `n_out` is zero.
    /// `n_hidden_layers` may be zero.
    pub fn create(
        n_in: usize,
        n_hidden_width: usize,
        n_out: usize,
        n_hidden_layers: usize,
    ) -> NeatResult<Self> {
        if n_in == 0 {
            return Err(NeatError::InvalidShape("n_in"));
        }
        if n_hidden_width == 0 {
            return Err(NeatError::InvalidShape("n_hidden_width"));
        }
        if n_out == 0 {
            return Err(NeatError::InvalidShape("n_out"));
        }

        let mut net = Network {
            n_in,
            n_hidden_width,
            n_out,
            n_hidden_layers: 0,
            bias: -1.0,
            weights: Vec::new(),
            outputs: Vec::new(),
            activations: Vec::new(),
        };
        net.resize_for_layers(0);

        for _ in 0..n_hidden_layers {
            net.push_empty_hidden_layer();
        }

        Ok(net)
    }

    pub fn n_in(&self) -> usize {
        self.n_in
    }

    pub fn n_hidden_width(&self) -> usize {
        self.n_hidden_width
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    pub fn n_hidden_layers(&self) -> usize {
        self.n_hidden_layers
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn n_neurons(&self) -> usize {
        self.n_in + self.n_hidden_width * self.n_hidden_layers + self.n_out
    }

    pub fn n_activations(&self) -> usize {
        self.n_hidden_width * self.n_hidden_layers + self.n_out
    }

    pub fn n_weights(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    /// Per-neuron output/received-input buffer (length [`Network::n_neurons`]).
    pub fn neuron_outputs(&self) -> &[f32] {
        &self.outputs
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.bias = bias;
    }

    pub fn set_weights(&mut self, weights: Vec<f32>) {
        debug_assert_eq!(weights.len(), self.weights.len());
        self.weights = weights;
    }

    pub fn set_activations(&mut self, hidden: Activation, output: Activation) {
        let n_hidden_activs = self.n_hidden_width * self.n_hidden_layers;
        for (i, a) in self.activations.iter_mut().enumerate() {
            *a = if i < n_hidden_activs { hidden } else { output };
        }
    }

    /// Mutable handle to a single weight, addressed by its flat index into
    /// the weight array (see [`Network::weight_offset_to_neuron`]).
    pub fn weight_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.weights[index]
    }

    /// Mutable handle to a single activation slot, addressed by its flat
    /// index into the activation array (`neuron_id - n_in`).
    pub fn activation_mut(&mut self, index: usize) -> &mut Activation {
        &mut self.activations[index]
    }

    /// The global neuron-id range covered by hidden layer `layer` (1-based:
    /// `1` is the first hidden layer, up to and including
    /// [`Network::n_hidden_layers`]).
    pub fn hidden_layer_neuron_range(&self, layer: usize) -> Range<usize> {
        debug_assert!(layer >= 1 && layer <= self.n_hidden_layers);
        let start = self.n_in + (layer - 1) * self.n_hidden_width;
        start..start + self.n_hidden_width
    }

    /// Draws every weight uniformly from `[-0.5, 0.5]`.
    pub fn randomize(&mut self, rng: &mut impl Rng) {
        for w in self.weights.iter_mut() {
            *w = rng.gen_range(-0.5..0.5);
        }
    }

    /// `[n_in, hidden, hidden, .., n_out]` widths, layer by layer.
    fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.n_hidden_layers + 2);
        sizes.push(self.n_in);
        for _ in 0..self.n_hidden_layers {
            sizes.push(self.n_hidden_width);
        }
        sizes.push(self.n_out);
        sizes
    }

    /// Neuron index of the first neuron in each layer.
    fn layer_neuron_offsets(sizes: &[usize]) -> Vec<usize> {
        let mut offsets = vec![0usize; sizes.len()];
        let mut acc = 0;
        for (i, &s) in sizes.iter().enumerate() {
            offsets[i] = acc;
            acc += s;
        }
        offsets
    }

    /// Weight-array offset of the start of each downstream layer's block.
    /// Index 0 is unused (the input layer has no incoming block).
    fn layer_weight_offsets(sizes: &[usize]) -> Vec<usize> {
        let mut offsets = vec![0usize; sizes.len()];
        let mut acc = 0;
        for k in 1..sizes.len() {
            offsets[k] = acc;
            acc += (sizes[k - 1] + 1) * sizes[k];
        }
        offsets
    }

    fn neuron_layer(&self, id: usize) -> (usize, usize) {
        let sizes = self.layer_sizes();
        let offsets = Self::layer_neuron_offsets(&sizes);
        for (li, &off) in offsets.iter().enumerate().rev() {
            if id >= off {
                return (li, id - off);
            }
        }
        unreachable!("neuron id {id} out of range")
    }

    /// Index inside the weight array of the bias weight feeding neuron `id`.
    ///
    /// `id` must not be an input neuron (inputs have no incoming weights).
    pub fn weight_offset_to_neuron(&self, id: usize) -> usize {
        debug_assert!(id >= self.n_in, "input neurons have no incoming weights");
        debug_assert!(id < self.n_neurons());
        let sizes = self.layer_sizes();
        let (layer, local) = self.neuron_layer(id);
        let block_size = sizes[layer - 1] + 1;
        Self::layer_weight_offsets(&sizes)[layer] + local * block_size
    }

    /// Inputs are always connected. Any other neuron is connected iff at
    /// least one of its incoming non-bias weights is nonzero.
    pub fn neuron_is_connected(&self, id: usize) -> bool {
        if id < self.n_in {
            return true;
        }
        let sizes = self.layer_sizes();
        let (layer, _) = self.neuron_layer(id);
        let block_size = sizes[layer - 1] + 1;
        let start = self.weight_offset_to_neuron(id);
        self.weights[start + 1..start + block_size]
            .iter()
            .any(|&w| w != 0.0)
    }

    fn resize_for_layers(&mut self, n_hidden_layers: usize) {
        self.n_hidden_layers = n_hidden_layers;
        self.weights = vec![0.0; self.computed_n_weights()];
        self.outputs = vec![0.0; self.n_neurons()];
        self.activations = vec![Activation::Passthrough; self.n_activations()];
    }

    fn computed_n_weights(&self) -> usize {
        if self.n_hidden_layers == 0 {
            (self.n_in + 1) * self.n_out
        } else {
            (self.n_in + 1) * self.n_hidden_width
                + (self.n_hidden_layers - 1) * (self.n_hidden_width + 1) * self.n_hidden_width
                + (self.n_hidden_width + 1) * self.n_out
        }
    }

    /// Used only by `create` to grow an initially-empty network up to its
    /// starting hidden-layer count, with no identity-bridging (there is
    /// nothing live yet to preserve).
    fn push_empty_hidden_layer(&mut self) {
        self.grow_hidden_layer(0.0, None);
    }

    /// Appends one hidden layer right before the output layer.
    ///
    /// Preserves every previously existing weight and activation; the new
    /// layer bridges from the same vertical index in the previous layer
    /// with `connection_weight`, keeping the network close to an identity
    /// map when `connection_weight == 1.0`.
    pub fn add_hidden_layer(&mut self, connection_weight: f32) {
        self.grow_hidden_layer(connection_weight, None);
    }

    /// As [`Network::add_hidden_layer`], but also grows two companion `u32`
    /// tag arrays (one shaped like the weight array, one like the activation
    /// array) through the exact same layout transformation — used by
    /// [`crate::genome::Genome`] to keep its innovation-number bookkeeping in
    /// lockstep with the network's own layout when a layer is inserted.
    /// Newly created, identity-bridged weight slots are stamped with
    /// `new_tag`; every other new slot is tagged `0`.
    pub fn add_hidden_layer_with_tags(
        &mut self,
        connection_weight: f32,
        weight_tags: &mut Vec<u32>,
        activ_tags: &mut Vec<u32>,
        new_tag: u32,
    ) {
        self.grow_hidden_layer(connection_weight, Some((weight_tags, activ_tags, new_tag)));
    }

    fn grow_hidden_layer(
        &mut self,
        connection_weight: f32,
        tags: Option<(&mut Vec<u32>, &mut Vec<u32>, u32)>,
    ) {
        let old_sizes = self.layer_sizes();
        let old_neuron_offsets = Self::layer_neuron_offsets(&old_sizes);
        let old_weight_offsets = Self::layer_weight_offsets(&old_sizes);
        let prev_last_size = old_sizes[old_sizes.len() - 2];
        let old_output_start_weight = old_weight_offsets[old_sizes.len() - 1];
        let old_output_start_neuron = old_neuron_offsets[old_sizes.len() - 1];
        let old_output_start_activ = old_output_start_neuron - self.n_in;

        self.n_hidden_layers += 1;
        let new_sizes = self.layer_sizes();
        let new_neuron_offsets = Self::layer_neuron_offsets(&new_sizes);
        let new_weight_offsets = Self::layer_weight_offsets(&new_sizes);
        let new_layer_idx = new_sizes.len() - 2;
        let new_layer_start_neuron = new_neuron_offsets[new_layer_idx];
        let new_layer_start_activ = new_layer_start_neuron - self.n_in;
        let new_output_start_weight = new_weight_offsets[new_sizes.len() - 1];
        let new_output_start_activ = new_neuron_offsets[new_sizes.len() - 1] - self.n_in;
        let new_block_size = prev_last_size + 1;

        let mut new_weights = vec![0.0; self.computed_n_weights()];
        // Every block before the new layer is untouched by the insertion.
        new_weights[..old_output_start_weight].copy_from_slice(&self.weights[..old_output_start_weight]);

        // New block: previous-last-layer -> new hidden layer. Identity-bridge
        // one weight per new neuron when the previous layer has a neuron at
        // the same vertical index; everything else stays disabled.
        for j in 0..self.n_hidden_width {
            if j < prev_last_size {
                let idx = new_weight_offsets[new_layer_idx] + j * new_block_size + 1 + j;
                new_weights[idx] = connection_weight;
            }
        }

        // Output block: remap by vertical index. Preserves every weight
        // whose source neuron still exists at the same local index in the
        // (possibly differently-sized) new previous layer; bias is always
        // preserved.
        remap_block(
            &self.weights[old_output_start_weight..],
            prev_last_size,
            &mut new_weights[new_output_start_weight..],
            self.n_hidden_width,
            self.n_out,
        );

        let mut new_outputs = vec![0.0; self.n_neurons()];
        new_outputs[..old_output_start_neuron].copy_from_slice(&self.outputs[..old_output_start_neuron]);

        let mut new_activations = vec![Activation::Passthrough; self.n_activations()];
        new_activations[..new_layer_start_activ]
            .copy_from_slice(&self.activations[..old_output_start_activ.min(new_layer_start_activ)]);
        new_activations[new_output_start_activ..]
            .copy_from_slice(&self.activations[old_output_start_activ..]);

        if let Some((weight_tags, activ_tags, new_tag)) = tags {
            let mut new_weight_tags = vec![0u32; new_weights.len()];
            new_weight_tags[..old_output_start_weight].copy_from_slice(&weight_tags[..old_output_start_weight]);
            for j in 0..self.n_hidden_width {
                if j < prev_last_size {
                    let idx = new_weight_offsets[new_layer_idx] + j * new_block_size + 1 + j;
                    new_weight_tags[idx] = new_tag;
                }
            }
            remap_block(
                &weight_tags[old_output_start_weight..],
                prev_last_size,
                &mut new_weight_tags[new_output_start_weight..],
                self.n_hidden_width,
                self.n_out,
            );

            let mut new_activ_tags = vec![0u32; new_activations.len()];
            new_activ_tags[..new_layer_start_activ]
                .copy_from_slice(&activ_tags[..old_output_start_activ.min(new_layer_start_activ)]);
            new_activ_tags[new_output_start_activ..].copy_from_slice(&activ_tags[old_output_start_activ..]);

            *weight_tags = new_weight_tags;
            *activ_tags = new_activ_tags;
        }

        self.weights = new_weights;
        self.outputs = new_outputs;
        self.activations = new_activations;
    }

    /// Evaluates the network layer by layer on `inputs`, returning the
    /// output-layer slice.
    pub fn run(&mut self, inputs: &[f32]) -> NeatResult<&[f32]> {
        if inputs.len() != self.n_in {
            return Err(NeatError::InputArityMismatch {
                expected: self.n_in,
                found: inputs.len(),
            });
        }

        self.outputs[..self.n_in].copy_from_slice(inputs);

        let sizes = self.layer_sizes();
        let neuron_offsets = Self::layer_neuron_offsets(&sizes);
        let weight_offsets = Self::layer_weight_offsets(&sizes);

        for k in 1..sizes.len() {
            let prev_size = sizes[k - 1];
            let prev_start = neuron_offsets[k - 1];
            let cur_size = sizes[k];
            let cur_start = neuron_offsets[k];
            let block_size = prev_size + 1;
            let wbase = weight_offsets[k];
            let activ_base = cur_start - self.n_in;

            for j in 0..cur_size {
                let wstart = wbase + j * block_size;
                let mut sum = self.weights[wstart] * self.bias;
                for p in 0..prev_size {
                    sum += self.weights[wstart + 1 + p] * self.outputs[prev_start + p];
                }
                self.outputs[cur_start + j] = self.activations[activ_base + j].apply(sum);
            }
        }

        let out_start = neuron_offsets[sizes.len() - 1];
        Ok(&self.outputs[out_start..])
    }
}

/// Copies a downstream weight block, preserving each per-neuron bias and
/// every source weight whose vertical index still exists in the new
/// previous-layer width; anything beyond `new_prev_size` (or not present in
/// the old block) stays disabled (zero), matching the identity-bridge
/// behavior used when a hidden layer is inserted.
fn remap_block<T: Copy>(old: &[T], old_prev_size: usize, new: &mut [T], new_prev_size: usize, n_downstream: usize) {
    let old_block = old_prev_size + 1;
    let new_block = new_prev_size + 1;
    let common = old_prev_size.min(new_prev_size);
    for d in 0..n_downstream {
        let old_start = d * old_block;
        let new_start = d * new_block;
        new[new_start] = old[old_start];
        new[new_start + 1..new_start + 1 + common].copy_from_slice(&old[old_start + 1..old_start + 1 + common]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_rejects_zero_widths() {
        assert!(Network::create(0, 1, 1, 0).is_err());
        assert!(Network::create(1, 0, 1, 0).is_err());
        assert!(Network::create(1, 1, 0, 0).is_err());
    }

    #[test]
    fn weight_and_neuron_counts_match_layout_formula() {
        let net = Network::create(3, 4, 2, 0).unwrap();
        assert_eq!(net.n_weights(), (3 + 1) * 2);
        assert_eq!(net.n_neurons(), 3 + 2);

        let net = Network::create(3, 4, 2, 1).unwrap();
        assert_eq!(net.n_weights(), (3 + 1) * 4 + (4 + 1) * 2);
        assert_eq!(net.n_neurons(), 3 + 4 + 2);

        let net = Network::create(3, 4, 2, 3).unwrap();
        assert_eq!(net.n_weights(), (3 + 1) * 4 + 2 * (4 + 1) * 4 + (4 + 1) * 2);
        assert_eq!(net.n_neurons(), 3 + 4 * 3 + 2);
        assert_eq!(net.n_activations(), 4 * 3 + 2);
    }

    #[test]
    fn network_identity_after_layer_growth() {
        // Scenario 1 from the spec.
        let mut net = Network::create(1, 1, 1, 1).unwrap();
        net.set_bias(0.0);
        net.set_weights(vec![0.0, 1.0, 0.0, 2.0]);
        let out = net.run(&[1.0]).unwrap().to_vec();
        assert_eq!(out, vec![2.0]);

        net.add_hidden_layer(3.0);
        let out = net.run(&[1.0]).unwrap().to_vec();
        assert_eq!(out, vec![6.0]);
    }

    #[test]
    fn hand_built_xor() {
        // Scenario 2.
        let mut net = Network::create(2, 2, 1, 1).unwrap();
        net.set_activations(Activation::ReLU, Activation::ReLU);
        net.set_bias(0.0);
        net.set_weights(vec![0.0, -1.0, 1.0, 0.0, 1.0, -1.0, 0.0, 1.0, 1.0]);

        let cases = [
            ([0.0, 0.0], 0.0),
            ([0.0, 1.0], 1.0),
            ([1.0, 0.0], 1.0),
            ([1.0, 1.0], 0.0),
        ];
        for (input, want) in cases {
            let out = net.run(&input).unwrap();
            assert_eq!(out, &[want]);
        }
    }

    #[test]
    fn relu_passthrough() {
        // Scenario 3.
        let mut net = Network::create(1, 1, 1, 0).unwrap();
        net.set_activations(Activation::ReLU, Activation::ReLU);
        net.set_bias(0.0);
        net.set_weights(vec![1.0, 1.0]);
        for (x, want) in [(-1.0, 0.0), (0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)] {
            let out = net.run(&[x]).unwrap();
            assert_eq!(out, &[want]);
        }
    }

    #[test]
    fn sigmoid_single_neuron() {
        // Scenario 4.
        let mut net = Network::create(1, 1, 1, 0).unwrap();
        net.set_activations(Activation::Sigmoid, Activation::Sigmoid);
        net.set_bias(0.0);
        net.set_weights(vec![1.0, 1.0]);
        let out = net.run(&[1.0]).unwrap();
        assert!((out[0] - 0.7311).abs() < 0.1);
    }

    #[test]
    fn run_rejects_wrong_arity() {
        let mut net = Network::create(2, 3, 1, 0).unwrap();
        assert!(net.run(&[1.0]).is_err());
        assert!(net.run(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn zero_hidden_layers_uses_direct_block() {
        let net = Network::create(2, 5, 3, 0).unwrap();
        assert_eq!(net.n_weights(), (2 + 1) * 3);
    }

    #[test]
    fn deep_copy_runs_identically() {
        let mut net = Network::create(3, 4, 2, 2).unwrap();
        let mut rng = rand::thread_rng();
        net.randomize(&mut rng);
        net.set_activations(Activation::ReLU, Activation::Sigmoid);

        let mut copy = net.clone();
        let input = [0.3, -0.2, 0.9];
        assert_eq!(net.run(&input).unwrap(), copy.run(&input).unwrap());
    }

    #[test]
    fn neuron_is_connected_reflects_nonzero_incoming_weights() {
        let mut net = Network::create(1, 1, 1, 0).unwrap();
        assert!(net.neuron_is_connected(0)); // input always connected
        assert!(!net.neuron_is_connected(1)); // all weights zero at creation
        net.set_weights(vec![0.0, 1.0]);
        assert!(net.neuron_is_connected(1));
    }

    #[test]
    fn add_hidden_layer_with_mismatched_widths_preserves_common_indices() {
        let mut net = Network::create(2, 4, 1, 0).unwrap();
        net.set_weights(vec![0.5, 1.0, 2.0, 9.0]); // bias, in0, in1 feeding the single output
        net.add_hidden_layer(1.0);
        // Output block now has prev width 4 (hidden), only 2 common indices preserved.
        let out_start = net.weights().len() - (4 + 1);
        assert_eq!(net.weights()[out_start], 0.5); // bias preserved
        assert_eq!(net.weights()[out_start + 1], 1.0);
        assert_eq!(net.weights()[out_start + 2], 2.0);
        assert_eq!(net.weights()[out_start + 3], 0.0);
        assert_eq!(net.weights()[out_start + 4], 0.0);
    }
}
