//! Scalar activation kernels.
//!
//! A small, closed set of nonlinearities, dispatched through a plain enum
//! rather than a trait object: there is no backward pass here, so there is
//! nothing a vtable would buy us.

use rand::Rng;

/// One of the four scalar nonlinearities a neuron can carry.
///
/// `Passthrough` doubles as the "this neuron/link is disabled" marker
/// throughout the genome encoding (see [`crate::genome::Genome`]); any other
/// variant means the neuron is live.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Activation {
    /// Identity function. Also the disabled-neuron marker.
    #[default]
    Passthrough,
    /// Logistic sigmoid, saturating outside `[-45, 45]` to avoid overflow.
    Sigmoid,
    /// `x / (1 + |x|)`.
    FastSigmoid,
    /// `max(0, x)`.
    ReLU,
}

const ALL: [Activation; 4] = [
    Activation::Passthrough,
    Activation::Sigmoid,
    Activation::FastSigmoid,
    Activation::ReLU,
];

impl Activation {
    /// Applies this activation to a single pre-activation sum.
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Passthrough => x,
            Activation::Sigmoid => {
                if x < -45.0 {
                    0.0
                } else if x > 45.0 {
                    1.0
                } else {
                    1.0 / (1.0 + (-x).exp())
                }
            }
            Activation::FastSigmoid => x / (1.0 + x.abs()),
            Activation::ReLU => x.max(0.0),
        }
    }

    /// Picks a random activation distinct from `self` (used by the
    /// change-activation mutation).
    pub fn random_except(self, rng: &mut impl Rng) -> Activation {
        loop {
            let candidate = ALL[rng.gen_range(0..ALL.len())];
            if candidate != self {
                return candidate;
            }
        }
    }
}
