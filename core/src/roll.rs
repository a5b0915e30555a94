//! # Random source seam
//!
//! Every sampler in the crate draws through [`UniformSource`] rather than a
//! concrete rng. The constrained rollers need the raw uniform draw (they
//! invert a cumulative distribution over loss subsets), unconstrained game
//! rolls only need the derived binary [`UniformSource::chance`].
//!
//! Any `rand::Rng` is a `UniformSource`, so simulation code passes a seeded
//! `StdRng` while tests can inject a [`Scripted`] source with known draws.

/// A uniform `[0, 1)` source with a derived binary draw.
pub trait UniformSource {
    /// Draw from uniform `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Draw from the binary distribution with success probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.uniform() <= p
    }
}

impl<R: rand::Rng> UniformSource for R {
    fn uniform(&mut self) -> f64 {
        self.random::<f64>()
    }
}

/// Replays a fixed sequence of draws.
///
/// # Panics
///
/// Panics when drawn from more times than it has values; exhausting the
/// script is a test bug.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    draws: Vec<f64>,
    next: usize,
}

impl Scripted {
    pub fn new(draws: Vec<f64>) -> Self {
        Self { draws, next: 0 }
    }

    /// Number of draws consumed so far.
    pub fn consumed(&self) -> usize {
        self.next
    }
}

impl UniformSource for Scripted {
    fn uniform(&mut self) -> f64 {
        let draw = self.draws[self.next];
        self.next += 1;
        draw
    }
}
