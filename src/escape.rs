// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time iteration.  Take a point `c` on the complex plane,
//! repeatedly square `z` and add `c`, and count how many times we can
//! do that before `z` leaves the disc of the divergence radius.  Points
//! that never leave within the iteration cap are considered to be in
//! the Mandelbrot set.

use num::Complex;

/// Iterations after which a point is considered not to diverge.
pub const MAX_ITERATIONS: usize = 10_000;

/// Magnitude beyond which a point has escaped.
pub const DIVERGENCE_RADIUS: f64 = 2.0;

/// This is our classic iterator function.  It returns the number of
/// completed iterations before `|z|` was seen to exceed `radius`, or
/// `max_iterations` if it never did.
///
/// The comparison is on the magnitude itself, not its square, and a
/// point sitting exactly on the radius has not escaped.
#[inline]
pub fn escape_time(c: Complex<f64>, max_iterations: usize, radius: f64) -> usize {
    let mut z = Complex::new(0.0_f64, 0.0_f64);
    for n in 0..max_iterations {
        z = z * z + c;
        if z.norm() > radius {
            return n;
        }
    }
    max_iterations
}

/// A pluggable escape function.  The renderer calls `escape` once per
/// pixel, from many threads at once, so implementations must be pure.
pub trait EscapeTime: Sync {
    /// The largest value `escape` can return, meaning "did not diverge".
    fn max_iterations(&self) -> usize;

    /// The escape count for a single point, in `0..=max_iterations()`.
    fn escape(&self, c: Complex<f64>) -> usize;
}

/// The quadratic Mandelbrot map, `z <- z^2 + c`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mandelbrot {
    max_iterations: usize,
    radius: f64,
}

impl Mandelbrot {
    /// An evaluator with the given iteration cap and the standard
    /// divergence radius.
    pub fn new(max_iterations: usize) -> Self {
        Mandelbrot {
            max_iterations,
            radius: DIVERGENCE_RADIUS,
        }
    }

    /// Replace the divergence radius.
    pub fn with_radius(self, radius: f64) -> Self {
        Mandelbrot { radius, ..self }
    }

    /// The divergence radius in use.
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Default for Mandelbrot {
    fn default() -> Self {
        Mandelbrot::new(MAX_ITERATIONS)
    }
}

impl EscapeTime for Mandelbrot {
    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn escape(&self, c: Complex<f64>) -> usize {
        escape_time(c, self.max_iterations, self.radius)
    }
}
