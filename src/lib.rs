#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Escape-time fractal renderer
//!
//! The Mandelbrot set is the set of points `c` on the complex plane
//! for which repeatedly squaring `z` and adding `c`, starting from
//! zero, never runs off to infinity.  We can't iterate forever, so we
//! count how many iterations each point survives before its magnitude
//! exceeds the divergence radius, up to some cap.  Points that reach
//! the cap are treated as being in the set; the count for every other
//! point says how fast it diverged, and is the number used to color
//! the image.
//!
//! The crate lays a pixel grid over a rectangle of the complex plane,
//! computes that count for every pixel on a pool of worker threads,
//! and pours the results into a `PixelSink`.  Two sinks are provided
//! for the usual uses: `BinarySink`, which records set membership and
//! estimates the area of the set, and `ColorSink`, which fills an RGB
//! framebuffer ready for the `image` crate's encoders.

extern crate crossbeam;
#[macro_use]
extern crate failure;
extern crate image;
extern crate itertools;
#[macro_use]
extern crate log;
extern crate num;
extern crate num_cpus;

#[cfg(test)]
extern crate rand;

pub mod errors;
pub mod escape;
pub mod planes;
pub mod render;
pub mod sink;

pub use errors::RenderError;
pub use escape::{escape_time, EscapeTime, Mandelbrot, DIVERGENCE_RADIUS, MAX_ITERATIONS};
pub use planes::{ComplexRegion, PixelBounds, PlaneMapper};
pub use render::{CancelToken, Granularity, Renderer};
pub use sink::{BinarySink, ColorSink, CountSink, PixelSink};
