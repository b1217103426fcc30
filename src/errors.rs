// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Everything that can stop a render.  All of these are reported
//! before or after the workers run, never halfway through a pixel:
//! escape-time evaluation is pure, so nothing here is worth retrying.

use planes::PixelBounds;

/// The failures a render can report.
#[derive(Debug, Clone, PartialEq, Fail)]
pub enum RenderError {
    /// The pixels we were asked to render are unusable: the rectangle
    /// is empty, too large to address, or not exactly the rectangle the
    /// sink covers.
    #[fail(
        display = "Cannot render the pixel bounds {} into a sink covering {}",
        requested, sink
    )]
    InvalidBounds {
        /// The pixel rectangle handed to the renderer.
        requested: PixelBounds,
        /// The pixel rectangle the sink reports.
        sink: PixelBounds,
    },

    /// The "max" corner of the complex region lies to the left of or
    /// below the "min" corner.
    #[fail(display = "The left lower corner is not below and to the left of the right upper corner")]
    InvertedRegion,

    /// The complex region has zero (or non-finite) width or height, so
    /// there is no step between neighbouring pixels.
    #[fail(display = "The complex region has a degenerate width or height")]
    DegenerateRegion,

    /// A worker panicked, with the message of the first panic seen.
    /// Every other worker has been joined by the time this is returned,
    /// and the sink contents are meaningless.
    #[fail(display = "A render worker panicked: {}", _0)]
    WorkerPanicked(String),

    /// The render was cancelled before every work unit was dispatched.
    #[fail(display = "The render was cancelled")]
    Cancelled,
}
