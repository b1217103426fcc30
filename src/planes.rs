// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the PlaneMapper struct, which describes a relationship
//! between a rectangle on the integral plane and a rectangle on the
//! complex plane with an arbitrary pair of corners defining the
//! leftlower and rightupper corners of the region.
use errors::RenderError;
use num::Complex;
use std::convert::TryFrom;
use std::fmt;

/// Describes the addressable pixels of a grid.  The minimum corner is
/// inclusive and the maximum corner is exclusive, so a 300x200 image
/// starting at the origin is `PixelBounds::new(0, 0, 300, 200)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PixelBounds {
    /// Leftmost column.
    pub min_x: i64,
    /// Topmost row.
    pub min_y: i64,
    /// One past the rightmost column.
    pub max_x: i64,
    /// One past the bottom row.
    pub max_y: i64,
}

impl PixelBounds {
    /// A pixel rectangle from its two corners.
    pub fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> PixelBounds {
        PixelBounds {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A pixel rectangle anchored at 0,0.  Sizes beyond `i64::MAX`
    /// saturate.
    pub fn from_size(width: usize, height: usize) -> PixelBounds {
        let clamp = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        PixelBounds::new(0, 0, clamp(width), clamp(height))
    }

    /// Number of columns; zero if the rectangle is inverted.
    pub fn width(&self) -> usize {
        span(self.min_x, self.max_x)
    }

    /// Number of rows; zero if the rectangle is inverted.
    pub fn height(&self) -> usize {
        span(self.min_y, self.max_y)
    }

    /// The total number of pixels in the grid, or `None` if that does
    /// not fit in memory addresses.
    pub fn checked_len(&self) -> Option<usize> {
        self.width().checked_mul(self.height())
    }

    /// The total number of pixels in the grid.  Used to calculate
    /// memory needs.  Saturates for grids too large to address.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    /// True if the grid has no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// True if the grid has pixels and every one of them can be given
    /// a linear offset.
    pub fn is_renderable(&self) -> bool {
        !self.is_empty() && self.checked_len().is_some()
    }

    /// True if the pixel is addressable in this grid.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    /// Linear, row-major offset of a pixel from the root of a buffer
    /// covering these bounds.
    pub fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        span(self.min_y, y)
            .checked_mul(self.width())?
            .checked_add(span(self.min_x, x))
    }
}

// Distance from `low` up to `high`, zero if `high <= low`.  The
// difference of two i64s always fits a u64, so this never overflows.
fn span(low: i64, high: i64) -> usize {
    if high > low {
        usize::try_from((high as u64).wrapping_sub(low as u64)).unwrap_or(usize::MAX)
    } else {
        0
    }
}

impl fmt::Display for PixelBounds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Describes the lower-left corner and upper-right corner of a region
/// of the complex plane, treating the real part of each value as the
/// x-component and the imaginary part of each value as the
/// y-component.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ComplexRegion {
    min: Complex<f64>,
    max: Complex<f64>,
}

impl ComplexRegion {
    /// Fails if `max` is to the left of or below `min`.  A region with
    /// zero width or height is accepted here; it is the mapping onto a
    /// pixel grid that cannot cope with it.
    pub fn new(min: Complex<f64>, max: Complex<f64>) -> Result<ComplexRegion, RenderError> {
        if max.re < min.re || max.im < min.im {
            return Err(RenderError::InvertedRegion);
        }
        Ok(ComplexRegion { min, max })
    }

    /// The left-lower corner.
    pub fn min(&self) -> Complex<f64> {
        self.min
    }

    /// The right-upper corner.
    pub fn max(&self) -> Complex<f64> {
        self.max
    }

    /// Extent along the real axis.
    pub fn width(&self) -> f64 {
        self.max.re - self.min.re
    }

    /// Extent along the imaginary axis.
    pub fn height(&self) -> f64 {
        self.max.im - self.min.im
    }

    /// The measure of the region.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True if a pixel grid laid over this region would have no
    /// usable step in at least one direction.
    pub fn is_degenerate(&self) -> bool {
        let (w, h) = (self.width(), self.height());
        !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0)
    }
}

/// Contains the definitions of two planes: an integral cartesian
/// plane, and a complex cartesian plane.  Maps pixels from the former
/// onto points in the latter.
#[derive(Debug, Clone)]
pub struct PlaneMapper {
    /// The pixel grid.
    pub bounds: PixelBounds,
    /// The region of the complex plane the grid covers.
    pub region: ComplexRegion,
    // Distance on the complex plane between neighbouring pixels, along
    // the real and imaginary axes respectively.
    steps: (f64, f64),
}

impl PlaneMapper {
    /// Takes the pixel grid and the complex region it covers.  Neither
    /// may be empty, and the grid must be small enough to address.
    pub fn new(bounds: PixelBounds, region: ComplexRegion) -> Result<PlaneMapper, RenderError> {
        if !bounds.is_renderable() {
            return Err(RenderError::InvalidBounds {
                requested: bounds,
                sink: bounds,
            });
        }
        if region.is_degenerate() {
            return Err(RenderError::DegenerateRegion);
        }

        let steps = (
            region.width() / (bounds.width() as f64),
            region.height() / (bounds.height() as f64),
        );

        Ok(PlaneMapper {
            bounds,
            region,
            steps,
        })
    }

    /// Given the column and row of a pixel on the integral plane,
    /// return the complex number at the equivalent location on the
    /// complex plane.  The grid's minimum corner maps onto `min`.
    pub fn pixel_to_point(&self, x: i64, y: i64) -> Complex<f64> {
        let offset = Complex::new(
            (span(self.bounds.min_x, x) as f64) * self.steps.0,
            (span(self.bounds.min_y, y) as f64) * self.steps.1,
        );
        self.region.min() + offset
    }
}
