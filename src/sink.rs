// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pixel sinks: the write-only targets the renderer pours escape
//! counts into.  The renderer hands every worker the same `&sink` and
//! guarantees that no two workers ever touch the same pixel, so the
//! reference sinks below get away with relaxed atomics per pixel.  The
//! join at the end of a render orders every write before any read made
//! by the caller afterwards.

use image::{Rgb, RgbImage};
use planes::{ComplexRegion, PixelBounds};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Anything that can receive one escape count per pixel.
pub trait PixelSink: Sync {
    /// The pixels this sink can address.
    fn bounds(&self) -> PixelBounds;

    /// Record the escape count of one pixel.  Called concurrently from
    /// several workers, each with its own disjoint set of pixels.
    fn set_pixel(&self, x: i64, y: i64, escape: usize);
}

/// One bit per pixel: is this point in the set or not?
#[derive(Debug)]
pub struct BinarySink {
    bounds: PixelBounds,
    max_iterations: usize,
    pixels: Vec<AtomicBool>,
}

impl BinarySink {
    /// A sink for `bounds`, where a pixel is in the set iff its escape
    /// count equals `max_iterations`.
    pub fn new(bounds: PixelBounds, max_iterations: usize) -> Self {
        BinarySink {
            bounds,
            max_iterations,
            pixels: (0..bounds.len()).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Whether the pixel was found to be in the set.
    pub fn get(&self, x: i64, y: i64) -> Option<bool> {
        self.bounds
            .offset(x, y)
            .map(|offset| self.pixels[offset].load(Ordering::Relaxed))
    }

    /// The number of pixels in the set.
    pub fn count(&self) -> usize {
        self.pixels
            .iter()
            .filter(|p| p.load(Ordering::Relaxed))
            .count()
    }

    /// Estimate the area of the set from the fraction of pixels in it,
    /// given the region of the complex plane the pixels were sampled
    /// from.
    pub fn estimated_area(&self, region: &ComplexRegion) -> f64 {
        if self.bounds.is_empty() {
            return 0.0;
        }
        (self.count() as f64) * region.area() / (self.bounds.len() as f64)
    }
}

impl PixelSink for BinarySink {
    fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    fn set_pixel(&self, x: i64, y: i64, escape: usize) {
        if let Some(offset) = self.bounds.offset(x, y) {
            self.pixels[offset].store(escape == self.max_iterations, Ordering::Relaxed);
        }
    }
}

/// The raw escape count of every pixel.
#[derive(Debug)]
pub struct CountSink {
    bounds: PixelBounds,
    pixels: Vec<AtomicUsize>,
}

impl CountSink {
    /// A zeroed sink for `bounds`.
    pub fn new(bounds: PixelBounds) -> Self {
        CountSink {
            bounds,
            pixels: (0..bounds.len()).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// The escape count recorded for a pixel.
    pub fn get(&self, x: i64, y: i64) -> Option<usize> {
        self.bounds
            .offset(x, y)
            .map(|offset| self.pixels[offset].load(Ordering::Relaxed))
    }

    /// Every escape count, row-major.
    pub fn counts(&self) -> Vec<usize> {
        self.pixels
            .iter()
            .map(|p| p.load(Ordering::Relaxed))
            .collect()
    }
}

impl PixelSink for CountSink {
    fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    fn set_pixel(&self, x: i64, y: i64, escape: usize) {
        if let Some(offset) = self.bounds.offset(x, y) {
            self.pixels[offset].store(escape, Ordering::Relaxed);
        }
    }
}

/// A dense RGB framebuffer, filled by running each escape count
/// through a coloring function.
pub struct ColorSink<F> {
    bounds: PixelBounds,
    colorize: F,
    // Packed 0x00RRGGBB.
    pixels: Vec<AtomicU32>,
}

fn image_dimensions(bounds: &PixelBounds) -> Option<(u32, u32)> {
    let width = u32::try_from(bounds.width()).ok()?;
    let height = u32::try_from(bounds.height()).ok()?;
    Some((width, height))
}

fn pack(color: Rgb<u8>) -> u32 {
    let [r, g, b] = color.0;
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

fn unpack(packed: u32) -> Rgb<u8> {
    Rgb([(packed >> 16) as u8, (packed >> 8) as u8, packed as u8])
}

impl<F> ColorSink<F>
where
    F: Fn(usize) -> Rgb<u8> + Sync,
{
    /// A black framebuffer for `bounds`.
    pub fn new(bounds: PixelBounds, colorize: F) -> Self {
        ColorSink {
            bounds,
            colorize,
            pixels: (0..bounds.len()).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// The color recorded for a pixel.
    pub fn get(&self, x: i64, y: i64) -> Option<Rgb<u8>> {
        self.bounds
            .offset(x, y)
            .map(|offset| unpack(self.pixels[offset].load(Ordering::Relaxed)))
    }

    /// Hand the framebuffer over to the `image` crate for encoding.
    /// `None` if the grid is wider or taller than an image can be.
    pub fn into_image(self) -> Option<RgbImage> {
        let (width, height) = image_dimensions(&self.bounds)?;
        let pixels = self.pixels;
        Some(RgbImage::from_fn(width, height, |x, y| {
            let offset = (y as usize) * (width as usize) + (x as usize);
            unpack(pixels[offset].load(Ordering::Relaxed))
        }))
    }
}

impl<F> PixelSink for ColorSink<F>
where
    F: Fn(usize) -> Rgb<u8> + Sync,
{
    fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    fn set_pixel(&self, x: i64, y: i64, escape: usize) {
        if let Some(offset) = self.bounds.offset(x, y) {
            let color = (self.colorize)(escape);
            self.pixels[offset].store(pack(color), Ordering::Relaxed);
        }
    }
}

/// Black for points in the set, white for everything that escaped.
pub fn binary(max_iterations: usize) -> impl Fn(usize) -> Rgb<u8> + Sync + Copy {
    move |escape| {
        if escape == max_iterations {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    }
}

/// Black for points in the set; everything else is shaded by how
/// slowly it escaped, on a log scale so that the thin filaments near
/// the boundary stay visible.
pub fn grayscale(max_iterations: usize) -> impl Fn(usize) -> Rgb<u8> + Sync + Copy {
    move |escape| {
        if escape >= max_iterations {
            return Rgb([0, 0, 0]);
        }
        let scale = ((escape + 1) as f64).ln() / ((max_iterations + 1) as f64).ln();
        let level = 255 - (scale * 255.0).round().min(255.0) as u8;
        Rgb([level, level, level])
    }
}
