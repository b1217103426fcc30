// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parallel grid renderer.  The pixel grid is cut into disjoint
//! work units (rows, columns, single pixels, or the whole grid), the
//! units are fed through a channel to a fixed pool of scoped worker
//! threads, and every worker writes its escape counts straight into
//! the sink.  Because no two units share a pixel, the result does not
//! depend on how the grid was cut or how many threads ran.

use crossbeam::channel;
use escape::{EscapeTime, Mandelbrot};
use errors::RenderError;
use itertools::iproduct;
use planes::{ComplexRegion, PixelBounds, PlaneMapper};
use sink::PixelSink;
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// How the grid is cut into work units.  This only trades scheduling
/// overhead against load balance; the output is the same for all of
/// them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Granularity {
    /// One unit per row.
    Row,
    /// One unit per column.
    Column,
    /// One unit per pixel.
    Pixel,
    /// A single unit covering the whole grid, i.e. a sequential render.
    Whole,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Row
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row" => Ok(Granularity::Row),
            "column" => Ok(Granularity::Column),
            "pixel" => Ok(Granularity::Pixel),
            "whole" => Ok(Granularity::Whole),
            _ => Err(format!("Unknown granularity: {}", s)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Granularity::Row => "row",
            Granularity::Column => "column",
            Granularity::Pixel => "pixel",
            Granularity::Whole => "whole",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug)]
enum WorkUnit {
    Row(i64),
    Column(i64),
    Pixel(i64, i64),
    Whole,
}

/// Every unit of the grid at the given granularity.  The units are
/// disjoint and together cover each pixel exactly once.
fn work_units(
    bounds: PixelBounds,
    granularity: Granularity,
) -> Box<dyn Iterator<Item = WorkUnit> + Send> {
    match granularity {
        Granularity::Row => Box::new((bounds.min_y..bounds.max_y).map(WorkUnit::Row)),
        Granularity::Column => Box::new((bounds.min_x..bounds.max_x).map(WorkUnit::Column)),
        Granularity::Pixel => Box::new(
            iproduct!(bounds.min_y..bounds.max_y, bounds.min_x..bounds.max_x)
                .map(|(y, x)| WorkUnit::Pixel(x, y)),
        ),
        Granularity::Whole => Box::new(Some(WorkUnit::Whole).into_iter()),
    }
}

/// A handle for stopping a render early.  Cancelling stops new work
/// units from being dispatched; units already running are allowed to
/// finish, so the sink is never left with a half-written pixel.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Ask any render watching this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// Raises the abort flag if the worker holding it unwinds.
struct AbortOnPanic<'a>(&'a AtomicBool);

impl<'a> Drop for AbortOnPanic<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

// crossbeam hands back either the payload itself or, when spawned
// threads panicked, a Vec of their payloads in spawn order.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(panics) = payload.downcast_ref::<Vec<Box<dyn Any + Send + 'static>>>() {
        return match panics.first() {
            Some(first) => panic_message(&**first),
            None => "unknown panic".to_string(),
        };
    }
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

/// The renderer's configuration: which escape function to run, how to
/// cut up the grid, and how many worker threads to use.  Once built it
/// is immutable and can be reused for any number of renders.
#[derive(Clone, Debug)]
pub struct Renderer<E = Mandelbrot> {
    evaluator: E,
    granularity: Granularity,
    threads: usize,
}

impl Default for Renderer<Mandelbrot> {
    fn default() -> Self {
        Renderer::new(Mandelbrot::default())
    }
}

impl<E: EscapeTime> Renderer<E> {
    /// Row granularity, one thread per CPU.
    pub fn new(evaluator: E) -> Self {
        Renderer {
            evaluator,
            granularity: Granularity::default(),
            threads: num_cpus::get(),
        }
    }

    /// Set the number of worker threads.  Zero is treated as one.
    pub fn with_threads(self, threads: usize) -> Self {
        Renderer {
            threads: threads.max(1),
            ..self
        }
    }

    /// Set how the grid is cut into work units.
    pub fn with_granularity(self, granularity: Granularity) -> Self {
        Renderer {
            granularity,
            ..self
        }
    }

    /// Swap in a different escape function.
    pub fn with_evaluator<F: EscapeTime>(self, evaluator: F) -> Renderer<F> {
        Renderer {
            evaluator,
            granularity: self.granularity,
            threads: self.threads,
        }
    }

    /// The escape function in use.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// The work unit granularity.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Compute the escape count of every pixel in `bounds`, mapped onto
    /// `region`, and write each one into `sink` exactly once.  Returns
    /// only after every worker has finished.
    pub fn render<S: PixelSink>(
        &self,
        bounds: PixelBounds,
        region: ComplexRegion,
        sink: &S,
    ) -> Result<(), RenderError> {
        self.render_with_cancel(bounds, region, sink, &CancelToken::new())
    }

    /// As `render`, but watches `cancel` between work units.  If the
    /// token stops dispatch early the render returns
    /// `RenderError::Cancelled` and leaves the sink with some pixels
    /// written once and the rest untouched.  A token cancelled after
    /// the last unit went out changes nothing: the render completes.
    pub fn render_with_cancel<S: PixelSink>(
        &self,
        bounds: PixelBounds,
        region: ComplexRegion,
        sink: &S,
        cancel: &CancelToken,
    ) -> Result<(), RenderError> {
        let sink_bounds = sink.bounds();
        if sink_bounds != bounds || !bounds.is_renderable() {
            return Err(RenderError::InvalidBounds {
                requested: bounds,
                sink: sink_bounds,
            });
        }
        let plane = PlaneMapper::new(bounds, region)?;

        // No point in spinning up more workers than there are units.
        let units = match self.granularity {
            Granularity::Row => bounds.height(),
            Granularity::Column => bounds.width(),
            Granularity::Pixel => bounds.len(),
            Granularity::Whole => 1,
        };
        let workers = self.threads.min(units);
        debug!(
            "Rendering {} as {} {} units on {} workers",
            bounds, units, self.granularity, workers
        );

        let aborted = AtomicBool::new(false);
        let (sender, receiver) = channel::bounded::<WorkUnit>(workers * 4);

        let result = crossbeam::scope(|spawner| {
            for _ in 0..workers {
                let receiver = receiver.clone();
                let (plane, aborted) = (&plane, &aborted);
                spawner.spawn(move |_| {
                    let _guard = AbortOnPanic(aborted);
                    for unit in receiver.iter() {
                        self.run(unit, plane, sink);
                    }
                });
            }
            drop(receiver);

            let mut stopped = false;
            for unit in work_units(bounds, self.granularity) {
                if cancel.is_cancelled() {
                    stopped = true;
                    break;
                }
                if aborted.load(Ordering::SeqCst) {
                    break;
                }
                // Every worker has gone away, which only happens if they
                // all panicked.
                if sender.send(unit).is_err() {
                    break;
                }
            }
            drop(sender);
            stopped
        });

        match result {
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!("A worker panicked while rendering {}: {}", bounds, message);
                return Err(RenderError::WorkerPanicked(message));
            }
            Ok(true) => {
                warn!("Render of {} was cancelled", bounds);
                return Err(RenderError::Cancelled);
            }
            Ok(false) => {}
        }
        debug!("Rendered {} pixels", bounds.len());
        Ok(())
    }

    fn run<S: PixelSink>(&self, unit: WorkUnit, plane: &PlaneMapper, sink: &S) {
        trace!("Running {:?}", unit);
        let bounds = plane.bounds;
        match unit {
            WorkUnit::Row(y) => {
                for x in bounds.min_x..bounds.max_x {
                    self.plot(x, y, plane, sink);
                }
            }
            WorkUnit::Column(x) => {
                for y in bounds.min_y..bounds.max_y {
                    self.plot(x, y, plane, sink);
                }
            }
            WorkUnit::Pixel(x, y) => self.plot(x, y, plane, sink),
            WorkUnit::Whole => {
                for (y, x) in iproduct!(bounds.min_y..bounds.max_y, bounds.min_x..bounds.max_x) {
                    self.plot(x, y, plane, sink);
                }
            }
        }
    }

    #[inline]
    fn plot<S: PixelSink>(&self, x: i64, y: i64, plane: &PlaneMapper, sink: &S) {
        let escape = self.evaluator.escape(plane.pixel_to_point(x, y));
        sink.set_pixel(x, y, escape);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::Complex;
    use sink::{BinarySink, CountSink};
    use std::sync::atomic::AtomicUsize;

    fn region(min: (f64, f64), max: (f64, f64)) -> ComplexRegion {
        ComplexRegion::new(Complex::new(min.0, min.1), Complex::new(max.0, max.1)).unwrap()
    }

    // Counts how many times each pixel is written.
    struct RecordingSink {
        bounds: PixelBounds,
        writes: Vec<AtomicUsize>,
    }

    impl RecordingSink {
        fn new(bounds: PixelBounds) -> Self {
            RecordingSink {
                bounds,
                writes: (0..bounds.len()).map(|_| AtomicUsize::new(0)).collect(),
            }
        }

        fn writes(&self) -> Vec<usize> {
            self.writes.iter().map(|w| w.load(Ordering::SeqCst)).collect()
        }
    }

    impl PixelSink for RecordingSink {
        fn bounds(&self) -> PixelBounds {
            self.bounds
        }

        fn set_pixel(&self, x: i64, y: i64, _escape: usize) {
            let offset = self.bounds.offset(x, y).expect("write outside the grid");
            self.writes[offset].fetch_add(1, Ordering::SeqCst);
        }
    }

    // Cancels the token once it has seen `after` writes.
    struct CancellingSink {
        inner: RecordingSink,
        cancel: CancelToken,
        after: usize,
        seen: AtomicUsize,
    }

    impl CancellingSink {
        fn new(bounds: PixelBounds, cancel: CancelToken, after: usize) -> Self {
            CancellingSink {
                inner: RecordingSink::new(bounds),
                cancel,
                after,
                seen: AtomicUsize::new(0),
            }
        }
    }

    impl PixelSink for CancellingSink {
        fn bounds(&self) -> PixelBounds {
            self.inner.bounds()
        }

        fn set_pixel(&self, x: i64, y: i64, escape: usize) {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.cancel.cancel();
            }
            self.inner.set_pixel(x, y, escape);
        }
    }

    struct Explodes;

    impl EscapeTime for Explodes {
        fn max_iterations(&self) -> usize {
            1
        }

        fn escape(&self, c: Complex<f64>) -> usize {
            if c.re > 0.0 {
                panic!("exploding evaluator");
            }
            0
        }
    }

    #[test]
    fn granularity_parses_its_own_names() {
        for g in &[
            Granularity::Row,
            Granularity::Column,
            Granularity::Pixel,
            Granularity::Whole,
        ] {
            assert_eq!(g.to_string().parse::<Granularity>(), Ok(*g));
        }
        assert!("tile".parse::<Granularity>().is_err());
    }

    #[test]
    fn work_units_cover_the_grid() {
        let bounds = PixelBounds::new(-1, 2, 3, 5);
        assert_eq!(work_units(bounds, Granularity::Row).count(), 3);
        assert_eq!(work_units(bounds, Granularity::Column).count(), 4);
        assert_eq!(work_units(bounds, Granularity::Pixel).count(), 12);
        assert_eq!(work_units(bounds, Granularity::Whole).count(), 1);
    }

    #[test]
    fn every_pixel_is_written_exactly_once() {
        let bounds = PixelBounds::new(-7, 3, 30, 24);
        for g in &[
            Granularity::Row,
            Granularity::Column,
            Granularity::Pixel,
            Granularity::Whole,
        ] {
            for threads in &[1, 3, 8] {
                let sink = RecordingSink::new(bounds);
                Renderer::new(Mandelbrot::new(50))
                    .with_granularity(*g)
                    .with_threads(*threads)
                    .render(bounds, region((-2.0, -1.0), (1.0, 1.0)), &sink)
                    .unwrap();
                assert!(sink.writes().iter().all(|&w| w == 1), "{} x {}", g, threads);
            }
        }
    }

    #[test]
    fn mismatched_sink_is_rejected_without_writes() {
        let requested = PixelBounds::from_size(10, 10);
        let sink = RecordingSink::new(PixelBounds::from_size(10, 11));
        let result = Renderer::default().render(requested, region((-2.0, -1.0), (1.0, 1.0)), &sink);
        assert_eq!(
            result,
            Err(RenderError::InvalidBounds {
                requested,
                sink: PixelBounds::from_size(10, 11),
            })
        );
        assert!(sink.writes().iter().all(|&w| w == 0));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let bounds = PixelBounds::from_size(0, 10);
        let sink = CountSink::new(bounds);
        let result = Renderer::default().render(bounds, region((-2.0, -1.0), (1.0, 1.0)), &sink);
        assert_eq!(
            result,
            Err(RenderError::InvalidBounds {
                requested: bounds,
                sink: bounds,
            })
        );
    }

    #[test]
    fn degenerate_region_is_rejected_without_writes() {
        let bounds = PixelBounds::from_size(4, 4);
        let sink = RecordingSink::new(bounds);
        let result = Renderer::default().render(bounds, region((0.0, -1.0), (0.0, 1.0)), &sink);
        assert_eq!(result, Err(RenderError::DegenerateRegion));
        assert!(sink.writes().iter().all(|&w| w == 0));
    }

    #[test]
    fn cancelled_render_writes_nothing() {
        let bounds = PixelBounds::from_size(16, 16);
        let sink = RecordingSink::new(bounds);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = Renderer::default().render_with_cancel(
            bounds,
            region((-2.0, -1.0), (1.0, 1.0)),
            &sink,
            &cancel,
        );
        assert_eq!(result, Err(RenderError::Cancelled));
        assert!(sink.writes().iter().all(|&w| w == 0));
    }

    #[test]
    fn cancelling_mid_render_never_writes_twice() {
        let bounds = PixelBounds::from_size(32, 64);
        let cancel = CancelToken::new();
        let sink = CancellingSink::new(bounds, cancel.clone(), 1);
        let result = Renderer::new(Mandelbrot::new(50))
            .with_granularity(Granularity::Row)
            .with_threads(2)
            .render_with_cancel(bounds, region((-2.0, -1.0), (1.0, 1.0)), &sink, &cancel);
        assert_eq!(result, Err(RenderError::Cancelled));

        let writes = sink.inner.writes();
        assert!(writes.iter().all(|&w| w <= 1));
        // At most the channel's capacity plus one unit per worker was
        // handed out before the first write cancelled the render.
        let written_rows = writes.chunks(32).filter(|row| row.iter().any(|&w| w == 1)).count();
        assert!(written_rows < 64, "{} rows written", written_rows);
        for row in writes.chunks(32) {
            assert!(row.iter().all(|&w| w == row[0]), "a row was left half written");
        }
    }

    #[test]
    fn cancelling_after_the_last_dispatch_completes_the_render() {
        let bounds = PixelBounds::from_size(8, 8);
        let cancel = CancelToken::new();
        let sink = CancellingSink::new(bounds, cancel.clone(), 1);
        let result = Renderer::new(Mandelbrot::new(50))
            .with_granularity(Granularity::Whole)
            .with_threads(1)
            .render_with_cancel(bounds, region((-2.0, -1.0), (1.0, 1.0)), &sink, &cancel);
        assert!(cancel.is_cancelled());
        assert_eq!(result, Ok(()));
        assert!(sink.inner.writes().iter().all(|&w| w == 1));
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let bounds = PixelBounds::new(std::i64::MIN, 0, std::i64::MAX, 2);
        let sink = RecordingSink::new(PixelBounds::from_size(1, 1));
        let result = Renderer::default().render(bounds, region((-2.0, -1.0), (1.0, 1.0)), &sink);
        assert_eq!(
            result,
            Err(RenderError::InvalidBounds {
                requested: bounds,
                sink: PixelBounds::from_size(1, 1),
            })
        );
    }

    #[test]
    fn panic_messages_are_recovered() {
        let payloads: Vec<Box<dyn Any + Send + 'static>> = vec![
            Box::new("first") as Box<dyn Any + Send>,
            Box::new(String::from("second")) as Box<dyn Any + Send>,
        ];
        assert_eq!(panic_message(&payloads), "first");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn worker_panic_fails_the_render() {
        let bounds = PixelBounds::from_size(8, 8);
        let sink = CountSink::new(bounds);
        let result = Renderer::new(Explodes)
            .with_threads(4)
            .render(bounds, region((-1.0, -1.0), (1.0, 1.0)), &sink);
        assert_eq!(
            result,
            Err(RenderError::WorkerPanicked("exploding evaluator".to_string()))
        );
    }

    #[test]
    fn sequential_and_parallel_renders_agree() {
        let bounds = PixelBounds::from_size(40, 30);
        let r = region((-2.0, -1.2), (0.8, 1.2));
        let sequential = CountSink::new(bounds);
        Renderer::new(Mandelbrot::new(200))
            .with_granularity(Granularity::Whole)
            .with_threads(1)
            .render(bounds, r, &sequential)
            .unwrap();
        let parallel = CountSink::new(bounds);
        Renderer::new(Mandelbrot::new(200))
            .with_granularity(Granularity::Pixel)
            .with_threads(6)
            .render(bounds, r, &parallel)
            .unwrap();
        assert_eq!(sequential.counts(), parallel.counts());
    }

    #[test]
    fn pixels_match_the_evaluator() {
        let bounds = PixelBounds::from_size(4, 4);
        let sink = CountSink::new(bounds);
        let evaluator = Mandelbrot::new(100);
        Renderer::new(evaluator)
            .render(bounds, region((-2.0, -2.0), (2.0, 2.0)), &sink)
            .unwrap();
        // Pixel (2, 2) sits on the origin.
        assert_eq!(sink.get(2, 2), Some(100));
        // Pixel (0, 0) is -2-2i, well outside.
        assert_eq!(sink.get(0, 0), Some(0));
        assert_eq!(sink.get(3, 1), Some(evaluator.escape(Complex::new(1.0, -1.0))));
    }

    #[test]
    fn binary_sink_sees_the_set() {
        let bounds = PixelBounds::from_size(4, 4);
        let sink = BinarySink::new(bounds, 100);
        Renderer::new(Mandelbrot::new(100))
            .render(bounds, region((-2.0, -2.0), (2.0, 2.0)), &sink)
            .unwrap();
        assert_eq!(sink.get(2, 2), Some(true));
        assert_eq!(sink.get(0, 0), Some(false));
    }

    #[test]
    fn zero_threads_means_one() {
        assert_eq!(Renderer::default().with_threads(0).threads(), 1);
        assert!(Renderer::default().threads() >= 1);
    }
}
