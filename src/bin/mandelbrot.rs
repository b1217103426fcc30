// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate failure;
extern crate fract;
extern crate image;
#[macro_use]
extern crate log;
extern crate num;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use failure::Error;
use fract::sink::{binary, grayscale};
use fract::{
    BinarySink, ColorSink, ComplexRegion, EscapeTime, Granularity, Mandelbrot, PixelBounds,
    Renderer,
};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use num::Complex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::str::FromStr;

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    let index = s.find(separator)?;
    let left = T::from_str(&s[..index]).ok()?;
    let right = T::from_str(&s[index + 1..]).ok()?;
    Some((left, right))
}

fn parse_complex(s: &str) -> Option<Complex<f64>> {
    parse_pair(s, ',').map(|(re, im)| Complex::new(re, im))
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    parse_pair::<T>(s, separator)
        .map(|_| ())
        .ok_or_else(|| err.to_string())
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const FORMAT: &str = "format";
const SIZE: &str = "size";
const LEFTLOWER: &str = "leftlower";
const RIGHTUPPER: &str = "rightupper";
const THREADS: &str = "threads";
const ITERATIONS: &str = "iterations";
const GRANULARITY: &str = "granularity";
const COLORING: &str = "coloring";
const AREA: &str = "area";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get() * 4;

    App::new("mandelbrot")
        .version("0.1.0")
        .about("Parallel escape-time Mandelbrot renderer")
        .arg(
            Arg::with_name(OUTPUT)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .default_value("-")
                .help("Output file, or - for standard output"),
        )
        .arg(
            Arg::with_name(FORMAT)
                .long(FORMAT)
                .short("f")
                .takes_value(true)
                .default_value("png")
                .possible_values(&["png", "gif", "jpg", "jpeg"])
                .help("Output image format"),
        )
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("600x400")
                .validator(|s| validate_pair::<u16>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image, in pixels"),
        )
        .arg(
            Arg::with_name(LEFTLOWER)
                .long(LEFTLOWER)
                .short("l")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("-2,-1")
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse left lower corner"))
                .help("Left lower corner of the complex region"),
        )
        .arg(
            Arg::with_name(RIGHTUPPER)
                .long(RIGHTUPPER)
                .short("r")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("1,1")
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse right upper corner"))
                .help("Right upper corner of the complex region"),
        )
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of worker threads (default: one per CPU)"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("10000")
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse iteration count",
                        "Iteration count must be between 1 and 1000000",
                    )
                })
                .help("Iterations after which a point is considered in the set"),
        )
        .arg(
            Arg::with_name(GRANULARITY)
                .long(GRANULARITY)
                .short("g")
                .takes_value(true)
                .default_value("row")
                .possible_values(&["row", "column", "pixel", "whole"])
                .help("How the image is cut into work units"),
        )
        .arg(
            Arg::with_name(COLORING)
                .long(COLORING)
                .short("c")
                .takes_value(true)
                .default_value("binary")
                .possible_values(&["binary", "grayscale"])
                .help("How escape counts are turned into colors"),
        )
        .arg(
            Arg::with_name(AREA)
                .long(AREA)
                .help("Print the estimated area of the set instead of an image"),
        )
        .get_matches()
}

fn output_format(name: &str) -> ImageOutputFormat {
    match name {
        "gif" => ImageOutputFormat::GIF,
        "jpg" | "jpeg" => ImageOutputFormat::JPEG(90),
        _ => ImageOutputFormat::PNG,
    }
}

fn write_image(outfile: &str, image: RgbImage, format: ImageOutputFormat) -> Result<(), Error> {
    let image = DynamicImage::ImageRgb8(image);
    if outfile == "-" {
        let stdout = io::stdout();
        let mut output = BufWriter::new(stdout.lock());
        image.write_to(&mut output, format)?;
        output.flush()?;
    } else {
        let mut output = BufWriter::new(File::create(outfile)?);
        image.write_to(&mut output, format)?;
        output.flush()?;
    }
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let size: (usize, usize) = parse_pair(matches.value_of(SIZE).unwrap_or_default(), 'x')
        .ok_or_else(|| format_err!("Error parsing image dimensions"))?;
    let leftlower = parse_complex(matches.value_of(LEFTLOWER).unwrap_or_default())
        .ok_or_else(|| format_err!("Error parsing left lower point"))?;
    let rightupper = parse_complex(matches.value_of(RIGHTUPPER).unwrap_or_default())
        .ok_or_else(|| format_err!("Error parsing right upper point"))?;
    let threads = match matches.value_of(THREADS) {
        Some(t) => usize::from_str(t)?,
        None => num_cpus::get(),
    };
    let iterations = usize::from_str(matches.value_of(ITERATIONS).unwrap_or_default())?;
    let granularity = Granularity::from_str(matches.value_of(GRANULARITY).unwrap_or_default())
        .map_err(|e| format_err!("{}", e))?;

    let bounds = PixelBounds::from_size(size.0, size.1);
    let region = ComplexRegion::new(leftlower, rightupper)?;
    let renderer = Renderer::new(Mandelbrot::new(iterations))
        .with_threads(threads)
        .with_granularity(granularity);
    info!(
        "Rendering {}x{} over {}..{} with {} threads",
        size.0, size.1, leftlower, rightupper, threads
    );

    if matches.is_present(AREA) {
        let sink = BinarySink::new(bounds, renderer.evaluator().max_iterations());
        renderer.render(bounds, region, &sink)?;
        println!("{}", sink.estimated_area(&region));
        return Ok(());
    }

    let image = match matches.value_of(COLORING) {
        Some("grayscale") => {
            let sink = ColorSink::new(bounds, grayscale(iterations));
            renderer.render(bounds, region, &sink)?;
            sink.into_image()
        }
        _ => {
            let sink = ColorSink::new(bounds, binary(iterations));
            renderer.render(bounds, region, &sink)?;
            sink.into_image()
        }
    }
    .ok_or_else(|| format_err!("Image of {}x{} pixels is too large to encode", size.0, size.1))?;

    write_image(
        matches.value_of(OUTPUT).unwrap_or("-"),
        image,
        output_format(matches.value_of(FORMAT).unwrap_or("png")),
    )
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let matches = args();
    if let Err(e) = run(&matches) {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
