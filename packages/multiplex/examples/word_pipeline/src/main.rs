#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Example counting words with a `switchy_multiplex` pipeline.
//!
//! Producer workers each emit a share of the input lines, a transform stage splits
//! lines into lowercase words, and a consumer stage tallies them.
//!
//! Worker counts can be overridden with `MULTIPLEX_PRODUCERS`,
//! `MULTIPLEX_TRANSFORMERS` and `MULTIPLEX_CONSUMERS`.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use switchy_multiplex::{Capacity, Error, OutputConfig, Pipeline};

const TEXT: &str = "\
the quick brown fox jumps over the lazy dog
a journey of a thousand miles begins with a single step
the early bird catches the worm
all that glitters is not gold";

fn main() -> Result<(), Error> {
    env_logger::init();

    println!("=== Word Pipeline Example ===\n");

    let lines: Vec<&'static str> = TEXT.lines().collect();
    let counts = Arc::new(Mutex::new(BTreeMap::<String, usize>::new()));

    let pipeline = Pipeline::from_env()?;

    pipeline
        .produce(
            OutputConfig::new(2, Capacity::Bounded(4)),
            move |worker, out| {
                // Every worker emits the whole text once.
                for line in &lines {
                    if out.send(*line).is_err() {
                        log::warn!("producer {worker}: downstream is gone");
                        return;
                    }
                }
            },
        )?
        .process(
            OutputConfig::new(4, Capacity::Unbounded),
            |line: &'static str, out| {
                for word in line.split_whitespace() {
                    let _ = out.send(word.to_lowercase());
                }
            },
        )?
        .consume_and_wait({
            let counts = counts.clone();
            move |word: String| {
                *counts.lock().unwrap().entry(word).or_default() += 1;
            }
        })?;

    let counts = std::mem::take(&mut *counts.lock().unwrap());
    let total: usize = counts.values().sum();

    println!("Counted {total} words ({} distinct):", counts.len());
    for (word, count) in &counts {
        println!("  {word:>10}: {count}");
    }

    Ok(())
}
