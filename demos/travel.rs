use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;
use pledge::{
    combinator::{Parallel, Sequence, Step},
    task::Executor,
};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
enum TripError {
    #[error("{0} broke down")]
    BrokeDown(String),
    #[error(transparent)]
    Pledge(#[from] pledge::Error),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mishap {
    /// The leg fails.
    Fail,
    /// The leg is aborted.
    Abort,
}

/// Plan a trip from a few travel legs, once in sequence and once in
/// parallel.
#[derive(Parser, Debug)]
struct Args {
    /// The delay, in milliseconds, of each leg.
    #[arg(short, long, value_delimiter = ',', default_values_t = [300, 100, 200])]
    delays: Vec<u64>,

    /// Index of a leg that goes wrong.
    #[arg(short, long)]
    broken: Option<usize>,

    /// What happens to the broken leg.
    #[arg(short, long, value_enum, default_value_t = Mishap::Fail)]
    mishap: Mishap,
}

const LEGS: [&str; 6] = ["car", "train", "boat", "plane", "bus", "bike"];

fn legs(args: &Args) -> Vec<Step<String, TripError>> {
    args.delays
        .iter()
        .enumerate()
        .map(|(i, &ms)| {
            let name = LEGS[i % LEGS.len()].to_string();
            let mishap = (args.broken == Some(i)).then_some(args.mishap);

            Step::new(move |s| {
                info!("leg {i} ({name}) departs");
                Executor::defer_after(
                    Duration::from_millis(ms),
                    Box::new(move || match mishap {
                        None => {
                            s.succeed(format!("{name} after {ms}ms"));
                        }
                        Some(Mishap::Fail) => {
                            s.fail(TripError::BrokeDown(name));
                        }
                        Some(Mishap::Abort) => {
                            s.abort(format!("{name} cancelled"));
                        }
                    }),
                );
                Ok(())
            })
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let seq = Sequence::new(legs(&args))?;
    seq.progress(|i, leg| println!("sequence: leg {i} arrived: {leg}"))
        .ready(|legs| println!("sequence: trip complete: {legs:?}"))
        .error(|e| println!("sequence: trip failed: {e}"))
        .abort(|r| println!("sequence: trip aborted: {r}"));

    Executor::run();

    let par = Parallel::new(legs(&args))?;
    par.progress(|i, leg| println!("parallel: leg {i} arrived: {leg}"))
        .ready(|legs| println!("parallel: trip complete: {legs:?}"))
        .error(|e| println!("parallel: trip failed: {e:?}"))
        .abort(|r| println!("parallel: trip aborted: {r:?}"));

    Executor::run();

    Ok(())
}
