use std::time::Duration;

use log::debug;
use pledge::{
    config::Config,
    future::{Future, Settler},
    task::Executor,
};

type Fruit = Future<Vec<&'static str>, String>;

/// Run `payload` as a future named `name` and print every event it emits.
fn tester(
    name: &'static str,
    config: &Config,
    payload: impl FnOnce(Settler<Vec<&'static str>, String, String>) -> Result<(), String> + 'static,
) -> Fruit {
    println!("Tester run: {name}");

    let future = Future::with_config(config, payload);
    future
        .ready(move |data| println!("{name}: ready with data: {data:?}"))
        .error(move |err| println!("{name}: error: {err}"))
        .abort(move |reason| println!("{name}: abort: {reason}"));

    future
}

fn sorted() -> Vec<&'static str> {
    let mut data = vec!["orange", "pear", "apple"];
    data.sort();
    data
}

fn main() {
    env_logger::init();

    let immediate = Config::default();
    let deferred = Config::default().deferred();

    let f = tester("Tester 1: synchronous payload", &immediate, |s| {
        println!("Tester 1: notify ready.");
        s.succeed(sorted());
        println!("Tester 1: done.");
        Ok(())
    });

    // Already settled: the outcome is replayed straight away.
    f.ready(|data| println!("Tester 1: inline ready callback, data: {data:?}"));

    tester("Tester 2: synchronous payload, deferred", &deferred, |s| {
        println!("Tester 2: notify ready.");
        s.succeed(sorted());
        println!("Tester 2: done.");
        Ok(())
    });

    tester("Tester 3: timer payload", &immediate, |s| {
        println!("Tester 3: start timer.");
        Executor::defer_after(
            Duration::from_millis(500),
            Box::new(move || {
                println!("Tester 3: timer fired, notify ready.");
                s.succeed(sorted());
            }),
        );
        Ok(())
    });

    tester("Tester 4: aborted payload", &deferred, |s| {
        println!("Tester 4: abort.");
        s.abort("Nothing to sort".to_string());
        Ok(())
    });

    tester("Tester 5: failing payload", &immediate, |_| {
        Err("Could not reach the fruit bowl".to_string())
    });

    println!("All testers started.");
    Executor::run();
    debug!("Executor idle");
}
