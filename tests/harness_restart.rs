//! Process harness restart behavior: a non-`fire_once` command that exits
//! cleanly restarts until `kill()` is called; an unrecoverable stderr line
//! stops the run without surfacing as an error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hfdl_conductor::process::{Command, CommandSpec, HarnessState};
use regex::Regex;

fn base_spec(argv: &[&str]) -> CommandSpec {
    CommandSpec {
        argv: argv.iter().map(|s| s.to_string()).collect(),
        shell: false,
        recoverable_errors: vec![],
        unrecoverable_errors: vec![],
        valid_return_codes: vec![0],
        fire_once: false,
        recoverable_error_limit: 10,
        settle_time: Duration::ZERO,
    }
}

#[tokio::test]
async fn restarts_until_killed() {
    let runs = Arc::new(AtomicUsize::new(0));
    let spec = base_spec(&["true"]);
    let command = Arc::new(
        Command::new(spec).with_hooks(
            Some({
                let runs = runs.clone();
                Arc::new(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
            }),
            None,
        ),
    );

    let runner = tokio::spawn(command.clone().execute());
    // allow a few restarts to happen, then ask it to stop
    tokio::time::sleep(Duration::from_millis(150)).await;
    command.kill();
    let result = runner.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(command.state(), HarnessState::Done);
    assert!(runs.load(Ordering::SeqCst) >= 2, "expected more than one run before kill");
}

#[tokio::test]
async fn an_unrecoverable_line_ends_the_run_without_an_error() {
    let mut spec = base_spec(&["sh", "-c", "echo no such device 1>&2; sleep 5"]);
    spec.unrecoverable_errors = vec![Regex::new("no such device").unwrap()];
    spec.fire_once = true;
    let command = Arc::new(Command::new(spec));
    command.clone().execute().await.unwrap();
    assert_eq!(command.state(), HarnessState::Done);
}
