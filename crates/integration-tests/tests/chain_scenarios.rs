//! Chain Scenarios
//!
//! Ordering and compensation across chained closure transactions.

use std::sync::{Arc, Mutex};

use compensable_core::application::{
    ChainedTransaction, ClosureTransaction, ClosureWork, Executable, ExecutionContext,
};
use compensable_core::domain::TransactionState;
use compensable_core::error::TransactionError;

type Cell = Arc<Mutex<String>>;
type Log = Arc<Mutex<Vec<String>>>;

fn cell(value: &str) -> Cell {
    Arc::new(Mutex::new(value.to_string()))
}

fn read(cell: &Cell) -> String {
    cell.lock().unwrap().clone()
}

/// Sets `target` to `value`; compensation puts back what was there at build time
fn assign(
    name: &'static str,
    target: &Cell,
    value: &'static str,
    fail: bool,
    compensations: &Log,
) -> ClosureTransaction<(Cell, String)> {
    let undo_log = compensations.clone();
    ClosureTransaction::new_with_rollback(
        move |(target, _before): &(Cell, String)| {
            *target.lock().unwrap() = value.to_string();
            if fail {
                return Err(format!("{} refused", name).into());
            }
            Ok(())
        },
        move |(target, before): &(Cell, String)| {
            *target.lock().unwrap() = before.clone();
            undo_log.lock().unwrap().push(name.to_string());
            Ok(())
        },
        (target.clone(), read(target)),
    )
}

/// Two closures chained: x -> "Goodbye", y -> "Holden"
#[tokio::test]
async fn test_goodbye_holden_runs_without_rollback() {
    let x = cell("Hello");
    let y = cell("Toyota");
    let compensations: Log = Arc::default();

    let mut chain = ChainedTransaction::chain()
        .add(assign("A", &x, "Goodbye", false, &compensations))
        .add(assign("B", &y, "Holden", false, &compensations));

    tokio_test::assert_ok!(chain.execute(&ExecutionContext::unscoped()).await);

    assert_eq!(read(&x), "Goodbye");
    assert_eq!(read(&y), "Holden");
    assert!(compensations.lock().unwrap().is_empty());
    assert_eq!(chain.state(), TransactionState::Succeeded);
}

/// Forcing B to fail restores both values with exactly two compensations, B first
#[tokio::test]
async fn test_failing_second_step_restores_both_values() {
    let x = cell("Hello");
    let y = cell("Toyota");
    let compensations: Log = Arc::default();

    let mut chain = ChainedTransaction::chain()
        .add(assign("A", &x, "Goodbye", false, &compensations))
        .add(assign("B", &y, "Holden", true, &compensations));

    let err = chain.execute(&ExecutionContext::unscoped()).await.unwrap_err();

    assert!(matches!(err, TransactionError::PerformFailed(_)));
    assert_eq!(read(&x), "Hello");
    assert_eq!(read(&y), "Toyota");
    assert_eq!(*compensations.lock().unwrap(), vec!["B", "A"]);
}

/// Steps after the failing one are never started
#[tokio::test]
async fn test_steps_after_failure_never_run() {
    let x = cell("1");
    let y = cell("2");
    let z = cell("3");
    let compensations: Log = Arc::default();

    let mut chain = ChainedTransaction::chain().add_all(vec![
        assign("x", &x, "one", false, &compensations),
        assign("y", &y, "two", true, &compensations),
        assign("z", &z, "three", false, &compensations),
    ]);

    chain.execute(&ExecutionContext::unscoped()).await.unwrap_err();

    assert_eq!(read(&z), "3");
    assert_eq!(*compensations.lock().unwrap(), vec!["y", "x"]);
}

/// A deferred step receives the completed steps, in completion order
#[tokio::test]
async fn test_factory_receives_completed_steps() {
    let x = cell("Hello");
    let y = cell("Toyota");
    let compensations: Log = Arc::default();
    let seen: Log = Arc::default();
    let observed = seen.clone();
    let z = cell("unset");
    let z_for_factory = z.clone();
    let factory_log = compensations.clone();

    let mut chain = ChainedTransaction::chain()
        .add(assign("A", &x, "Goodbye", false, &compensations))
        .add(assign("B", &y, "Holden", false, &compensations))
        .add_deferred(move |done| {
            for tx in done {
                let before = tx
                    .work::<ClosureWork<(Cell, String)>>()
                    .map(|work| work.arguments().1.clone())
                    .unwrap_or_default();
                observed.lock().unwrap().push(before);
            }
            Ok(Box::new(assign(
                "C",
                &z_for_factory,
                "built",
                false,
                &factory_log,
            )))
        });

    chain.execute(&ExecutionContext::unscoped()).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["Hello", "Toyota"]);
    assert_eq!(read(&z), "built");
    assert_eq!(chain.completed().len(), 3);
}

/// A factory that cannot produce a step fails the chain with InvalidChainStep
#[tokio::test]
async fn test_factory_failure_is_invalid_chain_step() {
    let x = cell("Hello");
    let compensations: Log = Arc::default();

    let mut chain = ChainedTransaction::chain()
        .add(assign("A", &x, "Goodbye", false, &compensations))
        .add_deferred(|_| Err("expected a transaction".into()));

    let err = chain.execute(&ExecutionContext::unscoped()).await.unwrap_err();

    assert!(matches!(
        err,
        TransactionError::InvalidChainStep { position: 1, .. }
    ));
    assert_eq!(read(&x), "Hello");
    assert_eq!(*compensations.lock().unwrap(), vec!["A"]);
}

/// A compensation that fails supersedes the step failure but keeps it reachable
#[tokio::test]
async fn test_failing_compensation_keeps_original_failure() {
    let x = cell("Hello");
    let compensations: Log = Arc::default();
    let broken = ClosureTransaction::from_closure(|| Ok(()))
        .with_rollback(|_| Err("cannot undo".into()));

    let mut chain = ChainedTransaction::chain()
        .add(assign("A", &x, "Goodbye", false, &compensations))
        .add(broken)
        .add(ClosureTransaction::from_closure(|| Err("late failure".into())));

    let err = chain.execute(&ExecutionContext::unscoped()).await.unwrap_err();

    assert!(matches!(err, TransactionError::CleanupFailed { .. }));
    assert!(err.is_compensation_failure());
    assert!(matches!(
        err.superseded(),
        Some(TransactionError::PerformFailed(_))
    ));
    // fail-fast: A is never compensated once the broken step fails to undo
    assert_eq!(read(&x), "Goodbye");
    assert!(compensations.lock().unwrap().is_empty());
}
