// Closure Transactions - ad-hoc work without declaring a UnitOfWork type

use super::context::ExecutionContext;
use super::transaction::{Transaction, UnitOfWork, WorkContext};
use crate::error::WorkResult;
use async_trait::async_trait;

type BoundFn<A> = Box<dyn FnMut(&A) -> WorkResult + Send>;

/// Work callable, optional compensation and the arguments both receive
///
/// Arguments are bound once at construction. Use a tuple for several values,
/// a `Vec` for an explicit collection and `()` for none.
pub struct ClosureWork<A> {
    work: BoundFn<A>,
    compensation: Option<BoundFn<A>>,
    arguments: A,
}

impl<A> ClosureWork<A> {
    pub fn arguments(&self) -> &A {
        &self.arguments
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

#[async_trait]
impl<A: Send + 'static> UnitOfWork for ClosureWork<A> {
    async fn perform(&mut self, _cx: &mut WorkContext<'_>) -> WorkResult {
        (self.work)(&self.arguments)
    }

    async fn cleanup_after_failure(&mut self, _ctx: &ExecutionContext) -> WorkResult {
        match self.compensation.as_mut() {
            Some(compensation) => compensation(&self.arguments),
            None => Ok(()),
        }
    }
}

/// Transaction running a closure over bound arguments
pub type ClosureTransaction<A = ()> = Transaction<ClosureWork<A>>;

impl ClosureTransaction<()> {
    pub fn from_closure<F>(mut work: F) -> Self
    where
        F: FnMut() -> WorkResult + Send + 'static,
    {
        Self::with_args(move |_: &()| work(), ())
    }
}

impl<A: Send + 'static> ClosureTransaction<A> {
    pub fn with_args<F>(work: F, arguments: A) -> Self
    where
        F: FnMut(&A) -> WorkResult + Send + 'static,
    {
        Transaction::new(ClosureWork {
            work: Box::new(work),
            compensation: None,
            arguments,
        })
    }

    pub fn new_with_rollback<F, G>(work: F, compensation: G, arguments: A) -> Self
    where
        F: FnMut(&A) -> WorkResult + Send + 'static,
        G: FnMut(&A) -> WorkResult + Send + 'static,
    {
        Self::with_args(work, arguments).with_rollback(compensation)
    }

    /// Bound-method form: `method` runs against `target`, which the
    /// transaction owns from here on
    pub fn from_instance<T, M>(mut target: T, mut method: M, arguments: A) -> Self
    where
        T: Send + 'static,
        M: FnMut(&mut T, &A) -> WorkResult + Send + 'static,
    {
        Self::with_args(move |args: &A| method(&mut target, args), arguments)
    }

    /// Run `compensation` with the same arguments when the transaction fails
    /// or is compensated by an enclosing chain
    pub fn with_rollback<G>(mut self, compensation: G) -> Self
    where
        G: FnMut(&A) -> WorkResult + Send + 'static,
    {
        self.work_mut().compensation = Some(Box::new(compensation));
        self
    }

    pub fn arguments(&self) -> &A {
        self.work().arguments()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transaction::Executable;
    use crate::error::TransactionError;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_closure_runs_with_bound_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut tx = ClosureTransaction::with_args(
            move |(name, count): &(String, u32)| {
                sink.lock().unwrap().push(format!("{}x{}", name, count));
                Ok(())
            },
            ("widget".to_string(), 3),
        );

        tx.execute(&ExecutionContext::unscoped()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["widgetx3"]);
        assert_eq!(tx.arguments().1, 3);
    }

    #[tokio::test]
    async fn test_compensation_gets_same_arguments_exactly_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let compensations = calls.clone();
        let mut tx = ClosureTransaction::new_with_rollback(
            |_: &Vec<i32>| Err("refused".into()),
            move |args: &Vec<i32>| {
                compensations.lock().unwrap().push(args.clone());
                Ok(())
            },
            vec![1, 2, 3],
        );

        let err = tx.execute(&ExecutionContext::unscoped()).await.unwrap_err();

        assert!(matches!(err, TransactionError::PerformFailed(_)));
        assert_eq!(*calls.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_compensation_not_run_on_success() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let mut tx = ClosureTransaction::from_closure(|| Ok(())).with_rollback(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        tx.execute(&ExecutionContext::unscoped()).await.unwrap();

        assert!(tx.work().has_compensation());
        assert!(!*ran.lock().unwrap());
    }

    struct Counter {
        total: Arc<Mutex<i64>>,
    }

    impl Counter {
        fn add(&mut self, amount: &i64) -> WorkResult {
            *self.total.lock().unwrap() += amount;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_from_instance_calls_method_on_target() {
        let total = Arc::new(Mutex::new(10));
        let counter = Counter {
            total: total.clone(),
        };
        let mut tx = ClosureTransaction::from_instance(counter, Counter::add, 5);

        tokio_test::assert_ok!(tx.execute(&ExecutionContext::unscoped()).await);

        assert_eq!(*total.lock().unwrap(), 15);
    }
}
