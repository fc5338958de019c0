//! Connection lifecycle: `Uninitialized -> Loading -> Ready`.

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::BridgeError;
use crate::producer::{Loader, Producer};

/// Observable connection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
}

pub(super) enum Connection<P> {
    Uninitialized,
    Loading(Pending<P>),
    Ready(P),
}

impl<P> Connection<P> {
    pub(super) const fn phase(&self) -> Phase {
        match self {
            Self::Uninitialized => Phase::Uninitialized,
            Self::Loading(_) => Phase::Loading,
            Self::Ready(_) => Phase::Ready,
        }
    }
}

type Outcome<P> = Rc<RefCell<Option<Result<P, BridgeError>>>>;

/// An in-flight acquisition, shared by every `init` that observes it.
///
/// The attempt future fills `outcome`; whichever waiter settles first moves
/// the producer into the connection.
pub(super) struct Pending<P> {
    attempt: Shared<LocalBoxFuture<'static, ()>>,
    outcome: Outcome<P>,
}

impl<P> Clone for Pending<P> {
    fn clone(&self) -> Self {
        Self {
            attempt: self.attempt.clone(),
            outcome: Rc::clone(&self.outcome),
        }
    }
}

impl<P: Producer + 'static> Pending<P> {
    /// Start acquiring through `loader`, then run the producer's `init`.
    pub(super) fn begin<L: Loader<Producer = P>>(loader: &L) -> Self {
        let outcome: Outcome<P> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&outcome);
        let acquire = loader.acquire();
        let attempt = async move {
            let result = acquire.await.and_then(|mut producer| {
                producer.init()?;
                Ok(producer)
            });
            *slot.borrow_mut() = Some(result);
        }
        .boxed_local()
        .shared();
        Self { attempt, outcome }
    }
}

impl<P> Pending<P> {
    pub(super) async fn wait(&self) {
        self.attempt.clone().await;
    }

    pub(super) fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.outcome, &other.outcome)
    }

    /// Take the finished outcome. `None` if another waiter already took it.
    pub(super) fn take(&self) -> Option<Result<P, BridgeError>> {
        self.outcome.borrow_mut().take()
    }
}
