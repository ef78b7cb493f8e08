// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use future::{DreamValue, Outcome, RuntimeError};
use task_env::TaskEnv;

/// The handle `first_of` returns: the racing output future plus the
/// alternatives it is racing, so that cancelling the race can be
/// propagated down to every alternative still in flight.
pub struct Alt<T> {
    output: DreamValue<T>,
    alternatives: Arc<Vec<DreamValue<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Alt<T> {
    /// The future that resolves with the first alternative to succeed.
    pub fn future(&self) -> DreamValue<T> {
        self.output.clone()
    }

    /// Cancels the race: the output future and every alternative still
    /// pending are cancelled with `reason`. Returns whatever
    /// [`DreamValue::cancel`] returned for the output future itself.
    pub fn cancel(&self, reason: RuntimeError) -> bool {
        let cancelled = self.output.cancel(reason.clone());
        for alternative in self.alternatives.iter() {
            alternative.cancel(reason.clone());
        }
        cancelled
    }
}

/// Races `alternatives`: the first to succeed resolves the returned
/// future's `Alt::future()` with that value and cancels every other still-
/// pending alternative. Any alternative that was *already* racing past the
/// decision point and completes successfully anyway (a late winner) has its
/// value routed to `discard` instead of being silently dropped. If every
/// alternative fails, the output is failed with
/// [`RuntimeError::all_alternates_failed`].
pub fn first_of<T>(
    env: &TaskEnv,
    alternatives: Vec<DreamValue<T>>,
    discard: impl Fn(T) + Send + Sync + 'static,
) -> Alt<T>
where
    T: Clone + Send + Sync + 'static,
{
    let output = DreamValue::new();
    let total = alternatives.len();
    let discard = Arc::new(discard);
    let remaining_failures = Arc::new(AtomicUsize::new(total));

    if total == 0 {
        output.try_throw(RuntimeError::all_alternates_failed());
        return Alt { output, alternatives: Arc::new(Vec::new()) };
    }

    let alternatives: Arc<Vec<DreamValue<T>>> = Arc::new(alternatives);
    for candidate in alternatives.iter() {
        let output = output.clone();
        let alternatives = alternatives.clone();
        let discard = discard.clone();
        let remaining_failures = remaining_failures.clone();
        candidate.when_done(env.acquire(), move |outcome| match outcome {
            Outcome::Value(value) => {
                if !output.try_return(value.clone()) {
                    // Someone else already won the race.
                    discard(value);
                    return;
                }
                for other in alternatives.iter() {
                    other.cancel(RuntimeError::cancelled("first_of: another alternative won"));
                }
            }
            Outcome::Error(_) | Outcome::Cancelled(_) => {
                if remaining_failures.fetch_sub(1, Ordering::AcqRel) == 1 {
                    output.try_throw(RuntimeError::all_alternates_failed());
                }
            }
        });

        // A cancelled alternative's continuation fires (and is consumed)
        // the moment `cancel()` runs, above — so a producer that ignores
        // the advisory cancellation and completes anyway has nowhere to
        // report its value except this cleanup slot (it runs exactly when a
        // real outcome arrives after the consumer already observed
        // cancellation).
        let discard = discard.clone();
        candidate.on_cleanup(env.acquire(), move |cleanup_outcome| {
            if let Some(Outcome::Value(value)) = cleanup_outcome {
                discard(value);
            }
        });
    }

    Alt { output, alternatives }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn env() -> TaskEnv {
        TaskEnv::none()
    }

    #[test]
    fn first_success_wins_and_cancels_the_rest() {
        let a: DreamValue<&str> = DreamValue::new();
        let b: DreamValue<&str> = DreamValue::new();
        let discarded: Arc<Mutex<Vec<&str>>> = Arc::new(Mutex::new(Vec::new()));
        let d = discarded.clone();
        let alt = first_of(&env(), vec![a.clone(), b.clone()], move |value| d.lock().unwrap().push(value));

        a.try_return("A");
        assert!(b.has_finished(), "the loser should have been cancelled");

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        alt.future().when_done(env(), move |outcome| *s.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value("A"))));
    }

    #[test]
    fn a_late_winner_is_routed_to_discard() {
        let a: DreamValue<i32> = DreamValue::new();
        let b: DreamValue<i32> = DreamValue::new();
        let discarded: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let d = discarded.clone();
        let _alt = first_of(&env(), vec![a.clone(), b.clone()], move |value| d.lock().unwrap().push(value));

        a.try_return(1);
        // b "completes" even though it should have been cancelled already;
        // a real producer racing past the cancel check routes to discard,
        // never to the output.
        b.try_return(2);
        assert_eq!(*discarded.lock().unwrap(), vec![2]);
    }

    #[test]
    fn all_failing_synthesizes_all_alternates_failed() {
        let a: DreamValue<i32> = DreamValue::new();
        let b: DreamValue<i32> = DreamValue::new();
        let alt = first_of(&env(), vec![a.clone(), b.clone()], |_| {});

        a.try_throw(RuntimeError::generic("nope"));
        assert!(!alt.future().has_finished());
        b.try_throw(RuntimeError::generic("also nope"));
        assert!(alt.future().has_finished());

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        alt.future().when_done(env(), move |outcome| *s.lock().unwrap() = Some(outcome));
        match seen.lock().unwrap().as_ref().unwrap() {
            Outcome::Error(e) => assert_eq!(*e, RuntimeError::all_alternates_failed()),
            other => panic!("expected all-alternates-failed, got {other:?}"),
        }
    }

    #[test]
    fn cancelling_the_alt_propagates_to_pending_alternatives() {
        let a: DreamValue<i32> = DreamValue::new();
        let b: DreamValue<i32> = DreamValue::new();
        let alt = first_of(&env(), vec![a.clone(), b.clone()], |_| {});

        assert!(alt.cancel(RuntimeError::cancelled("caller gave up")));
        assert!(a.has_finished());
        assert!(b.has_finished());
    }

    #[test]
    fn empty_alternatives_fails_immediately() {
        let alt: Alt<i32> = first_of(&env(), Vec::new(), |_| {});
        assert!(alt.future().has_finished());
    }
}
