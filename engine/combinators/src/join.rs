// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use future::{DreamValue, Outcome};
use task_env::TaskEnv;

/// Resolves once every member of `futures` has an outcome, regardless of
/// whether each one succeeded, failed, or was cancelled. Never blocks a
/// thread: every member is driven through [`future::Suspend`]'s
/// suspension interface via [`DreamValue::when_done`].
///
/// The result vector preserves `futures`' original order, not completion
/// order. Cancellation is **not** propagated into the members — cancelling
/// the returned future only affects callers still awaiting it, the members
/// keep running to their own completion.
pub fn join<T>(env: &TaskEnv, futures: Vec<DreamValue<T>>) -> DreamValue<Vec<Outcome<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    let output = DreamValue::new();
    let total = futures.len();
    if total == 0 {
        output.try_return(Vec::new());
        return output;
    }

    let slots: Arc<Mutex<Vec<Option<Outcome<T>>>>> = Arc::new(Mutex::new(vec![None; total]));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, member) in futures.into_iter().enumerate() {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let output = output.clone();
        member.when_done(env.acquire(), move |outcome| {
            slots.lock().unwrap()[index] = Some(outcome);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let collected = slots.lock().unwrap().iter_mut().map(|slot| slot.take().unwrap()).collect();
                output.try_return(collected);
            }
        });
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use future::RuntimeError;

    fn env() -> TaskEnv {
        TaskEnv::none()
    }

    #[test]
    fn empty_join_resolves_immediately() {
        let result: DreamValue<Vec<Outcome<i32>>> = join(&env(), Vec::new());
        assert!(result.has_finished());
    }

    #[test]
    fn resolves_only_once_every_member_has_an_outcome() {
        let a: DreamValue<i32> = DreamValue::new();
        let b: DreamValue<i32> = DreamValue::new();
        let c: DreamValue<i32> = DreamValue::new();
        let result = join(&env(), vec![a.clone(), b.clone(), c.clone()]);

        a.try_return(1);
        assert!(!result.has_finished());
        b.try_throw(RuntimeError::generic("boom"));
        assert!(!result.has_finished());
        c.cancel(RuntimeError::cancelled("done early"));
        assert!(result.has_finished());

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        result.when_done(env(), move |outcome| *s.lock().unwrap() = Some(outcome));
        match seen.lock().unwrap().as_ref().unwrap() {
            Outcome::Value(outcomes) => {
                assert!(matches!(outcomes[0], Outcome::Value(1)));
                assert!(matches!(outcomes[1], Outcome::Error(_)));
                assert!(matches!(outcomes[2], Outcome::Cancelled(_)));
            }
            other => panic!("expected a value outcome, got {other:?}"),
        }
    }

    #[test]
    fn preserves_original_order_regardless_of_completion_order() {
        let a: DreamValue<i32> = DreamValue::new();
        let b: DreamValue<i32> = DreamValue::new();
        let result = join(&env(), vec![a.clone(), b.clone()]);

        // b completes first, a completes second.
        b.try_return(2);
        a.try_return(1);

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        result.when_done(env(), move |outcome| *s.lock().unwrap() = Some(outcome));
        match seen.lock().unwrap().as_ref().unwrap() {
            Outcome::Value(outcomes) => {
                assert!(matches!(outcomes[0], Outcome::Value(1)));
                assert!(matches!(outcomes[1], Outcome::Value(2)));
            }
            other => panic!("expected a value outcome, got {other:?}"),
        }
    }
}
