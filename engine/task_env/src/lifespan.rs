// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::any::Any;

/// Contract for state entries stored in a [`crate::TaskEnv`] that need to
/// participate in environment forking and disposal. Entries that don't
/// implement this are stored as plain shared values: shallow-copied on
/// fork, never explicitly disposed.
pub trait Lifespan: Any + Send {
    /// Called when the owning environment is forked via [`crate::TaskEnv::fork`],
    /// so the child gets an independent copy rather than sharing this one.
    fn clone_state(&self) -> Box<dyn Lifespan>;

    /// Called exactly once, when the environment's reference count drops to
    /// zero.
    fn dispose(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
