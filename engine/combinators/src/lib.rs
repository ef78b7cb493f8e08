// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Utility combinators over [`future::DreamValue`] (L8): `join`, `first_of`
//! (alt), `sleep`, and `from_callback`. 

mod first_of;
mod from_callback;
mod join;
mod sleep;

pub use first_of::{first_of, Alt};
pub use from_callback::from_callback;
pub use join::join;
pub use sleep::sleep;
