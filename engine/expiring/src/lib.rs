// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! A TTL-evicting keyed set (L7): a map plus a lazily-sorted auxiliary
//! list of entries by expiration, backed by one [`timer::TimerFactory`]
//! timer armed at the earliest live entry. 

mod dict;
mod set;

pub use dict::{ExpiringDict, ExpiringKeySet};
pub use set::{CollectionChange, ExpiringSet, AUTO_REFRESH_COALESCE};
