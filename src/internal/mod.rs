//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod dispose_bag;

pub(crate) use circular::{find_factory_cycle, ResolutionPath};
pub(crate) use dispose_bag::DisposeBag;
