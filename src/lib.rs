// Library for tests to access modules

pub mod aggregator;
pub mod config;
pub mod models;
pub mod query;
pub mod queue;
pub mod rollup;
pub mod sampler;
pub mod source;
pub mod store;
