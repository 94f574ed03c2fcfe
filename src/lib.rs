pub mod config;
pub mod error;
pub mod metastore;
pub mod normalizer;
pub mod pprofpb;
pub mod profile;
pub mod query;
pub mod querypb;
pub mod storage;
pub mod symbols;
