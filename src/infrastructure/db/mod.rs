pub mod adapter;
pub mod client;
pub mod mysql;
pub mod oracle;
#[cfg(feature = "oracle")]
pub mod oracle_client;
pub mod postgres;
pub mod row_mapper;
pub mod sqlserver;
