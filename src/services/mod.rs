pub mod attributes;
pub mod classifier;
pub mod credentials;
pub mod epg_parser;
pub mod http;
pub mod m3u_parser;
pub mod metrics;
pub mod redis;
pub mod series_grouper;
pub mod store;
pub mod sync;
pub mod xtream;
