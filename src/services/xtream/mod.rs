//! Xtream Codes Integration
//!
//! Maps the Xtream Codes Player API v2 onto the canonical content model.
//!
//! - **Detection**: recognize `get.php` playlist URLs as Xtream sources
//! - **API Client**: authenticate, list categories/streams/series, details
//! - **Mapping**: category joins, playback URLs, season grouping
//!
//! Calls within one account are sequential: category lists must be fetched
//! before the stream lists that reference them.

pub mod client;
pub mod detector;
pub mod mapping;
pub mod types;

// Re-exports for convenience
pub use client::{XtreamClient, XtreamError};
pub use detector::{detect_xtream_source, extract_credentials};
pub use mapping::{
    SeriesDetail, VodDetail, XtreamListing, XtreamSeriesListing, XtreamSeriesSummary,
};
pub use types::{
    build_catchup_url, normalize_server, AccountInfo, CategoryKind, XtreamCategory,
    XtreamCredentials,
};
