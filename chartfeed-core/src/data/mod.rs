//! Bar and fill ingestion: fetch contract, REST client, range loop, merge.

pub mod assets;
pub mod gap_skip;
pub mod http;
pub mod memory;
pub mod merge;
pub mod provider;
pub mod range;

pub use assets::SymbolCache;
pub use gap_skip::{fetch_with_gap_skip, GapSkipOutcome, GapSkipPolicy, MAX_EMPTY_RETRIES};
pub use http::RestClient;
pub use memory::InMemoryBarSource;
pub use merge::MergeOutcome;
pub use provider::{
    parse_fills, AssetSource, BarQuery, BarSource, DataError, FillScope, FillSource, RawBar,
    RawFill,
};
pub use range::TimeBounds;
