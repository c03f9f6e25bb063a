//! Mailbox scan pipeline.
//!
//! Discovery finds candidate messages on one session, the ids are stride
//! partitioned across a fixed pool of sessions, each worker extracts
//! unsubscribe links into its own local result, and the aggregator unions
//! them into one sender → targets mapping.

pub mod aggregate;
pub mod discovery;
pub mod extract;
pub mod html;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod types;
pub mod worker;

pub use extract::{Extraction, LinkExtractor};
pub use pipeline::{PipelineState, ScanOptions, ScanPipeline};
pub use progress::{ProgressCounter, ProgressSink};
pub use session::{MailSession, SearchQuery, SessionFactory, SessionPool};
pub use types::{GlobalResult, LocalResult, MessageId, RawMessage};
