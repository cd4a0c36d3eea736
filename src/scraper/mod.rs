//! The polling core: a scheduler that selects batches of due feeds and an
//! ingestion pipeline that turns one feed's document into stored posts.
//!
//! Errors never leave the scope they occur in. A failed selection skips
//! the tick, a failed mark-fetched or fetch ends that feed's run, a bad
//! date or rejected insert drops that item. All of them are logged.

mod pipeline;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{
    build_post, normalize_description, parse_pub_date, run_pipeline, DateParseError,
    PipelineError, PipelineResult, PUB_DATE_FORMAT,
};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, TickReport};
