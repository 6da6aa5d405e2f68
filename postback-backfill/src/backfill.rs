use tracing::info;

use postback_common::event::ApiErrorDetail;
use postback_common::fetch::{Cursor, FetchError, FetchOutcome};
use postback_common::pipeline::Pipeline;

/// How a backfill that did not fault came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillEnd {
    /// Upstream answered 422 `malformed`: every available event has been read.
    Exhausted(Vec<ApiErrorDetail>),
    /// A page came back without a `nextUrl`.
    EndOfStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillSummary {
    pub batches: usize,
    pub urls: usize,
    pub postbacks: usize,
    pub skipped: usize,
    pub end: BackfillEnd,
}

/// Process exit status for a finished backfill: 0 when the data ran out, 1 on any fault.
pub fn exit_status(result: &Result<BackfillSummary, FetchError>) -> u8 {
    match result {
        Ok(BackfillSummary {
            end: BackfillEnd::Exhausted(_) | BackfillEnd::EndOfStream,
            ..
        }) => 0,
        Err(_) => 1,
    }
}

/// Follows `nextUrl` cursors from a starting timestamp, building (and optionally firing)
/// postbacks for every page on the way.
pub struct Backfill {
    pipeline: Pipeline,
}

impl Backfill {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Run until the data runs out. Any fetch fault other than exhaustion ends the backfill
    /// and is returned; record and postback faults never do.
    pub async fn run(&self, start: Cursor) -> Result<BackfillSummary, FetchError> {
        let mut cursor = start;
        let (mut batches, mut urls, mut postbacks, mut skipped) = (0, 0, 0, 0);

        loop {
            info!(%cursor, "attempting request");

            let page = match self.pipeline.fetch(&cursor).await? {
                FetchOutcome::Page(page) => page,
                FetchOutcome::Exhausted(details) => {
                    info!(
                        ?details,
                        "reached end of available data, this is expected behavior"
                    );
                    return Ok(BackfillSummary {
                        batches,
                        urls,
                        postbacks,
                        skipped,
                        end: BackfillEnd::Exhausted(details),
                    });
                }
            };

            let batch = self.pipeline.extract(&page);
            let delivery = self.pipeline.deliver(&batch.records).await;

            batches += 1;
            urls += delivery.urls.len();
            skipped += batch.skipped.len();
            postbacks += delivery.postbacks.as_ref().map_or(0, Vec::len);

            info!(
                batch = batches,
                batch_urls = delivery.urls.len(),
                total_urls = urls,
                "batch done, {} postback urls so far",
                urls
            );

            match page.next_url {
                Some(next) => cursor = Cursor::NextUrl(next),
                None => {
                    info!("no next url returned, end of stream");
                    return Ok(BackfillSummary {
                        batches,
                        urls,
                        postbacks,
                        skipped,
                        end: BackfillEnd::EndOfStream,
                    });
                }
            }
        }
    }
}
