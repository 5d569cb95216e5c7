//! Periodic check of watched lessons against live availability.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::lessons::LessonSource;
use crate::metrics::METRICS;
use crate::store::{Store, Watch};
use crate::times::{format_timestamp, DATE_LAYOUT, TIME_LAYOUT};
use crate::types::{OutgoingMessage, Sender};

/// Window covering every watched lesson, padded by a second on both sides.
pub fn timeframe(watches: &[Watch]) -> Option<(i64, i64)> {
    let start = watches
        .iter()
        .map(|watch| watch.lesson.start_timestamp)
        .min()?;
    let end = watches
        .iter()
        .map(|watch| watch.lesson.end_timestamp())
        .max()?;
    Some((start - 1, end + 1))
}

/// Returns the watches whose lesson has a free spot and deletes them from the
/// store, so each watch fires once.
pub async fn check_availability(store: &dyn Store, source: &dyn LessonSource) -> Result<Vec<Watch>> {
    let watches = store.all_watches().await?;
    let Some((from, to)) = timeframe(&watches) else {
        return Ok(vec![]);
    };

    let open: HashSet<String> = source
        .lessons(from, to)
        .await?
        .into_iter()
        .filter(|lesson| lesson.has_spots())
        .map(|lesson| lesson.id)
        .collect();

    let available: Vec<Watch> = watches
        .into_iter()
        .filter(|watch| open.contains(&watch.lesson.id))
        .collect();
    if available.is_empty() {
        return Ok(available);
    }

    let ids: Vec<u64> = available.iter().map(|watch| watch.id).collect();
    store.delete_watches(&ids).await?;
    Ok(available)
}

pub fn availability_message(watch: &Watch) -> OutgoingMessage {
    OutgoingMessage::text(
        watch.owner.chat,
        format!(
            "Er is een plek vrijgekomen bij {} op {} om {}! Snel boeken.",
            watch.lesson.activity.name,
            format_timestamp(watch.lesson.start_timestamp, DATE_LAYOUT),
            format_timestamp(watch.lesson.start_timestamp, TIME_LAYOUT),
        ),
    )
}

/// Runs [`check_availability`] on an interval and tells owners about free
/// spots.
pub struct Poller {
    store: Arc<dyn Store>,
    source: Arc<dyn LessonSource>,
    sender: Arc<dyn Sender>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn LessonSource>,
        sender: Arc<dyn Sender>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            sender,
            interval,
        }
    }

    /// One check. Returns how many owners were told.
    pub async fn poll_once(&self) -> Result<usize> {
        let available = check_availability(self.store.as_ref(), self.source.as_ref()).await?;
        let mut notified = 0;
        for watch in &available {
            match self.sender.send(availability_message(watch)).await {
                Ok(()) => notified += 1,
                Err(e) => {
                    METRICS.record_error("poller", e.kind());
                    error!(error = %e, watch = watch.id, "failed to send availability");
                }
            }
        }
        Ok(notified)
    }

    /// Polls until the task is dropped. The first check runs immediately.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "starting availability poller");
        let mut ticks = IntervalStream::new(tokio::time::interval(self.interval));
        while ticks.next().await.is_some() {
            match self.poll_once().await {
                Ok(0) => debug!("no watched lessons became available"),
                Ok(notified) => info!(notified, "sent availability notifications"),
                Err(e) => {
                    METRICS.record_error("poller", e.kind());
                    error!(error = %e, "availability check failed");
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
