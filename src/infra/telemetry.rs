use std::{sync::Once, time::Duration};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use tracing::debug;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::feed::{FanoutStep, FeedSource};
use crate::application::observer::FeedObserver;
use crate::config::{LogFormat, LoggingSettings};
use crate::domain::types::{PostId, UserId};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "homefeed_posts_stored_total",
            Unit::Count,
            "Total number of posts written to the post store."
        );
        describe_counter!(
            "homefeed_fanout_delivered_total",
            Unit::Count,
            "Total number of friends that received a post in their feed and live stream."
        );
        describe_counter!(
            "homefeed_fanout_failed_total",
            Unit::Count,
            "Total number of friends a fanout failed for, labelled by failing step."
        );
        describe_counter!(
            "homefeed_fanout_skipped_total",
            Unit::Count,
            "Total number of friends skipped after an earlier fanout failure."
        );
        describe_histogram!(
            "homefeed_fanout_ms",
            Unit::Milliseconds,
            "Fanout latency per post in milliseconds."
        );
        describe_counter!(
            "homefeed_feed_reads_total",
            Unit::Count,
            "Total number of feed reads, labelled by serving source."
        );
        describe_counter!(
            "homefeed_feed_cache_degraded_total",
            Unit::Count,
            "Total number of feed reads answered by the post store because the cache failed."
        );
        describe_histogram!(
            "homefeed_cache_warm_ms",
            Unit::Milliseconds,
            "Feed cache warm run latency in milliseconds."
        );
        describe_counter!(
            "homefeed_cache_warm_failed_total",
            Unit::Count,
            "Total number of users whose feed could not be rebuilt by the warmer."
        );
    });
}

/// Reports feed service events as metrics and debug-level traces.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl FeedObserver for MetricsObserver {
    fn post_stored(&self, post: PostId) {
        debug!(target = "homefeed::feed", post_id = %post, "post stored");
        counter!("homefeed_posts_stored_total").increment(1);
    }

    fn fanout_delivered(&self, _post: PostId, _friend: UserId) {
        counter!("homefeed_fanout_delivered_total").increment(1);
    }

    fn fanout_failed(&self, _post: PostId, _friend: UserId, step: FanoutStep) {
        counter!("homefeed_fanout_failed_total", "step" => step.as_str()).increment(1);
    }

    fn fanout_finished(&self, post: PostId, delivered: usize, skipped: usize, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        debug!(
            target = "homefeed::feed",
            post_id = %post,
            delivered,
            skipped,
            elapsed_ms,
            "fanout finished"
        );
        if skipped > 0 {
            counter!("homefeed_fanout_skipped_total").increment(skipped as u64);
        }
        histogram!("homefeed_fanout_ms").record(elapsed_ms);
    }

    fn feed_served(&self, user: UserId, source: FeedSource, entries: usize) {
        debug!(
            target = "homefeed::feed",
            user = %user,
            source = source.as_str(),
            entries,
            "feed served"
        );
        counter!("homefeed_feed_reads_total", "source" => source.as_str()).increment(1);
    }

    fn cache_degraded(&self, _user: UserId) {
        counter!("homefeed_feed_cache_degraded_total").increment(1);
    }
}
