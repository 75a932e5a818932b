//! 日志投递指标模块
//!
//! 未安装 recorder 时所有函数均为空操作，库 crate 可直接调用。

use metrics::{counter, gauge};

/// Messages acknowledged by a collector
pub fn record_batch_sent(messages: usize) {
    counter!("logship_client_batches_sent_total").increment(1);
    counter!("logship_client_messages_sent_total").increment(messages as u64);
}

/// Retry attempt issued by a delivery task
pub fn record_batch_retried() {
    counter!("logship_client_retries_total").increment(1);
}

/// Batch handed to the restore store
pub fn record_batch_restored(messages: usize) {
    counter!("logship_client_batches_restored_total").increment(1);
    counter!("logship_client_messages_restored_total").increment(messages as u64);
}

/// Current number of batches waiting for replay
pub fn record_restore_depth(batches: usize) {
    gauge!("logship_client_restore_depth").set(batches as f64);
}

/// Batch offered to the collector intake queue
pub fn record_intake_offer(accepted: bool) {
    let status = if accepted { "accepted" } else { "rejected" };
    counter!("logship_collector_intake_offers_total", "status" => status).increment(1);
}

pub fn record_intake_depth(depth: usize) {
    gauge!("logship_collector_intake_depth").set(depth as f64);
}

/// Message written to a sink queue
pub fn record_message_routed(sink: &str) {
    counter!("logship_collector_messages_routed_total", "sink" => sink.to_string()).increment(1);
}

/// Message with no resolvable destination
pub fn record_message_unrouted(app: &str) {
    counter!("logship_collector_messages_unrouted_total", "app" => app.to_string()).increment(1);
}

/// Sink rejected a message (queue full or closed)
pub fn record_sink_failure(sink: &str, reason: &'static str) {
    counter!(
        "logship_collector_sink_failures_total",
        "sink" => sink.to_string(),
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_safe_without_recorder() {
        record_batch_sent(10);
        record_batch_retried();
        record_batch_restored(3);
        record_restore_depth(1);
        record_intake_offer(true);
        record_intake_offer(false);
        record_intake_depth(0);
        record_message_routed("default");
        record_message_unrouted("app");
        record_sink_failure("default", "full");
    }
}
