use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // RUN METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total number of campaign runs that acquired the execution lock
    pub static ref RUNS_STARTED: IntCounter = register_int_counter!(
        "payout_runs_started_total",
        "Total number of campaign runs started"
    )
    .expect("payout_runs_started_total registers once");

    /// Finished runs by resulting campaign status
    pub static ref RUNS_FINISHED: IntCounterVec = register_int_counter_vec!(
        "payout_runs_finished_total",
        "Total campaign runs finished by resulting status",
        &["status"]
    )
    .expect("payout_runs_finished_total registers once");

    /// Current number of runs holding an execution lock
    pub static ref ACTIVE_RUNS: IntGauge = register_int_gauge!(
        "payout_runs_active",
        "Current number of campaign runs in progress"
    )
    .expect("payout_runs_active registers once");

    /// Lock acquisition attempts rejected because the key was held
    pub static ref LOCK_CONTENTION: IntCounterVec = register_int_counter_vec!(
        "payout_lock_contention_total",
        "Execution or deploy lock acquisitions rejected as already held",
        &["lock"]
    )
    .expect("payout_lock_contention_total registers once");

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Batches broadcast by chain family
    pub static ref BATCHES_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "payout_batches_submitted_total",
        "Total batches broadcast by chain family",
        &["family"]
    )
    .expect("payout_batches_submitted_total registers once");

    /// Finished batches by outcome
    pub static ref BATCHES_FINISHED: IntCounterVec = register_int_counter_vec!(
        "payout_batches_finished_total",
        "Total batches finished by outcome",
        &["outcome"]
    )
    .expect("payout_batches_finished_total registers once");

    /// Recipients per submitted batch
    pub static ref BATCH_SIZE: Histogram = register_histogram!(
        "payout_batch_size",
        "Recipients per submitted batch",
        vec![1.0, 5.0, 8.0, 15.0, 25.0, 50.0, 100.0, 200.0, 500.0]
    )
    .expect("payout_batch_size registers once");

    /// Recipients reaching a terminal status
    pub static ref RECIPIENTS_FINISHED: IntCounterVec = register_int_counter_vec!(
        "payout_recipients_finished_total",
        "Total recipients marked completed or failed",
        &["status"]
    )
    .expect("payout_recipients_finished_total registers once");

    /// Extra attempts spent on retryable errors
    pub static ref RETRY_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "payout_retry_attempts_total",
        "Retries performed after retryable errors",
        &["operation"]
    )
    .expect("payout_retry_attempts_total registers once");

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIRMATION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Time from submission to terminal status or timeout
    pub static ref CONFIRMATION_DURATION: HistogramVec = register_histogram_vec!(
        "payout_confirmation_duration_seconds",
        "Confirmation wait duration in seconds",
        &["family", "outcome"],
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    )
    .expect("payout_confirmation_duration_seconds registers once");

    /// Status polls per confirmation wait
    pub static ref CONFIRMATION_POLLS: Histogram = register_histogram!(
        "payout_confirmation_polls",
        "Status polls per confirmation wait",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0]
    )
    .expect("payout_confirmation_polls registers once");

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPLOYMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Distribution contract deployments by outcome
    pub static ref DEPLOYMENTS: IntCounterVec = register_int_counter_vec!(
        "payout_deployments_total",
        "Distribution contract deployments by outcome",
        &["outcome"]
    )
    .expect("payout_deployments_total registers once");

    // ═══════════════════════════════════════════════════════════════════════════
    // LOG METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Warning and error log events by level and target crate
    pub static ref LOG_EVENTS: IntCounterVec = register_int_counter_vec!(
        "payout_log_events_total",
        "Warning and error log events",
        &["level", "target"]
    )
    .expect("payout_log_events_total registers once");
}
