//! Prometheus metrics for the slashing protection store.

use std::sync::LazyLock;

use prometheus::{IntCounter, IntGauge};

static HISTORIES_READ: LazyLock<IntCounter> = LazyLock::new(|| {
    prometheus::register_int_counter!(
        "slashing_protection_histories_read_total",
        "Attestation histories read from the slashing protection store"
    )
    .unwrap()
});

static HISTORIES_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    prometheus::register_int_counter!(
        "slashing_protection_histories_written_total",
        "Attestation histories written to the slashing protection store"
    )
    .unwrap()
});

static MIGRATED_KEYS: LazyLock<IntGauge> = LazyLock::new(|| {
    prometheus::register_int_gauge!(
        "slashing_protection_migrated_keys",
        "Validator keys converted by the last attestation history migration"
    )
    .unwrap()
});

pub fn inc_histories_read(count: usize) {
    HISTORIES_READ.inc_by(count as u64);
}

pub fn inc_histories_written(count: usize) {
    HISTORIES_WRITTEN.inc_by(count as u64);
}

pub fn set_migrated_keys(count: usize) {
    MIGRATED_KEYS.set(count.try_into().unwrap_or(i64::MAX));
}
