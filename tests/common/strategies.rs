use proptest::prelude::*;
use tasker_scheduler::config::BackoffConfig;
use tasker_scheduler::{RiskLevel, TaskPriority};

pub fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Critical),
        Just(TaskPriority::High),
        Just(TaskPriority::Medium),
        Just(TaskPriority::Low),
        Just(TaskPriority::Background),
    ]
}

pub fn risk_strategy() -> impl Strategy<Value = RiskLevel> {
    prop_oneof![
        Just(RiskLevel::Low),
        Just(RiskLevel::Medium),
        Just(RiskLevel::High),
    ]
}

pub fn confidence_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

/// Forward-only edges `(from, to)` with `from < to` over `size` nodes; a
/// node depends on every node with an edge into it
pub fn acyclic_edges_strategy(size: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..size, 0..size), 0..size * 2).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
            .collect()
    })
}

/// A ring over the first `len` nodes of a batch of `size`, plus noise edges
pub fn cyclic_batch_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..8).prop_flat_map(|size| {
        (Just(size), 1..=size).prop_flat_map(move |(size, len)| {
            acyclic_edges_strategy(size).prop_map(move |mut edges| {
                for node in 0..len {
                    edges.push((node, (node + 1) % len));
                }
                (size, edges)
            })
        })
    })
}

pub fn backoff_config_strategy() -> impl Strategy<Value = BackoffConfig> {
    (1u32..8, 1u64..5_000, 1.0f64..4.0, any::<bool>(), 0.0f64..=1.0).prop_flat_map(
        |(max_attempts, base_delay_ms, backoff_multiplier, jitter_enabled, jitter)| {
            (base_delay_ms..=base_delay_ms * 50).prop_map(move |max_delay_ms| BackoffConfig {
                max_attempts,
                base_delay_ms,
                backoff_multiplier,
                max_delay_ms,
                jitter_enabled,
                jitter_max_percentage: jitter,
            })
        },
    )
}
