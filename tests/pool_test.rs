/*!
 * Worker Pool Tests
 */

use std::sync::Arc;
use std::time::Duration;
use weft_capture::config::{CaptureConfig, SharedConfig};
use weft_capture::core::id::CorrelationIdGenerator;
use weft_capture::correlate::{CorrelatorCounters, CorrelatorRouter, ShardedCorrelator};
use weft_capture::pool::{PoolHandle, WorkerPool};
use weft_capture::pressure::LatencyTracker;
use weft_capture::{
    BufferId, EventRing, OverflowPolicy, Payload, ProducerId, RawEvent, VecSink, WorkerId,
};

fn test_config(min: usize, target: usize, max: usize) -> SharedConfig {
    SharedConfig::new(CaptureConfig {
        buffer_capacity: 1024,
        buffer_count: 4,
        workers_min: min,
        workers_target: target,
        workers_max: max,
        ..Default::default()
    })
    .unwrap()
}

fn buffers(count: usize) -> Vec<Arc<EventRing>> {
    (0..count)
        .map(|i| {
            Arc::new(EventRing::new(
                BufferId(i as u32),
                1024,
                OverflowPolicy::DropOldest,
            ))
        })
        .collect()
}

fn start_correlator(
    config: &SharedConfig,
    sink: Arc<VecSink>,
) -> (CorrelatorRouter, Vec<tokio::task::JoinHandle<()>>) {
    ShardedCorrelator::start(
        config.clone(),
        CorrelationIdGenerator::new(),
        sink,
        Arc::new(CorrelatorCounters::default()),
        Arc::new(LatencyTracker::new()),
    )
}

/// Poll until the pool reports `workers` workers owning `partitions`
/// partitions in total, returning the settled assignment view
async fn wait_assignments(
    pool: &PoolHandle,
    workers: usize,
    partitions: usize,
) -> Vec<(WorkerId, Vec<u32>)> {
    for _ in 0..200 {
        let view = pool.assignments().await;
        if view.len() == workers
            && view.iter().map(|(_, p)| p.len()).sum::<usize>() == partitions
        {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("assignments never settled to {workers} workers / {partitions} partitions");
}

async fn wait_sink_len(sink: &VecSink, expected: usize) {
    for _ in 0..500 {
        if sink.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sink settled at {} events, expected {expected}", sink.len());
}

fn write(ring: &EventRing, tag: u64) {
    ring.write(RawEvent::new(
        ProducerId(tag),
        Payload::ProcessExit { exit_code: None },
    ))
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partitions_disjointly_assigned() {
    let config = test_config(1, 2, 4);
    let sink = Arc::new(VecSink::new());
    let (router, shard_handles) = start_correlator(&config, sink);
    let rings = buffers(4);

    let pool = WorkerPool::start(&rings, config, router);
    let view = wait_assignments(&pool, 2, 4).await;

    let mut owned: Vec<u32> = view.iter().flat_map(|(_, p)| p.iter().copied()).collect();
    owned.sort_unstable();
    // Every partition owned by exactly one worker
    assert_eq!(owned, vec![0, 1, 2, 3]);

    pool.shutdown().await;
    let _ = futures::future::join_all(shard_handles).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crash_reassigns_without_orphan_or_double_ownership() {
    let config = test_config(1, 2, 4);
    let sink = Arc::new(VecSink::new());
    let (router, shard_handles) = start_correlator(&config, sink);
    let rings = buffers(4);

    let pool = WorkerPool::start(&rings, config, router);
    let view = wait_assignments(&pool, 2, 4).await;
    let victim = view[0].0;

    pool.terminate_worker(victim);

    // After reassignment the survivor owns all four partitions, none
    // orphaned, none double-owned, and the dead worker is gone
    let view = wait_assignments(&pool, 1, 4).await;
    assert!(view.iter().all(|(id, _)| *id != victim));
    let mut owned: Vec<u32> = view.iter().flat_map(|(_, p)| p.iter().copied()).collect();
    owned.sort_unstable();
    assert_eq!(owned, vec![0, 1, 2, 3]);

    pool.shutdown().await;
    let _ = futures::future::join_all(shard_handles).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scale_up_and_down_respects_bounds() {
    let config = test_config(1, 2, 4);
    let sink = Arc::new(VecSink::new());
    let (router, shard_handles) = start_correlator(&config, sink);
    let rings = buffers(4);

    let pool = WorkerPool::start(&rings, config, router);
    wait_assignments(&pool, 2, 4).await;

    // Above the ceiling clamps to it
    pool.scale_to(100);
    wait_assignments(&pool, 4, 4).await;

    // Below the floor clamps to it
    pool.scale_to(0);
    wait_assignments(&pool, 1, 4).await;

    pool.shutdown().await;
    let _ = futures::future::join_all(shard_handles).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_survive_scaling_exactly_once() {
    let config = test_config(1, 2, 4);
    let sink = Arc::new(VecSink::new());
    let (router, shard_handles) = start_correlator(&config, Arc::clone(&sink));
    let rings = buffers(4);

    let pool = WorkerPool::start(&rings, config, router);
    wait_assignments(&pool, 2, 4).await;

    for i in 0..200u64 {
        write(&rings[(i % 4) as usize], i);
    }
    pool.scale_to(4);
    for i in 200..400u64 {
        write(&rings[(i % 4) as usize], i);
    }
    pool.scale_to(1);
    for i in 400..600u64 {
        write(&rings[(i % 4) as usize], i);
    }

    // Cursor positions carried through both rebalances: every event arrives
    // at the sink exactly once
    wait_sink_len(&sink, 600).await;

    let mut producers: Vec<u64> = sink
        .snapshot()
        .iter()
        .map(|e| e.event.event.producer.0)
        .collect();
    producers.sort_unstable();
    producers.dedup();
    assert_eq!(producers.len(), 600);

    pool.shutdown().await;
    let _ = futures::future::join_all(shard_handles).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_enrich_with_their_id() {
    let config = test_config(1, 1, 2);
    let sink = Arc::new(VecSink::new());
    let (router, shard_handles) = start_correlator(&config, Arc::clone(&sink));
    let rings = buffers(1);

    let pool = WorkerPool::start(&rings, config, router);

    write(&rings[0], 1);
    wait_sink_len(&sink, 1).await;

    let events = sink.snapshot();
    assert_ne!(events[0].event.worker, WorkerId(0));
    assert!(events[0].event.batch_sequence > 0);

    pool.shutdown().await;
    let _ = futures::future::join_all(shard_handles).await;
}
