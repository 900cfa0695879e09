//! Integration tests for the dispatch queue and logic workers.
//!
//! Workers are real OS threads; every test ends with `shutdown()`, which
//! joins them, so assertions run after all handling is done.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use packetforge_dispatch::{
    Category, DbCompletion, DbResult, DispatchConfig, LogicDispatcher, LogicHandler, Packet,
    Routing,
};
use packetforge_pool::ObjectPool;
use packetforge_protocol::{BinaryPacket, Payload};
use packetforge_transport::ConnectionId;

// =========================================================================
// Helpers
// =========================================================================

type Log = Arc<Mutex<Vec<(usize, Option<ConnectionId>, Option<u16>)>>>;

struct Recorder {
    worker: usize,
    log: Log,
}

impl LogicHandler for Recorder {
    fn on_packet(&mut self, packet: &Packet) {
        if !matches!(packet, Packet::ServerShutdown) {
            self.log
                .lock()
                .unwrap()
                .push((self.worker, packet.owner(), packet.packet_id()));
        }
    }
}

fn recorder(config: DispatchConfig) -> (LogicDispatcher, Log) {
    let log: Log = Arc::default();
    let shared = Arc::clone(&log);
    let dispatcher = LogicDispatcher::spawn(config, move |worker| Recorder {
        worker,
        log: Arc::clone(&shared),
    })
    .unwrap();
    (dispatcher, log)
}

fn data(owner: u64, id: u16) -> Packet {
    Packet::Data {
        owner: ConnectionId::new(owner),
        payload: Payload::binary(id, id.to_le_bytes()),
    }
}

// =========================================================================
// Ordering
// =========================================================================

#[test]
fn test_single_worker_preserves_push_order() {
    let (dispatcher, log) = recorder(DispatchConfig::default());
    let queue = dispatcher.queue();
    for id in [b'A', b'B', b'C'] {
        queue.push(data(1, u16::from(id))).unwrap();
    }
    dispatcher.shutdown().unwrap();

    let ids: Vec<_> = log.lock().unwrap().iter().filter_map(|e| e.2).collect();
    assert_eq!(ids, [u16::from(b'A'), u16::from(b'B'), u16::from(b'C')]);
}

#[test]
fn test_single_worker_orders_mixed_sources_globally() {
    let (dispatcher, log) = recorder(DispatchConfig::default());
    let queue = dispatcher.queue();
    queue.push(Packet::Connect { owner: ConnectionId::new(1) }).unwrap();
    queue.push(data(1, 10)).unwrap();
    queue.push(Packet::Timer { timer_id: 4 }).unwrap();
    queue.push(data(2, 11)).unwrap();
    queue.push(Packet::Disconnect { owner: ConnectionId::new(1) }).unwrap();
    let reports = dispatcher.shutdown().unwrap();

    let owners: Vec<_> = log.lock().unwrap().iter().map(|e| e.1.map(|c| c.into_inner())).collect();
    assert_eq!(owners, [Some(1), Some(1), None, Some(2), Some(1)]);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].processed, 6);
    assert_eq!(reports[0].count(Category::Data), 2);
    assert_eq!(reports[0].count(Category::ServerShutdown), 1);
}

#[test]
fn test_many_workers_keep_per_connection_order() {
    let config = DispatchConfig {
        logic_threads: 4,
        routing: Routing::ByConnection,
    };
    let (dispatcher, log) = recorder(config);

    let producers: Vec<_> = (0..8u64)
        .map(|conn| {
            let queue = dispatcher.queue();
            std::thread::spawn(move || {
                for id in 0..200u16 {
                    queue.push(data(conn, id)).unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    let reports = dispatcher.shutdown().unwrap();

    let mut per_conn: HashMap<u64, Vec<u16>> = HashMap::new();
    let mut worker_of: HashMap<u64, usize> = HashMap::new();
    for (worker, owner, id) in log.lock().unwrap().iter() {
        let owner = owner.unwrap().into_inner();
        per_conn.entry(owner).or_default().push(id.unwrap());
        // A connection never moves between workers.
        assert_eq!(*worker_of.entry(owner).or_insert(*worker), *worker);
    }
    for ids in per_conn.values() {
        assert_eq!(*ids, (0..200).collect::<Vec<_>>());
    }
    let total: u64 = reports.iter().map(|r| r.count(Category::Data)).sum();
    assert_eq!(total, 8 * 200);
}

// =========================================================================
// Shutdown
// =========================================================================

#[test]
fn test_shutdown_drains_everything_queued_before_it() {
    let (dispatcher, log) = recorder(DispatchConfig::with_threads(3));
    let queue = dispatcher.queue();
    for i in 0..500u64 {
        queue.push(data(i, i as u16)).unwrap();
    }
    queue.push(Packet::ServerShutdown).unwrap();
    assert!(queue.push(data(1, 1)).is_err());

    let reports = dispatcher.join().unwrap();
    assert_eq!(log.lock().unwrap().len(), 500);
    assert!(reports.iter().all(|r| r.count(Category::ServerShutdown) == 1));
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_shutdown_twice_is_harmless() {
    let (dispatcher, _log) = recorder(DispatchConfig::default());
    dispatcher.queue().shutdown().unwrap();
    let reports = dispatcher.shutdown().unwrap();
    assert_eq!(reports[0].processed, 1);
}

#[test]
fn test_on_shutdown_runs_once_per_worker() {
    struct Flag(Arc<Mutex<u32>>);
    impl LogicHandler for Flag {
        fn on_packet(&mut self, _: &Packet) {}
        fn on_shutdown(&mut self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    let calls = Arc::new(Mutex::new(0));
    let shared = Arc::clone(&calls);
    let dispatcher = LogicDispatcher::spawn(DispatchConfig::with_threads(3), move |_| {
        Flag(Arc::clone(&shared))
    })
    .unwrap();
    dispatcher.shutdown().unwrap();
    assert_eq!(*calls.lock().unwrap(), 3);
}

// =========================================================================
// Disposal
// =========================================================================

#[test]
fn test_data_payloads_return_to_pool() {
    let pool = ObjectPool::new("binary", 16, BinaryPacket::default);
    let (dispatcher, _log) = recorder(DispatchConfig::with_threads(2));
    let queue = dispatcher.queue();

    for i in 0..16u64 {
        let mut packet = pool.checkout().unwrap();
        packet.packet_id = i as u16;
        queue
            .push(Packet::Data {
                owner: ConnectionId::new(i),
                payload: Payload::Binary(packet),
            })
            .unwrap();
    }
    assert_eq!(pool.available(), 0);

    dispatcher.shutdown().unwrap();
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.available(), 16);
}

#[test]
fn test_db_results_reach_completion_after_handler() {
    #[derive(Default)]
    struct Completions(Mutex<Vec<(u64, String)>>);
    impl DbCompletion for Completions {
        fn complete(&self, result: DbResult) {
            let thread = std::thread::current().name().unwrap_or_default().to_owned();
            self.0.lock().unwrap().push((result.request_id, thread));
        }
    }

    let completions = Arc::new(Completions::default());
    let handled = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&handled);
    let dispatcher = LogicDispatcher::spawn_with_db(
        DispatchConfig::default(),
        completions.clone(),
        move |_| {
            let seen = Arc::clone(&seen);
            move |p: &Packet| {
                if let Packet::DbResult(r) = p {
                    seen.lock().unwrap().push(r.request_id);
                }
            }
        },
    )
    .unwrap();

    let queue = dispatcher.queue();
    queue
        .push(Packet::DbResult(DbResult::success(
            7,
            Some(ConnectionId::new(1)),
            serde_json::json!([{ "id": 1 }]),
        )))
        .unwrap();
    queue.push(Packet::DbResult(DbResult::failure(8, None, -999))).unwrap();
    dispatcher.shutdown().unwrap();

    assert_eq!(*handled.lock().unwrap(), [7, 8]);
    let done = completions.0.lock().unwrap();
    assert_eq!(done.iter().map(|d| d.0).collect::<Vec<_>>(), [7, 8]);
    assert!(done.iter().all(|d| d.1 == "packetforge-logic-0"));
}
