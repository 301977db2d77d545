//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 广播服务端 -> 接收端 -> 分发器 -> sinks 的端到端数据流
//! - 数据源断开时的 sink 处理策略

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, Record};
    use ingestion::FrameCodec;

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_wire_format_snapshot() {
        let record = Record::new(7, "42.5", 1000).unwrap();
        assert_eq!(
            &FrameCodec::encode(&record)[..],
            br#"{"iec":"7","value":"42.5","timestamp":"1000"}"#
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use broadcast::{BroadcastServer, ServerConfig, ServerHandle};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DisconnectPolicy, ReceiverConfig, Record, SinkConfig, SinkType};
    use dispatcher::{create_dispatcher, IngestionDispatcher};
    use ingestion::{FrameCodec, ReceiverExit, ReceiverHandle, StreamReceiver};

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn start_server() -> ServerHandle {
        BroadcastServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        })
        .start()
        .unwrap()
    }

    fn sink(name: &str, sink_type: SinkType, params: &[(&str, String)]) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type,
            queue_capacity: None,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn connect(
        server: &ServerHandle,
        dispatcher: &Arc<IngestionDispatcher>,
        on_disconnect: DisconnectPolicy,
    ) -> ReceiverHandle {
        let config = ReceiverConfig {
            host: "127.0.0.1".into(),
            port: server.local_addr().port(),
            on_disconnect,
            ..ReceiverConfig::default()
        };
        let before = server.metrics().clients_accepted;
        let receiver = StreamReceiver::new(config, dispatcher.clone()).start().unwrap();
        assert!(wait_until(|| server.metrics().clients_accepted > before));
        receiver
    }

    fn persisted(dispatcher: &IngestionDispatcher, name: &str) -> u64 {
        dispatcher
            .metrics()
            .into_iter()
            .find(|(sink, _)| sink == name)
            .map_or(0, |(_, m)| m.persisted_count)
    }

    fn record(address: u32, value: &str, timestamp: i64) -> Record {
        Record::new(address, value, timestamp).unwrap()
    }

    /// End-to-end: BroadcastServer -> StreamReceiver -> Dispatcher -> sinks
    #[test]
    fn test_e2e_broadcast_to_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("records.jsonl");

        let dispatcher = Arc::new(
            create_dispatcher(&[
                sink("log", SinkType::Log, &[]),
                sink("table", SinkType::File, &[("path", table.display().to_string())]),
                sink("kv", SinkType::LatestValue, &[]),
            ])
            .unwrap(),
        );

        let server = start_server();
        let receiver = connect(&server, &dispatcher, DisconnectPolicy::StopSinks);

        let records = [
            record(1, "12.0", 100),
            record(9, "true", 100),
            record(1, "13.0", 101),
            record(2, "42.5", 101),
        ];
        for r in &records {
            server.broadcast(FrameCodec::encode(r)).unwrap();
        }

        assert!(wait_until(|| persisted(&dispatcher, "table") == 4));
        assert!(wait_until(|| persisted(&dispatcher, "kv") == 4));
        assert!(wait_until(|| persisted(&dispatcher, "log") == 4));

        let kv = dispatcher.latest_values("kv").unwrap();
        assert_eq!(kv.get(1).unwrap().value(), "13.0");
        assert_eq!(kv.get(9).unwrap().value(), "true");
        let addresses: Vec<_> = kv.snapshot().iter().map(Record::address).collect();
        assert_eq!(addresses, vec![1, 2, 9]);

        // Closing the source stops every sink
        server.stop();
        server.join().unwrap();
        assert_eq!(receiver.join().unwrap(), ReceiverExit::PeerClosed);
        dispatcher.join_all().unwrap();

        let metrics = receiver.metrics();
        assert_eq!(metrics.frames_decoded, 4);
        assert_eq!(metrics.frames_malformed, 0);

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(&table)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[3],
            serde_json::json!({ "iec": 2, "value": "42.5", "timestamp": 101 })
        );
    }

    /// Malformed fragments and stray bytes are skipped; later frames still decode
    #[test]
    fn test_e2e_malformed_frames_skipped() {
        let dispatcher = Arc::new(create_dispatcher(&[sink("kv", SinkType::LatestValue, &[])]).unwrap());
        let server = start_server();
        let receiver = connect(&server, &dispatcher, DisconnectPolicy::StopSinks);

        server
            .broadcast(b"noise{\"iec\":\"x\"}".to_vec())
            .unwrap();
        // One frame split across two writes
        let frame = FrameCodec::encode(&record(5, "7.5", 200));
        let (head, tail) = frame.split_at(10);
        server.broadcast(head.to_vec()).unwrap();
        thread::sleep(Duration::from_millis(50));
        server.broadcast(tail.to_vec()).unwrap();

        assert!(wait_until(|| persisted(&dispatcher, "kv") == 1));
        assert!(wait_until(|| receiver.metrics().frames_malformed == 1));
        let metrics = receiver.metrics();
        assert_eq!(metrics.frames_decoded, 1);
        assert!(metrics.bytes_discarded >= 5);
        assert_eq!(
            dispatcher.latest_values("kv").unwrap().get(5).unwrap().value(),
            "7.5"
        );

        receiver.stop();
        assert_eq!(receiver.join().unwrap(), ReceiverExit::Stopped);
        dispatcher.stop_all();
        dispatcher.join_all().unwrap();
    }

    /// Every connected receiver gets every broadcast record, in order
    #[test]
    fn test_e2e_fanout_to_many_receivers() {
        let server = start_server();
        let mut pairs = Vec::new();
        for _ in 0..3 {
            let dispatcher =
                Arc::new(create_dispatcher(&[sink("kv", SinkType::LatestValue, &[])]).unwrap());
            let receiver = connect(&server, &dispatcher, DisconnectPolicy::StopSinks);
            pairs.push((dispatcher, receiver));
        }
        assert!(wait_until(|| server.client_count() == 3));

        for ts in 0..20 {
            server
                .broadcast(FrameCodec::encode(&record(3, &format!("{ts}.0"), ts)))
                .unwrap();
        }

        for (dispatcher, _) in &pairs {
            assert!(wait_until(|| persisted(dispatcher, "kv") == 20));
            let latest = dispatcher.latest_values("kv").unwrap().get(3).unwrap();
            assert_eq!(latest.value(), "19.0");
            assert_eq!(latest.timestamp(), 19);
        }

        server.stop();
        server.join().unwrap();
        for (dispatcher, receiver) in pairs {
            assert_eq!(receiver.join().unwrap(), ReceiverExit::PeerClosed);
            dispatcher.join_all().unwrap();
        }
    }

    /// `stop_sinks`: once the source closes, sinks refuse new records
    #[test]
    fn test_source_close_stops_sinks() {
        let dispatcher = Arc::new(create_dispatcher(&[sink("log", SinkType::Log, &[])]).unwrap());
        let server = start_server();
        let receiver = connect(&server, &dispatcher, DisconnectPolicy::StopSinks);

        server.stop();
        server.join().unwrap();
        assert_eq!(receiver.join().unwrap(), ReceiverExit::PeerClosed);

        let probe = record(1, "1.0", 0);
        assert!(wait_until(|| dispatcher.dispatch(&probe) == 0));
        dispatcher.join_all().unwrap();
    }

    /// `keep_sinks`: sinks survive the source closing and accept a new receiver
    #[test]
    fn test_keep_sinks_policy() {
        let dispatcher =
            Arc::new(create_dispatcher(&[sink("kv", SinkType::LatestValue, &[])]).unwrap());

        let first = start_server();
        let receiver = connect(&first, &dispatcher, DisconnectPolicy::KeepSinks);
        first.broadcast(FrameCodec::encode(&record(1, "1.0", 1))).unwrap();
        assert!(wait_until(|| persisted(&dispatcher, "kv") == 1));

        first.stop();
        first.join().unwrap();
        assert_eq!(receiver.join().unwrap(), ReceiverExit::PeerClosed);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(dispatcher.dispatch(&record(2, "2.0", 2)), 1);

        let second = start_server();
        let receiver = connect(&second, &dispatcher, DisconnectPolicy::KeepSinks);
        second.broadcast(FrameCodec::encode(&record(1, "3.0", 3))).unwrap();
        assert!(wait_until(|| persisted(&dispatcher, "kv") == 3));
        assert_eq!(
            dispatcher.latest_values("kv").unwrap().get(1).unwrap().value(),
            "3.0"
        );

        receiver.stop();
        assert_eq!(receiver.join().unwrap(), ReceiverExit::Stopped);
        second.stop();
        second.join().unwrap();
        dispatcher.stop_all();
        dispatcher.join_all().unwrap();
    }

    /// A blueprint loaded from TOML drives the whole receive side
    #[test]
    fn test_blueprint_driven_pipeline() {
        let server = start_server();
        let text = format!(
            r#"
[receiver]
host = "127.0.0.1"
port = {port}
on_disconnect = "keep_sinks"

[[sinks]]
name = "kv"
sink_type = "latest_value"
queue_capacity = 64

[[sinks]]
name = "log"
sink_type = "log"
"#,
            port = server.local_addr().port()
        );
        let blueprint = ConfigLoader::load_from_str(&text, ConfigFormat::Toml).unwrap();

        let dispatcher = Arc::new(create_dispatcher(&blueprint.sinks).unwrap());
        assert_eq!(dispatcher.sink_names(), vec!["kv", "log"]);

        let receiver = StreamReceiver::new(blueprint.receiver.clone(), dispatcher.clone())
            .start()
            .unwrap();
        assert!(wait_until(|| server.client_count() == 1));

        server
            .broadcast(FrameCodec::encode(&record(4, "False", 10)))
            .unwrap();
        assert!(wait_until(|| persisted(&dispatcher, "kv") == 1));
        assert_eq!(
            dispatcher.latest_values("kv").unwrap().get(4).unwrap().value(),
            "false"
        );

        receiver.stop();
        receiver.join().unwrap();
        server.stop();
        server.join().unwrap();
        dispatcher.stop_all();
        dispatcher.join_all().unwrap();
    }
}
