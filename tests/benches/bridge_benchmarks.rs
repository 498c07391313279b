//! # Bridge Net Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | shared-serdes | token encode/decode, UUID pack/unpack |
//! | bridge-net | frame encode/decode, enqueue + flush through the memory network |

use bridge_net::adapters::MemoryNetwork;
use bridge_net::{BridgeConfig, Frame, NodeBuilder, PeerId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shared_serdes::{create_uuid, pack_uuid, unpack_uuid, IdentifierRegistry, Token};
use std::time::Duration;

// ============================================================================
// SHARED-SERDES
// ============================================================================

fn bench_identifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared-serdes");

    let mut registry = IdentifierRegistry::new();
    let encoded: Vec<String> = (0..1024)
        .filter_map(|i| registry.create_identifier(&format!("name-{i}")).ok())
        .map(Token::encode)
        .collect();

    group.bench_function("token_decode_1024", |b| {
        b.iter(|| {
            for text in &encoded {
                black_box(Token::decode(text).ok());
            }
        })
    });

    let uuid = create_uuid();
    let packed = pack_uuid(&uuid);
    group.bench_function("uuid_pack", |b| b.iter(|| black_box(pack_uuid(&uuid))));
    group.bench_function("uuid_unpack", |b| {
        b.iter(|| black_box(unpack_uuid(&packed).ok()))
    });

    group.finish();
}

// ============================================================================
// BRIDGE-NET
// ============================================================================

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge-net-flush");
    group.measurement_time(Duration::from_secs(5));

    for batch in [1usize, 16, 256] {
        let network = MemoryNetwork::new();
        let server_id = PeerId::new(0);
        let server = network
            .join(NodeBuilder::coordinator(server_id))
            .unwrap_or_else(|e| panic!("coordinator config: {e}"));
        let client = network
            .join(NodeBuilder::peer(PeerId::new(1), server_id))
            .unwrap_or_else(|e| panic!("peer config: {e}"));
        let _sink = server.create_bridge("Move", BridgeConfig::new());
        let moves = client
            .create_bridge("Move", BridgeConfig::new())
            .and_then(|bridge| bridge.into_peer())
            .unwrap_or_else(|e| panic!("bridge: {e}"));

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("fire_then_tick", batch), &batch, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    let _ = moves.fire(vec![json!(i), json!("payload")]);
                }
                black_box(client.tick(Duration::from_secs(1)))
            })
        });
    }

    group.finish();
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge-net-frame");

    let token = match Token::decode("D") {
        Ok(token) => token,
        Err(e) => panic!("token: {e}"),
    };
    let frame = Frame {
        declarations: vec![bridge_net::domain::Declaration {
            token,
            name: "Combat.Attack".into(),
        }],
        packets: (0..64)
            .map(|i| bridge_net::domain::WirePacket {
                channel: token,
                args: vec![json!(i), json!({"x": 1.5, "y": -2.0})],
                kind: bridge_net::PacketKind::Fire,
                correlation: None,
            })
            .collect(),
    };
    let bytes = frame.encode().unwrap_or_default();

    group.bench_function("encode_64", |b| b.iter(|| black_box(frame.encode().ok())));
    group.bench_function("decode_64", |b| {
        b.iter(|| black_box(Frame::decode(&bytes).ok()))
    });

    group.finish();
}

criterion_group!(benches, bench_identifiers, bench_flush, bench_frame_codec);
criterion_main!(benches);
