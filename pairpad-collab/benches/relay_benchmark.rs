use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use pairpad_collab::broadcast::{outbox, BroadcastGroup};
use pairpad_collab::color::ColorAssigner;
use pairpad_collab::gateway::{ConnectionGateway, GatewayConfig};
use pairpad_collab::identity::{ConnectionId, Identity, ParticipantId};
use pairpad_collab::protocol::{
    decode_event, encode_event, ClientEvent, CursorUpdate, Encoding, SelectionRange, ServerEvent,
};

fn document(len: usize) -> String {
    "fn main() { println!(\"hi\"); }\n".repeat(len / 32 + 1)
}

fn cursor() -> ClientEvent {
    ClientEvent::CursorUpdate(CursorUpdate {
        user_id: ParticipantId::from("alice"),
        range: SelectionRange::new(12, 4, 14, 17),
        color: "#FF6B6B".into(),
    })
}

fn bench_text_encode_json(c: &mut Criterion) {
    let event = ClientEvent::TextUpdate(document(4096));
    c.bench_function("text_encode_json_4KB", |b| {
        b.iter(|| black_box(encode_event(black_box(&event), Encoding::Json).unwrap()))
    });
}

fn bench_text_encode_binary(c: &mut Criterion) {
    let event = ClientEvent::TextUpdate(document(4096));
    c.bench_function("text_encode_binary_4KB", |b| {
        b.iter(|| black_box(encode_event(black_box(&event), Encoding::Binary).unwrap()))
    });
}

fn bench_cursor_decode_json(c: &mut Criterion) {
    let frame = encode_event(&cursor(), Encoding::Json).unwrap();
    c.bench_function("cursor_decode_json", |b| {
        b.iter(|| black_box(decode_event::<ClientEvent>(black_box(&frame)).unwrap()))
    });
}

fn bench_cursor_decode_binary(c: &mut Criterion) {
    let frame = encode_event(&cursor(), Encoding::Binary).unwrap();
    c.bench_function("cursor_decode_binary", |b| {
        b.iter(|| black_box(decode_event::<ClientEvent>(black_box(&frame)).unwrap()))
    });
}

fn bench_color_assign_1000(c: &mut Criterion) {
    let ids: Vec<ParticipantId> = (0..1000).map(|i| ParticipantId::new(format!("user-{i}"))).collect();
    c.bench_function("color_assign_1000_ids", |b| {
        b.iter(|| {
            let mut assigner = ColorAssigner::new();
            for id in &ids {
                black_box(assigner.color_for(id));
            }
        })
    });
}

fn bench_broadcast_100_peers(c: &mut Criterion) {
    let mut group = BroadcastGroup::new();
    let sender = ConnectionId::new();
    let mut receivers = Vec::new();
    for _ in 0..100 {
        let (tx, rx) = outbox();
        group.add_connection(ConnectionId::new(), tx);
        receivers.push(rx);
    }
    let text = document(1024);

    c.bench_function("broadcast_text_100_peers", |b| {
        b.iter(|| {
            black_box(group.send_except(&sender, ServerEvent::TextUpdate(text.clone())));
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

fn bench_gateway_cursor_fanout(c: &mut Criterion) {
    let mut gateway = ConnectionGateway::new(GatewayConfig::default());
    let mut receivers = Vec::new();
    let mut connections = Vec::new();
    for i in 0..20 {
        let conn = ConnectionId::new();
        let (tx, rx) = outbox();
        let identity = Identity::Identified {
            id: ParticipantId::new(format!("user-{i}")),
            name: None,
        };
        gateway.connect(conn, identity, tx);
        connections.push(conn);
        receivers.push(rx);
    }
    let sender = connections[0];

    c.bench_function("gateway_cursor_fanout_20", |b| {
        b.iter(|| {
            black_box(gateway.handle(sender, cursor()));
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

criterion_group!(
    benches,
    bench_text_encode_json,
    bench_text_encode_binary,
    bench_cursor_decode_json,
    bench_cursor_decode_binary,
    bench_color_assign_1000,
    bench_broadcast_100_peers,
    bench_gateway_cursor_fanout,
);

criterion_main!(benches);
