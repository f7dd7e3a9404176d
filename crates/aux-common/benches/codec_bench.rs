use aux_common::messages::{decode_client, RosterEntry, ServerMessage};
use aux_common::types::Role;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn roster(n: usize) -> Vec<RosterEntry> {
    (0..n)
        .map(|i| RosterEntry {
            client_id: format!("client-{i}"),
            display_name: format!("otter-{i}"),
            role: if i == 0 { Role::Host } else { Role::Idle },
        })
        .collect()
}

fn bench_clients_updated_encode(c: &mut Criterion) {
    let msg = ServerMessage::ClientsUpdated { clients: roster(8) };

    c.bench_function("clients_updated_encode_8", |b| {
        b.iter(|| black_box(serde_json::to_string(&msg).unwrap()));
    });
}

fn bench_register_decode(c: &mut Criterion) {
    let text =
        r#"{"type":"register","roomId":"ROOM1","clientId":"client-1","displayName":"pat","role":"host"}"#;

    c.bench_function("register_decode", |b| {
        b.iter(|| black_box(decode_client(text).unwrap()));
    });
}

fn bench_signal_decode_1kb(c: &mut Criterion) {
    let sdp = "v=0 ".repeat(256);
    let text = json!({
        "type": "signal",
        "roomId": "ROOM1",
        "from": "client-1",
        "to": "client-2",
        "payload": {"kind": "offer", "sdp": sdp},
    })
    .to_string();

    c.bench_function("signal_decode_1kb", |b| {
        b.iter(|| black_box(decode_client(&text).unwrap()));
    });
}

fn bench_signal_relay_roundtrip(c: &mut Criterion) {
    let payload = json!({"kind": "candidate", "candidate": "candidate:0 1 UDP 2122252543 192.0.2.1 51556 typ host"});
    let msg = ServerMessage::Signal {
        from: "client-1".to_string(),
        payload,
    };

    c.bench_function("signal_relay_roundtrip", |b| {
        b.iter(|| {
            let text = serde_json::to_string(&msg).unwrap();
            black_box(serde_json::from_str::<ServerMessage>(&text).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_clients_updated_encode,
    bench_register_decode,
    bench_signal_decode_1kb,
    bench_signal_relay_roundtrip,
);
criterion_main!(benches);
