//! Subscribe + broadcast: a broadcast reaches exactly the peers subscribed
//! to that type, and never the broadcaster itself even if it is also
//! locally subscribed.

mod common;

use common::pump;
use mx_core::ExchangeBuilder;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn broadcast_reaches_only_subscribers_and_not_self() {
    let master = ExchangeBuilder::new()
        .name("mx-crate-test-broadcast")
        .build_master()
        .expect("master should bind its port");
    let a = ExchangeBuilder::new()
        .name("mx-crate-test-broadcast")
        .component_name("A")
        .build_client()
        .expect("A should reach the master");
    let b = ExchangeBuilder::new()
        .name("mx-crate-test-broadcast")
        .component_name("B")
        .build_client()
        .expect("B should reach the master");

    pump(&[&master, &a, &b], Duration::from_secs(2), || {
        master.connected_peers().len() == 2 && a.connected_peers().len() == 2 && b.connected_peers().len() == 2
    });

    let msg_type = a.register("Ping");
    pump(&[&master, &a, &b], Duration::from_secs(2), || {
        b.message_name(msg_type).is_some()
    });

    let a_received: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let a_received_in_handler = a_received.clone();
    a.subscribe(msg_type, move |_peer, _ty, _version, _payload| {
        *a_received_in_handler.lock().unwrap() += 1;
    });

    let b_received: Arc<Mutex<Vec<(i32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let b_received_in_handler = b_received.clone();
    b.subscribe(msg_type, move |peer, _ty, _version, payload| {
        b_received_in_handler.lock().unwrap().push((peer, payload.to_vec()));
    });

    // Both subscriptions must propagate (to each other, and A's own
    // subscribe announcement reaches B, B's reaches A) before broadcasting.
    pump(&[&master, &a, &b], Duration::from_millis(300), || false);

    let a_peer_id_on_b = b
        .connected_peers()
        .into_iter()
        .find(|&p| b.component_name(p).as_deref() == Some("A/1"))
        .expect("B must know A directly");

    a.broadcast(msg_type, 0, b"hi".to_vec());

    let delivered = pump(&[&master, &a, &b], Duration::from_secs(2), || {
        !b_received.lock().unwrap().is_empty()
    });
    assert!(delivered, "B's handler should have fired");

    let received = b_received.lock().unwrap();
    assert_eq!(received.len(), 1, "B should receive the broadcast exactly once");
    assert_eq!(received[0].0, a_peer_id_on_b);
    assert_eq!(received[0].1, b"hi");
    drop(received);

    assert_eq!(
        *a_received.lock().unwrap(),
        0,
        "a broadcaster subscribed to its own type must not receive its own broadcast"
    );

    master.shutdown();
    a.shutdown();
    b.shutdown();
}
