//! Blocking `Await`: a timed wait on a peer that never replies returns
//! `None` once the deadline passes, and a later wait on the same (peer,
//! type) picks up a reply sent afterwards.

mod common;

use common::pump;
use mx_core::ExchangeBuilder;
use std::time::Duration;

#[test]
fn await_times_out_then_succeeds_on_a_later_call() {
    let master = ExchangeBuilder::new()
        .name("mx-crate-test-await")
        .build_master()
        .expect("master should bind its port");
    let a = ExchangeBuilder::new()
        .name("mx-crate-test-await")
        .component_name("A")
        .build_client()
        .expect("A should reach the master");
    let b = ExchangeBuilder::new()
        .name("mx-crate-test-await")
        .component_name("B")
        .build_client()
        .expect("B should reach the master");

    pump(&[&master, &a, &b], Duration::from_secs(2), || {
        a.connected_peers().len() == 2 && b.connected_peers().len() == 2
    });

    let msg_type = a.register("Ping");
    pump(&[&master, &a, &b], Duration::from_secs(2), || b.message_name(msg_type).is_some());

    let b_peer_on_a = a
        .connected_peers()
        .into_iter()
        .find(|&p| a.component_name(p).as_deref() == Some("B/1"))
        .expect("A must know B directly");

    // B stays idle; A's await should time out.
    let timed_out = a.await_message(b_peer_on_a, msg_type, Duration::from_millis(300));
    assert!(timed_out.is_none(), "await with no reply should time out");

    // Now B replies; a fresh await on the same (peer, type) should pick it
    // up. `await_message` blocks the calling thread, so send from another
    // thread while A waits.
    let a_peer_on_b = b
        .connected_peers()
        .into_iter()
        .find(|&p| b.component_name(p).as_deref() == Some("A/1"))
        .expect("B must know A directly");

    let b_for_send = b.clone();
    let sender = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        b_for_send.send(a_peer_on_b, msg_type, 1, b"ok".to_vec()).unwrap();
    });

    let reply = a.await_message(b_peer_on_a, msg_type, Duration::from_millis(2000));
    sender.join().unwrap();

    assert_eq!(reply, Some((1, b"ok".to_vec())));

    master.shutdown();
    a.shutdown();
    b.shutdown();
}
