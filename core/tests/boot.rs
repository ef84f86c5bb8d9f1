//! End-to-end boot sequence: a master and two clients come up, exchange
//! `HelloRequest`/`HelloReply`/`HelloReport`, and end up with a fully
//! connected mesh (every client directly connected to every other client,
//! not just to the master).

mod common;

use common::pump;
use mx_core::ExchangeBuilder;
use std::time::Duration;

#[test]
fn boot_assigns_sequential_ids_and_connects_mesh() {
    let master = ExchangeBuilder::new()
        .name("mx-crate-test-boot")
        .build_master()
        .expect("master should bind its port");

    let a = ExchangeBuilder::new()
        .name("mx-crate-test-boot")
        .component_name("A")
        .build_client()
        .expect("A should reach the master");

    assert_eq!(a.my_id(), 1);
    assert_eq!(a.my_name(), "A/1");

    let b = ExchangeBuilder::new()
        .name("mx-crate-test-boot")
        .component_name("B")
        .build_client()
        .expect("B should reach the master");

    assert_eq!(b.my_id(), 2);
    assert_eq!(b.my_name(), "B/1");

    // B learns about A via HelloReport and outbound-connects to it; give
    // that handshake time to settle across all three event loops.
    let settled = pump(&[&master, &a, &b], Duration::from_secs(2), || {
        master.connected_peers().len() == 2 && a.connected_peers().len() == 2 && b.connected_peers().len() == 2
    });
    assert!(settled, "master/A/B did not reach a fully connected mesh in time");

    // A and B should each know the other's assigned name directly (not just
    // via the master), confirming the peer-to-peer HelloUpdate handshake.
    let b_peer_on_a = a
        .connected_peers()
        .into_iter()
        .find(|&p| a.component_name(p).as_deref() == Some("B/1"));
    assert!(b_peer_on_a.is_some(), "A should have a direct connection to B");

    let a_peer_on_b = b
        .connected_peers()
        .into_iter()
        .find(|&p| b.component_name(p).as_deref() == Some("A/1"));
    assert!(a_peer_on_b.is_some(), "B should have a direct connection to A");

    master.shutdown();
    a.shutdown();
    b.shutdown();
}
