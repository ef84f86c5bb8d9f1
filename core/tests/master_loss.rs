//! Master loss: if the master vanishes, every connected client's event loop
//! shuts itself down and `run`/`process_events` stop blocking.

mod common;

use common::pump;
use mx_core::ExchangeBuilder;
use std::sync::mpsc;
use std::time::Duration;

#[test]
fn client_shuts_down_when_master_disconnects() {
    let master = ExchangeBuilder::new()
        .name("mx-crate-test-masterloss")
        .build_master()
        .expect("master should bind its port");
    let a = ExchangeBuilder::new()
        .name("mx-crate-test-masterloss")
        .component_name("A")
        .build_client()
        .expect("A should reach the master");
    let b = ExchangeBuilder::new()
        .name("mx-crate-test-masterloss")
        .component_name("B")
        .build_client()
        .expect("B should reach the master");

    pump(&[&master, &a, &b], Duration::from_secs(2), || {
        master.connected_peers().len() == 2
    });

    // Simulate the master process dying: tear down its sockets without the
    // clients having asked for it.
    master.shutdown();

    let (tx_a, rx_a) = mpsc::channel();
    let a_run = a.clone();
    std::thread::spawn(move || {
        let _ = tx_a.send(a_run.run());
    });

    let (tx_b, rx_b) = mpsc::channel();
    let b_run = b.clone();
    std::thread::spawn(move || {
        let _ = tx_b.send(b_run.run());
    });

    let a_result = rx_a.recv_timeout(Duration::from_secs(2));
    let b_result = rx_b.recv_timeout(Duration::from_secs(2));

    assert_eq!(a_result, Ok(0), "A's run() should return once the master is gone");
    assert_eq!(b_result, Ok(0), "B's run() should return once the master is gone");
}
