//! Named registration: the first `Register` for a name round-trips to the
//! master and gets the first free user type id (12); a second client's
//! `Register` for the same name converges on the same id once it has seen
//! the `RegisterReport`.

mod common;

use common::pump;
use mx_core::ExchangeBuilder;
use std::time::Duration;

#[test]
fn register_is_commutative_across_clients() {
    let master = ExchangeBuilder::new()
        .name("mx-crate-test-register")
        .build_master()
        .expect("master should bind its port");
    let a = ExchangeBuilder::new()
        .name("mx-crate-test-register")
        .component_name("A")
        .build_client()
        .expect("A should reach the master");
    let b = ExchangeBuilder::new()
        .name("mx-crate-test-register")
        .component_name("B")
        .build_client()
        .expect("B should reach the master");

    pump(&[&master, &a, &b], Duration::from_secs(2), || {
        master.connected_peers().len() == 2
    });

    let id_from_a = a.register("Ping");
    assert_eq!(id_from_a, 12, "first user type should be allocated at id 12");

    // Give the master's RegisterReport broadcast time to reach B.
    let learned = pump(&[&master, &a, &b], Duration::from_secs(2), || {
        b.message_name(12).as_deref() == Some("Ping")
    });
    assert!(learned, "B should learn the new type's name via RegisterReport");

    let id_from_b = b.register("Ping");
    assert_eq!(id_from_b, id_from_a, "both clients must agree on the same (name, id) pair");

    // A second, distinct name gets the next id.
    let other = a.register("Pong");
    assert_eq!(other, 13);

    master.shutdown();
    a.shutdown();
    b.shutdown();
}
