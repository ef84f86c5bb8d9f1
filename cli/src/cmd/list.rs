// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `list`: connect as an ephemeral client and print the components
//! currently known to the exchange.

use clap::ArgMatches;
use mx_core::ExchangeBuilder;
use std::thread;
use std::time::Duration;

pub fn list_command(args: &ArgMatches) -> i32 {
    let verbosity = args.occurrences_of("verbose");

    let mut builder = ExchangeBuilder::new().component_name("mx-list");
    if let Some(name) = args.value_of("name") {
        builder = builder.name(name);
    }
    if let Some(host) = args.value_of("host") {
        builder = builder.host(host);
    }

    let exchange = match builder.build_client() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("mx: {}", e);
            return 1;
        }
    };

    // HelloReport-driven connections to other peers arrive over the event
    // channel; give them a short window to settle before reading the
    // directory's view.
    for _ in 0..5 {
        exchange.process_events();
        thread::sleep(Duration::from_millis(50));
    }

    println!("exchange '{}' on {}:{}", exchange.name(), exchange.host(), exchange.port());
    for peer in exchange.connected_peers() {
        let name = exchange.component_name(peer).unwrap_or_else(|| "?".to_string());
        if verbosity > 0 {
            println!("  {} (fd {})", name, peer);
        } else {
            println!("  {}", name);
        }
    }

    exchange.shutdown();
    0
}
