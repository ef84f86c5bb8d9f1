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

//! `quit`: connect to the master as an ephemeral client and ask it to shut
//! down via `QuitRequest`.

use clap::ArgMatches;
use mx_core::control::{self, ControlMessage};
use mx_core::ExchangeBuilder;
use std::thread;
use std::time::Duration;

pub fn quit_command(args: &ArgMatches) -> i32 {
    let verbose = args.is_present("verbose");

    let mut builder = ExchangeBuilder::new().component_name("mx-quit");
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

    let master = match exchange.master_peer_id() {
        Some(id) => id,
        None => {
            eprintln!("mx: not connected to a master");
            return 1;
        }
    };

    if verbose {
        println!("sending QuitRequest to '{}'", exchange.name());
    }

    let sent = exchange.send(
        master,
        control::QUIT_REQUEST,
        control::CONTROL_VERSION,
        ControlMessage::QuitRequest.encode(),
    );
    // `send` only enqueues the frame; give the writer thread a moment to
    // flush it before we half-shut the socket out from under it.
    thread::sleep(Duration::from_millis(100));
    exchange.shutdown();

    match sent {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("mx: {}", e);
            1
        }
    }
}
