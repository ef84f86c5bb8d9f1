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

//! `name`, `host`, and `port`: print the configuration values the other
//! subcommands resolve internally, without connecting to anything.

use clap::ArgMatches;
use mx_core::config::{derive_port, resolve_host, resolve_name};

pub fn name_command(_args: &ArgMatches) -> i32 {
    match resolve_name(None) {
        Ok(name) => {
            println!("{}", name);
            0
        }
        Err(e) => {
            eprintln!("mx: {}", e);
            1
        }
    }
}

pub fn host_command(_args: &ArgMatches) -> i32 {
    println!("{}", resolve_host(None));
    0
}

pub fn port_command(args: &ArgMatches) -> i32 {
    match resolve_name(args.value_of("name")) {
        Ok(name) => {
            println!("{}", derive_port(&name));
            0
        }
        Err(e) => {
            eprintln!("mx: {}", e);
            1
        }
    }
}
