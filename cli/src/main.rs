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

//! `mx`: the external command-line collaborator around the `mx-core`
//! runtime — starting/stopping a master, printing resolved configuration,
//! and listing a running exchange's components.
//!
//! Each subcommand is a thin wrapper in `cmd/` around `mx_core`'s builder
//! and public API, mirroring the teacher's own `grin` binary's
//! `cmd::*_command(args) -> i32` convention. Logging is only ever
//! initialized here, never in the library crate.

mod cmd;

use clap::{App, AppSettings, Arg, SubCommand};
use std::process::exit;

fn main() {
    env_logger::init();

    let matches = App::new("mx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Start, stop, and inspect an MX exchange")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("master")
                .about("Run this process as the exchange's master (directory)")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .value_name("NAME")
                        .takes_value(true)
                        .help("Exchange name (default: $MX_NAME or $USER)"),
                )
                .arg(
                    Arg::with_name("daemonize")
                        .short("d")
                        .long("daemonize")
                        .conflicts_with("foreground")
                        .help("Background the master after binding its port"),
                )
                .arg(
                    Arg::with_name("foreground")
                        .short("f")
                        .long("foreground")
                        .help("Stay attached to the terminal (default)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("quit")
                .about("Ask a running master to shut down")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .value_name("NAME")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("host")
                        .short("h")
                        .long("host")
                        .value_name("HOST")
                        .takes_value(true),
                )
                .arg(Arg::with_name("verbose").short("v").long("verbose")),
        )
        .subcommand(SubCommand::with_name("name").about("Print the resolved exchange name"))
        .subcommand(SubCommand::with_name("host").about("Print the resolved master host"))
        .subcommand(
            SubCommand::with_name("port")
                .about("Print the port a name derives to")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .value_name("NAME")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("List the components currently known to the exchange")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .value_name("NAME")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("host")
                        .short("h")
                        .long("host")
                        .value_name("HOST")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("verbose")
                        .short("v")
                        .long("verbose")
                        .multiple(true)
                        .help("Repeat for more detail (-v, -vv, ...)"),
                ),
        )
        .subcommand(SubCommand::with_name("version").about("Print the mx version"))
        .get_matches();

    let code = match matches.subcommand() {
        ("master", Some(a)) => cmd::master_command(a),
        ("quit", Some(a)) => cmd::quit_command(a),
        ("name", Some(a)) => cmd::name_command(a),
        ("host", Some(a)) => cmd::host_command(a),
        ("port", Some(a)) => cmd::port_command(a),
        ("list", Some(a)) => cmd::list_command(a),
        ("version", Some(_)) => cmd::version_command(),
        _ => 0,
    };

    exit(code);
}
