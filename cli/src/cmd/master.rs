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

//! `master`: run this process as the exchange's directory, optionally
//! backgrounding it (`-d`) the way the original `mxMaster`'s `background`
//! flag does.

use clap::ArgMatches;
use mx_core::ExchangeBuilder;

pub fn master_command(args: &ArgMatches) -> i32 {
    let mut builder = ExchangeBuilder::new();
    if let Some(name) = args.value_of("name") {
        builder = builder.name(name);
    }

    // Bind the listen port before backgrounding, so that a script starting
    // clients right after this command returns always finds a port waiting
    // for them instead of racing the fork.
    let exchange = match builder.build_master() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("mx: {}", e);
            return 1;
        }
    };

    if args.is_present("daemonize") {
        if let Err(e) = daemonize() {
            eprintln!("mx: failed to background: {}", e);
            return 1;
        }
    }

    log::info!(
        "master '{}' listening for exchange '{}' on port {}",
        exchange.my_name(),
        exchange.name(),
        exchange.port()
    );

    exchange.run()
}

/// A minimal double-fork: the first fork lets the invoking shell stop
/// waiting on us, `setsid` drops the controlling terminal, and the second
/// fork prevents ever reacquiring one.
#[cfg(unix)]
fn daemonize() -> std::io::Result<()> {
    unsafe {
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }
        if libc::setsid() == -1 {
            return Err(std::io::Error::last_os_error());
        }
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn daemonize() -> std::io::Result<()> {
    log::warn!("backgrounding is not supported on this platform; running in the foreground");
    Ok(())
}
