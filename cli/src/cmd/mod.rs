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

//! Per-subcommand handlers. Each takes the subcommand's own `ArgMatches`
//! and returns the process exit code (`0` success, `1` error).

mod list;
mod master;
mod quit;
mod resolve;

pub use list::list_command;
pub use master::master_command;
pub use quit::quit_command;
pub use resolve::{host_command, name_command, port_command};

pub fn version_command() -> i32 {
    println!("mx {}", env!("CARGO_PKG_VERSION"));
    0
}
