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

//! `mx-core`: the runtime linked into every participant of an MX exchange.
//!
//! An [`Exchange`] is built with [`ExchangeBuilder`] into either a master
//! (the directory, exactly one per exchange) or a client, then driven with
//! [`Exchange::run`] (or polled with [`Exchange::process_events`]). See the
//! crate's `DESIGN.md` for how each module here maps onto the original
//! implementation this runtime reimplements.

pub mod config;
pub mod conn;
pub mod control;
pub mod directory;
pub mod error;
pub mod event;
pub mod exchange;
pub mod listener;
pub mod queue;
pub mod timer;
pub mod wire;

pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeBuilder, Role};
