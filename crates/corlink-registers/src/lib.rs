// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corlink Registers — holding-register reads from PLC-like devices, over
// standard Modbus-TCP or the vendor's raw `AA FE 55` framing.

pub mod client;
pub mod frame;
pub mod service;

pub use client::{RegisterClientConfig, RegisterReadClient, RegisterReadout};
pub use service::{RegisterReadRequest, RegisterReport};
