// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corlink Print — byte-stream backends with pluggable read strategies, raw
// raster delivery, and LPR job submission with a system spooler fallback.

pub mod backend;
pub mod delivery;
pub mod lpr_client;
pub mod progress;
pub mod raw_client;
pub mod read_strategy;
pub mod system_lpr;

pub use backend::{ByteStreamBackend, NetworkBackend};
pub use delivery::LabelPrinter;
pub use lpr_client::LprJobSubmitter;
pub use read_strategy::ReadStrategy;
