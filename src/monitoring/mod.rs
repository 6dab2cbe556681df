// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/mod.rs - Transport metrics

pub mod transport_metrics;

pub use transport_metrics::{Rejection, TransportMetrics};
