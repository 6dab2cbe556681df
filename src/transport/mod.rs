// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod headers;
pub mod locks;
pub mod middleware;
pub mod pipeline;

pub use errors::{ErrorResponse, TransportError};
pub use locks::{SessionGuard, SessionLocks};
pub use middleware::{e2ee_middleware, protect};
pub use pipeline::{E2eeTransport, OpenedRequest, Route, SessionContext, SessionInfo};
