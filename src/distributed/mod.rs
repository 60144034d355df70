//! Coordinator/worker processes
//!
//! # Architecture
//!
//! One coordinator (rank 0) and a fixed set of workers (ranks 1..N-1):
//!
//! - **Coordinator**: computes the work plan, sends assignments, collects results
//!   in rank order, compares grids, writes reports
//! - **Node Service**: one per worker; runs the perturbed simulation and sends
//!   back its statistics
//!
//! # Modules
//!
//! - `protocol`: frame types and length-prefixed framing
//! - `codec`: the bitmask-gated result stream
//! - `coordinator`: coordinator state machine and TCP driver
//! - `node_service`: worker accept loop

pub mod codec;
pub mod coordinator;
pub mod node_service;
pub mod protocol;

pub use codec::{ParameterResult, ProtocolError};
pub use coordinator::{Coordinator, CoordinatorState, DistributedCoordinator};
pub use node_service::NodeService;
pub use protocol::{Envelope, Field, Tag, FATAL_ERROR, PROTOCOL_VERSION};
