pub mod channel;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod measurement;
pub mod provisioning;
pub mod router;
pub mod session;
pub mod test_util;
pub mod transport;

pub use config::Config;
pub use controller::{GatewayController, LifecycleState};
pub use dispatch::InstructionDispatcher;
pub use error::{Error, Result};
pub use identity::GatewayIdentity;
pub use provisioning::ProvisioningClient;
pub use router::{Instruction, MessageRouter};
