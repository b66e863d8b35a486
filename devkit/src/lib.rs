/*!
# Fleetlink DevKit - Stubs and Utilities for Development

Supports developing and testing against the Fleetlink agent without a live
coordinator:
- Scripted transport stubs implementing the agent's `Transport`/`Connector`
  contract, recording everything the agent sends
- Fixed snapshot sources so session tests never touch real system probes
- The end-to-end session lifecycle tests live in `tests/`
*/

pub mod snapshots;
pub mod transport_stub;

pub use snapshots::FixedSnapshots;
pub use transport_stub::{
    message_kind, ConnectOutcome, ScriptedEvent, SessionProbe, StubConnection, StubConnector,
};
