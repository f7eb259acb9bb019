//! JSON-RPC 2.0 envelopes and the Telex flavour of A2A messages.

pub mod jsonrpc;
pub mod session;
pub mod telex;

pub use jsonrpc::{parse_envelope, Envelope, InvokeParams, RpcResponse, TaskResult};
pub use session::{session_id, SessionHints};
