//! The agent execution graph.
//!
//! Two nodes and a decision function:
//!
//! ```text
//!            +---------+   tool calls    +---------+
//!  start --> |  agent  | --------------> |  tools  |
//!            +---------+ <-------------- +---------+
//!                 |        tool results
//!                 | plain reply
//!                 v
//!             terminate
//! ```
//!
//! - [`state`] -- The conversation passed between nodes.
//! - [`router`] -- Chooses the next node from the last message.
//! - [`nodes`] -- The agent turn and the tool invoker.
//! - [`events`] -- Execution events and the channel nodes report through.
//! - [`executor`] -- The bounded loop, per-thread locking and commits.

pub mod events;
pub mod executor;
pub mod nodes;
pub mod router;
pub mod state;

pub use events::{EventSink, GraphEvent};
pub use executor::{GraphExecutor, GraphRun, RunRequest, RunSummary};
pub use nodes::{AgentNode, NodeId, ToolNode};
pub use router::{RouteDecision, route};
pub use state::ConversationState;
