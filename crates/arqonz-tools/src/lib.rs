//! AI tool panels: the tool catalogue and the collaborators their jobs run
//! against.
//!
//! Tools only build payloads and interpret results. Timing, retries and
//! terminal dispatch belong to `arqonz-jobs`.

pub mod catalog;
pub mod gateway;
pub mod history;
pub mod sink;
pub mod toast;

pub use catalog::{SubmitRoute, ToolInfo, ToolKind, ToolRequest};
pub use gateway::GatewayClient;
pub use history::{HistoryItem, HistoryStore};
pub use sink::FanoutSink;
pub use toast::{Toast, ToastNotifier, ToastVariant};
