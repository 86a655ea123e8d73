pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod node_config;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SwitchyardError};
pub use event::EventBus;
pub use graph::{Edge, Graph, Node, NodeType};
pub use node_config::NodeConfig;
pub use types::*;
