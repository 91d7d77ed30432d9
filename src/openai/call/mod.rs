// Submodule for the agent loop: message mapping, model invocation, tool dispatch and the controller.

pub mod types;
pub mod request;
pub mod proposer;
pub mod resolver;
pub mod multi_step;
pub mod scripted;

pub use types::{Invocation, LoopEvent, LoopState, RunErrorKind, RunFailure, RunReport, RunResult};
pub use request::{build_chat_request, to_api_message};
pub use proposer::{ChatModel, ModelInvoker, OpenAiChatModel};
pub use resolver::{dispatch, execute_tool_call, parse_arguments};
pub use multi_step::LoopController;
pub use scripted::{Responder, ScriptStep, ScriptedChatModel};
