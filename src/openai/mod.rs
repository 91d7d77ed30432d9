//! OpenAI 連携と エージェントループ

pub mod call;
pub mod history; // conversation model
pub mod tools;

// 代表的な公開APIを再エクスポート
pub use call::{
	ChatModel,
	Invocation,
	LoopController,
	LoopEvent,
	LoopState,
	ModelInvoker,
	OpenAiChatModel,
	RunErrorKind,
	RunFailure,
	RunReport,
	RunResult,
	ScriptStep,
	ScriptedChatModel,
	dispatch,
	execute_tool_call,
};
pub use history::{
	AssistantMessage,
	Conversation,
	ConversationError,
	Message,
	ToolInvocationRequest,
	ToolResult,
};
pub use tools::{
	ToolDefinition,
	ToolHandler,
	ToolParameters,
	ToolParametersBuilder,
	ToolRegistry,
	build_retail_footprint_tool,
	default_registry,
};
