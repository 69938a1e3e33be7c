pub mod core;
pub use core::{
    Function, FunctionCall, FunctionCallFn, Message, Parameters, Property, Role, ToolChoice,
    ToolSpec, ToolType, completion,
};
