mod command_input;
mod key_result;

pub use command_input::CommandInput;
pub use key_result::KeyResult;
