pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INVALID_ARGS: i32 = 2;
/// The command needs a capability this binary was built without
pub const UNSUPPORTED: i32 = 3;
