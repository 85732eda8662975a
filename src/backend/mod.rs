// Backend module - Vulkan bring-up
//
// Design: builders decide, the Driver issues calls, the lifecycle owns
// Teardown: everything created lands on one release ledger, popped in reverse

pub mod device;
pub mod driver;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod pipeline;
pub mod query;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod vulkan;

#[cfg(test)]
pub mod mock;

pub use driver::NativeHandle;
pub use instance::{ContextConfig, VALIDATION_LAYER};
pub use lifecycle::Lifecycle;
pub use shader::FileShaderSource;
pub use vulkan::AshDriver;
