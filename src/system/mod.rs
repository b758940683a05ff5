//! # System Interaction Layer
//!
//! The boundary between the engine and the operating system.
//!
//! ## Modules
//!
//! - **`platform`**: Detects the OS family, the shell used for indirection, and well-known
//!   directories.
//! - **`spawner`**: Starts a command through `sh -c` or `cmd /C` with piped output and, on Unix,
//!   its own process group.
//! - **`process_tree`**: Kills a child together with its descendants and decodes exit statuses.
//! - **`executor`**: Runs one command end-to-end: approval, spawn, timeout race, bounded
//!   capture, history.
//! - **`shell`**: A stateful session on top of the executor with built-ins and a FIFO queue.

pub mod executor;
pub mod platform;
pub mod process_tree;
pub mod shell;
pub mod spawner;
