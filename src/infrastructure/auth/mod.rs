mod session_handle;

pub use session_handle::SessionHandle;
