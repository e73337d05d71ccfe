pub mod buffer;
pub mod clock;
pub mod compositor;
pub mod frame;
