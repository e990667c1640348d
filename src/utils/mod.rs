pub mod clock;
pub mod keyed_lock;
pub mod shutdown;
