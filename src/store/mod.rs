pub mod weak;

pub use weak::{Reclaimed, Strong, WeakValueBox};
