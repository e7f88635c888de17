pub mod atomic_counter;
pub mod sharded_lru;
pub mod treiber_stack;

pub use atomic_counter::AtomicCounter;
pub use sharded_lru::ShardedLru;
pub use treiber_stack::TreiberStack;
