pub mod clock;
pub mod memory;
pub mod pool;
pub mod sled_store;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryGuessStore;
pub use pool::StoreHandle;
pub use sled_store::SledGuessStore;
pub use store::GuessStore;
