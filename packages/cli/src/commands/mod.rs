pub mod replay;
pub mod resolve;
pub mod session;

mod input;

pub use replay::{replay, ReplayArgs};
pub use resolve::{resolve, ResolveArgs};
pub use session::{session, SessionArgs};
