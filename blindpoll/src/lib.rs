#[macro_use]
extern crate serde;

mod blind;
mod error;
mod keys;
mod poll;
mod serde_decimal;
mod signer;
mod store;
mod util;
mod verify;
mod voter;

pub use blind::*;
pub use error::*;
pub use keys::*;
pub use poll::*;
pub use serde_decimal::*;
pub use signer::*;
pub use store::*;
pub use util::*;
pub use verify::*;
pub use voter::*;
