mod error;
mod impls;
mod prediction;
mod requests;
mod responses;
mod row;
mod util;

pub use error::*;
pub use impls::*;
pub use prediction::*;
pub use requests::*;
pub use responses::*;
pub use row::*;
pub use util::*;
