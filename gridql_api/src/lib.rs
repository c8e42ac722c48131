pub use error::*;
pub use metadata::*;
pub use predicate::*;
pub use tagset::*;
pub use timerange::*;
pub use timeseries::*;

mod error;
mod metadata;
mod predicate;
mod tagset;
mod timerange;
mod timeseries;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::metadata::*;
    pub use crate::predicate::*;
    pub use crate::tagset::*;
    pub use crate::timerange::*;
    pub use crate::timeseries::*;
}
